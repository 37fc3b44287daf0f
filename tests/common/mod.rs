#![allow(dead_code)]

use rusqlite::Connection;
use timetable_builder::schema;
use timetable_builder::RunConfig;

pub const ACADEMIC_YEAR: &str = "2024/2025";

/// Stream 1, semester 1: three classes needing two courses each, rooms of
/// 30 and 60 seats, four mandatory time slots.
pub const SMALL_CATALOGUE: &str = "
INSERT INTO streams (id, name) VALUES (1, 'Regular'), (2, 'Weekend');
INSERT INTO sessions (id, academic_year, semester) VALUES (1, '2024/2025', 1), (2, '2024/2025', 2);
INSERT INTO classes (id, name, stream_id, size) VALUES
    (1, 'CS 1', 1, 25), (2, 'CS 2', 1, 40), (3, 'CS 3', 1, 55), (4, 'Old', 1, 20);
UPDATE classes SET is_active = 0 WHERE id = 4;
INSERT INTO courses (id, code, name) VALUES
    (1, 'CS101', 'Programming'), (2, 'CS102', 'Discrete Maths'),
    (3, 'CS201', 'Data Structures'), (4, 'CS202', 'Databases'),
    (5, 'CS301', 'Compilers'), (6, 'CS302', 'Networks');
INSERT INTO class_courses (class_id, course_id, session_id) VALUES
    (1, 1, 1), (1, 2, 1), (2, 3, 1), (2, 4, 1), (3, 5, 1), (3, 6, 1),
    (1, 3, 2), (4, 1, 1);
INSERT INTO lecturers (id, name) VALUES (1, 'Ada'), (2, 'Brian'), (3, 'Grace');
INSERT INTO lecturer_courses (lecturer_id, course_id) VALUES
    (1, 1), (1, 2), (2, 3), (2, 4), (3, 5), (3, 6);
INSERT INTO rooms (id, name, capacity) VALUES (1, 'Small Hall', 30), (2, 'Large Hall', 60);
INSERT INTO time_slots (id, start_time, end_time, is_mandatory) VALUES
    (1, '08:00', '09:00', 1), (2, '09:00', '10:00', 1),
    (3, '10:00', '11:00', 1), (4, '11:00', '12:00', 1);
";

pub fn catalogue(seed_sql: &str) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    schema::create_all(&conn).unwrap();
    conn.execute_batch(seed_sql).unwrap();
    conn
}

pub fn run_config(seed: u64) -> RunConfig {
    let mut config = RunConfig::new(1, 1, ACADEMIC_YEAR);
    config.population_size = 10;
    config.generations = 10;
    config.mutation_rate = 0.1;
    config.crossover_rate = 0.8;
    config.max_runtime = 30;
    config.seed = Some(seed);
    config
}
