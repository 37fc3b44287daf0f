//! Tables the scheduling core reads from and writes to.
//!
//! The catalogue tables are owned by the administration side; they are
//! created here only when absent so a fresh store can be bootstrapped.

use rusqlite::Connection;

pub const CATALOGUE: &str = "
CREATE TABLE IF NOT EXISTS streams (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY,
    academic_year TEXT NOT NULL,
    semester INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS classes (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    stream_id INTEGER NOT NULL,
    size INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS room_types (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    room_type_id INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS class_courses (
    id INTEGER PRIMARY KEY,
    class_id INTEGER NOT NULL,
    course_id INTEGER NOT NULL,
    session_id INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS lecturers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS lecturer_courses (
    lecturer_id INTEGER NOT NULL,
    course_id INTEGER NOT NULL,
    PRIMARY KEY (lecturer_id, course_id)
);
CREATE TABLE IF NOT EXISTS rooms (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    capacity INTEGER NOT NULL,
    room_type_id INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS time_slots (
    id INTEGER PRIMARY KEY,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    is_break INTEGER NOT NULL DEFAULT 0,
    is_mandatory INTEGER NOT NULL DEFAULT 0,
    stream_id INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1
);
";

pub const SCHEDULE: &str = "
CREATE TABLE IF NOT EXISTS timetable (
    id INTEGER PRIMARY KEY,
    class_id INTEGER NOT NULL,
    course_id INTEGER NOT NULL,
    division_label TEXT NOT NULL DEFAULT '',
    session_id INTEGER NOT NULL,
    lecturer_id INTEGER NOT NULL,
    room_id INTEGER NOT NULL,
    day TEXT NOT NULL,
    time_slot_id INTEGER NOT NULL,
    stream_id INTEGER NOT NULL,
    semester INTEGER NOT NULL,
    academic_year TEXT NOT NULL,
    UNIQUE (class_id, course_id, division_label, session_id)
);
CREATE TABLE IF NOT EXISTS timetable_failures (
    id INTEGER PRIMARY KEY,
    class_id INTEGER NOT NULL,
    course_id INTEGER NOT NULL,
    division_label TEXT NOT NULL DEFAULT '',
    session_id INTEGER NOT NULL,
    course_code TEXT NOT NULL,
    course_name TEXT NOT NULL,
    class_name TEXT NOT NULL,
    lecturer_name TEXT,
    reason TEXT NOT NULL,
    details TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    suitable_rooms INTEGER NOT NULL,
    available_slots INTEGER NOT NULL,
    stream_id INTEGER NOT NULL,
    semester INTEGER NOT NULL,
    academic_year TEXT NOT NULL
);
";

pub fn create_all(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CATALOGUE)?;
    conn.execute_batch(SCHEDULE)
}
