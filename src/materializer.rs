use log::{error, info};
use rusqlite::{params, Connection};

use crate::error::PersistenceError;
use crate::models::{CatalogueSnapshot, CommitResult, ConstraintFailure, Individual};

/// Writes an accepted schedule as the authoritative timetable for its scope.
pub struct SolutionMaterializer<'c> {
    conn: &'c mut Connection,
}

impl<'c> SolutionMaterializer<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self { conn }
    }

    /// Replaces the scope's schedule and failure list in one transaction.
    /// Any failed statement rolls everything back and the previous schedule stays.
    pub fn commit(
        &mut self,
        snapshot: &CatalogueSnapshot,
        individual: &Individual,
        failures: Vec<ConstraintFailure>,
    ) -> Result<CommitResult, PersistenceError> {
        let scope = &snapshot.scope;
        let result = self.write(snapshot, individual, &failures);
        match result {
            Ok(committed) => {
                info!(
                    "committed {committed} placements for stream {} semester {} {} ({} failures)",
                    scope.stream_id,
                    scope.semester,
                    scope.academic_year,
                    failures.len()
                );
                Ok(CommitResult {
                    committed,
                    failures,
                })
            }
            Err(err) => {
                error!(
                    "schedule commit for stream {} rolled back: {err}",
                    scope.stream_id
                );
                Err(PersistenceError(err))
            }
        }
    }

    fn write(
        &mut self,
        snapshot: &CatalogueSnapshot,
        individual: &Individual,
        failures: &[ConstraintFailure],
    ) -> rusqlite::Result<usize> {
        let scope = &snapshot.scope;
        // Dropping the transaction without commit rolls it back.
        let tx = self.conn.transaction()?;

        tx.execute(
            "DELETE FROM timetable WHERE stream_id = ?1 AND semester = ?2 AND academic_year = ?3",
            params![scope.stream_id, scope.semester, scope.academic_year],
        )?;
        tx.execute(
            "DELETE FROM timetable_failures WHERE stream_id = ?1 AND semester = ?2 AND academic_year = ?3",
            params![scope.stream_id, scope.semester, scope.academic_year],
        )?;

        let mut committed = 0;
        {
            let mut insert = tx.prepare(
                "INSERT INTO timetable (class_id, course_id, division_label, session_id,
                     lecturer_id, room_id, day, time_slot_id, stream_id, semester, academic_year)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for gene in individual.genes() {
                let (Some(lecturer_id), Some(room_id), Some(slot_id), Some(day)) =
                    (gene.lecturer_id, gene.room_id, gene.time_slot_id, gene.day)
                else {
                    continue;
                };
                insert.execute(params![
                    gene.class_id,
                    gene.course_id,
                    gene.division_label,
                    gene.session_id,
                    lecturer_id,
                    room_id,
                    day.as_str(),
                    slot_id,
                    scope.stream_id,
                    scope.semester,
                    scope.academic_year,
                ])?;
                committed += 1;
            }

            let mut record = tx.prepare(
                "INSERT INTO timetable_failures (class_id, course_id, division_label, session_id,
                     course_code, course_name, class_name, lecturer_name, reason, details,
                     attempts, suitable_rooms, available_slots, stream_id, semester, academic_year)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )?;
            for failure in failures {
                record.execute(params![
                    failure.class_id,
                    failure.course_id,
                    failure.division_label,
                    failure.session_id,
                    failure.course_code,
                    failure.course_name,
                    failure.class_name,
                    failure.lecturer_name,
                    failure.reason.as_str(),
                    failure.details,
                    failure.attempts,
                    failure.suitable_rooms as i64,
                    failure.available_slots as i64,
                    scope.stream_id,
                    scope.semester,
                    scope.academic_year,
                ])?;
            }
        }

        tx.commit()?;
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fixtures::*;
    use crate::models::{Day, Gene};
    use crate::schema;

    fn store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_all(&conn).unwrap();
        conn
    }

    fn placed(snapshot: &CatalogueSnapshot) -> Individual {
        let days = [Day::Monday, Day::Tuesday, Day::Wednesday];
        let genes = snapshot
            .pairings
            .iter()
            .enumerate()
            .map(|(i, pairing)| {
                let mut gene = Gene::unassigned(pairing);
                gene.lecturer_id = pairing.lecturers.first().copied();
                gene.room_id = Some(2);
                gene.time_slot_id = Some(1 + (i as i64 % 2));
                gene.day = Some(days[i / 2]);
                gene
            })
            .collect();
        Individual::new(genes)
    }

    fn rows(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM timetable", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_commit_inserts_placed_genes_and_replaces_previous() {
        let snapshot = small_snapshot();
        let mut conn = store();
        let mut individual = placed(&snapshot);

        let first = SolutionMaterializer::new(&mut conn)
            .commit(&snapshot, &individual, Vec::new())
            .unwrap();
        assert_eq!(first.committed, 6);
        assert_eq!(rows(&conn), 6);

        individual.genes_mut()[5] = Gene::unassigned(&snapshot.pairings[5]);
        let second = SolutionMaterializer::new(&mut conn)
            .commit(&snapshot, &individual, Vec::new())
            .unwrap();
        assert_eq!(second.committed, 5);
        assert_eq!(rows(&conn), 5);

        let day: String = conn
            .query_row(
                "SELECT day FROM timetable WHERE class_id = 1 AND course_id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(day, "monday");
    }

    #[test]
    fn test_failed_insert_rolls_back_everything() {
        let snapshot = small_snapshot();
        let mut conn = store();
        let individual = placed(&snapshot);
        SolutionMaterializer::new(&mut conn)
            .commit(&snapshot, &individual, Vec::new())
            .unwrap();

        // Two genes for the same (class, course, division, session) break the unique key.
        let mut genes = individual.genes().to_vec();
        genes[1] = genes[0].clone();
        genes[1].day = Some(Day::Friday);
        let broken = Individual::new(genes);

        let err = SolutionMaterializer::new(&mut conn).commit(&snapshot, &broken, Vec::new());
        assert!(err.is_err());
        assert_eq!(rows(&conn), 6);
        let friday: i64 = conn
            .query_row("SELECT COUNT(*) FROM timetable WHERE day = 'friday'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(friday, 0);
    }

    #[test]
    fn test_commit_leaves_other_scopes_alone() {
        let snapshot = small_snapshot();
        let mut conn = store();
        conn.execute(
            "INSERT INTO timetable (class_id, course_id, division_label, session_id, lecturer_id,
                 room_id, day, time_slot_id, stream_id, semester, academic_year)
             VALUES (9, 9, '', 2, 1, 1, 'monday', 1, 1, 2, '2024/2025')",
            [],
        )
        .unwrap();

        SolutionMaterializer::new(&mut conn)
            .commit(&snapshot, &placed(&snapshot), Vec::new())
            .unwrap();
        assert_eq!(rows(&conn), 7);
    }
}
