use hashbrown::HashMap;

use crate::models::{
    CatalogueSnapshot, ClassId, ConstraintViolation, Day, FitnessScore, Individual, LecturerId,
    RoomId, SlotId, ViolationKind,
};

pub const HARD_WEIGHT: f64 = 1000.0;
pub const SOFT_WEIGHT: f64 = 1.0;

/// Collects violations only when asked to, so scoring alone never formats details.
struct Violations<'v>(Option<&'v mut Vec<ConstraintViolation>>);

impl Violations<'_> {
    fn push(
        &mut self,
        kind: ViolationKind,
        gene_a: usize,
        gene_b: Option<usize>,
        detail: impl FnOnce() -> String,
    ) {
        if let Some(sink) = self.0.as_deref_mut() {
            sink.push(ConstraintViolation {
                kind,
                gene_a,
                gene_b,
                detail: detail(),
            });
        }
    }
}

/// Scores schedules against the hard and soft constraints of one snapshot.
///
/// Conflicts are found by indexing placements per (room|lecturer|class, day, slot)
/// so one evaluation is linear in the number of genes.
#[derive(Debug, Clone, Copy)]
pub struct FitnessCalculator<'a> {
    snapshot: &'a CatalogueSnapshot,
    max_consecutive: u32,
}

impl<'a> FitnessCalculator<'a> {
    pub fn new(snapshot: &'a CatalogueSnapshot, max_consecutive: u32) -> Self {
        Self {
            snapshot,
            max_consecutive,
        }
    }

    /// Score only. Used inside the generation loop.
    pub fn calculate_fitness(&self, individual: &Individual) -> FitnessScore {
        self.check(individual, None)
    }

    /// Score plus every violation found.
    pub fn evaluate(&self, individual: &Individual) -> (FitnessScore, Vec<ConstraintViolation>) {
        let mut violations = Vec::new();
        let score = self.check(individual, Some(&mut violations));
        (score, violations)
    }

    fn check(
        &self,
        individual: &Individual,
        sink: Option<&mut Vec<ConstraintViolation>>,
    ) -> FitnessScore {
        let snapshot = self.snapshot;
        let genes = individual.genes();

        let mut hard = 0u32;
        let mut unassigned = 0u32;
        let mut breaks = 0u32;

        let mut rooms: HashMap<(RoomId, Day, SlotId), usize> = HashMap::with_capacity(genes.len());
        let mut lecturers: HashMap<(LecturerId, Day, SlotId), usize> =
            HashMap::with_capacity(genes.len());
        let mut classes: HashMap<(ClassId, &str, Day, SlotId), usize> =
            HashMap::with_capacity(genes.len());
        let mut teaching: HashMap<LecturerId, Vec<(Day, usize)>> = HashMap::new();

        let mut report = Violations(sink);

        for (idx, gene) in genes.iter().enumerate() {
            let (Some(lecturer_id), Some(room_id), Some(slot_id), Some(day)) =
                (gene.lecturer_id, gene.room_id, gene.time_slot_id, gene.day)
            else {
                unassigned += 1;
                report.push(
                    ViolationKind::Unassigned,
                    idx,
                    None,
                    || format!(
                        "class {} course {} has no placement",
                        gene.class_id, gene.course_id
                    ),
                );
                continue;
            };

            let enrolled = snapshot.pairings.get(idx).map_or(0, |p| p.enrolled);
            let required_type = snapshot
                .courses
                .get(&gene.course_id)
                .and_then(|c| c.room_type_id);

            match snapshot.room(room_id) {
                Some(room) => {
                    if room.capacity < enrolled {
                        hard += 1;
                        report.push(
                            ViolationKind::CapacityExceeded,
                            idx,
                            None,
                            || format!(
                                "room {} holds {} but {} are enrolled",
                                room.name, room.capacity, enrolled
                            ),
                        );
                    }
                    if !room.accepts_type(required_type) {
                        hard += 1;
                        report.push(
                            ViolationKind::RoomTypeMismatch,
                            idx,
                            None,
                            || format!("room {} is not of the type course {} needs", room.name, gene.course_id),
                        );
                    }
                }
                None => {
                    hard += 1;
                    report.push(
                        ViolationKind::RoomTypeMismatch,
                        idx,
                        None,
                        || format!("room {room_id} is not in the catalogue"),
                    );
                }
            }

            let stream_id = snapshot
                .class(gene.class_id)
                .map_or(snapshot.scope.stream_id, |c| c.stream_id);
            let position = snapshot.slot_position(slot_id);
            match position.map(|pos| &snapshot.slots[pos]) {
                Some(slot) if slot.is_eligible_for(stream_id) => {
                    if slot.is_break {
                        breaks += 1;
                    }
                }
                _ => {
                    hard += 1;
                    report.push(
                        ViolationKind::SlotNotEligibleForStream,
                        idx,
                        None,
                        || format!("slot {slot_id} is not open to stream {stream_id}"),
                    );
                }
            }

            if let Some(&first) = rooms.get(&(room_id, day, slot_id)) {
                hard += 1;
                report.push(
                    ViolationKind::RoomDoubleBook,
                    first,
                    Some(idx),
                    || format!("room {room_id} is booked twice on {day} slot {slot_id}"),
                );
            } else {
                rooms.insert((room_id, day, slot_id), idx);
            }

            if let Some(&first) = lecturers.get(&(lecturer_id, day, slot_id)) {
                hard += 1;
                report.push(
                    ViolationKind::LecturerDoubleBook,
                    first,
                    Some(idx),
                    || format!("lecturer {lecturer_id} teaches twice on {day} slot {slot_id}"),
                );
            } else {
                lecturers.insert((lecturer_id, day, slot_id), idx);
            }

            let class_key = (gene.class_id, gene.division_label.as_str(), day, slot_id);
            if let Some(&first) = classes.get(&class_key) {
                hard += 1;
                report.push(
                    ViolationKind::ClassDoubleBook,
                    first,
                    Some(idx),
                    || format!("class {} attends two courses on {day} slot {slot_id}", gene.class_id),
                );
            } else {
                classes.insert(class_key, idx);
            }

            if let Some(pos) = position {
                teaching.entry(lecturer_id).or_default().push((day, pos));
            }
        }

        let soft = breaks
            + teaching
                .values_mut()
                .map(|sessions| self.load_penalty(sessions) + self.back_to_back_penalty(sessions))
                .sum::<u32>();

        FitnessScore {
            value: f64::from(hard + unassigned) * HARD_WEIGHT + f64::from(soft) * SOFT_WEIGHT,
            hard,
            soft,
            unassigned,
        }
    }

    /// Sessions beyond a spread of one between the busiest and quietest teaching day.
    fn load_penalty(&self, sessions: &[(Day, usize)]) -> u32 {
        let days = &self.snapshot.days;
        if days.len() < 2 {
            return 0;
        }
        let counts: Vec<u32> = days
            .iter()
            .map(|day| sessions.iter().filter(|(d, _)| d == day).count() as u32)
            .collect();
        let max = counts.iter().copied().max().unwrap_or(0);
        let min = counts.iter().copied().min().unwrap_or(0);
        (max - min).saturating_sub(1)
    }

    /// Sessions beyond `max_consecutive` in any run of slots on one day where
    /// each slot starts exactly when the previous one ends.
    fn back_to_back_penalty(&self, sessions: &mut [(Day, usize)]) -> u32 {
        let slots = &self.snapshot.slots;
        sessions.sort_unstable();
        let mut penalty = 0;
        let mut run = 0u32;
        let mut previous: Option<(Day, usize)> = None;
        for &(day, pos) in sessions.iter() {
            run = match previous {
                Some((d, p)) if d == day && p == pos => run,
                Some((d, p)) if d == day && slots[p].end == slots[pos].start => run + 1,
                _ => 1,
            };
            if run > self.max_consecutive && previous != Some((day, pos)) {
                penalty += 1;
            }
            previous = Some((day, pos));
        }
        penalty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fixtures::*;
    use crate::models::Gene;

    fn placed(
        snapshot: &CatalogueSnapshot,
        pairing: usize,
        lecturer: i64,
        room: i64,
        slot: i64,
        day: Day,
    ) -> Gene {
        let mut gene = Gene::unassigned(&snapshot.pairings[pairing]);
        gene.lecturer_id = Some(lecturer);
        gene.room_id = Some(room);
        gene.time_slot_id = Some(slot);
        gene.day = Some(day);
        gene
    }

    /// Every pairing on its own day, in a fitting room.
    fn clean(snapshot: &CatalogueSnapshot) -> Individual {
        Individual::new(vec![
            placed(snapshot, 0, 1, 1, 1, Day::Monday),
            placed(snapshot, 1, 1, 1, 1, Day::Tuesday),
            placed(snapshot, 2, 2, 2, 1, Day::Monday),
            placed(snapshot, 3, 2, 2, 1, Day::Tuesday),
            placed(snapshot, 4, 3, 2, 1, Day::Wednesday),
            placed(snapshot, 5, 3, 2, 1, Day::Thursday),
        ])
    }

    #[test]
    fn test_clean_schedule_has_no_hard_violations() {
        let snapshot = small_snapshot();
        let calculator = FitnessCalculator::new(&snapshot, 3);
        let (score, violations) = calculator.evaluate(&clean(&snapshot));
        assert_eq!(score.hard, 0);
        assert_eq!(score.unassigned, 0);
        assert!(violations.is_empty());
        assert!(score.value < HARD_WEIGHT);
    }

    #[test]
    fn test_double_bookings_are_counted_once_per_extra_gene() {
        let snapshot = small_snapshot();
        let mut individual = clean(&snapshot);
        // Pairing 3 moves onto pairing 2's cell: same room, lecturer and class.
        individual.genes_mut()[3].day = Some(Day::Monday);

        let (score, violations) = FitnessCalculator::new(&snapshot, 3).evaluate(&individual);
        let kinds: Vec<_> = violations.iter().map(|v| v.kind).collect();
        assert_eq!(score.hard, 3);
        assert!(kinds.contains(&ViolationKind::RoomDoubleBook));
        assert!(kinds.contains(&ViolationKind::LecturerDoubleBook));
        assert!(kinds.contains(&ViolationKind::ClassDoubleBook));
        assert!(violations
            .iter()
            .all(|v| v.gene_a == 2 && v.gene_b == Some(3)));
    }

    #[test]
    fn test_capacity_and_missing_placement() {
        let snapshot = small_snapshot();
        let mut individual = clean(&snapshot);
        // Class 3 has 55 students; room 1 seats 30.
        individual.genes_mut()[4].room_id = Some(1);
        individual.genes_mut()[5] = Gene::unassigned(&snapshot.pairings[5]);

        let (score, violations) = FitnessCalculator::new(&snapshot, 3).evaluate(&individual);
        assert_eq!(score.hard, 1);
        assert_eq!(score.unassigned, 1);
        assert_eq!(violations[0].kind, ViolationKind::CapacityExceeded);
        assert_eq!(violations[1].kind, ViolationKind::Unassigned);
        assert!(score.value >= 2.0 * HARD_WEIGHT);
    }

    #[test]
    fn test_room_type_mismatch() {
        let mut catalogue = small_catalogue();
        catalogue.courses[0].room_type_id = Some(7);
        catalogue.rooms[1].room_type_id = Some(7);
        let snapshot = crate::loader::assemble(scope(), Day::WEEKDAYS.to_vec(), catalogue).unwrap();

        let (score, violations) = FitnessCalculator::new(&snapshot, 3).evaluate(&clean(&snapshot));
        assert_eq!(score.hard, 1);
        assert_eq!(violations[0].kind, ViolationKind::RoomTypeMismatch);
        assert_eq!(violations[0].gene_a, 0);
    }

    #[test]
    fn test_slot_outside_snapshot_is_not_eligible() {
        let snapshot = small_snapshot();
        let mut individual = clean(&snapshot);
        individual.genes_mut()[0].time_slot_id = Some(99);

        let (score, violations) = FitnessCalculator::new(&snapshot, 3).evaluate(&individual);
        assert_eq!(score.hard, 1);
        assert_eq!(violations[0].kind, ViolationKind::SlotNotEligibleForStream);
    }

    #[test]
    fn test_soft_penalties_for_breaks_and_long_runs() {
        let mut catalogue = small_catalogue();
        catalogue.slots[1].is_break = true;
        let snapshot = crate::loader::assemble(scope(), vec![Day::Monday], catalogue).unwrap();

        // Lecturer 1 teaches slots 1..=4 back to back on Monday.
        let genes = vec![
            placed(&snapshot, 0, 1, 1, 1, Day::Monday),
            placed(&snapshot, 1, 1, 1, 2, Day::Monday),
            placed(&snapshot, 2, 1, 2, 3, Day::Monday),
            placed(&snapshot, 3, 1, 2, 4, Day::Monday),
            placed(&snapshot, 4, 3, 2, 1, Day::Monday),
            placed(&snapshot, 5, 3, 2, 2, Day::Monday),
        ];

        let calculator = FitnessCalculator::new(&snapshot, 3);
        let score = calculator.calculate_fitness(&Individual::new(genes.clone()));
        assert_eq!(score.hard, 0);
        // One session in the break slot for each lecturer, one session over the run limit.
        assert_eq!(score.soft, 3);

        let relaxed = FitnessCalculator::new(&snapshot, 4).calculate_fitness(&Individual::new(genes));
        assert_eq!(relaxed.soft, 2);
    }

    #[test]
    fn test_gap_between_slots_breaks_the_run() {
        let mut catalogue = small_catalogue();
        // 08-09, 09-10, then a free hour before 11-12 and 12-13.
        catalogue.slots = vec![slot(1, 8), slot(2, 9), slot(3, 11), slot(4, 12)];
        let snapshot = crate::loader::assemble(scope(), vec![Day::Monday], catalogue).unwrap();

        let genes = vec![
            placed(&snapshot, 0, 1, 1, 1, Day::Monday),
            placed(&snapshot, 1, 1, 1, 2, Day::Monday),
            placed(&snapshot, 2, 1, 2, 3, Day::Monday),
            placed(&snapshot, 3, 1, 2, 4, Day::Monday),
            placed(&snapshot, 4, 3, 2, 1, Day::Monday),
            placed(&snapshot, 5, 3, 2, 2, Day::Monday),
        ];
        let individual = Individual::new(genes);

        // Two runs of two: nothing over the limit.
        let score = FitnessCalculator::new(&snapshot, 2).calculate_fitness(&individual);
        assert_eq!(score.hard, 0);
        assert_eq!(score.soft, 0);

        let strict = FitnessCalculator::new(&snapshot, 1).calculate_fitness(&individual);
        assert_eq!(strict.soft, 3);
    }

    #[test]
    fn test_load_imbalance_is_soft() {
        let snapshot = small_snapshot();
        let mut individual = clean(&snapshot);
        // Lecturer 3 teaches both sessions on Wednesday, other days empty: spread 2.
        individual.genes_mut()[5].day = Some(Day::Wednesday);
        individual.genes_mut()[5].time_slot_id = Some(3);

        let score = FitnessCalculator::new(&snapshot, 3).calculate_fitness(&individual);
        assert_eq!(score.hard, 0);
        assert_eq!(score.soft, 1);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let snapshot = small_snapshot();
        let calculator = FitnessCalculator::new(&snapshot, 3);
        let individual = clean(&snapshot);
        assert_eq!(
            calculator.evaluate(&individual),
            calculator.evaluate(&individual)
        );
    }
}
