use hashbrown::HashMap;
use rand::seq::IndexedRandom;
use rand::Rng;

use crate::models::{
    CatalogueSnapshot, ClassId, Day, Gene, Individual, LecturerId, RequiredPairing, RoomId, SlotId,
};

/// Cells already taken inside one individual, by room, lecturer and class group.
#[derive(Debug, Default)]
struct Occupancy<'a> {
    rooms: HashMap<(RoomId, Day, SlotId), u32>,
    lecturers: HashMap<(LecturerId, Day, SlotId), u32>,
    classes: HashMap<(ClassId, &'a str, Day, SlotId), u32>,
}

impl<'a> Occupancy<'a> {
    fn of(individual: &Individual, snapshot: &'a CatalogueSnapshot) -> Self {
        let mut occupancy = Self::default();
        for (gene, pairing) in individual.genes().iter().zip(&snapshot.pairings) {
            occupancy.add(gene, pairing);
        }
        occupancy
    }

    fn add(&mut self, gene: &Gene, pairing: &'a RequiredPairing) {
        if let (Some(lecturer), Some(room), Some(slot), Some(day)) =
            (gene.lecturer_id, gene.room_id, gene.time_slot_id, gene.day)
        {
            *self.rooms.entry((room, day, slot)).or_default() += 1;
            *self.lecturers.entry((lecturer, day, slot)).or_default() += 1;
            *self
                .classes
                .entry((pairing.class_id, pairing.division_label.as_str(), day, slot))
                .or_default() += 1;
        }
    }

    fn remove(&mut self, gene: &Gene, pairing: &'a RequiredPairing) {
        fn release<K: std::hash::Hash + Eq>(map: &mut HashMap<K, u32>, key: K) {
            if let Some(count) = map.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    map.remove(&key);
                }
            }
        }
        if let (Some(lecturer), Some(room), Some(slot), Some(day)) =
            (gene.lecturer_id, gene.room_id, gene.time_slot_id, gene.day)
        {
            release(&mut self.rooms, (room, day, slot));
            release(&mut self.lecturers, (lecturer, day, slot));
            release(
                &mut self.classes,
                (pairing.class_id, pairing.division_label.as_str(), day, slot),
            );
        }
    }

    fn is_free(
        &self,
        pairing: &RequiredPairing,
        lecturer: LecturerId,
        room: RoomId,
        day: Day,
        slot: SlotId,
    ) -> bool {
        !self.rooms.contains_key(&(room, day, slot))
            && !self.lecturers.contains_key(&(lecturer, day, slot))
            && !self
                .classes
                .contains_key(&(pairing.class_id, pairing.division_label.as_str(), day, slot))
    }
}

/// Draws a placement for `pairing`, retrying up to `repair_attempts` times for a
/// cell that collides with nothing in `occupancy`. Each draw counts as one attempt.
fn place<R: Rng>(
    pairing: &RequiredPairing,
    snapshot: &CatalogueSnapshot,
    occupancy: &Occupancy<'_>,
    repair_attempts: u32,
    attempts: &mut u32,
    rng: &mut R,
) -> Gene {
    let mut gene = Gene::unassigned(pairing);
    if !pairing.is_placeable() || snapshot.days.is_empty() {
        gene.lecturer_id = pairing.lecturers.choose(rng).copied();
        return gene;
    }

    for _ in 0..repair_attempts.max(1) {
        let (Some(&lecturer), Some(&room), Some(&slot), Some(&day)) = (
            pairing.lecturers.choose(rng),
            pairing.rooms.choose(rng),
            pairing.slots.choose(rng),
            snapshot.days.choose(rng),
        ) else {
            break;
        };
        let room = snapshot.rooms[room].id;
        let slot = snapshot.slots[slot].id;
        *attempts += 1;

        gene.lecturer_id = Some(lecturer);
        gene.room_id = Some(room);
        gene.time_slot_id = Some(slot);
        gene.day = Some(day);
        if occupancy.is_free(pairing, lecturer, room, day, slot) {
            break;
        }
    }
    gene
}

/// Which part of a gene a mutation redraws.
#[derive(Debug, Clone, Copy)]
enum Aspect {
    Room,
    Slot,
    Day,
    Lecturer,
}

impl Individual {
    /// A pairing-complete individual with every gene drawn from its eligible candidates.
    pub fn random<R: Rng>(
        snapshot: &CatalogueSnapshot,
        repair_attempts: u32,
        attempts: &mut [u32],
        rng: &mut R,
    ) -> Self {
        let mut occupancy = Occupancy::default();
        let genes = snapshot
            .pairings
            .iter()
            .zip(attempts.iter_mut())
            .map(|(pairing, tries)| {
                let gene = place(pairing, snapshot, &occupancy, repair_attempts, tries, rng);
                occupancy.add(&gene, pairing);
                gene
            })
            .collect();
        Individual::new(genes)
    }

    /// Uniform crossover: each pairing takes its whole gene from one parent.
    pub fn crossover<R: Rng>(&self, other: &Individual, rng: &mut R) -> Individual {
        let genes = self
            .genes()
            .iter()
            .zip(other.genes())
            .map(|(a, b)| if rng.random_bool(0.5) { a.clone() } else { b.clone() })
            .collect();
        Individual::new(genes)
    }

    /// Each gene, with probability `mutation_rate`, has its room, slot, day or
    /// lecturer redrawn from the pairing's candidates, preferring a free cell.
    pub fn mutate<R: Rng>(
        &mut self,
        snapshot: &CatalogueSnapshot,
        mutation_rate: f64,
        repair_attempts: u32,
        attempts: &mut [u32],
        rng: &mut R,
    ) {
        let mut occupancy = Occupancy::of(self, snapshot);

        for ((gene, pairing), tries) in self
            .genes_mut()
            .iter_mut()
            .zip(&snapshot.pairings)
            .zip(attempts.iter_mut())
        {
            if !rng.random_bool(mutation_rate) || !pairing.is_placeable() {
                continue;
            }
            occupancy.remove(gene, pairing);

            let redrawn = if gene.is_placed() {
                let aspect = *[Aspect::Room, Aspect::Slot, Aspect::Day, Aspect::Lecturer]
                    .choose(rng)
                    .unwrap_or(&Aspect::Room);
                redraw(gene, aspect, pairing, snapshot, &occupancy, repair_attempts, tries, rng)
            } else {
                None
            };
            *gene = match redrawn {
                Some(gene) => gene,
                None => place(pairing, snapshot, &occupancy, repair_attempts, tries, rng),
            };

            occupancy.add(gene, pairing);
        }
    }
}

/// Redraws one aspect of a placed gene. `None` when no draw found a free cell.
#[allow(clippy::too_many_arguments)]
fn redraw<R: Rng>(
    gene: &Gene,
    aspect: Aspect,
    pairing: &RequiredPairing,
    snapshot: &CatalogueSnapshot,
    occupancy: &Occupancy<'_>,
    repair_attempts: u32,
    attempts: &mut u32,
    rng: &mut R,
) -> Option<Gene> {
    let mut candidate = gene.clone();
    for _ in 0..repair_attempts.max(1) {
        match aspect {
            Aspect::Room => {
                candidate.room_id = pairing.rooms.choose(rng).map(|&i| snapshot.rooms[i].id)
            }
            Aspect::Slot => {
                candidate.time_slot_id = pairing.slots.choose(rng).map(|&i| snapshot.slots[i].id)
            }
            Aspect::Day => candidate.day = snapshot.days.choose(rng).copied(),
            Aspect::Lecturer => candidate.lecturer_id = pairing.lecturers.choose(rng).copied(),
        }
        *attempts += 1;

        if let (Some(lecturer), Some(room), Some(slot), Some(day)) = (
            candidate.lecturer_id,
            candidate.room_id,
            candidate.time_slot_id,
            candidate.day,
        ) {
            if occupancy.is_free(pairing, lecturer, room, day, slot) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fixtures::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_is_pairing_complete() {
        let snapshot = small_snapshot();
        let mut rng = StdRng::seed_from_u64(42);
        let mut attempts = vec![0; snapshot.pairings.len()];
        let individual = Individual::random(&snapshot, 8, &mut attempts, &mut rng);

        assert_eq!(individual.len(), snapshot.pairings.len());
        for (gene, pairing) in individual.genes().iter().zip(&snapshot.pairings) {
            assert_eq!(gene.class_id, pairing.class_id);
            assert_eq!(gene.course_id, pairing.course_id);
            assert_eq!(gene.division_label, pairing.division_label);
            assert!(gene.is_placed());
            let room = snapshot.room(gene.room_id.unwrap()).unwrap();
            assert!(room.capacity >= pairing.enrolled);
            assert!(pairing.lecturers.contains(&gene.lecturer_id.unwrap()));
        }
        assert!(attempts.iter().all(|&a| a >= 1));
    }

    #[test]
    fn test_unplaceable_pairing_stays_unassigned() {
        let mut catalogue = small_catalogue();
        // Nobody can teach course 6.
        catalogue.eligibility.retain(|&(_, course)| course != 6);
        let snapshot =
            crate::loader::assemble(scope(), Day::WEEKDAYS.to_vec(), catalogue).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut attempts = vec![0; snapshot.pairings.len()];
        let mut individual = Individual::random(&snapshot, 8, &mut attempts, &mut rng);
        individual.mutate(&snapshot, 1.0, 8, &mut attempts, &mut rng);

        assert_eq!(individual.len(), 6);
        assert!(!individual.genes()[5].is_placed());
        assert_eq!(attempts[5], 0);
    }

    #[test]
    fn test_crossover_keeps_pairing_order() {
        let snapshot = small_snapshot();
        let mut rng = StdRng::seed_from_u64(1);
        let mut attempts = vec![0; snapshot.pairings.len()];
        let a = Individual::random(&snapshot, 1, &mut attempts, &mut rng);
        let b = Individual::random(&snapshot, 1, &mut attempts, &mut rng);
        let child = a.crossover(&b, &mut rng);

        assert_eq!(child.len(), a.len());
        for (i, gene) in child.genes().iter().enumerate() {
            assert!(gene == &a.genes()[i] || gene == &b.genes()[i]);
        }
    }

    #[test]
    fn test_mutation_keeps_candidates_eligible() {
        let snapshot = small_snapshot();
        let mut rng = StdRng::seed_from_u64(3);
        let mut attempts = vec![0; snapshot.pairings.len()];
        let mut individual = Individual::random(&snapshot, 8, &mut attempts, &mut rng);
        let before: u32 = attempts.iter().sum();
        for _ in 0..20 {
            individual.mutate(&snapshot, 1.0, 4, &mut attempts, &mut rng);
        }

        assert!(attempts.iter().sum::<u32>() > before);
        for (gene, pairing) in individual.genes().iter().zip(&snapshot.pairings) {
            assert!(gene.is_placed());
            let room = snapshot.room(gene.room_id.unwrap()).unwrap();
            assert!(room.capacity >= pairing.enrolled);
            assert!(pairing.lecturers.contains(&gene.lecturer_id.unwrap()));
            assert!(snapshot.slot(gene.time_slot_id.unwrap()).is_some());
        }
    }

    #[test]
    fn test_zero_mutation_rate_is_identity() {
        let snapshot = small_snapshot();
        let mut rng = StdRng::seed_from_u64(5);
        let mut attempts = vec![0; snapshot.pairings.len()];
        let individual = Individual::random(&snapshot, 8, &mut attempts, &mut rng);
        let mut mutated = individual.clone();
        mutated.mutate(&snapshot, 0.0, 8, &mut attempts, &mut rng);
        assert_eq!(individual, mutated);
    }
}
