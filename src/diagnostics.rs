//! Per-pairing diagnostics for what the best schedule left unresolved.

use hashbrown::HashMap;

use crate::algorithms::RunOutcome;
use crate::models::{
    CatalogueSnapshot, ConstraintFailure, ConstraintViolation, FailureReason, Gene,
    RequiredPairing, ViolationKind,
};

/// The gene a violation is charged to. Double bookings blame the later gene
/// so the earlier placement can still be committed cleanly.
fn blamed(violation: &ConstraintViolation) -> usize {
    violation.gene_b.unwrap_or(violation.gene_a)
}

fn reason_for(kind: ViolationKind) -> FailureReason {
    match kind {
        ViolationKind::CapacityExceeded => FailureReason::CapacityExceeded,
        ViolationKind::RoomTypeMismatch => FailureReason::NoSuitableRoom,
        ViolationKind::LecturerDoubleBook => FailureReason::LecturerConflict,
        ViolationKind::RoomDoubleBook
        | ViolationKind::ClassDoubleBook
        | ViolationKind::SlotNotEligibleForStream
        | ViolationKind::Unassigned => FailureReason::NoAvailableSlot,
    }
}

fn precedence(reason: FailureReason) -> u8 {
    match reason {
        FailureReason::CapacityExceeded => 0,
        FailureReason::NoSuitableRoom => 1,
        FailureReason::LecturerConflict => 2,
        FailureReason::NoAvailableSlot => 3,
    }
}

/// Why a pairing with no placement could not be placed, judged from the catalogue alone.
fn unplaced_reason(
    pairing: &RequiredPairing,
    snapshot: &CatalogueSnapshot,
) -> (FailureReason, String) {
    if pairing.lecturers.is_empty() {
        return (
            FailureReason::LecturerConflict,
            "no active lecturer is eligible for this course".to_string(),
        );
    }
    if pairing.rooms.is_empty() {
        let required = snapshot
            .courses
            .get(&pairing.course_id)
            .and_then(|c| c.room_type_id);
        let typed = snapshot
            .rooms
            .iter()
            .filter(|room| room.accepts_type(required))
            .count();
        return if typed > 0 {
            (
                FailureReason::CapacityExceeded,
                format!(
                    "{typed} rooms of the right type, none seats {} students",
                    pairing.enrolled
                ),
            )
        } else {
            (
                FailureReason::NoSuitableRoom,
                "no active room of the required type".to_string(),
            )
        };
    }
    (
        FailureReason::NoAvailableSlot,
        "no eligible time slot or teaching day".to_string(),
    )
}

/// One diagnostic per gene of the best individual that is unassigned or
/// still carries a hard violation.
pub fn report(snapshot: &CatalogueSnapshot, outcome: &RunOutcome) -> Vec<ConstraintFailure> {
    let mut charged: HashMap<usize, Vec<&ConstraintViolation>> = HashMap::new();
    for violation in &outcome.violations {
        charged.entry(blamed(violation)).or_default().push(violation);
    }

    let mut indices: Vec<usize> = charged.keys().copied().collect();
    indices.sort_unstable();

    indices
        .into_iter()
        .filter_map(|index| {
            let gene = outcome.best.genes().get(index)?;
            let pairing = snapshot.pairings.get(index)?;
            let violations = &charged[&index];

            let unplaced = violations.iter().any(|v| v.kind == ViolationKind::Unassigned);
            let (reason, details) = if unplaced {
                unplaced_reason(pairing, snapshot)
            } else {
                let reason = violations
                    .iter()
                    .map(|v| reason_for(v.kind))
                    .min_by_key(|r| precedence(*r))
                    .unwrap_or(FailureReason::NoAvailableSlot);
                let details = violations
                    .iter()
                    .map(|v| v.detail.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                (reason, details)
            };

            Some(failure(snapshot, index, gene, pairing, reason, details, outcome))
        })
        .collect()
}

fn failure(
    snapshot: &CatalogueSnapshot,
    index: usize,
    gene: &Gene,
    pairing: &RequiredPairing,
    reason: FailureReason,
    details: String,
    outcome: &RunOutcome,
) -> ConstraintFailure {
    let course = snapshot.courses.get(&gene.course_id);
    ConstraintFailure {
        pairing: index,
        class_id: gene.class_id,
        course_id: gene.course_id,
        division_label: gene.division_label.clone(),
        session_id: gene.session_id,
        course_code: course.map(|c| c.code.clone()).unwrap_or_default(),
        course_name: course.map(|c| c.name.clone()).unwrap_or_default(),
        class_name: snapshot
            .class(gene.class_id)
            .map(|c| c.name.clone())
            .unwrap_or_default(),
        lecturer_name: gene
            .lecturer_id
            .and_then(|id| snapshot.lecturers.get(&id))
            .map(|l| l.name.clone()),
        reason,
        details,
        attempts: outcome.attempts.get(index).copied().unwrap_or(0),
        suitable_rooms: pairing.rooms.len(),
        available_slots: pairing.slots.len(),
    }
}
