use chrono::NaiveTime;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ClassId = i64;
pub type CourseId = i64;
pub type LecturerId = i64;
pub type RoomId = i64;
pub type RoomTypeId = i64;
pub type SlotId = i64;
pub type SessionId = i64;
pub type StreamId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const WEEKDAYS: [Day; 5] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Day::Monday => "monday",
            Day::Tuesday => "tuesday",
            Day::Wednesday => "wednesday",
            Day::Thursday => "thursday",
            Day::Friday => "friday",
            Day::Saturday => "saturday",
            Day::Sunday => "sunday",
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (stream, semester, academic year) a run is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub stream_id: StreamId,
    pub semester: u8,
    pub academic_year: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub stream_id: StreamId,
    pub size: u32,
    /// Number of room-capacity-fitting groups the class is split into.
    pub divisions: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseInfo {
    pub id: CourseId,
    pub code: String,
    pub name: String,
    pub room_type_id: Option<RoomTypeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LecturerInfo {
    pub id: LecturerId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub capacity: u32,
    pub room_type_id: Option<RoomTypeId>,
}

impl Room {
    pub fn accepts_type(&self, required: Option<RoomTypeId>) -> bool {
        required.is_none() || self.room_type_id == required
    }
}

#[derive(Debug, Clone)]
pub struct TimeSlot {
    pub id: SlotId,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub is_break: bool,
    pub is_mandatory: bool,
    pub stream_id: Option<StreamId>,
    pub is_active: bool,
}

impl TimeSlot {
    /// Mandatory slots serve every stream; the rest only the stream that enabled them.
    pub fn is_eligible_for(&self, stream_id: StreamId) -> bool {
        self.is_mandatory || (self.is_active && self.stream_id == Some(stream_id))
    }
}

/// One (class, course, session[, division]) that must receive exactly one gene.
#[derive(Debug, Clone, Serialize)]
pub struct RequiredPairing {
    pub class_id: ClassId,
    pub course_id: CourseId,
    pub session_id: SessionId,
    pub division_label: String,
    pub enrolled: u32,
    pub lecturers: Vec<LecturerId>,
    /// Indices into `CatalogueSnapshot::rooms` that fit capacity and room type.
    pub rooms: Vec<usize>,
    /// Indices into `CatalogueSnapshot::slots` eligible for the class's stream.
    pub slots: Vec<usize>,
}

impl RequiredPairing {
    pub fn is_placeable(&self) -> bool {
        !self.lecturers.is_empty() && !self.rooms.is_empty() && !self.slots.is_empty()
    }
}

/// Immutable, typed view of everything a run needs. Shared read-only across workers.
#[derive(Debug, Clone)]
pub struct CatalogueSnapshot {
    pub scope: Scope,
    pub days: Vec<Day>,
    pub classes: Vec<ClassInfo>,
    pub courses: HashMap<CourseId, CourseInfo>,
    pub lecturers: HashMap<LecturerId, LecturerInfo>,
    pub rooms: Vec<Room>,
    /// Ordered by start time; adjacent positions are back-to-back.
    pub slots: Vec<TimeSlot>,
    pub pairings: Vec<RequiredPairing>,
    pub(crate) class_index: HashMap<ClassId, usize>,
    pub(crate) room_index: HashMap<RoomId, usize>,
    pub(crate) slot_index: HashMap<SlotId, usize>,
}

impl CatalogueSnapshot {
    pub fn class(&self, id: ClassId) -> Option<&ClassInfo> {
        self.class_index.get(&id).map(|&i| &self.classes[i])
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.room_index.get(&id).map(|&i| &self.rooms[i])
    }

    pub fn slot_position(&self, id: SlotId) -> Option<usize> {
        self.slot_index.get(&id).copied()
    }

    pub fn slot(&self, id: SlotId) -> Option<&TimeSlot> {
        self.slot_position(id).map(|i| &self.slots[i])
    }
}

/// One placement decision. A gene missing its room, slot, day or lecturer is unassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gene {
    pub class_id: ClassId,
    pub course_id: CourseId,
    pub lecturer_id: Option<LecturerId>,
    pub room_id: Option<RoomId>,
    pub time_slot_id: Option<SlotId>,
    pub day: Option<Day>,
    pub division_label: String,
    pub session_id: SessionId,
}

impl Gene {
    pub fn unassigned(pairing: &RequiredPairing) -> Self {
        Gene {
            class_id: pairing.class_id,
            course_id: pairing.course_id,
            lecturer_id: None,
            room_id: None,
            time_slot_id: None,
            day: None,
            division_label: pairing.division_label.clone(),
            session_id: pairing.session_id,
        }
    }

    pub fn is_placed(&self) -> bool {
        self.lecturer_id.is_some()
            && self.room_id.is_some()
            && self.time_slot_id.is_some()
            && self.day.is_some()
    }
}

/// A complete candidate schedule. Gene `i` always belongs to `snapshot.pairings[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Individual {
    genes: Vec<Gene>,
}

impl Individual {
    pub fn new(genes: Vec<Gene>) -> Self {
        Self { genes }
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    pub(crate) fn genes_mut(&mut self) -> &mut [Gene] {
        &mut self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Lower is better. `value` folds the counts with their weights.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FitnessScore {
    pub value: f64,
    pub hard: u32,
    pub soft: u32,
    pub unassigned: u32,
}

impl FitnessScore {
    pub fn is_feasible(&self) -> bool {
        self.hard == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    RoomDoubleBook,
    LecturerDoubleBook,
    ClassDoubleBook,
    CapacityExceeded,
    RoomTypeMismatch,
    SlotNotEligibleForStream,
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub kind: ViolationKind,
    pub gene_a: usize,
    pub gene_b: Option<usize>,
    pub detail: String,
}

/// Progress of one run as seen by an external poller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub percent: f64,
    pub generation: usize,
    pub total: usize,
    #[serde(rename = "bestFitness")]
    pub best_fitness: f64,
    pub done: bool,
}

impl ProgressRecord {
    pub fn started(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn at(generation: usize, total: usize, best_fitness: f64) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            (generation as f64 / total as f64 * 100.0).min(100.0)
        };
        Self {
            percent,
            generation,
            total,
            best_fitness,
            done: false,
        }
    }

    /// The search is over but its result is not committed or published yet.
    pub fn searched(generation: usize, total: usize, best_fitness: f64) -> Self {
        Self {
            percent: 100.0,
            generation,
            total,
            best_fitness,
            done: false,
        }
    }

    /// Only written once the run's result can be fetched.
    pub fn finished(generation: usize, total: usize, best_fitness: f64) -> Self {
        Self {
            percent: 100.0,
            generation,
            total,
            best_fitness,
            done: true,
        }
    }
}

/// A progress record tagged with its run token, as broadcast to status subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub token: String,
    #[serde(flatten)]
    pub record: ProgressRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    NoSuitableRoom,
    LecturerConflict,
    NoAvailableSlot,
    CapacityExceeded,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoSuitableRoom => "NO_SUITABLE_ROOM",
            FailureReason::LecturerConflict => "LECTURER_CONFLICT",
            FailureReason::NoAvailableSlot => "NO_AVAILABLE_SLOT",
            FailureReason::CapacityExceeded => "CAPACITY_EXCEEDED",
        }
    }
}

/// Diagnostic for a pairing the best schedule could not place cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintFailure {
    pub pairing: usize,
    pub class_id: ClassId,
    pub course_id: CourseId,
    pub division_label: String,
    pub session_id: SessionId,
    pub course_code: String,
    pub course_name: String,
    pub class_name: String,
    pub lecturer_name: Option<String>,
    pub reason: FailureReason,
    pub details: String,
    pub attempts: u32,
    pub suitable_rooms: usize,
    pub available_slots: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitResult {
    pub committed: usize,
    pub failures: Vec<ConstraintFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Termination {
    Converged,
    BudgetExhausted,
    TimeExceeded,
}

/// Everything a caller gets back from one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub seed: u64,
    pub termination: Termination,
    pub generations: usize,
    pub best_fitness: FitnessScore,
    pub fitness_history: Vec<f64>,
    pub schedule: Individual,
    pub failures: Vec<ConstraintFailure>,
    pub committed: usize,
    pub materialized: bool,
    pub persistence_error: Option<String>,
    pub elapsed_ms: u128,
}
