use crate::error::DataUnavailable;
use crate::models::{
    CatalogueSnapshot, ClassId, ClassInfo, CourseId, CourseInfo, Day, LecturerId, LecturerInfo,
    RequiredPairing, Room, Scope, SessionId, StreamId, TimeSlot,
};
use chrono::NaiveTime;
use hashbrown::HashMap;
use log::{debug, info};
use rusqlite::{params, Connection};

/// Typed catalogue rows for one scope, before division expansion.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    /// (id, name, stream_id, size)
    pub classes: Vec<(ClassId, String, StreamId, u32)>,
    pub courses: Vec<CourseInfo>,
    pub lecturers: Vec<LecturerInfo>,
    /// Which lecturer may teach which course.
    pub eligibility: Vec<(LecturerId, CourseId)>,
    pub rooms: Vec<Room>,
    pub slots: Vec<TimeSlot>,
    /// (class_id, course_id, session_id)
    pub offerings: Vec<(ClassId, CourseId, SessionId)>,
}

/// Reads the catalogue for `scope` and turns it into a snapshot.
pub fn load_all(
    conn: &Connection,
    scope: &Scope,
    days: &[Day],
) -> Result<CatalogueSnapshot, DataUnavailable> {
    let catalogue = read_catalogue(conn, scope)?;
    assemble(scope.clone(), days.to_vec(), catalogue)
}

pub fn read_catalogue(conn: &Connection, scope: &Scope) -> Result<Catalogue, DataUnavailable> {
    let classes = conn
        .prepare(
            "SELECT id, name, stream_id, size FROM classes
             WHERE is_active = 1 AND stream_id = ?1 ORDER BY id",
        )?
        .query_map(params![scope.stream_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if classes.is_empty() {
        return Err(DataUnavailable::NoClasses {
            stream_id: scope.stream_id,
        });
    }

    let slots = read_slots(conn, scope.stream_id)?;
    if slots.is_empty() {
        return Err(DataUnavailable::NoTimeSlots {
            stream_id: scope.stream_id,
        });
    }

    let sessions: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sessions
         WHERE is_active = 1 AND academic_year = ?1 AND semester = ?2",
        params![scope.academic_year, scope.semester],
        |row| row.get(0),
    )?;
    if sessions == 0 {
        return Err(DataUnavailable::NoSession {
            semester: scope.semester,
            academic_year: scope.academic_year.clone(),
        });
    }

    let offerings = conn
        .prepare(
            "SELECT cc.class_id, cc.course_id, cc.session_id FROM class_courses cc
             JOIN classes c ON c.id = cc.class_id
             JOIN courses co ON co.id = cc.course_id
             JOIN sessions s ON s.id = cc.session_id
             WHERE c.is_active = 1 AND c.stream_id = ?1 AND co.is_active = 1
               AND s.is_active = 1 AND s.academic_year = ?2 AND s.semester = ?3
             ORDER BY cc.class_id, cc.course_id, cc.session_id",
        )?
        .query_map(
            params![scope.stream_id, scope.academic_year, scope.semester],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let courses = conn
        .prepare("SELECT id, code, name, room_type_id FROM courses WHERE is_active = 1 ORDER BY id")?
        .query_map([], |row| {
            Ok(CourseInfo {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
                room_type_id: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let lecturers = conn
        .prepare("SELECT id, name FROM lecturers WHERE is_active = 1 ORDER BY id")?
        .query_map([], |row| {
            Ok(LecturerInfo {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let eligibility = conn
        .prepare(
            "SELECT lc.lecturer_id, lc.course_id FROM lecturer_courses lc
             JOIN lecturers l ON l.id = lc.lecturer_id
             WHERE l.is_active = 1 ORDER BY lc.course_id, lc.lecturer_id",
        )?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let rooms = conn
        .prepare(
            "SELECT r.id, r.name, r.capacity, r.room_type_id FROM rooms r
             LEFT JOIN room_types t ON t.id = r.room_type_id
             WHERE r.is_active = 1 AND (r.room_type_id IS NULL OR t.is_active = 1)
             ORDER BY r.id",
        )?
        .query_map([], |row| {
            Ok(Room {
                id: row.get(0)?,
                name: row.get(1)?,
                capacity: row.get(2)?,
                room_type_id: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        "catalogue for stream {}: {} classes, {} offerings, {} rooms, {} slots",
        scope.stream_id,
        classes.len(),
        offerings.len(),
        rooms.len(),
        slots.len()
    );

    Ok(Catalogue {
        classes,
        courses,
        lecturers,
        eligibility,
        rooms,
        slots,
        offerings,
    })
}

fn read_slots(conn: &Connection, stream_id: StreamId) -> Result<Vec<TimeSlot>, DataUnavailable> {
    let rows = conn
        .prepare(
            "SELECT id, start_time, end_time, is_break, is_mandatory, stream_id, is_active
             FROM time_slots
             WHERE is_mandatory = 1 OR (stream_id = ?1 AND is_active = 1)
             ORDER BY start_time, id",
        )?
        .query_map(params![stream_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, Option<StreamId>>(5)?,
                row.get::<_, bool>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, start, end, is_break, is_mandatory, stream_id, is_active)| {
                Ok(TimeSlot {
                    id,
                    start: parse_time(id, &start)?,
                    end: parse_time(id, &end)?,
                    is_break,
                    is_mandatory,
                    stream_id,
                    is_active,
                })
            },
        )
        .collect()
}

fn parse_time(slot_id: i64, value: &str) -> Result<NaiveTime, DataUnavailable> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| DataUnavailable::BadTime {
            slot_id,
            value: value.to_string(),
        })
}

/// `"A"`, `"B"`, ... `"Z"`, `"AA"`, ... for a zero-based division index.
pub fn division_label(mut index: u32) -> String {
    let mut label = Vec::new();
    loop {
        label.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    label.reverse();
    String::from_utf8(label).unwrap_or_default()
}

/// Validates the scope, splits oversized classes into divisions and
/// precomputes each pairing's structurally eligible candidates.
pub fn assemble(
    scope: Scope,
    days: Vec<Day>,
    catalogue: Catalogue,
) -> Result<CatalogueSnapshot, DataUnavailable> {
    let Catalogue {
        classes,
        courses,
        lecturers,
        eligibility,
        rooms,
        mut slots,
        offerings,
    } = catalogue;

    if classes.is_empty() {
        return Err(DataUnavailable::NoClasses {
            stream_id: scope.stream_id,
        });
    }
    slots.retain(|slot| slot.is_eligible_for(scope.stream_id));
    if slots.is_empty() {
        return Err(DataUnavailable::NoTimeSlots {
            stream_id: scope.stream_id,
        });
    }
    if rooms.is_empty() {
        return Err(DataUnavailable::NoRooms);
    }
    slots.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));

    let largest_room = rooms.iter().map(|room| room.capacity).max().unwrap_or(0).max(1);
    let classes: Vec<ClassInfo> = classes
        .into_iter()
        .map(|(id, name, stream_id, size)| ClassInfo {
            id,
            name,
            stream_id,
            size,
            divisions: size.div_ceil(largest_room).max(1),
        })
        .collect();

    let class_index: HashMap<ClassId, usize> =
        classes.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
    let courses: HashMap<CourseId, CourseInfo> = courses.into_iter().map(|c| (c.id, c)).collect();
    let lecturers: HashMap<LecturerId, LecturerInfo> =
        lecturers.into_iter().map(|l| (l.id, l)).collect();

    let mut teachers: HashMap<CourseId, Vec<LecturerId>> = HashMap::new();
    for (lecturer_id, course_id) in eligibility {
        if lecturers.contains_key(&lecturer_id) {
            teachers.entry(course_id).or_default().push(lecturer_id);
        }
    }
    for candidates in teachers.values_mut() {
        candidates.sort_unstable();
        candidates.dedup();
    }

    let mut pairings = Vec::new();
    for (class_id, course_id, session_id) in offerings {
        let (Some(&class_pos), Some(course)) = (class_index.get(&class_id), courses.get(&course_id))
        else {
            continue;
        };
        let class = &classes[class_pos];
        let eligible_slots: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_eligible_for(class.stream_id))
            .map(|(i, _)| i)
            .collect();

        for division in 0..class.divisions {
            let enrolled =
                class.size / class.divisions + u32::from(division < class.size % class.divisions);
            let label = if class.divisions > 1 {
                division_label(division)
            } else {
                String::new()
            };
            pairings.push(RequiredPairing {
                class_id,
                course_id,
                session_id,
                division_label: label,
                enrolled,
                lecturers: teachers.get(&course_id).cloned().unwrap_or_default(),
                rooms: rooms
                    .iter()
                    .enumerate()
                    .filter(|(_, room)| {
                        room.capacity >= enrolled && room.accepts_type(course.room_type_id)
                    })
                    .map(|(i, _)| i)
                    .collect(),
                slots: eligible_slots.clone(),
            });
        }
    }
    if pairings.is_empty() {
        return Err(DataUnavailable::NoPairings);
    }

    let room_index = rooms.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    let slot_index = slots.iter().enumerate().map(|(i, s)| (s.id, i)).collect();

    info!(
        "snapshot for stream {} semester {} {}: {} classes, {} required pairings",
        scope.stream_id,
        scope.semester,
        scope.academic_year,
        classes.len(),
        pairings.len()
    );

    Ok(CatalogueSnapshot {
        scope,
        days,
        classes,
        courses,
        lecturers,
        rooms,
        slots,
        pairings,
        class_index,
        room_index,
        slot_index,
    })
}
