// 📒 Entry Ledger - append-only record of vehicles let in
//
// Entries are keyed by canonical plate but do not reference `vehicles`: a row
// stays valid after its vehicle is deactivated, and plates with no vehicle
// record join to empty owner/unit.

use crate::clock::{format_timestamp, Clock, DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::error::{AccessError, AccessResult};
use crate::plate;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENTRY CATEGORY
// ============================================================================

/// How a vehicle came in. The ledger stores the label as text and never
/// re-validates it; this enum is what the guard screens offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryCategory {
    Resident,
    Visitor,
    Service,
}

impl EntryCategory {
    pub const ALL: [EntryCategory; 3] = [
        EntryCategory::Resident,
        EntryCategory::Visitor,
        EntryCategory::Service,
    ];

    /// Stored label
    pub fn label(&self) -> &'static str {
        match self {
            EntryCategory::Resident => "Residente",
            EntryCategory::Visitor => "Visita",
            EntryCategory::Service => "Servicio",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            EntryCategory::Resident => EntryCategory::Visitor,
            EntryCategory::Visitor => EntryCategory::Service,
            EntryCategory::Service => EntryCategory::Resident,
        }
    }
}

impl Default for EntryCategory {
    fn default() -> Self {
        EntryCategory::Resident
    }
}

impl std::fmt::Display for EntryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for EntryCategory {
    type Err = AccessError;

    /// Accepts the stored label or the English name, any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "residente" | "resident" => Ok(EntryCategory::Resident),
            "visita" | "visitor" => Ok(EntryCategory::Visitor),
            "servicio" | "service" => Ok(EntryCategory::Service),
            other => Err(AccessError::invalid(
                "category",
                format!("Unknown entry category '{}' (Residente, Visita or Servicio)", other),
            )),
        }
    }
}

// ============================================================================
// ENTRY ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub plate: String,
    pub occurred_at: NaiveDateTime,
    pub guard: String,
    pub category: String,
}

/// Entry joined with the owner/unit of the vehicle carrying that plate, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryView {
    #[serde(flatten)]
    pub entry: Entry,
    pub owner: Option<String>,
    pub unit: Option<String>,
}

const ENTRY_VIEW_SELECT: &str =
    "SELECT e.id, e.plate, e.occurred_at, e.guard, e.category, v.owner, v.unit
     FROM entries e
     LEFT JOIN vehicles v ON v.plate = e.plate";

fn entry_view_from_row(row: &Row) -> rusqlite::Result<EntryView> {
    let occurred_at: String = row.get(2)?;
    let occurred_at = NaiveDateTime::parse_from_str(&occurred_at, TIMESTAMP_FORMAT)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(EntryView {
        entry: Entry {
            id: row.get(0)?,
            plate: row.get(1)?,
            occurred_at,
            guard: row.get(3)?,
            category: row.get(4)?,
        },
        owner: row.get(5)?,
        unit: row.get(6)?,
    })
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Append one entry stamped with the site's current civil time.
///
/// Does not check authorization: callers gate on a successful lookup first
/// (see `GuardSession::confirm_entry`).
pub fn record_entry(
    conn: &Connection,
    clock: &dyn Clock,
    plate_input: &str,
    guard: &str,
    category: &str,
) -> AccessResult<Entry> {
    let plate = plate::canonicalize(plate_input);
    let occurred_at = clock.now();

    conn.execute(
        "INSERT INTO entries (plate, occurred_at, guard, category) VALUES (?1, ?2, ?3, ?4)",
        params![plate, format_timestamp(&occurred_at), guard, category],
    )?;

    let entry = Entry {
        id: conn.last_insert_rowid(),
        plate,
        occurred_at,
        guard: guard.to_string(),
        category: category.to_string(),
    };

    tracing::info!(
        id = entry.id,
        plate = %entry.plate,
        guard = %entry.guard,
        category = %entry.category,
        at = %format_timestamp(&entry.occurred_at),
        "Entry recorded"
    );

    Ok(entry)
}

/// All entries on one calendar date, newest first
pub fn entries_on(conn: &Connection, date: NaiveDate) -> AccessResult<Vec<EntryView>> {
    entries_between(conn, date, date)
}

/// Entries between two dates inclusive, newest first
pub fn entries_between(conn: &Connection, start: NaiveDate, end: NaiveDate) -> AccessResult<Vec<EntryView>> {
    if start > end {
        return Err(AccessError::InvalidRange { start, end });
    }

    let mut stmt = conn.prepare(&format!(
        "{}
         WHERE date(e.occurred_at) BETWEEN ?1 AND ?2
         ORDER BY e.occurred_at DESC, e.id DESC",
        ENTRY_VIEW_SELECT
    ))?;

    let entries = stmt
        .query_map(
            params![start.format(DATE_FORMAT).to_string(), end.format(DATE_FORMAT).to_string()],
            entry_view_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(%start, %end, count = entries.len(), "Entries queried");
    Ok(entries)
}

pub fn entries_today(conn: &Connection, clock: &dyn Clock) -> AccessResult<Vec<EntryView>> {
    entries_on(conn, clock.today())
}

/// History of one plate, newest first
pub fn entries_for_plate(conn: &Connection, plate_input: &str) -> AccessResult<Vec<EntryView>> {
    let mut stmt = conn.prepare(&format!(
        "{}
         WHERE e.plate = ?1
         ORDER BY e.occurred_at DESC, e.id DESC",
        ENTRY_VIEW_SELECT
    ))?;

    let entries = stmt
        .query_map(params![plate::canonicalize(plate_input)], entry_view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

pub fn count_entries_on(conn: &Connection, date: NaiveDate) -> AccessResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE date(occurred_at) = ?1",
        params![date.format(DATE_FORMAT).to_string()],
        |row| row.get(0),
    )?;

    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{parse_date, ManualClock};
    use crate::db::setup_database;
    use crate::vehicles::{deactivate_vehicle, register_vehicle, NewVehicle};

    fn setup() -> (Connection, ManualClock) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        (conn, ManualClock::at("2026-10-16 09:30:00").unwrap())
    }

    fn register(conn: &Connection, clock: &ManualClock, plate: &str, owner: &str, unit: &str) -> i64 {
        register_vehicle(
            conn,
            clock,
            &NewVehicle {
                plate: plate.to_string(),
                owner: owner.to_string(),
                unit: unit.to_string(),
                ..Default::default()
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_record_then_query_today() {
        let (conn, clock) = setup();
        register(&conn, &clock, "BBBB22", "Juan Perez", "101");

        let entry = record_entry(&conn, &clock, "bb-bb-22", "Ana", "Visita").unwrap();
        assert_eq!(entry.plate, "BBBB22");
        assert_eq!(format_timestamp(&entry.occurred_at), "2026-10-16 09:30:00");

        let today = entries_today(&conn, &clock).unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].entry, entry);
        assert_eq!(today[0].entry.category, "Visita");
        assert_eq!(today[0].owner.as_deref(), Some("Juan Perez"));
        assert_eq!(today[0].unit.as_deref(), Some("101"));
    }

    #[test]
    fn test_unknown_plate_joins_to_empty_metadata() {
        let (conn, clock) = setup();

        record_entry(&conn, &clock, "zz zz 99", "Ana", "Servicio").unwrap();

        let today = entries_today(&conn, &clock).unwrap();
        assert_eq!(today[0].entry.plate, "ZZZZ99");
        assert_eq!(today[0].owner, None);
        assert_eq!(today[0].unit, None);
    }

    #[test]
    fn test_inactive_vehicle_still_joins() {
        let (conn, clock) = setup();
        let id = register(&conn, &clock, "AB1234", "Maria", "Casa 5");
        record_entry(&conn, &clock, "AB1234", "Ana", "Residente").unwrap();
        deactivate_vehicle(&conn, id).unwrap();

        let today = entries_today(&conn, &clock).unwrap();
        assert_eq!(today[0].owner.as_deref(), Some("Maria"));
    }

    #[test]
    fn test_newest_first_and_no_dedup() {
        let (conn, clock) = setup();

        let first = record_entry(&conn, &clock, "BBBB22", "Ana", "Residente").unwrap();
        let second = record_entry(&conn, &clock, "BBBB22", "Ana", "Residente").unwrap();
        clock.advance(chrono::Duration::minutes(5));
        let third = record_entry(&conn, &clock, "AB1234", "Luis", "Visita").unwrap();

        let ids: Vec<_> = entries_today(&conn, &clock).unwrap().into_iter().map(|e| e.entry.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[test]
    fn test_date_and_range_queries() {
        let (conn, clock) = setup();

        clock.set(crate::clock::parse_timestamp("2026-10-14 23:59:59").unwrap());
        record_entry(&conn, &clock, "BBBB22", "Ana", "Residente").unwrap();
        clock.set(crate::clock::parse_timestamp("2026-10-15 00:00:00").unwrap());
        record_entry(&conn, &clock, "BBBB22", "Ana", "Residente").unwrap();
        clock.set(crate::clock::parse_timestamp("2026-10-16 12:00:00").unwrap());
        record_entry(&conn, &clock, "BBBB22", "Ana", "Residente").unwrap();

        let d14 = parse_date("2026-10-14").unwrap();
        let d15 = parse_date("2026-10-15").unwrap();
        let d16 = parse_date("2026-10-16").unwrap();

        assert_eq!(entries_on(&conn, d14).unwrap().len(), 1);
        assert_eq!(entries_on(&conn, d15).unwrap().len(), 1);
        assert_eq!(entries_between(&conn, d14, d15).unwrap().len(), 2);
        assert_eq!(entries_between(&conn, d14, d16).unwrap().len(), 3);
        assert_eq!(count_entries_on(&conn, d16).unwrap(), 1);
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let (conn, _clock) = setup();
        let start = parse_date("2026-10-16").unwrap();
        let end = parse_date("2026-10-01").unwrap();

        let err = entries_between(&conn, start, end).unwrap_err();
        assert!(matches!(err, AccessError::InvalidRange { .. }));
    }

    #[test]
    fn test_history_for_plate() {
        let (conn, clock) = setup();
        record_entry(&conn, &clock, "BBBB22", "Ana", "Residente").unwrap();
        record_entry(&conn, &clock, "AB1234", "Ana", "Visita").unwrap();
        record_entry(&conn, &clock, "BB-BB-22", "Luis", "Residente").unwrap();

        let history = entries_for_plate(&conn, "bb bb 22").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.entry.plate == "BBBB22"));
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("Visita".parse::<EntryCategory>().unwrap(), EntryCategory::Visitor);
        assert_eq!("service".parse::<EntryCategory>().unwrap(), EntryCategory::Service);
        assert_eq!(" RESIDENTE ".parse::<EntryCategory>().unwrap(), EntryCategory::Resident);
        assert!("Delivery".parse::<EntryCategory>().is_err());

        assert_eq!(EntryCategory::Service.next(), EntryCategory::Resident);
        assert_eq!(EntryCategory::Visitor.to_string(), "Visita");
    }
}
