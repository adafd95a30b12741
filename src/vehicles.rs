// 🚗 Authorization Store - who may come in
//
// Vehicles are never deleted. Deactivating flips the status and keeps the row
// (and therefore the entry history join) intact; reactivating flips it back.

use crate::clock::{format_timestamp, Clock, TIMESTAMP_FORMAT};
use crate::error::{AccessError, AccessResult};
use crate::plate;
use crate::validation::validate_registration;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Active,
    Inactive,
}

impl VehicleStatus {
    /// Value of the `active` column
    pub fn as_flag(&self) -> i64 {
        match self {
            VehicleStatus::Active => 1,
            VehicleStatus::Inactive => 0,
        }
    }

    pub fn from_flag(flag: i64) -> Self {
        if flag == 0 {
            VehicleStatus::Inactive
        } else {
            VehicleStatus::Active
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Active => "active",
            VehicleStatus::Inactive => "inactive",
        }
    }
}

// ============================================================================
// VEHICLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    /// Canonical plate (upper case, no separators)
    pub plate: String,
    pub owner: String,
    pub unit: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub phone: Option<String>,
    pub registered_at: NaiveDateTime,
    pub status: VehicleStatus,
    pub notes: Option<String>,
}

impl Vehicle {
    pub fn is_active(&self) -> bool {
        self.status == VehicleStatus::Active
    }
}

/// Registration form as submitted by the administrator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVehicle {
    pub plate: String,
    pub owner: String,
    pub unit: String,
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub notes: String,
}

const VEHICLE_COLUMNS: &str =
    "id, plate, owner, unit, make, model, color, phone, registered_at, active, notes";

fn vehicle_from_row(row: &Row) -> rusqlite::Result<Vehicle> {
    let registered_at: String = row.get(8)?;
    let registered_at = NaiveDateTime::parse_from_str(&registered_at, TIMESTAMP_FORMAT)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Vehicle {
        id: row.get(0)?,
        plate: row.get(1)?,
        owner: row.get(2)?,
        unit: row.get(3)?,
        make: row.get(4)?,
        model: row.get(5)?,
        color: row.get(6)?,
        phone: row.get(7)?,
        registered_at,
        status: VehicleStatus::from_flag(row.get(9)?),
        notes: row.get(10)?,
    })
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Register a new authorized vehicle.
///
/// Validation runs first; uniqueness is left to the `plate` UNIQUE constraint
/// so two terminals racing on the same plate still get exactly one record.
pub fn register_vehicle(conn: &Connection, clock: &dyn Clock, form: &NewVehicle) -> AccessResult<Vehicle> {
    let plate = validate_registration(form).map_err(|errors| {
        tracing::warn!(plate = %form.plate, ?errors, "Rejected vehicle registration");
        AccessError::Validation(errors)
    })?;

    let registered_at = clock.now();

    let result = conn.execute(
        "INSERT INTO vehicles (plate, owner, unit, make, model, color, phone, registered_at, active, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            plate.as_str(),
            form.owner.trim(),
            form.unit.trim(),
            optional(&form.make),
            optional(&form.model),
            optional(&form.color),
            optional(&form.phone),
            format_timestamp(&registered_at),
            VehicleStatus::Active.as_flag(),
            optional(&form.notes),
        ],
    );

    match result {
        Ok(_) => {
            let id = conn.last_insert_rowid();
            tracing::info!(id, plate = %plate, unit = %form.unit.trim(), "Vehicle registered");

            Ok(Vehicle {
                id,
                plate: plate.as_str().to_string(),
                owner: form.owner.trim().to_string(),
                unit: form.unit.trim().to_string(),
                make: optional(&form.make),
                model: optional(&form.model),
                color: optional(&form.color),
                phone: optional(&form.phone),
                registered_at,
                status: VehicleStatus::Active,
                notes: optional(&form.notes),
            })
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            tracing::warn!(plate = %plate, "Duplicate plate registration");
            Err(AccessError::DuplicatePlate(plate.as_str().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Authorization check: the active record for this plate, if any.
///
/// An inactive record is reported exactly like an unknown plate.
pub fn lookup_vehicle(conn: &Connection, plate_input: &str) -> AccessResult<Option<Vehicle>> {
    let canonical = plate::canonicalize(plate_input);
    if canonical.is_empty() {
        return Ok(None);
    }

    let vehicle = conn
        .query_row(
            &format!("SELECT {} FROM vehicles WHERE plate = ?1 AND active = ?2", VEHICLE_COLUMNS),
            params![canonical, VehicleStatus::Active.as_flag()],
            vehicle_from_row,
        )
        .optional()?;

    tracing::debug!(plate = %canonical, authorized = vehicle.is_some(), "Plate lookup");
    Ok(vehicle)
}

/// Fetch one record by id, whatever its status
pub fn get_vehicle(conn: &Connection, id: i64) -> AccessResult<Option<Vehicle>> {
    let vehicle = conn
        .query_row(
            &format!("SELECT {} FROM vehicles WHERE id = ?1", VEHICLE_COLUMNS),
            params![id],
            vehicle_from_row,
        )
        .optional()?;

    Ok(vehicle)
}

/// Set the status of a vehicle. Idempotent.
///
/// Returns `false` when no vehicle has this id.
pub fn set_vehicle_status(conn: &Connection, id: i64, status: VehicleStatus) -> AccessResult<bool> {
    let matched = conn.execute(
        "UPDATE vehicles SET active = ?1 WHERE id = ?2",
        params![status.as_flag(), id],
    )?;

    if matched > 0 {
        tracing::info!(id, status = status.as_str(), "Vehicle status set");
    } else {
        tracing::warn!(id, status = status.as_str(), "Status change for unknown vehicle");
    }

    Ok(matched > 0)
}

pub fn deactivate_vehicle(conn: &Connection, id: i64) -> AccessResult<bool> {
    set_vehicle_status(conn, id, VehicleStatus::Inactive)
}

pub fn reactivate_vehicle(conn: &Connection, id: i64) -> AccessResult<bool> {
    set_vehicle_status(conn, id, VehicleStatus::Active)
}

/// Active vehicles, most recently registered first
pub fn list_active_vehicles(conn: &Connection) -> AccessResult<Vec<Vehicle>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM vehicles
         WHERE active = ?1
         ORDER BY registered_at DESC, id DESC",
        VEHICLE_COLUMNS
    ))?;

    let vehicles = stmt
        .query_map(params![VehicleStatus::Active.as_flag()], vehicle_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(vehicles)
}

/// Every vehicle: active ones first, each group most recently registered first
pub fn list_all_vehicles(conn: &Connection) -> AccessResult<Vec<Vehicle>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM vehicles
         ORDER BY active DESC, registered_at DESC, id DESC",
        VEHICLE_COLUMNS
    ))?;

    let vehicles = stmt
        .query_map([], vehicle_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(vehicles)
}

pub fn count_active_vehicles(conn: &Connection) -> AccessResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM vehicles WHERE active = ?1",
        params![VehicleStatus::Active.as_flag()],
        |row| row.get(0),
    )?;

    Ok(count)
}

// ============================================================================
// LIST FILTERS
// ============================================================================

/// Substring filters of the vehicle list screen. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleFilter {
    #[serde(default)]
    pub plate: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub owner: String,
}

impl VehicleFilter {
    pub fn is_empty(&self) -> bool {
        self.plate.trim().is_empty() && self.unit.trim().is_empty() && self.owner.trim().is_empty()
    }

    pub fn matches(&self, vehicle: &Vehicle) -> bool {
        let plate = plate::canonicalize(&self.plate);
        if !plate.is_empty() && !vehicle.plate.contains(&plate) {
            return false;
        }

        let unit = self.unit.trim().to_lowercase();
        if !unit.is_empty() && !vehicle.unit.to_lowercase().contains(&unit) {
            return false;
        }

        let owner = self.owner.trim().to_lowercase();
        if !owner.is_empty() && !vehicle.owner.to_lowercase().contains(&owner) {
            return false;
        }

        true
    }

    pub fn apply(&self, vehicles: &[Vehicle]) -> Vec<Vehicle> {
        vehicles.iter().filter(|v| self.matches(v)).cloned().collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
