// 👮 Guard session - per-terminal interaction state
//
// Holds what the guard is currently looking at (last lookup, pending
// confirmations, list filters). Nothing here is persisted; dropping the session
// loses it, which is the point.

use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};
use crate::ledger::{record_entry, Entry, EntryCategory};
use crate::plate;
use crate::validation::validate_guard_name;
use crate::vehicles::{lookup_vehicle, set_vehicle_status, Vehicle, VehicleFilter, VehicleStatus};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Result of the last plate check shown to the guard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LookupOutcome {
    Authorized { vehicle: Vehicle },
    NotAuthorized { plate: String },
}

impl LookupOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, LookupOutcome::Authorized { .. })
    }

    pub fn plate(&self) -> &str {
        match self {
            LookupOutcome::Authorized { vehicle } => &vehicle.plate,
            LookupOutcome::NotAuthorized { plate } => plate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuardSession {
    id: Uuid,
    guard: Option<String>,
    lookup: Option<LookupOutcome>,
    pending_status_changes: BTreeSet<i64>,
    pub vehicle_filter: VehicleFilter,
    pub auto_refresh: bool,
}

impl Default for GuardSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            guard: None,
            lookup: None,
            pending_status_changes: BTreeSet::new(),
            vehicle_filter: VehicleFilter::default(),
            auto_refresh: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn guard(&self) -> Option<&str> {
        self.guard.as_deref()
    }

    /// Set the guard on duty. A blank name signs the guard out.
    /// A different guard never inherits the previous guard's lookup.
    pub fn sign_in(&mut self, name: &str) -> AccessResult<&str> {
        match validate_guard_name(name) {
            Ok(name) => {
                if self.guard.as_deref() != Some(name.as_str()) {
                    self.lookup = None;
                }
                tracing::info!(session = %self.id, guard = %name, "Guard on duty");
                self.guard = Some(name);
                Ok(self.guard.as_deref().unwrap_or_default())
            }
            Err(e) => {
                self.guard = None;
                self.lookup = None;
                Err(AccessError::Validation(vec![e]))
            }
        }
    }

    fn require_guard(&self) -> AccessResult<&str> {
        self.guard
            .as_deref()
            .ok_or_else(|| AccessError::invalid("guard", "Enter the guard on duty before continuing"))
    }

    pub fn current_lookup(&self) -> Option<&LookupOutcome> {
        self.lookup.as_ref()
    }

    /// Check a plate and remember the outcome for confirmation.
    ///
    /// Any earlier unconfirmed outcome is replaced.
    pub fn lookup(&mut self, conn: &Connection, plate_input: &str) -> AccessResult<&LookupOutcome> {
        self.require_guard()?;

        let canonical = plate::canonicalize(plate_input);
        if canonical.is_empty() {
            self.lookup = None;
            return Err(AccessError::invalid("plate", "Enter a plate to check"));
        }

        let outcome = match lookup_vehicle(conn, &canonical)? {
            Some(vehicle) => LookupOutcome::Authorized { vehicle },
            None => LookupOutcome::NotAuthorized { plate: canonical },
        };

        tracing::info!(
            session = %self.id,
            plate = %outcome.plate(),
            authorized = outcome.is_authorized(),
            "Plate checked"
        );

        Ok(self.lookup.insert(outcome))
    }

    /// Log the entry for the vehicle currently shown as authorized.
    ///
    /// The authorized lookup is consumed, so one check gates exactly one entry.
    /// The ledger write does not re-check the vehicle's status.
    pub fn confirm_entry(&mut self, conn: &Connection, clock: &dyn Clock, category: EntryCategory) -> AccessResult<Entry> {
        let guard = self.require_guard()?.to_string();

        let vehicle = match self.lookup.take() {
            Some(LookupOutcome::Authorized { vehicle }) => vehicle,
            other => {
                self.lookup = other;
                return Err(AccessError::NoAuthorizedLookup);
            }
        };

        match record_entry(conn, clock, &vehicle.plate, &guard, category.label()) {
            Ok(entry) => Ok(entry),
            Err(e) => {
                // Keep the lookup on screen so the guard can retry
                self.lookup = Some(LookupOutcome::Authorized { vehicle });
                Err(e)
            }
        }
    }

    pub fn clear_lookup(&mut self) {
        self.lookup = None;
    }

    // ------------------------------------------------------------------------
    // Two-step status changes (mark, then confirm)
    // ------------------------------------------------------------------------

    pub fn request_status_change(&mut self, vehicle_id: i64) {
        self.pending_status_changes.insert(vehicle_id);
    }

    pub fn cancel_status_change(&mut self, vehicle_id: i64) {
        self.pending_status_changes.remove(&vehicle_id);
    }

    pub fn is_status_change_pending(&self, vehicle_id: i64) -> bool {
        self.pending_status_changes.contains(&vehicle_id)
    }

    /// Apply a previously requested status change. Returns `Ok(false)` when
    /// nothing was pending for this vehicle or the vehicle does not exist.
    pub fn confirm_status_change(&mut self, conn: &Connection, vehicle_id: i64, status: VehicleStatus) -> AccessResult<bool> {
        if !self.pending_status_changes.remove(&vehicle_id) {
            return Ok(false);
        }

        let changed = set_vehicle_status(conn, vehicle_id, status)?;

        // A vehicle deactivated while on screen must not stay confirmable
        let on_screen = matches!(
            &self.lookup,
            Some(LookupOutcome::Authorized { vehicle }) if vehicle.id == vehicle_id
        );
        if status == VehicleStatus::Inactive && on_screen {
            self.lookup = None;
        }

        Ok(changed)
    }

    pub fn toggle_auto_refresh(&mut self) -> bool {
        self.auto_refresh = !self.auto_refresh;
        self.auto_refresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::setup_database;
    use crate::ledger::entries_today;
    use crate::vehicles::{register_vehicle, NewVehicle};

    fn setup() -> (Connection, ManualClock, i64) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let clock = ManualClock::at("2026-10-16 07:45:00").unwrap();
        let vehicle = register_vehicle(
            &conn,
            &clock,
            &NewVehicle {
                plate: "BB-BB-22".to_string(),
                owner: "Juan Perez".to_string(),
                unit: "101".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        (conn, clock, vehicle.id)
    }

    #[test]
    fn test_lookup_requires_guard() {
        let (conn, _clock, _) = setup();
        let mut session = GuardSession::new();

        let err = session.lookup(&conn, "BBBB22").unwrap_err();
        assert_eq!(err.field_errors()[0].field, "guard");
        assert!(session.current_lookup().is_none());
    }

    #[test]
    fn test_blank_sign_in_signs_out() {
        let mut session = GuardSession::new();
        session.sign_in("Ana").unwrap();
        assert_eq!(session.guard(), Some("Ana"));

        assert!(session.sign_in("  ").is_err());
        assert_eq!(session.guard(), None);
    }

    #[test]
    fn test_guard_change_drops_previous_lookup() {
        let (conn, clock, _) = setup();
        let mut session = GuardSession::new();
        session.sign_in("Ana").unwrap();
        assert!(session.lookup(&conn, "BBBB22").unwrap().is_authorized());

        // Same guard again keeps the pending authorization
        session.sign_in("Ana").unwrap();
        assert!(session.current_lookup().is_some());

        session.sign_in("Luis").unwrap();
        assert!(session.current_lookup().is_none());
        assert!(matches!(
            session.confirm_entry(&conn, &clock, EntryCategory::Resident),
            Err(AccessError::NoAuthorizedLookup)
        ));
        assert!(entries_today(&conn, &clock).unwrap().is_empty());
    }

    #[test]
    fn test_one_lookup_gates_one_entry() {
        let (conn, clock, _) = setup();
        let mut session = GuardSession::new();
        session.sign_in("Ana").unwrap();

        assert!(session.lookup(&conn, "bbbb22").unwrap().is_authorized());

        let entry = session.confirm_entry(&conn, &clock, EntryCategory::Visitor).unwrap();
        assert_eq!(entry.plate, "BBBB22");
        assert_eq!(entry.guard, "Ana");
        assert_eq!(entry.category, "Visita");

        // Second confirm without a new check is refused
        assert!(matches!(
            session.confirm_entry(&conn, &clock, EntryCategory::Visitor).unwrap_err(),
            AccessError::NoAuthorizedLookup
        ));
        assert_eq!(entries_today(&conn, &clock).unwrap().len(), 1);
    }

    #[test]
    fn test_unauthorized_lookup_cannot_be_confirmed() {
        let (conn, clock, _) = setup();
        let mut session = GuardSession::new();
        session.sign_in("Ana").unwrap();

        let outcome = session.lookup(&conn, "ZZ-ZZ-99").unwrap();
        assert_eq!(outcome, &LookupOutcome::NotAuthorized { plate: "ZZZZ99".to_string() });

        assert!(session.confirm_entry(&conn, &clock, EntryCategory::Resident).is_err());
        // The negative result stays on screen
        assert!(session.current_lookup().is_some());
        assert!(entries_today(&conn, &clock).unwrap().is_empty());
    }

    #[test]
    fn test_empty_plate_lookup() {
        let (conn, _clock, _) = setup();
        let mut session = GuardSession::new();
        session.sign_in("Ana").unwrap();

        assert!(session.lookup(&conn, "   ").is_err());
    }

    #[test]
    fn test_status_change_needs_request_first() {
        let (conn, _clock, id) = setup();
        let mut session = GuardSession::new();

        assert!(!session.confirm_status_change(&conn, id, VehicleStatus::Inactive).unwrap());
        assert!(lookup_vehicle(&conn, "BBBB22").unwrap().is_some());

        session.request_status_change(id);
        assert!(session.is_status_change_pending(id));
        session.cancel_status_change(id);
        assert!(!session.confirm_status_change(&conn, id, VehicleStatus::Inactive).unwrap());

        session.request_status_change(id);
        assert!(session.confirm_status_change(&conn, id, VehicleStatus::Inactive).unwrap());
        assert!(!session.is_status_change_pending(id));
        assert!(lookup_vehicle(&conn, "BBBB22").unwrap().is_none());
    }

    #[test]
    fn test_deactivation_drops_pending_authorization() {
        let (conn, clock, id) = setup();
        let mut session = GuardSession::new();
        session.sign_in("Ana").unwrap();
        session.lookup(&conn, "BBBB22").unwrap();

        session.request_status_change(id);
        session.confirm_status_change(&conn, id, VehicleStatus::Inactive).unwrap();

        assert!(session.current_lookup().is_none());
        assert!(session.confirm_entry(&conn, &clock, EntryCategory::Resident).is_err());
    }

    #[test]
    fn test_auto_refresh_toggle() {
        let mut session = GuardSession::new();
        assert!(session.toggle_auto_refresh());
        assert!(!session.toggle_auto_refresh());
    }
}
