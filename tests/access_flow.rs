// End-to-end flows over one in-memory register

use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use vehicle_access::{
    aggregate, daily_summary, deactivate_vehicle, entries_between, entries_on, list_all_vehicles,
    lookup_vehicle, reactivate_vehicle, record_entry, register_vehicle, setup_database,
    write_entries_csv, AccessError, Clock, EntryCategory, GuardSession, LookupOutcome,
    ManualClock, NewVehicle, VehicleStatus,
};

fn register() -> (Connection, ManualClock) {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    let clock = ManualClock::at("2026-10-16 08:00:00").unwrap();
    (conn, clock)
}

fn juan() -> NewVehicle {
    NewVehicle {
        plate: "bb-bb-22".to_string(),
        owner: "Juan Perez".to_string(),
        unit: "101".to_string(),
        make: "Toyota".to_string(),
        model: "Corolla".to_string(),
        color: "White".to_string(),
        phone: "+56912345678".to_string(),
        notes: String::new(),
    }
}

#[test]
fn registration_lookup_and_duplicate() {
    let (conn, clock) = register();

    let vehicle = register_vehicle(&conn, &clock, &juan()).unwrap();
    assert_eq!(vehicle.plate, "BBBB22");
    assert_eq!(vehicle.status, VehicleStatus::Active);
    assert_eq!(vehicle.notes, None);

    let found = lookup_vehicle(&conn, "BBBB22").unwrap().unwrap();
    assert_eq!(found.owner, "Juan Perez");
    assert_eq!(found.model.as_deref(), Some("Corolla"));

    let again = NewVehicle {
        plate: "BB BB 22".to_string(),
        ..juan()
    };
    match register_vehicle(&conn, &clock, &again) {
        Err(AccessError::DuplicatePlate(plate)) => assert_eq!(plate, "BBBB22"),
        other => panic!("expected duplicate, got {:?}", other),
    }
    assert_eq!(list_all_vehicles(&conn).unwrap().len(), 1);
}

#[test]
fn inactive_plate_stays_unique_and_hidden() {
    let (conn, clock) = register();
    let vehicle = register_vehicle(&conn, &clock, &juan()).unwrap();

    assert!(deactivate_vehicle(&conn, vehicle.id).unwrap());
    assert!(lookup_vehicle(&conn, "bb-bb-22").unwrap().is_none());
    assert!(matches!(
        register_vehicle(&conn, &clock, &juan()),
        Err(AccessError::DuplicatePlate(_))
    ));

    assert!(reactivate_vehicle(&conn, vehicle.id).unwrap());
    assert!(lookup_vehicle(&conn, "bb-bb-22").unwrap().is_some());
}

#[test]
fn guard_shift_feeds_daily_and_weekly_figures() {
    let (conn, clock) = register();
    register_vehicle(&conn, &clock, &juan()).unwrap();

    let mut session = GuardSession::new();
    session.sign_in("Ana").unwrap();

    clock.set(chrono::NaiveDateTime::parse_from_str("2026-10-16 09:15:00", "%Y-%m-%d %H:%M:%S").unwrap());
    assert!(session.lookup(&conn, "BBBB22").unwrap().is_authorized());
    let entry = session.confirm_entry(&conn, &clock, EntryCategory::Visitor).unwrap();
    assert_eq!(entry.category, "Visita");

    let today = entries_on(&conn, clock.today()).unwrap();
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].entry.category, "Visita");
    assert_eq!(today[0].owner.as_deref(), Some("Juan Perez"));

    let week = aggregate(&conn, &clock, 7, 10).unwrap();
    assert_eq!(week.total, 1);
    assert_eq!(week.top_plates[0].plate, "BBBB22");
    assert_eq!(week.peak_hour().unwrap().hour, 9);

    let summary = daily_summary(&conn, &clock).unwrap();
    assert_eq!(summary.entries_today, 1);
    assert_eq!(summary.authorized_vehicles, 1);
}

#[test]
fn unknown_plate_is_never_logged_through_a_session() {
    let (conn, clock) = register();
    let mut session = GuardSession::new();
    session.sign_in("Ana").unwrap();

    let outcome = session.lookup(&conn, "zz-zz-99").unwrap().clone();
    assert_eq!(outcome, LookupOutcome::NotAuthorized { plate: "ZZZZ99".to_string() });
    assert!(matches!(
        session.confirm_entry(&conn, &clock, EntryCategory::Resident),
        Err(AccessError::NoAuthorizedLookup)
    ));
    assert!(entries_on(&conn, clock.today()).unwrap().is_empty());
}

#[test]
fn one_day_window_tracks_new_entries() {
    let (conn, clock) = register();

    let before = aggregate(&conn, &clock, 1, 5).unwrap().total;
    record_entry(&conn, &clock, "AB-12-34", "Luis", "Servicio").unwrap();
    let after = aggregate(&conn, &clock, 1, 5).unwrap().total;

    assert_eq!(after, before + 1);
}

#[test]
fn entries_outside_the_window_are_not_counted() {
    let (conn, clock) = register();

    record_entry(&conn, &clock, "AB1234", "Luis", "Residente").unwrap();
    clock.advance(Duration::days(8));
    record_entry(&conn, &clock, "AB1234", "Luis", "Residente").unwrap();

    assert_eq!(aggregate(&conn, &clock, 7, 5).unwrap().total, 1);
    assert_eq!(aggregate(&conn, &clock, 30, 5).unwrap().total, 2);
    assert!(aggregate(&conn, &clock, 0, 5).is_err());
}

#[test]
fn range_queries_and_export() {
    let (conn, clock) = register();
    register_vehicle(&conn, &clock, &juan()).unwrap();

    record_entry(&conn, &clock, "BBBB22", "Ana", "Residente").unwrap();
    clock.advance(Duration::days(1));
    record_entry(&conn, &clock, "ZZZZ99", "Ana", "Visita").unwrap();

    let start = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    let end = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();

    let both = entries_between(&conn, start, end).unwrap();
    assert_eq!(both.len(), 2);
    assert_eq!(both[0].entry.plate, "ZZZZ99");

    assert!(matches!(
        entries_between(&conn, end, start),
        Err(AccessError::InvalidRange { .. })
    ));

    let mut out = Vec::new();
    write_entries_csv(&mut out, &both).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("BBBB22,2026-10-16 08:00:00,Ana,Residente,Juan Perez,101"));
    assert!(text.contains("ZZZZ99,2026-10-17 08:00:00,Ana,Visita,,"));
}
