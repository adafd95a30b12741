// Vehicle Access Register - Core Library
// Exposes all modules for use in CLI, TUI, API server, and tests

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ledger;
pub mod logging;
pub mod plate;
pub mod session;
pub mod stats;
pub mod validation;
pub mod vehicles;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SiteClock};
pub use config::AppConfig;
pub use db::{open_database, setup_database, table_counts};
pub use error::{AccessError, AccessResult, FieldError};
pub use export::{
    export_entries_to_dir, export_filename, export_vehicles_to_dir,
    write_entries_csv, write_vehicles_csv, ExportKind,
};
pub use ledger::{
    count_entries_on, entries_between, entries_for_plate, entries_on, entries_today,
    record_entry, Entry, EntryCategory, EntryView,
};
pub use plate::{Plate, PlateFormat};
pub use session::{GuardSession, LookupOutcome};
pub use stats::{aggregate, daily_summary, DailySummary, EntryStats, StatsPeriod};
pub use vehicles::{
    count_active_vehicles, deactivate_vehicle, get_vehicle, list_active_vehicles,
    list_all_vehicles, lookup_vehicle, reactivate_vehicle, register_vehicle,
    set_vehicle_status, NewVehicle, Vehicle, VehicleFilter, VehicleStatus,
};
