// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use std::path::PathBuf;

use vehicle_access::clock::{format_timestamp, parse_date};
use vehicle_access::logging::{init_logging, LogTarget};
use vehicle_access::{
    aggregate, daily_summary, entries_between, entries_for_plate, entries_on, export_entries_to_dir,
    export_vehicles_to_dir, list_active_vehicles, list_all_vehicles, lookup_vehicle, open_database,
    register_vehicle, set_vehicle_status, table_counts, AppConfig, Clock, EntryCategory, EntryView,
    GuardSession, LookupOutcome, NewVehicle, SiteClock, StatsPeriod, Vehicle, VehicleFilter,
    VehicleStatus,
};

#[derive(Parser)]
#[command(name = "vehicle-access", version, about = "Vehicle access register for the condominium gate")]
struct Cli {
    /// Database file (overrides configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive guard and admin screens (default)
    Tui,

    /// Check whether a plate is authorized
    Check { plate: String },

    /// Check a plate and log the entry if it is authorized
    Enter {
        plate: String,
        /// Guard on duty
        #[arg(long)]
        guard: String,
        /// Residente, Visita or Servicio
        #[arg(long, default_value = "Residente")]
        category: String,
    },

    /// Register an authorized vehicle
    Register {
        plate: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        unit: String,
        #[arg(long)]
        make: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Revoke a vehicle's authorization
    Deactivate { id: i64 },

    /// Restore a vehicle's authorization
    Reactivate { id: i64 },

    /// List vehicles (active only unless --all)
    List {
        #[arg(long)]
        all: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// List entries of one day (default today) or an inclusive date range
    Entries {
        #[arg(long, conflicts_with_all = ["from", "to", "plate"])]
        date: Option<String>,
        #[arg(long, requires = "to")]
        from: Option<String>,
        #[arg(long, requires = "from")]
        to: Option<String>,
        /// History of one plate instead of a date window
        #[arg(long, conflicts_with_all = ["from", "to"])]
        plate: Option<String>,
    },

    /// Entry statistics over a window ending today
    Stats {
        #[arg(long, conflicts_with = "period")]
        days: Option<u32>,
        /// daily, weekly or monthly
        #[arg(long)]
        period: Option<String>,
        #[arg(long)]
        top: Option<usize>,
    },

    /// Write a CSV file into the export directory
    Export {
        #[arg(value_enum)]
        kind: ExportArg,
        /// Include inactive vehicles (vehicles export)
        #[arg(long)]
        all: bool,
        /// Day to export (entries export, default today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Database and today's summary
    Status,
}

#[derive(clap::Args)]
struct FilterArgs {
    #[arg(long)]
    plate: Option<String>,
    #[arg(long)]
    unit: Option<String>,
    #[arg(long)]
    owner: Option<String>,
}

impl From<FilterArgs> for VehicleFilter {
    fn from(args: FilterArgs) -> Self {
        VehicleFilter {
            plate: args.plate.unwrap_or_default(),
            unit: args.unit.unwrap_or_default(),
            owner: args.owner.unwrap_or_default(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportArg {
    Vehicles,
    Entries,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    let command = cli.command.unwrap_or(Commands::Tui);

    let target = match command {
        Commands::Tui => LogTarget::File,
        _ => LogTarget::Stderr,
    };
    let _log_guard = init_logging(&config.logging, target)?;

    let clock = SiteClock::from_offset(config.site.utc_offset.as_deref())?;
    let conn = open_database(&config.database.path)?;

    match command {
        Commands::Tui => run_ui_mode(&conn, &clock, &config),
        Commands::Check { plate } => run_check(&conn, &plate),
        Commands::Enter { plate, guard, category } => run_enter(&conn, &clock, &plate, &guard, &category),
        Commands::Register {
            plate,
            owner,
            unit,
            make,
            model,
            color,
            phone,
            notes,
        } => {
            let form = NewVehicle {
                plate,
                owner,
                unit,
                make: make.unwrap_or_default(),
                model: model.unwrap_or_default(),
                color: color.unwrap_or_default(),
                phone: phone.unwrap_or_default(),
                notes: notes.unwrap_or_default(),
            };
            run_register(&conn, &clock, &form)
        }
        Commands::Deactivate { id } => run_status_change(&conn, id, VehicleStatus::Inactive),
        Commands::Reactivate { id } => run_status_change(&conn, id, VehicleStatus::Active),
        Commands::List { all, filter } => run_list(&conn, all, filter.into()),
        Commands::Entries { date, from, to, plate } => run_entries(&conn, &clock, date, from, to, plate),
        Commands::Stats { days, period, top } => {
            let window_days = match (days, period) {
                (Some(days), _) => days,
                (None, Some(period)) => period.parse::<StatsPeriod>()?.window_days(),
                (None, None) => StatsPeriod::Weekly.window_days(),
            };
            run_stats(&conn, &clock, window_days, top.unwrap_or(config.reporting.top_vehicles))
        }
        Commands::Export { kind, all, date, dir } => {
            let dir = dir.unwrap_or_else(|| config.reporting.export_dir.clone());
            run_export(&conn, &clock, kind, all, date, &dir)
        }
        Commands::Status => run_status(&conn, &clock, &config),
    }
}

fn run_check(conn: &Connection, plate: &str) -> Result<()> {
    match lookup_vehicle(conn, plate)? {
        Some(vehicle) => {
            println!("✅ AUTHORIZED  {}", vehicle.plate);
            print_vehicle_detail(&vehicle);
        }
        None => {
            println!("⛔ NOT AUTHORIZED  {}", vehicle_access::plate::canonicalize(plate));
            std::process::exit(1);
        }
    }
    Ok(())
}

fn run_enter(conn: &Connection, clock: &dyn Clock, plate: &str, guard: &str, category: &str) -> Result<()> {
    let category: EntryCategory = category.parse()?;

    let mut session = GuardSession::new();
    session.sign_in(guard)?;

    match session.lookup(conn, plate)? {
        LookupOutcome::Authorized { vehicle } => {
            println!("✅ AUTHORIZED  {} ({}, unit {})", vehicle.plate, vehicle.owner, vehicle.unit);
        }
        LookupOutcome::NotAuthorized { plate } => {
            println!("⛔ NOT AUTHORIZED  {}", plate);
            println!("   No entry logged.");
            std::process::exit(1);
        }
    }

    let entry = session.confirm_entry(conn, clock, category)?;
    println!(
        "📝 Entry #{} logged at {} by {} ({})",
        entry.id,
        format_timestamp(&entry.occurred_at),
        entry.guard,
        entry.category
    );
    Ok(())
}

fn run_register(conn: &Connection, clock: &dyn Clock, form: &NewVehicle) -> Result<()> {
    let vehicle = register_vehicle(conn, clock, form)?;
    println!("✓ Registered vehicle #{}", vehicle.id);
    print_vehicle_detail(&vehicle);
    Ok(())
}

fn run_status_change(conn: &Connection, id: i64, status: VehicleStatus) -> Result<()> {
    if !set_vehicle_status(conn, id, status)? {
        eprintln!("❌ No vehicle with id {}", id);
        std::process::exit(1);
    }
    println!("✓ Vehicle #{} is now {}", id, status.as_str());
    Ok(())
}

fn run_list(conn: &Connection, all: bool, filter: VehicleFilter) -> Result<()> {
    let vehicles = if all {
        list_all_vehicles(conn)?
    } else {
        list_active_vehicles(conn)?
    };
    let vehicles = filter.apply(&vehicles);

    println!(
        "{:<5} {:<8} {:<24} {:<8} {:<20} {:<10} {}",
        "ID", "PLATE", "OWNER", "UNIT", "VEHICLE", "STATUS", "REGISTERED"
    );
    for v in &vehicles {
        println!(
            "{:<5} {:<8} {:<24} {:<8} {:<20} {:<10} {}",
            v.id,
            v.plate,
            truncate(&v.owner, 24),
            truncate(&v.unit, 8),
            truncate(&describe_vehicle(v), 20),
            v.status.as_str(),
            format_timestamp(&v.registered_at)
        );
    }
    println!("\n{} vehicle(s)", vehicles.len());
    Ok(())
}

fn run_entries(
    conn: &Connection,
    clock: &dyn Clock,
    date: Option<String>,
    from: Option<String>,
    to: Option<String>,
    plate: Option<String>,
) -> Result<()> {
    let entries = match (date, from, to, plate) {
        (_, _, _, Some(plate)) => entries_for_plate(conn, &plate)?,
        (Some(date), _, _, None) => entries_on(conn, parse_date(&date)?)?,
        (None, Some(from), Some(to), None) => entries_between(conn, parse_date(&from)?, parse_date(&to)?)?,
        _ => entries_on(conn, clock.today())?,
    };

    print_entries(&entries);
    Ok(())
}

fn run_stats(conn: &Connection, clock: &dyn Clock, window_days: u32, top: usize) -> Result<()> {
    let stats = aggregate(conn, clock, window_days, top)?;

    println!("📊 Entries {} → {} ({} day window)", stats.start, stats.end, stats.window_days);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total entries: {}", stats.total);

    if let Some(peak) = stats.peak_hour() {
        println!("Peak hour:     {:02}:00 ({} entries)", peak.hour, peak.count);
    }
    if let Some(day) = stats.busiest_day() {
        println!("Busiest day:   {} ({} entries)", day.date, day.count);
    }

    if !stats.per_category.is_empty() {
        println!("\nBy category:");
        for c in &stats.per_category {
            println!("  {:<12} {:>5}", c.category, c.count);
        }
    }

    if !stats.per_day.is_empty() {
        println!("\nBy day:");
        for d in &stats.per_day {
            println!("  {}  {:>5}", d.date, d.count);
        }
    }

    if !stats.top_plates.is_empty() {
        println!("\nTop vehicles:");
        for (i, p) in stats.top_plates.iter().enumerate() {
            println!(
                "  {:>2}. {:<8} {:>5}  {} {}",
                i + 1,
                p.plate,
                p.count,
                p.owner.as_deref().unwrap_or("-"),
                p.unit.as_deref().map(|u| format!("(unit {})", u)).unwrap_or_default()
            );
        }
    }

    Ok(())
}

fn run_export(
    conn: &Connection,
    clock: &dyn Clock,
    kind: ExportArg,
    all: bool,
    date: Option<String>,
    dir: &std::path::Path,
) -> Result<()> {
    let today = clock.today();

    let path = match kind {
        ExportArg::Vehicles => {
            let vehicles = if all {
                list_all_vehicles(conn)?
            } else {
                list_active_vehicles(conn)?
            };
            export_vehicles_to_dir(dir, today, &vehicles, all)?
        }
        ExportArg::Entries => {
            let day = match date {
                Some(raw) => parse_date(&raw)?,
                None => today,
            };
            let entries = entries_on(conn, day)?;
            export_entries_to_dir(dir, day, &entries)?
        }
    };

    println!("✓ Exported to {}", path.display());
    Ok(())
}

fn run_status(conn: &Connection, clock: &dyn Clock, config: &AppConfig) -> Result<()> {
    let (vehicles, entries) = table_counts(conn)?;
    let summary = daily_summary(conn, clock)?;

    println!("🏢 {}", config.site.name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Database:            {}", config.database.path.display());
    println!("Vehicles on record:  {}", vehicles);
    println!("Authorized vehicles: {}", summary.authorized_vehicles);
    println!("Entries logged:      {}", entries);
    println!("Entries today:       {} ({})", summary.entries_today, summary.date);
    Ok(())
}

fn print_vehicle_detail(v: &Vehicle) {
    println!("   Owner:      {}", v.owner);
    println!("   Unit:       {}", v.unit);
    let description = describe_vehicle(v);
    if !description.is_empty() {
        println!("   Vehicle:    {}", description);
    }
    if let Some(phone) = &v.phone {
        println!("   Phone:      {}", phone);
    }
    if let Some(notes) = &v.notes {
        println!("   Notes:      {}", notes);
    }
    println!("   Registered: {}", format_timestamp(&v.registered_at));
}

fn print_entries(entries: &[EntryView]) {
    println!(
        "{:<20} {:<8} {:<10} {:<16} {:<24} {}",
        "TIME", "PLATE", "CATEGORY", "GUARD", "OWNER", "UNIT"
    );
    for e in entries {
        println!(
            "{:<20} {:<8} {:<10} {:<16} {:<24} {}",
            format_timestamp(&e.entry.occurred_at),
            e.entry.plate,
            e.entry.category,
            truncate(&e.entry.guard, 16),
            truncate(e.owner.as_deref().unwrap_or("-"), 24),
            e.unit.as_deref().unwrap_or("-")
        );
    }
    println!("\n{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
}

fn describe_vehicle(v: &Vehicle) -> String {
    [&v.make, &v.model, &v.color]
        .iter()
        .filter_map(|part| part.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(conn: &Connection, clock: &dyn Clock, config: &AppConfig) -> Result<()> {
    tracing::info!(path = ?config.database.path, "Starting terminal UI");

    let mut app = ui::App::new(conn, clock, ui::UiSettings::from(config));
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_conn: &Connection, _clock: &dyn Clock, _config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the HTTP API: cargo run --bin access-server --features server");
    std::process::exit(1);
}
