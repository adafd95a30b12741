// 📤 CSV export of the current result sets

use crate::clock::format_timestamp;
use crate::error::AccessResult;
use crate::ledger::EntryView;
use crate::vehicles::Vehicle;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Vehicles,
    Entries,
}

impl ExportKind {
    fn prefix(&self) -> &'static str {
        match self {
            ExportKind::Vehicles => "vehiculos_autorizados",
            ExportKind::Entries => "registro_ingresos",
        }
    }
}

/// `vehiculos_autorizados_20261016.csv` style name for a download made on `date`
pub fn export_filename(kind: ExportKind, date: NaiveDate) -> String {
    format!("{}_{}.csv", kind.prefix(), date.format("%Y%m%d"))
}

#[derive(Debug, Serialize)]
struct VehicleRow<'a> {
    plate: &'a str,
    owner: &'a str,
    unit: &'a str,
    make: &'a str,
    model: &'a str,
    color: &'a str,
    phone: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    active: Option<bool>,
}

#[derive(Debug, Serialize)]
struct EntryRow<'a> {
    plate: &'a str,
    occurred_at: String,
    guard: &'a str,
    category: &'a str,
    owner: &'a str,
    unit: &'a str,
}

/// Write vehicles as `plate, owner, unit, make, model, color, phone[, active]`
pub fn write_vehicles_csv<W: Write>(writer: W, vehicles: &[Vehicle], include_status: bool) -> AccessResult<usize> {
    let mut wtr = csv::Writer::from_writer(writer);

    if vehicles.is_empty() {
        // serde only emits headers with the first record
        let mut header = vec!["plate", "owner", "unit", "make", "model", "color", "phone"];
        if include_status {
            header.push("active");
        }
        wtr.write_record(&header)?;
    }

    for v in vehicles {
        wtr.serialize(VehicleRow {
            plate: &v.plate,
            owner: &v.owner,
            unit: &v.unit,
            make: v.make.as_deref().unwrap_or(""),
            model: v.model.as_deref().unwrap_or(""),
            color: v.color.as_deref().unwrap_or(""),
            phone: v.phone.as_deref().unwrap_or(""),
            active: include_status.then(|| v.is_active()),
        })?;
    }

    wtr.flush()?;
    Ok(vehicles.len())
}

/// Write entries as `plate, occurred_at, guard, category, owner, unit`
pub fn write_entries_csv<W: Write>(writer: W, entries: &[EntryView]) -> AccessResult<usize> {
    let mut wtr = csv::Writer::from_writer(writer);

    if entries.is_empty() {
        wtr.write_record(["plate", "occurred_at", "guard", "category", "owner", "unit"])?;
    }

    for e in entries {
        wtr.serialize(EntryRow {
            plate: &e.entry.plate,
            occurred_at: format_timestamp(&e.entry.occurred_at),
            guard: &e.entry.guard,
            category: &e.entry.category,
            owner: e.owner.as_deref().unwrap_or(""),
            unit: e.unit.as_deref().unwrap_or(""),
        })?;
    }

    wtr.flush()?;
    Ok(entries.len())
}

pub fn export_vehicles_to_dir(dir: &Path, date: NaiveDate, vehicles: &[Vehicle], include_status: bool) -> AccessResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(ExportKind::Vehicles, date));
    let file = std::fs::File::create(&path)?;

    let count = write_vehicles_csv(file, vehicles, include_status)?;
    tracing::info!(path = ?path, count, "Vehicles exported");
    Ok(path)
}

pub fn export_entries_to_dir(dir: &Path, date: NaiveDate, entries: &[EntryView]) -> AccessResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(ExportKind::Entries, date));
    let file = std::fs::File::create(&path)?;

    let count = write_entries_csv(file, entries)?;
    tracing::info!(path = ?path, count, "Entries exported");
    Ok(path)
}
