// 📊 Entry statistics
// Recomputed from the ledger on every call. Volumes are one condominium's gate,
// so there is nothing to cache.

use crate::clock::{Clock, DATE_FORMAT};
use crate::error::{AccessError, AccessResult};
use crate::ledger::count_entries_on;
use crate::vehicles::count_active_vehicles;
use chrono::{Days, NaiveDate};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

/// Named windows of the admin statistics screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl StatsPeriod {
    pub fn window_days(&self) -> u32 {
        match self {
            StatsPeriod::Daily => 1,
            StatsPeriod::Weekly => 7,
            StatsPeriod::Monthly => 30,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StatsPeriod::Daily => "Today",
            StatsPeriod::Weekly => "Last 7 days",
            StatsPeriod::Monthly => "Last 30 days",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            StatsPeriod::Daily => StatsPeriod::Weekly,
            StatsPeriod::Weekly => StatsPeriod::Monthly,
            StatsPeriod::Monthly => StatsPeriod::Daily,
        }
    }
}

impl std::str::FromStr for StatsPeriod {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(StatsPeriod::Daily),
            "weekly" | "week" => Ok(StatsPeriod::Weekly),
            "monthly" | "month" => Ok(StatsPeriod::Monthly),
            other => Err(AccessError::invalid("period", format!("Unknown period '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourCount {
    pub hour: u32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateCount {
    pub plate: String,
    pub count: i64,
    pub owner: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStats {
    pub window_days: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total: i64,
    /// Ascending by date, only days with entries
    pub per_day: Vec<DayCount>,
    /// Most frequent plates first
    pub top_plates: Vec<PlateCount>,
    /// Ascending by hour of day, only hours with entries
    pub per_hour: Vec<HourCount>,
    pub per_category: Vec<CategoryCount>,
}

impl EntryStats {
    /// Busiest hour of day; earliest hour wins a tie
    pub fn peak_hour(&self) -> Option<&HourCount> {
        self.per_hour
            .iter()
            .fold(None, |best: Option<&HourCount>, h| match best {
                Some(b) if b.count >= h.count => Some(b),
                _ => Some(h),
            })
    }

    pub fn busiest_day(&self) -> Option<&DayCount> {
        self.per_day
            .iter()
            .fold(None, |best: Option<&DayCount>, d| match best {
                Some(b) if b.count >= d.count => Some(b),
                _ => Some(d),
            })
    }

    /// All 24 hours, zero-filled, for charts
    pub fn hourly_histogram(&self) -> [i64; 24] {
        let mut buckets = [0i64; 24];
        for h in &self.per_hour {
            if let Some(slot) = buckets.get_mut(h.hour as usize) {
                *slot = h.count;
            }
        }
        buckets
    }
}

/// Aggregate the `window_days` calendar days ending today (inclusive)
pub fn aggregate(conn: &Connection, clock: &dyn Clock, window_days: u32, top_n: usize) -> AccessResult<EntryStats> {
    if window_days == 0 {
        return Err(AccessError::invalid("window_days", "Window must cover at least one day"));
    }

    let end = clock.today();
    let start = end
        .checked_sub_days(Days::new(u64::from(window_days) - 1))
        .ok_or_else(|| {
            AccessError::invalid("window_days", format!("A {} day window reaches past the calendar", window_days))
        })?;
    let start_str = start.format(DATE_FORMAT).to_string();
    let end_str = end.format(DATE_FORMAT).to_string();

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE date(occurred_at) BETWEEN ?1 AND ?2",
        params![start_str, end_str],
        |row| row.get(0),
    )?;

    let per_day = {
        let mut stmt = conn.prepare(
            "SELECT date(occurred_at) AS day, COUNT(*)
             FROM entries
             WHERE date(occurred_at) BETWEEN ?1 AND ?2
             GROUP BY day
             ORDER BY day ASC",
        )?;
        let rows = stmt
            .query_map(params![start_str, end_str], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(day, count)| {
                NaiveDate::parse_from_str(&day, DATE_FORMAT)
                    .map(|date| DayCount { date, count })
                    .map_err(|e| {
                        AccessError::Storage(rusqlite::Error::FromSqlConversionFailure(
                            0,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        ))
                    })
            })
            .collect::<AccessResult<Vec<_>>>()?
    };

    let top_plates = {
        let mut stmt = conn.prepare(
            "SELECT e.plate, COUNT(*) AS visits, v.owner, v.unit
             FROM entries e
             LEFT JOIN vehicles v ON v.plate = e.plate
             WHERE date(e.occurred_at) BETWEEN ?1 AND ?2
             GROUP BY e.plate
             ORDER BY visits DESC, e.plate ASC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![start_str, end_str, top_n as i64], |row| {
                Ok(PlateCount {
                    plate: row.get(0)?,
                    count: row.get(1)?,
                    owner: row.get(2)?,
                    unit: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let per_hour = {
        let mut stmt = conn.prepare(
            "SELECT CAST(strftime('%H', occurred_at) AS INTEGER) AS hour, COUNT(*)
             FROM entries
             WHERE date(occurred_at) BETWEEN ?1 AND ?2
             GROUP BY hour
             ORDER BY hour ASC",
        )?;
        let rows = stmt
            .query_map(params![start_str, end_str], |row| {
                Ok(HourCount {
                    hour: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let per_category = {
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) AS n
             FROM entries
             WHERE date(occurred_at) BETWEEN ?1 AND ?2
             GROUP BY category
             ORDER BY n DESC, category ASC",
        )?;
        let rows = stmt
            .query_map(params![start_str, end_str], |row| {
                Ok(CategoryCount {
                    category: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    tracing::debug!(window_days, total, "Entry statistics computed");

    Ok(EntryStats {
        window_days,
        start,
        end,
        total,
        per_day,
        top_plates,
        per_hour,
        per_category,
    })
}

/// Sidebar metrics of the guard screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub entries_today: i64,
    pub authorized_vehicles: i64,
}

pub fn daily_summary(conn: &Connection, clock: &dyn Clock) -> AccessResult<DailySummary> {
    let date = clock.today();

    Ok(DailySummary {
        date,
        entries_today: count_entries_on(conn, date)?,
        authorized_vehicles: count_active_vehicles(conn)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{parse_timestamp, ManualClock};
    use crate::db::setup_database;
    use crate::ledger::record_entry;
    use crate::vehicles::{register_vehicle, NewVehicle};

    fn setup() -> (Connection, ManualClock) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        (conn, ManualClock::at("2026-10-16 10:00:00").unwrap())
    }

    fn enter_at(conn: &Connection, clock: &ManualClock, at: &str, plate: &str, category: &str) {
        clock.set(parse_timestamp(at).unwrap());
        record_entry(conn, clock, plate, "Ana", category).unwrap();
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let (conn, clock) = setup();
        assert!(matches!(
            aggregate(&conn, &clock, 0, 5).unwrap_err(),
            AccessError::Validation(_)
        ));
    }

    #[test]
    fn test_window_past_calendar_start_is_rejected() {
        let (conn, clock) = setup();

        let err = aggregate(&conn, &clock, 100_000_000, 5).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "window_days");

        let err = aggregate(&conn, &clock, u32::MAX, 5).unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));
    }

    #[test]
    fn test_empty_ledger() {
        let (conn, clock) = setup();
        let stats = aggregate(&conn, &clock, 7, 5).unwrap();

        assert_eq!(stats.total, 0);
        assert!(stats.per_day.is_empty());
        assert!(stats.peak_hour().is_none());
        assert_eq!(stats.hourly_histogram(), [0; 24]);
    }

    #[test]
    fn test_window_bounds() {
        let (conn, clock) = setup();
        register_vehicle(
            &conn,
            &clock,
            &NewVehicle {
                plate: "BBBB22".to_string(),
                owner: "Juan Perez".to_string(),
                unit: "101".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        enter_at(&conn, &clock, "2026-10-09 08:00:00", "BBBB22", "Residente"); // outside 7-day window
        enter_at(&conn, &clock, "2026-10-10 08:10:00", "BBBB22", "Residente");
        enter_at(&conn, &clock, "2026-10-15 08:20:00", "AB1234", "Visita");
        enter_at(&conn, &clock, "2026-10-16 18:00:00", "BBBB22", "Residente");
        enter_at(&conn, &clock, "2026-10-16 18:30:00", "BBBB22", "Servicio");

        let daily = aggregate(&conn, &clock, 1, 5).unwrap();
        assert_eq!(daily.total, 2);
        assert_eq!(daily.start, daily.end);

        let weekly = aggregate(&conn, &clock, StatsPeriod::Weekly.window_days(), 5).unwrap();
        assert_eq!(weekly.total, 4);
        assert_eq!(weekly.start, NaiveDate::from_ymd_opt(2026, 10, 10).unwrap());
        assert_eq!(
            weekly.per_day.iter().map(|d| d.count).collect::<Vec<_>>(),
            vec![1, 1, 2]
        );
        assert_eq!(weekly.busiest_day().unwrap().date, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());

        assert_eq!(weekly.top_plates[0].plate, "BBBB22");
        assert_eq!(weekly.top_plates[0].count, 3);
        assert_eq!(weekly.top_plates[0].owner.as_deref(), Some("Juan Perez"));
        assert_eq!(weekly.top_plates[1].plate, "AB1234");
        assert_eq!(weekly.top_plates[1].owner, None);

        assert_eq!(
            weekly.per_hour,
            vec![
                HourCount { hour: 8, count: 2 },
                HourCount { hour: 18, count: 2 },
            ]
        );
        assert_eq!(weekly.peak_hour().unwrap().hour, 8);
        assert_eq!(weekly.hourly_histogram()[18], 2);

        assert_eq!(weekly.per_category[0], CategoryCount { category: "Residente".to_string(), count: 2 });

        let monthly = aggregate(&conn, &clock, 30, 1).unwrap();
        assert_eq!(monthly.total, 5);
        assert_eq!(monthly.top_plates.len(), 1);
    }

    #[test]
    fn test_recording_bumps_daily_total_by_one() {
        let (conn, clock) = setup();
        let before = aggregate(&conn, &clock, 1, 5).unwrap().total;

        record_entry(&conn, &clock, "BBBB22", "Ana", "Visita").unwrap();

        assert_eq!(aggregate(&conn, &clock, 1, 5).unwrap().total, before + 1);
    }

    #[test]
    fn test_daily_summary() {
        let (conn, clock) = setup();
        register_vehicle(
            &conn,
            &clock,
            &NewVehicle {
                plate: "AB1234".to_string(),
                owner: "Maria".to_string(),
                unit: "5".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        record_entry(&conn, &clock, "AB1234", "Ana", "Residente").unwrap();

        let summary = daily_summary(&conn, &clock).unwrap();
        assert_eq!(summary.entries_today, 1);
        assert_eq!(summary.authorized_vehicles, 1);
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("weekly".parse::<StatsPeriod>().unwrap(), StatsPeriod::Weekly);
        assert_eq!("Month".parse::<StatsPeriod>().unwrap().window_days(), 30);
        assert!("yearly".parse::<StatsPeriod>().is_err());
    }
}
