// 🕐 Site civil time
// Entries are stamped and bucketed by the wall clock of the condominium, not UTC

use anyhow::{anyhow, Result};
use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::sync::Mutex;

/// Textual layout of every stored timestamp (second precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub trait Clock: Send + Sync {
    /// Current civil time at the site, truncated to whole seconds
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// System clock, either in the host's local zone or at a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteClock {
    Local,
    Offset(FixedOffset),
}

impl SiteClock {
    /// Build from an optional "+HH:MM" / "-HH:MM" offset string
    pub fn from_offset(offset: Option<&str>) -> Result<Self> {
        match offset.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(SiteClock::Local),
            Some(raw) => parse_offset(raw).map(SiteClock::Offset),
        }
    }
}

impl Clock for SiteClock {
    fn now(&self) -> NaiveDateTime {
        let now = match self {
            SiteClock::Local => Local::now().naive_local(),
            SiteClock::Offset(offset) => Utc::now().with_timezone(offset).naive_local(),
        };
        truncate_to_second(now)
    }
}

fn parse_offset(raw: &str) -> Result<FixedOffset> {
    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => return Err(anyhow!("UTC offset must start with + or -: {}", raw)),
    };

    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| anyhow!("UTC offset must look like +HH:MM: {}", raw))?;
    let hours: i32 = hours.parse().map_err(|_| anyhow!("Bad hours in UTC offset: {}", raw))?;
    let minutes: i32 = minutes.parse().map_err(|_| anyhow!("Bad minutes in UTC offset: {}", raw))?;

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow!("UTC offset out of range: {}", raw))
}

/// Hand-driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(truncate_to_second(now)),
        }
    }

    /// Parse "YYYY-MM-DD HH:MM:SS"
    pub fn at(timestamp: &str) -> Result<Self> {
        Ok(Self::new(parse_timestamp(timestamp)?))
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = truncate_to_second(now);
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| anyhow!("Invalid timestamp '{}': {}", raw, e))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| anyhow!("Invalid date '{}' (expected YYYY-MM-DD): {}", raw, e))
}

fn truncate_to_second(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_parsing() {
        assert_eq!(SiteClock::from_offset(None).unwrap(), SiteClock::Local);
        assert_eq!(SiteClock::from_offset(Some("  ")).unwrap(), SiteClock::Local);

        let clock = SiteClock::from_offset(Some("-03:00")).unwrap();
        assert_eq!(clock, SiteClock::Offset(FixedOffset::west_opt(3 * 3600).unwrap()));

        let clock = SiteClock::from_offset(Some("+05:30")).unwrap();
        assert_eq!(clock, SiteClock::Offset(FixedOffset::east_opt(5 * 3600 + 1800).unwrap()));

        assert!(SiteClock::from_offset(Some("03:00")).is_err());
        assert!(SiteClock::from_offset(Some("+3")).is_err());
        assert!(SiteClock::from_offset(Some("+99:00")).is_err());
    }

    #[test]
    fn test_site_clock_has_second_precision() {
        let now = SiteClock::Local.now();
        assert_eq!(now.nanosecond(), 0);
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::at("2026-10-16 08:15:00").unwrap();
        assert_eq!(format_timestamp(&clock.now()), "2026-10-16 08:15:00");

        clock.advance(chrono::Duration::hours(16));
        assert_eq!(clock.today(), parse_date("2026-10-17").unwrap());

        clock.set(parse_timestamp("2026-01-01 00:00:00").unwrap());
        assert_eq!(format_timestamp(&clock.now()), "2026-01-01 00:00:00");
    }

    #[test]
    fn test_parse_date_rejects_other_layouts() {
        assert!(parse_date("2026-10-16").is_ok());
        assert!(parse_date("16/10/2026").is_err());
    }
}
