//! Time-stamp block appended after every successful decision.

use std::fmt::Display;

use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Which time fields the block carries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeFormat {
    /// timezone, date, time, iso, unix.
    #[default]
    Full,
    /// timezone, iso.
    Iso,
    /// timezone, date.
    Date,
    /// timezone, time.
    Time,
    /// timezone, unix, milliseconds.
    Unix,
}

/// Clock the block is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// An IANA timezone.
    Named(Tz),
    /// The broker host's local clock.
    Local,
}

impl Zone {
    /// Resolve an optional timezone argument; blank means local.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Mcp` for names that are not IANA timezones.
    pub fn parse(timezone: Option<&str>) -> Result<Self> {
        match timezone.map(str::trim).filter(|tz| !tz.is_empty()) {
            None => Ok(Self::Local),
            Some(name) => name
                .parse::<Tz>()
                .map(Self::Named)
                .map_err(|_| AppError::Mcp(format!("unknown timezone '{name}'"))),
        }
    }
}

/// Render the newline-joined `key: value` block for `now`.
#[must_use]
pub fn render(format: TimeFormat, zone: Zone, now: DateTime<Utc>) -> String {
    match zone {
        Zone::Named(tz) => lines(format, tz.name().to_owned(), &now.with_timezone(&tz)),
        Zone::Local => {
            let local = now.with_timezone(&Local);
            let label = format!("Local (UTC{})", local.format("%:z"));
            lines(format, label, &local)
        }
    }
}

fn lines<Z>(format: TimeFormat, label: String, at: &DateTime<Z>) -> String
where
    Z: TimeZone,
    Z::Offset: Display,
{
    let date = || at.format("%Y-%m-%d").to_string();
    let time = || at.format("%I:%M:%S %p").to_string();
    let iso = || at.to_rfc3339_opts(SecondsFormat::Secs, false);
    let unix = || at.timestamp().to_string();

    let mut out: Vec<(&str, String)> = vec![("timezone", label)];
    match format {
        TimeFormat::Full => {
            out.push(("date", date()));
            out.push(("time", time()));
            out.push(("iso", iso()));
            out.push(("unix", unix()));
        }
        TimeFormat::Iso => out.push(("iso", iso())),
        TimeFormat::Date => out.push(("date", date())),
        TimeFormat::Time => out.push(("time", time())),
        TimeFormat::Unix => {
            out.push(("unix", unix()));
            out.push(("milliseconds", at.timestamp_millis().to_string()));
        }
    }

    out.into_iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}
