use crate::error::{Error, Result};
use chrono::{DateTime, Local, TimeZone};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the reference instant for an aggregation run.
pub trait Clock {
    type Zone: TimeZone;

    fn now(&self) -> Result<DateTime<Self::Zone>>;
}

/// Wall clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Zone = Local;

    fn now(&self) -> Result<DateTime<Local>> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| Error::Clock(format!("system time is before the UNIX epoch: {err}")))?;
        Ok(Local::now())
    }
}

/// A frozen instant, used by `--at` and in tests.
#[derive(Debug, Clone)]
pub struct FixedClock<Tz: TimeZone>(pub DateTime<Tz>);

impl<Tz: TimeZone> Clock for FixedClock<Tz> {
    type Zone = Tz;

    fn now(&self) -> Result<DateTime<Tz>> {
        Ok(self.0.clone())
    }
}
