use crate::error::{Error, Result};
use crate::models::{BucketKey, TimePartition};
use chrono::{DateTime, TimeDelta, TimeZone};
use std::fmt;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;

/// Night buckets take their date from this far before the reference instant,
/// so one session past midnight stays under the evening's date.
pub fn night_date_offset() -> TimeDelta {
    TimeDelta::hours(12)
}

pub fn lookback() -> TimeDelta {
    TimeDelta::hours(1)
}

impl BucketKey {
    pub fn for_instant<Tz>(reference: &DateTime<Tz>, partition: TimePartition) -> Result<Self>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let date_source = match partition {
            TimePartition::Day => reference.clone(),
            TimePartition::Night => shift_back(reference, night_date_offset())?,
        };
        Ok(Self {
            date: date_source.date_naive(),
            partition,
            hour_slot: reference.format("%d_%H").to_string(),
        })
    }
}

/// Directory expected to hold captures for `reference`'s hour in `partition`.
/// The path is not checked for existence.
pub fn resolve_bucket_dir<Tz>(
    base_dir: &Path,
    reference: &DateTime<Tz>,
    partition: TimePartition,
) -> Result<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    Ok(BucketKey::for_instant(reference, partition)?.dir_in(base_dir))
}

#[derive(Debug, Clone)]
pub struct Candidate<Tz: TimeZone> {
    /// Instant the bucket was derived from (`now` or `now - 1h`).
    pub reference: DateTime<Tz>,
    pub key: BucketKey,
    pub dir: PathBuf,
}

/// The four buckets that may hold "now" and "one hour ago" captures, in scan order:
/// (now, day), (now, night), (now - 1h, day), (now - 1h, night).
///
/// Near an hour or date boundary two entries may name the same directory.
pub fn candidates<Tz>(base_dir: &Path, now: &DateTime<Tz>) -> Result<Vec<Candidate<Tz>>>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let previous = shift_back(now, lookback())?;
    let mut out = Vec::with_capacity(4);
    for reference in [now.clone(), previous] {
        for partition in TimePartition::iter() {
            let key = BucketKey::for_instant(&reference, partition)?;
            let dir = key.dir_in(base_dir);
            out.push(Candidate {
                reference: reference.clone(),
                key,
                dir,
            });
        }
    }
    Ok(out)
}

pub fn candidate_dirs<Tz>(base_dir: &Path, now: &DateTime<Tz>) -> Result<Vec<PathBuf>>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    Ok(candidates(base_dir, now)?
        .into_iter()
        .map(|c| c.dir)
        .collect())
}

fn shift_back<Tz>(instant: &DateTime<Tz>, by: TimeDelta) -> Result<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    instant
        .clone()
        .checked_sub_signed(by)
        .ok_or_else(|| Error::out_of_range(instant, by))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn dir(parts: &[&str]) -> PathBuf {
        parts.iter().fold(PathBuf::from("images"), |p, s| p.join(s))
    }

    #[test]
    fn day_bucket_uses_reference_date() {
        let path =
            resolve_bucket_dir(Path::new("images"), &at(2024, 3, 10, 14, 5, 0), TimePartition::Day)
                .unwrap();
        assert_eq!(path, dir(&["20240310", "day", "10_14"]));
    }

    #[test]
    fn night_bucket_date_is_twelve_hours_back() {
        let path = resolve_bucket_dir(
            Path::new("images"),
            &at(2024, 3, 10, 2, 30, 0),
            TimePartition::Night,
        )
        .unwrap();
        assert_eq!(path, dir(&["20240309", "night", "10_02"]));
    }

    #[test]
    fn night_date_tracks_shifted_instant_for_every_hour() {
        let start = at(2024, 12, 31, 0, 17, 42);
        for hour in 0..48 {
            let t = start + TimeDelta::hours(hour);
            let key = BucketKey::for_instant(&t, TimePartition::Night).unwrap();
            assert_eq!(key.date, (t - TimeDelta::hours(12)).date_naive());
            assert_eq!(key.hour_slot, t.format("%d_%H").to_string());
        }
    }

    #[test]
    fn hour_slot_is_zero_padded() {
        let key = BucketKey::for_instant(&at(2024, 1, 5, 7, 0, 0), TimePartition::Day).unwrap();
        assert_eq!(key.hour_slot, "05_07");
    }

    #[test]
    fn candidates_come_in_fixed_order() {
        let dirs = candidate_dirs(Path::new("images"), &at(2024, 3, 10, 0, 30, 0)).unwrap();
        assert_eq!(
            dirs,
            vec![
                dir(&["20240310", "day", "10_00"]),
                dir(&["20240309", "night", "10_00"]),
                dir(&["20240309", "day", "09_23"]),
                dir(&["20240309", "night", "09_23"]),
            ]
        );
    }

    #[test]
    fn previous_night_offset_applies_to_shifted_instant() {
        let dirs = candidate_dirs(Path::new("images"), &at(2024, 3, 10, 12, 30, 0)).unwrap();
        assert_eq!(dirs[1], dir(&["20240310", "night", "10_12"]));
        assert_eq!(dirs[3], dir(&["20240309", "night", "10_11"]));
    }

    #[test]
    fn now_and_previous_hour_differ_at_rollover() {
        for t in [at(2024, 6, 1, 9, 0, 0), at(2024, 6, 1, 9, 0, 1)] {
            let dirs = candidate_dirs(Path::new("images"), &t).unwrap();
            assert_eq!(dirs.len(), 4);
            assert_ne!(dirs[0], dirs[2]);
            assert_ne!(dirs[1], dirs[3]);
            assert!(dirs[0].ends_with("01_09"));
            assert!(dirs[2].ends_with("01_08"));
        }
    }

    #[test]
    fn formats_in_the_instant_zone() {
        let tz = FixedOffset::east_opt(-5 * 3600).unwrap();
        let t = tz.with_ymd_and_hms(2024, 3, 10, 23, 15, 0).unwrap();
        let key = BucketKey::for_instant(&t, TimePartition::Day).unwrap();
        assert_eq!(key.date_str(), "20240310");
        assert_eq!(key.hour_slot, "10_23");
    }

    #[test]
    fn shifting_before_min_date_is_an_error() {
        let t = DateTime::<Utc>::MIN_UTC;
        let err = BucketKey::for_instant(&t, TimePartition::Night).unwrap_err();
        assert!(matches!(err, Error::TimeOutOfRange { .. }));
    }
}
