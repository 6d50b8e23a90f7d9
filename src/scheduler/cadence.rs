use chrono::{DateTime, FixedOffset, LocalResult, NaiveTime, TimeZone, Utc};

/// A fixed wall-clock time, once per day, in a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct DailyCadence {
    tz: FixedOffset,
    target: NaiveTime,
}

impl DailyCadence {
    /// Returns `None` for an out-of-range offset or time of day.
    pub fn new(utc_offset_hours: i32, hour: u32, minute: u32) -> Option<Self> {
        let tz = FixedOffset::east_opt(utc_offset_hours * 3600)?;
        let target = NaiveTime::from_hms_opt(hour, minute, 0)?;
        Some(Self { tz, target })
    }

    pub fn timezone(&self) -> FixedOffset {
        self.tz
    }

    /// The next trigger at or after `now`.
    pub fn next_run_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let localized_now = now.with_timezone(&self.tz);
        let mut date = localized_now.date_naive();
        if localized_now.time() > self.target {
            date = date.succ_opt().unwrap_or(date);
        }

        match self.tz.from_local_datetime(&date.and_time(self.target)) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            // A fixed offset maps every local time to exactly one instant.
            LocalResult::None => now,
        }
    }
}
