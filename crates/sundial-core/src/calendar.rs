//! The validated calendar: normalization, arithmetic, and transition
//! detection.
//!
//! The calendar is built once at startup from a [`CalendarSpec`] and is
//! immutable thereafter. Every piece of date math in the workspace goes
//! through it: normalization of a [`WorldTimestamp`] to an absolute minute
//! count is the single source of truth for ordering and arithmetic, and the
//! season / time-of-day block of a timestamp is derived here and nowhere
//! else.
//!
//! # Design Principles
//!
//! - All arithmetic is checked (no silent overflow).
//! - Boundary tables must partition their cyclic domains: season starts are
//!   distinct days of the year, and time blocks chain end-to-start around
//!   the full day. Validation failures are configuration errors, fatal at
//!   startup.
//! - Timestamps are only meaningful against the calendar that produced
//!   them; field validation happens on every normalization.

use sundial_types::{Season, TimeBlock, WorldTimestamp};

use crate::config::{CalendarSpec, SeasonStartSpec, TimeBlockSpec};

/// Errors that can occur during calendar operations.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    /// The calendar specification is malformed.
    #[error("invalid calendar configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },

    /// A timestamp field is out of range for this calendar.
    #[error("invalid timestamp: {reason}")]
    InvalidTimestamp {
        /// Explanation of which field is out of range.
        reason: String,
    },

    /// Minute arithmetic overflowed the representable range.
    #[error("calendar arithmetic overflow")]
    Overflow,
}

/// A resolved time-of-day block span, in hours of the day.
///
/// `start == end` means the block covers the whole day (a single-block
/// calendar). `start > end` means the block wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockSpan {
    block: TimeBlock,
    start: u32,
    end: u32,
}

impl BlockSpan {
    /// Whether `hour` falls inside this span.
    const fn contains(&self, hour: u32) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// The validated, immutable calendar.
///
/// Derived quantities (minutes per day, month start offsets, minutes per
/// year) are precomputed at construction so the hot paths are pure lookups
/// and divisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    minutes_per_hour: u64,
    hours_per_day: u64,
    days_per_month: Vec<u64>,
    /// Day-of-year offset (0-based) at which each month starts.
    month_start_days: Vec<u64>,
    days_per_year: u64,
    minutes_per_day: u64,
    minutes_per_year: u64,
    /// Season boundaries as (0-based day of year, season), sorted ascending.
    season_starts: Vec<(u64, Season)>,
    /// Time-of-day block spans, sorted by start hour.
    block_spans: Vec<BlockSpan>,
}

impl Calendar {
    /// Build and validate a calendar from its specification.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidConfig`] if any structural rule is
    /// violated: zero-length units, empty or overlapping boundary tables,
    /// or block spans that do not partition the day.
    pub fn new(spec: &CalendarSpec) -> Result<Self, CalendarError> {
        if spec.minutes_per_hour == 0 {
            return Err(invalid_config("minutes_per_hour must be at least 1"));
        }
        if spec.hours_per_day == 0 {
            return Err(invalid_config("hours_per_day must be at least 1"));
        }
        if spec.days_per_month.is_empty() {
            return Err(invalid_config("at least one month must be configured"));
        }
        if spec.days_per_month.contains(&0) {
            return Err(invalid_config("every month must have at least 1 day"));
        }

        let minutes_per_hour = spec.minutes_per_hour;
        let hours_per_day = spec.hours_per_day;
        let minutes_per_day = minutes_per_hour
            .checked_mul(hours_per_day)
            .ok_or(CalendarError::Overflow)?;

        // Prefix sums: day-of-year offset at which each month starts.
        let mut month_start_days = Vec::with_capacity(spec.days_per_month.len());
        let mut running: u64 = 0;
        for days in &spec.days_per_month {
            month_start_days.push(running);
            running = running.checked_add(*days).ok_or(CalendarError::Overflow)?;
        }
        let days_per_year = running;
        let minutes_per_year = minutes_per_day
            .checked_mul(days_per_year)
            .ok_or(CalendarError::Overflow)?;

        let season_starts = resolve_season_starts(
            &spec.season_starts,
            &spec.days_per_month,
            &month_start_days,
        )?;
        let block_spans = resolve_block_spans(&spec.time_blocks, hours_per_day)?;

        Ok(Self {
            minutes_per_hour,
            hours_per_day,
            days_per_month: spec.days_per_month.clone(),
            month_start_days,
            days_per_year,
            minutes_per_day,
            minutes_per_year,
            season_starts,
            block_spans,
        })
    }

    /// Number of months in a year.
    pub fn months_per_year(&self) -> u32 {
        u32::try_from(self.days_per_month.len()).unwrap_or(u32::MAX)
    }

    /// Minutes in one hour.
    pub const fn minutes_per_hour(&self) -> u64 {
        self.minutes_per_hour
    }

    /// Hours in one day.
    pub const fn hours_per_day(&self) -> u64 {
        self.hours_per_day
    }

    /// Minutes in one day.
    pub const fn minutes_per_day(&self) -> u64 {
        self.minutes_per_day
    }

    /// Minutes in one full year.
    pub const fn minutes_per_year(&self) -> u64 {
        self.minutes_per_year
    }

    /// Days in the given 1-based month.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidTimestamp`] if `month` is out of
    /// range.
    pub fn days_in_month(&self, month: u32) -> Result<u64, CalendarError> {
        let idx = month
            .checked_sub(1)
            .and_then(|m| usize::try_from(m).ok())
            .ok_or_else(|| invalid_timestamp(format!("month {month} out of range")))?;
        self.days_per_month
            .get(idx)
            .copied()
            .ok_or_else(|| invalid_timestamp(format!("month {month} out of range")))
    }

    /// Construct a validated timestamp from raw fields.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidTimestamp`] if any field is out of
    /// range for this calendar.
    pub fn timestamp(
        &self,
        year: u32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
    ) -> Result<WorldTimestamp, CalendarError> {
        let ts = WorldTimestamp::from_fields(year, month, day, hour, minute);
        self.validate(&ts)?;
        Ok(ts)
    }

    /// Check that every field of `ts` is in range for this calendar.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidTimestamp`] naming the offending
    /// field.
    pub fn validate(&self, ts: &WorldTimestamp) -> Result<(), CalendarError> {
        if ts.year == 0 {
            return Err(invalid_timestamp("year must be at least 1"));
        }
        let days = self.days_in_month(ts.month)?;
        if u64::from(ts.day) > days || ts.day == 0 {
            return Err(invalid_timestamp(format!(
                "day {} out of range for month {} (1..={days})",
                ts.day, ts.month
            )));
        }
        if u64::from(ts.hour) >= self.hours_per_day {
            return Err(invalid_timestamp(format!(
                "hour {} out of range (0..{})",
                ts.hour, self.hours_per_day
            )));
        }
        if u64::from(ts.minute) >= self.minutes_per_hour {
            return Err(invalid_timestamp(format!(
                "minute {} out of range (0..{})",
                ts.minute, self.minutes_per_hour
            )));
        }
        Ok(())
    }

    /// The 0-based day of the year for a validated (month, day) pair.
    fn day_of_year(&self, month: u32, day: u32) -> Result<u64, CalendarError> {
        let idx = month
            .checked_sub(1)
            .and_then(|m| usize::try_from(m).ok())
            .ok_or_else(|| invalid_timestamp(format!("month {month} out of range")))?;
        let month_start = self
            .month_start_days
            .get(idx)
            .copied()
            .ok_or_else(|| invalid_timestamp(format!("month {month} out of range")))?;
        let day_offset = u64::from(day)
            .checked_sub(1)
            .ok_or_else(|| invalid_timestamp("day must be at least 1"))?;
        month_start
            .checked_add(day_offset)
            .ok_or(CalendarError::Overflow)
    }

    /// Normalize a timestamp to its absolute minute count.
    ///
    /// Minute 0 is year 1, month 1, day 1, 00:00. This count is the single
    /// source of truth for ordering and arithmetic.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidTimestamp`] if `ts` is out of range,
    /// or [`CalendarError::Overflow`] for timestamps beyond the u64 horizon.
    pub fn to_minutes(&self, ts: &WorldTimestamp) -> Result<u64, CalendarError> {
        self.validate(ts)?;

        let years_elapsed = u64::from(ts.year)
            .checked_sub(1)
            .ok_or_else(|| invalid_timestamp("year must be at least 1"))?;
        let year_minutes = years_elapsed
            .checked_mul(self.minutes_per_year)
            .ok_or(CalendarError::Overflow)?;

        let doy = self.day_of_year(ts.month, ts.day)?;
        let day_minutes = doy
            .checked_mul(self.minutes_per_day)
            .ok_or(CalendarError::Overflow)?;

        let hour_minutes = u64::from(ts.hour)
            .checked_mul(self.minutes_per_hour)
            .ok_or(CalendarError::Overflow)?;

        year_minutes
            .checked_add(day_minutes)
            .and_then(|m| m.checked_add(hour_minutes))
            .and_then(|m| m.checked_add(u64::from(ts.minute)))
            .ok_or(CalendarError::Overflow)
    }

    /// Expand an absolute minute count back into a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::Overflow`] if the year exceeds `u32::MAX`.
    pub fn from_minutes(&self, abs: u64) -> Result<WorldTimestamp, CalendarError> {
        let years_elapsed = abs.checked_div(self.minutes_per_year).unwrap_or(0);
        let year = years_elapsed
            .checked_add(1)
            .and_then(|y| u32::try_from(y).ok())
            .ok_or(CalendarError::Overflow)?;
        let within_year = abs.checked_rem(self.minutes_per_year).unwrap_or(0);

        let doy = within_year.checked_div(self.minutes_per_day).unwrap_or(0);
        let within_day = within_year.checked_rem(self.minutes_per_day).unwrap_or(0);

        let (month, day) = self.month_day_from_doy(doy)?;

        let hour = within_day.checked_div(self.minutes_per_hour).unwrap_or(0);
        let minute = within_day.checked_rem(self.minutes_per_hour).unwrap_or(0);

        Ok(WorldTimestamp {
            year,
            month,
            day,
            hour: u32::try_from(hour).map_err(|_err| CalendarError::Overflow)?,
            minute: u32::try_from(minute).map_err(|_err| CalendarError::Overflow)?,
        })
    }

    /// Split a 0-based day of the year into a 1-based (month, day) pair.
    fn month_day_from_doy(&self, doy: u64) -> Result<(u32, u32), CalendarError> {
        for (idx, (start, days)) in self
            .month_start_days
            .iter()
            .zip(self.days_per_month.iter())
            .enumerate()
        {
            let end = start.checked_add(*days).ok_or(CalendarError::Overflow)?;
            if doy >= *start && doy < end {
                let month = idx
                    .checked_add(1)
                    .and_then(|m| u32::try_from(m).ok())
                    .ok_or(CalendarError::Overflow)?;
                let day = doy
                    .checked_sub(*start)
                    .and_then(|d| d.checked_add(1))
                    .and_then(|d| u32::try_from(d).ok())
                    .ok_or(CalendarError::Overflow)?;
                return Ok((month, day));
            }
        }
        Err(invalid_timestamp(format!(
            "day-of-year {doy} exceeds year length {}",
            self.days_per_year
        )))
    }

    /// Add a minute delta to a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidTimestamp`] if `ts` is out of range
    /// or [`CalendarError::Overflow`] if the result is unrepresentable.
    pub fn add_minutes(
        &self,
        ts: &WorldTimestamp,
        minutes: u64,
    ) -> Result<WorldTimestamp, CalendarError> {
        let abs = self.to_minutes(ts)?;
        let target = abs.checked_add(minutes).ok_or(CalendarError::Overflow)?;
        self.from_minutes(target)
    }

    /// Derive the season a timestamp falls in.
    ///
    /// The season of a day is determined by the latest boundary at or
    /// before it; days before the first boundary of the year belong to the
    /// season that started latest in the previous year (the table is
    /// cyclic).
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidTimestamp`] if `ts` is out of range.
    pub fn season_of(&self, ts: &WorldTimestamp) -> Result<Season, CalendarError> {
        self.validate(ts)?;
        let doy = self.day_of_year(ts.month, ts.day)?;

        let mut current: Option<Season> = None;
        for (start, season) in &self.season_starts {
            if *start <= doy {
                current = Some(*season);
            }
        }
        // Before the first boundary: wrap to the season that started last
        // in the previous year.
        current
            .or_else(|| self.season_starts.last().map(|(_, s)| *s))
            .ok_or_else(|| invalid_config("season boundary table is empty"))
    }

    /// Derive the time-of-day block a timestamp falls in.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidTimestamp`] if `ts` is out of range.
    pub fn time_block_of(&self, ts: &WorldTimestamp) -> Result<TimeBlock, CalendarError> {
        self.validate(ts)?;
        self.block_spans
            .iter()
            .find(|span| span.contains(ts.hour))
            .map(|span| span.block)
            .ok_or_else(|| invalid_config(format!("no time block covers hour {}", ts.hour)))
    }
}

/// Build a sorted season boundary table, rejecting duplicates and
/// out-of-range entries.
fn resolve_season_starts(
    specs: &[SeasonStartSpec],
    days_per_month: &[u64],
    month_start_days: &[u64],
) -> Result<Vec<(u64, Season)>, CalendarError> {
    if specs.is_empty() {
        return Err(invalid_config("at least one season boundary must be configured"));
    }

    let mut starts = Vec::with_capacity(specs.len());
    for spec in specs {
        let idx = spec
            .month
            .checked_sub(1)
            .and_then(|m| usize::try_from(m).ok())
            .ok_or_else(|| {
                invalid_config(format!("season {:?}: month {} out of range", spec.season, spec.month))
            })?;
        let days = days_per_month.get(idx).copied().ok_or_else(|| {
            invalid_config(format!("season {:?}: month {} out of range", spec.season, spec.month))
        })?;
        if spec.day == 0 || u64::from(spec.day) > days {
            return Err(invalid_config(format!(
                "season {:?}: day {} out of range for month {} (1..={days})",
                spec.season, spec.day, spec.month
            )));
        }
        let month_start = month_start_days.get(idx).copied().ok_or_else(|| {
            invalid_config(format!("season {:?}: month {} out of range", spec.season, spec.month))
        })?;
        let doy = month_start
            .checked_add(u64::from(spec.day).saturating_sub(1))
            .ok_or(CalendarError::Overflow)?;
        starts.push((doy, spec.season));
    }

    starts.sort_by_key(|(doy, _)| *doy);
    for pair in starts.windows(2) {
        if let [a, b] = pair {
            if a.0 == b.0 {
                return Err(invalid_config(format!(
                    "season boundaries {:?} and {:?} overlap on the same day",
                    a.1, b.1
                )));
            }
        }
    }

    Ok(starts)
}

/// Build the block span table, checking that spans chain end-to-start
/// around the full day with no gaps or overlaps.
fn resolve_block_spans(
    specs: &[TimeBlockSpec],
    hours_per_day: u64,
) -> Result<Vec<BlockSpan>, CalendarError> {
    if specs.is_empty() {
        return Err(invalid_config("at least one time block must be configured"));
    }

    let mut spans = Vec::with_capacity(specs.len());
    for spec in specs {
        if u64::from(spec.start_hour) >= hours_per_day {
            return Err(invalid_config(format!(
                "time block {:?}: start hour {} out of range (0..{hours_per_day})",
                spec.block, spec.start_hour
            )));
        }
        if u64::from(spec.end_hour) >= hours_per_day {
            return Err(invalid_config(format!(
                "time block {:?}: end hour {} out of range (0..{hours_per_day})",
                spec.block, spec.end_hour
            )));
        }
        spans.push(BlockSpan {
            block: spec.block,
            start: spec.start_hour,
            end: spec.end_hour,
        });
    }

    spans.sort_by_key(|span| span.start);

    for pair in spans.windows(2) {
        if let [a, b] = pair {
            if a.start == b.start {
                return Err(invalid_config(format!(
                    "time blocks {:?} and {:?} overlap at hour {}",
                    a.block, b.block, a.start
                )));
            }
        }
    }

    // A single block must close on itself (start == end covers the whole
    // day); multiple blocks must chain each end to the next start, with the
    // last wrapping to the first.
    if let [only] = spans.as_slice() {
        if only.start != only.end {
            return Err(invalid_config(format!(
                "single time block {:?} must cover the whole day (start == end)",
                only.block
            )));
        }
        return Ok(spans);
    }

    // Pair each span with its successor, wrapping the last back to the
    // first; every end must meet the next start.
    for (here, next) in spans.iter().zip(spans.iter().cycle().skip(1)) {
        if here.end != next.start {
            return Err(invalid_config(format!(
                "time blocks do not partition the day: {:?} ends at hour {} but {:?} starts at hour {}",
                here.block, here.end, next.block, next.start
            )));
        }
    }

    Ok(spans)
}

fn invalid_config(reason: impl Into<String>) -> CalendarError {
    CalendarError::InvalidConfig {
        reason: reason.into(),
    }
}

fn invalid_timestamp(reason: impl Into<String>) -> CalendarError {
    CalendarError::InvalidTimestamp {
        reason: reason.into(),
    }
}
