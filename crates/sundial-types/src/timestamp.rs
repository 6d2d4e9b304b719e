//! The game-time timestamp value.

use serde::{Deserialize, Serialize};

/// An absolute point in game time.
///
/// Month and day are 1-based; hour and minute are 0-based. How many days a
/// month has, how many hours a day has, and so on are properties of the
/// calendar, not of this value -- all arithmetic and normalization to an
/// absolute minute count goes through `sundial-core`'s calendar, never
/// through ad hoc field math.
///
/// # Ordering
///
/// The derived lexicographic order over `(year, month, day, hour, minute)`
/// coincides with normalized-minute order for any two timestamps whose
/// fields are in range for the same calendar, so `Ord` is safe for
/// chronological comparison of calendar-produced values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WorldTimestamp {
    /// Game year, starting at 1.
    pub year: u32,
    /// Month of the year, 1-based.
    pub month: u32,
    /// Day of the month, 1-based.
    pub day: u32,
    /// Hour of the day, 0-based.
    pub hour: u32,
    /// Minute of the hour, 0-based.
    pub minute: u32,
}

impl WorldTimestamp {
    /// Assemble a timestamp from raw fields.
    ///
    /// No range validation happens here; the calendar is the authority on
    /// which field values are meaningful and rejects out-of-range values
    /// when it normalizes.
    pub const fn from_fields(year: u32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
        }
    }
}

impl core::fmt::Display for WorldTimestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Y{} M{:02} D{:02} {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_chronological_over_fields() {
        let earlier = WorldTimestamp::from_fields(1, 2, 30, 23, 0);
        let later = WorldTimestamp::from_fields(1, 3, 1, 1, 0);
        assert!(earlier < later);

        let same_day_earlier = WorldTimestamp::from_fields(3, 7, 14, 8, 59);
        let same_day_later = WorldTimestamp::from_fields(3, 7, 14, 9, 0);
        assert!(same_day_earlier < same_day_later);
    }

    #[test]
    fn display_is_compact() {
        let ts = WorldTimestamp::from_fields(12, 3, 1, 7, 5);
        assert_eq!(ts.to_string(), "Y12 M03 D01 07:05");
    }

    #[test]
    fn roundtrip_serde() {
        let ts = WorldTimestamp::from_fields(1, 1, 1, 0, 0);
        let json = serde_json::to_string(&ts).ok();
        assert!(json.is_some());
        let back: Result<WorldTimestamp, _> =
            serde_json::from_str(json.as_deref().unwrap_or(""));
        assert_eq!(back.ok(), Some(ts));
    }
}
