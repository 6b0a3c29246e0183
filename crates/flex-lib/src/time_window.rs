//! Closed time intervals
//!
//! `TimeWindow` is the evaluation window every reconstruction and scoring
//! step is computed against. Ordering and containment predicates accept
//! either an instant or another window through the [`Span`] trait.

use crate::error::{FlexError, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Anything with a closed extent on the time line
pub trait Span {
    fn span_start(&self) -> DateTime<Utc>;
    fn span_end(&self) -> DateTime<Utc>;
}

impl Span for DateTime<Utc> {
    fn span_start(&self) -> DateTime<Utc> {
        *self
    }

    fn span_end(&self) -> DateTime<Utc> {
        *self
    }
}

/// A closed interval `[start, end]`, immutable once constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window, rejecting `start > end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(FlexError::InvalidWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// The whole calendar day `[00:00:00, 23:59:59]` in UTC
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = start + Duration::seconds(86_399);
        Self { start, end }
    }

    /// The calendar day `days_before` days before `now`
    pub fn days_before(now: DateTime<Utc>, days_before: u32) -> Self {
        let target = now - Duration::days(i64::from(days_before));
        Self::day(target.date_naive())
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the window
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// True if this window ends strictly before `other` begins
    pub fn before<S: Span>(&self, other: &S) -> bool {
        self.end < other.span_start()
    }

    /// True if this window starts strictly after `other` ends
    pub fn after<S: Span>(&self, other: &S) -> bool {
        self.start > other.span_end()
    }

    /// True if `other` lies entirely within this window, bounds included
    pub fn contains<S: Span>(&self, other: &S) -> bool {
        self.start <= other.span_start() && self.end >= other.span_end()
    }
}

impl Span for TimeWindow {
    fn span_start(&self) -> DateTime<Utc> {
        self.start
    }

    fn span_end(&self) -> DateTime<Utc> {
        self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    fn window(from: u32, to: u32) -> TimeWindow {
        TimeWindow::new(at(from, 0), at(to, 0)).unwrap()
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        assert!(TimeWindow::new(at(10, 0), at(9, 0)).is_err());
        assert!(TimeWindow::new(at(9, 0), at(9, 0)).is_ok());
    }

    #[test]
    fn test_day_covers_whole_day() {
        let day = TimeWindow::day(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(day.start(), at(0, 0));
        assert_eq!(day.end(), Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap());
        assert_eq!(day.duration().num_seconds(), 86_399);
    }

    #[test]
    fn test_days_before() {
        let now = Utc.with_ymd_and_hms(2024, 3, 11, 4, 30, 0).unwrap();
        let day = TimeWindow::days_before(now, 1);
        assert_eq!(day.start(), at(0, 0));
    }

    #[test]
    fn test_instant_predicates() {
        let w = window(8, 12);
        assert!(w.contains(&at(8, 0)));
        assert!(w.contains(&at(12, 0)));
        assert!(w.before(&at(13, 0)));
        assert!(w.after(&at(7, 0)));

        // before/after never overlap with contains for an instant
        for instant in [at(7, 0), at(8, 0), at(10, 0), at(12, 0), at(13, 0)] {
            let hits = [w.before(&instant), w.after(&instant), w.contains(&instant)];
            assert_eq!(hits.iter().filter(|h| **h).count(), 1);
        }
    }

    #[test]
    fn test_window_containment() {
        let outer = window(6, 18);
        let middle = window(8, 16);
        let inner = window(10, 12);

        assert!(outer.contains(&outer));
        assert!(outer.contains(&middle));
        assert!(middle.contains(&inner));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&middle));

        // Partial overlap is not containment
        assert!(!middle.contains(&window(7, 10)));
    }

    #[test]
    fn test_window_ordering() {
        let morning = window(6, 9);
        let evening = window(17, 20);
        assert!(morning.before(&evening));
        assert!(evening.after(&morning));
        assert!(!morning.before(&window(9, 10)));
    }
}
