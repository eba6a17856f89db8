use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

/// Capture time of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogTime(DateTime<Utc>);

impl LogTime {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Milliseconds since the unix epoch.
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Milliseconds elapsed between `earlier` and `self`, negative if `earlier` is later.
    pub fn millis_since(&self, earlier: LogTime) -> i64 {
        self.as_millis() - earlier.as_millis()
    }

    /// Timestamp as shown at the start of every header.
    pub fn render(&self) -> impl fmt::Display + '_ {
        self.0.format("%Y-%m-%dT%H:%M:%S%.3f")
    }
}

/// Source of "current time" for the worker and the repeated message manager.
pub trait LogClock: Send + Sync {
    fn now(&self) -> LogTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl LogClock for SystemClock {
    fn now(&self) -> LogTime {
        LogTime::now()
    }
}


#[test]
fn test_log_time_deltas_and_render() {
    let start = LogTime::from_millis(1_700_000_000_000).unwrap();
    let later = LogTime::from_millis(1_700_000_001_250).unwrap();
    assert_eq!(later.millis_since(start), 1_250);
    assert_eq!(start.millis_since(later), -1_250);
    assert_eq!(start.render().to_string(), "2023-11-14T22:13:20.000");
}
