//! Lock-column version generation.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Produces the next value of a lock column.
///
/// `previous` is the version the writer loaded, `None` for a first insert.
/// The result must differ from `previous`.
pub trait VersionStrategy: Send + Sync {
    fn next(&self, previous: Option<i64>) -> i64;
}

/// Microsecond wall clock, forced monotonic within the process.
#[derive(Debug, Default)]
pub struct ClockVersion {
    last: AtomicI64,
}

impl ClockVersion {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }
}

impl VersionStrategy for ClockVersion {
    fn next(&self, previous: Option<i64>) -> i64 {
        let now = Utc::now().timestamp_micros();
        let floor = previous.map_or(now, |p| now.max(p.saturating_add(1)));
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = floor.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(current) => last = current,
            }
        }
    }
}

/// `previous + 1`, starting at 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct IncrementVersion;

impl VersionStrategy for IncrementVersion {
    fn next(&self, previous: Option<i64>) -> i64 {
        previous.map_or(1, |p| p.saturating_add(1))
    }
}

/// Configurable choice of [`VersionStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
    #[default]
    Clock,
    Increment,
}

impl VersionKind {
    #[must_use]
    pub fn build(self) -> Box<dyn VersionStrategy> {
        match self {
            VersionKind::Clock => Box::new(ClockVersion::new()),
            VersionKind::Increment => Box::new(IncrementVersion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_strictly_increasing() {
        let clock = ClockVersion::new();
        let mut last = clock.next(None);
        for _ in 0..1000 {
            let next = clock.next(None);
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn clock_jumps_past_a_future_version() {
        let clock = ClockVersion::new();
        let future = Utc::now().timestamp_micros() + 60_000_000;
        assert_eq!(clock.next(Some(future)), future + 1);
    }

    #[test]
    fn increment_counts_from_one() {
        assert_eq!(IncrementVersion.next(None), 1);
        assert_eq!(IncrementVersion.next(Some(41)), 42);
    }

    #[test]
    fn kind_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: VersionKind,
        }
        let parsed: Wrapper = serde_json::from_str(r#"{"kind":"increment"}"#).unwrap();
        assert_eq!(parsed.kind, VersionKind::Increment);
    }
}
