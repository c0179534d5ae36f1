//! Time sources used when checking token validity windows
//!
//! Validation code never reads the system time directly. Instead, it asks a
//! [`Clock`], which lets tests pin "now" to a known instant with a
//! [`TestClock`].

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Deserializer, Serialize};

/// Unix time
///
/// The number of whole seconds elapsed since 1970-01-01T00:00:00Z. This is
/// the representation used by the `exp` and `nbf` claims of a JWT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct UnixTime(pub u64);

impl UnixTime {
    /// Adds a duration, saturating at the maximum representable time
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_secs()))
    }

    /// Subtracts a duration, saturating at the Unix epoch
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration.as_secs()))
    }
}

impl From<SystemTime> for UnixTime {
    #[inline]
    fn from(t: SystemTime) -> Self {
        let secs = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());

        Self(secs)
    }
}

impl fmt::Display for UnixTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// NumericDate values may carry a fractional part; it is truncated.
impl<'de> Deserialize<'de> for UnixTime {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumericDate {
            Whole(u64),
            Fractional(f64),
        }

        match NumericDate::deserialize(deserializer)? {
            NumericDate::Whole(secs) => Ok(Self(secs)),
            NumericDate::Fractional(secs) if secs.is_finite() && secs >= 0.0 => {
                Ok(Self(secs.trunc() as u64))
            }
            NumericDate::Fractional(_) => Err(serde::de::Error::custom(
                "numeric date must be a non-negative, finite number",
            )),
        }
    }
}

/// Represents a clock, which can tell the current time
pub trait Clock {
    /// Gets the current time according to this clock
    fn now(&self) -> UnixTime;
}

impl<C: Clock + ?Sized> Clock for &'_ C {
    #[inline]
    fn now(&self) -> UnixTime {
        C::now(self)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now(&self) -> UnixTime {
        C::now(self)
    }
}

/// The system clock as provided by `std::time::SystemTime`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime::from(SystemTime::now())
    }
}

/// A manually driven clock
///
/// Clones share the same underlying time, so a clone handed to an
/// [`Authorizer`][crate::Authorizer] or a
/// [`CachedKeyDirectory`][crate::CachedKeyDirectory] can be advanced from
/// the outside.
#[derive(Clone, Debug, Default)]
pub struct TestClock(Arc<AtomicU64>);

impl TestClock {
    /// Creates a new test clock set to `time`
    #[must_use]
    pub fn new(time: UnixTime) -> Self {
        Self(Arc::new(AtomicU64::new(time.0)))
    }

    /// Sets the clock's current time
    pub fn set(&self, time: UnixTime) {
        self.0.store(time.0, Ordering::SeqCst);
    }

    /// Moves the clock forward by `secs` seconds
    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn numeric_dates_accept_fractional_seconds() -> Result<()> {
        let whole: UnixTime = serde_json::from_str("1700000000")?;
        let fractional: UnixTime = serde_json::from_str("1700000000.75")?;

        assert_eq!(whole, UnixTime(1_700_000_000));
        assert_eq!(fractional, whole);
        Ok(())
    }

    #[test]
    fn negative_numeric_dates_are_rejected() {
        assert!(serde_json::from_str::<UnixTime>("-5").is_err());
        assert!(serde_json::from_str::<UnixTime>("-5.5").is_err());
        assert!(serde_json::from_str::<UnixTime>("\"tomorrow\"").is_err());
    }

    #[test]
    fn test_clock_clones_share_time() {
        let clock = TestClock::new(UnixTime(100));
        let handle = clock.clone();

        handle.advance(25);
        assert_eq!(clock.now(), UnixTime(125));

        handle.set(UnixTime(10));
        assert_eq!(clock.now(), UnixTime(10));
    }

    #[test]
    fn saturating_arithmetic_does_not_wrap() {
        assert_eq!(
            UnixTime(5).saturating_sub(Duration::from_secs(10)),
            UnixTime(0)
        );
        assert_eq!(
            UnixTime(u64::MAX).saturating_add(Duration::from_secs(10)),
            UnixTime(u64::MAX)
        );
    }
}
