use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Timeout {
    /// Time out after the specified duration elapses.
    After(Duration),
    /// Do not block, only serve what is already available.
    NonBlock,
    /// Block forever.
    Never,
}

impl Timeout {
    /// Converts a timeout expressed in seconds, where any negative value
    /// means "block indefinitely" and zero means "do not block".
    pub fn from_secs_f64(secs: f64) -> Timeout {
        if secs < 0.0 || secs.is_nan() {
            Timeout::Never
        } else {
            Duration::try_from_secs_f64(secs)
                .map(Timeout::from)
                .unwrap_or(Timeout::Never)
        }
    }

    /// Converts a timeout to Kafka's expected representation.
    pub fn as_millis(&self) -> i32 {
        match self {
            Timeout::After(d) => d.as_millis().min(i32::MAX as u128) as i32,
            Timeout::NonBlock => 0,
            Timeout::Never => -1,
        }
    }

    /// Returns the instant at which a wait started now has to give up, or
    /// `None` when it may wait forever.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::After(d) => Some(Instant::now().checked_add(*d)?),
            Timeout::NonBlock => Some(Instant::now()),
            Timeout::Never => None,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(value: Duration) -> Self {
        if value.is_zero() {
            Timeout::NonBlock
        } else {
            Timeout::After(value)
        }
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(value: Option<Duration>) -> Self {
        value.map(Timeout::from).unwrap_or(Timeout::Never)
    }
}

/// Time left until `deadline`, `None` meaning forever.
pub(crate) fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicking callback must not wedge the client
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_from_seconds() {
        assert_eq!(Timeout::from_secs_f64(-1.0), Timeout::Never);
        assert_eq!(Timeout::from_secs_f64(0.0), Timeout::NonBlock);
        assert_eq!(
            Timeout::from_secs_f64(1.5),
            Timeout::After(Duration::from_millis(1500))
        );
        assert_eq!(Timeout::from_secs_f64(1.5).as_millis(), 1500);
        assert_eq!(Timeout::Never.as_millis(), -1);
        assert_eq!(Timeout::from(None), Timeout::Never);
        assert!(Timeout::Never.deadline().is_none());
    }
}
