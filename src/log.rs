//! A wrapper module to export logging functionality from
//! [`log`] or [`tracing`] depending on the `tracing` feature.
//!
//! [`log`]: https://docs.rs/log
//! [`tracing`]: https://docs.rs/tracing

#[cfg(not(feature = "tracing"))]
pub use log::{debug, error, info, trace, warn};

#[cfg(feature = "tracing")]
pub use tracing::{debug, error, info, trace, warn};

/// Syslog [log levels](https://en.wikipedia.org/wiki/Syslog#Severity_level)
/// as emitted by native clients.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum SyslogLevel {
    /// Higher priority then [`Level::Error`](log::Level::Error) from the log
    /// crate.
    Emerg = 0,
    /// Higher priority then [`Level::Error`](log::Level::Error) from the log
    /// crate.
    Alert = 1,
    /// Higher priority then [`Level::Error`](log::Level::Error) from the log
    /// crate.
    Critical = 2,
    /// Equivalent to [`Level::Error`](log::Level::Error) from the log crate.
    Error = 3,
    /// Equivalent to [`Level::Warn`](log::Level::Warn) from the log crate.
    Warning = 4,
    /// Higher priority then [`Level::Info`](log::Level::Info) from the log
    /// crate.
    Notice = 5,
    /// Equivalent to [`Level::Info`](log::Level::Info) from the log crate.
    Info = 6,
    /// Equivalent to [`Level::Debug`](log::Level::Debug) from the log crate.
    Debug = 7,
}

/// Log levels from [kafka spec](https://cwiki.apache.org/confluence/display/KAFKA/KIP-412%3A+Extend+Admin+API+to+support+dynamic+application+log+levels#KIP412:ExtendAdminAPItosupportdynamicapplicationloglevels-LogLevelDefinitions)
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// FATAL logs - syslog level 0
    Fatal = 0,
    /// ERROR logs - syslog level 3 and above
    Error,
    /// WARN logs - syslog level 4 and above
    Warn,
    /// INFO logs - syslog level 6 and above
    #[default]
    Info,
    /// DEBUG logs - syslog level 7 and above
    Debug,
}

impl LogLevel {
    /// Returns `true` if a native log line at `level` passes this filter.
    pub fn allows(&self, level: SyslogLevel) -> bool {
        LogLevel::from(level) <= *self
    }
}

impl From<LogLevel> for SyslogLevel {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Fatal => Self::Critical,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warning,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
        }
    }
}

impl From<SyslogLevel> for LogLevel {
    fn from(value: SyslogLevel) -> Self {
        match value {
            SyslogLevel::Emerg => Self::Fatal,
            SyslogLevel::Alert => Self::Fatal,
            SyslogLevel::Critical => Self::Fatal,
            SyslogLevel::Error => Self::Error,
            SyslogLevel::Warning => Self::Warn,
            SyslogLevel::Notice => Self::Warn,
            SyslogLevel::Info => Self::Info,
            SyslogLevel::Debug => Self::Debug,
        }
    }
}

/// Forwards a native log line to the logging facade.
pub(crate) fn forward(level: SyslogLevel, fac: &str, buf: &str) {
    match level {
        SyslogLevel::Emerg | SyslogLevel::Alert | SyslogLevel::Critical | SyslogLevel::Error => {
            error!("{fac}: {buf}")
        }
        SyslogLevel::Warning | SyslogLevel::Notice => warn!("{fac}: {buf}"),
        SyslogLevel::Info => info!("{fac}: {buf}"),
        SyslogLevel::Debug => debug!("{fac}: {buf}"),
    }
}
