use crate::{
    error::{ErrorCode, KafkaError},
    log::{self, LogLevel, SyslogLevel, error, trace, warn},
};
use std::{sync::Arc, time::Duration};

/// Client-level callbacks.
///
/// No method is ever called from a native background thread: events are
/// queued by the native client and these callbacks run on the thread that
/// calls `poll` (or `flush`/`consume`), one at a time.
pub trait ClientContext: Send + Sync {
    /// Log level below which native log lines are discarded before being
    /// queued.
    fn log_level(&self) -> LogLevel {
        LogLevel::Info
    }

    /// Receives log lines emitted by the native client.
    ///
    /// The default implementation forwards them to the logging facade.
    fn log(&self, level: SyslogLevel, fac: &str, log_message: &str) {
        log::forward(level, fac, log_message);
    }

    /// Receives global errors, i.e. errors not tied to a single message.
    ///
    /// These are informational: the native client recovers on its own unless
    /// the error is fatal.
    fn error(&self, error: KafkaError, reason: &str) {
        error!("global error: {error}: {reason}");
    }

    /// Receives the statistics JSON emitted every `statistics.interval.ms`.
    fn stats(&self, json: String) {
        trace!("client stats: {json}");
    }

    /// Receives broker throttling reports.
    fn throttle(&self, event: ThrottleEvent) {
        warn!("{event}");
    }
}

impl<C: ClientContext + ?Sized> ClientContext for Arc<C> {
    fn log_level(&self) -> LogLevel {
        (**self).log_level()
    }

    fn log(&self, level: SyslogLevel, fac: &str, log_message: &str) {
        (**self).log(level, fac, log_message)
    }

    fn error(&self, error: KafkaError, reason: &str) {
        (**self).error(error, reason)
    }

    fn stats(&self, json: String) {
        (**self).stats(json)
    }

    fn throttle(&self, event: ThrottleEvent) {
        (**self).throttle(event)
    }
}

#[derive(Debug, Default, Clone)]
pub struct DefaultClientContext;

impl ClientContext for DefaultClientContext {}

/// A broker throttled one of the client's requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleEvent {
    pub broker_name: String,
    pub broker_id: i32,
    pub throttle_time: Duration,
}

impl std::fmt::Display for ThrottleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} throttled for {}ms",
            self.broker_name,
            self.broker_id,
            self.throttle_time.as_millis()
        )
    }
}

/// Events common to every client type, queued by native clients.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Log {
        level: SyslogLevel,
        fac: String,
        message: String,
    },
    Error {
        code: ErrorCode,
        reason: String,
    },
    Stats(String),
    Throttle(ThrottleEvent),
}

impl ClientEvent {
    /// Runs the matching [`ClientContext`] callback.
    ///
    /// Only called while serving the event queue.
    pub fn dispatch<C: ClientContext + ?Sized>(self, context: &C) {
        match self {
            ClientEvent::Log {
                level,
                fac,
                message,
            } => context.log(level, &fac, &message),
            ClientEvent::Error { code, reason } => context.error(KafkaError::Global(code), &reason),
            ClientEvent::Stats(json) => context.stats(json),
            ClientEvent::Throttle(event) => context.throttle(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ClientContext for Recorder {
        fn error(&self, error: KafkaError, reason: &str) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{:?}:{reason}", error.rdkafka_error_code()));
        }

        fn stats(&self, json: String) {
            self.0.lock().unwrap().push(json);
        }
    }

    #[test]
    fn events_reach_context_callbacks() {
        let context = Arc::new(Recorder::default());
        ClientEvent::Error {
            code: ErrorCode::BrokerTransportFailure,
            reason: "down".into(),
        }
        .dispatch(&context);
        ClientEvent::Stats("{}".into()).dispatch(&context);
        // default implementation, only logs
        ClientEvent::Throttle(ThrottleEvent {
            broker_name: "localhost:9092".into(),
            broker_id: 1,
            throttle_time: Duration::from_millis(5),
        })
        .dispatch(&context);

        assert_eq!(
            *context.0.lock().unwrap(),
            vec!["Some(BrokerTransportFailure):down".to_string(), "{}".to_string()]
        );
    }
}
