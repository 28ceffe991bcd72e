use super::ClusterInner;
use crate::{
    client::{ClientContext, ClientEvent, ThrottleEvent},
    config::ClientConfig,
    error::{ErrorCode, KafkaError, Result},
    log::{SyslogLevel, debug},
    message::{
        BaseRecord, DeliveryCallback, DeliveryResult, OFFSET_INVALID, OwnedMessage, Timestamp,
    },
    producer::{DefaultProducerContext, NativeProducer, ProducerContext},
    queue::EventQueue,
    util::{Timeout, lock, now_millis, remaining},
};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

enum ProducerEvent {
    Delivery {
        result: DeliveryResult,
        callback: Option<DeliveryCallback>,
    },
    Client(ClientEvent),
}

struct Job {
    msg: OwnedMessage,
    callback: Option<DeliveryCallback>,
}

struct Shared<C> {
    name: String,
    context: C,
    cluster: Arc<ClusterInner>,
    events: EventQueue<ProducerEvent>,
    in_flight: AtomicUsize,
    delivered: AtomicU64,
    auto_create: bool,
}

impl<C: ClientContext> Shared<C> {
    fn log(&self, level: SyslogLevel, fac: &str, message: String) {
        if self.context.log_level().allows(level) {
            self.events.push(ProducerEvent::Client(ClientEvent::Log {
                level,
                fac: fac.to_string(),
                message,
            }));
        }
    }
}

/// A producer appending to a [`MockCluster`](super::MockCluster) from a
/// background worker.
///
/// Honors `queue.buffering.max.messages` (default `100000`),
/// `allow.auto.create.topics` (default `true`), `statistics.interval.ms`
/// (default `0`, disabled) and `client.id`.
pub struct MockProducer<C = DefaultProducerContext> {
    shared: Arc<Shared<C>>,
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    max_messages: usize,
    closed: AtomicBool,
}

impl<C> MockProducer<C>
where
    C: ProducerContext,
{
    fn dispatch(&self, event: ProducerEvent) {
        match event {
            ProducerEvent::Delivery { result, callback } => {
                self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                match callback {
                    Some(callback) => callback(result),
                    None => self.shared.context.delivery(result),
                }
            }
            ProducerEvent::Client(event) => event.dispatch(&self.shared.context),
        }
    }

    fn serve(&self, deadline: Option<Instant>) -> usize {
        self.shared.events.serve(deadline, |event| self.dispatch(event))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(KafkaError::ClientClosed)
        } else {
            Ok(())
        }
    }
}

impl<C> NativeProducer for MockProducer<C>
where
    C: ProducerContext + 'static,
{
    type Context = C;

    fn from_config(config: ClientConfig, context: C) -> Result<Self> {
        let cluster = ClusterInner::lookup(&config)?;
        let max_messages = config
            .parse_or("queue.buffering.max.messages", 100_000_usize)
            .map_err(KafkaError::ClientCreation)?;
        let auto_create = config
            .parse_or("allow.auto.create.topics", true)
            .map_err(KafkaError::ClientCreation)?;
        let stats_interval = config
            .parse_or("statistics.interval.ms", 0_u64)
            .map_err(KafkaError::ClientCreation)?;
        let name = config
            .get("client.id")
            .cloned()
            .unwrap_or_else(|| "rdkafka".to_string());

        let shared = Arc::new(Shared {
            name,
            context,
            cluster,
            events: EventQueue::new(),
            in_flight: AtomicUsize::new(0),
            delivered: AtomicU64::new(0),
            auto_create,
        });
        let (tx, rx) = mpsc::channel();
        let worker = {
            let shared = shared.clone();
            let stats_interval = (stats_interval > 0).then(|| Duration::from_millis(stats_interval));
            thread::Builder::new()
                .name(format!("{}-producer", shared.name))
                .spawn(move || run_worker(&shared, rx, stats_interval))
                .map_err(|e| KafkaError::ClientCreation(e.to_string()))?
        };
        debug!(
            "{}: mock producer connected to {}",
            shared.name,
            shared.cluster.bootstrap_servers()
        );

        Ok(Self {
            shared,
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            max_messages,
            closed: AtomicBool::new(false),
        })
    }

    fn produce(&self, record: BaseRecord) -> Result<()> {
        self.ensure_open()?;

        let BaseRecord {
            topic,
            partition,
            payload,
            key,
            timestamp,
            headers,
            on_delivery,
        } = record;
        if topic.is_empty() {
            return Err(KafkaError::InvalidArgument("topic must not be empty".to_string()));
        }

        self.shared
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_messages).then_some(n + 1)
            })
            .map_err(|_| KafkaError::MessageProduction(ErrorCode::QueueFull))?;

        let timestamp = if timestamp == 0 { now_millis() } else { timestamp };
        let job = Job {
            msg: OwnedMessage::new(
                topic,
                partition,
                OFFSET_INVALID,
                key,
                payload,
                Timestamp::CreateTime(timestamp),
                headers,
            ),
            callback: on_delivery,
        };
        let sent = lock(&self.jobs)
            .as_ref()
            .map(|jobs| jobs.send(job).is_ok())
            .unwrap_or_default();
        if !sent {
            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(KafkaError::MessageProduction(ErrorCode::Fail));
        }
        Ok(())
    }

    fn poll(&self, timeout: Timeout) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.serve(timeout.deadline()))
    }

    fn flush(&self, timeout: Timeout) -> Result<()> {
        self.ensure_open()?;
        let deadline = timeout.deadline();
        self.serve(Some(Instant::now()));
        let in_flight = || self.shared.in_flight.load(Ordering::SeqCst);
        loop {
            if in_flight() == 0 {
                return Ok(());
            }
            if remaining(deadline).is_some_and(|left| left.is_zero()) {
                return Err(KafkaError::Flush(ErrorCode::OperationTimedOut));
            }
            // reports served by a concurrent poll also end the wait
            self.shared
                .events
                .serve_while(deadline, || in_flight() > 0, |event| self.dispatch(event));
        }
    }

    fn in_flight_count(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        self.ensure_open()?;
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown();
        debug!(
            "{}: closed with {} messages awaiting a report",
            self.shared.name,
            self.in_flight_count()
        );
        Ok(())
    }
}

impl<C> MockProducer<C> {
    fn shutdown(&self) {
        // the worker drains queued jobs before noticing the disconnect
        lock(&self.jobs).take();
        if let Some(worker) = lock(&self.worker).take() {
            if worker.join().is_err() {
                debug!("{}: producer worker panicked", self.shared.name);
            }
        }
    }
}

impl<C> Drop for MockProducer<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<C: ClientContext>(
    shared: &Shared<C>,
    jobs: mpsc::Receiver<Job>,
    stats_interval: Option<Duration>,
) {
    let mut round_robin = 0_usize;
    let mut next_stats = stats_interval.map(|every| Instant::now() + every);

    loop {
        let job = match next_stats {
            None => jobs.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
            Some(at) => jobs.recv_timeout(at.saturating_duration_since(Instant::now())),
        };
        match job {
            Ok(job) => deliver(shared, job, &mut round_robin),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                shared.events.push(ProducerEvent::Client(ClientEvent::Stats(stats(shared))));
                next_stats = stats_interval.map(|every| Instant::now() + every);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn deliver<C: ClientContext>(shared: &Shared<C>, job: Job, round_robin: &mut usize) {
    let Job { msg, callback } = job;

    let (topic_exists, throttle_time) = {
        let state = shared.cluster.state();
        (state.partition_count(msg.topic()).is_some(), state.throttle_time())
    };
    if let Some(throttle_time) = throttle_time {
        shared.events.push(ProducerEvent::Client(ClientEvent::Throttle(ThrottleEvent {
            broker_name: shared.cluster.bootstrap_servers().to_string(),
            broker_id: 1,
            throttle_time,
        })));
    }
    if !topic_exists && shared.auto_create {
        shared.log(
            SyslogLevel::Info,
            "TOPIC",
            format!("auto-creating topic \"{}\"", msg.topic()),
        );
    }

    let result = shared
        .cluster
        .append(msg, shared.auto_create, |msg, count| match msg.key_bytes() {
            Some(key) => partition_for_key(key, count),
            None => {
                *round_robin = round_robin.wrapping_add(1);
                (*round_robin % count as usize) as i32
            }
        });

    if let Err((err, msg)) = &result {
        if err.rdkafka_error_code() == Some(ErrorCode::BrokerTransportFailure) {
            shared.events.push(ProducerEvent::Client(ClientEvent::Error {
                code: ErrorCode::BrokerTransportFailure,
                reason: format!("{}: connection lost", shared.cluster.bootstrap_servers()),
            }));
        }
        shared.log(
            SyslogLevel::Warning,
            "DELIVERY",
            format!("{} [{}]: {err}", msg.topic(), msg.partition()),
        );
    } else {
        shared.delivered.fetch_add(1, Ordering::Relaxed);
    }

    shared
        .events
        .push(ProducerEvent::Delivery { result, callback });
}

fn partition_for_key(key: &[u8], count: i32) -> i32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % count as u64) as i32
}

fn stats<C>(shared: &Shared<C>) -> String {
    serde_json::json!({
        "name": shared.name,
        "type": "producer",
        "ts": now_millis() * 1000,
        "msg_cnt": shared.in_flight.load(Ordering::SeqCst),
        "replyq": shared.events.len(),
        "txmsgs": shared.delivered.load(Ordering::Relaxed),
    })
    .to_string()
}
