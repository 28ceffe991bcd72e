//! An in-process native core for tests and examples.
//!
//! A [`MockCluster`] keeps topic logs, committed offsets and injected
//! failures in memory. [`MockProducer`] and [`MockConsumer`] implement the
//! native traits against it and find it through `bootstrap.servers`:
//!
//! ```
//! use rdkafka2_shim::{mock::{MockCluster, MockProducer}, producer::{Producer, Record}};
//!
//! let cluster = MockCluster::new(3).unwrap();
//! let producer = Producer::<String, String, ()>::builder()
//!     .config([("bootstrap.servers", cluster.bootstrap_servers())])
//!     .try_build::<MockProducer>()
//!     .unwrap();
//! let value = "hello".to_string();
//! producer
//!     .produce(Record::builder().topic("events").value(&value).build())
//!     .unwrap();
//! producer.flush(std::time::Duration::from_secs(5)).unwrap();
//! assert_eq!(cluster.records("events").len(), 1);
//! ```

use crate::{
    config::ClientConfig,
    error::{ErrorCode, KafkaError, Result},
    message::{DeliveryResult, OwnedMessage, PARTITION_UA},
    util::{lock, remaining},
};
use once_cell::sync::Lazy;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Condvar, Mutex, Weak,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

pub use consumer::MockConsumer;
pub use producer::MockProducer;

mod consumer;
mod producer;

static CLUSTERS: Lazy<Mutex<HashMap<String, Weak<ClusterInner>>>> = Lazy::new(Default::default);

static NEXT_CLUSTER_ID: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Default)]
pub(crate) struct ClusterState {
    topics: HashMap<String, Vec<Vec<OwnedMessage>>>,
    injected: HashMap<String, VecDeque<ErrorCode>>,
    committed: HashMap<(String, String, i32), i64>,
    throttle: Option<Duration>,
    fetch_injected: HashMap<String, VecDeque<ErrorCode>>,
}

impl ClusterState {
    pub(crate) fn throttle_time(&self) -> Option<Duration> {
        self.throttle
    }

    pub(crate) fn take_fetch_error(&mut self, topic: &str) -> Option<ErrorCode> {
        self.fetch_injected.get_mut(topic)?.pop_front()
    }

    pub(crate) fn partition_count(&self, topic: &str) -> Option<i32> {
        self.topics.get(topic).map(|p| p.len() as i32)
    }

    /// Offset the next appended message will get.
    pub(crate) fn high_watermark(&self, topic: &str, partition: i32) -> i64 {
        self.log(topic, partition).map_or(0, |log| log.len() as i64)
    }

    pub(crate) fn record(&self, topic: &str, partition: i32, offset: i64) -> Option<&OwnedMessage> {
        let offset = usize::try_from(offset).ok()?;
        self.log(topic, partition)?.get(offset)
    }

    pub(crate) fn committed(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }

    fn log(&self, topic: &str, partition: i32) -> Option<&Vec<OwnedMessage>> {
        self.topics.get(topic)?.get(usize::try_from(partition).ok()?)
    }
}

#[derive(Debug)]
pub(crate) struct ClusterInner {
    bootstrap_servers: String,
    default_partitions: i32,
    state: Mutex<ClusterState>,
    appended: Condvar,
}

impl ClusterInner {
    /// Finds the cluster named by the `bootstrap.servers` property.
    pub(crate) fn lookup(config: &ClientConfig) -> Result<Arc<ClusterInner>> {
        let servers = config.get("bootstrap.servers").ok_or_else(|| {
            KafkaError::ClientCreation("\"bootstrap.servers\" must be set".to_string())
        })?;
        lock(&CLUSTERS)
            .get(servers)
            .and_then(Weak::upgrade)
            .ok_or_else(|| KafkaError::ClientCreation(format!("no mock cluster at {servers}")))
    }

    pub(crate) fn bootstrap_servers(&self) -> &str {
        &self.bootstrap_servers
    }

    /// Appends `msg` to its topic, creating the topic if `auto_create` is
    /// set. `partitioner` picks the partition of unassigned messages given
    /// the partition count.
    pub(crate) fn append<P>(&self, mut msg: OwnedMessage, auto_create: bool, partitioner: P) -> DeliveryResult
    where
        P: FnOnce(&OwnedMessage, i32) -> i32,
    {
        let mut state = lock(&self.state);

        if let Some(code) = state
            .injected
            .get_mut(msg.topic())
            .and_then(VecDeque::pop_front)
        {
            return Err(fail(msg, KafkaError::MessageProduction(code)));
        }

        if !state.topics.contains_key(msg.topic()) {
            if !auto_create {
                return Err(fail(
                    msg,
                    KafkaError::MessageProduction(ErrorCode::UnknownTopicOrPartition),
                ));
            }
            let partitions = vec![Vec::new(); self.default_partitions as usize];
            state.topics.insert(msg.topic().to_string(), partitions);
        }

        let count = state.partition_count(msg.topic()).unwrap_or_default();
        let partition = match msg.partition() {
            PARTITION_UA => partitioner(&msg, count),
            p if (0..count).contains(&p) => p,
            _ => return Err(fail(msg, KafkaError::MessageProduction(ErrorCode::UnknownPartition))),
        };

        let Some(log) = state
            .topics
            .get_mut(msg.topic())
            .and_then(|partitions| partitions.get_mut(partition as usize))
        else {
            return Err(fail(msg, KafkaError::MessageProduction(ErrorCode::UnknownPartition)));
        };
        msg.set_partition(partition);
        msg.set_offset(log.len() as i64);
        log.push(msg.clone());
        drop(state);

        self.appended.notify_all();
        Ok(msg)
    }

    pub(crate) fn commit<'a, I>(&self, group: &str, offsets: I)
    where
        I: IntoIterator<Item = (&'a str, i32, i64)>,
    {
        let mut state = lock(&self.state);
        for (topic, partition, offset) in offsets {
            state
                .committed
                .insert((group.to_string(), topic.to_string(), partition), offset);
        }
    }

    /// Runs `f` against the cluster state until it yields a value, waiting
    /// for appends in between, or until `deadline` passes.
    pub(crate) fn wait_for<T, F>(&self, deadline: Option<Instant>, mut f: F) -> Option<T>
    where
        F: FnMut(&ClusterState) -> Option<T>,
    {
        let mut state = lock(&self.state);
        loop {
            if let Some(value) = f(&state) {
                return Some(value);
            }
            state = match remaining(deadline) {
                None => self
                    .appended
                    .wait(state)
                    .unwrap_or_else(std::sync::PoisonError::into_inner),
                Some(left) if left.is_zero() => return None,
                Some(left) => {
                    self.appended
                        .wait_timeout(state, left)
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    pub(crate) fn state(&self) -> std::sync::MutexGuard<'_, ClusterState> {
        lock(&self.state)
    }
}

fn fail(mut msg: OwnedMessage, err: KafkaError) -> (KafkaError, OwnedMessage) {
    msg.set_error(Some(err.clone()));
    (err, msg)
}

/// An in-memory cluster.
///
/// Clients connect to it by setting `bootstrap.servers` to
/// [`bootstrap_servers`](MockCluster::bootstrap_servers). The cluster stops
/// accepting new clients once dropped; connected clients keep their data.
#[derive(Debug)]
pub struct MockCluster {
    inner: Arc<ClusterInner>,
}

impl MockCluster {
    /// Creates a cluster whose auto-created topics get `default_partitions`
    /// partitions.
    pub fn new(default_partitions: i32) -> Result<Self> {
        if default_partitions < 1 {
            return Err(KafkaError::MockCluster(ErrorCode::InvalidArgument));
        }
        let id = NEXT_CLUSTER_ID.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(ClusterInner {
            bootstrap_servers: format!("mock-{id}:9092"),
            default_partitions,
            state: Mutex::new(ClusterState::default()),
            appended: Condvar::new(),
        });
        lock(&CLUSTERS).insert(inner.bootstrap_servers.clone(), Arc::downgrade(&inner));
        Ok(Self { inner })
    }

    /// The value to use as `bootstrap.servers`.
    pub fn bootstrap_servers(&self) -> &str {
        self.inner.bootstrap_servers()
    }

    /// Creates `topic` with `partitions` partitions. Creating an existing
    /// topic does nothing.
    pub fn create_topic(&self, topic: &str, partitions: i32) -> Result<()> {
        if partitions < 1 || topic.is_empty() {
            return Err(KafkaError::MockCluster(ErrorCode::InvalidArgument));
        }
        self.inner
            .state()
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions as usize]);
        Ok(())
    }

    /// All messages stored in `topic`, by partition then offset.
    pub fn records(&self, topic: &str) -> Vec<OwnedMessage> {
        self.inner
            .state()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes the next delivery to `topic` fail with `code`. Injections
    /// queue up, one per delivery.
    pub fn inject_error(&self, topic: &str, code: ErrorCode) {
        self.inner
            .state()
            .injected
            .entry(topic.to_string())
            .or_default()
            .push_back(code);
    }

    /// Makes the next fetch of `topic` by a subscribed consumer return an
    /// error message with `code`. Injections queue up, one per fetch.
    pub fn inject_fetch_error(&self, topic: &str, code: ErrorCode) {
        self.inner
            .state()
            .fetch_injected
            .entry(topic.to_string())
            .or_default()
            .push_back(code);
    }

    /// Makes the broker report a throttle of `throttle_time` for every
    /// produce and fetch request, `None` to stop.
    pub fn set_throttle(&self, throttle_time: Option<Duration>) {
        self.inner.state().throttle = throttle_time;
    }

    /// Offset committed by `group` for a partition.
    pub fn committed_offset(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.inner.state().committed(group, topic, partition)
    }
}

impl Drop for MockCluster {
    fn drop(&mut self) {
        lock(&CLUSTERS).remove(self.inner.bootstrap_servers());
    }
}
