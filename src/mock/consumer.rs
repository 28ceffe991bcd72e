use super::{ClusterInner, ClusterState};
use crate::{
    client::{ClientContext, ClientEvent, ThrottleEvent},
    config::ClientConfig,
    consumer::{ConsumerContext, DefaultConsumerContext, NativeConsumer},
    error::{ErrorCode, KafkaError, Result},
    log::{SyslogLevel, debug},
    message::{CommitMode, OFFSET_INVALID, OwnedMessage, PARTITION_UA, TopicPartitionList},
    queue::EventQueue,
    util::{Timeout, lock, now_millis},
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffsetReset {
    Earliest,
    Latest,
}

impl OffsetReset {
    fn parse(config: &ClientConfig) -> Result<Self> {
        match config.get("auto.offset.reset").map(String::as_str) {
            None | Some("latest" | "largest" | "end") => Ok(OffsetReset::Latest),
            Some("earliest" | "smallest" | "beginning") => Ok(OffsetReset::Earliest),
            Some(other) => Err(KafkaError::ClientCreation(format!(
                "invalid value for configuration property \"auto.offset.reset\": {other}"
            ))),
        }
    }
}

enum ConsumerEvent {
    Commit {
        result: Result<()>,
        offsets: TopicPartitionList,
    },
    Client(ClientEvent),
}

#[derive(Debug)]
struct Position {
    topic: String,
    partition: i32,
    offset: i64,
    at_eof: bool,
}

#[derive(Debug, Default)]
struct Membership {
    subscription: Vec<String>,
    assigned: Vec<Position>,
    cursor: usize,
}

impl Membership {
    /// Assigns partitions of subscribed topics that appeared since the last
    /// call, starting from the group's committed offset.
    fn refresh(&mut self, cluster: &ClusterState, group: &str, reset: OffsetReset) {
        for topic in &self.subscription {
            let count = cluster.partition_count(topic).unwrap_or_default();
            for partition in 0..count {
                let known = self
                    .assigned
                    .iter()
                    .any(|p| p.topic == *topic && p.partition == partition);
                if known {
                    continue;
                }
                let offset = cluster
                    .committed(group, topic, partition)
                    .unwrap_or_else(|| match reset {
                        OffsetReset::Earliest => 0,
                        OffsetReset::Latest => cluster.high_watermark(topic, partition),
                    });
                self.assigned.push(Position {
                    topic: topic.clone(),
                    partition,
                    offset,
                    at_eof: false,
                });
            }
        }
    }

    /// Next message of the assignment, visiting partitions in turn.
    fn fetch(&mut self, cluster: &ClusterState, partition_eof: bool) -> Option<OwnedMessage> {
        let len = self.assigned.len();
        for step in 0..len {
            let index = (self.cursor + step) % len;
            let position = &mut self.assigned[index];

            let fetched = match cluster.record(&position.topic, position.partition, position.offset) {
                Some(msg) => {
                    position.offset += 1;
                    position.at_eof = false;
                    Some(msg.clone())
                }
                None if partition_eof && !position.at_eof => {
                    position.at_eof = true;
                    Some(OwnedMessage::from_error(
                        position.topic.as_str(),
                        position.partition,
                        position.offset,
                        KafkaError::PartitionEOF(position.partition),
                    ))
                }
                None => None,
            };
            if fetched.is_some() {
                self.cursor = index + 1;
                return fetched;
            }
        }
        None
    }

    fn positions(&self) -> TopicPartitionList {
        let mut list = TopicPartitionList::new();
        for p in &self.assigned {
            list.add_partition_offset(&p.topic, p.partition, p.offset);
        }
        list
    }
}

/// A single-member group consumer reading from a
/// [`MockCluster`](super::MockCluster).
///
/// Requires `group.id`. Honors `auto.offset.reset` (default `latest`),
/// `enable.partition.eof` (default `false`), `statistics.interval.ms`
/// (default `0`, disabled) and `client.id`. Offsets are only committed
/// explicitly.
///
/// Broker events (statistics, throttling, transport errors) are raised by
/// the fetch calls themselves and served before they return.
pub struct MockConsumer<C = DefaultConsumerContext> {
    name: String,
    context: C,
    cluster: Arc<ClusterInner>,
    group_id: String,
    reset: OffsetReset,
    partition_eof: bool,
    stats_interval: Option<Duration>,
    next_stats: Mutex<Option<Instant>>,
    received: AtomicU64,
    events: EventQueue<ConsumerEvent>,
    membership: Mutex<Membership>,
    closed: AtomicBool,
}

impl<C> MockConsumer<C>
where
    C: ConsumerContext,
{
    fn dispatch(&self, event: ConsumerEvent) {
        match event {
            ConsumerEvent::Commit { result, offsets } => {
                self.context.commit_callback(result, &offsets)
            }
            ConsumerEvent::Client(event) => event.dispatch(&self.context),
        }
    }

    fn serve_pending(&self) -> usize {
        self.events
            .serve(Some(Instant::now()), |event| self.dispatch(event))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(KafkaError::ClientClosed)
        } else {
            Ok(())
        }
    }

    fn log(&self, level: SyslogLevel, fac: &str, message: String) {
        if self.context.log_level().allows(level) {
            self.events.push(ConsumerEvent::Client(ClientEvent::Log {
                level,
                fac: fac.to_string(),
                message,
            }));
        }
    }

    /// Queues the broker side events of one fetch request.
    fn fetch_request(&self) {
        let throttle_time = self.cluster.state().throttle_time();
        if let Some(throttle_time) = throttle_time {
            self.events.push(ConsumerEvent::Client(ClientEvent::Throttle(ThrottleEvent {
                broker_name: self.cluster.bootstrap_servers().to_string(),
                broker_id: 1,
                throttle_time,
            })));
        }

        let Some(every) = self.stats_interval else {
            return;
        };
        let now = Instant::now();
        let mut next_stats = lock(&self.next_stats);
        if (*next_stats).is_none_or(|at| now >= at) {
            self.events.push(ConsumerEvent::Client(ClientEvent::Stats(self.stats())));
            *next_stats = Some(now + every);
        }
    }

    fn stats(&self) -> String {
        let assignment_size = lock(&self.membership).assigned.len();
        serde_json::json!({
            "name": self.name,
            "type": "consumer",
            "ts": now_millis() * 1000,
            "replyq": self.events.len(),
            "rxmsgs": self.received.load(Ordering::Relaxed),
            "cgrp": {
                "group_id": self.group_id,
                "assignment_size": assignment_size,
            },
        })
        .to_string()
    }

    fn injected_failure(&self, membership: &Membership) -> Option<OwnedMessage> {
        let (topic, code) = {
            let mut cluster = self.cluster.state();
            membership.subscription.iter().find_map(|topic| {
                cluster
                    .take_fetch_error(topic)
                    .map(|code| (topic.clone(), code))
            })?
        };
        if code == ErrorCode::BrokerTransportFailure {
            self.events.push(ConsumerEvent::Client(ClientEvent::Error {
                code,
                reason: format!("{}: connection lost", self.cluster.bootstrap_servers()),
            }));
        }
        self.log(
            SyslogLevel::Warning,
            "FETCH",
            format!("{}: fetch of {topic} failed: {code}", self.group_id),
        );
        Some(OwnedMessage::from_error(
            topic,
            PARTITION_UA,
            OFFSET_INVALID,
            KafkaError::MessageConsumption(code),
        ))
    }

    fn next_message(&self, deadline: Option<Instant>) -> Option<OwnedMessage> {
        let mut membership = lock(&self.membership);
        if let Some(failure) = self.injected_failure(&membership) {
            return Some(failure);
        }
        let msg = self.cluster.wait_for(deadline, |cluster| {
            membership.refresh(cluster, &self.group_id, self.reset);
            membership.fetch(cluster, self.partition_eof)
        })?;
        if msg.error().is_none() {
            self.received.fetch_add(1, Ordering::Relaxed);
        }
        Some(msg)
    }
}

impl<C> NativeConsumer for MockConsumer<C>
where
    C: ConsumerContext,
{
    type Context = C;

    fn from_config(config: ClientConfig, context: C) -> Result<Self> {
        let cluster = ClusterInner::lookup(&config)?;
        let group_id = config
            .get("group.id")
            .filter(|id| !id.is_empty())
            .cloned()
            .ok_or_else(|| KafkaError::ClientCreation("\"group.id\" must be set".to_string()))?;
        let reset = OffsetReset::parse(&config)?;
        let partition_eof = config
            .parse_or("enable.partition.eof", false)
            .map_err(KafkaError::ClientCreation)?;
        let stats_interval = config
            .parse_or("statistics.interval.ms", 0_u64)
            .map_err(KafkaError::ClientCreation)?;
        let name = config
            .get("client.id")
            .cloned()
            .unwrap_or_else(|| "rdkafka".to_string());
        debug!(
            "mock consumer of group {group_id} connected to {}",
            cluster.bootstrap_servers()
        );

        Ok(Self {
            name,
            context,
            cluster,
            group_id,
            reset,
            partition_eof,
            stats_interval: (stats_interval > 0).then(|| Duration::from_millis(stats_interval)),
            next_stats: Mutex::new(None),
            received: AtomicU64::new(0),
            events: EventQueue::new(),
            membership: Mutex::new(Membership::default()),
            closed: AtomicBool::new(false),
        })
    }

    fn subscribe(&self, topics: &[&str]) -> Result<()> {
        self.ensure_open()?;
        if topics.is_empty() || topics.iter().any(|t| t.is_empty()) {
            return Err(KafkaError::Subscription(ErrorCode::InvalidArgument));
        }

        let mut membership = lock(&self.membership);
        membership.subscription = topics.iter().map(|t| t.to_string()).collect();
        membership.assigned.clear();
        membership.cursor = 0;
        membership.refresh(&self.cluster.state(), &self.group_id, self.reset);
        drop(membership);

        self.log(
            SyslogLevel::Info,
            "SUBSCRIBE",
            format!("{}: subscribed to {}", self.group_id, topics.join(",")),
        );
        Ok(())
    }

    fn unsubscribe(&self) -> Result<()> {
        self.ensure_open()?;
        *lock(&self.membership) = Membership::default();
        Ok(())
    }

    fn assignment(&self) -> Result<TopicPartitionList> {
        self.ensure_open()?;
        let mut membership = lock(&self.membership);
        membership.refresh(&self.cluster.state(), &self.group_id, self.reset);
        Ok(membership.positions())
    }

    fn poll(&self, timeout: Timeout) -> Result<Option<OwnedMessage>> {
        self.ensure_open()?;
        let deadline = timeout.deadline();
        self.fetch_request();
        self.serve_pending();
        Ok(self.next_message(deadline))
    }

    fn consume(&self, num_messages: usize, timeout: Timeout) -> Result<Vec<OwnedMessage>> {
        self.ensure_open()?;
        let deadline = timeout.deadline();
        self.fetch_request();
        self.serve_pending();

        let mut batch = Vec::with_capacity(num_messages.min(1024));
        while batch.len() < num_messages {
            match self.next_message(deadline) {
                Some(msg) => batch.push(msg),
                None => break,
            }
        }
        Ok(batch)
    }

    fn commit(&self, mode: CommitMode) -> Result<()> {
        self.ensure_open()?;
        let offsets = lock(&self.membership).positions();

        let result = if offsets.count() == 0 {
            Err(KafkaError::ConsumerCommit(ErrorCode::NoOffset))
        } else {
            self.cluster.commit(
                &self.group_id,
                offsets
                    .elements()
                    .iter()
                    .map(|e| (e.topic.as_str(), e.partition, e.offset)),
            );
            Ok(())
        };

        self.events.push(ConsumerEvent::Commit {
            result: result.clone(),
            offsets,
        });
        match mode {
            CommitMode::Sync => {
                self.serve_pending();
                result
            }
            CommitMode::Async => Ok(()),
        }
    }

    fn close(&self) -> Result<()> {
        self.ensure_open()?;
        self.closed.store(true, Ordering::SeqCst);
        *lock(&self.membership) = Membership::default();
        debug!("{}: consumer closed", self.group_id);
        Ok(())
    }
}

impl<C: ClientContext> std::fmt::Debug for MockConsumer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConsumer")
            .field("group_id", &self.group_id)
            .field("reset", &self.reset)
            .field("partition_eof", &self.partition_eof)
            .finish_non_exhaustive()
    }
}
