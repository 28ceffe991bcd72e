#![allow(dead_code)]

use rand::{Rng, distr::Alphanumeric};
use rdkafka2_shim::{
    ClientConfig, Result, Timeout,
    codec::Payload,
    consumer::{DefaultConsumerContext, NativeConsumer},
    message::{
        BaseRecord, CommitMode, DeliveryCallback, OwnedMessage, Timestamp, TopicPartitionList,
    },
    mock::MockCluster,
    producer::{DefaultProducerContext, NativeProducer},
};
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn generate_random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn mock_cluster() -> MockCluster {
    init_logger();
    MockCluster::new(3).expect("mock cluster to be created")
}

pub fn mock_config(cluster: &MockCluster) -> ClientConfig {
    ClientConfig::from_iter([
        ("bootstrap.servers", cluster.bootstrap_servers()),
        ("client.id", "shim-tests"),
    ])
}

pub fn wait() -> Timeout {
    Timeout::After(Duration::from_secs(5))
}

pub fn raw_message(topic: &str, offset: i64, key: Option<&[u8]>, value: Option<&[u8]>) -> OwnedMessage {
    OwnedMessage::new(
        topic,
        0,
        offset,
        key.map(<[u8]>::to_vec),
        value.map(<[u8]>::to_vec),
        Timestamp::CreateTime(1_700_000_000_000),
        None,
    )
}

/// What a [`RecordingProducer`] received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Produced {
    pub topic: String,
    pub partition: i32,
    pub key: Payload,
    pub payload: Payload,
}

/// Native producer keeping every record and reporting them all as delivered
/// on the next poll.
#[derive(Default)]
pub struct RecordingProducer {
    produced: Mutex<Vec<Produced>>,
    pending: Mutex<Vec<(OwnedMessage, Option<DeliveryCallback>)>>,
}

impl RecordingProducer {
    pub fn produced(&self) -> Vec<Produced> {
        self.produced.lock().unwrap().clone()
    }
}

impl NativeProducer for RecordingProducer {
    type Context = DefaultProducerContext;

    fn from_config(_: ClientConfig, _: Self::Context) -> Result<Self> {
        Ok(Self::default())
    }

    fn produce(&self, record: BaseRecord) -> Result<()> {
        self.produced.lock().unwrap().push(Produced {
            topic: record.topic.clone(),
            partition: record.partition,
            key: record.key.clone(),
            payload: record.payload.clone(),
        });
        let msg = OwnedMessage::new(
            record.topic,
            record.partition.max(0),
            0,
            record.key,
            record.payload,
            Timestamp::CreateTime(record.timestamp),
            record.headers,
        );
        self.pending.lock().unwrap().push((msg, record.on_delivery));
        Ok(())
    }

    fn poll(&self, _: Timeout) -> Result<usize> {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        let served = pending.len();
        for (msg, callback) in pending {
            if let Some(callback) = callback {
                callback(Ok(msg));
            }
        }
        Ok(served)
    }

    fn flush(&self, timeout: Timeout) -> Result<()> {
        self.poll(timeout).map(|_| ())
    }

    fn in_flight_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Native consumer handing out a fixed script of messages and counting the
/// calls it receives.
#[derive(Default)]
pub struct ScriptedConsumer {
    script: Mutex<VecDeque<OwnedMessage>>,
    calls: AtomicUsize,
}

impl ScriptedConsumer {
    pub fn new<I: IntoIterator<Item = OwnedMessage>>(script: I) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of fetch calls (`poll` or `consume`) received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NativeConsumer for ScriptedConsumer {
    type Context = DefaultConsumerContext;

    fn from_config(_: ClientConfig, _: Self::Context) -> Result<Self> {
        Ok(Self::default())
    }

    fn subscribe(&self, _: &[&str]) -> Result<()> {
        Ok(())
    }

    fn unsubscribe(&self) -> Result<()> {
        Ok(())
    }

    fn assignment(&self) -> Result<TopicPartitionList> {
        Ok(TopicPartitionList::new())
    }

    fn poll(&self, _: Timeout) -> Result<Option<OwnedMessage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.script.lock().unwrap().pop_front())
    }

    fn consume(&self, num_messages: usize, _: Timeout) -> Result<Vec<OwnedMessage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let take = num_messages.min(script.len());
        Ok(script.drain(..take).collect())
    }

    fn commit(&self, _: CommitMode) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
