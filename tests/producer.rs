use common::{Produced, RecordingProducer, generate_random_string, mock_cluster, mock_config, wait};
use rdkafka2_shim::{
    ErrorCode, KafkaError, LogLevel, SyslogLevel, Timeout,
    client::{ClientContext, ThrottleEvent},
    codec::{BoxError, StringSerializer, serializer_fn},
    message::{DeliveryResult, OwnedHeaders, PARTITION_UA},
    mock::{MockCluster, MockProducer},
    producer::{Producer, ProducerContext, Record},
};
use rstest::{fixture, rstest};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

pub mod common;

#[fixture]
fn topic_name() -> String {
    generate_random_string(10)
}

#[fixture]
fn cluster() -> MockCluster {
    mock_cluster()
}

fn decimal<T: ToString + Send + Sync>() -> impl rdkafka2_shim::codec::Serializer<T> {
    serializer_fn(|_, v: Option<&T>| Ok(v.map(|v| v.to_string().into_bytes())))
}

fn mock_producer<K, V>(cluster: &MockCluster) -> Producer<K, V, MockProducer> {
    Producer::builder()
        .config(mock_config(cluster).iter())
        .try_build()
        .expect("producer to be built")
}

#[rstest]
fn value_serializer_output_is_enqueued(topic_name: String) {
    let producer = Producer::<String, i64, ()>::builder()
        .value_serializer(decimal::<i64>())
        .build_with(RecordingProducer::default());

    producer
        .produce(Record::builder().topic(&topic_name).value(&42).build())
        .expect("record to be enqueued");

    assert_eq!(
        producer.native().produced(),
        vec![Produced {
            topic: topic_name,
            partition: PARTITION_UA,
            key: None,
            payload: Some(b"42".to_vec()),
        }]
    );
}

#[rstest]
fn call_scoped_serializer_shadows_instance_one(topic_name: String) {
    let producer = Producer::<String, String, ()>::builder()
        .key_serializer(StringSerializer)
        .value_serializer(StringSerializer)
        .build_with(RecordingProducer::default());
    let shout = serializer_fn(|_, v: Option<&String>| {
        Ok(v.map(|v| v.to_uppercase().into_bytes()))
    });
    let (key, value) = ("k".to_string(), "v".to_string());

    producer
        .produce(
            Record::builder()
                .topic(&topic_name)
                .key(&key)
                .value(&value)
                .value_serializer(&shout)
                .build(),
        )
        .expect("record to be enqueued");
    producer
        .produce(Record::builder().topic(&topic_name).key(&key).value(&value).build())
        .expect("record to be enqueued");

    let payloads: Vec<_> = producer
        .native()
        .produced()
        .into_iter()
        .map(|p| (p.key, p.payload))
        .collect();
    assert_eq!(
        payloads,
        vec![
            (Some(b"k".to_vec()), Some(b"V".to_vec())),
            (Some(b"k".to_vec()), Some(b"v".to_vec())),
        ]
    );
}

#[rstest]
fn hooks_run_for_null_slots(topic_name: String) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = {
        let seen = seen.clone();
        serializer_fn(move |topic: &str, v: Option<&String>| {
            seen.lock().unwrap().push((topic.to_string(), v.cloned()));
            Ok(Some(b"placeholder".to_vec()))
        })
    };
    let producer = Producer::<String, String, ()>::builder()
        .key_serializer(recorder)
        .build_with(RecordingProducer::default());

    producer
        .produce(Record::builder().topic(&topic_name).build())
        .expect("record to be enqueued");

    assert_eq!(*seen.lock().unwrap(), vec![(topic_name, None)]);
    let produced = producer.native().produced();
    assert_eq!(produced[0].key, Some(b"placeholder".to_vec()));
    assert_eq!(produced[0].payload, None);
}

#[rstest]
fn serializer_errors_are_not_enqueued(topic_name: String) {
    let failing = serializer_fn(|_, _: Option<&String>| Err(BoxError::from("unsupported key")));
    let producer = Producer::<String, i32, ()>::builder()
        .key_serializer(failing)
        .build_with(RecordingProducer::default());
    let key = "k".to_string();

    let err = producer
        .produce(Record::builder().topic(&topic_name).key(&key).value(&1).build())
        .expect_err("key serializer to fail");
    assert!(matches!(err, KafkaError::KeySerialization(_)), "{err}");
    assert!(err.to_string().contains("unsupported key"));

    // no value serializer and no wire form for i32
    let producer = Producer::<String, i32, ()>::builder().build_with(RecordingProducer::default());
    let err = producer
        .produce(Record::builder().topic(&topic_name).value(&1).build())
        .expect_err("i32 values need a serializer");
    assert!(matches!(err, KafkaError::ValueSerialization(_)), "{err}");
    assert!(producer.native().produced().is_empty());
}

#[rstest]
#[case::empty_topic("", -1)]
#[case::negative_partition("events", -2)]
fn invalid_destinations_reach_no_serializer(#[case] topic: &str, #[case] partition: i32) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = {
        let calls = calls.clone();
        serializer_fn(move |_, v: Option<&String>| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(v.map(|v| v.clone().into_bytes()))
        })
    };
    let producer = Producer::<String, String, ()>::builder()
        .value_serializer(counted)
        .build_with(RecordingProducer::default());
    let value = "v".to_string();

    let err = producer
        .produce(Record::builder().topic(topic).partition(partition).value(&value).build())
        .expect_err("destination to be rejected");
    assert!(matches!(err, KafkaError::InvalidArgument(_)), "{err}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(producer.native().produced().is_empty());
}

#[rstest]
#[case::on_delivery(true, false)]
#[case::callback(false, true)]
#[case::both(true, true)]
fn callback_aliases(topic_name: String, #[case] on_delivery: bool, #[case] callback: bool) {
    let producer = Producer::<String, String, ()>::builder().build_with(RecordingProducer::default());
    let calls = Arc::new(Mutex::new(Vec::new()));
    let named = |name: &'static str| -> rdkafka2_shim::message::DeliveryCallback {
        let calls = calls.clone();
        Box::new(move |_: DeliveryResult| calls.lock().unwrap().push(name))
    };

    let value = "v".to_string();
    let record = match (on_delivery, callback) {
        (true, false) => Record::builder()
            .topic(&topic_name)
            .value(&value)
            .on_delivery(named("on_delivery"))
            .build(),
        (false, true) => Record::builder()
            .topic(&topic_name)
            .value(&value)
            .callback(named("callback"))
            .build(),
        _ => Record::builder()
            .topic(&topic_name)
            .value(&value)
            .on_delivery(named("on_delivery"))
            .callback(named("callback"))
            .build(),
    };
    producer.produce(record).expect("record to be enqueued");
    assert!(calls.lock().unwrap().is_empty());

    producer.flush(wait()).expect("flush to succeed");
    let expected = if on_delivery { "on_delivery" } else { "callback" };
    assert_eq!(*calls.lock().unwrap(), vec![expected]);
}

#[rstest]
fn reports_are_served_on_the_polling_thread(cluster: MockCluster, topic_name: String) {
    cluster.create_topic(&topic_name, 1).expect("topic to be created");
    let producer = mock_producer::<String, String>(&cluster);
    let (tx, rx) = mpsc::channel();
    let value = "v".to_string();

    producer
        .produce(
            Record::builder()
                .topic(&topic_name)
                .value(&value)
                .on_delivery(Box::new(move |result: DeliveryResult| {
                    tx.send((thread::current().id(), result.is_ok())).unwrap();
                }))
                .build(),
        )
        .expect("record to be enqueued");

    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err(), "callback ran before poll");
    assert_eq!(producer.len(), 1);

    assert!(producer.poll(wait()).expect("poll to succeed") >= 1);
    assert_eq!(rx.try_recv(), Ok((thread::current().id(), true)));
    assert!(producer.is_empty());
}

#[rstest]
fn full_outbound_queue(cluster: MockCluster, topic_name: String) {
    let producer: Producer<String, String, MockProducer> = Producer::builder()
        .config(mock_config(&cluster).iter())
        .config([("queue.buffering.max.messages", "2")])
        .try_build()
        .expect("producer to be built");
    let value = "v".to_string();
    let record = || Record::builder().topic(&topic_name).value(&value).build();

    producer.produce(record()).expect("first record");
    producer.produce(record()).expect("second record");
    assert!(matches!(
        producer.produce(record()),
        Err(KafkaError::MessageProduction(ErrorCode::QueueFull))
    ));

    producer.flush(wait()).expect("flush to succeed");
    producer.produce(record()).expect("room again after flush");
    producer.flush(wait()).expect("flush to succeed");
    assert_eq!(cluster.records(&topic_name).len(), 3);
}

#[rstest]
fn explicit_partition_and_headers(cluster: MockCluster, topic_name: String) {
    cluster.create_topic(&topic_name, 4).expect("topic to be created");
    let producer = mock_producer::<String, String>(&cluster);
    let (key, value) = ("k".to_string(), "v".to_string());
    let reports = Arc::new(Mutex::new(Vec::new()));

    for partition in [2, 7] {
        let reports = reports.clone();
        producer
            .produce(
                Record::builder()
                    .topic(&topic_name)
                    .key(&key)
                    .value(&value)
                    .partition(partition)
                    .timestamp(1_000)
                    .headers(OwnedHeaders::new().insert("trace", Some("abc")))
                    .on_delivery(Box::new(move |result: DeliveryResult| {
                        let summary = result
                            .map(|m| (m.partition(), m.offset()))
                            .map_err(|(err, _)| err.rdkafka_error_code());
                        reports.lock().unwrap().push(summary);
                    }))
                    .build(),
            )
            .expect("record to be enqueued");
    }
    producer.flush(wait()).expect("flush to succeed");

    assert_eq!(
        *reports.lock().unwrap(),
        vec![Ok((2, 0)), Err(Some(ErrorCode::UnknownPartition))]
    );
    let stored = cluster.records(&topic_name);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].timestamp().to_millis(), Some(1_000));
    assert_eq!(
        stored[0]
            .headers()
            .and_then(|h| h.get_last("trace"))
            .and_then(|h| h.value.clone()),
        Some(b"abc".to_vec())
    );
}

#[derive(Default)]
struct RecordingContext {
    failures: Mutex<Vec<ErrorCode>>,
    stats: Mutex<Vec<serde_json::Value>>,
    logs: Mutex<Vec<String>>,
    errors: AtomicUsize,
    throttles: Mutex<Vec<Duration>>,
}

impl ClientContext for RecordingContext {
    fn log_level(&self) -> LogLevel {
        LogLevel::Debug
    }

    fn log(&self, _: SyslogLevel, fac: &str, _: &str) {
        self.logs.lock().unwrap().push(fac.to_string());
    }

    fn error(&self, _: KafkaError, _: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn stats(&self, json: String) {
        let value = serde_json::from_str(&json).expect("stats to be JSON");
        self.stats.lock().unwrap().push(value);
    }

    fn throttle(&self, event: ThrottleEvent) {
        self.throttles.lock().unwrap().push(event.throttle_time);
    }
}

impl ProducerContext for RecordingContext {
    fn delivery(&self, result: DeliveryResult) {
        if let Err((err, _)) = result {
            self.failures
                .lock()
                .unwrap()
                .extend(err.rdkafka_error_code());
        }
    }
}

#[rstest]
fn context_receives_reports_and_client_events(cluster: MockCluster, topic_name: String) {
    let context = Arc::new(RecordingContext::default());
    let producer: Producer<String, String, MockProducer<Arc<RecordingContext>>> =
        Producer::builder()
            .config(mock_config(&cluster).iter())
            .config([("statistics.interval.ms", "10")])
            .context(context.clone())
            .try_build()
            .expect("producer to be built");
    let value = "v".to_string();

    cluster.inject_error(&topic_name, ErrorCode::BrokerTransportFailure);
    cluster.set_throttle(Some(Duration::from_millis(100)));
    for _ in 0..2 {
        producer
            .produce(Record::builder().topic(&topic_name).value(&value).build())
            .expect("record to be enqueued");
    }
    producer.flush(wait()).expect("flush to succeed");
    thread::sleep(Duration::from_millis(30));
    producer.poll(Timeout::NonBlock).expect("poll to succeed");

    assert_eq!(
        *context.failures.lock().unwrap(),
        vec![ErrorCode::BrokerTransportFailure]
    );
    assert_eq!(context.errors.load(Ordering::SeqCst), 1);
    let logs = context.logs.lock().unwrap();
    assert!(logs.iter().any(|fac| fac == "TOPIC"), "{logs:?}");
    assert!(logs.iter().any(|fac| fac == "DELIVERY"), "{logs:?}");
    assert_eq!(
        *context.throttles.lock().unwrap(),
        vec![Duration::from_millis(100); 2]
    );
    let stats = context.stats.lock().unwrap();
    assert!(!stats.is_empty());
    assert_eq!(stats[0]["type"], "producer");
    assert_eq!(stats[0]["name"], "shim-tests");
}

#[rstest]
#[tokio::test]
async fn send_resolves_once_the_report_is_served(cluster: MockCluster, topic_name: String) {
    let producer = mock_producer::<String, String>(&cluster);
    let (key, value) = ("k".to_string(), "v".to_string());

    let delivery = producer
        .send(Record::builder().topic(&topic_name).key(&key).value(&value).build())
        .expect("record to be enqueued");
    producer.flush(wait()).expect("flush to succeed");

    let msg = delivery
        .await
        .expect("report not to be dropped")
        .expect("message to be delivered");
    assert_eq!(msg.topic(), topic_name);
    assert_eq!(msg.key_bytes(), Some(b"k".as_slice()));
    assert_eq!(msg.payload(), Some(b"v".as_slice()));
}

#[rstest]
#[tokio::test]
async fn send_still_runs_the_record_callback(topic_name: String) {
    let producer = Producer::<String, String, ()>::builder().build_with(RecordingProducer::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let value = "v".to_string();

    let delivery = {
        let calls = calls.clone();
        producer
            .send(
                Record::builder()
                    .topic(&topic_name)
                    .value(&value)
                    .callback(Box::new(move |_: DeliveryResult| {
                        calls.fetch_add(1, Ordering::SeqCst);
                    }))
                    .build(),
            )
            .expect("record to be enqueued")
    };
    producer.poll(Timeout::NonBlock).expect("poll to succeed");

    assert!(delivery.await.expect("report").is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
fn closed_producer(cluster: MockCluster, topic_name: String) {
    let mut producer = mock_producer::<String, String>(&cluster);
    let value = "v".to_string();

    producer.close().expect("close to succeed");
    assert!(producer.is_empty());
    assert!(matches!(
        producer.produce(Record::builder().topic(&topic_name).value(&value).build()),
        Err(KafkaError::ClientClosed)
    ));
    assert!(matches!(producer.poll(Timeout::NonBlock), Err(KafkaError::ClientClosed)));
    assert!(matches!(producer.flush(Timeout::NonBlock), Err(KafkaError::ClientClosed)));
    assert!(matches!(producer.close(), Err(KafkaError::ClientClosed)));
}
