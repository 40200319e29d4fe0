// End-to-end tests: real TcpConnector against a loopback fake daemon.
//
// The fake daemon drops any second client that tries to claim the slot, so
// `overlaps() == 0` proves the broker never let two sessions run at once.

mod common;

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{sample_channels, sample_nodes, sample_radio_info, FakeDaemon, SentText};
use meshlink::{
    Broker, BrokerRegistry, Connector, Destination, Endpoint, SessionOptions, TcpConnector,
    TcpHandle, TransportError,
};

fn fast_options() -> SessionOptions {
    SessionOptions::default()
        .with_retry_delay(Duration::from_millis(20))
        .with_lock_timeout(Duration::from_secs(10))
}

fn broker_for(daemon: &FakeDaemon, cooldown: Duration) -> Broker<TcpConnector> {
    Broker::new(daemon.endpoint(), TcpConnector::new())
        .with_cooldown(cooldown)
        .with_session_options(fast_options())
}

fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// TcpConnector that takes a fixed extra time to connect.
#[derive(Debug, Clone)]
struct SlowConnector {
    inner: TcpConnector,
    delay: Duration,
}

impl Connector for SlowConnector {
    type Handle = TcpHandle;

    fn connect(&self, endpoint: &Endpoint) -> Result<TcpHandle, TransportError> {
        thread::sleep(self.delay);
        self.inner.connect(endpoint)
    }
}

#[test]
fn test_operations_round_trip_over_tcp() {
    let daemon = FakeDaemon::start();
    let broker = broker_for(&daemon, Duration::from_millis(100));

    assert_eq!(broker.get_nodes(), sample_nodes());
    assert_eq!(broker.get_channels(), sample_channels());
    assert_eq!(broker.get_radio_info(), sample_radio_info());
    assert!(broker.send_message("hello mesh", "^all"));
    assert!(broker.send_message_on("direct", "!0000beef", 1));

    assert_eq!(
        daemon.sent(),
        vec![
            SentText {
                text: "hello mesh".into(),
                destination: Destination::Broadcast,
                channel: 0,
            },
            SentText {
                text: "direct".into(),
                destination: Destination::Node(0xbeef),
                channel: 1,
            },
        ]
    );
    assert_eq!(daemon.sessions(), 5);
    assert_eq!(daemon.overlaps(), 0);
    assert!(!broker.lock().is_held());
}

#[test]
fn test_packet_id_is_returned_by_fallible_send() {
    let daemon = FakeDaemon::start();
    let broker = broker_for(&daemon, Duration::from_millis(100));

    let first = broker.try_send_message("one", "^all", 0).unwrap();
    let second = broker.try_send_message("two", "^all", 0).unwrap();
    assert_eq!(second, first + 1);
}

#[test]
fn test_concurrent_callers_are_serialized() {
    let daemon = FakeDaemon::start();
    let broker = Arc::new(broker_for(&daemon, Duration::from_millis(100)));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let broker = Arc::clone(&broker);
            thread::spawn(move || broker.get_nodes())
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), sample_nodes());
    }
    assert_eq!(daemon.sessions(), 4);
    assert_eq!(daemon.overlaps(), 0);
}

#[test]
fn test_two_callers_with_slow_connect_run_back_to_back() {
    let daemon = FakeDaemon::start();
    let connector = SlowConnector {
        inner: TcpConnector::new(),
        delay: Duration::from_millis(200),
    };
    let broker = Arc::new(
        Broker::new(daemon.endpoint(), connector)
            .with_cooldown(Duration::from_millis(50))
            .with_session_options(fast_options()),
    );

    let start = Instant::now();
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let broker = Arc::clone(&broker);
            thread::spawn(move || broker.get_nodes())
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), sample_nodes());
    }

    assert!(start.elapsed() >= Duration::from_millis(400), "elapsed {:?}", start.elapsed());
    assert_eq!(daemon.overlaps(), 0);
}

#[test]
fn test_cooldown_covers_slot_release() {
    let daemon = FakeDaemon::with_release_delay(Duration::from_millis(150));
    let broker = broker_for(&daemon, Duration::from_millis(300));

    assert_eq!(broker.get_nodes(), sample_nodes());
    assert_eq!(broker.get_channels(), sample_channels());
    assert_eq!(daemon.early_reconnects(), 0);
    assert_eq!(daemon.overlaps(), 0);
    assert_eq!(daemon.sessions(), 2);
}

#[test]
fn test_reconnect_inside_release_window_is_retried() {
    let daemon = FakeDaemon::with_release_delay(Duration::from_millis(300));
    let broker = Broker::new(daemon.endpoint(), TcpConnector::new())
        .with_cooldown(Duration::ZERO)
        .with_session_options(
            SessionOptions::default()
                .with_max_retries(6)
                .with_retry_delay(Duration::from_millis(100)),
        );

    assert_eq!(broker.get_nodes(), sample_nodes());
    assert_eq!(broker.get_nodes(), sample_nodes());
    assert!(daemon.early_reconnects() + daemon.overlaps() >= 1);
    assert_eq!(daemon.sessions(), 2);
}

#[test]
fn test_unreachable_daemon_degrades_to_defaults() {
    let endpoint = Endpoint::new("127.0.0.1", unused_port());
    let broker = Broker::new(endpoint, TcpConnector::new().with_connect_timeout(Duration::from_millis(200)))
        .with_cooldown(Duration::ZERO)
        .with_session_options(
            SessionOptions::default()
                .with_max_retries(2)
                .with_retry_delay(Duration::from_millis(10)),
        );

    assert!(broker.get_nodes().is_empty());
    assert!(broker.get_channels().is_empty());
    assert!(broker.get_radio_info().is_empty());
    assert!(!broker.send_message("anyone there?", "^all"));
    assert!(!broker.is_available(Duration::from_millis(200)));
    assert!(!broker.lock().is_held());

    let err = broker.try_get_nodes().unwrap_err();
    assert!(err.to_string().contains("after 2 connect attempts"), "{err}");
}

#[test]
fn test_availability_probe_ignores_active_session() {
    let daemon = FakeDaemon::start();
    let broker = broker_for(&daemon, Duration::ZERO);

    let session = broker.session(broker.session_options()).unwrap();
    assert!(broker.lock().is_held());
    assert!(broker.is_available(Duration::from_secs(1)));
    drop(session);

    assert!(!broker.lock().is_held());
    assert_eq!(daemon.sessions(), 1);
    assert_eq!(daemon.overlaps(), 0);
}

#[test]
fn test_invalid_send_never_reaches_daemon() {
    let daemon = FakeDaemon::start();
    let broker = broker_for(&daemon, Duration::ZERO);

    assert!(!broker.send_message("hi", "bob"));
    assert!(!broker.send_message("hi", "!123456789"));
    assert!(!broker.send_message("", "^all"));
    assert!(!broker.send_message(&"x".repeat(1024), "^all"));

    assert_eq!(daemon.connections(), 0);
    assert!(daemon.sent().is_empty());
}

#[test]
fn test_registry_shares_one_broker_per_endpoint() {
    let daemon = FakeDaemon::start();
    let registry = Arc::new(
        BrokerRegistry::new(TcpConnector::new())
            .with_cooldown(Duration::from_millis(100))
            .with_session_options(fast_options()),
    );

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let endpoint = daemon.endpoint();
            thread::spawn(move || registry.get(&endpoint).get_radio_info())
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), sample_radio_info());
    }

    assert_eq!(registry.len(), 1);
    assert!(Arc::ptr_eq(&registry.get(&daemon.endpoint()), &registry.get(&daemon.endpoint())));
    assert_eq!(daemon.overlaps(), 0);
}
