//! Retry Driver Tests
//!
//! Exercises the Disconnected → Negotiating → Streaming → Error cycle with
//! scripted connectors and a recording sleeper:
//! - Fixed-delay retries after connect, sink and stream failures
//! - Interrupt handling under both policies
//! - Config propagation (URL, device, delay)

mod bridge_test_utils;

use bridge_test_utils::*;
use cosmic_ext_stream_camera::bridge::{Driver, DriverState, Shutdown, StreamForwarder};
use cosmic_ext_stream_camera::config::{BridgeConfig, InterruptPolicy};
use std::path::PathBuf;
use std::time::Duration;

fn driver(
    connector: MockConnector,
    opener: MockCameraOpener,
    shutdown: &Shutdown,
    config: &BridgeConfig,
) -> (Driver<MockConnector, MockCameraOpener, RecordingSleeper>, RecordingSleeper) {
    let sleeper = RecordingSleeper::default();
    let forwarder = StreamForwarder::new(connector, opener, shutdown.clone());
    let driver = Driver::new(forwarder, config, sleeper.clone()).expect("valid config");
    (driver, sleeper)
}

#[test]
fn test_failed_connects_retry_with_fixed_delay() {
    let shutdown = Shutdown::new();
    let connector = MockConnector::failing(3).stop_when_exhausted(shutdown.clone());
    let urls = connector.urls.clone();
    let (mut driver, sleeper) = driver(
        connector,
        MockCameraOpener::new(),
        &shutdown,
        &BridgeConfig::default(),
    );

    driver.run();

    assert_eq!(driver.state(), DriverState::Stopped);
    assert_eq!(driver.attempts(), 4);
    assert_eq!(*sleeper.sleeps.borrow(), vec![Duration::from_secs(2); 3]);
    assert!(urls
        .borrow()
        .iter()
        .all(|url| url == "http://localhost:8000/"));
    assert!(driver
        .last_error()
        .unwrap()
        .starts_with("could not open video stream"));
}

#[test]
fn test_interrupt_before_connect_stops_without_retry() {
    let shutdown = Shutdown::new();
    shutdown.trigger();
    let connector = MockConnector::failing(0);
    let urls = connector.urls.clone();
    let (mut driver, sleeper) = driver(
        connector,
        MockCameraOpener::new(),
        &shutdown,
        &BridgeConfig::default(),
    );

    driver.run();

    assert_eq!(driver.state(), DriverState::Stopped);
    assert_eq!(driver.attempts(), 0);
    assert!(urls.borrow().is_empty());
    assert!(sleeper.sleeps.borrow().is_empty());
}

#[test]
fn test_interrupt_while_streaming_stops() {
    let shutdown = Shutdown::new();
    let source = MockSource::uniform(100, 100, Some(30.0), 10).interrupt_on_read(2, shutdown.clone());
    let watch = source.watch();
    let opener = MockCameraOpener::new();
    let log = opener.log.clone();
    let (mut driver, sleeper) = driver(
        MockConnector::new(vec![Some(source)]),
        opener,
        &shutdown,
        &BridgeConfig::default(),
    );

    driver.run();

    assert_eq!(driver.state(), DriverState::Stopped);
    assert_eq!(driver.attempts(), 1);
    assert!(sleeper.sleeps.borrow().is_empty());
    assert!(watch.released.get());
    assert_eq!(log.borrow().sent.len(), 2);
    assert_eq!(log.borrow().closed, 1);
}

#[test]
fn test_interrupt_with_restart_policy_reconnects() {
    let shutdown = Shutdown::new();
    let first = MockSource::uniform(100, 100, Some(30.0), 10).interrupt_on_read(1, shutdown.clone());
    let second = MockSource::uniform(100, 100, Some(30.0), 10);
    let first_watch = first.watch();
    let config = BridgeConfig {
        interrupt_policy: InterruptPolicy::Restart,
        ..Default::default()
    };
    let (mut driver, sleeper) = driver(
        MockConnector::new(vec![Some(first), Some(second)]),
        MockCameraOpener::new(),
        &shutdown,
        &config,
    );

    assert_eq!(driver.step(), DriverState::Negotiating);
    assert_eq!(driver.step(), DriverState::Streaming);
    assert_eq!(driver.step(), DriverState::Error);
    assert!(first_watch.released.get());

    assert_eq!(driver.step(), DriverState::Disconnected);
    assert!(!shutdown.is_triggered());
    assert_eq!(*sleeper.sleeps.borrow(), vec![Duration::from_secs(2)]);

    assert_eq!(driver.step(), DriverState::Negotiating);
    assert_eq!(driver.attempts(), 2);
    assert_eq!(driver.last_error(), Some("interrupted"));
}

#[test]
fn test_stream_drop_reconnects() {
    let shutdown = Shutdown::new();
    let source = MockSource::uniform(100, 100, Some(30.0), 3);
    let watch = source.watch();
    let opener = MockCameraOpener::new();
    let log = opener.log.clone();
    let connector =
        MockConnector::new(vec![Some(source), None]).stop_when_exhausted(shutdown.clone());
    let (mut driver, sleeper) = driver(connector, opener, &shutdown, &BridgeConfig::default());

    driver.run();

    assert_eq!(driver.attempts(), 3);
    assert_eq!(sleeper.sleeps.borrow().len(), 2);
    assert!(watch.released.get());
    assert_eq!(log.borrow().sent.len(), 3);
    assert_eq!(log.borrow().closed, 1);
}

#[test]
fn test_sink_unavailable_retries() {
    let shutdown = Shutdown::new();
    let first = MockSource::uniform(100, 100, Some(30.0), 0);
    let second = MockSource::uniform(100, 100, Some(30.0), 2);
    let first_watch = first.watch();
    let opener = MockCameraOpener::new().failing_first(1);
    let log = opener.log.clone();
    let connector = MockConnector::new(vec![Some(first), Some(second)])
        .stop_when_exhausted(shutdown.clone());
    let (mut driver, sleeper) = driver(connector, opener, &shutdown, &BridgeConfig::default());

    assert_eq!(driver.step(), DriverState::Negotiating);
    assert_eq!(driver.step(), DriverState::Error);
    assert!(first_watch.released.get());
    assert!(driver.last_error().is_none());

    driver.run();

    assert_eq!(driver.attempts(), 3);
    assert_eq!(sleeper.sleeps.borrow().len(), 2);
    assert_eq!(log.borrow().opened.len(), 1);
    assert_eq!(log.borrow().sent.len(), 2);
}

#[test]
fn test_invalid_stream_retries() {
    let shutdown = Shutdown::new();
    let connector = MockConnector::new(vec![Some(MockSource::uniform(0, 0, None, 0))])
        .stop_when_exhausted(shutdown.clone());
    let (mut driver, sleeper) = driver(
        connector,
        MockCameraOpener::new(),
        &shutdown,
        &BridgeConfig::default(),
    );

    assert_eq!(driver.step(), DriverState::Negotiating);
    assert_eq!(driver.step(), DriverState::Error);
    assert_eq!(driver.step(), DriverState::Disconnected);
    assert!(driver.last_error().unwrap().starts_with("invalid stream"));

    driver.run();
    assert_eq!(sleeper.sleeps.borrow().len(), 1);
}

#[test]
fn test_config_propagates() {
    let shutdown = Shutdown::new();
    let opener = MockCameraOpener::new();
    let log = opener.log.clone();
    let connector = MockConnector::new(vec![None, Some(MockSource::uniform(64, 64, Some(5.0), 1))])
        .stop_when_exhausted(shutdown.clone());
    let urls = connector.urls.clone();
    let config = BridgeConfig {
        host: "192.168.1.5".into(),
        port: 8001,
        device: Some(PathBuf::from("/dev/video7")),
        retry_delay: Duration::from_millis(500),
        interrupt_policy: InterruptPolicy::Stop,
    };
    let (mut driver, sleeper) = driver(connector, opener, &shutdown, &config);

    assert_eq!(driver.url(), "http://192.168.1.5:8001/");
    driver.run();

    assert_eq!(urls.borrow()[0], "http://192.168.1.5:8001/");
    assert_eq!(
        log.borrow().opened[0].1.as_deref(),
        Some(std::path::Path::new("/dev/video7"))
    );
    assert!(sleeper
        .sleeps
        .borrow()
        .iter()
        .all(|delay| *delay == Duration::from_millis(500)));
}

#[test]
fn test_invalid_host_is_rejected() {
    let config = BridgeConfig {
        host: "bad host".into(),
        ..Default::default()
    };
    let forwarder = StreamForwarder::new(
        MockConnector::failing(0),
        MockCameraOpener::new(),
        Shutdown::new(),
    );
    assert!(Driver::new(forwarder, &config, RecordingSleeper::default()).is_err());
}
