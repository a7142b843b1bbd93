//! Device facade and poll loop tests

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use kettle_ble::{KettleDevice, KettleSession};
use kettle_core::{KettleError, WARM_SETTING_PRIMARY_UUID};

use common::{init_tracing, status_frame, test_config, MockKettle, MockOptions};

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn device_for(mock: &MockKettle) -> KettleDevice<MockKettle> {
    init_tracing();
    KettleDevice::new(KettleSession::new(mock.clone(), test_config()).unwrap())
}

fn idle_kettle(failing_connects: usize) -> MockKettle {
    MockKettle::with_options(MockOptions {
        failing_connects,
        initial_status: Some(status_frame(0, 0, 40, 0)),
        ..MockOptions::default()
    })
}

// ----------------------------------------------------------------------------
// Setup
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_setup_tolerates_transient_failure() {
    let mock = idle_kettle(1);
    let device = device_for(&mock);

    device.setup().await.unwrap();
    assert!(!device.is_authenticated());
    assert_eq!(mock.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_setup_fails_on_unsupported_model() {
    let mock = MockKettle::with_options(MockOptions {
        name: Some("MiKetv3".to_string()),
        ..MockOptions::default()
    });
    let device = device_for(&mock);

    assert!(matches!(
        device.setup().await,
        Err(KettleError::UnsupportedModel { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_commands_through_device() {
    let mock = MockKettle::new();
    let device = device_for(&mock);
    device.setup().await.unwrap();
    assert!(device.is_authenticated());

    mock.push_status(status_frame(2, 4, 55, 1));
    device.action("heat").await.unwrap();
    assert_eq!(mock.writes_to(WARM_SETTING_PRIMARY_UUID), vec![vec![0x04, 0x01]]);

    device.set_heat_temperature(85).await.unwrap();
    device.set_warm_temperature(65).await.unwrap();
    assert_eq!(&mock.record()[6..], &[65, 0x18, 85, 0x18]);
    assert_eq!(device.read_mode_segment(4).await.unwrap().temperature, 85);

    assert!(matches!(
        device.set_warm_temperature(95).await,
        Err(KettleError::InvalidSetpoint { .. })
    ));
    assert!(matches!(
        device.action("descale").await,
        Err(KettleError::UnknownAction { .. })
    ));
}

// ----------------------------------------------------------------------------
// Poll Loop
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_poll_loop_backs_off_then_recovers() {
    let mock = idle_kettle(3);
    let mut device = device_for(&mock);
    device.start();
    assert!(device.is_running());

    // Failed attempts at 0s, 1s and 3s; the fourth waits until 7s
    sleep(Duration::from_millis(500)).await;
    assert_eq!(mock.connect_attempts(), 1);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(mock.connect_attempts(), 2);
    sleep(Duration::from_secs(2)).await;
    assert_eq!(mock.connect_attempts(), 3);
    sleep(Duration::from_secs(3)).await;
    assert_eq!(mock.connect_attempts(), 3);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(mock.connect_attempts(), 4);

    sleep(Duration::from_secs(20)).await;
    assert!(device.is_authenticated());
    assert_eq!(device.status().map(|s| s.current_temperature), Some(40));

    device.stop().await;
    assert!(!device.is_running());
    assert!(!device.is_authenticated());
    assert!(!mock.is_connected_now());
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_login_in_progress() {
    let mock = idle_kettle(0);
    let mut device = device_for(&mock);
    device.start();

    // Inside the first login, waiting on the auth-init channel
    sleep(Duration::from_millis(300)).await;
    assert_eq!(mock.connect_attempts(), 1);
    device.stop().await;

    assert!(!device.is_running());
    assert_eq!(mock.completed_logins(), 0);
    assert!(!device.is_authenticated());
    assert!(!mock.is_connected_now());
    assert!(mock.disconnect_calls() >= 1);

    // Nothing keeps polling after stop
    sleep(Duration::from_secs(120)).await;
    assert_eq!(mock.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_command_holds_session() {
    let mock = idle_kettle(0);
    let mut device = device_for(&mock);
    let session = device.session();
    let command = session.lock().await;

    device.start();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(mock.connect_attempts(), 0);

    let stopping = tokio::spawn(async move {
        device.stop().await;
        device
    });
    sleep(Duration::from_millis(100)).await;
    // Cleanup waits for the command, the tick never starts
    assert!(!stopping.is_finished());
    drop(command);

    let device = stopping.await.unwrap();
    assert!(!device.is_running());
    assert_eq!(mock.connect_attempts(), 0);
    assert_eq!(mock.disconnect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_status_readable_during_tick() {
    let mock = idle_kettle(0);
    let mut device = device_for(&mock);
    device.setup().await.unwrap();
    device.start();

    // First tick is parked in its keep-alive wait holding the session
    sleep(Duration::from_secs(1)).await;
    assert!(device.session().try_lock().is_err());
    assert_eq!(device.status().map(|s| s.current_temperature), Some(40));

    device.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_loop_feeds_status_observers() {
    let mock = idle_kettle(0);
    let mut device = device_for(&mock);
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let id = device.register_status_observer(move |status| {
        assert_eq!(status.mode, 0);
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    device.start();
    sleep(Duration::from_secs(45)).await;
    let polled = hits.load(Ordering::SeqCst);
    assert!(polled >= 1);

    assert!(device.unregister_observer(id));
    sleep(Duration::from_secs(90)).await;
    assert_eq!(hits.load(Ordering::SeqCst), polled);

    device.stop().await;
}
