//! Device session against a fake appliance on loopback.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use smarter_link_core::error::DeviceError;
use smarter_link_core::{
    ConnectionState, DeviceFault, DeviceId, DeviceSession, SessionObserver, SessionOptions,
    StatusSnapshot,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Status frame: carafe present, grinder selected, idle, water 4, strength 1, 3 cups.
const STATUS_GRIND_ON: [u8; 7] = [0x32, 0x03, 0x04, 0x00, 0x01, 0x03, 0x7E];
/// Same, grinder deselected.
const STATUS_GRIND_OFF: [u8; 7] = [0x32, 0x01, 0x04, 0x00, 0x01, 0x03, 0x7E];

#[derive(Default)]
struct Recorder {
    statuses: Mutex<Vec<StatusSnapshot>>,
    faults: Mutex<Vec<DeviceFault>>,
}

impl SessionObserver for Recorder {
    fn on_status(&self, _device_id: &DeviceId, status: &StatusSnapshot) {
        self.statuses.lock().unwrap().push(*status);
    }

    fn on_fault(&self, _device_id: &DeviceId, fault: DeviceFault) {
        self.faults.lock().unwrap().push(fault);
    }
}

struct Harness {
    listener: TcpListener,
    session: DeviceSession,
    recorder: Arc<Recorder>,
}

async fn harness() -> Harness {
    harness_at(IpAddr::V4(Ipv4Addr::LOCALHOST)).await
}

/// Fake appliance listens on 127.0.0.1; the session starts out at `address`.
async fn harness_at(address: IpAddr) -> Harness {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let recorder = Arc::new(Recorder::default());

    let session = DeviceSession::new(
        DeviceId::new("18fe34000001"),
        address,
        SessionOptions {
            port,
            connect_timeout: Duration::from_secs(2),
            settle_delay: Duration::from_millis(50),
        },
        recorder.clone(),
    );

    Harness {
        listener,
        session,
        recorder,
    }
}

/// Connect the session and return the appliance side of the socket.
async fn connect(h: &Harness) -> TcpStream {
    let (accepted, connected) = tokio::join!(h.listener.accept(), h.session.connect());
    connected.unwrap();
    assert_eq!(h.session.state(), ConnectionState::Connected);
    accepted.unwrap().0
}

async fn read_command(appliance: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(WAIT, appliance.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    buf
}

async fn push_status(h: &Harness, appliance: &mut TcpStream, frame: &[u8]) {
    let mut status = h.session.subscribe_status();
    appliance.write_all(frame).await.unwrap();
    timeout(WAIT, status.changed()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_commands_are_encoded_on_the_wire() {
    let h = harness().await;
    let mut appliance = connect(&h).await;

    h.session.set_strength(2).await.unwrap();
    assert_eq!(read_command(&mut appliance, 3).await, [0x35, 0x02, 0x7E]);

    h.session.set_cups(12).await.unwrap();
    assert_eq!(read_command(&mut appliance, 3).await, [0x36, 0x0C, 0x7E]);

    h.session.brew_on(true, 3, 1).await.unwrap();
    assert_eq!(
        read_command(&mut appliance, 6).await,
        [0x33, 0x03, 0x01, 0x05, 0x01, 0x7E]
    );

    h.session.brew_on_default().await.unwrap();
    assert_eq!(read_command(&mut appliance, 2).await, [0x37, 0x7E]);

    h.session.brew_off().await.unwrap();
    assert_eq!(read_command(&mut appliance, 2).await, [0x34, 0x7E]);

    h.session.hotplate_on(None).await.unwrap();
    assert_eq!(read_command(&mut appliance, 3).await, [0x3E, 0x05, 0x7E]);

    h.session.hotplate_on(Some(30)).await.unwrap();
    assert_eq!(read_command(&mut appliance, 3).await, [0x3E, 0x1E, 0x7E]);

    h.session.hotplate_off().await.unwrap();
    assert_eq!(read_command(&mut appliance, 2).await, [0x4A, 0x7E]);
}

#[tokio::test]
async fn test_out_of_range_arguments_are_never_written() {
    let h = harness().await;
    let mut appliance = connect(&h).await;

    assert!(h.session.set_strength(3).await.unwrap_err().is_validation());
    assert!(h.session.set_cups(0).await.unwrap_err().is_validation());
    assert!(h.session.hotplate_on(Some(31)).await.unwrap_err().is_validation());

    // The next bytes on the wire belong to the first valid command
    h.session.brew_off().await.unwrap();
    assert_eq!(read_command(&mut appliance, 2).await, [0x34, 0x7E]);
}

#[tokio::test]
async fn test_status_change_detection() {
    let h = harness().await;
    let mut appliance = connect(&h).await;

    push_status(&h, &mut appliance, &STATUS_GRIND_ON).await;
    let snapshot = h.session.status().unwrap();
    assert!(snapshot.is_grind_selected);
    assert!(snapshot.is_carafe_detected);
    assert!(!snapshot.is_brewing);
    assert_eq!(snapshot.water_level, 4);
    assert_eq!(snapshot.strength, 1);
    assert_eq!(snapshot.cups, 3);

    // Identical frame: no second notification
    appliance.write_all(&STATUS_GRIND_ON).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    push_status(&h, &mut appliance, &STATUS_GRIND_OFF).await;

    let statuses = h.recorder.statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 2);
    assert!(statuses[0].is_grind_selected);
    assert!(!statuses[1].is_grind_selected);
}

#[tokio::test]
async fn test_status_after_ack_in_same_segment() {
    let h = harness().await;
    let mut appliance = connect(&h).await;

    let mut status = h.session.subscribe_status();
    appliance
        .write_all(&[0x03, 0x00, 0x7E, 0x32, 0x1B, 0x04, 0x00, 0x02, 0x07, 0x7E])
        .await
        .unwrap();
    timeout(WAIT, status.changed()).await.unwrap().unwrap();

    let snapshot = h.session.status().unwrap();
    assert_eq!(snapshot.cups, 7);
    assert_eq!(snapshot.strength, 2);
    assert_eq!(snapshot.water_level, 4);
    assert!(h.recorder.faults.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_carafe_acknowledgement_is_reported() {
    let h = harness().await;
    let mut appliance = connect(&h).await;

    appliance.write_all(&[0x03, 0x05, 0x7E]).await.unwrap();

    timeout(WAIT, async {
        while h.recorder.faults.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(*h.recorder.faults.lock().unwrap(), vec![DeviceFault::NoCarafe]);
    assert!(h.session.status().is_none());
}

#[tokio::test]
async fn test_grind_toggle_only_when_state_differs() {
    let h = harness().await;
    let mut appliance = connect(&h).await;

    assert!(matches!(
        h.session.set_grind_enabled(true).await,
        Err(DeviceError::StatusUnknown { .. })
    ));

    push_status(&h, &mut appliance, &STATUS_GRIND_ON).await;

    // Already selected: succeeds without touching the wire
    h.session.set_grind_enabled(true).await.unwrap();
    h.session.brew_off().await.unwrap();
    assert_eq!(read_command(&mut appliance, 2).await, [0x34, 0x7E]);

    h.session.set_grind_enabled(false).await.unwrap();
    assert_eq!(read_command(&mut appliance, 2).await, [0x3C, 0x7E]);
}

#[tokio::test]
async fn test_remote_close_disconnects_and_keeps_snapshot() {
    let h = harness().await;
    let mut appliance = connect(&h).await;
    push_status(&h, &mut appliance, &STATUS_GRIND_ON).await;

    let mut state = h.session.subscribe_state();
    drop(appliance);
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    assert!(h.session.status().is_some());
    assert!(matches!(
        h.session.brew_off().await,
        Err(DeviceError::NotConnected { .. })
    ));
    assert!(matches!(
        h.session.set_grind_enabled(false).await,
        Err(DeviceError::NotConnected { .. })
    ));
}

#[tokio::test]
async fn test_connect_while_connected_is_a_no_op() {
    let h = harness().await;
    let _appliance = connect(&h).await;

    h.session.connect().await.unwrap();
    assert_eq!(h.session.state(), ConnectionState::Connected);

    // No second connection reached the appliance
    assert!(timeout(Duration::from_millis(200), h.listener.accept())
        .await
        .is_err());
}

#[tokio::test]
async fn test_local_disconnect_then_reconnect() {
    let h = harness().await;
    let _first = connect(&h).await;

    h.session.disconnect().await;
    assert_eq!(h.session.state(), ConnectionState::Disconnected);
    assert!(h.session.brew_off().await.is_err());

    let mut second = connect(&h).await;
    h.session.brew_off().await.unwrap();
    assert_eq!(read_command(&mut second, 2).await, [0x34, 0x7E]);
}

#[tokio::test]
async fn test_connect_failure_leaves_session_disconnected() {
    let h = harness().await;
    drop(h.listener);

    let result = h.session.connect().await;
    assert!(matches!(result, Err(DeviceError::ConnectFailed { .. })));
    assert_eq!(h.session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_address_change_reconnects_after_settle_delay() {
    let h = harness_at(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2))).await;

    assert!(h.session.update_address(IpAddr::V4(Ipv4Addr::LOCALHOST)).await);
    assert!(h.session.reconnect_pending());

    let (_appliance, _) = timeout(WAIT, h.listener.accept()).await.unwrap().unwrap();
    let mut state = h.session.subscribe_state();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();
    assert!(!h.session.reconnect_pending());
}

#[tokio::test]
async fn test_disconnect_cancels_scheduled_reconnect() {
    let h = harness_at(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2))).await;

    assert!(h.session.update_address(IpAddr::V4(Ipv4Addr::LOCALHOST)).await);
    h.session.disconnect().await;
    assert!(!h.session.reconnect_pending());

    // Well past the 50 ms settle delay
    assert!(timeout(Duration::from_millis(500), h.listener.accept())
        .await
        .is_err());
    assert_eq!(h.session.state(), ConnectionState::Disconnected);
}
