//! Persistent TCP session with one appliance.
//!
//! Each live connection is owned by a single spawned task that reads inbound
//! frames in arrival order and writes outbound commands handed to it over a
//! channel. The session handle is cheap to clone and can be shared between the
//! registry, delayed reconnects and command callers.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::DeviceError;
use crate::protocol::{
    classify_frame, decode_acknowledgement, decode_status, split_frames, Acknowledgement, Command,
    Cups, FrameKind, HotplateMinutes, Strength,
};
use crate::types::{ConnectionState, DeviceFault, DeviceId, StatusSnapshot};

const READ_BUFFER_SIZE: usize = 256;

const COMMAND_QUEUE_DEPTH: usize = 16;

/// Receives decoded events from a session.
///
/// Called from the connection task, so implementations must not block.
pub trait SessionObserver: Send + Sync {
    /// A status frame differing from the previous snapshot arrived.
    fn on_status(&self, device_id: &DeviceId, status: &StatusSnapshot);

    /// The appliance reported an operational fault.
    fn on_fault(&self, device_id: &DeviceId, fault: DeviceFault);
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_status(&self, _device_id: &DeviceId, _status: &StatusSnapshot) {}
    fn on_fault(&self, _device_id: &DeviceId, _fault: DeviceFault) {}
}

/// Timing knobs for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub port: u16,
    pub connect_timeout: Duration,
    /// Wait before reconnecting after an address change
    pub settle_delay: Duration,
}

/// Handle to the session with one appliance.
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<Inner>,
}

struct Inner {
    device_id: DeviceId,
    options: SessionOptions,
    address: watch::Sender<IpAddr>,
    state: watch::Sender<ConnectionState>,
    status: watch::Sender<Option<StatusSnapshot>>,
    link: Mutex<Option<Link>>,
    /// Bumped on every connect attempt and every teardown
    generation: AtomicU64,
    /// A reconnect is waiting out the settle delay
    reconnect_pending: AtomicBool,
    observer: Arc<dyn SessionObserver>,
}

/// The live connection as seen from command callers.
struct Link {
    generation: u64,
    commands: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
}

struct Outbound {
    bytes: Vec<u8>,
    done: oneshot::Sender<std::io::Result<()>>,
}

impl DeviceSession {
    pub fn new(
        device_id: DeviceId,
        address: IpAddr,
        options: SessionOptions,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                device_id,
                options,
                address: watch::Sender::new(address),
                state: watch::Sender::new(ConnectionState::Disconnected),
                status: watch::Sender::new(None),
                link: Mutex::new(None),
                generation: AtomicU64::new(0),
                reconnect_pending: AtomicBool::new(false),
                observer,
            }),
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.inner.device_id
    }

    pub fn address(&self) -> IpAddr {
        *self.inner.address.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether a reconnect after an address change is still waiting to run.
    pub fn reconnect_pending(&self) -> bool {
        self.inner.reconnect_pending.load(Ordering::SeqCst)
    }

    /// Latest snapshot. Kept (stale) after a disconnect.
    pub fn status(&self) -> Option<StatusSnapshot> {
        *self.inner.status.borrow()
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Watch snapshot updates.
    pub fn subscribe_status(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.inner.status.subscribe()
    }

    // ==================== Connection lifecycle ====================

    /// Open the TCP connection. No-op while connecting or connected.
    pub async fn connect(&self) -> Result<(), DeviceError> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Ok(());
        }
        self.inner.reconnect_pending.store(false, Ordering::SeqCst);

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let addr = SocketAddr::new(self.address(), self.inner.options.port);
        debug!(device = %self.inner.device_id, %addr, "connecting");

        let stream = match timeout(self.inner.options.connect_timeout, TcpStream::connect(addr))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.abandon_attempt(generation);
                return Err(DeviceError::ConnectFailed {
                    addr,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                self.abandon_attempt(generation);
                return Err(DeviceError::ConnectFailed {
                    addr,
                    message: "connection timed out".to_string(),
                });
            }
        };

        let mut link = self.inner.link.lock().await;

        // Torn down (or retargeted) while the connect was in flight
        if self.inner.generation.load(Ordering::SeqCst) != generation
            || addr.ip() != self.address()
        {
            debug!(device = %self.inner.device_id, %addr, "dropping superseded connection");
            self.abandon_attempt(generation);
            return Ok(());
        }

        let (commands, queue) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        *link = Some(Link {
            generation,
            commands,
            cancel: cancel.clone(),
        });
        self.inner.state.send_replace(ConnectionState::Connected);
        drop(link);

        info!(device = %self.inner.device_id, %addr, "connected");
        tokio::spawn(run_connection(
            Arc::clone(&self.inner),
            stream,
            queue,
            cancel,
            generation,
        ));

        Ok(())
    }

    /// Close the current connection, if any, and cancel a pending reconnect.
    pub async fn disconnect(&self) {
        let mut link = self.inner.link.lock().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.reconnect_pending.store(false, Ordering::SeqCst);
        if let Some(link) = link.take() {
            link.cancel.cancel();
            info!(device = %self.inner.device_id, "disconnected");
        }
        self.inner.state.send_replace(ConnectionState::Disconnected);
    }

    /// Point the session at a new network address.
    ///
    /// No-op if unchanged. Otherwise the current connection is dropped and a
    /// reconnect is scheduled after the settle delay. Returns whether the
    /// address changed.
    pub async fn update_address(&self, address: IpAddr) -> bool {
        let previous = self.address();
        let changed = self.inner.address.send_if_modified(|current| {
            if *current == address {
                false
            } else {
                *current = address;
                true
            }
        });
        if !changed {
            return false;
        }

        info!(
            device = %self.inner.device_id,
            from = %previous,
            to = %address,
            "network address changed"
        );
        self.disconnect().await;

        // Anything that bumps the generation meanwhile supersedes this reconnect
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner.reconnect_pending.store(true, Ordering::SeqCst);

        let session = self.clone();
        let delay = self.inner.options.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if session.inner.generation.load(Ordering::SeqCst) != generation {
                debug!(device = %session.inner.device_id, "scheduled reconnect superseded");
                return;
            }
            if let Err(e) = session.connect().await {
                warn!(device = %session.inner.device_id, error = %e, "reconnect failed");
            }
        });

        true
    }

    fn abandon_attempt(&self, generation: u64) {
        // Only reset state if nothing newer has claimed the session since
        if self.inner.generation.load(Ordering::SeqCst) == generation {
            self.inner
                .state
                .send_replace(ConnectionState::Disconnected);
        }
    }

    // ==================== Commands ====================

    pub async fn set_strength(&self, strength: i64) -> Result<(), DeviceError> {
        let strength = Strength::try_from(strength)?;
        self.send(Command::strength(strength)).await
    }

    pub async fn set_cups(&self, cups: i64) -> Result<(), DeviceError> {
        let cups = Cups::try_from(cups)?;
        self.send(Command::cups(cups)).await
    }

    /// Select or deselect the grinder.
    ///
    /// The wire only offers a toggle, so nothing is written when the last
    /// snapshot already matches.
    pub async fn set_grind_enabled(&self, enabled: bool) -> Result<(), DeviceError> {
        self.ensure_connected()?;

        let current = self
            .status()
            .ok_or_else(|| DeviceError::StatusUnknown {
                id: self.inner.device_id.to_string(),
            })?
            .is_grind_selected;

        if current == enabled {
            debug!(device = %self.inner.device_id, enabled, "grind already in requested state");
            return Ok(());
        }

        self.send(Command::toggle_grind()).await
    }

    pub async fn brew_on(&self, grind: bool, cups: i64, strength: i64) -> Result<(), DeviceError> {
        let cups = Cups::try_from(cups)?;
        let strength = Strength::try_from(strength)?;
        self.send(Command::brew_on(grind, cups, strength)).await
    }

    pub async fn brew_on_default(&self) -> Result<(), DeviceError> {
        self.send(Command::brew_on_default()).await
    }

    pub async fn brew_off(&self) -> Result<(), DeviceError> {
        self.send(Command::brew_off()).await
    }

    /// Turn the hotplate on. `None` keeps it on for the default 5 minutes.
    pub async fn hotplate_on(&self, minutes: Option<i64>) -> Result<(), DeviceError> {
        let minutes = match minutes {
            Some(minutes) => HotplateMinutes::try_from(minutes)?,
            None => HotplateMinutes::default(),
        };
        self.send(Command::hotplate_on(minutes)).await
    }

    pub async fn hotplate_off(&self) -> Result<(), DeviceError> {
        self.send(Command::hotplate_off()).await
    }

    fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(self.not_connected())
        }
    }

    fn not_connected(&self) -> DeviceError {
        DeviceError::NotConnected {
            id: self.inner.device_id.to_string(),
        }
    }

    /// Hand a command to the connection task and wait until it is written.
    async fn send(&self, command: Command) -> Result<(), DeviceError> {
        self.ensure_connected()?;

        let commands = {
            let link = self.inner.link.lock().await;
            link.as_ref()
                .map(|link| link.commands.clone())
                .ok_or_else(|| self.not_connected())?
        };

        let (done, written) = oneshot::channel();
        commands
            .send(Outbound {
                bytes: command.encode(),
                done,
            })
            .await
            .map_err(|_| self.not_connected())?;

        match written.await {
            Ok(Ok(())) => {
                debug!(
                    device = %self.inner.device_id,
                    opcode = format_args!("0x{:02x}", command.opcode()),
                    "command written"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(DeviceError::WriteFailed {
                id: self.inner.device_id.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(self.not_connected()),
        }
    }
}

impl Inner {
    /// Process one inbound buffer.
    fn handle_frame(&self, frame: &[u8]) {
        match classify_frame(frame) {
            FrameKind::Acknowledgement => match decode_acknowledgement(frame) {
                Ok(Acknowledgement::NoCarafe) => {
                    warn!(device = %self.device_id, "appliance reports no carafe");
                    self.observer.on_fault(&self.device_id, DeviceFault::NoCarafe);
                }
                Ok(ack) => trace!(device = %self.device_id, ?ack, "acknowledgement"),
                Err(e) => debug!(device = %self.device_id, error = %e, "dropping frame"),
            },
            FrameKind::Status => match decode_status(frame) {
                Ok(snapshot) => {
                    let changed = self.status.send_if_modified(|current| {
                        if *current == Some(snapshot) {
                            false
                        } else {
                            *current = Some(snapshot);
                            true
                        }
                    });
                    if changed {
                        debug!(device = %self.device_id, ?snapshot, "status changed");
                        self.observer.on_status(&self.device_id, &snapshot);
                    }
                }
                Err(e) => debug!(device = %self.device_id, error = %e, "dropping frame"),
            },
            FrameKind::Unrecognized => {
                trace!(device = %self.device_id, len = frame.len(), "ignoring unrecognized frame");
            }
        }
    }

    /// Clear the link if it still belongs to `generation`.
    async fn release_link(&self, generation: u64) {
        let mut link = self.link.lock().await;
        if link.as_ref().map(|l| l.generation) == Some(generation) {
            *link = None;
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

/// Connection task: owns the socket until it closes or is cancelled.
async fn run_connection(
    inner: Arc<Inner>,
    stream: TcpStream,
    mut queue: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
    generation: u64,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(device = %inner.device_id, "connection closed locally");
                break;
            }
            Some(outbound) = queue.recv() => {
                let result = writer.write_all(&outbound.bytes).await;
                let failed = result.as_ref().err().map(ToString::to_string);
                let _ = outbound.done.send(result);
                if let Some(error) = failed {
                    warn!(device = %inner.device_id, %error, "write failed");
                    break;
                }
            }
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    info!(device = %inner.device_id, "appliance closed the connection");
                    break;
                }
                Ok(_) => {
                    for frame in split_frames(&buf) {
                        inner.handle_frame(frame);
                    }
                    buf.clear();
                }
                Err(e) => {
                    warn!(device = %inner.device_id, error = %e, "connection error");
                    break;
                }
            },
        }
    }

    inner.release_link(generation).await;
}
