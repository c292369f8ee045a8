//! Faucet event socket ingestion.
//!
//! [`EventIngestor`] owns the Unix stream to the controller's event socket
//! and turns the raw newline-delimited records into an ordered stream of
//! [`FaucetEvent`]s:
//!
//! - **Framing**: bytes accumulate in a read buffer and are split on `\n`.
//!   Records that fail to decode are logged and skipped.
//! - **Ordering**: after a restore, [`EventIngestor::set_event_horizon`]
//!   drops records the snapshot already covers, and any later gap in
//!   `event_id` surfaces as [`Error::EventOutOfSequence`].
//! - **Debounce**: a port going down is held for the debounce window; a
//!   port coming back up inside the window cancels it. Timers run as
//!   spawned tasks and push their synthetic event onto the pending queue.
//! - **Fan-out**: `PORTS_STATUS` and `L2_LEARNED_MACS` records expand into
//!   one `PORT_CHANGE` / `L2_LEARN` per entry.
//!
//! Consumers pull with [`EventIngestor::next_event`].

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::event::FaucetEvent;

const READ_CHUNK: usize = 8 * 1024;

// ── Configuration ───────────────────────────────────────────────────

/// Connection and filtering knobs for [`EventIngestor`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub socket_path: PathBuf,
    /// Attempts to wait for the socket path to appear. Default: 10.
    pub connect_retries: u32,
    /// Pause between attempts. Default: 1s.
    pub retry_backoff: Duration,
    /// Port-down hold time. Zero disables debouncing. Default: 5s.
    pub port_debounce: Duration,
    /// Upper bound on queued synthetic events. Default: 4096.
    pub pending_capacity: usize,
}

impl IngestConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            connect_retries: 10,
            retry_backoff: Duration::from_secs(1),
            port_debounce: Duration::from_secs(5),
            pending_capacity: 4096,
        }
    }
}

// ── Pending queue ───────────────────────────────────────────────────

/// Synthetic events waiting to be emitted ahead of socket input.
///
/// Shared with debounce timer tasks, which push from outside the polling
/// task and wake a blocked reader through `notify`.
#[derive(Debug)]
struct PendingQueue {
    events: Mutex<VecDeque<FaucetEvent>>,
    notify: Notify,
    capacity: usize,
}

impl PendingQueue {
    fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<FaucetEvent>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queue `batch` ahead of everything else, preserving its order.
    fn push_front_all(&self, batch: Vec<FaucetEvent>) {
        {
            let mut events = self.lock();
            for event in batch.into_iter().rev() {
                events.push_front(event);
            }
            if events.len() > self.capacity {
                let dropped = events.len() - self.capacity;
                events.truncate(self.capacity);
                warn!(dropped, capacity = self.capacity, "pending event queue full, dropping tail");
            }
        }
        self.notify.notify_one();
    }

    fn push_front(&self, event: FaucetEvent) {
        self.push_front_all(vec![event]);
    }

    fn pop_front(&self) -> Option<FaucetEvent> {
        self.lock().pop_front()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

// ── Ingestor ────────────────────────────────────────────────────────

/// Debounce and dedupe key: immutable `(dp_id, port)`.
type PortKey = (u64, u32);

/// Pull-based reader for the Faucet event socket.
pub struct EventIngestor {
    config: IngestConfig,
    stream: Option<UnixStream>,
    buffer: BytesMut,
    pending: Arc<PendingQueue>,
    timers: HashMap<PortKey, CancellationToken>,
    previous_state: HashMap<PortKey, bool>,
    event_horizon: Option<u64>,
    last_event_id: Option<u64>,
}

impl EventIngestor {
    pub fn new(config: IngestConfig) -> Self {
        let pending = Arc::new(PendingQueue::new(config.pending_capacity));
        Self {
            config,
            stream: None,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            pending,
            timers: HashMap::new(),
            previous_state: HashMap::new(),
            event_horizon: None,
            last_event_id: None,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Wait for the socket path to appear, then connect.
    pub async fn connect(&mut self) -> Result<(), Error> {
        let path = self.config.socket_path.clone();
        wait_for_path(&path, self.config.connect_retries, self.config.retry_backoff).await?;

        let stream = UnixStream::connect(&path)
            .await
            .map_err(|source| Error::EventSocketConnect {
                path: path.display().to_string(),
                source,
            })?;

        info!(path = %path.display(), "connected to faucet event socket");
        self.attach(stream);
        Ok(())
    }

    /// Use an already-connected stream, discarding any previous session.
    pub fn attach(&mut self, stream: UnixStream) {
        self.disconnect();
        self.stream = Some(stream);
    }

    /// Close the socket and drop all buffered, pending and timed state.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            info!("disconnected from faucet event socket");
        }
        self.buffer.clear();
        self.pending.clear();
        for (_, timer) in self.timers.drain() {
            timer.cancel();
        }
        self.previous_state.clear();
        self.event_horizon = None;
        self.last_event_id = None;
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Drop every record at or below `event_id`; the next one must follow it.
    pub fn set_event_horizon(&mut self, event_id: u64) {
        info!(event_id, "event horizon set");
        self.event_horizon = Some(event_id);
        self.last_event_id = None;
    }

    pub fn last_event_id(&self) -> Option<u64> {
        self.last_event_id
    }

    /// Next emittable event.
    ///
    /// With `blocking == false`, returns `Ok(None)` as soon as nothing is
    /// ready. With `blocking == true`, waits until an event is available
    /// (socket input or a fired debounce timer).
    pub async fn next_event(&mut self, blocking: bool) -> Result<Option<FaucetEvent>, Error> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if let Some(event) = self.filter(event) {
                    return Ok(Some(event));
                }
                continue;
            }

            if let Some(event) = self.take_buffered()? {
                if let Some(event) = self.filter(event) {
                    return Ok(Some(event));
                }
                continue;
            }

            if !self.fill_buffer(blocking).await? {
                return Ok(None);
            }
        }
    }

    // ── Reading ─────────────────────────────────────────────────────

    /// Read more bytes. Returns `false` when non-blocking and nothing is
    /// readable; `true` when the caller should look again.
    async fn fill_buffer(&mut self, blocking: bool) -> Result<bool, Error> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };

        self.buffer.reserve(READ_CHUNK);
        if !blocking {
            return match stream.try_read_buf(&mut self.buffer) {
                Ok(0) => Err(Error::EventSocketClosed),
                Ok(n) => {
                    trace!(bytes = n, "read from event socket");
                    Ok(true)
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
                Err(e) => Err(Error::Io(e)),
            };
        }

        let pending = Arc::clone(&self.pending);
        tokio::select! {
            read = stream.read_buf(&mut self.buffer) => match read? {
                0 => Err(Error::EventSocketClosed),
                n => {
                    trace!(bytes = n, "read from event socket");
                    Ok(true)
                }
            },
            () = pending.notify.notified() => Ok(true),
        }
    }

    /// Decode the next complete line in the buffer, skipping bad records.
    fn take_buffered(&mut self) -> Result<Option<FaucetEvent>, Error> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let record = line.chunk().trim_ascii();
            if record.is_empty() {
                continue;
            }

            let event: FaucetEvent = match serde_json::from_slice(record) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        error = %e,
                        record = %String::from_utf8_lossy(record),
                        "skipping undecodable faucet event"
                    );
                    continue;
                }
            };

            if self.check_sequence(&event)? {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Apply the event horizon. `Ok(false)` means the record is already
    /// covered and should be dropped.
    fn check_sequence(&mut self, event: &FaucetEvent) -> Result<bool, Error> {
        let Some(id) = event.event_id else {
            return Ok(true);
        };

        let floor = self.last_event_id.or(self.event_horizon);
        if let Some(floor) = floor {
            if id <= floor {
                debug!(event_id = id, floor, "dropping event at or below horizon");
                return Ok(false);
            }
            let expected = floor + 1;
            if id != expected {
                self.last_event_id = Some(id);
                return Err(Error::EventOutOfSequence { expected, got: id });
            }
        }
        self.last_event_id = Some(id);
        Ok(true)
    }

    // ── Filtering ───────────────────────────────────────────────────

    /// Debounce, dedupe and fan out. `None` means nothing to emit yet.
    fn filter(&mut self, event: FaucetEvent) -> Option<FaucetEvent> {
        if let Some(state) = event.as_port_state() {
            let key = (state.dp_id, state.port);
            if event.debounced == Some(true) {
                return self.dedupe_port_state(event, key, state.active);
            }
            return self.debounce_port_state(event, key, state.active);
        }

        if let Some((name, _, status)) = event.as_ports_status() {
            debug!(dp = %name, ports = status.len(), "fanning out ports status");
            let batch = status
                .iter()
                .map(|(port, up)| FaucetEvent::port_change_from(&event, *port, *up))
                .collect();
            self.pending.push_front_all(batch);
            return None;
        }

        if let Some((name, macs)) = event.as_learned_macs() {
            debug!(dp = %name, macs = macs.len(), "fanning out learned macs");
            let batch = macs
                .iter()
                .map(|entry| FaucetEvent::l2_learn_from(&event, entry))
                .collect();
            self.pending.push_front_all(batch);
            return None;
        }

        Some(event)
    }

    fn debounce_port_state(
        &mut self,
        mut event: FaucetEvent,
        key: PortKey,
        active: bool,
    ) -> Option<FaucetEvent> {
        if let Some(timer) = self.timers.remove(&key) {
            timer.cancel();
        }
        event.debounced = Some(true);

        if active || self.config.port_debounce.is_zero() {
            return self.dedupe_port_state(event, key, active);
        }

        debug!(dp_id = key.0, port = key.1, "holding port down for debounce");
        let token = CancellationToken::new();
        let pending = Arc::clone(&self.pending);
        let window = self.config.port_debounce;
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(window) => {
                    event.time = unix_now();
                    pending.push_front(event);
                }
            }
        });
        self.timers.insert(key, token);
        None
    }

    fn dedupe_port_state(
        &mut self,
        event: FaucetEvent,
        key: PortKey,
        active: bool,
    ) -> Option<FaucetEvent> {
        if self.previous_state.insert(key, active) == Some(active) {
            trace!(dp_id = key.0, port = key.1, active, "dropping repeated port state");
            return None;
        }
        Some(event)
    }
}

impl Drop for EventIngestor {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.cancel();
        }
    }
}

async fn wait_for_path(path: &Path, retries: u32, backoff: Duration) -> Result<(), Error> {
    let mut remaining = retries;
    while !tokio::fs::try_exists(path).await.unwrap_or(false) {
        if remaining == 0 {
            return Err(Error::SocketPathMissing {
                path: path.display().to_string(),
                retries,
            });
        }
        info!(path = %path.display(), remaining, "waiting for event socket");
        remaining -= 1;
        tokio::time::sleep(backoff).await;
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

// ── Tests ────────────────────────────────────────────────────────────
