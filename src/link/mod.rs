//! Serial link task engine.
//!
//! [`SerialLink`] owns the serial channel to the HMI. It runs:
//!
//! - one **reader** task that assembles lines, filters them to printable ASCII and
//!   delivers them either to the inbound queue or to a callback,
//! - one **writer** task that drains the outbound queue onto the wire, appending
//!   the frame trailer,
//! - any number of named **periodic** producer tasks that feed the outbound queue.
//!
//! Every task observes a child of the engine's root `CancellationToken`, so
//! [`SerialLink::close`] stops all of them at once while
//! [`SerialLink::cancel_task`] stops only one.
//!
//! # Example
//!
//! ```rust,ignore
//! use hmi_fixture::link::SerialLinkBuilder;
//!
//! let link = SerialLinkBuilder::from_config(config.serial.clone()).open().await?;
//! link.register_periodic_task("heartbeat", || "sendme", Duration::from_secs(5), None)?;
//! link.send("page 0").await?;
//! if let Some(line) = link.receive() {
//!     println!("HMI said {}", line.trim_end());
//! }
//! link.close().await;
//! ```

pub mod codec;
pub mod producer;
pub mod queue;
pub mod serial;

pub use producer::{Produced, Producer};
pub use queue::BoundedQueue;
pub use serial::{open_serial_async, DynSerial, SerialPortIO};

use crate::config::{OverflowPolicy, SerialConfig};
use crate::error::{FixtureError, FixtureResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Name under which the reader task is registered.
pub const READER_TASK: &str = "reader";
/// Name under which the writer task is registered.
pub const WRITER_TASK: &str = "writer";

/// Push-style delivery callback, invoked on the reader task for every line.
pub type MessageCallback = Arc<dyn Fn(String) + Send + Sync>;

/// How decoded inbound lines reach the application.
#[derive(Clone, Default)]
pub enum Delivery {
    /// Lines are queued and pulled with [`SerialLink::receive`] / [`SerialLink::recv`].
    #[default]
    Queue,
    /// Lines are handed to the callback; the inbound queue is not used.
    Callback(MessageCallback),
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Queue => f.write_str("Queue"),
            Delivery::Callback(_) => f.write_str("Callback"),
        }
    }
}

struct TaskEntry {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Builder for [`SerialLink`].
///
/// Queue sizes, overflow policy and timeouts start from the serial configuration
/// and can be overridden before the link is opened or attached.
///
/// # Example
/// ```rust,ignore
/// let (hmi, port) = tokio::io::duplex(256);
/// let link = SerialLinkBuilder::from_config(serial_config)
///     .outbound_capacity(8)
///     .overflow(OverflowPolicy::DropOldest)
///     .attach(port);
/// ```
pub struct SerialLinkBuilder {
    config: SerialConfig,
    delivery: Delivery,
}

impl SerialLinkBuilder {
    pub fn from_config(config: SerialConfig) -> Self {
        Self {
            config,
            delivery: Delivery::Queue,
        }
    }

    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.config.inbound_capacity = capacity;
        self
    }

    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_capacity = capacity;
        self
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }

    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Deliver inbound lines to `callback` instead of the inbound queue.
    pub fn on_message<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.delivery = Delivery::Callback(Arc::new(callback));
        self
    }

    /// Validate the configuration, open the serial device and start the link.
    pub async fn open(self) -> FixtureResult<SerialLink> {
        let port = open_serial_async(&self.config).await?;
        info!(
            port = %self.config.port,
            baud = self.config.baud_rate,
            "serial port opened"
        );
        Ok(self.attach(port))
    }

    /// Start the link on an already-open channel.
    pub fn attach<P: SerialPortIO + 'static>(self, port: P) -> SerialLink {
        SerialLink::start(Box::new(port), self.config, self.delivery)
    }
}

/// The running link: reader, writer and periodic tasks over one channel.
pub struct SerialLink {
    root: CancellationToken,
    outbound: Arc<BoundedQueue<String>>,
    inbound: Option<Arc<BoundedQueue<String>>>,
    overflow: OverflowPolicy,
    join_timeout: Duration,
    tasks: Mutex<HashMap<String, TaskEntry>>,
    closed: AtomicBool,
}

impl SerialLink {
    /// Open the configured serial device with queue delivery.
    pub async fn open(config: &SerialConfig) -> FixtureResult<Self> {
        SerialLinkBuilder::from_config(config.clone()).open().await
    }

    fn start(port: DynSerial, config: SerialConfig, delivery: Delivery) -> Self {
        let root = CancellationToken::new();
        let outbound = Arc::new(BoundedQueue::new(config.outbound_capacity));
        let (sink, inbound) = match delivery {
            Delivery::Queue => {
                let queue = Arc::new(BoundedQueue::new(config.inbound_capacity));
                (LineSink::Queue(queue.clone()), Some(queue))
            }
            Delivery::Callback(callback) => (LineSink::Callback(callback), None),
        };

        let (read_half, write_half) = tokio::io::split(port);
        let mut tasks = HashMap::new();

        let token = root.child_token();
        let handle = tokio::spawn(reader_loop(
            read_half,
            sink,
            config.read_timeout(),
            token.clone(),
        ));
        tasks.insert(READER_TASK.to_string(), TaskEntry { token, handle });

        let token = root.child_token();
        let handle = tokio::spawn(writer_loop(write_half, outbound.clone(), token.clone()));
        tasks.insert(WRITER_TASK.to_string(), TaskEntry { token, handle });

        Self {
            root,
            outbound,
            inbound,
            overflow: config.overflow,
            join_timeout: config.join_timeout(),
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        }
    }

    /// Spawn a named producer that runs every `period` until cancelled.
    ///
    /// `overflow` overrides the link's policy for this task's frames.
    pub fn register_periodic_task<F, R>(
        &self,
        name: &str,
        mut produce: F,
        period: Duration,
        overflow: Option<OverflowPolicy>,
    ) -> FixtureResult<()>
    where
        F: FnMut() -> R + Send + 'static,
        R: Into<Produced>,
    {
        // `close` sets the flag before draining the registry, so checking it
        // under the lock means no entry can slip in after the drain.
        let mut tasks = self.tasks.lock();
        if self.is_closed() {
            return Err(FixtureError::LinkClosed);
        }
        if tasks.contains_key(name) {
            return Err(FixtureError::DuplicateTask(name.to_string()));
        }

        let token = self.root.child_token();
        let producer: Producer = Box::new(move || produce().into());
        let handle = tokio::spawn(periodic_loop(
            name.to_string(),
            producer,
            period,
            overflow.unwrap_or(self.overflow),
            self.outbound.clone(),
            token.clone(),
        ));
        tasks.insert(name.to_string(), TaskEntry { token, handle });
        debug!(task = name, period_ms = period.as_millis() as u64, "periodic task registered");
        Ok(())
    }

    /// Cancel one task, wait (bounded) for it to finish and forget it.
    pub async fn cancel_task(&self, name: &str) {
        let entry = self.tasks.lock().remove(name);
        match entry {
            Some(entry) => {
                warn!(task = name, "cancelling task");
                entry.token.cancel();
                join_bounded(name, entry.handle, self.join_timeout).await;
            }
            None => warn!(task = name, "task not registered"),
        }
    }

    /// Names of the tasks currently registered, sorted.
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_task_registered(&self, name: &str) -> bool {
        self.tasks.lock().contains_key(name)
    }

    /// Queue a frame for the writer.
    ///
    /// Waits for room under [`OverflowPolicy::Block`]; evicts the oldest frame
    /// under [`OverflowPolicy::DropOldest`]; discards `frame` itself under
    /// [`OverflowPolicy::DropNewest`].
    pub async fn send(&self, frame: impl Into<String>) -> FixtureResult<()> {
        if self.is_closed() {
            return Err(FixtureError::LinkClosed);
        }
        let frame = frame.into();
        trace!(frame = %frame, "queueing frame");

        tokio::select! {
            _ = self.root.cancelled() => Err(FixtureError::LinkClosed),
            dropped = self.outbound.push(frame, self.overflow) => {
                if let Some(dropped) = dropped {
                    warn!(dropped = %dropped, policy = ?self.overflow, "outbound queue full, frame dropped");
                }
                Ok(())
            }
        }
    }

    /// Pop one inbound line without waiting.
    ///
    /// Always `None` when the link delivers through a callback.
    pub fn receive(&self) -> Option<String> {
        self.inbound.as_ref()?.try_pop()
    }

    /// Wait for the next inbound line.
    ///
    /// Returns `None` once the link is closed. Fails immediately in callback mode,
    /// where lines never reach the queue.
    pub async fn recv(&self) -> FixtureResult<Option<String>> {
        let inbound = self.inbound.as_ref().ok_or_else(|| {
            FixtureError::DeliveryMode("link delivers inbound lines through a callback".into())
        })?;
        tokio::select! {
            _ = self.root.cancelled() => Ok(None),
            line = inbound.pop() => Ok(Some(line)),
        }
    }

    /// Whether inbound lines go to a callback rather than the queue.
    pub fn uses_callback(&self) -> bool {
        self.inbound.is_none()
    }

    /// Frames waiting for the writer.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Frames discarded by the overflow policies so far.
    pub fn dropped_frames(&self) -> u64 {
        self.outbound.dropped()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop every task and release the channel. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("serial link already closed");
            return;
        }

        warn!("cancelling all tasks");
        self.root.cancel();

        let entries: Vec<(String, TaskEntry)> = self.tasks.lock().drain().collect();
        for (name, entry) in entries {
            join_bounded(&name, entry.handle, self.join_timeout).await;
        }

        // The reader and writer halves were dropped with their tasks.
        info!("serial port closed");
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

async fn join_bounded(name: &str, handle: JoinHandle<()>, timeout: Duration) {
    let abort = handle.abort_handle();
    info!(task = name, "joining task");
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => info!(task = name, "task joined"),
        Ok(Err(e)) if e.is_cancelled() => debug!(task = name, "task was aborted"),
        Ok(Err(e)) => error!(task = name, error = %e, "task panicked"),
        Err(_) => {
            warn!(
                task = name,
                timeout_ms = timeout.as_millis() as u64,
                "task did not finish in time, aborting"
            );
            abort.abort();
        }
    }
}

enum LineSink {
    Queue(Arc<BoundedQueue<String>>),
    Callback(MessageCallback),
}

impl LineSink {
    /// Hand a line on; returns `false` if cancelled while waiting for room.
    async fn deliver(&self, line: String, token: &CancellationToken) -> bool {
        match self {
            LineSink::Queue(queue) => tokio::select! {
                _ = token.cancelled() => false,
                _ = queue.push_wait(line) => true,
            },
            LineSink::Callback(callback) => {
                let callback = callback.clone();
                if std::panic::catch_unwind(AssertUnwindSafe(|| callback(line))).is_err() {
                    error!("message callback panicked");
                }
                true
            }
        }
    }
}

async fn reader_loop(
    read_half: ReadHalf<DynSerial>,
    sink: LineSink,
    read_timeout: Duration,
    token: CancellationToken,
) {
    info!("reader loop started");
    let mut reader = BufReader::new(read_half);
    let mut pending = Vec::new();

    loop {
        // The timeout restarts with every chunk, so a partial line is only
        // flushed once the wire has been quiet for a full `read_timeout`.
        let chunk = tokio::select! {
            _ = token.cancelled() => break,
            chunk = tokio::time::timeout(read_timeout, reader.fill_buf()) => chunk,
        };

        // Take bytes up to the end of the line out of the buffer.
        let chunk = chunk.map(|read| {
            read.map(|bytes| {
                let (taken, complete) = match bytes.iter().position(|&b| b == b'\n') {
                    Some(end) => (end + 1, true),
                    None => (bytes.len(), false),
                };
                pending.extend_from_slice(&bytes[..taken]);
                (taken, complete)
            })
        });

        let (flush, idle) = match chunk {
            // End of stream: deliver what we have, then back off.
            Ok(Ok((0, _))) => (true, true),
            Ok(Ok((taken, complete))) => {
                reader.consume(taken);
                (complete, false)
            }
            Ok(Err(e)) => {
                error!(error = %e, "serial read failed");
                pending.clear();
                (false, true)
            }
            // Quiet line: a partial line is delivered as-is.
            Err(_) => (true, false),
        };

        if flush && !pending.is_empty() {
            let raw = std::mem::take(&mut pending);
            if let Some(line) = codec::decode_line(&raw) {
                debug!(line = line.trim_end(), "line received");
                if !sink.deliver(line, &token).await {
                    break;
                }
            }
        }

        if idle {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(read_timeout) => {}
            }
        }
    }

    warn!("reader loop finished");
}

async fn writer_loop(
    mut write_half: WriteHalf<DynSerial>,
    outbound: Arc<BoundedQueue<String>>,
    token: CancellationToken,
) {
    info!("writer loop started");

    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            frame = outbound.pop() => frame,
        };

        let bytes = codec::encode_frame(&frame);
        let written = tokio::select! {
            _ = token.cancelled() => break,
            written = async {
                write_half.write_all(&bytes).await?;
                write_half.flush().await
            } => written,
        };

        match written {
            Ok(()) => trace!(frame = %frame, "frame sent"),
            Err(e) => error!(frame = %frame, error = %e, "serial write failed"),
        }
    }

    if let Err(e) = write_half.shutdown().await {
        debug!(error = %e, "serial shutdown failed");
    }
    warn!("writer loop finished");
}

async fn periodic_loop(
    name: String,
    mut producer: Producer,
    period: Duration,
    overflow: OverflowPolicy,
    outbound: Arc<BoundedQueue<String>>,
    token: CancellationToken,
) {
    info!(task = %name, "periodic task started");

    'run: while !token.is_cancelled() {
        for frame in producer().into_frames() {
            let dropped = tokio::select! {
                _ = token.cancelled() => break 'run,
                dropped = outbound.push(frame, overflow) => dropped,
            };
            match (dropped, overflow) {
                (None, _) => {}
                (Some(frame), OverflowPolicy::DropNewest) => {
                    trace!(task = %name, dropped = %frame, "outbound queue full, skipped frame")
                }
                (Some(frame), _) => {
                    warn!(task = %name, dropped = %frame, "outbound queue full, dropped oldest frame")
                }
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
    }

    warn!(task = %name, "periodic task finished");
}
