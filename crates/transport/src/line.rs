//! Duplex line socket with auto-reconnect and coalescing outbound backpressure.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use state::{ConnectionMachine, ConnectionState, Event as ConnEvent};
use types::Timestamp;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("read timed out")]
    ReadTimeout,
    #[error("connect timed out")]
    ConnectTimeout,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub retry_interval: Duration,
    pub read_timeout: Duration,
    /// Outbound queue capacity before same-kind coalescing kicks in.
    pub outbound_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            connect_timeout: Duration::from_secs(2),
            retry_interval: Duration::from_secs(1),
            read_timeout: Duration::from_secs(5),
            outbound_capacity: 8,
        }
    }
}

/// An outbound line, tagged by kind so the paced queue can coalesce
/// same-kind entries instead of growing unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundLine {
    Motion(String),
    Scan(String),
    Other(String),
}

impl OutboundLine {
    fn text(&self) -> &str {
        match self {
            Self::Motion(s) | Self::Scan(s) | Self::Other(s) => s,
        }
    }

    fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Bounded outbound queue where, once full, a new line replaces the
/// existing queued line of the same kind rather than simply dropping —
/// motion and scan commands are idempotent at their latest value, so
/// only the newest matters.
#[derive(Clone)]
struct PacedQueue {
    inner: Arc<Mutex<VecDeque<OutboundLine>>>,
    notify: Arc<Notify>,
    capacity: usize,
}

impl PacedQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            capacity,
        }
    }

    fn push(&self, line: OutboundLine) {
        let mut q = self.inner.lock().unwrap();
        if q.len() >= self.capacity {
            if let Some(pos) = q.iter().position(|existing| existing.same_kind(&line)) {
                q.remove(pos);
            } else {
                q.pop_front();
            }
        }
        q.push_back(line);
        drop(q);
        self.notify.notify_one();
    }

    async fn pop(&self) -> OutboundLine {
        loop {
            {
                let mut q = self.inner.lock().unwrap();
                if let Some(line) = q.pop_front() {
                    return line;
                }
            }
            self.notify.notified().await;
        }
    }
}

/// Handle to the running transport. Inbound lines, errors, and connection
/// state are observed through channels; outbound lines are pushed with
/// `send`.
pub struct LineTransport {
    config: TransportConfig,
    queue: PacedQueue,
    inbound_rx: mpsc::Receiver<(Timestamp, String)>,
    error_rx: mpsc::UnboundedReceiver<TransportError>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown: Arc<AtomicBool>,
}

impl LineTransport {
    /// Connect to `config.host:config.port`, spawning the reader/writer
    /// task. Returns the handle and its join handle.
    pub fn connect(config: TransportConfig) -> (Self, JoinHandle<()>) {
        let queue = PacedQueue::new(config.outbound_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let shutdown = Arc::new(AtomicBool::new(false));

        let task_config = config.clone();
        let task_queue = queue.clone();
        let task_shutdown = shutdown.clone();
        let handle = tokio::spawn(run(
            task_config,
            task_queue,
            inbound_tx,
            error_tx,
            state_tx,
            task_shutdown,
        ));

        (
            Self {
                config,
                queue,
                inbound_rx,
                error_rx,
                state_rx,
                shutdown,
            },
            handle,
        )
    }

    /// Enqueue an outbound line. Coalesces with any queued line of the
    /// same kind once the queue is full.
    pub fn send(&self, line: OutboundLine) {
        self.queue.push(line);
    }

    /// Receive the next inbound `(timestamp, text)` line. Restart-safe:
    /// continues to yield lines across reconnects until `shutdown()`.
    pub async fn recv_line(&mut self) -> Option<(Timestamp, String)> {
        self.inbound_rx.recv().await
    }

    /// Receive the next transport error (recoverable; never fatal).
    pub async fn recv_error(&mut self) -> Option<TransportError> {
        self.error_rx.recv().await
    }

    /// Watch the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn connected(&self) -> bool {
        *self.state_rx.borrow() == ConnectionState::Connected
    }

    /// Orderly shutdown: the run task observes the flag and closes the
    /// socket at its next suspension point.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

async fn run(
    config: TransportConfig,
    queue: PacedQueue,
    inbound_tx: mpsc::Sender<(Timestamp, String)>,
    error_tx: mpsc::UnboundedSender<TransportError>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: Arc<AtomicBool>,
) {
    let mut machine = ConnectionMachine::new();
    let addr = format!("{}:{}", config.host, config.port);

    loop {
        if shutdown.load(Ordering::SeqCst) {
            machine.transition(ConnEvent::Shutdown);
            let _ = state_tx.send(machine.state());
            return;
        }

        machine.transition(ConnEvent::ConnectStart);
        let _ = state_tx.send(machine.state());

        match tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                machine.transition(ConnEvent::Connected);
                let _ = state_tx.send(machine.state());
                debug!(%addr, "connected to vehicle");

                let (rd, mut wr) = stream.into_split();
                let mut reader = BufReader::new(rd);
                let mut buf = String::new();

                loop {
                    if shutdown.load(Ordering::SeqCst) {
                        machine.transition(ConnEvent::Shutdown);
                        let _ = state_tx.send(machine.state());
                        return;
                    }

                    tokio::select! {
                        result = tokio::time::timeout(config.read_timeout, reader.read_line(&mut buf)) => {
                            match result {
                                Ok(Ok(0)) => {
                                    warn!("vehicle closed connection");
                                    break;
                                }
                                Ok(Ok(_)) => {
                                    let text = buf.trim_end_matches(['\r', '\n']).to_string();
                                    let ts = crate::now_ms();
                                    buf.clear();
                                    if !text.is_empty() {
                                        trace!(%text, "inbound line");
                                        let _ = inbound_tx.send((ts, text)).await;
                                    }
                                }
                                Ok(Err(e)) => {
                                    let _ = error_tx.send(TransportError::Io(e.to_string()));
                                    break;
                                }
                                Err(_) => {
                                    let _ = error_tx.send(TransportError::ReadTimeout);
                                    break;
                                }
                            }
                        }
                        line = queue.pop() => {
                            let mut text = line.text().to_string();
                            text.push('\n');
                            if let Err(e) = wr.write_all(text.as_bytes()).await {
                                let _ = error_tx.send(TransportError::Io(e.to_string()));
                                break;
                            }
                        }
                    }
                }

                machine.transition(ConnEvent::IoError);
                let _ = state_tx.send(machine.state());
            }
            Ok(Err(e)) => {
                let _ = error_tx.send(TransportError::Io(e.to_string()));
                machine.transition(ConnEvent::ConnectFailed);
                let _ = state_tx.send(machine.state());
            }
            Err(_) => {
                let _ = error_tx.send(TransportError::ConnectTimeout);
                machine.transition(ConnEvent::ConnectFailed);
                let _ = state_tx.send(machine.state());
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            machine.transition(ConnEvent::Shutdown);
            let _ = state_tx.send(machine.state());
            return;
        }
        tokio::time::sleep(config.retry_interval).await;
    }
}
