//! Control loop (C7): turns a stream of `RobotStatus` into a stream of
//! assembled `WorldModel`s, runs them through a pluggable agent and reward
//! function, and paces the decoded commands back out over the wire.
//!
//! [`ControlLoop::step`] is the cycle itself, kept synchronous and free of
//! any transport/timer concerns so it can be driven directly in tests;
//! [`ControlLoop::run`] is the async wiring that drives it from a live
//! [`transport::LineTransport`].

pub mod scheduler;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use protocol::{Message, StatusLine};
use rl::{Codec, CodecMismatch, DecodedCommand, Tensor};
use transport::{ClockSync, LineTransport, OutboundLine, TransportError};
use types::{Complex, Contacts, ExecutionResult, RobotStatus, Timestamp};
use worldmodel::WorldModelAssembler;

pub use scheduler::CommandScheduler;

/// Agent callable: given the encoded state, returns the encoded action.
/// A blanket impl lets any matching closure stand in directly.
pub trait Agent: Send {
    fn act(&mut self, signals: &HashMap<String, Tensor>) -> HashMap<String, Tensor>;
}

impl<F> Agent for F
where
    F: FnMut(&HashMap<String, Tensor>) -> HashMap<String, Tensor> + Send,
{
    fn act(&mut self, signals: &HashMap<String, Tensor>) -> HashMap<String, Tensor> {
        self(signals)
    }
}

/// Reward callable, invoked once a previous cycle exists to close over.
pub trait RewardFn: Send {
    fn reward(
        &mut self,
        state0: &worldmodel::WorldModel,
        prev_command: &DecodedCommand,
        state1: &worldmodel::WorldModel,
    ) -> f64;
}

impl<F> RewardFn for F
where
    F: FnMut(&worldmodel::WorldModel, &DecodedCommand, &worldmodel::WorldModel) -> f64 + Send,
{
    fn reward(
        &mut self,
        state0: &worldmodel::WorldModel,
        prev_command: &DecodedCommand,
        state1: &worldmodel::WorldModel,
    ) -> f64 {
        self(state0, prev_command, state1)
    }
}

/// The default reward function: the control loop does not interpret the
/// agent's policy, so absent an external reward source nothing is scored.
#[derive(Default)]
pub struct NullReward;

impl RewardFn for NullReward {
    fn reward(
        &mut self,
        _state0: &worldmodel::WorldModel,
        _prev_command: &DecodedCommand,
        _state1: &worldmodel::WorldModel,
    ) -> f64 {
        0.0
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Malformed(#[from] protocol::MalformedMessage),
    #[error(transparent)]
    Codec(#[from] CodecMismatch),
}

struct PrevCycle {
    state: worldmodel::WorldModel,
    signals: HashMap<String, Tensor>,
    actions: HashMap<String, Tensor>,
    command: DecodedCommand,
}

/// One closed cycle's output: the lines to send, and (once a previous
/// cycle exists) the result to surface to the observer.
pub struct CycleOutput {
    pub outbound: Vec<OutboundLine>,
    pub result: Option<ExecutionResult<HashMap<String, Tensor>, HashMap<String, Tensor>>>,
    /// Set when the codec rejected the agent's tensors; per the error
    /// policy this is fatal and the caller should shut down.
    pub fatal: Option<CodecMismatch>,
}

pub struct ControlLoop<A, C, R> {
    assembler: WorldModelAssembler,
    codec: C,
    agent: A,
    reward_fn: R,
    scheduler: CommandScheduler,
    prev: Option<PrevCycle>,
    on_inference: Option<Box<dyn FnMut(&RobotStatus) + Send>>,
    shutdown: Arc<AtomicBool>,
}

impl<A, C> ControlLoop<A, C, NullReward>
where
    A: Agent,
    C: Codec,
{
    pub fn new(assembler: WorldModelAssembler, codec: C, agent: A, scheduler: CommandScheduler) -> Self {
        Self {
            assembler,
            codec,
            agent,
            reward_fn: NullReward,
            scheduler,
            prev: None,
            on_inference: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<A, C, R> ControlLoop<A, C, R>
where
    A: Agent,
    C: Codec,
    R: RewardFn,
{
    pub fn with_reward_fn(
        assembler: WorldModelAssembler,
        codec: C,
        agent: A,
        reward_fn: R,
        scheduler: CommandScheduler,
    ) -> Self {
        Self {
            assembler,
            codec,
            agent,
            reward_fn,
            scheduler,
            prev: None,
            on_inference: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a read-only peek hook, invoked before the cycle does
    /// anything else with the status.
    pub fn set_on_inference(&mut self, hook: impl FnMut(&RobotStatus) + Send + 'static) {
        self.on_inference = Some(Box::new(hook));
    }

    /// A clone of the shutdown flag, so another task can request an
    /// orderly stop of [`run`](Self::run).
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Run one cycle to completion: assemble, encode, act, decode,
    /// schedule outbound lines, and close out the previous cycle.
    pub fn step(
        &mut self,
        status: RobotStatus,
        sample: Option<types::ProxySample>,
        marker_observations: &[(String, (f64, f64))],
        now: Instant,
    ) -> CycleOutput {
        if let Some(hook) = self.on_inference.as_mut() {
            hook(&status);
        }

        let state1 = self.assembler.assemble(status, sample, marker_observations);
        let signals1 = self.codec.encode(&state1);
        let actions1 = self.agent.act(&signals1);

        let (command, fatal) = match self.codec.decode(&actions1, std::slice::from_ref(&state1)) {
            Ok(mut decoded) if !decoded.is_empty() => (decoded.remove(0), None),
            Ok(_) => (DecodedCommand::halt(), None),
            Err(err) => {
                warn!(?err, "codec rejected agent tensors; halting");
                (DecodedCommand::halt(), Some(err))
            }
        };

        let outbound = self.scheduler.on_decoded(&command, now);

        let result = self.prev.take().map(|prev| {
            let reward = self.reward_fn.reward(&prev.state, &prev.command, &state1);
            ExecutionResult {
                state0: prev.signals,
                actions0: prev.actions,
                reward,
                state1: signals1.clone(),
                terminal: false,
            }
        });

        self.prev = Some(PrevCycle {
            state: state1,
            signals: signals1,
            actions: actions1,
            command,
        });

        CycleOutput {
            outbound,
            result,
            fatal,
        }
    }

    /// Flush a final halt and stop accepting new cycles.
    pub fn shutdown(&mut self) -> Vec<OutboundLine> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.scheduler.force_halt(Instant::now()).into_iter().collect()
    }

    /// Drive the cycle from a live transport: sends the initial status
    /// request, then loops on inbound `st`/`ck` lines, clock probes, and
    /// external marker observations until [`request_shutdown`] fires or
    /// the transport closes.
    pub async fn run(
        mut self,
        transport: &mut LineTransport,
        clock: &mut ClockSync,
        results_tx: mpsc::Sender<ExecutionResult<HashMap<String, Tensor>, HashMap<String, Tensor>>>,
        errors_tx: mpsc::UnboundedSender<BridgeError>,
        mut markers_rx: mpsc::UnboundedReceiver<(String, (f64, f64))>,
        reaction_interval_ms: i64,
        clock_probe_interval: Duration,
    ) {
        transport.send(OutboundLine::Other(protocol::format_status_request(reaction_interval_ms)));

        let mut probe_tick = tokio::time::interval(clock_probe_interval);
        let mut markers: HashMap<String, (f64, f64)> = HashMap::new();

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = probe_tick.tick() => {
                    let probe = clock.begin_probe(now_ms());
                    transport.send(OutboundLine::Other(probe));
                }
                Some((label, location)) = markers_rx.recv() => {
                    markers.insert(label, location);
                }
                line = transport.recv_line() => {
                    let Some((_, text)) = line else { break; };
                    match protocol::parse(&text) {
                        Ok(Some(Message::Status(s))) => {
                            self.handle_status(&s, clock, &markers, &results_tx, &errors_tx).await;
                        }
                        Ok(Some(Message::Clock(c))) => {
                            if let (Some(recv_remote), Some(xmit_remote)) = (c.recv_remote, c.xmit_remote) {
                                clock.on_reply(now_ms(), c.local_ts, recv_remote, xmit_remote);
                            }
                        }
                        Ok(Some(Message::ContactRate(c))) => {
                            trace!(cps = c.cps, "contact rate diagnostic");
                        }
                        Ok(Some(Message::Proxy(_))) | Ok(None) => {}
                        Err(err) => {
                            warn!(%err, "malformed line, dropping");
                            let _ = errors_tx.send(BridgeError::Malformed(err));
                        }
                    }
                }
                error = transport.recv_error() => {
                    if let Some(err) = error {
                        let _ = errors_tx.send(BridgeError::Transport(err));
                    }
                }
            }
        }

        for line in self.shutdown() {
            transport.send(line);
        }
        transport.close();
    }

    async fn handle_status(
        &mut self,
        line: &StatusLine,
        clock: &ClockSync,
        markers: &HashMap<String, (f64, f64)>,
        results_tx: &mpsc::Sender<ExecutionResult<HashMap<String, Tensor>, HashMap<String, Tensor>>>,
        errors_tx: &mpsc::UnboundedSender<BridgeError>,
    ) {
        let status = status_from_line(line, clock);
        let sample = sample_from_line(line, &status);
        let marker_observations: Vec<_> = markers.iter().map(|(k, v)| (k.clone(), *v)).collect();

        let outcome = self.step(status, Some(sample), &marker_observations, Instant::now());

        debug!(outbound = outcome.outbound.len(), "control loop cycle complete");

        if let Some(result) = outcome.result {
            let _ = results_tx.send(result).await;
        }
        if let Some(err) = outcome.fatal {
            let _ = errors_tx.send(BridgeError::Codec(err));
            self.request_shutdown();
        }
    }
}

fn status_from_line(line: &StatusLine, clock: &ClockSync) -> RobotStatus {
    RobotStatus {
        location: (line.x, line.y),
        direction: Complex::from_deg(line.yaw_deg),
        sensor_direction: Complex::from_deg(line.sensor_deg).clamp_deg(90.0),
        echo_distance: line.distance_m,
        can_move_forward: line.can_fwd,
        can_move_backward: line.can_bwd,
        front_sensor: line.front_sensor,
        contacts: line.contacts,
        timestamp: clock.from_remote(line.remote_ts),
    }
}

fn sample_from_line(line: &StatusLine, status: &RobotStatus) -> types::ProxySample {
    types::ProxySample {
        timestamp: status.timestamp,
        sensor_dir: status.head_abs_direction(),
        distance: line.distance_m,
        sample_location: None,
    }
}

fn now_ms() -> Timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}
