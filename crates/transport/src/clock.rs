//! Rolling clock offset estimate from averaged round-trip probes.

use std::time::Duration;

use tracing::trace;
use types::Timestamp;

#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// How often a new round of probes is sent.
    pub interval: Duration,
    /// A probe with no reply within this window is dropped.
    pub timeout: Duration,
    /// Number of probes averaged per round.
    pub probes_per_round: usize,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_millis(500),
            probes_per_round: 4,
        }
    }
}

/// `offset = remote_ms - local_ms`, estimated from one round-trip sample:
/// `origin` (local send), `receive`/`transmit` (remote receive/send), and
/// `destination` (local receive). All arithmetic is signed 64-bit ms.
pub fn sample_offset(
    origin: Timestamp,
    receive: Timestamp,
    transmit: Timestamp,
    destination: Timestamp,
) -> Timestamp {
    let sum = (receive - origin) + (transmit - destination);
    (sum as f64 / 2.0).round() as Timestamp
}

/// Accumulates one round of probe samples and rolls them into a single
/// offset estimate. Driven externally: the caller emits probes on
/// `interval`, feeds replies to `on_reply`, and drops unanswered probes
/// with `on_timeout`.
pub struct ClockSync {
    config: ClockConfig,
    pending_origin: Option<Timestamp>,
    samples: Vec<Timestamp>,
    offset: Timestamp,
}

impl ClockSync {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            pending_origin: None,
            samples: Vec::new(),
            offset: 0,
        }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn offset(&self) -> Timestamp {
        self.offset
    }

    pub fn from_remote(&self, t: Timestamp) -> Timestamp {
        t + self.offset
    }

    pub fn to_remote(&self, t: Timestamp) -> Timestamp {
        t - self.offset
    }

    /// Begin one probe, returning the `ck <local_ts>` line to send.
    pub fn begin_probe(&mut self, now_local: Timestamp) -> String {
        self.pending_origin = Some(now_local);
        protocol_line(now_local)
    }

    /// Process an echoed `ck` reply. Returns `Some(new_offset)` once a
    /// full round of `probes_per_round` samples has been collected.
    pub fn on_reply(
        &mut self,
        destination_local: Timestamp,
        local_ts: Timestamp,
        recv_remote: Timestamp,
        xmit_remote: Timestamp,
    ) -> Option<Timestamp> {
        if self.pending_origin != Some(local_ts) {
            trace!(local_ts, "stale or unexpected clock reply, ignoring");
            return None;
        }
        self.pending_origin = None;

        let sample = sample_offset(local_ts, recv_remote, xmit_remote, destination_local);
        self.samples.push(sample);

        if self.samples.len() >= self.config.probes_per_round {
            let mean = self.samples.iter().sum::<Timestamp>() as f64 / self.samples.len() as f64;
            self.offset = mean.round() as Timestamp;
            self.samples.clear();
            Some(self.offset)
        } else {
            None
        }
    }

    /// A probe expired with no reply; drop it and move on.
    pub fn on_timeout(&mut self) {
        self.pending_origin = None;
    }
}

fn protocol_line(local_ts: Timestamp) -> String {
    format!("ck {local_ts}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_offset_scenario() {
        // origin=1000, remote receive=2100, remote transmit=2102, destination=1004.
        let offset = sample_offset(1000, 2100, 2102, 1004);
        assert_eq!(offset, 1099);
    }

    #[test]
    fn test_sample_offset_exact_symmetric_latency() {
        // origin=A, receive=A+o+d, transmit=A+o+d, destination=A+2d -> offset = o exactly.
        let a = 5_000;
        let o = 250;
        let d = 30;
        let offset = sample_offset(a, a + o + d, a + o + d, a + 2 * d);
        assert_eq!(offset, o);
    }

    #[test]
    fn test_clock_sync_averages_round() {
        let mut sync = ClockSync::new(ClockConfig {
            probes_per_round: 2,
            ..ClockConfig::default()
        });

        let line = sync.begin_probe(1000);
        assert_eq!(line, "ck 1000");
        assert_eq!(sync.on_reply(1004, 1000, 2100, 2102), None);

        sync.begin_probe(2000);
        let result = sync.on_reply(2010, 2000, 3100, 3101);
        assert!(result.is_some());
        assert_eq!(sync.offset(), result.unwrap());
    }

    #[test]
    fn test_stale_reply_ignored() {
        let mut sync = ClockSync::new(ClockConfig::default());
        sync.begin_probe(1000);
        assert_eq!(sync.on_reply(1004, 999, 2100, 2102), None);
    }

    #[test]
    fn test_timeout_drops_pending_probe() {
        let mut sync = ClockSync::new(ClockConfig::default());
        sync.begin_probe(1000);
        sync.on_timeout();
        assert_eq!(sync.on_reply(1004, 1000, 2100, 2102), None);
    }

    #[test]
    fn test_from_remote_to_remote_roundtrip() {
        let mut sync = ClockSync::new(ClockConfig {
            probes_per_round: 1,
            ..ClockConfig::default()
        });
        sync.begin_probe(1000);
        sync.on_reply(1004, 1000, 2100, 2102);
        let t = 50_000;
        assert_eq!(sync.to_remote(sync.from_remote(t)), t);
    }
}
