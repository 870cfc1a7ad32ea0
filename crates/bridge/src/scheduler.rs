//! Command emission rules: debounce, keep-alive, halt-coalescing, and
//! scan throttling, applied to the codec's decoded commands before they're
//! handed to the transport.

use std::time::{Duration, Instant};

use transport::OutboundLine;
use types::Complex;

use rl::DecodedCommand;

/// Matches two `Complex` directions within floating-point jitter rather
/// than bit-for-bit, so repeated decode calls that land on "the same"
/// angle don't spuriously look "changed".
const ANGLE_EPS_DEG: f64 = 1e-6;

fn angles_match(a: Complex, b: Complex) -> bool {
    (a.to_deg() - b.to_deg()).abs() < ANGLE_EPS_DEG
}

#[derive(Clone, Copy, PartialEq)]
enum MotionSlot {
    Halt,
    Move { direction: Complex, speed: f64 },
}

impl MotionSlot {
    fn matches(&self, other: &MotionSlot) -> bool {
        match (self, other) {
            (MotionSlot::Halt, MotionSlot::Halt) => true,
            (
                MotionSlot::Move { direction: d1, speed: s1 },
                MotionSlot::Move { direction: d2, speed: s2 },
            ) => angles_match(*d1, *d2) && (s1 - s2).abs() < 1e-9,
            _ => false,
        }
    }
}

/// Rounds a speed to the nearest multiple of `motor_scale` (`0.1 · MAX_PPS`
/// by construction).
pub fn quantise_speed(speed: f64, motor_scale: f64) -> f64 {
    if motor_scale <= 0.0 {
        return speed;
    }
    (speed / motor_scale).round() * motor_scale
}

/// Debounces and paces the motion/scan commands a [`crate::ControlLoop`]
/// decodes each cycle into the lines actually worth putting on the wire.
pub struct CommandScheduler {
    motor_scale: f64,
    command_interval: Duration,
    scan_throttle: Duration,
    last_motion: Option<MotionSlot>,
    last_motion_sent_at: Option<Instant>,
    last_scan_dir: Option<Complex>,
    last_scan_sent_at: Option<Instant>,
}

impl CommandScheduler {
    pub fn new(motor_scale: f64, command_interval: Duration, scan_throttle: Duration) -> Self {
        Self {
            motor_scale,
            command_interval,
            scan_throttle,
            last_motion: None,
            last_motion_sent_at: None,
            last_scan_dir: None,
            last_scan_sent_at: None,
        }
    }

    pub fn motor_scale(&self) -> f64 {
        self.motor_scale
    }

    /// Apply the emission rules to one decoded command, returning the
    /// lines (zero, one, or both of motion/scan) that should actually go
    /// out this cycle.
    pub fn on_decoded(&mut self, command: &DecodedCommand, now: Instant) -> Vec<OutboundLine> {
        let mut out = Vec::with_capacity(2);
        if let Some(line) = self.on_motion(command, now) {
            out.push(line);
        }
        if let Some(line) = self.on_scan(command.sensor_direction, now) {
            out.push(line);
        }
        out
    }

    /// Force an immediate halt, bypassing debounce — used on shutdown to
    /// flush a final stop command regardless of what was last sent.
    pub fn force_halt(&mut self, now: Instant) -> Option<OutboundLine> {
        self.last_motion = Some(MotionSlot::Halt);
        self.last_motion_sent_at = Some(now);
        Some(OutboundLine::Motion(protocol::format_halt()))
    }

    fn on_motion(&mut self, command: &DecodedCommand, now: Instant) -> Option<OutboundLine> {
        let slot = if command.halt {
            MotionSlot::Halt
        } else {
            MotionSlot::Move {
                direction: command.direction,
                speed: quantise_speed(command.speed, self.motor_scale),
            }
        };

        let changed = !matches!(&self.last_motion, Some(prev) if prev.matches(&slot));

        if changed {
            self.last_motion = Some(slot);
            self.last_motion_sent_at = Some(now);
            return Some(self.format_motion(slot));
        }

        // Halts coalesce fully: once sent, an unchanged halt never
        // re-emits, not even as a keep-alive.
        if matches!(slot, MotionSlot::Halt) {
            return None;
        }

        let due = self
            .last_motion_sent_at
            .map_or(true, |sent| now.duration_since(sent) >= self.command_interval);
        if due {
            self.last_motion_sent_at = Some(now);
            Some(self.format_motion(slot))
        } else {
            None
        }
    }

    fn on_scan(&mut self, sensor_direction: Complex, now: Instant) -> Option<OutboundLine> {
        let changed = !matches!(self.last_scan_dir, Some(prev) if angles_match(prev, sensor_direction));
        if !changed {
            return None;
        }

        let throttled = self
            .last_scan_sent_at
            .is_some_and(|sent| now.duration_since(sent) < self.scan_throttle);
        if throttled {
            return None;
        }

        self.last_scan_dir = Some(sensor_direction);
        self.last_scan_sent_at = Some(now);
        Some(OutboundLine::Scan(protocol::format_scan(sensor_direction)))
    }

    fn format_motion(&self, slot: MotionSlot) -> OutboundLine {
        match slot {
            MotionSlot::Halt => OutboundLine::Motion(protocol::format_halt()),
            MotionSlot::Move { direction, speed } => OutboundLine::Motion(protocol::format_move(direction, speed)),
        }
    }
}
