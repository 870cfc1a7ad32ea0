//! Shared domain types for the rover control bridge.

use serde::{Deserialize, Serialize};

/// Monotonic milliseconds since an arbitrary epoch.
///
/// All events in the bridge carry one of these rather than a wall-clock
/// `DateTime`, since the wire protocol itself only ever exchanges raw
/// millisecond counters.
pub type Timestamp = i64;

/// A unit-length 2D direction, stored as `(cos, sin)` rather than an angle
/// so that repeated composition doesn't accumulate wrap-around error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    pub x: f64,
    pub y: f64,
}

impl Complex {
    pub const ZERO_DEG: Self = Self { x: 1.0, y: 0.0 };

    pub fn from_rad(rad: f64) -> Self {
        Self {
            x: rad.cos(),
            y: rad.sin(),
        }
    }

    pub fn from_deg(deg: f64) -> Self {
        Self::from_rad(deg.to_radians())
    }

    pub fn to_rad(self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn to_deg(self) -> f64 {
        self.to_rad().to_degrees()
    }

    /// Angle-sum, i.e. complex multiplication of two unit vectors.
    pub fn add(self, other: Self) -> Self {
        Self {
            x: self.x * other.x - self.y * other.y,
            y: self.x * other.y + self.y * other.x,
        }
        .normalized()
    }

    /// Angle-difference, i.e. multiplication by the conjugate.
    pub fn sub(self, other: Self) -> Self {
        Self {
            x: self.x * other.x + self.y * other.y,
            y: self.y * other.x - self.x * other.y,
        }
        .normalized()
    }

    /// Direction from `from` to `to`, both 2D points (not `Complex`).
    pub fn direction(from: (f64, f64), to: (f64, f64)) -> Self {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        if dx == 0.0 && dy == 0.0 {
            Self::ZERO_DEG
        } else {
            Self::from_rad(dy.atan2(dx))
        }
    }

    /// Clamp the represented angle to `[-limit_deg, limit_deg]`.
    pub fn clamp_deg(self, limit_deg: f64) -> Self {
        let deg = self.to_deg().clamp(-limit_deg, limit_deg);
        Self::from_deg(deg)
    }

    fn normalized(self) -> Self {
        let mag = (self.x * self.x + self.y * self.y).sqrt();
        if mag > 0.0 {
            Self {
                x: self.x / mag,
                y: self.y / mag,
            }
        } else {
            Self::ZERO_DEG
        }
    }
}

impl Default for Complex {
    fn default() -> Self {
        Self::ZERO_DEG
    }
}

/// Normalize an angle in radians into `[-pi, pi)`.
pub fn normalize_rad(rad: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let mut a = rad % two_pi;
    if a >= std::f64::consts::PI {
        a -= two_pi;
    } else if a < -std::f64::consts::PI {
        a += two_pi;
    }
    a
}

bitflags::bitflags! {
    /// Eight directional contact-sensor bits, packed as reported on the
    /// wire by the `st` status line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct Contacts: u8 {
        const FRONT = 0b0000_0001;
        const FRONT_RIGHT = 0b0000_0010;
        const RIGHT = 0b0000_0100;
        const REAR_RIGHT = 0b0000_1000;
        const REAR = 0b0001_0000;
        const REAR_LEFT = 0b0010_0000;
        const LEFT = 0b0100_0000;
        const FRONT_LEFT = 0b1000_0000;
    }
}

/// Immutable snapshot of the vehicle's reported state, decoded from one
/// `st` line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    /// Location in world frame, metres.
    pub location: (f64, f64),
    /// Body heading.
    pub direction: Complex,
    /// Proximity sensor direction relative to the body, clamped to ±90°.
    pub sensor_direction: Complex,
    /// Echo distance in metres; 0 means no echo within range.
    pub echo_distance: f64,
    pub can_move_forward: bool,
    pub can_move_backward: bool,
    /// Front obstacle flag, independent of the contact bitmask.
    pub front_sensor: bool,
    pub contacts: Contacts,
    pub timestamp: Timestamp,
}

impl RobotStatus {
    /// `direction + sensorDirection`, i.e. the sensor's direction in the
    /// world frame.
    pub fn head_abs_direction(&self) -> Complex {
        self.direction.add(self.sensor_direction)
    }

    /// Check the invariant `contacts == 0 ⇒ canMoveForward ∧ canMoveBackward`.
    pub fn is_consistent(&self) -> bool {
        !self.contacts.is_empty() || (self.can_move_forward && self.can_move_backward)
    }
}

/// A proximity-sensor reading with the pose it was taken at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxySample {
    pub timestamp: Timestamp,
    pub sensor_dir: Complex,
    /// Metres; 0 means no echo.
    pub distance: f64,
    /// World-frame point the echo resolves to, if known independently of
    /// `robot.location + distance·headAbsDirection` (legacy proxy lines
    /// carry this explicitly; status-derived samples recompute it).
    pub sample_location: Option<(f64, f64)>,
}

/// One obstacle in the scanner map.
///
/// Equality is by `location` only, per the grid-snapped identity the map
/// maintains — two obstacles at the same cell are the same obstacle even
/// if their likelihood or timestamp differ.
#[derive(Debug, Clone, Copy)]
pub struct Obstacle {
    pub location: (f64, f64),
    pub timestamp: Timestamp,
    pub likelihood: f64,
}

impl PartialEq for Obstacle {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

/// Snap a continuous location to the nearest multiple of `grid_size`.
pub fn snap(location: (f64, f64), grid_size: f64) -> (f64, f64) {
    let snap1 = |v: f64| (v / grid_size).round() * grid_size;
    (snap1(location.0), snap1(location.1))
}

/// Decoded vehicle command, ready for the message codec to format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Move at `direction` (world-frame heading) and `speed` (pulses/s,
    /// signed).
    Move { direction: Complex, speed: f64 },
    /// Point the proximity sensor.
    Scan { sensor_direction: Complex },
    /// Stop moving. Distinct from `Move` with `speed == 0` so debouncing
    /// can coalesce repeated halts.
    Halt,
}

/// Result delivered to the control loop's observer after each closed
/// cycle (one-cycle latency behind the cycle that produced `state1`).
#[derive(Debug, Clone)]
pub struct ExecutionResult<S, A> {
    pub state0: S,
    pub actions0: A,
    pub reward: f64,
    pub state1: S,
    pub terminal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complex_from_deg_roundtrip() {
        for deg in [0.0, 45.0, 90.0, 135.0, -90.0, -179.0] {
            let c = Complex::from_deg(deg);
            assert!((c.to_deg() - deg).abs() < 1e-6);
        }
    }

    #[test]
    fn test_complex_unit_magnitude() {
        let c = Complex::from_deg(37.0);
        let mag = (c.x * c.x + c.y * c.y).sqrt();
        assert!((mag - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_complex_add_sub_inverse() {
        let a = Complex::from_deg(30.0);
        let b = Complex::from_deg(50.0);
        let sum = a.add(b);
        let back = sum.sub(b);
        assert!((back.to_deg() - a.to_deg()).abs() < 1e-6);
    }

    #[test]
    fn test_complex_direction() {
        let d = Complex::direction((0.0, 0.0), (1.0, 1.0));
        assert!((d.to_deg() - 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_complex_clamp_deg() {
        let c = Complex::from_deg(120.0).clamp_deg(90.0);
        assert!((c.to_deg() - 90.0).abs() < 1e-6);
        let c = Complex::from_deg(-120.0).clamp_deg(90.0);
        assert!((c.to_deg() - (-90.0)).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_rad() {
        use std::f64::consts::PI;
        assert!((normalize_rad(3.0 * PI) - (-PI)).abs() < 1e-9 || (normalize_rad(3.0 * PI) - PI).abs() < 1e-9);
        assert!((normalize_rad(0.0)).abs() < 1e-9);
    }

    #[test]
    fn test_snap() {
        assert_eq!(snap((1.09, -0.31), 0.2), (1.0, -0.4));
    }

    #[test]
    fn test_robot_status_consistency() {
        let mut status = RobotStatus {
            location: (0.0, 0.0),
            direction: Complex::default(),
            sensor_direction: Complex::default(),
            echo_distance: 0.0,
            can_move_forward: true,
            can_move_backward: true,
            front_sensor: false,
            contacts: Contacts::empty(),
            timestamp: 0,
        };
        assert!(status.is_consistent());

        status.can_move_backward = false;
        assert!(!status.is_consistent());

        status.contacts = Contacts::FRONT;
        assert!(status.is_consistent());
    }

    #[test]
    fn test_obstacle_equality_by_location() {
        let a = Obstacle {
            location: (1.0, 2.0),
            timestamp: 0,
            likelihood: 0.2,
        };
        let b = Obstacle {
            location: (1.0, 2.0),
            timestamp: 100,
            likelihood: 0.9,
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_head_abs_direction() {
        let status = RobotStatus {
            location: (0.0, 0.0),
            direction: Complex::from_deg(10.0),
            sensor_direction: Complex::from_deg(20.0),
            echo_distance: 0.0,
            can_move_forward: true,
            can_move_backward: true,
            front_sensor: false,
            contacts: Contacts::empty(),
            timestamp: 0,
        };
        assert!((status.head_abs_direction().to_deg() - 30.0).abs() < 1e-6);
    }
}
