//! Shared codec contract and the pieces common to both dialects.

use std::collections::HashMap;

use thiserror::Error;
use types::Complex;
use worldmodel::WorldModel;

use crate::spaces::SignalSpec;
use crate::tensor::Tensor;

#[derive(Debug, Error, PartialEq)]
pub enum CodecMismatch {
    #[error("missing signal '{0}'")]
    MissingSignal(String),
    #[error("signal '{signal}' expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        signal: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// One decoded action, before the control loop's debounce/throttle pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedCommand {
    pub halt: bool,
    pub direction: Complex,
    pub speed: f64,
    pub sensor_direction: Complex,
}

impl DecodedCommand {
    pub fn halt() -> Self {
        Self {
            halt: true,
            direction: Complex::ZERO_DEG,
            speed: 0.0,
            sensor_direction: Complex::ZERO_DEG,
        }
    }
}

/// Shared interface for both RL codec dialects: `encode` turns a world
/// model into named tensors, `decode` turns the agent's tensors (plus the
/// recent world model history) back into commands, and `spec` advertises
/// the tensor contract so an agent can build matching I/O heads.
pub trait Codec {
    fn encode(&self, state: &WorldModel) -> HashMap<String, Tensor>;
    fn decode(
        &self,
        actions: &HashMap<String, Tensor>,
        states: &[WorldModel],
    ) -> Result<Vec<DecodedCommand>, CodecMismatch>;
    fn spec(&self) -> HashMap<String, SignalSpec>;
}

/// `canMoveStates` lookup, per the fixed table keyed on
/// `(canMoveForward, canMoveBackward, frontSensor)`.
pub fn can_move_state(can_move_forward: bool, can_move_backward: bool, front_sensor: bool) -> u8 {
    match (can_move_forward, can_move_backward) {
        (true, false) => 2,
        (true, true) => 3,
        (false, false) => {
            if front_sensor {
                4
            } else {
                0
            }
        }
        (false, true) => {
            if front_sensor {
                5
            } else {
                1
            }
        }
    }
}

/// `speed == 0 AND direction within sin(1°) of robot.direction` collapses
/// the decoded command to halt regardless of which codec produced it.
pub fn is_close_to_current_heading(direction: Complex, robot_direction: Complex, speed: f64) -> bool {
    if speed != 0.0 {
        return false;
    }
    let rel = direction.sub(robot_direction).to_rad();
    rel.sin().abs() <= 1.0_f64.to_radians().sin()
}

pub(crate) fn expect_tensor<'a>(
    tensors: &'a HashMap<String, Tensor>,
    name: &str,
) -> Result<&'a Tensor, CodecMismatch> {
    tensors
        .get(name)
        .ok_or_else(|| CodecMismatch::MissingSignal(name.to_string()))
}
