//! Single-scalar ("RL") codec dialect: one `move` axis folding direction,
//! speed and halt into a single index, instead of DL's separate tensors.

use std::collections::HashMap;

use worldmodel::WorldModel;

use crate::codec::{expect_tensor, Codec, CodecMismatch, DecodedCommand};
use crate::dl::{DlCodec, DlCodecConfig};
use crate::spaces::SignalSpec;
use crate::tensor::{Dtype, Tensor};

pub struct RlCodec {
    inner: DlCodec,
    config: DlCodecConfig,
}

impl RlCodec {
    pub fn new(config: DlCodecConfig) -> Self {
        Self {
            inner: DlCodec::new(config.clone()),
            config,
        }
    }

    /// Size of the combined move axis, including the halt slot.
    pub fn move_axis_size(&self) -> usize {
        self.config.num_directions * self.config.num_speeds + 1
    }

    /// Index of the halt token within the move axis.
    pub fn halt_index(&self) -> usize {
        self.config.num_directions * self.config.num_speeds / 2
    }

    /// Maps a combined move index to the DL dialect's `(dirIdx, speedIdx)`
    /// pair, or `None` if it's the halt token. The halt token sits in the
    /// middle of an otherwise-contiguous `numDirections * numSpeeds` index
    /// space, so indices above it shift down by one.
    fn decode_move_index(&self, move_idx: usize) -> Option<(usize, usize)> {
        let halt = self.halt_index();
        if move_idx == halt {
            return None;
        }
        let raw = if move_idx > halt { move_idx - 1 } else { move_idx };
        Some((raw % self.config.num_directions, raw / self.config.num_directions))
    }
}

impl Codec for RlCodec {
    fn encode(&self, state: &WorldModel) -> HashMap<String, Tensor> {
        self.inner.encode(state)
    }

    fn decode(
        &self,
        actions: &HashMap<String, Tensor>,
        states: &[WorldModel],
    ) -> Result<Vec<DecodedCommand>, CodecMismatch> {
        let move_t = expect_tensor(actions, "move")?;
        let move_idx = move_t.as_scalar() as usize;

        let Some((dir_idx, speed_idx)) = self.decode_move_index(move_idx) else {
            return Ok(vec![DecodedCommand::halt()]);
        };

        let mut dl_actions = actions.clone();
        let packed = speed_idx * self.config.num_directions + dir_idx;
        dl_actions.insert("move".to_string(), Tensor::scalar(Dtype::Int, packed as f64));
        self.inner.decode(&dl_actions, states)
    }

    fn spec(&self) -> HashMap<String, SignalSpec> {
        let mut spec = self.inner.spec();
        spec.insert(
            "move".to_string(),
            SignalSpec::new(Dtype::Int, vec![1], 0.0, (self.move_axis_size() - 1) as f64),
        );
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DlCodecConfig {
        DlCodecConfig {
            num_directions: 8,
            num_speeds: 5,
            num_sensor_directions: 7,
            marker_labels: Vec::new(),
            max_radar_distance: 3.0,
            max_pps: 400.0,
            grid_width: 11,
            grid_height: 11,
        }
    }

    #[test]
    fn test_halt_index_is_midpoint() {
        let codec = RlCodec::new(config());
        assert_eq!(codec.halt_index(), 20);
        assert_eq!(codec.move_axis_size(), 41);
    }

    #[test]
    fn test_halt_token_decodes_to_none() {
        let codec = RlCodec::new(config());
        assert_eq!(codec.decode_move_index(20), None);
    }

    #[test]
    fn test_indices_below_and_above_halt_shift_correctly() {
        let codec = RlCodec::new(config());
        assert_eq!(codec.decode_move_index(0), Some((0, 0)));
        // index 21 is just past the halt slot (20); raw = 20 -> (20 % 8, 20 / 8) = (4, 2).
        assert_eq!(codec.decode_move_index(21), Some((4, 2)));
    }
}
