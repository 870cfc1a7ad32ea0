//! Discrete-tensor ("DL") codec dialect: one named tensor per signal, move
//! and sensor actions each their own quantised index.

use std::collections::HashMap;
use std::f64::consts::PI;

use types::Complex;
use worldmodel::{CircularSector, MapCell, WorldModel};

use crate::codec::{can_move_state, expect_tensor, is_close_to_current_heading, Codec, CodecMismatch, DecodedCommand};
use crate::spaces::SignalSpec;
use crate::tensor::{Dtype, Tensor};

#[derive(Debug, Clone)]
pub struct DlCodecConfig {
    pub num_directions: usize,
    pub num_speeds: usize,
    pub num_sensor_directions: usize,
    pub marker_labels: Vec<String>,
    pub max_radar_distance: f64,
    pub max_pps: f64,
    pub grid_width: usize,
    pub grid_height: usize,
}

pub struct DlCodec {
    config: DlCodecConfig,
}

impl DlCodec {
    pub fn new(config: DlCodecConfig) -> Self {
        Self { config }
    }

    fn num_channels(&self) -> usize {
        4 + self.config.marker_labels.len()
    }
}

impl Codec for DlCodec {
    fn encode(&self, state: &WorldModel) -> HashMap<String, Tensor> {
        let mut out = HashMap::new();
        let grid = &state.grid_map;

        let mut map = Tensor::zeros(Dtype::Int, vec![self.num_channels(), grid.width, grid.height]);
        for row in 0..grid.height {
            for col in 0..grid.width {
                let channel = match grid.get(col, row) {
                    MapCell::Unknown => 0,
                    MapCell::Empty => 1,
                    MapCell::Contact => 2,
                    MapCell::Echogenic => 3,
                };
                map.set(&[channel, col, row], 1.0);
            }
        }
        for (i, label) in self.config.marker_labels.iter().enumerate() {
            if let Some((location, _ts)) = state.markers.get(label) {
                let range = euclidean(state.status.location, *location);
                if range <= self.config.max_radar_distance {
                    let (col, row) = grid_cell_of(state, grid.grid_size, grid.width, grid.height, *location);
                    if let (Some(col), Some(row)) = (col, row) {
                        // Intentional (channel, y, x) write, preserved as observed.
                        map.set(&[4 + i, row, col], 1.0);
                    }
                }
            }
        }
        out.insert("map".to_string(), map);

        let sensor_deg = clamp_deg(
            normalize_deg(state.status.head_abs_direction().sub(state.direction).to_deg()),
            -135.0,
            135.0,
        );
        out.insert("sensor".to_string(), Tensor::scalar(Dtype::Float, sensor_deg));

        let code = can_move_state(
            state.status.can_move_forward,
            state.status.can_move_backward,
            state.status.front_sensor,
        );
        out.insert("canMoveStates".to_string(), Tensor::scalar(Dtype::Int, code as f64));

        let n = state.polar_map.num_sectors();
        let mut sector_states = Tensor::zeros(Dtype::Int, vec![n]);
        let mut sector_distances = Tensor::zeros(Dtype::Float, vec![n]);
        for (i, sector) in state.polar_map.sectors.iter().enumerate() {
            let (code, dist) = match sector {
                CircularSector::Unknown => (0.0, -1.0),
                CircularSector::Empty => (1.0, -1.0),
                CircularSector::Hindered { distance, .. } => (2.0, *distance),
            };
            sector_states.set(&[i], code);
            sector_distances.set(&[i], dist);
        }
        out.insert("sectorStates".to_string(), sector_states);
        out.insert("sectorDistances".to_string(), sector_distances);

        let m = self.config.marker_labels.len();
        let mut marker_states = Tensor::zeros(Dtype::Int, vec![m]);
        let mut marker_distances = Tensor::zeros(Dtype::Float, vec![m]);
        let mut marker_directions = Tensor::zeros(Dtype::Float, vec![m]);
        for (i, label) in self.config.marker_labels.iter().enumerate() {
            if let Some((location, _ts)) = state.markers.get(label) {
                let range = euclidean(state.status.location, *location);
                let dir = normalize_deg(
                    Complex::direction(state.status.location, *location)
                        .sub(state.direction)
                        .to_deg(),
                );
                marker_states.set(&[i], 1.0);
                marker_distances.set(&[i], range);
                marker_directions.set(&[i], dir);
            }
        }
        out.insert("markerStates".to_string(), marker_states);
        out.insert("markerDistances".to_string(), marker_distances);
        out.insert("markerDirections".to_string(), marker_directions);

        out
    }

    // `move` packs (direction, speed) as `speedIdx * numDirections + dirIdx`
    // (speed-major) — see the open-question decision on this index layout.
    fn decode(
        &self,
        actions: &HashMap<String, Tensor>,
        states: &[WorldModel],
    ) -> Result<Vec<DecodedCommand>, CodecMismatch> {
        let move_t = expect_tensor(actions, "move")?;
        let sensor_t = expect_tensor(actions, "sensorAction")?;

        let move_idx = move_t.as_scalar() as usize;
        let sensor_idx = sensor_t.as_scalar() as usize;

        let state = states.last();
        let dir_idx = move_idx % self.config.num_directions;
        let speed_idx = move_idx / self.config.num_directions;

        let relative_rad = dir_idx as f64 * 2.0 * PI / self.config.num_directions as f64 - PI;
        let speed = speed_idx as f64 * 2.0 * self.config.max_pps / (self.config.num_speeds as f64 - 1.0)
            - self.config.max_pps;

        let map_direction = state.map(|s| s.direction).unwrap_or(Complex::ZERO_DEG);
        let direction = map_direction.add(Complex::from_rad(relative_rad));

        let sensor_deg = sensor_idx as f64 * 270.0 / (self.config.num_sensor_directions as f64 - 1.0) - 135.0;
        let sensor_direction = Complex::from_deg(sensor_deg.clamp(-135.0, 135.0));

        let robot_direction = state.map(|s| s.status.direction).unwrap_or(Complex::ZERO_DEG);
        let halt = is_close_to_current_heading(direction, robot_direction, speed);

        Ok(vec![if halt {
            DecodedCommand {
                sensor_direction,
                ..DecodedCommand::halt()
            }
        } else {
            DecodedCommand {
                halt: false,
                direction,
                speed,
                sensor_direction,
            }
        }])
    }

    fn spec(&self) -> HashMap<String, SignalSpec> {
        let mut spec = HashMap::new();
        spec.insert(
            "map".to_string(),
            SignalSpec::new(
                Dtype::Int,
                vec![self.num_channels(), self.config.grid_width, self.config.grid_height],
                0.0,
                1.0,
            ),
        );
        spec.insert("sensor".to_string(), SignalSpec::new(Dtype::Float, vec![1], -135.0, 135.0));
        spec.insert(
            "canMoveStates".to_string(),
            SignalSpec::new(Dtype::Int, vec![1], 0.0, 5.0),
        );
        spec.insert(
            "move".to_string(),
            SignalSpec::new(
                Dtype::Int,
                vec![1],
                0.0,
                (self.config.num_directions * self.config.num_speeds - 1) as f64,
            ),
        );
        spec.insert(
            "sensorAction".to_string(),
            SignalSpec::new(Dtype::Int, vec![1], 0.0, (self.config.num_sensor_directions - 1) as f64),
        );
        spec
    }
}

/// `directionIndex`: inverse of the forward direction formula.
pub fn direction_index(dir_deg: f64, num_directions: usize) -> usize {
    let n = num_directions as f64;
    let raw = ((dir_deg + 180.0 + 180.0 / n) * n / 360.0).floor() as i64;
    let n_i = num_directions as i64;
    (((raw % n_i) + n_i) % n_i) as usize
}

/// `speedIndex`: inverse of the forward speed formula, clamped.
pub fn speed_index(speed: f64, num_speeds: usize, max_pps: f64) -> usize {
    let idx = ((speed + max_pps) * (num_speeds as f64 - 1.0) / (2.0 * max_pps)).round();
    idx.clamp(0.0, (num_speeds - 1) as f64) as usize
}

/// `sensorIndex`: inverse of the forward sensor-direction formula, clamped.
pub fn sensor_index(dir_deg: f64, num_sensor_directions: usize) -> usize {
    let idx = ((dir_deg + 135.0) * (num_sensor_directions as f64 - 1.0) / 270.0).round();
    idx.clamp(0.0, (num_sensor_directions - 1) as f64) as usize
}

pub fn encode_move(dir_deg: f64, speed: f64, num_directions: usize, num_speeds: usize, max_pps: f64) -> usize {
    speed_index(speed, num_speeds, max_pps) * num_directions + direction_index(dir_deg, num_directions)
}

fn euclidean(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn normalize_deg(deg: f64) -> f64 {
    let mut d = deg % 360.0;
    if d >= 180.0 {
        d -= 360.0;
    } else if d < -180.0 {
        d += 360.0;
    }
    d
}

fn clamp_deg(deg: f64, lo: f64, hi: f64) -> f64 {
    deg.max(lo).min(hi)
}

fn grid_cell_of(
    state: &WorldModel,
    grid_size: f64,
    width: usize,
    height: usize,
    location: (f64, f64),
) -> (Option<usize>, Option<usize>) {
    let dx = location.0 - state.status.location.0;
    let dy = location.1 - state.status.location.1;
    let heading = state.status.direction.to_rad();
    let (cos_h, sin_h) = (heading.cos(), heading.sin());
    let fwd = dx * cos_h + dy * sin_h;
    let left = -dx * sin_h + dy * cos_h;
    let col = (fwd / grid_size + width as f64 / 2.0).floor();
    let row = (left / grid_size + height as f64 / 2.0).floor();
    let col = if col >= 0.0 && (col as usize) < width { Some(col as usize) } else { None };
    let row = if row >= 0.0 && (row as usize) < height { Some(row as usize) } else { None };
    (col, row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use types::{Contacts, RobotStatus};
    use worldmodel::{AssemblerConfig, WorldModelAssembler};

    fn codec_config() -> DlCodecConfig {
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

    fn world_at_origin() -> worldmodel::WorldModel {
        let mut assembler = WorldModelAssembler::new(AssemblerConfig::default());
        let status = RobotStatus {
            location: (0.0, 0.0),
            direction: Complex::ZERO_DEG,
            sensor_direction: Complex::ZERO_DEG,
            echo_distance: 0.0,
            can_move_forward: true,
            can_move_backward: true,
            front_sensor: false,
            contacts: Contacts::empty(),
            timestamp: 0,
        };
        assembler.assemble(status, None, &[])
    }

    #[test]
    fn test_decode_scenario_6_move_20_sensor_3() {
        let codec = DlCodec::new(codec_config());
        let world = world_at_origin();
        let mut actions: StdHashMap<String, Tensor> = StdHashMap::new();
        actions.insert("move".to_string(), Tensor::scalar(Dtype::Int, 20.0));
        actions.insert("sensorAction".to_string(), Tensor::scalar(Dtype::Int, 3.0));

        let commands = codec.decode(&actions, std::slice::from_ref(&world)).unwrap();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].halt);
        assert!((commands[0].sensor_direction.to_deg()).abs() < 1e-6);
    }

    #[test]
    fn test_direction_index_round_trip_all_bins() {
        let n = 8;
        for i in 0..n {
            let dir_deg = i as f64 * 360.0 / n as f64 - 180.0;
            assert_eq!(direction_index(dir_deg, n), i);
        }
    }

    #[test]
    fn test_speed_index_round_trip_all_bins() {
        let n = 9;
        let max_pps = 400.0;
        for i in 0..n {
            let speed = i as f64 * 2.0 * max_pps / (n as f64 - 1.0) - max_pps;
            assert_eq!(speed_index(speed, n, max_pps), i);
        }
    }

    #[test]
    fn test_sensor_index_round_trip_all_bins() {
        let n = 7;
        for i in 0..n {
            let dir_deg = i as f64 * 270.0 / (n as f64 - 1.0) - 135.0;
            assert_eq!(sensor_index(dir_deg, n), i);
        }
    }

    #[test]
    fn test_sensor_index_clamps_outside_range() {
        assert_eq!(sensor_index(-200.0, 7), 0);
        assert_eq!(sensor_index(200.0, 7), 6);
    }

    #[test]
    fn test_encode_move_matches_scenario_6() {
        // numDirections=8, numSpeeds=5: direction=0 deg -> idx 4, speed=0 -> halt-equivalent index.
        let idx = encode_move(0.0, 0.0, 8, 5, 400.0);
        assert_eq!(idx, 20);
    }

    #[test]
    fn test_can_move_state_consistent_with_codec_module() {
        assert_eq!(can_move_state(true, true, false), 3);
    }
}
