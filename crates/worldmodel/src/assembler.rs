//! World model assembler (C6): folds one incoming status into an immutable
//! `WorldModel` snapshot by chaining the scanner map, polar projection, grid
//! map and marker retention together.

use std::collections::HashMap;

use types::{Complex, ProxySample, RobotStatus, Timestamp};

use crate::grid::GridMap;
use crate::polar::PolarMap;
use crate::scanner::ScannerMap;

#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub grid_size: f64,
    pub safe_distance: f64,
    pub grid_width: usize,
    pub grid_height: usize,
    pub num_radar_sectors: usize,
    pub min_radar_distance: f64,
    pub max_radar_distance: f64,
    /// How long a marker observation is retained with no refresh, in ms.
    pub marker_hold: Timestamp,
    pub insert_contact_obstacles: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            grid_size: 0.2,
            safe_distance: 0.3,
            grid_width: 25,
            grid_height: 25,
            num_radar_sectors: 25,
            min_radar_distance: 0.3,
            max_radar_distance: 3.0,
            marker_hold: 30_000,
            insert_contact_obstacles: false,
        }
    }
}

/// An immutable frame of the world, frozen once per inference cycle.
#[derive(Debug, Clone)]
pub struct WorldModel {
    pub status: RobotStatus,
    pub scanner_map: ScannerMap,
    pub polar_map: PolarMap,
    pub grid_map: GridMap,
    /// label -> (world location, last-seen timestamp).
    pub markers: HashMap<String, ((f64, f64), Timestamp)>,
    /// Reference heading the grid map and polar projection were built
    /// against (the robot's absolute heading at assembly time).
    pub direction: Complex,
}

/// Owns the running scanner map and marker set across cycles; `assemble`
/// is the single entry point the control loop calls per status.
pub struct WorldModelAssembler {
    config: AssemblerConfig,
    scanner_map: ScannerMap,
    markers: HashMap<String, ((f64, f64), Timestamp)>,
}

impl WorldModelAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        let scanner_map = ScannerMap::new(config.grid_size, config.safe_distance);
        Self {
            config,
            scanner_map,
            markers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// `sample` is the status's proxy reading, if the vehicle reported an
    /// echo distance this cycle. `marker_observations` are freshly seen
    /// (label, location) pairs from whatever marker source is wired in;
    /// pass an empty slice when none are available this cycle.
    pub fn assemble(
        &mut self,
        status: RobotStatus,
        sample: Option<ProxySample>,
        marker_observations: &[(String, (f64, f64))],
    ) -> WorldModel {
        if let Some(sample) = sample {
            self.scanner_map = self.scanner_map.process(
                sample,
                &status,
                self.config.insert_contact_obstacles,
            );
        }

        let polar_map = PolarMap::update(
            &self.scanner_map,
            status.location,
            status.direction,
            self.config.min_radar_distance,
            self.config.max_radar_distance,
            self.config.num_radar_sectors,
        );

        let grid_map = GridMap::build(
            &self.scanner_map,
            &status,
            self.config.grid_width,
            self.config.grid_height,
            self.config.grid_size,
            self.config.max_radar_distance,
        );

        for (label, location) in marker_observations {
            self.markers
                .insert(label.clone(), (*location, status.timestamp));
        }
        self.markers
            .retain(|_, (_, ts)| status.timestamp - *ts <= self.config.marker_hold);

        let direction = status.direction;
        WorldModel {
            status,
            scanner_map: self.scanner_map.clone(),
            polar_map,
            grid_map,
            markers: self.markers.clone(),
            direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Contacts;

    fn status_at_origin(ts: Timestamp, echo: f64) -> RobotStatus {
        RobotStatus {
            location: (0.0, 0.0),
            direction: Complex::ZERO_DEG,
            sensor_direction: Complex::ZERO_DEG,
            echo_distance: echo,
            can_move_forward: true,
            can_move_backward: true,
            front_sensor: false,
            contacts: Contacts::empty(),
            timestamp: ts,
        }
    }

    fn sample_for(status: &RobotStatus) -> ProxySample {
        ProxySample {
            timestamp: status.timestamp,
            sensor_dir: status.head_abs_direction(),
            distance: status.echo_distance,
            sample_location: None,
        }
    }

    #[test]
    fn test_assemble_polar_map_sector_count_matches_config() {
        let mut assembler = WorldModelAssembler::new(AssemblerConfig::default());
        let status = status_at_origin(0, 0.0);
        let sample = sample_for(&status);
        let world = assembler.assemble(status, Some(sample), &[]);
        assert_eq!(world.polar_map.num_sectors(), 25);
    }

    #[test]
    fn test_assemble_echo_inserts_obstacle_and_marks_grid_contact() {
        let mut assembler = WorldModelAssembler::new(AssemblerConfig {
            grid_size: 0.2,
            ..AssemblerConfig::default()
        });
        let status = status_at_origin(0, 1.0);
        let sample = sample_for(&status);
        let world = assembler.assemble(status, Some(sample), &[]);
        assert_eq!(world.scanner_map.len(), 1);
    }

    #[test]
    fn test_marker_retained_until_hold_expires() {
        let mut assembler = WorldModelAssembler::new(AssemblerConfig {
            marker_hold: 1_000,
            ..AssemblerConfig::default()
        });
        let status0 = status_at_origin(0, 0.0);
        let sample0 = sample_for(&status0);
        let world0 = assembler.assemble(status0, Some(sample0), &[("charger".into(), (2.0, 0.0))]);
        assert!(world0.markers.contains_key("charger"));

        let status1 = status_at_origin(2_000, 0.0);
        let sample1 = sample_for(&status1);
        let world1 = assembler.assemble(status1, Some(sample1), &[]);
        assert!(!world1.markers.contains_key("charger"));
    }

    #[test]
    fn test_marker_refresh_extends_retention() {
        let mut assembler = WorldModelAssembler::new(AssemblerConfig {
            marker_hold: 1_000,
            ..AssemblerConfig::default()
        });
        let status0 = status_at_origin(0, 0.0);
        let sample0 = sample_for(&status0);
        assembler.assemble(status0, Some(sample0), &[("charger".into(), (2.0, 0.0))]);

        let status1 = status_at_origin(900, 0.0);
        let sample1 = sample_for(&status1);
        assembler.assemble(status1, Some(sample1), &[("charger".into(), (2.1, 0.0))]);

        let status2 = status_at_origin(1_800, 0.0);
        let sample2 = sample_for(&status2);
        let world2 = assembler.assemble(status2, Some(sample2), &[]);
        assert!(world2.markers.contains_key("charger"));
    }
}
