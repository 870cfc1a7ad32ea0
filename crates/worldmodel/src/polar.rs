//! Polar projection of a scanner map into a fixed ring of angular sectors.

use std::f64::consts::PI;

use types::{normalize_rad, Complex, Timestamp};

use crate::scanner::ScannerMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircularSector {
    Unknown,
    Empty,
    Hindered { distance: f64, timestamp: Timestamp },
}

impl CircularSector {
    pub fn is_known(&self) -> bool {
        !matches!(self, CircularSector::Unknown)
    }

    pub fn distance(&self) -> Option<f64> {
        match self {
            CircularSector::Hindered { distance, .. } => Some(*distance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolarMap {
    pub sectors: Vec<CircularSector>,
}

impl PolarMap {
    pub fn num_sectors(&self) -> usize {
        self.sectors.len()
    }

    /// Project `radar_map`'s obstacles into `num_sectors` equal wedges
    /// centred on `centre`, relative to `direction`. Only obstacles within
    /// `(min_distance, max_distance)` are considered; a sector stays
    /// `Unknown` unless some obstacle's angular span overlaps it.
    pub fn update(
        radar_map: &ScannerMap,
        centre: (f64, f64),
        direction: Complex,
        min_distance: f64,
        max_distance: f64,
        num_sectors: usize,
    ) -> PolarMap {
        let width = 2.0 * PI / num_sectors as f64;
        let mut sectors = vec![CircularSector::Unknown; num_sectors];

        for obstacle in &radar_map.obstacles {
            let distance = euclidean(centre, obstacle.location);
            if distance <= min_distance || distance > max_distance {
                continue;
            }
            let gamma = (radar_map.grid_size / distance).atan();
            let cell_dir =
                normalize_rad(Complex::direction(centre, obstacle.location).sub(direction).to_rad());

            for (i, sector) in sectors.iter_mut().enumerate() {
                let sector_center = -PI + (i as f64 + 0.5) * width;
                let circular_diff = normalize_rad(sector_center - cell_dir).abs();
                if circular_diff > width / 2.0 + gamma {
                    continue;
                }
                let candidate = CircularSector::Hindered {
                    distance,
                    timestamp: obstacle.timestamp,
                };
                *sector = match *sector {
                    CircularSector::Unknown => candidate,
                    CircularSector::Empty => candidate,
                    CircularSector::Hindered { distance: d, timestamp: t } => {
                        if distance < d || (distance == d && obstacle.timestamp > t) {
                            candidate
                        } else {
                            *sector
                        }
                    }
                };
            }
        }

        PolarMap { sectors }
    }
}

fn euclidean(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Obstacle;

    fn obstacle(x: f64, y: f64) -> Obstacle {
        Obstacle {
            location: (x, y),
            timestamp: 0,
            likelihood: 1.0,
        }
    }

    #[test]
    fn test_cardinal_obstacles_hinder_four_aligned_sectors() {
        let mut map = ScannerMap::new(0.1, 0.3);
        map.obstacles = vec![
            obstacle(1.0, 0.0),  // E
            obstacle(0.0, 1.0),  // N
            obstacle(-1.0, 0.0), // W
            obstacle(0.0, -1.0), // S
        ];
        let polar = PolarMap::update(&map, (0.0, 0.0), Complex::ZERO_DEG, 0.0, 3.0, 4);
        assert_eq!(polar.num_sectors(), 4);
        for sector in &polar.sectors {
            assert!(sector.is_known());
            assert!((sector.distance().unwrap() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_out_of_range_obstacle_leaves_sector_unknown() {
        let mut map = ScannerMap::new(0.1, 0.3);
        map.obstacles = vec![obstacle(10.0, 0.0)];
        let polar = PolarMap::update(&map, (0.0, 0.0), Complex::ZERO_DEG, 0.0, 3.0, 8);
        assert!(polar.sectors.iter().all(|s| !s.is_known()));
    }

    #[test]
    fn test_sector_count_matches_configuration() {
        let map = ScannerMap::new(0.1, 0.3);
        let polar = PolarMap::update(&map, (0.0, 0.0), Complex::ZERO_DEG, 0.0, 3.0, 25);
        assert_eq!(polar.num_sectors(), 25);
    }

    #[test]
    fn test_closer_obstacle_wins_tie_break() {
        let mut map = ScannerMap::new(0.1, 0.3);
        map.obstacles = vec![obstacle(1.5, 0.0), obstacle(1.0, 0.0)];
        let polar = PolarMap::update(&map, (0.0, 0.0), Complex::ZERO_DEG, 0.0, 3.0, 4);
        let hit = polar.sectors.iter().find(|s| s.is_known()).unwrap();
        assert!((hit.distance().unwrap() - 1.0).abs() < 1e-6);
    }
}
