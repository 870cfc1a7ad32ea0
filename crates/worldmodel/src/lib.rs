//! Scanner map, polar projection, grid map and the world model assembler
//! that chains them into one immutable snapshot per inference cycle.

pub mod assembler;
pub mod fuzzy;
pub mod grid;
pub mod polar;
pub mod scanner;

pub use assembler::{AssemblerConfig, WorldModel, WorldModelAssembler};
pub use grid::{GridMap, MapCell};
pub use polar::{CircularSector, PolarMap};
pub use scanner::ScannerMap;
