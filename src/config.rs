use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::snake::{Bound, Direction, Position};
use crate::GridInt;

/// Milliseconds per second; the tick interval is this divided by the velocity.
pub const TICK_BASE_RATE: u32 = 1000;
/// Time between `start()` and the engine actually running.
pub const START_DELAY: Duration = Duration::from_millis(500);

pub const DEFAULT_BOARD_SIZE: u32 = 400;
pub const DEFAULT_CELL_SIZE: u32 = 10;
pub const DEFAULT_VELOCITY: u32 = 20;

/// Construction options for a game. Board dimensions are in pixels (or any
/// unit shared with `cell_size`); everything else is in grid cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameOptions {
    pub board_width: u32,
    pub board_height: u32,
    pub cell_size: u32,
    /// Defaults to the centre of the grid.
    pub initial_position: Option<Position>,
    pub initial_direction: Direction,
    /// Cells per second.
    pub velocity: u32,
    /// Seeds the apple placement; random when absent.
    pub seed: Option<u64>,
}

impl Default for GameOptions {
    fn default() -> Self {
        GameOptions {
            board_width: DEFAULT_BOARD_SIZE,
            board_height: DEFAULT_BOARD_SIZE,
            cell_size: DEFAULT_CELL_SIZE,
            initial_position: None,
            initial_direction: Direction::Down,
            velocity: DEFAULT_VELOCITY,
            seed: None,
        }
    }
}

/// Options after validation, in the shape the engine consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSettings {
    pub bound: Bound,
    pub initial_position: Position,
    pub initial_direction: Direction,
    pub tick_interval: Duration,
    pub seed: Option<u64>,
}

impl GameOptions {
    pub fn validate(&self) -> Result<GridSettings, ConfigError> {
        if self.velocity == 0 {
            return Err(ConfigError::ZeroVelocity);
        }
        if self.velocity >= TICK_BASE_RATE {
            return Err(ConfigError::VelocityTooHigh { velocity: self.velocity, base_rate: TICK_BASE_RATE });
        }
        if self.cell_size == 0 {
            return Err(ConfigError::ZeroCellSize);
        }

        let cols = self.board_width / self.cell_size;
        let rows = self.board_height / self.cell_size;
        if cols == 0 || rows == 0 {
            return Err(ConfigError::BoardTooSmall {
                width: self.board_width,
                height: self.board_height,
                cell_size: self.cell_size,
            });
        }

        let bound = match (GridInt::try_from(rows), GridInt::try_from(cols)) {
            (Ok(rows), Ok(cols)) => Bound::new(rows, cols),
            _ => return Err(ConfigError::BoardTooLarge { rows, cols }),
        };

        let initial_position = self.initial_position.unwrap_or_else(|| bound.center());
        if !bound.contains(initial_position) {
            return Err(ConfigError::PositionOutOfBounds { position: initial_position, bound });
        }

        Ok(GridSettings {
            bound,
            initial_position,
            initial_direction: self.initial_direction,
            tick_interval: Duration::from_millis(u64::from(TICK_BASE_RATE / self.velocity)),
            seed: self.seed,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroVelocity,
    VelocityTooHigh { velocity: u32, base_rate: u32 },
    ZeroCellSize,
    BoardTooSmall { width: u32, height: u32, cell_size: u32 },
    BoardTooLarge { rows: u32, cols: u32 },
    PositionOutOfBounds { position: Position, bound: Bound },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroVelocity => write!(f, "velocity must be greater than zero"),
            ConfigError::VelocityTooHigh { velocity, base_rate } => {
                write!(f, "velocity {} must be less than the tick base rate {}", velocity, base_rate)
            }
            ConfigError::ZeroCellSize => write!(f, "cell size must be greater than zero"),
            ConfigError::BoardTooSmall { width, height, cell_size } => {
                write!(f, "board {}x{} holds no cells of size {}", width, height, cell_size)
            }
            ConfigError::BoardTooLarge { rows, cols } => write!(f, "board of {}x{} cells is too large", cols, rows),
            ConfigError::PositionOutOfBounds { position, bound } => {
                write!(f, "initial position {} lies outside the grid {}", position, bound)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
