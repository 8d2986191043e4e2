use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::GridInt;
use Direction::*;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "top")]
    Up,
    #[serde(alias = "bottom")]
    Down,
    Left,
    Right,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Up, Down, Left, Right];

    pub fn axis(self) -> Axis {
        match self {
            Up | Down => Axis::Vertical,
            Left | Right => Axis::Horizontal,
        }
    }

    /// A turn is only allowed onto the other axis, so the snake can never
    /// reverse into itself or "turn" onto the line it is already on.
    pub fn is_orthogonal(self, other: Direction) -> bool {
        self.axis() != other.axis()
    }

    /// (row, col) step for one move.
    pub fn delta(self) -> (GridInt, GridInt) {
        match self {
            Up => (-1, 0),
            Down => (1, 0),
            Left => (0, -1),
            Right => (0, 1),
        }
    }

    pub fn head_char(self) -> char {
        match self {
            Up => '^',
            Down => 'v',
            Left => '<',
            Right => '>',
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Up => "up",
            Down => "down",
            Left => "left",
            Right => "right",
        };
        f.write_str(name)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" | "top" => Ok(Up),
            "down" | "bottom" => Ok(Down),
            "left" => Ok(Left),
            "right" => Ok(Right),
            other => Err(format!("unknown direction '{}', expected up, down, left or right", other)),
        }
    }
}

/// A grid cell, in cell units rather than pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: GridInt,
    pub col: GridInt,
}

impl Position {
    pub fn new(row: GridInt, col: GridInt) -> Self {
        Position { row, col }
    }

    pub fn moved(self, direction: Direction) -> Self {
        let (d_row, d_col) = direction.delta();
        Position { row: self.row + d_row, col: self.col + d_col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{row: {}, col: {}}}", self.row, self.col)
    }
}

/// Traversal limits of the board. `top` and `left` are inclusive,
/// `bottom` and `right` exclusive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    pub top: GridInt,
    pub right: GridInt,
    pub bottom: GridInt,
    pub left: GridInt,
}

impl Bound {
    pub fn new(rows: GridInt, cols: GridInt) -> Self {
        Bound { top: 0, right: cols, bottom: rows, left: 0 }
    }

    pub fn rows(&self) -> GridInt {
        self.bottom - self.top
    }

    pub fn cols(&self) -> GridInt {
        self.right - self.left
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.top <= pos.row && pos.row < self.bottom && self.left <= pos.col && pos.col < self.right
    }

    /// True when one more step in `direction` from `pos` would leave the grid.
    pub fn is_at_edge(&self, pos: Position, direction: Direction) -> bool {
        match direction {
            Up => pos.row <= self.top,
            Down => pos.row >= self.bottom - 1,
            Left => pos.col <= self.left,
            Right => pos.col >= self.right - 1,
        }
    }

    pub fn center(&self) -> Position {
        Position::new(self.top + self.rows() / 2, self.left + self.cols() / 2)
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{top: {}, right: {}, bottom: {}, left: {}}}",
            self.top, self.right, self.bottom, self.left
        )
    }
}
