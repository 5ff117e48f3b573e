//! Source location tracking for the Basalt compiler

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in source code, 1-based in both dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn start() -> Self {
        Self::new(1, 1)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A span of source code from a start to an end position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A span covering a single position.
    pub fn single(pos: Position) -> Self {
        Self::new(pos, pos)
    }

    /// Extend this span to end at `end`.
    pub fn to(self, end: Position) -> Span {
        Span::new(self.start, end)
    }

    /// The union of this span and `other`.
    pub fn combine(self, other: Span) -> Span {
        let start = if (self.start.line, self.start.column)
            <= (other.start.line, other.start.column)
        {
            self.start
        } else {
            other.start
        };

        let end = if (self.end.line, self.end.column) >= (other.end.line, other.end.column) {
            self.end
        } else {
            other.end
        };

        Span::new(start, end)
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::single(Position::start())
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line && self.start.column == self.end.column {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn combine_picks_outer_bounds() {
        let a = Span::new(Position::new(1, 4), Position::new(1, 9));
        let b = Span::new(Position::new(1, 7), Position::new(2, 2));
        let merged = a.combine(b);
        assert_eq!(merged.start, Position::new(1, 4));
        assert_eq!(merged.end, Position::new(2, 2));
    }

    #[test]
    fn display_collapses_single_position() {
        assert_eq!(Span::single(Position::new(3, 5)).to_string(), "3:5");
    }
}
