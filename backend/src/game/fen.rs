//! Minimal FEN reader.
//!
//! Moves are validated by the clients; the server only needs to know the
//! position is well formed, whose turn it is, and what material is left.

use super::{error::GameError, material::MaterialCount};
use crate::db::models::GameResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_result(self) -> GameResult {
        match self {
            Side::White => GameResult::White,
            Side::Black => GameResult::Black,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenSummary {
    pub side_to_move: Side,
    pub material: MaterialCount,
}

pub fn parse(fen: &str) -> Result<FenSummary, GameError> {
    let invalid = |reason: &str| GameError::InvalidFen {
        reason: reason.to_string(),
    };

    let mut fields = fen.split_whitespace();
    let placement = fields.next().ok_or_else(|| invalid("empty position"))?;
    let side_to_move = match fields.next() {
        Some("w") => Side::White,
        Some("b") => Side::Black,
        Some(_) => return Err(invalid("side to move must be 'w' or 'b'")),
        None => return Err(invalid("missing side to move")),
    };
    // Castling, en passant and counters are optional and unchecked.
    if fields.count() > 4 {
        return Err(invalid("too many fields"));
    }

    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(invalid("expected 8 ranks"));
    }

    let mut white_kings = 0;
    let mut black_kings = 0;
    for rank in &ranks {
        let mut files = 0u32;
        for c in rank.chars() {
            if let Some(empty) = c.to_digit(10) {
                if empty == 0 || empty > 8 {
                    return Err(invalid("bad empty-square count"));
                }
                files += empty;
            } else if "pnbrqkPNBRQK".contains(c) {
                match c {
                    'K' => white_kings += 1,
                    'k' => black_kings += 1,
                    _ => {}
                }
                files += 1;
            } else {
                return Err(invalid("unknown piece"));
            }
        }
        if files != 8 {
            return Err(invalid("rank does not cover 8 files"));
        }
    }

    if white_kings != 1 || black_kings != 1 {
        return Err(invalid("each side needs exactly one king"));
    }

    Ok(FenSummary {
        side_to_move,
        material: MaterialCount::from_placement(placement),
    })
}
