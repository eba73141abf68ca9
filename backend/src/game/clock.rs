//! Chess clock arithmetic over a stored game row.
//!
//! Only the side to move has a running clock. Its remaining time is the
//! stored value minus the time elapsed since `turn_started_at`. Before
//! white's first move nothing runs; white instead has a fixed window
//! measured from the game start.

use super::{
    constants::FIRST_MOVE_WINDOW_MS,
    fen::{self, Side},
};
use crate::db::{models::Game, parse_db_time};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStatus {
    Running,
    /// White never moved inside the first-move window.
    FirstMoveExpired,
    /// The side to move ran out of time.
    Flagged(Side),
}

/// Live view of both clocks at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSnapshot {
    pub white_ms: i64,
    pub black_ms: i64,
    #[serde(skip)]
    pub side_to_move: Side,
    pub first_move_deadline_ms: Option<i64>,
}

pub fn side_to_move(game: &Game) -> Side {
    fen::parse(&game.board_fen)
        .map(|summary| summary.side_to_move)
        .unwrap_or(Side::White)
}

fn elapsed_ms(game: &Game, now: DateTime<Utc>) -> i64 {
    let started = parse_db_time(&game.turn_started_at).unwrap_or(now);
    (now - started).num_milliseconds().max(0)
}

pub fn snapshot(game: &Game, now: DateTime<Utc>) -> ClockSnapshot {
    let side = side_to_move(game);
    let elapsed = elapsed_ms(game, now);

    if !game.first_move_made {
        return ClockSnapshot {
            white_ms: game.white_time_ms,
            black_ms: game.black_time_ms,
            side_to_move: side,
            first_move_deadline_ms: Some((FIRST_MOVE_WINDOW_MS - elapsed).max(0)),
        };
    }

    let (white_ms, black_ms) = match side {
        Side::White => ((game.white_time_ms - elapsed).max(0), game.black_time_ms),
        Side::Black => (game.white_time_ms, (game.black_time_ms - elapsed).max(0)),
    };

    ClockSnapshot {
        white_ms,
        black_ms,
        side_to_move: side,
        first_move_deadline_ms: None,
    }
}

pub fn status(game: &Game, now: DateTime<Utc>) -> ClockStatus {
    let clocks = snapshot(game, now);

    if let Some(deadline) = clocks.first_move_deadline_ms {
        return if deadline <= 0 {
            ClockStatus::FirstMoveExpired
        } else {
            ClockStatus::Running
        };
    }

    let remaining = match clocks.side_to_move {
        Side::White => clocks.white_ms,
        Side::Black => clocks.black_ms,
    };
    if remaining <= 0 {
        ClockStatus::Flagged(clocks.side_to_move)
    } else {
        ClockStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::to_db_time,
        game::constants::{INITIAL_CLOCK_MS, STARTING_FEN},
    };
    use chrono::Duration;

    fn game_at(start: DateTime<Utc>) -> Game {
        Game::new(
            "t".to_string(),
            "rWhite".to_string(),
            "rBlack".to_string(),
            STARTING_FEN,
            INITIAL_CLOCK_MS,
            start,
        )
    }

    #[test]
    fn clock_is_frozen_before_first_move() {
        let start = Utc::now();
        let game = game_at(start);
        let clocks = snapshot(&game, start + Duration::seconds(90));
        assert_eq!(clocks.white_ms, INITIAL_CLOCK_MS);
        assert_eq!(clocks.first_move_deadline_ms, Some(30_000));
        assert_eq!(status(&game, start + Duration::seconds(90)), ClockStatus::Running);
        assert_eq!(
            status(&game, start + Duration::seconds(121)),
            ClockStatus::FirstMoveExpired
        );
    }

    #[test]
    fn side_to_move_is_charged() {
        let start = Utc::now();
        let mut game = game_at(start);
        game.first_move_made = true;
        game.board_fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".to_string();
        game.turn_started_at = to_db_time(start);

        let clocks = snapshot(&game, start + Duration::seconds(10));
        assert_eq!(clocks.white_ms, INITIAL_CLOCK_MS);
        assert_eq!(clocks.black_ms, INITIAL_CLOCK_MS - 10_000);
    }

    #[test]
    fn zero_remaining_flags_the_side_to_move() {
        let start = Utc::now();
        let mut game = game_at(start);
        game.first_move_made = true;
        game.white_time_ms = 5_000;

        assert_eq!(status(&game, start + Duration::seconds(4)), ClockStatus::Running);
        assert_eq!(
            status(&game, start + Duration::seconds(5)),
            ClockStatus::Flagged(Side::White)
        );
    }
}
