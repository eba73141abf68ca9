//! Rule violations raised while handling a game request

use crate::error::AppError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum GameError {
    GameNotFound,
    NotAParticipant,
    NotYourTurn,
    GameNotInProgress,
    InvalidFen { reason: String },
    InvalidMove { reason: String },
    /// The submitted position does not hand the move to the opponent.
    TurnDidNotPass,
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::GameNotFound => write!(f, "Game not found"),
            GameError::NotAParticipant => write!(f, "You are not playing in this game"),
            GameError::NotYourTurn => write!(f, "Not your turn"),
            GameError::GameNotInProgress => write!(f, "Game is not in progress"),
            GameError::InvalidFen { reason } => write!(f, "Invalid position: {}", reason),
            GameError::InvalidMove { reason } => write!(f, "Invalid move: {}", reason),
            GameError::TurnDidNotPass => {
                write!(f, "Submitted position must give the move to the opponent")
            }
        }
    }
}

impl std::error::Error for GameError {}

impl From<GameError> for AppError {
    fn from(err: GameError) -> Self {
        let message = err.to_string();
        match err {
            GameError::GameNotFound => AppError::NotFound(message),
            GameError::NotAParticipant => AppError::Forbidden(message),
            GameError::NotYourTurn | GameError::GameNotInProgress => AppError::Conflict(message),
            GameError::InvalidFen { .. }
            | GameError::InvalidMove { .. }
            | GameError::TurnDidNotPass => AppError::Validation(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn maps_to_http_statuses() {
        assert_eq!(
            AppError::from(GameError::NotAParticipant).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(GameError::NotYourTurn).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(GameError::InvalidFen {
                reason: "x".to_string()
            })
            .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn display() {
        assert_eq!(GameError::NotYourTurn.to_string(), "Not your turn");
    }
}
