use super::to_db_time;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Tournament Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TournamentStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tournament {
    pub id: String,
    pub tournament_size: i64,
    /// Micro-units of `currency` (drops for XAH).
    pub entry_fee: i64,
    pub currency: String,
    pub issuer: Option<String>,
    pub status: TournamentStatus,
    pub prize_pool: i64,
    pub winner: Option<String>,
    pub cancelled_reason: Option<String>,
    pub forfeit_reason: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl Tournament {
    pub fn new(
        tournament_size: i64,
        entry_fee: i64,
        currency: String,
        issuer: Option<String>,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tournament_size,
            entry_fee,
            currency,
            issuer,
            status: TournamentStatus::Waiting,
            prize_pool: entry_fee.saturating_mul(tournament_size),
            winner: None,
            cancelled_reason: None,
            forfeit_reason: None,
            created_at: to_db_time(now),
            expires_at: to_db_time(now + lifetime),
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PlayerStatus {
    Waiting,
    Joined,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TournamentPlayer {
    pub id: String,
    pub tournament_id: String,
    pub player_address: String,
    pub player_order: i64,
    pub status: PlayerStatus,
    pub is_winner: bool,
    pub forfeited: bool,
    pub joined_at: String,
}

// ============================================================================
// Game Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum GameStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl GameStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GameStatus::Completed | GameStatus::Cancelled)
    }
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ResultReason {
    Checkmate,
    Draw,
    Stalemate,
    Timeout,
    Resignation,
    Forfeit,
    FirstMoveTimeout,
    Abandoned,
}

impl ResultReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultReason::Checkmate => "checkmate",
            ResultReason::Draw => "draw",
            ResultReason::Stalemate => "stalemate",
            ResultReason::Timeout => "timeout",
            ResultReason::Resignation => "resignation",
            ResultReason::Forfeit => "forfeit",
            ResultReason::FirstMoveTimeout => "first_move_timeout",
            ResultReason::Abandoned => "abandoned",
        }
    }
}

/// Final result from the board's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum GameResult {
    White,
    Black,
    Tie,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Game {
    pub id: String,
    pub tournament_id: String,
    pub player_white: String,
    pub player_black: String,
    pub board_fen: String,
    /// JSON array of move strings in play order.
    pub moves: String,
    pub white_time_ms: i64,
    pub black_time_ms: i64,
    pub turn_started_at: String,
    pub first_move_made: bool,
    pub status: GameStatus,
    pub result_reason: Option<ResultReason>,
    pub result: Option<GameResult>,
    pub winner: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl Game {
    pub fn new(
        tournament_id: String,
        player_white: String,
        player_black: String,
        starting_fen: &str,
        clock_ms: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let now = to_db_time(now);
        Self {
            id: Uuid::new_v4().to_string(),
            tournament_id,
            player_white,
            player_black,
            board_fen: starting_fen.to_string(),
            moves: "[]".to_string(),
            white_time_ms: clock_ms,
            black_time_ms: clock_ms,
            turn_started_at: now.clone(),
            first_move_made: false,
            status: GameStatus::InProgress,
            result_reason: None,
            result: None,
            winner: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn move_list(&self) -> Vec<String> {
        serde_json::from_str(&self.moves).unwrap_or_default()
    }

    pub fn is_player(&self, address: &str) -> bool {
        self.player_white == address || self.player_black == address
    }

    pub fn opponent_of(&self, address: &str) -> Option<&str> {
        if self.player_white == address {
            Some(&self.player_black)
        } else if self.player_black == address {
            Some(&self.player_white)
        } else {
            None
        }
    }
}

// ============================================================================
// Prize Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PrizeDistribution {
    pub id: String,
    pub tournament_id: String,
    pub winner_address: String,
    pub amount: i64,
    pub currency: String,
    pub issuer: Option<String>,
    pub status: String,
    pub distribution_type: String,
    pub created_at: String,
}

impl PrizeDistribution {
    pub fn pending(
        tournament: &Tournament,
        winner_address: String,
        amount: i64,
        distribution_type: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tournament_id: tournament.id.clone(),
            winner_address,
            amount,
            currency: tournament.currency.clone(),
            issuer: tournament.issuer.clone(),
            status: "pending".to_string(),
            distribution_type: distribution_type.to_string(),
            created_at: to_db_time(now),
        }
    }
}

// ============================================================================
// Player Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlayerProfile {
    pub wallet_address: String,
    pub bot_elo: i64,
    pub multiplayer_elo: i64,
    pub bot_wins: i64,
    pub bot_losses: i64,
    pub bot_draws: i64,
    pub multiplayer_wins: i64,
    pub multiplayer_losses: i64,
    pub multiplayer_draws: i64,
    pub total_games: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlayerSettings {
    pub wallet_address: String,
    pub confirm_moves: bool,
    pub highlight_legal_moves: bool,
    pub auto_queen_promotion: bool,
    pub created_at: String,
    pub updated_at: String,
}
