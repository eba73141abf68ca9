pub mod context;
pub mod expiry;
pub mod lifecycle;
pub mod manager;
pub mod matchmaking;
pub mod prizes;

pub use context::{GameOutcome, Settlement};
pub use expiry::ExpiryReport;
pub use lifecycle::ForfeitResponse;
pub use manager::TournamentManager;
pub use matchmaking::{JoinOutcome, JoinRequest, JoinResponse};
pub use prizes::PayoutNotifier;
