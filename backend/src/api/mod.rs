pub mod games;
pub mod profile;
pub mod tournaments;
pub mod wallet;

pub use games::{router as games_router, GameAppState};
pub use profile::{router as profile_router, ProfileAppState};
pub use tournaments::{router as tournaments_router, TournamentAppState};
pub use wallet::{router as wallet_router, WalletAppState};
