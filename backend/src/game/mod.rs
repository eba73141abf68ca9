pub mod clock;
pub mod constants;
pub mod error;
pub mod fen;
pub mod material;
pub mod service;

pub use error::GameError;
pub use fen::Side;
pub use service::{ClientOutcome, GameService, GameView, MoveRequest, MoveResponse};
