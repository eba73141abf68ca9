//! Chess clock and board constants

/// Time each side starts with (20 minutes)
pub const INITIAL_CLOCK_MS: i64 = 1_200_000;

/// White must make the first move within this window or the game is voided
pub const FIRST_MOVE_WINDOW_MS: i64 = 120_000;

/// Standard starting position
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Longest move string accepted from a client (SAN or UCI, with annotations)
pub const MAX_MOVE_LEN: usize = 16;

/// How often the server sweeps in-progress games for fallen flags (seconds)
pub const CLOCK_SWEEP_INTERVAL_SECS: u64 = 5;
