pub mod feed;
pub mod handler;
pub mod messages;
pub mod rate_limit;

pub use feed::{ChangeEvent, ChangeFeed, FeedTable, RowChange};
pub use handler::{ws_handler, RealtimeState};
