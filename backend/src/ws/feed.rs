//! In-process row change feed.
//!
//! Every write that clients watch (tournament status, player list, game
//! state) publishes the fresh row here. WebSocket connections filter the
//! stream by table and row id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedTable {
    Tournaments,
    TournamentPlayers,
    TournamentGames,
    PlayerProfiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowChange {
    pub table: FeedTable,
    pub row_id: String,
    /// Owning tournament, so a waiting room can follow its player list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    pub event: ChangeEvent,
    pub row: Value,
}

impl RowChange {
    /// `filter` matches the row itself or, for child rows, their tournament.
    pub fn matches(&self, table: FeedTable, filter: Option<&str>) -> bool {
        if self.table != table {
            return false;
        }
        match filter {
            None => true,
            Some(id) => self.row_id == id || self.tournament_id.as_deref() == Some(id),
        }
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<RowChange>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.sender.subscribe()
    }

    pub fn publish(&self, change: RowChange) {
        // An error only means nobody is listening.
        if self.sender.send(change).is_err() {
            tracing::trace!("change feed has no subscribers");
        }
    }

    pub fn publish_row<T: Serialize>(
        &self,
        table: FeedTable,
        event: ChangeEvent,
        row_id: &str,
        tournament_id: Option<&str>,
        row: &T,
    ) {
        let row = match serde_json::to_value(row) {
            Ok(row) => row,
            Err(e) => {
                tracing::error!("Failed to serialize {:?} row {}: {}", table, row_id, e);
                return;
            }
        };

        self.publish(RowChange {
            table,
            row_id: row_id.to_string(),
            tournament_id: tournament_id.map(str::to_string),
            event,
            row,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_rows() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();

        feed.publish_row(
            FeedTable::TournamentPlayers,
            ChangeEvent::Insert,
            "player-1",
            Some("tournament-1"),
            &json!({ "player_address": "rAlice" }),
        );

        let change = rx.recv().await.unwrap();
        assert!(change.matches(FeedTable::TournamentPlayers, Some("tournament-1")));
        assert!(change.matches(FeedTable::TournamentPlayers, Some("player-1")));
        assert!(change.matches(FeedTable::TournamentPlayers, None));
        assert!(!change.matches(FeedTable::TournamentPlayers, Some("other")));
        assert!(!change.matches(FeedTable::Tournaments, None));
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        ChangeFeed::new().publish_row(
            FeedTable::Tournaments,
            ChangeEvent::Update,
            "t",
            None,
            &json!({}),
        );
    }
}
