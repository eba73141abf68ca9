use super::feed::{FeedTable, RowChange};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    Subscribe {
        table: FeedTable,
        row_id: Option<String>,
    },
    Unsubscribe {
        table: FeedTable,
        row_id: Option<String>,
    },
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    Connected {
        wallet_address: String,
    },
    Subscribed {
        table: FeedTable,
        row_id: Option<String>,
    },
    Unsubscribed {
        table: FeedTable,
        row_id: Option<String>,
    },
    Change(RowChange),
    Error {
        message: String,
    },
    Pong,
}

/// One filter registered by a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub table: FeedTable,
    pub row_id: Option<String>,
}

impl Subscription {
    pub fn wants(&self, change: &RowChange) -> bool {
        change.matches(self.table, self.row_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_type_and_payload() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"Subscribe","payload":{"table":"tournament_games","row_id":"g1"}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Subscribe { table, row_id } => {
                assert_eq!(table, FeedTable::TournamentGames);
                assert_eq!(row_id.as_deref(), Some("g1"));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let ping: ClientMessage = serde_json::from_str(r#"{"type":"Ping"}"#).unwrap();
        assert!(matches!(ping, ClientMessage::Ping));
    }
}
