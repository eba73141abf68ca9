//! Prize pool splitting and the outbound payout notification.
//!
//! Prizes are only recorded here. Settlement on chain happens elsewhere;
//! when a payout endpoint is configured it is told about each new row.

use crate::db::models::{PrizeDistribution, Tournament};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Split `pool` evenly across `recipients`; the first recipient receives any
/// indivisible remainder.
pub fn split_pool(pool: i64, recipients: usize) -> Vec<i64> {
    if recipients == 0 {
        return Vec::new();
    }
    let n = recipients as i64;
    let share = pool / n;
    let remainder = pool - share * n;

    (0..recipients)
        .map(|i| if i == 0 { share + remainder } else { share })
        .collect()
}

/// Pending prize rows for a resolved tournament. One winner takes the whole
/// pool; a tie splits it.
pub fn prize_rows(
    tournament: &Tournament,
    winners: &[String],
    distribution_type: &str,
    now: DateTime<Utc>,
) -> Vec<PrizeDistribution> {
    winners
        .iter()
        .zip(split_pool(tournament.prize_pool, winners.len()))
        .map(|(winner, amount)| {
            PrizeDistribution::pending(tournament, winner.clone(), amount, distribution_type, now)
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PayoutRequest<'a> {
    distribution_id: &'a str,
    tournament_id: &'a str,
    winner_address: &'a str,
    amount: i64,
    currency: &'a str,
    issuer: Option<&'a str>,
    distribution_type: &'a str,
}

/// Fire-and-forget notifier for the prize distribution endpoint.
#[derive(Clone)]
pub struct PayoutNotifier {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl PayoutNotifier {
    pub fn new(endpoint: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, endpoint }
    }

    /// Spawns one POST per prize row. Failures are logged and not retried.
    pub fn notify(&self, prizes: &[PrizeDistribution]) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };

        for prize in prizes.iter().cloned() {
            let http = self.http.clone();
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                let body = PayoutRequest {
                    distribution_id: &prize.id,
                    tournament_id: &prize.tournament_id,
                    winner_address: &prize.winner_address,
                    amount: prize.amount,
                    currency: &prize.currency,
                    issuer: prize.issuer.as_deref(),
                    distribution_type: &prize.distribution_type,
                };

                match http.post(&endpoint).json(&body).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        tracing::info!(
                            "Payout requested for {} ({} {})",
                            prize.winner_address,
                            prize.amount,
                            prize.currency
                        );
                    }
                    Ok(resp) => {
                        tracing::warn!(
                            "Payout endpoint returned {} for distribution {}",
                            resp.status(),
                            prize.id
                        );
                    }
                    Err(e) => {
                        tracing::warn!("Payout request for distribution {} failed: {}", prize.id, e);
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn winner_takes_all() {
        assert_eq!(split_pool(20_000_000, 1), vec![20_000_000]);
    }

    #[test]
    fn tie_split_keeps_every_drop() {
        let shares = split_pool(7, 2);
        assert_eq!(shares, vec![4, 3]);
        assert_eq!(shares.iter().sum::<i64>(), 7);
        assert!(split_pool(10, 0).is_empty());
    }

    #[test]
    fn rows_carry_tournament_currency() {
        let tournament = Tournament::new(
            2,
            5_000_000,
            "XAH".to_string(),
            None,
            Utc::now(),
            ChronoDuration::minutes(10),
        );
        let rows = prize_rows(
            &tournament,
            &["rA".to_string(), "rB".to_string()],
            "draw",
            Utc::now(),
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount + rows[1].amount, 10_000_000);
        assert!(rows.iter().all(|r| r.currency == "XAH" && r.status == "pending"));
    }
}
