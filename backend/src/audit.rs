//! Structured audit logging for money- and security-relevant events.
//!
//! Everything here is emitted on the `audit` target so it can be routed
//! separately from the regular request logs.

/// Log a tournament state change (created, joined, started, expired, ...)
pub fn log_tournament_event(tournament_id: &str, event: &str, details: &str) {
    tracing::info!(
        target: "audit",
        event = "tournament",
        tournament_id = tournament_id,
        tournament_event = event,
        details = details,
        "Tournament {}: {} - {}",
        tournament_id,
        event,
        details
    );
}

/// Log a terminal game result
pub fn log_game_result(game_id: &str, reason: &str, winner: Option<&str>) {
    tracing::info!(
        target: "audit",
        event = "game_result",
        game_id = game_id,
        reason = reason,
        winner = winner.unwrap_or("none"),
        "Game {} finished ({}), winner: {}",
        game_id,
        reason,
        winner.unwrap_or("none")
    );
}

/// Log a prize distribution record
pub fn log_prize(tournament_id: &str, winner: &str, amount: i64, currency: &str) {
    tracing::info!(
        target: "audit",
        event = "prize",
        tournament_id = tournament_id,
        winner = winner,
        amount = amount,
        currency = currency,
        "Prize {} {} owed to {} for tournament {}",
        amount,
        currency,
        winner,
        tournament_id
    );
}

/// Log a wallet provider request (payment or sign-in payload)
pub fn log_payload_created(kind: &str, uuid: &str) {
    tracing::info!(
        target: "audit",
        event = "payload",
        kind = kind,
        uuid = uuid,
        "Created {} payload {}",
        kind,
        uuid
    );
}

/// Log a sign-in attempt
pub fn log_auth_event(address: &str, event: &str, success: bool) {
    if success {
        tracing::info!(
            target: "audit",
            event = "auth",
            address = address,
            auth_event = event,
            success = success,
            "Auth: {} - {} (success={})",
            event,
            address,
            success
        );
    } else {
        tracing::warn!(
            target: "audit",
            event = "auth",
            address = address,
            auth_event = event,
            success = success,
            "Auth: {} - {} (success={})",
            event,
            address,
            success
        );
    }
}

/// Log a security event (wallet mismatch, unauthorized cron call, ...)
pub fn log_security_event(address: &str, event: &str, details: &str) {
    tracing::warn!(
        target: "audit",
        event = "security",
        address = address,
        security_event = event,
        details = details,
        "Security: {} - {} - {}",
        event,
        address,
        details
    );
}
