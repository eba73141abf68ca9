//! Xaman payload bodies and the parts of provider responses we consume.

use super::XahauNetwork;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DROPS_PER_XAH: f64 = 1_000_000.0;
pub const NATIVE_CURRENCY: &str = "XAH";

/// Provider-side payload expiry, in minutes.
const PAYMENT_EXPIRE_MINUTES: u32 = 300;
const SIGNIN_EXPIRE_MINUTES: u32 = 5;
const MEMO_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: f64,
    pub currency: String,
    pub issuer: Option<String>,
    pub memo: Option<String>,
    pub network: XahauNetwork,
}

/// Convert a decimal XAH amount to drops, rejecting anything that does not
/// round to a positive whole number of drops.
pub fn xah_to_drops(amount: f64) -> Result<i64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation("Invalid amount".to_string()));
    }
    let drops = (amount * DROPS_PER_XAH).round();
    if drops < 1.0 || drops > i64::MAX as f64 {
        return Err(AppError::Validation("Invalid amount".to_string()));
    }
    Ok(drops as i64)
}

pub fn payment_payload(request: &PaymentRequest, destination: &str, base_url: &str) -> Result<Value> {
    let amount = match request.issuer.as_deref() {
        Some(issuer) if request.currency != NATIVE_CURRENCY => {
            if !request.amount.is_finite() || request.amount <= 0.0 {
                return Err(AppError::Validation("Invalid amount".to_string()));
            }
            json!({
                "value": request.amount.to_string(),
                "currency": request.currency,
                "issuer": issuer,
            })
        }
        _ => Value::String(xah_to_drops(request.amount)?.to_string()),
    };

    let mut txjson = json!({
        "TransactionType": "Payment",
        "Destination": destination,
        "Amount": amount,
        "NetworkID": request.network.network_id(),
    });

    if let Some(memo) = request.memo.as_deref().filter(|m| !m.is_empty()) {
        txjson["Memos"] = json!([{
            "Memo": {
                "MemoType": hex::encode_upper(MEMO_TYPE),
                "MemoData": hex::encode_upper(memo),
            }
        }]);
    }

    Ok(json!({
        "txjson": txjson,
        "options": {
            "submit": true,
            "expire": PAYMENT_EXPIRE_MINUTES,
            "return_url": { "web": format!("{}/chess", base_url.trim_end_matches('/')) },
        },
    }))
}

pub fn signin_payload(return_url: Option<&str>, network: XahauNetwork, issued_at_ms: i64) -> Value {
    let mut options = json!({
        "submit": false,
        "expire": SIGNIN_EXPIRE_MINUTES,
    });
    if let Some(url) = return_url.filter(|u| !u.is_empty()) {
        options["return_url"] = json!({ "web": url });
    }

    json!({
        "txjson": {
            "TransactionType": "SignIn",
            "NetworkID": network.network_id(),
        },
        "options": options,
        "custom_meta": {
            "instruction": "Sign in to play chess",
            "identifier": format!("chess-signin-{}", issued_at_ms),
        },
    })
}

// ============================================================================
// Provider responses
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPayload {
    pub uuid: String,
    #[serde(default)]
    pub next: Option<PayloadNext>,
    #[serde(default)]
    pub refs: Option<PayloadRefs>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadNext {
    pub always: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadRefs {
    pub qr_png: Option<String>,
    pub websocket_status: Option<String>,
}

/// What the client needs to present a payload to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadLinks {
    pub ok: bool,
    pub uuid: String,
    pub next_url: String,
    pub qr_url: Option<String>,
    pub websocket_url: Option<String>,
}

impl CreatedPayload {
    pub fn into_links(self) -> Result<PayloadLinks> {
        let next_url = self
            .next
            .and_then(|next| next.always)
            .ok_or_else(|| AppError::Upstream("payload response had no next.always".to_string()))?;
        let refs = self.refs;

        Ok(PayloadLinks {
            ok: true,
            uuid: self.uuid,
            next_url,
            qr_url: refs.as_ref().and_then(|r| r.qr_png.clone()),
            websocket_url: refs.and_then(|r| r.websocket_status),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadDetails {
    #[serde(default)]
    pub meta: PayloadMeta,
    #[serde(default)]
    pub payload: Option<PayloadRequestInfo>,
    #[serde(default)]
    pub response: Option<PayloadResponse>,
    #[serde(default)]
    pub application: Option<PayloadApplication>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PayloadMeta {
    pub signed: bool,
    pub resolved: bool,
    pub expired: bool,
    pub cancelled: bool,
}

/// The transaction the payload asked the user to sign.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PayloadRequestInfo {
    pub tx_type: Option<String>,
    pub request_json: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PayloadResponse {
    pub account: Option<String>,
    pub signer: Option<String>,
    pub dispatched_to: Option<String>,
    pub txid: Option<String>,
    pub txjson: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PayloadApplication {
    pub issued_user_token: Option<String>,
}

/// Where a payload stands from the user's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PayloadResolution {
    Pending,
    Signed { account: Option<String> },
    Rejected,
    Expired,
}

impl PayloadResolution {
    pub fn is_signed(&self) -> bool {
        matches!(self, PayloadResolution::Signed { .. })
    }

    pub fn account(&self) -> Option<&str> {
        match self {
            PayloadResolution::Signed { account } => account.as_deref(),
            _ => None,
        }
    }
}

impl PayloadDetails {
    /// The signing wallet, looked up across every field the provider has
    /// been seen to use. The user token is not a wallet address, so this is
    /// for display only; use [`PayloadDetails::wallet_account`] for identity.
    pub fn signer_account(&self) -> Option<String> {
        let response = self.response.as_ref();
        response
            .and_then(|r| r.account.clone())
            .or_else(|| response.and_then(|r| r.signer.clone()))
            .or_else(|| {
                self.application
                    .as_ref()
                    .and_then(|a| a.issued_user_token.clone())
            })
            .or_else(|| self.wallet_account())
            .filter(|account| !account.is_empty())
    }

    /// The signing wallet, taken only from fields that carry an address.
    pub fn wallet_account(&self) -> Option<String> {
        let response = self.response.as_ref()?;
        response
            .account
            .clone()
            .or_else(|| response.signer.clone())
            .or_else(|| response.dispatched_to.clone())
            .or_else(|| {
                response
                    .txjson
                    .as_ref()
                    .and_then(|tx| tx.get("Account"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .filter(|account| !account.is_empty())
    }

    /// The signed transaction body, preferring what was requested.
    pub fn transaction(&self) -> Option<&Value> {
        self.payload
            .as_ref()
            .and_then(|p| p.request_json.as_ref())
            .or_else(|| self.response.as_ref().and_then(|r| r.txjson.as_ref()))
    }

    /// The REST state expressed as the status-socket event would carry it.
    pub fn status_event(&self) -> PayloadStatusEvent {
        let signed = if self.meta.signed {
            Some(true)
        } else if !self.meta.expired && (self.meta.resolved || self.meta.cancelled) {
            Some(false)
        } else {
            None
        };

        PayloadStatusEvent {
            signed,
            account: self.wallet_account(),
            expired: Some(self.meta.expired),
            payload_uuidv4: None,
        }
    }

    pub fn resolution(&self) -> PayloadResolution {
        self.status_event().resolution()
    }

    /// Checks that this payload is a signed payment of `expected`.
    pub fn check_entry_payment(&self, expected: &EntryPayment<'_>) -> std::result::Result<(), PaymentMismatch> {
        let resolution = self.resolution();
        if !resolution.is_signed() {
            return Err(PaymentMismatch::NotSigned);
        }
        if resolution.account() != Some(expected.payer) {
            return Err(PaymentMismatch::WrongSigner);
        }

        let tx = self.transaction().ok_or(PaymentMismatch::NotPayment)?;
        let tx_type = tx
            .get("TransactionType")
            .and_then(Value::as_str)
            .or_else(|| self.payload.as_ref().and_then(|p| p.tx_type.as_deref()));
        if tx_type != Some("Payment") {
            return Err(PaymentMismatch::NotPayment);
        }
        if tx.get("Destination").and_then(Value::as_str) != Some(expected.destination) {
            return Err(PaymentMismatch::WrongDestination);
        }

        let paid = match tx.get("Amount") {
            Some(Value::String(drops)) if expected.currency == NATIVE_CURRENCY => {
                drops.parse::<i64>().ok()
            }
            Some(Value::Object(amount))
                if amount.get("currency").and_then(Value::as_str) == Some(expected.currency)
                    && amount.get("issuer").and_then(Value::as_str) == expected.issuer =>
            {
                amount
                    .get("value")
                    .and_then(Value::as_str)
                    .and_then(|v| v.parse::<f64>().ok())
                    .and_then(|v| xah_to_drops(v).ok())
            }
            _ => None,
        };
        match paid {
            Some(paid) if paid >= expected.amount => Ok(()),
            _ => Err(PaymentMismatch::WrongAmount),
        }
    }
}

/// What a tournament entry payment must look like.
#[derive(Debug, Clone, Copy)]
pub struct EntryPayment<'a> {
    pub payer: &'a str,
    pub destination: &'a str,
    /// Micro-units of `currency`.
    pub amount: i64,
    pub currency: &'a str,
    pub issuer: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PaymentMismatch {
    #[error("payload is not signed")]
    NotSigned,
    #[error("payload was signed by another wallet")]
    WrongSigner,
    #[error("payload is not a payment")]
    NotPayment,
    #[error("payment does not go to the tournament Hook")]
    WrongDestination,
    #[error("payment amount does not cover the entry fee")]
    WrongAmount,
}

/// A message from the provider's per-payload status WebSocket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadStatusEvent {
    pub signed: Option<bool>,
    pub account: Option<String>,
    pub expired: Option<bool>,
    pub payload_uuidv4: Option<String>,
}

impl PayloadStatusEvent {
    pub fn resolution(&self) -> PayloadResolution {
        match (self.signed, self.expired) {
            (Some(true), _) => PayloadResolution::Signed {
                account: self.account.clone(),
            },
            (Some(false), _) => PayloadResolution::Rejected,
            (None, Some(true)) => PayloadResolution::Expired,
            _ => PayloadResolution::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xah(amount: f64) -> PaymentRequest {
        PaymentRequest {
            amount,
            currency: NATIVE_CURRENCY.to_string(),
            issuer: None,
            memo: None,
            network: XahauNetwork::Testnet,
        }
    }

    #[test]
    fn native_amount_is_sent_in_drops() {
        let body = payment_payload(&xah(1.5), "rHook", "https://chess.example/").unwrap();
        assert_eq!(body["txjson"]["Amount"], "1500000");
        assert_eq!(body["txjson"]["NetworkID"], 21338);
        assert_eq!(body["options"]["expire"], 300);
        assert_eq!(body["options"]["return_url"]["web"], "https://chess.example/chess");
        assert!(body["txjson"].get("Memos").is_none());
    }

    #[test]
    fn issued_currency_keeps_decimal_value() {
        let mut request = xah(2.5);
        request.currency = "USD".to_string();
        request.issuer = Some("rIssuer".to_string());
        let body = payment_payload(&request, "rHook", "http://localhost:3000").unwrap();
        assert_eq!(body["txjson"]["Amount"]["value"], "2.5");
        assert_eq!(body["txjson"]["Amount"]["issuer"], "rIssuer");
    }

    #[test]
    fn memo_is_upper_hex() {
        let mut request = xah(1.0);
        request.memo = Some("{\"a\":1}".to_string());
        let body = payment_payload(&request, "rHook", "http://localhost:3000").unwrap();
        let memo = &body["txjson"]["Memos"][0]["Memo"];
        assert_eq!(memo["MemoType"], "6170706C69636174696F6E2F6A736F6E");
        assert_eq!(memo["MemoData"], "7B2261223A317D");
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(xah_to_drops(0.0).is_err());
        assert!(xah_to_drops(-3.0).is_err());
        assert!(xah_to_drops(f64::NAN).is_err());
        assert!(xah_to_drops(0.0000001).is_err());
        assert_eq!(xah_to_drops(10.0).unwrap(), 10_000_000);
    }

    #[test]
    fn signin_does_not_submit() {
        let body = signin_payload(Some("https://chess.example/callback"), XahauNetwork::Mainnet, 42);
        assert_eq!(body["txjson"]["TransactionType"], "SignIn");
        assert_eq!(body["options"]["submit"], false);
        assert_eq!(body["options"]["expire"], 5);
        assert_eq!(body["custom_meta"]["identifier"], "chess-signin-42");
    }

    #[test]
    fn missing_next_url_is_an_upstream_error() {
        let created: CreatedPayload = serde_json::from_value(json!({ "uuid": "abc" })).unwrap();
        assert!(matches!(created.into_links(), Err(AppError::Upstream(_))));
    }

    #[test]
    fn signer_account_fallback_order() {
        let details: PayloadDetails = serde_json::from_value(json!({
            "meta": { "signed": true, "resolved": true },
            "application": { "issued_user_token": "rFromToken" },
            "response": { "dispatched_to": "rDispatched", "txjson": { "Account": "rTx" } }
        }))
        .unwrap();
        assert_eq!(details.signer_account().as_deref(), Some("rFromToken"));
        assert_eq!(details.wallet_account().as_deref(), Some("rDispatched"));

        let token_only: PayloadDetails = serde_json::from_value(json!({
            "meta": { "signed": true, "resolved": true },
            "application": { "issued_user_token": "some-user-token" }
        }))
        .unwrap();
        assert_eq!(token_only.wallet_account(), None);
        assert_eq!(token_only.resolution(), PayloadResolution::Signed { account: None });

        let details: PayloadDetails = serde_json::from_value(json!({
            "meta": { "signed": true },
            "response": { "txjson": { "Account": "rTx" } }
        }))
        .unwrap();
        assert_eq!(
            details.resolution(),
            PayloadResolution::Signed {
                account: Some("rTx".to_string())
            }
        );
    }

    #[test]
    fn status_events_map_to_resolutions() {
        let expired: PayloadStatusEvent =
            serde_json::from_value(json!({ "expired": true })).unwrap();
        assert_eq!(expired.resolution(), PayloadResolution::Expired);

        let rejected: PayloadStatusEvent =
            serde_json::from_value(json!({ "signed": false })).unwrap();
        assert_eq!(rejected.resolution(), PayloadResolution::Rejected);

        let welcome: PayloadStatusEvent =
            serde_json::from_value(json!({ "message": "Welcome" })).unwrap();
        assert_eq!(welcome.resolution(), PayloadResolution::Pending);
    }

    #[test]
    fn rest_state_matches_status_events() {
        let expired: PayloadDetails = serde_json::from_value(json!({
            "meta": { "resolved": true, "expired": true }
        }))
        .unwrap();
        assert_eq!(expired.resolution(), PayloadResolution::Expired);

        let cancelled: PayloadDetails = serde_json::from_value(json!({
            "meta": { "resolved": true, "cancelled": true }
        }))
        .unwrap();
        assert_eq!(cancelled.resolution(), PayloadResolution::Rejected);
        assert_eq!(PayloadDetails::default().resolution(), PayloadResolution::Pending);
    }

    fn signed_payment(amount: Value) -> PayloadDetails {
        serde_json::from_value(json!({
            "meta": { "signed": true, "resolved": true },
            "payload": {
                "tx_type": "Payment",
                "request_json": {
                    "TransactionType": "Payment",
                    "Destination": "rHook",
                    "Amount": amount
                }
            },
            "response": { "account": "rPayer" }
        }))
        .unwrap()
    }

    fn entry(amount: i64) -> EntryPayment<'static> {
        EntryPayment {
            payer: "rPayer",
            destination: "rHook",
            amount,
            currency: NATIVE_CURRENCY,
            issuer: None,
        }
    }

    #[test]
    fn entry_payment_checks() {
        let payment = signed_payment(json!("5000000"));
        assert_eq!(payment.check_entry_payment(&entry(5_000_000)), Ok(()));
        assert_eq!(
            payment.check_entry_payment(&entry(6_000_000)),
            Err(PaymentMismatch::WrongAmount)
        );
        assert_eq!(
            payment.check_entry_payment(&EntryPayment { payer: "rOther", ..entry(5_000_000) }),
            Err(PaymentMismatch::WrongSigner)
        );
        assert_eq!(
            payment.check_entry_payment(&EntryPayment { destination: "rElsewhere", ..entry(5_000_000) }),
            Err(PaymentMismatch::WrongDestination)
        );

        let signin: PayloadDetails = serde_json::from_value(json!({
            "meta": { "signed": true, "resolved": true },
            "payload": { "tx_type": "SignIn", "request_json": { "TransactionType": "SignIn" } },
            "response": { "account": "rPayer" }
        }))
        .unwrap();
        assert_eq!(
            signin.check_entry_payment(&entry(1)),
            Err(PaymentMismatch::NotPayment)
        );
    }

    #[test]
    fn issued_currency_entry_payment() {
        let payment = signed_payment(json!({ "value": "2.5", "currency": "USD", "issuer": "rIssuer" }));
        let usd = EntryPayment {
            currency: "USD",
            issuer: Some("rIssuer"),
            ..entry(2_500_000)
        };
        assert_eq!(payment.check_entry_payment(&usd), Ok(()));
        assert_eq!(
            payment.check_entry_payment(&EntryPayment { issuer: Some("rFake"), ..usd }),
            Err(PaymentMismatch::WrongAmount)
        );
    }
}
