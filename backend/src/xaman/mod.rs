//! Xaman wallet provider integration: payload bodies, response parsing and
//! the REST client used by the wallet endpoints.

pub mod client;
pub mod network;
pub mod payload;

pub use client::XamanClient;
pub use network::XahauNetwork;
pub use payload::{
    EntryPayment, PayloadDetails, PayloadLinks, PayloadResolution, PayloadStatusEvent,
    PaymentMismatch, PaymentRequest,
};
