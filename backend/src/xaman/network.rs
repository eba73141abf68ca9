use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Xahau network a payment is sent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XahauNetwork {
    #[default]
    Mainnet,
    Testnet,
}

impl XahauNetwork {
    pub fn as_str(&self) -> &'static str {
        match self {
            XahauNetwork::Mainnet => "mainnet",
            XahauNetwork::Testnet => "testnet",
        }
    }

    /// `NetworkID` field carried by every transaction.
    pub fn network_id(&self) -> u32 {
        match self {
            XahauNetwork::Mainnet => 21337,
            XahauNetwork::Testnet => 21338,
        }
    }

    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            XahauNetwork::Mainnet => "wss://xahau.network",
            XahauNetwork::Testnet => "wss://xahau-test.net:51234",
        }
    }
}

impl FromStr for XahauNetwork {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(XahauNetwork::Mainnet),
            "testnet" => Ok(XahauNetwork::Testnet),
            other => Err(format!("unknown Xahau network: {}", other)),
        }
    }
}

impl fmt::Display for XahauNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
