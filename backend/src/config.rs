use crate::xaman::XahauNetwork;
use std::env;

pub const DEFAULT_XAMAN_API_URL: &str = "https://xumm.app/api/v1/platform";

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub is_production: bool,
    pub public_base_url: String,
    /// Bearer secret required by the cron-triggered expiry sweep. Unset means open.
    pub cron_secret: Option<String>,
    /// Endpoint notified when a tournament resolves. Unset disables payout calls.
    pub prize_distribution_url: Option<String>,
    pub xahau: XahauConfig,
    pub xaman: XamanConfig,
}

#[derive(Clone, Debug)]
pub struct XahauConfig {
    pub network: XahauNetwork,
    pub mainnet_rpc: String,
    pub testnet_rpc: String,
    pub hook_address_mainnet: Option<String>,
    pub hook_address_testnet: Option<String>,
}

#[derive(Clone, Debug)]
pub struct XamanConfig {
    pub api_url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let is_production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => {
                if is_production && secret.len() < 32 {
                    anyhow::bail!("JWT_SECRET must be at least 32 characters in production");
                }
                secret
            }
            Err(_) => {
                if is_production {
                    anyhow::bail!("JWT_SECRET environment variable must be set in production");
                }
                tracing::warn!("Using default JWT secret. Set JWT_SECRET in production!");
                "development_secret_key_change_in_production".to_string()
            }
        };

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        let server_port = match env::var("SERVER_PORT") {
            Ok(port) => port
                .parse()
                .map_err(|_| anyhow::anyhow!("SERVER_PORT must be a number, got {:?}", port))?,
            Err(_) => 8080,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:chess.db".to_string()),
            jwt_secret,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port,
            cors_allowed_origins,
            is_production,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            cron_secret: non_empty_var("CRON_SECRET"),
            prize_distribution_url: non_empty_var("PRIZE_DISTRIBUTION_URL"),
            xahau: XahauConfig::from_env(),
            xaman: XamanConfig::from_env(is_production)?,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Configuration used by the in-memory test app.
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test_secret_key".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            cors_allowed_origins: Vec::new(),
            is_production: false,
            public_base_url: "http://localhost:3000".to_string(),
            cron_secret: None,
            prize_distribution_url: None,
            xahau: XahauConfig {
                network: XahauNetwork::Testnet,
                mainnet_rpc: XahauNetwork::Mainnet.default_rpc_url().to_string(),
                testnet_rpc: XahauNetwork::Testnet.default_rpc_url().to_string(),
                hook_address_mainnet: None,
                hook_address_testnet: Some("rHookTestnetDestination".to_string()),
            },
            xaman: XamanConfig {
                api_url: DEFAULT_XAMAN_API_URL.to_string(),
                api_key: "test-key".to_string(),
                api_secret: "test-secret".to_string(),
            },
        }
    }
}

impl XahauConfig {
    pub fn from_env() -> Self {
        let network = match env::var("XAHAU_NETWORK") {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!("Unknown XAHAU_NETWORK {:?}, falling back to mainnet", value);
                XahauNetwork::Mainnet
            }),
            Err(_) => XahauNetwork::Mainnet,
        };

        Self {
            network,
            mainnet_rpc: env::var("XAHAU_MAINNET_RPC")
                .unwrap_or_else(|_| XahauNetwork::Mainnet.default_rpc_url().to_string()),
            testnet_rpc: env::var("XAHAU_TESTNET_RPC")
                .unwrap_or_else(|_| XahauNetwork::Testnet.default_rpc_url().to_string()),
            hook_address_mainnet: non_empty_var("HOOK_ADDRESS_MAINNET"),
            hook_address_testnet: non_empty_var("HOOK_ADDRESS_TESTNET"),
        }
    }

    pub fn rpc_url(&self, network: XahauNetwork) -> &str {
        match network {
            XahauNetwork::Mainnet => &self.mainnet_rpc,
            XahauNetwork::Testnet => &self.testnet_rpc,
        }
    }

    /// Payment destination (the Hook account) for a network.
    pub fn hook_address(&self, network: XahauNetwork) -> Option<&str> {
        match network {
            XahauNetwork::Mainnet => self.hook_address_mainnet.as_deref(),
            XahauNetwork::Testnet => self.hook_address_testnet.as_deref(),
        }
    }
}

impl XamanConfig {
    pub fn from_env(is_production: bool) -> anyhow::Result<Self> {
        let api_key = env::var("XAMAN_API_KEY").unwrap_or_default();
        let api_secret = env::var("XAMAN_API_SECRET").unwrap_or_default();

        if api_key.is_empty() || api_secret.is_empty() {
            if is_production {
                anyhow::bail!("XAMAN_API_KEY and XAMAN_API_SECRET must be set in production");
            }
            tracing::warn!("Xaman credentials are missing; wallet sign-in and payments will fail.");
        }

        Ok(Self {
            api_url: env::var("XAMAN_API_URL").unwrap_or_else(|_| DEFAULT_XAMAN_API_URL.to_string()),
            api_key,
            api_secret,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_address_follows_network() {
        let config = Config::for_tests();
        assert_eq!(
            config.xahau.hook_address(XahauNetwork::Testnet),
            Some("rHookTestnetDestination")
        );
        assert_eq!(config.xahau.hook_address(XahauNetwork::Mainnet), None);
        assert_eq!(
            config.xahau.rpc_url(XahauNetwork::Mainnet),
            "wss://xahau.network"
        );
    }
}
