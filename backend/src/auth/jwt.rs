use crate::error::{AppError, Result};
use axum::http::HeaderMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Session lifetime for a signed-in wallet.
const SESSION_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // wallet address
    pub exp: usize,
}

impl Claims {
    pub fn new(wallet_address: String, expiration_hours: i64) -> Self {
        let exp =
            (chrono::Utc::now() + chrono::Duration::hours(expiration_hours)).timestamp() as usize;

        Self {
            sub: wallet_address,
            exp,
        }
    }
}

#[derive(Clone)]
pub struct JwtManager {
    secret: String,
}

impl JwtManager {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn create_token(&self, wallet_address: &str) -> Result<String> {
        let claims = Claims::new(wallet_address.to_string(), SESSION_HOURS);

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Auth(format!("Failed to create token: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))
    }
}

/// The wallet a request is acting for, taken from its bearer token.
#[derive(Debug, Clone)]
pub struct WalletUser {
    pub address: String,
}

impl WalletUser {
    pub fn from_header(jwt_manager: &JwtManager, auth_header: &str) -> Result<Self> {
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthorized)?;

        let claims = jwt_manager.verify_token(token)?;

        Ok(WalletUser {
            address: claims.sub,
        })
    }

    pub fn from_headers(jwt_manager: &JwtManager, headers: &HeaderMap) -> Result<Self> {
        let auth_header = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        Self::from_header(jwt_manager, auth_header)
    }

    /// Reject requests that name a wallet other than the signed-in one.
    pub fn ensure_is(&self, address: &str) -> Result<()> {
        if self.address != address {
            crate::audit::log_security_event(
                &self.address,
                "wallet_mismatch",
                &format!("request acted for {}", address),
            );
            return Err(AppError::Forbidden(
                "Wallet address does not match the signed-in wallet".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_wallet_address() {
        let manager = JwtManager::new("secret".to_string());
        let token = manager.create_token("rPlayerOne").unwrap();
        let user = WalletUser::from_header(&manager, &format!("Bearer {}", token)).unwrap();
        assert_eq!(user.address, "rPlayerOne");
    }

    #[test]
    fn rejects_foreign_secret_and_missing_prefix() {
        let issuer = JwtManager::new("one".to_string());
        let verifier = JwtManager::new("two".to_string());
        let token = issuer.create_token("rPlayerOne").unwrap();

        assert!(WalletUser::from_header(&verifier, &format!("Bearer {}", token)).is_err());
        assert!(matches!(
            WalletUser::from_header(&issuer, &token),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn ensure_is_flags_other_wallets() {
        let user = WalletUser {
            address: "rPlayerOne".to_string(),
        };
        assert!(user.ensure_is("rPlayerOne").is_ok());
        assert!(matches!(
            user.ensure_is("rSomeoneElse"),
            Err(AppError::Forbidden(_))
        ));
    }
}
