//! JWT token validation and blocklist checking.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::warn;
use uuid::Uuid;

use pulsehub_cache::keys;
use pulsehub_cache::provider::CacheManager;
use pulsehub_core::config::AuthConfig;
use pulsehub_core::error::AppError;
use pulsehub_core::traits::CacheProvider;

use super::claims::{Claims, TokenType};

/// Validates JWT tokens and checks blocklist status.
#[derive(Clone)]
pub struct JwtDecoder {
    /// HMAC secret key for verification.
    decoding_key: DecodingKey,
    /// Validation configuration.
    validation: Validation,
    /// Shared store for blocklist lookups.
    cache: Arc<CacheManager>,
}

impl std::fmt::Debug for JwtDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtDecoder")
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtDecoder {
    /// Creates a new decoder from auth configuration.
    pub fn new(config: &AuthConfig, cache: Arc<CacheManager>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            cache,
        }
    }

    /// Decodes and validates an access token string.
    ///
    /// Checks:
    /// 1. Signature validity
    /// 2. Expiration
    /// 3. Token type is Access
    /// 4. JTI not in blocklist
    pub async fn decode_access_token(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.decode_token(token)?;

        if claims.token_type != TokenType::Access {
            return Err(AppError::authentication(
                "Invalid token type: expected access token",
            ));
        }

        self.check_blocklist(&claims.jti).await?;

        Ok(claims)
    }

    /// Internal decode without type checking.
    fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AppError::authentication("Token has expired")
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken => {
                        AppError::authentication("Invalid token format")
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AppError::authentication("Invalid token signature")
                    }
                    _ => AppError::authentication(format!("Token validation failed: {e}")),
                }
            })?;

        Ok(token_data.claims)
    }

    /// Checks whether the given JWT ID has been blocklisted.
    ///
    /// A store outage does not lock everyone out: the lookup failure is
    /// logged and the token is accepted on its signature alone.
    async fn check_blocklist(&self, jti: &Uuid) -> Result<(), AppError> {
        let key = keys::jwt_blocklist(&jti.to_string());
        match self.cache.exists(&key).await {
            Ok(true) => Err(AppError::authentication("Token has been revoked")),
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Blocklist lookup failed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use pulsehub_core::config::CacheConfig;
    use pulsehub_core::error::ErrorKind;
    use pulsehub_core::types::id::UserId;

    const SECRET: &str = "test-secret";

    fn decoder() -> (JwtDecoder, Arc<CacheManager>) {
        let cache = Arc::new(CacheManager::in_memory(&CacheConfig::default()));
        let config = AuthConfig {
            jwt_secret: SECRET.into(),
            leeway_seconds: 0,
        };
        (JwtDecoder::new(&config, Arc::clone(&cache)), cache)
    }

    fn claims(token_type: TokenType, ttl_secs: i64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: UserId::new(),
            sid: Uuid::new_v4(),
            username: "ada".into(),
            iat: now,
            exp: now + ttl_secs,
            jti: Uuid::new_v4(),
            token_type,
        }
    }

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_access_token_decodes() {
        let (decoder, _) = decoder();
        let c = claims(TokenType::Access, 600);
        let decoded = decoder
            .decode_access_token(&sign(&c, SECRET))
            .await
            .unwrap();
        assert_eq!(decoded.user_id(), c.sub);
    }

    #[tokio::test]
    async fn test_refresh_token_is_rejected() {
        let (decoder, _) = decoder();
        let token = sign(&claims(TokenType::Refresh, 600), SECRET);
        let err = decoder.decode_access_token(&token).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let (decoder, _) = decoder();
        let token = sign(&claims(TokenType::Access, 600), "other");
        assert!(decoder.decode_access_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let (decoder, _) = decoder();
        let token = sign(&claims(TokenType::Access, -120), SECRET);
        let err = decoder.decode_access_token(&token).await.unwrap_err();
        assert!(err.message.contains("expired"));
    }

    #[tokio::test]
    async fn test_blocklisted_token_is_rejected() {
        let (decoder, cache) = decoder();
        let c = claims(TokenType::Access, 600);
        cache
            .set(
                &keys::jwt_blocklist(&c.jti.to_string()),
                "revoked",
                std::time::Duration::from_secs(60),
            )
            .await
            .unwrap();
        let err = decoder
            .decode_access_token(&sign(&c, SECRET))
            .await
            .unwrap_err();
        assert!(err.message.contains("revoked"));
    }
}
