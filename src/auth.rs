use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token, lets rotation be logged without logging the token
    pub jti: String,
}

/// Signs and verifies the access/refresh token pair.
///
/// The two token families use distinct secrets so a leaked access secret
/// cannot mint refresh tokens.
pub struct AuthManager {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl AuthManager {
    pub fn new(config: &Config) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.jwt_access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.jwt_access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
            access_ttl_secs: config.jwt_access_ttl_secs,
            refresh_ttl_secs: config.jwt_refresh_ttl_secs,
        }
    }

    /// Create an access token. Returns the token and its expiry timestamp.
    pub fn issue_access(&self, user_id: &Uuid, email: &str, role: &str) -> AppResult<(String, i64)> {
        self.issue(user_id, email, role, self.access_ttl_secs, &self.access_encoding)
    }

    /// Create a refresh token. Returns the token and its expiry timestamp.
    pub fn issue_refresh(
        &self,
        user_id: &Uuid,
        email: &str,
        role: &str,
    ) -> AppResult<(String, i64)> {
        self.issue(user_id, email, role, self.refresh_ttl_secs, &self.refresh_encoding)
    }

    fn issue(
        &self,
        user_id: &Uuid,
        email: &str,
        role: &str,
        ttl_secs: i64,
        key: &EncodingKey,
    ) -> AppResult<(String, i64)> {
        let now = Utc::now();
        let exp = now + Duration::seconds(ttl_secs);

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, key)?;
        Ok((token, exp.timestamp()))
    }

    pub fn verify_access(&self, token: &str) -> AppResult<Claims> {
        Self::verify(token, &self.access_decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> AppResult<Claims> {
        Self::verify(token, &self.refresh_decoding)
    }

    fn verify(token: &str, key: &DecodingKey) -> AppResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, key, &validation)
            .map_err(|e| AppError::Auth(format!("invalid or expired token: {}", e)))?;
        Ok(data.claims)
    }
}

/// Read the `exp` claim without verifying the signature.
///
/// The denylist needs the remaining lifetime of tokens it will never trust
/// again, so signature verification would be pointless there.
pub fn decode_expiry_unverified(token: &str) -> Option<i64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims.exp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalyzerConfig, DbConfig, KafkaConfig};

    fn test_config() -> Config {
        Config {
            port: 4000,
            database_url: String::new(),
            redis_url: String::new(),
            kafka: KafkaConfig {
                brokers: String::new(),
                consumer_group: String::new(),
            },
            analyzer: AnalyzerConfig {
                base_url: String::new(),
                shared_secret: String::new(),
                timeout_secs: 5,
            },
            jwt_access_secret: "access-secret-0123456789-0123456789-ab".to_string(),
            jwt_refresh_secret: "refresh-secret-0123456789-0123456789-a".to_string(),
            jwt_access_ttl_secs: 900,
            jwt_refresh_ttl_secs: 604_800,
            cors_origins: vec![],
            rust_log: "info".to_string(),
            db: DbConfig {
                max_connections: 1,
                acquire_timeout_secs: 5,
            },
        }
    }

    #[test]
    fn access_token_round_trip() {
        let auth = AuthManager::new(&test_config());
        let user_id = Uuid::new_v4();

        let (token, exp) = auth.issue_access(&user_id, "a@x.io", "user").unwrap();
        let claims = auth.verify_access(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "a@x.io");
        assert_eq!(claims.role, "user");
        assert_eq!(claims.exp, exp);
        assert!(claims.exp - claims.iat == 900);
    }

    #[test]
    fn token_families_do_not_cross_verify() {
        let auth = AuthManager::new(&test_config());
        let user_id = Uuid::new_v4();

        let (access, _) = auth.issue_access(&user_id, "a@x.io", "user").unwrap();
        let (refresh, _) = auth.issue_refresh(&user_id, "a@x.io", "user").unwrap();

        assert!(auth.verify_refresh(&access).is_err());
        assert!(auth.verify_access(&refresh).is_err());
    }

    #[test]
    fn expiry_decodes_without_verification() {
        let auth = AuthManager::new(&test_config());
        let user_id = Uuid::new_v4();

        let (token, exp) = auth.issue_refresh(&user_id, "a@x.io", "user").unwrap();
        assert_eq!(decode_expiry_unverified(&token), Some(exp));
        assert_eq!(decode_expiry_unverified("not-a-token"), None);
    }

    #[test]
    fn refresh_tokens_carry_unique_jti() {
        let auth = AuthManager::new(&test_config());
        let user_id = Uuid::new_v4();

        let (t1, _) = auth.issue_refresh(&user_id, "a@x.io", "user").unwrap();
        let (t2, _) = auth.issue_refresh(&user_id, "a@x.io", "user").unwrap();
        let c1 = auth.verify_refresh(&t1).unwrap();
        let c2 = auth.verify_refresh(&t2).unwrap();
        assert_ne!(c1.jti, c2.jti);
    }
}
