use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::User;
use crate::database::queries::users;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct AuthService {
    secret: String,
}

impl Default for AuthService {
    fn default() -> Self {
        Self {
            secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| "colloquy-dev-secret".to_string()),
        }
    }
}

impl AuthService {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn issue_token(&self, user_id: Uuid, ttl_seconds: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: user_id,
            exp: chrono::Utc::now().timestamp() + ttl_seconds,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    pub fn decode_token(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .ok()
    }

    /// Resolve a bearer token to the owning user.
    pub async fn get_user_by_token(&self, token: &str) -> Result<Option<User>, sqlx::Error> {
        let Some(claims) = self.decode_token(token) else {
            return Ok(None);
        };

        users::get_user_by_id(claims.sub).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let service = AuthService::new("test-secret");
        let user_id = Uuid::new_v4();

        let token = service.issue_token(user_id, 3600).expect("token");
        let claims = service.decode_token(&token).expect("claims");

        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = AuthService::new("secret-a");
        let verifier = AuthService::new("secret-b");

        let token = issuer.issue_token(Uuid::new_v4(), 3600).expect("token");
        assert!(verifier.decode_token(&token).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = AuthService::new("test-secret");
        let token = service.issue_token(Uuid::new_v4(), -3600).expect("token");
        assert!(service.decode_token(&token).is_none());
    }
}
