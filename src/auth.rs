//! Identity layer: JWT issuing/verification and the `AuthUser` extractor.
//!
//! Every mutating core operation takes an explicit acting user; this module
//! only authenticates requests and hands that actor to the handlers. Role
//! gating is not performed here.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::user::{self, Entity as UserEntity},
    errors::ServiceError,
    AppState,
};

/// Claim structure for JWT tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub name: String,
    pub email: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

/// Authenticated actor attached to every mutating call.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub user: AuthUser,
}

#[derive(Clone)]
pub struct AuthService {
    db: Arc<DatabaseConnection>,
    jwt_secret: String,
    jwt_expiration_secs: u64,
}

impl AuthService {
    pub fn new(db: Arc<DatabaseConnection>, jwt_secret: String, jwt_expiration_secs: u64) -> Self {
        Self {
            db,
            jwt_secret,
            jwt_expiration_secs,
        }
    }

    /// Verifies credentials and issues a signed token.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ServiceError> {
        let user = UserEntity::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::AuthError("Invalid credentials".into()))?;

        if !user.is_active {
            return Err(ServiceError::Forbidden("User is inactive".into()));
        }

        if !verify_password(password, &user.password_hash) {
            warn!(email = %email, "Failed login attempt");
            return Err(ServiceError::AuthError("Invalid credentials".into()));
        }

        let actor = AuthUser {
            id: user.id,
            name: user.name,
            email: user.email,
        };
        let token = self.issue_token(&actor)?;

        Ok(TokenResponse { token, user: actor })
    }

    pub fn issue_token(&self, user: &AuthUser) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            iat: now,
            exp: now + self.jwt_expiration_secs as i64,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::AuthError(format!("Failed to sign token: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<AuthUser, ServiceError> {
        verify_token(token, &self.jwt_secret)
    }
}

pub fn verify_token(token: &str, secret: &str) -> Result<AuthUser, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ServiceError::Unauthorized(format!("Invalid token: {}", e)))?;

    let id = Uuid::parse_str(&data.claims.sub)
        .map_err(|_| ServiceError::Unauthorized("Invalid subject claim".into()))?;

    Ok(AuthUser {
        id,
        name: data.claims.name,
        email: data.claims.email,
    })
}

/// Hashes a password with argon2id and a fresh salt.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::InternalError(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("Missing authorization header".into()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("Expected bearer token".into()))?;

        verify_token(token, &app_state.config.jwt_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

    fn actor() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            name: "Operador Uno".into(),
            email: "operador@example.com".into(),
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("agua-segura-123").unwrap();
        assert!(verify_password("agua-segura-123", &hash));
        assert!(!verify_password("otra-clave", &hash));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("whatever", "not-a-phc-string"));
    }

    #[test]
    fn token_round_trip_preserves_actor() {
        let user = actor();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            iat: now,
            exp: now + 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let decoded = verify_token(&token, SECRET).unwrap();
        assert_eq!(decoded.id, user.id);
        assert_eq!(decoded.email, user.email);
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let user = actor();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            name: user.name,
            email: user.email,
            iat: now,
            exp: now + 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"another_secret_entirely_32_chars!!"),
        )
        .unwrap();

        assert!(verify_token(&token, SECRET).is_err());
    }
}
