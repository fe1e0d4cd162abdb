use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::routes::AppState;
use crate::types::account::{Account, NewAccount};

/// JWT claims: `sub` = account id (Uuid as string), `exp` (expiry), `iat` (issued at).
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authenticated caller extracted from a JWT Bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub account_id: Uuid,
}

const JWT_EXPIRY_HOURS: i64 = 24;
const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;

impl Claims {
    pub fn new(account_id: Uuid) -> Self {
        let now = chrono::Utc::now();
        let exp = (now + chrono::Duration::hours(JWT_EXPIRY_HOURS)).timestamp();
        Self {
            sub: account_id.to_string(),
            exp,
            iat: now.timestamp(),
        }
    }
}

pub fn create_token(secret: &[u8], account_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims::new(account_id);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

pub fn decode_token(secret: &[u8], token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        let claims = decode_token(&state.jwt_secret, token.trim())
            .map_err(|_| ApiError::Unauthorized("invalid or expired token".into()))?;
        let account_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ApiError::Unauthorized("invalid token subject".into()))?;
        Ok(AuthUser { account_id })
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub account: Account,
}

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_string();
    if email.is_empty() || username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "email, username and password are required".into(),
        ));
    }
    if !email.contains('@') {
        return Err(ApiError::BadRequest("email is not valid".into()));
    }
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "username must be at least {MIN_USERNAME_LEN} characters"
        )));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash =
        hash_password(&req.password).map_err(|e| ApiError::Internal(format!("hashing failed: {e}")))?;
    let account = state
        .store
        .create_account(NewAccount {
            email,
            username,
            password_hash,
        })
        .await?;
    tracing::info!(account_id = %account.id, username = %account.username, "account registered");
    Ok((StatusCode::CREATED, Json(account)))
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let invalid = || ApiError::Unauthorized("invalid email or password".into());

    let (account, password_hash) = state
        .store
        .find_credentials(&email)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&req.password, &password_hash) {
        return Err(invalid());
    }

    let token = create_token(&state.jwt_secret, account.id)
        .map_err(|e| ApiError::Internal(format!("token encoding failed: {e}")))?;
    Ok(Json(LoginResponse { token, account }))
}

/// GET /api/user/profile
pub async fn profile(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Account>, ApiError> {
    let account = state
        .store
        .get_account(auth.account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("account not found".into()))?;
    Ok(Json(account))
}
