/// Account management system
///
/// Handles signup (with the starting point bonus), authentication and sessions.

mod manager;

pub use manager::AccountManager;

use crate::{admin::Role, db::models::AccountRow, error::MarketResult};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Signup request
///
/// Email, nickname and the password minimum are checked by
/// `AccountManager::create_account`; the derive only bounds request size.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(max = 254))]
    pub email: String,
    pub nickname: String,
    #[validate(length(max = 128))]
    pub password: String,
    pub role: Role,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSessionRequest {
    pub refresh_token: String,
}

/// Nickname change request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNicknameRequest {
    pub nickname: String,
}

/// Public view of an account, including its balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub id: String,
    pub email: String,
    pub nickname: String,
    pub role: Role,
    pub points: i64,
}

impl AccountProfile {
    pub fn from_row(row: &AccountRow) -> MarketResult<Self> {
        Ok(Self {
            id: row.id.clone(),
            email: row.email.clone(),
            nickname: row.nickname.clone(),
            role: Role::parse(&row.role)?,
            points: row.points,
        })
    }
}

/// Session credentials handed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

/// Session response (signup, login, refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub account: AccountProfile,
    pub credentials: Credentials,
}

/// Validated session from bearer token
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub account_id: String,
    pub session_id: String,
    pub role: Role,
}
