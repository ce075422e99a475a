/// Account manager implementation using runtime queries
use crate::{
    account::{AccountProfile, ValidatedSession},
    admin::Role,
    config::ServerConfig,
    db::models::{AccountRow, SessionRow},
    error::{is_unique_violation, MarketError, MarketResult},
    ledger::{apply_points, TransactionKind},
    validation,
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

fn hash_password(password: &str) -> MarketResult<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| MarketError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> MarketResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| MarketError::Internal(format!("Stored password hash is invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Create a new account and credit the signup bonus in the same transaction
    pub async fn create_account(
        &self,
        email: &str,
        nickname: &str,
        password: &str,
        role: Role,
    ) -> MarketResult<AccountRow> {
        validation::validate_email(email)?;
        validation::validate_nickname(nickname)?;
        validation::validate_password(password)?;

        if role == Role::Admin {
            return Err(MarketError::Forbidden(
                "Admin accounts cannot be created through signup".to_string(),
            ));
        }

        let email = email.trim().to_lowercase();
        let password_hash = hash_password(password)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO accounts (id, email, nickname, password_hash, role, points, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        )
        .bind(&id)
        .bind(&email)
        .bind(nickname)
        .bind(&password_hash)
        .bind(role.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MarketError::Conflict("Email or nickname already registered".to_string())
            } else {
                MarketError::Database(e)
            }
        })?;

        let points = apply_points(
            &mut tx,
            &id,
            self.config.points.signup_bonus,
            TransactionKind::SignupBonus,
            None,
            Some("Welcome bonus"),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(account_id = %id, role = role.as_str(), "Account created");

        Ok(AccountRow {
            id,
            email,
            nickname: nickname.to_string(),
            password_hash,
            role: role.as_str().to_string(),
            points,
            created_at: now,
        })
    }

    /// Authenticate account and create session
    pub async fn login(&self, email: &str, password: &str) -> MarketResult<(AccountRow, SessionRow)> {
        let account = self
            .get_account_by_email(email)
            .await
            .map_err(|_| MarketError::Unauthenticated("Invalid credentials".to_string()))?;

        if !verify_password(password, &account.password_hash)? {
            return Err(MarketError::Unauthenticated("Invalid credentials".to_string()));
        }

        let session = self.create_session(&account.id).await?;

        Ok((account, session))
    }

    /// Create a session for an account
    pub async fn create_session(&self, account_id: &str) -> MarketResult<SessionRow> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.authentication.access_token_ttl);
        let refresh_expires_at =
            now + Duration::days(self.config.authentication.refresh_token_ttl_days);

        let access_token = self.generate_token(account_id, &session_id, expires_at.timestamp(), "access")?;
        let refresh_token =
            self.generate_token(account_id, &session_id, refresh_expires_at.timestamp(), "refresh")?;

        sqlx::query(
            "INSERT INTO sessions (id, account_id, access_token, refresh_token, created_at, expires_at, refresh_expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&session_id)
        .bind(account_id)
        .bind(&access_token)
        .bind(&refresh_token)
        .bind(now)
        .bind(expires_at)
        .bind(refresh_expires_at)
        .execute(&self.db)
        .await?;

        Ok(SessionRow {
            id: session_id,
            account_id: account_id.to_string(),
            access_token,
            refresh_token,
            created_at: now,
            expires_at,
            refresh_expires_at,
        })
    }

    /// Validate access token and return session info
    pub async fn validate_access_token(&self, token: &str) -> MarketResult<ValidatedSession> {
        let row = sqlx::query(
            "SELECT s.id, s.account_id, s.expires_at, a.role
             FROM sessions s JOIN accounts a ON a.id = s.account_id
             WHERE s.access_token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| MarketError::Unauthenticated("Invalid or expired session".to_string()))?;

        let expires_at: chrono::DateTime<Utc> = row.try_get("expires_at")?;
        if Utc::now() > expires_at {
            return Err(MarketError::Unauthenticated("Session expired".to_string()));
        }

        let role: String = row.try_get("role")?;

        Ok(ValidatedSession {
            account_id: row.try_get("account_id")?,
            session_id: row.try_get("id")?,
            role: Role::parse(&role)?,
        })
    }

    /// Delete a session (logout)
    pub async fn delete_session(&self, session_id: &str) -> MarketResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Rotate a session: the old session is removed and a new one issued
    pub async fn refresh_session(&self, refresh_token: &str) -> MarketResult<SessionRow> {
        let row = sqlx::query(
            "SELECT id, account_id, refresh_expires_at FROM sessions WHERE refresh_token = ?1",
        )
        .bind(refresh_token)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| MarketError::Unauthenticated("Invalid refresh token".to_string()))?;

        let session_id: String = row.try_get("id")?;
        let account_id: String = row.try_get("account_id")?;
        let refresh_expires_at: chrono::DateTime<Utc> = row.try_get("refresh_expires_at")?;

        // Delete first so a refresh token can only be redeemed once
        let deleted = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(&session_id)
            .execute(&self.db)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(MarketError::Unauthenticated("Refresh token already used".to_string()));
        }

        if Utc::now() > refresh_expires_at {
            return Err(MarketError::Unauthenticated("Refresh token expired".to_string()));
        }

        self.create_session(&account_id).await
    }

    /// Get account by id
    pub async fn get_account(&self, account_id: &str) -> MarketResult<AccountRow> {
        sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, nickname, password_hash, role, points, created_at
             FROM accounts WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| MarketError::NotFound("Account not found".to_string()))
    }

    async fn get_account_by_email(&self, email: &str) -> MarketResult<AccountRow> {
        sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, nickname, password_hash, role, points, created_at
             FROM accounts WHERE email = ?1",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| MarketError::NotFound("Account not found".to_string()))
    }

    /// Public profile with current balance
    pub async fn get_profile(&self, account_id: &str) -> MarketResult<AccountProfile> {
        let row = self.get_account(account_id).await?;
        AccountProfile::from_row(&row)
    }

    /// Current point balance
    pub async fn get_balance(&self, account_id: &str) -> MarketResult<i64> {
        sqlx::query_scalar("SELECT points FROM accounts WHERE id = ?1")
            .bind(account_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| MarketError::NotFound("Account not found".to_string()))
    }

    /// Change nickname; returns the old nickname
    pub async fn update_nickname(&self, account_id: &str, nickname: &str) -> MarketResult<String> {
        validation::validate_nickname(nickname)?;

        let account = self.get_account(account_id).await?;
        if account.nickname == nickname {
            return Ok(account.nickname);
        }

        sqlx::query("UPDATE accounts SET nickname = ?1 WHERE id = ?2")
            .bind(nickname)
            .bind(account_id)
            .execute(&self.db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MarketError::Conflict(format!("Nickname {} already taken", nickname))
                } else {
                    MarketError::Database(e)
                }
            })?;

        Ok(account.nickname)
    }

    /// List accounts ordered by id, for the admin dashboard
    pub async fn list_accounts(
        &self,
        limit: i64,
        cursor: Option<&str>,
    ) -> MarketResult<Vec<AccountProfile>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, nickname, password_hash, role, points, created_at
             FROM accounts WHERE id > ?1 ORDER BY id LIMIT ?2",
        )
        .bind(cursor.unwrap_or(""))
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(AccountProfile::from_row).collect()
    }

    /// Cleanup expired sessions
    ///
    /// Returns the number of sessions deleted
    pub async fn cleanup_expired_sessions(&self) -> MarketResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(sessions_deleted = deleted, "Cleaned up expired sessions");
        } else {
            tracing::debug!("Session cleanup: no expired sessions found");
        }

        Ok(deleted)
    }

    /// Generate a signed JWT for a session
    fn generate_token(&self, account_id: &str, session_id: &str, exp: i64, kind: &str) -> MarketResult<String> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        use serde::{Deserialize, Serialize};

        #[derive(Debug, Serialize, Deserialize)]
        struct Claims {
            sub: String,
            sid: String,
            typ: String,
            iat: i64,
            exp: i64,
            jti: String,
        }

        let claims = Claims {
            sub: account_id.to_string(),
            sid: session_id.to_string(),
            typ: kind.to_string(),
            iat: Utc::now().timestamp(),
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| MarketError::Internal(format!("Failed to generate token: {}", e)))
    }
}
