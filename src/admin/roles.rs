/// Account roles and capability checks
use crate::error::{MarketError, MarketResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Buys materials
    Parent,
    /// Buys and sells materials
    Teacher,
    /// Full access, authors events and approves participations
    Admin,
}

/// Things an account may be allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Purchase,
    Sell,
    ManageEvents,
    ApproveParticipations,
    ManageRoles,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> MarketResult<Self> {
        match s.to_lowercase().as_str() {
            "parent" => Ok(Role::Parent),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            _ => Err(MarketError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Check whether this role grants a capability
    pub fn can(&self, capability: Capability) -> bool {
        match capability {
            Capability::Purchase => true,
            Capability::Sell => matches!(self, Role::Teacher | Role::Admin),
            Capability::ManageEvents
            | Capability::ApproveParticipations
            | Capability::ManageRoles => matches!(self, Role::Admin),
        }
    }

    /// Fail with `Forbidden` unless the capability is granted
    pub fn require(&self, capability: Capability) -> MarketResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(MarketError::Forbidden(format!(
                "Role {} cannot perform {:?}",
                self.as_str(),
                capability
            )))
        }
    }
}

/// Admin action audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: i64,
    pub admin_id: String,
    pub action: String,
    pub subject_id: Option<String>,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Role of an account, read through an open connection or transaction
pub async fn role_of(conn: &mut SqliteConnection, account_id: &str) -> MarketResult<Role> {
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM accounts WHERE id = ?1")
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?;

    match role {
        Some(role) => Role::parse(&role),
        None => Err(MarketError::NotFound("Account not found".to_string())),
    }
}

/// Append an audit entry inside the caller's transaction
pub async fn record_audit(
    conn: &mut SqliteConnection,
    admin_id: &str,
    action: &str,
    subject_id: Option<&str>,
    details: Option<&str>,
) -> MarketResult<()> {
    sqlx::query(
        r#"
        INSERT INTO admin_audit_log (admin_id, action, subject_id, details, timestamp)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(admin_id)
    .bind(action)
    .bind(subject_id)
    .bind(details)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Role manager
#[derive(Clone)]
pub struct RoleManager {
    db: SqlitePool,
}

impl RoleManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Get the role of an account
    pub async fn get_role(&self, account_id: &str) -> MarketResult<Role> {
        let mut conn = self.db.acquire().await?;
        role_of(&mut conn, account_id).await
    }

    /// Change the role of an account
    pub async fn set_role(&self, admin_id: &str, account_id: &str, role: Role) -> MarketResult<()> {
        self.get_role(admin_id)
            .await?
            .require(Capability::ManageRoles)?;

        if admin_id == account_id && role != Role::Admin {
            return Err(MarketError::Validation(
                "Admins cannot demote themselves".to_string(),
            ));
        }

        let result = sqlx::query("UPDATE accounts SET role = ?1 WHERE id = ?2")
            .bind(role.as_str())
            .bind(account_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MarketError::NotFound(format!("Account {} not found", account_id)));
        }

        tracing::info!(admin_id, account_id, role = role.as_str(), "Account role changed");
        self.log_action(admin_id, "role.set", Some(account_id), Some(role.as_str()))
            .await?;

        Ok(())
    }

    /// Log admin action to audit log
    pub async fn log_action(
        &self,
        admin_id: &str,
        action: &str,
        subject_id: Option<&str>,
        details: Option<&str>,
    ) -> MarketResult<()> {
        let mut conn = self.db.acquire().await?;
        record_audit(&mut conn, admin_id, action, subject_id, details).await
    }

    /// Most recent audit log entries
    pub async fn list_audit_log(&self, limit: i64) -> MarketResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, admin_id, action, subject_id, details, timestamp
            FROM admin_audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.db)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(AuditLogEntry {
                id: row.try_get("id")?,
                admin_id: row.try_get("admin_id")?,
                action: row.try_get("action")?,
                subject_id: row.try_get("subject_id")?,
                details: row.try_get("details")?,
                timestamp: row.try_get("timestamp")?,
            });
        }

        Ok(entries)
    }
}
