/// Identity database operations
use super::IdentityStore;
use crate::error::{IdentityError, Result};
use crate::models::{Identity, NewIdentity, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const IDENTITY_COLUMNS: &str = "id, email, phone_number, password_hash, role, display_name, \
     email_verified, phone_verified, created_at, updated_at, deleted_at";

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    email: Option<String>,
    phone_number: Option<String>,
    password_hash: Option<String>,
    role: String,
    display_name: Option<String>,
    email_verified: bool,
    phone_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = IdentityError;

    fn try_from(row: IdentityRow) -> Result<Self> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e: String| IdentityError::Database(e))?;

        Ok(Identity {
            id: row.id,
            email: row.email,
            phone_number: row.phone_number,
            password_hash: row.password_hash,
            role,
            display_name: row.display_name,
            email_verified: row.email_verified,
            phone_verified: row.phone_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Postgres identity store
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Identity>> {
        let sql = format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE {column} = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn set_flag(&self, id: Uuid, column: &str) -> Result<()> {
        let sql = format!(
            "UPDATE identities SET {column} = TRUE, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL"
        );
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>> {
        let sql =
            format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        self.find_one("email", email).await
    }

    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Identity>> {
        self.find_one("phone_number", phone_number).await
    }

    async fn create(&self, identity: NewIdentity) -> Result<Identity> {
        let sql = format!(
            r#"
            INSERT INTO identities (id, email, phone_number, password_hash, role, display_name,
                                    email_verified, phone_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, FALSE, NOW(), NOW())
            RETURNING {IDENTITY_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&identity.email)
            .bind(&identity.phone_number)
            .bind(&identity.password_hash)
            .bind(identity.role.as_str())
            .bind(&identity.display_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    IdentityError::AlreadyExists
                }
                _ => IdentityError::from(e),
            })?;

        Identity::try_from(row)
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<()> {
        self.set_flag(id, "email_verified").await
    }

    async fn mark_phone_verified(&self, id: Uuid) -> Result<()> {
        self.set_flag(id, "phone_verified").await
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<Identity> {
        let sql = format!(
            "UPDATE identities SET role = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {IDENTITY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(IdentityError::NotFound)?;

        Identity::try_from(row)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE identities SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::NotFound);
        }
        Ok(())
    }
}
