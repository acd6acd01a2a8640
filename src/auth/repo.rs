use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{
    CredentialRow, Credentials, NewUserRecord, User, UserPatch, UserRow,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistent repository of user records.
///
/// Implementations enforce email uniqueness themselves; callers never
/// check-then-insert.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, record: NewUserRecord) -> Result<User, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credentials>, StoreError>;
    async fn find_credentials_by_id(&self, id: Uuid) -> Result<Option<Credentials>, StoreError>;
    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<User, StoreError>;
    async fn list(&self) -> Result<Vec<User>, StoreError>;
}

const USER_COLUMNS: &str = "id, name, email, role, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_err(e: sqlx::Error, what: &'static str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        _ => StoreError::Backend(anyhow::Error::new(e).context(what)),
    }
}

fn into_user(row: UserRow) -> Result<User, StoreError> {
    User::try_from(row).map_err(|e| StoreError::Backend(e.into()))
}

fn into_credentials(row: CredentialRow) -> Result<Credentials, StoreError> {
    Credentials::try_from(row).map_err(|e| StoreError::Backend(e.into()))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, record: NewUserRecord) -> Result<User, StoreError> {
        // Ids come from the app so the schema needs no uuid extension.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(record.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_err(e, "insert user"))?;
        into_user(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        row.map(into_user).transpose()
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credentials>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find credentials by email")?;
        row.map(into_credentials).transpose()
    }

    async fn find_credentials_by_id(&self, id: Uuid) -> Result<Option<Credentials>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find credentials by id")?;
        row.map(into_credentials).transpose()
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<User, StoreError> {
        // COALESCE keeps every column the patch leaves as NULL, the digest included.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET name          = COALESCE($2, name),
                   email         = COALESCE($3, email),
                   role          = COALESCE($4, role),
                   password_hash = COALESCE($5, password_hash)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.email)
        .bind(patch.role.map(|r| r.as_str()))
        .bind(patch.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_err(e, "update user"))?;
        row.map(into_user).transpose()?.ok_or(StoreError::NotFound)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        rows.into_iter().map(into_user).collect()
    }
}
