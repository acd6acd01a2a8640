use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::{Credentials, NewUserRecord, User, UserPatch};

/// In-process store; one lock makes the email check and the write atomic.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<Credentials>>,
}

impl MemoryUserStore {
    pub fn password_hash(&self, id: Uuid) -> Option<String> {
        self.rows
            .lock()
            .expect("store lock")
            .iter()
            .find(|c| c.user.id == id)
            .map(|c| c.password_hash.clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, record: NewUserRecord) -> Result<User, StoreError> {
        let mut rows = self.rows.lock().expect("store lock");
        if rows.iter().any(|c| c.user.email == record.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: record.name,
            email: record.email,
            role: record.role,
            created_at: OffsetDateTime::now_utc(),
        };
        rows.push(Credentials {
            user: user.clone(),
            password_hash: record.password_hash,
        });
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.find_credentials_by_id(id).await?.map(|c| c.user))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credentials>, StoreError> {
        let rows = self.rows.lock().expect("store lock");
        Ok(rows.iter().find(|c| c.user.email == email).cloned())
    }

    async fn find_credentials_by_id(&self, id: Uuid) -> Result<Option<Credentials>, StoreError> {
        let rows = self.rows.lock().expect("store lock");
        Ok(rows.iter().find(|c| c.user.id == id).cloned())
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<User, StoreError> {
        let mut rows = self.rows.lock().expect("store lock");
        if let Some(email) = &patch.email {
            if rows.iter().any(|c| c.user.id != id && &c.user.email == email) {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let row = rows
            .iter_mut()
            .find(|c| c.user.id == id)
            .ok_or(StoreError::NotFound)?;
        if let Some(name) = patch.name {
            row.user.name = name;
        }
        if let Some(email) = patch.email {
            row.user.email = email;
        }
        if let Some(role) = patch.role {
            row.user.role = role;
        }
        if let Some(hash) = patch.password_hash {
            row.password_hash = hash;
        }
        Ok(row.user.clone())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = self.rows.lock().expect("store lock");
        Ok(rows.iter().map(|c| c.user.clone()).collect())
    }
}
