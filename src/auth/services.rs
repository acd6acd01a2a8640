use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        password::Hasher,
        repo::UserStore,
        repo_types::{NewUserRecord, Role, User, UserPatch},
    },
    errors::AppError,
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn validate_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::validation("Name cannot be empty"));
    }
    Ok(name.to_string())
}

fn validate_email(raw: &str) -> Result<String, AppError> {
    let email = normalize_email(raw);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Please provide a valid email"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Requested changes to an existing account. `password` is plaintext.
#[derive(Debug, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub password: Option<String>,
}

/// Write path and lookups for user accounts.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    hasher: Hasher,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, hasher: Hasher) -> Self {
        Self { store, hasher }
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let name = validate_name(name)?;
        let email = validate_email(email)?;
        validate_password(password)?;

        let password_hash = self.hasher.hash_blocking(password).await?;
        let user = self
            .store
            .insert(NewUserRecord {
                name,
                email,
                password_hash,
                role: Role::User,
            })
            .await?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Same error for an unknown email and a wrong password.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(email);
        let Some(creds) = self.store.find_credentials_by_email(&email).await? else {
            self.hasher.verify_dummy_blocking(password).await;
            warn!(email = %email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        };

        if !self.hasher.verify_blocking(password, &creds.password_hash).await? {
            warn!(user_id = %creds.user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        info!(user_id = %creds.user.id, "user logged in");
        Ok(creds.user)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.store.find_by_id(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        Ok(self.store.list().await?)
    }

    pub async fn update_details(
        &self,
        id: Uuid,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<User, AppError> {
        self.apply_changes(
            id,
            UserChanges {
                name,
                email,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn change_password(
        &self,
        id: Uuid,
        current: &str,
        new_password: &str,
    ) -> Result<User, AppError> {
        let creds = self
            .store
            .find_credentials_by_id(id)
            .await?
            .ok_or(AppError::UserNotFound)?;
        if !self.hasher.verify_blocking(current, &creds.password_hash).await? {
            warn!(user_id = %id, "password change with wrong current password");
            return Err(AppError::IncorrectPassword);
        }

        let user = self
            .apply_changes(
                id,
                UserChanges {
                    password: Some(new_password.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = %id, "password changed");
        Ok(user)
    }

    pub async fn set_role(&self, id: Uuid, role: Role) -> Result<User, AppError> {
        let user = self
            .apply_changes(
                id,
                UserChanges {
                    role: Some(role),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = %id, role = %role, "role changed");
        Ok(user)
    }

    /// Validates the changes and writes them. The password is hashed here,
    /// right before the write, and only when the change carries one; any
    /// other update leaves the stored digest as it is.
    pub async fn apply_changes(&self, id: Uuid, changes: UserChanges) -> Result<User, AppError> {
        let mut patch = UserPatch {
            name: changes.name.as_deref().map(validate_name).transpose()?,
            email: changes.email.as_deref().map(validate_email).transpose()?,
            role: changes.role,
            password_hash: None,
        };
        if let Some(password) = changes.password.as_deref() {
            validate_password(password)?;
            patch.password_hash = Some(self.hasher.hash_blocking(password).await?);
        }

        if patch.is_empty() {
            return self.get(id).await?.ok_or(AppError::NotFound);
        }
        Ok(self.store.update(id, patch).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{memory::MemoryUserStore, password::test_hasher};

    fn service() -> (UserService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::default());
        let service = UserService::new(store.clone(), test_hasher());
        (service, store)
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("ada@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada example@x.io"));
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[tokio::test]
    async fn register_normalizes_and_hashes() {
        let (svc, store) = service();
        let user = svc
            .register("  Ada ", "Ada@Example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.role, Role::User);

        let digest = store.password_hash(user.id).unwrap();
        assert_ne!(digest, "secret1");
        assert!(digest.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let (svc, _) = service();
        svc.register("Ada", "ada@example.com", "secret1")
            .await
            .unwrap();
        let err = svc
            .register("Other", "ADA@example.com", "secret2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Email already registered"));
    }

    #[tokio::test]
    async fn concurrent_registrations_succeed_once() {
        let (svc, store) = service();
        let (a, b) = tokio::join!(
            svc.register("A", "same@example.com", "secret1"),
            svc.register("B", "Same@Example.com", "secret2"),
        );
        assert!(a.is_ok() ^ b.is_ok());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_validates_fields() {
        let (svc, _) = service();
        assert!(matches!(
            svc.register("", "a@b.io", "secret1").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            svc.register("A", "not-an-email", "secret1").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            svc.register("A", "a@b.io", "short").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn authenticate_does_not_reveal_which_part_failed() {
        let (svc, _) = service();
        svc.register("Ada", "ada@example.com", "secret1")
            .await
            .unwrap();

        let wrong_password = svc
            .authenticate("ada@example.com", "nope-nope")
            .await
            .unwrap_err();
        let unknown_email = svc
            .authenticate("nobody@example.com", "secret1")
            .await
            .unwrap_err();
        assert_eq!(wrong_password.status(), unknown_email.status());
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());

        let ok = svc.authenticate(" ADA@example.com", "secret1").await.unwrap();
        assert_eq!(ok.email, "ada@example.com");
    }

    #[tokio::test]
    async fn updating_name_keeps_password_digest() {
        let (svc, store) = service();
        let user = svc
            .register("Ada", "ada@example.com", "secret1")
            .await
            .unwrap();
        let before = store.password_hash(user.id).unwrap();

        let updated = svc
            .update_details(user.id, Some("Ada Lovelace".into()), None)
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada Lovelace");
        assert_eq!(updated.created_at, user.created_at);
        assert_eq!(store.password_hash(user.id).unwrap(), before);
    }

    #[tokio::test]
    async fn change_password_rehashes_and_requires_current() {
        let (svc, store) = service();
        let user = svc
            .register("Ada", "ada@example.com", "secret1")
            .await
            .unwrap();
        let before = store.password_hash(user.id).unwrap();

        let err = svc
            .change_password(user.id, "wrong-one", "secret2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IncorrectPassword));
        assert_eq!(store.password_hash(user.id).unwrap(), before);

        svc.change_password(user.id, "secret1", "secret2")
            .await
            .unwrap();
        assert_ne!(store.password_hash(user.id).unwrap(), before);
        assert!(svc.authenticate("ada@example.com", "secret1").await.is_err());
        assert!(svc.authenticate("ada@example.com", "secret2").await.is_ok());
    }

    #[tokio::test]
    async fn email_update_respects_uniqueness() {
        let (svc, _) = service();
        svc.register("Ada", "ada@example.com", "secret1")
            .await
            .unwrap();
        let bob = svc
            .register("Bob", "bob@example.com", "secret1")
            .await
            .unwrap();
        let err = svc
            .update_details(bob.id, None, Some("ADA@example.com".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let same = svc
            .update_details(bob.id, None, Some("Bob@Example.com".into()))
            .await
            .unwrap();
        assert_eq!(same.email, "bob@example.com");
    }

    #[tokio::test]
    async fn set_role_on_unknown_user_is_not_found() {
        let (svc, _) = service();
        let err = svc.set_role(Uuid::new_v4(), Role::Admin).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }
}
