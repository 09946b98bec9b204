use crate::models::{Account, AccountId, Gender, ProfileRecord};
use crate::services::store::{AccountChanges, IdentityStore, NewAccount, ProfileChanges, ProfileStore, StoreError};
use thiserror::Error;

/// How `update_me` treats omitted fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// PATCH: every field is optional
    Partial,
    /// POST/PUT: `gender` and `phone_number` must be supplied
    Full,
}

/// Validated account and profile changes for one `update_me` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub account: AccountChanges,
    pub profile: ProfileChanges,
}

impl ProfileUpdate {
    /// Fields a full update requires but the body left out
    pub fn missing_for(&self, mode: UpdateMode) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if mode == UpdateMode::Full {
            if self.profile.gender.is_none() {
                missing.push("gender");
            }
            if self.profile.phone_number.is_none() {
                missing.push("phone_number");
            }
        }
        missing
    }
}

#[derive(Debug, Error)]
pub enum ProfileUpdateError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Email already exists")]
    EmailTaken,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Apply the caller's account and profile changes atomically, creating the
/// profile when absent. Nothing is written when the email collides.
pub async fn update_me<S: ProfileStore + ?Sized>(
    store: &S,
    viewer: AccountId,
    update: &ProfileUpdate,
    mode: UpdateMode,
) -> Result<ProfileRecord, ProfileUpdateError> {
    let missing = update.missing_for(mode);
    if !missing.is_empty() {
        return Err(ProfileUpdateError::MissingFields(missing));
    }

    match store.upsert_own_profile(viewer, &update.account, &update.profile).await {
        Ok(record) => {
            tracing::info!(account_id = viewer, ?mode, "Updated own profile");
            Ok(record)
        }
        Err(StoreError::EmailTaken) => {
            tracing::info!(account_id = viewer, "Rejected profile update: email already exists");
            Err(ProfileUpdateError::EmailTaken)
        }
        Err(e) => Err(e.into()),
    }
}

/// New account plus the profile seeded from the registration form
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub gender: Gender,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Email already exists")]
    EmailTaken,

    #[error("Registration failed")]
    Failed(#[source] StoreError),
}

/// Pick a username for `email`: the email itself, or `<local>_<6 hex>` when taken
pub async fn available_username<S: IdentityStore + ?Sized>(store: &S, email: &str) -> Result<String, StoreError> {
    if !store.username_taken(email).await? {
        return Ok(email.to_string());
    }

    let local = email.split('@').next().unwrap_or(email);
    loop {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let candidate = format!("{}_{}", local, &suffix[..6]);
        if !store.username_taken(&candidate).await? {
            return Ok(candidate);
        }
    }
}

/// Create the account and its profile in one step
pub async fn register<S: IdentityStore + ?Sized>(
    store: &S,
    registration: Registration,
) -> Result<Account, RegistrationError> {
    let taken = store
        .email_taken(&registration.email, None)
        .await
        .map_err(RegistrationError::Failed)?;
    if taken {
        return Err(RegistrationError::EmailTaken);
    }

    let username = available_username(store, &registration.email)
        .await
        .map_err(RegistrationError::Failed)?;

    let email = registration.email.clone();
    let account = NewAccount {
        username,
        email: registration.email,
        password_hash: registration.password_hash,
        first_name: registration.first_name,
        last_name: registration.last_name,
        is_active: true,
        is_staff: false,
        is_superuser: false,
        group_ids: Vec::new(),
    };
    let profile = ProfileChanges {
        gender: Some(registration.gender),
        phone_number: Some(registration.phone_number),
        ..Default::default()
    };

    match store.create_account(account, Some(profile)).await {
        Ok(account) => {
            tracing::info!(account_id = account.id, username = %account.username, "Registered account");
            Ok(account)
        }
        Err(StoreError::EmailTaken) => Err(RegistrationError::EmailTaken),
        Err(StoreError::Conflict(msg)) => {
            // A concurrent registration may trip the username index first
            if store.email_taken(&email, None).await.unwrap_or(false) {
                tracing::info!("Registration lost a race for {}: {}", email, msg);
                return Err(RegistrationError::EmailTaken);
            }
            tracing::error!("Registration failed: {}", msg);
            Err(RegistrationError::Failed(StoreError::Conflict(msg)))
        }
        Err(e) => {
            tracing::error!("Registration failed: {}", e);
            Err(RegistrationError::Failed(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryStore;
    use std::sync::Arc;
    use tokio::sync::Barrier;

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password_hash: "!".to_string(),
            first_name: "Asha".to_string(),
            last_name: "Rao".to_string(),
            phone_number: "+919876543210".to_string(),
            gender: Gender::Female,
        }
    }

    #[test]
    fn test_full_update_requires_gender_and_phone() {
        let update = ProfileUpdate::default();
        assert_eq!(update.missing_for(UpdateMode::Full), vec!["gender", "phone_number"]);
        assert!(update.missing_for(UpdateMode::Partial).is_empty());
    }

    #[tokio::test]
    async fn test_register_creates_profile() {
        let store = MemoryStore::new();
        let account = register(&store, registration("a@x.com")).await.unwrap();

        assert_eq!(account.username, "a@x.com");
        let record = store.get_profile(account.id).await.unwrap().unwrap();
        assert_eq!(record.profile.gender, Some(Gender::Female));
        assert_eq!(record.profile.phone_number, "+919876543210");
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let store = MemoryStore::new();
        register(&store, registration("a@x.com")).await.unwrap();

        assert!(matches!(
            register(&store, registration("a@x.com")).await,
            Err(RegistrationError::EmailTaken)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_registrations_of_one_email() {
        let store = Arc::new(MemoryStore::new());
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    register(store.as_ref(), registration("race@x.com")).await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert!(matches!(err, RegistrationError::EmailTaken), "{}", err),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_username_suffix_when_taken() {
        let store = MemoryStore::new();
        let account = register(&store, registration("other@x.com")).await.unwrap();
        store
            .update_account(
                account.id,
                &AccountChanges {
                    username: Some("a@x.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let username = available_username(&store, "a@x.com").await.unwrap();
        assert!(username.starts_with("a_"));
        assert_eq!(username.len(), "a_".len() + 6);
    }

    #[tokio::test]
    async fn test_full_update_rejects_before_writing() {
        let store = MemoryStore::new();
        let account = register(&store, registration("a@x.com")).await.unwrap();

        let update = ProfileUpdate {
            profile: ProfileChanges {
                city: Some("Pune".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = update_me(&store, account.id, &update, UpdateMode::Full).await;

        assert!(matches!(result, Err(ProfileUpdateError::MissingFields(_))));
        let record = store.get_profile(account.id).await.unwrap().unwrap();
        assert_eq!(record.profile.city, "");
    }
}
