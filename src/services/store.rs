use crate::core::{DiscoveryScope, PageWindow, ProfileFilter};
use crate::models::{
    Account, AccountId, FamilyStatus, FamilyType, Gender, Group, Permission, Profile, ProfileRecord,
};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness rule was violated (username, group name, existing profile)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another account already uses this email
    #[error("Email already exists")]
    EmailTaken,

    #[error("Corrupt row: {0}")]
    InvalidData(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A page of rows plus the total number of matching rows
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Listing<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// Allow-listed profile mutations. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub photo: Option<Option<String>>,
    pub gender: Option<Gender>,
    pub phone_number: Option<String>,
    pub height: Option<Option<f64>>,
    pub weight: Option<Option<f64>>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub siblings: Option<Option<i32>>,
    pub family_type: Option<Option<FamilyType>>,
    pub family_status: Option<Option<FamilyStatus>>,
    pub bio: Option<String>,
}

fn assign<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

impl ProfileChanges {
    /// Merge into `profile`. Timestamps are the store's business.
    pub fn apply(&self, profile: &mut Profile) {
        assign(&mut profile.photo, &self.photo);
        if let Some(gender) = self.gender {
            profile.gender = Some(gender);
        }
        assign(&mut profile.phone_number, &self.phone_number);
        assign(&mut profile.height, &self.height);
        assign(&mut profile.weight, &self.weight);
        assign(&mut profile.address_line1, &self.address_line1);
        assign(&mut profile.address_line2, &self.address_line2);
        assign(&mut profile.city, &self.city);
        assign(&mut profile.state, &self.state);
        assign(&mut profile.country, &self.country);
        assign(&mut profile.postal_code, &self.postal_code);
        assign(&mut profile.father_name, &self.father_name);
        assign(&mut profile.mother_name, &self.mother_name);
        assign(&mut profile.siblings, &self.siblings);
        assign(&mut profile.family_type, &self.family_type);
        assign(&mut profile.family_status, &self.family_status);
        assign(&mut profile.bio, &self.bio);
    }
}

/// Allow-listed account mutations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Setting a password revokes every token issued before
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
    pub group_ids: Option<Vec<i64>>,
}

impl AccountChanges {
    pub fn apply(&self, account: &mut Account) {
        assign(&mut account.username, &self.username);
        assign(&mut account.email, &self.email);
        assign(&mut account.first_name, &self.first_name);
        assign(&mut account.last_name, &self.last_name);
        if let Some(hash) = &self.password_hash {
            account.password_hash = hash.clone();
            account.token_version += 1;
        }
        assign(&mut account.is_active, &self.is_active);
        assign(&mut account.is_staff, &self.is_staff);
        assign(&mut account.is_superuser, &self.is_superuser);
        if let Some(ids) = &self.group_ids {
            let mut ids = ids.clone();
            ids.sort_unstable();
            ids.dedup();
            account.groups = ids;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub group_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGroup {
    pub name: String,
    pub permission_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupChanges {
    pub name: Option<String>,
    pub permission_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPermission {
    pub name: String,
    pub codename: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermissionChanges {
    pub name: Option<String>,
    pub codename: Option<String>,
    pub content_type: Option<String>,
}

/// Profiles and the directed interest relation between them
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: AccountId) -> StoreResult<Option<ProfileRecord>>;

    /// Profiles admitted by `scope` and `filter`, in the filter's ordering
    async fn list_profiles(
        &self,
        scope: &DiscoveryScope,
        filter: &ProfileFilter,
        window: PageWindow,
    ) -> StoreResult<Listing<ProfileRecord>>;

    async fn has_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool>;

    /// Returns `true` when the edge was inserted, `false` when it already existed
    async fn add_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool>;

    /// Returns `true` when an edge was removed; removing a missing edge is not an error
    async fn remove_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool>;

    /// Flip the source→target edge atomically and return whether it now exists.
    ///
    /// Implementations must serialize concurrent toggles of the same pair.
    async fn toggle_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool>;

    /// Targets of `source`'s edges, newest profile first
    async fn list_interests(&self, source: AccountId, window: PageWindow) -> StoreResult<Listing<ProfileRecord>>;

    /// Create a profile for an existing account; `Conflict` if one exists
    async fn create_profile(&self, id: AccountId, changes: &ProfileChanges) -> StoreResult<ProfileRecord>;

    /// Update an existing profile; `NotFound` if there is none
    async fn update_profile(&self, id: AccountId, changes: &ProfileChanges) -> StoreResult<ProfileRecord>;

    /// Apply account and profile changes in one atomic step, creating the
    /// profile if absent. An email owned by another account is a `Conflict`
    /// and leaves both records untouched.
    async fn upsert_own_profile(
        &self,
        id: AccountId,
        account: &AccountChanges,
        profile: &ProfileChanges,
    ) -> StoreResult<ProfileRecord>;

    /// Delete a profile and every edge touching it
    async fn delete_profile(&self, id: AccountId) -> StoreResult<bool>;
}

/// Accounts, groups and permissions
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Create an account, and its profile when `profile` is given, atomically
    async fn create_account(&self, account: NewAccount, profile: Option<ProfileChanges>) -> StoreResult<Account>;

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Look up by email first, then by username
    async fn find_account_by_login(&self, login: &str) -> StoreResult<Option<Account>>;

    async fn email_taken(&self, email: &str, except: Option<AccountId>) -> StoreResult<bool>;

    async fn username_taken(&self, username: &str) -> StoreResult<bool>;

    /// Newest accounts first
    async fn list_accounts(&self, window: PageWindow) -> StoreResult<Listing<Account>>;

    async fn update_account(&self, id: AccountId, changes: &AccountChanges) -> StoreResult<Account>;

    /// Delete an account together with its profile and edges
    async fn delete_account(&self, id: AccountId) -> StoreResult<bool>;

    /// Add memberships, returning how many were new
    async fn add_account_groups(&self, id: AccountId, group_ids: &[i64]) -> StoreResult<usize>;

    /// Remove memberships, returning how many existed
    async fn remove_account_groups(&self, id: AccountId, group_ids: &[i64]) -> StoreResult<usize>;

    /// Ids among `ids` with no matching group
    async fn missing_groups(&self, ids: &[i64]) -> StoreResult<Vec<i64>>;

    async fn groups_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Group>>;

    /// Groups ordered by name
    async fn list_groups(&self, window: PageWindow) -> StoreResult<Listing<Group>>;

    async fn get_group(&self, id: i64) -> StoreResult<Option<Group>>;

    async fn create_group(&self, group: NewGroup) -> StoreResult<Group>;

    async fn update_group(&self, id: i64, changes: &GroupChanges) -> StoreResult<Group>;

    async fn delete_group(&self, id: i64) -> StoreResult<bool>;

    /// Permissions ordered by id
    async fn list_permissions(&self, window: PageWindow) -> StoreResult<Listing<Permission>>;

    async fn get_permission(&self, id: i64) -> StoreResult<Option<Permission>>;

    async fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission>;

    async fn update_permission(&self, id: i64, changes: &PermissionChanges) -> StoreResult<Permission>;

    async fn delete_permission(&self, id: i64) -> StoreResult<bool>;

    async fn health_check(&self) -> StoreResult<bool>;
}

/// Everything the HTTP layer needs from persistence
pub trait Store: ProfileStore + IdentityStore {}

impl<T: ProfileStore + IdentityStore> Store for T {}
