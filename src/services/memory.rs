use crate::core::{compare_records, matches_filter, DiscoveryScope, PageWindow, ProfileFilter, ProfileOrdering};
use crate::models::{Account, AccountId, Group, Permission, Profile, ProfileRecord};
use crate::services::store::{
    AccountChanges, GroupChanges, IdentityStore, Listing, NewAccount, NewGroup, NewPermission,
    PermissionChanges, ProfileChanges, ProfileStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct GroupRow {
    name: String,
    permissions: BTreeSet<i64>,
}

#[derive(Debug, Default)]
struct State {
    next_account_id: AccountId,
    next_group_id: i64,
    next_permission_id: i64,
    accounts: BTreeMap<AccountId, Account>,
    profiles: BTreeMap<AccountId, Profile>,
    /// (source, target) interest edges
    interests: BTreeSet<(AccountId, AccountId)>,
    groups: BTreeMap<i64, GroupRow>,
    permissions: BTreeMap<i64, Permission>,
}

impl State {
    fn record(&self, id: AccountId) -> Option<ProfileRecord> {
        let profile = self.profiles.get(&id)?;
        let owner = self.accounts.get(&id).map(Account::owner).unwrap_or_default();
        let interests = self
            .interests
            .range((id, AccountId::MIN)..=(id, AccountId::MAX))
            .map(|(_, target)| *target)
            .collect();

        Some(ProfileRecord {
            profile: profile.clone(),
            owner,
            interests,
        })
    }

    fn email_taken(&self, email: &str, except: Option<AccountId>) -> bool {
        !email.is_empty()
            && self
                .accounts
                .values()
                .any(|a| a.email == email && Some(a.id) != except)
    }

    fn username_taken(&self, username: &str, except: Option<AccountId>) -> bool {
        self.accounts
            .values()
            .any(|a| a.username == username && Some(a.id) != except)
    }

    fn group(&self, id: i64) -> Option<Group> {
        let row = self.groups.get(&id)?;
        Some(Group {
            id,
            name: row.name.clone(),
            permissions: row
                .permissions
                .iter()
                .filter_map(|pid| self.permissions.get(pid).cloned())
                .collect(),
        })
    }

    fn group_name_taken(&self, name: &str, except: Option<i64>) -> bool {
        self.groups
            .iter()
            .any(|(id, row)| row.name == name && Some(*id) != except)
    }

    fn drop_profile(&mut self, id: AccountId) -> bool {
        self.interests.retain(|(source, target)| *source != id && *target != id);
        self.profiles.remove(&id).is_some()
    }

    fn check_groups(&self, ids: &[i64]) -> StoreResult<()> {
        match ids.iter().find(|id| !self.groups.contains_key(id)) {
            Some(id) => Err(StoreError::NotFound(format!("group {}", id))),
            None => Ok(()),
        }
    }

    fn check_permissions(&self, ids: &[i64]) -> StoreResult<()> {
        match ids.iter().find(|id| !self.permissions.contains_key(id)) {
            Some(id) => Err(StoreError::NotFound(format!("permission {}", id))),
            None => Ok(()),
        }
    }
}

fn page<T: Clone>(items: &[T], window: PageWindow) -> Vec<T> {
    items
        .iter()
        .skip(window.offset as usize)
        .take(window.limit as usize)
        .cloned()
        .collect()
}

/// Process-local store
///
/// Every operation runs under a single lock, so check-then-write sequences
/// such as the interest toggle are serialized.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, id: AccountId) -> StoreResult<Option<ProfileRecord>> {
        Ok(self.state.read().await.record(id))
    }

    async fn list_profiles(
        &self,
        scope: &DiscoveryScope,
        filter: &ProfileFilter,
        window: PageWindow,
    ) -> StoreResult<Listing<ProfileRecord>> {
        let state = self.state.read().await;

        let mut matching: Vec<ProfileRecord> = state
            .profiles
            .values()
            .filter(|profile| scope.admits(profile))
            .filter_map(|profile| state.record(profile.account_id))
            .filter(|record| matches_filter(record, filter))
            .collect();
        matching.sort_by(|a, b| compare_records(a, b, &filter.ordering));

        Ok(Listing {
            total: matching.len() as u64,
            items: page(&matching, window),
        })
    }

    async fn has_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool> {
        Ok(self.state.read().await.interests.contains(&(source, target)))
    }

    async fn add_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if source == target {
            return Err(StoreError::Conflict("self-interest".to_string()));
        }
        if !state.profiles.contains_key(&source) || !state.profiles.contains_key(&target) {
            return Err(StoreError::NotFound(format!("profile {} or {}", source, target)));
        }
        Ok(state.interests.insert((source, target)))
    }

    async fn remove_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool> {
        Ok(self.state.write().await.interests.remove(&(source, target)))
    }

    async fn toggle_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if !state.profiles.contains_key(&source) {
            return Err(StoreError::NotFound(format!("profile {}", source)));
        }
        if !state.profiles.contains_key(&target) {
            return Err(StoreError::NotFound(format!("profile {}", target)));
        }
        if source == target {
            return Err(StoreError::Conflict("self-interest".to_string()));
        }

        if state.interests.remove(&(source, target)) {
            Ok(false)
        } else {
            state.interests.insert((source, target));
            Ok(true)
        }
    }

    async fn list_interests(&self, source: AccountId, window: PageWindow) -> StoreResult<Listing<ProfileRecord>> {
        let state = self.state.read().await;

        let mut targets: Vec<ProfileRecord> = state
            .interests
            .range((source, AccountId::MIN)..=(source, AccountId::MAX))
            .filter_map(|(_, target)| state.record(*target))
            .collect();
        targets.sort_by(|a, b| compare_records(a, b, &ProfileOrdering::default()));

        Ok(Listing {
            total: targets.len() as u64,
            items: page(&targets, window),
        })
    }

    async fn create_profile(&self, id: AccountId, changes: &ProfileChanges) -> StoreResult<ProfileRecord> {
        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&id) {
            return Err(StoreError::NotFound(format!("account {}", id)));
        }
        if state.profiles.contains_key(&id) {
            return Err(StoreError::Conflict("Profile already exists".to_string()));
        }

        let mut profile = Profile::empty(id, Utc::now());
        changes.apply(&mut profile);
        state.profiles.insert(id, profile);

        state
            .record(id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))
    }

    async fn update_profile(&self, id: AccountId, changes: &ProfileChanges) -> StoreResult<ProfileRecord> {
        let mut state = self.state.write().await;
        let profile = state
            .profiles
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))?;
        changes.apply(profile);
        profile.updated_at = Utc::now();

        state
            .record(id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))
    }

    async fn upsert_own_profile(
        &self,
        id: AccountId,
        account: &AccountChanges,
        profile: &ProfileChanges,
    ) -> StoreResult<ProfileRecord> {
        let mut state = self.state.write().await;

        // All checks happen before the first write
        let mut updated_account = state
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("account {}", id)))?;
        if let Some(email) = &account.email {
            if state.email_taken(email, Some(id)) {
                return Err(StoreError::EmailTaken);
            }
        }

        let now = Utc::now();
        let mut updated_profile = state
            .profiles
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Profile::empty(id, now));

        account.apply(&mut updated_account);
        profile.apply(&mut updated_profile);
        updated_profile.updated_at = now;

        state.accounts.insert(id, updated_account);
        state.profiles.insert(id, updated_profile);

        state
            .record(id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))
    }

    async fn delete_profile(&self, id: AccountId) -> StoreResult<bool> {
        Ok(self.state.write().await.drop_profile(id))
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_account(&self, new: NewAccount, profile: Option<ProfileChanges>) -> StoreResult<Account> {
        let mut state = self.state.write().await;

        if state.email_taken(&new.email, None) {
            return Err(StoreError::EmailTaken);
        }
        if state.username_taken(&new.username, None) {
            return Err(StoreError::Conflict("Username already exists".to_string()));
        }
        state.check_groups(&new.group_ids)?;

        state.next_account_id += 1;
        let id = state.next_account_id;
        let now = Utc::now();

        let mut groups = new.group_ids;
        groups.sort_unstable();
        groups.dedup();

        let account = Account {
            id,
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            is_active: new.is_active,
            is_staff: new.is_staff,
            is_superuser: new.is_superuser,
            date_joined: now,
            token_version: 0,
            groups,
        };
        state.accounts.insert(id, account.clone());

        if let Some(changes) = profile {
            let mut row = Profile::empty(id, now);
            changes.apply(&mut row);
            state.profiles.insert(id, row);
        }

        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_login(&self, login: &str) -> StoreResult<Option<Account>> {
        let state = self.state.read().await;
        let by_email = state
            .accounts
            .values()
            .find(|a| !login.is_empty() && a.email == login);
        let by_username = || state.accounts.values().find(|a| a.username == login);

        Ok(by_email.or_else(by_username).cloned())
    }

    async fn email_taken(&self, email: &str, except: Option<AccountId>) -> StoreResult<bool> {
        Ok(self.state.read().await.email_taken(email, except))
    }

    async fn username_taken(&self, username: &str) -> StoreResult<bool> {
        Ok(self.state.read().await.username_taken(username, None))
    }

    async fn list_accounts(&self, window: PageWindow) -> StoreResult<Listing<Account>> {
        let state = self.state.read().await;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| b.date_joined.cmp(&a.date_joined).then_with(|| b.id.cmp(&a.id)));

        Ok(Listing {
            total: accounts.len() as u64,
            items: page(&accounts, window),
        })
    }

    async fn update_account(&self, id: AccountId, changes: &AccountChanges) -> StoreResult<Account> {
        let mut state = self.state.write().await;

        let mut account = state
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("account {}", id)))?;
        if let Some(email) = &changes.email {
            if state.email_taken(email, Some(id)) {
                return Err(StoreError::EmailTaken);
            }
        }
        if let Some(username) = &changes.username {
            if state.username_taken(username, Some(id)) {
                return Err(StoreError::Conflict("Username already exists".to_string()));
            }
        }
        if let Some(ids) = &changes.group_ids {
            state.check_groups(ids)?;
        }

        changes.apply(&mut account);
        state.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn delete_account(&self, id: AccountId) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        state.drop_profile(id);
        Ok(state.accounts.remove(&id).is_some())
    }

    async fn add_account_groups(&self, id: AccountId, group_ids: &[i64]) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        state.check_groups(group_ids)?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", id)))?;

        let mut added = 0;
        for gid in group_ids {
            if !account.groups.contains(gid) {
                account.groups.push(*gid);
                added += 1;
            }
        }
        account.groups.sort_unstable();
        Ok(added)
    }

    async fn remove_account_groups(&self, id: AccountId, group_ids: &[i64]) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", id)))?;

        let before = account.groups.len();
        account.groups.retain(|gid| !group_ids.contains(gid));
        Ok(before - account.groups.len())
    }

    async fn missing_groups(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let state = self.state.read().await;
        let missing: BTreeSet<i64> = ids
            .iter()
            .copied()
            .filter(|id| !state.groups.contains_key(id))
            .collect();
        Ok(missing.into_iter().collect())
    }

    async fn groups_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Group>> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = ids.iter().filter_map(|id| state.group(*id)).collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        groups.dedup_by_key(|g| g.id);
        Ok(groups)
    }

    async fn list_groups(&self, window: PageWindow) -> StoreResult<Listing<Group>> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state.groups.keys().filter_map(|id| state.group(*id)).collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Listing {
            total: groups.len() as u64,
            items: page(&groups, window),
        })
    }

    async fn get_group(&self, id: i64) -> StoreResult<Option<Group>> {
        Ok(self.state.read().await.group(id))
    }

    async fn create_group(&self, group: NewGroup) -> StoreResult<Group> {
        let mut state = self.state.write().await;
        if state.group_name_taken(&group.name, None) {
            return Err(StoreError::Conflict("group with this name already exists".to_string()));
        }
        state.check_permissions(&group.permission_ids)?;

        state.next_group_id += 1;
        let id = state.next_group_id;
        state.groups.insert(
            id,
            GroupRow {
                name: group.name,
                permissions: group.permission_ids.into_iter().collect(),
            },
        );

        state
            .group(id)
            .ok_or_else(|| StoreError::NotFound(format!("group {}", id)))
    }

    async fn update_group(&self, id: i64, changes: &GroupChanges) -> StoreResult<Group> {
        let mut state = self.state.write().await;
        if let Some(name) = &changes.name {
            if state.group_name_taken(name, Some(id)) {
                return Err(StoreError::Conflict("group with this name already exists".to_string()));
            }
        }
        if let Some(ids) = &changes.permission_ids {
            state.check_permissions(ids)?;
        }

        let row = state
            .groups
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("group {}", id)))?;
        if let Some(name) = &changes.name {
            row.name = name.clone();
        }
        if let Some(ids) = &changes.permission_ids {
            row.permissions = ids.iter().copied().collect();
        }

        state
            .group(id)
            .ok_or_else(|| StoreError::NotFound(format!("group {}", id)))
    }

    async fn delete_group(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        for account in state.accounts.values_mut() {
            account.groups.retain(|gid| *gid != id);
        }
        Ok(state.groups.remove(&id).is_some())
    }

    async fn list_permissions(&self, window: PageWindow) -> StoreResult<Listing<Permission>> {
        let state = self.state.read().await;
        let permissions: Vec<Permission> = state.permissions.values().cloned().collect();

        Ok(Listing {
            total: permissions.len() as u64,
            items: page(&permissions, window),
        })
    }

    async fn get_permission(&self, id: i64) -> StoreResult<Option<Permission>> {
        Ok(self.state.read().await.permissions.get(&id).cloned())
    }

    async fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission> {
        let mut state = self.state.write().await;
        let duplicate = state
            .permissions
            .values()
            .any(|p| p.codename == permission.codename && p.content_type == permission.content_type);
        if duplicate {
            return Err(StoreError::Conflict(
                "permission with this content type and codename already exists".to_string(),
            ));
        }

        state.next_permission_id += 1;
        let created = Permission {
            id: state.next_permission_id,
            name: permission.name,
            codename: permission.codename,
            content_type: permission.content_type,
        };
        state.permissions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_permission(&self, id: i64, changes: &PermissionChanges) -> StoreResult<Permission> {
        let mut state = self.state.write().await;
        let mut updated = state
            .permissions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("permission {}", id)))?;
        assign_text(&mut updated.name, &changes.name);
        assign_text(&mut updated.codename, &changes.codename);
        assign_text(&mut updated.content_type, &changes.content_type);

        let duplicate = state.permissions.values().any(|p| {
            p.id != id && p.codename == updated.codename && p.content_type == updated.content_type
        });
        if duplicate {
            return Err(StoreError::Conflict(
                "permission with this content type and codename already exists".to_string(),
            ));
        }

        state.permissions.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_permission(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        for row in state.groups.values_mut() {
            row.permissions.remove(&id);
        }
        Ok(state.permissions.remove(&id).is_some())
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }
}

fn assign_text(target: &mut String, value: &Option<String>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}
