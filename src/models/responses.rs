use crate::models::{Account, AccountId, FamilyStatus, FamilyType, Gender, Group, Permission, ProfileRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Serialized profile with its owner's names and outgoing interests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileView {
    pub user: AccountId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub photo: Option<String>,
    pub gender: Option<Gender>,
    pub phone_number: String,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    pub father_name: String,
    pub mother_name: String,
    pub siblings: Option<i32>,
    pub family_type: Option<FamilyType>,
    pub family_status: Option<FamilyStatus>,
    pub bio: String,
    pub interests: Vec<AccountId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProfileRecord> for ProfileView {
    fn from(record: ProfileRecord) -> Self {
        let ProfileRecord {
            profile,
            owner,
            interests,
        } = record;

        Self {
            user: profile.account_id,
            username: owner.username,
            email: owner.email,
            first_name: owner.first_name,
            last_name: owner.last_name,
            photo: profile.photo,
            gender: profile.gender,
            phone_number: profile.phone_number,
            height: profile.height,
            weight: profile.weight,
            address_line1: profile.address_line1,
            address_line2: profile.address_line2,
            city: profile.city,
            state: profile.state,
            country: profile.country,
            postal_code: profile.postal_code,
            father_name: profile.father_name,
            mother_name: profile.mother_name,
            siblings: profile.siblings,
            family_type: profile.family_type,
            family_status: profile.family_status,
            bio: profile.bio,
            interests,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionView {
    pub id: i64,
    pub name: String,
    pub content_type: String,
    pub codename: String,
    pub model_name: String,
}

impl From<Permission> for PermissionView {
    fn from(permission: Permission) -> Self {
        let model_name = permission.model_name().to_string();
        Self {
            id: permission.id,
            name: permission.name,
            content_type: permission.content_type,
            codename: permission.codename,
            model_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupView {
    pub id: i64,
    pub name: String,
    pub permissions: Vec<PermissionView>,
}

impl From<Group> for GroupView {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
            permissions: group.permissions.into_iter().map(PermissionView::from).collect(),
        }
    }
}

/// Account representation; groups are nested with their permissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub groups: Vec<GroupView>,
}

impl UserView {
    /// `groups` must be the resolved groups of `account`
    pub fn new(account: Account, groups: Vec<Group>) -> Self {
        Self {
            id: account.id,
            username: account.username,
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
            is_active: account.is_active,
            is_staff: account.is_staff,
            is_superuser: account.is_superuser,
            groups: groups.into_iter().map(GroupView::from).collect(),
        }
    }
}

/// Token plus the serialized caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse<U> {
    pub token: String,
    pub user: U,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleInterestResponse {
    pub is_interested: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageWithUser {
    pub message: String,
    pub user: UserView,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
