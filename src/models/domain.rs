use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primary key shared by an account and its profile
pub type AccountId = i64;

/// Profile gender. Matching is strictly opposite-gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            _ => Err(format!("\"{}\" is not a valid gender", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyType {
    Nuclear,
    Joint,
}

impl FamilyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FamilyType::Nuclear => "nuclear",
            FamilyType::Joint => "joint",
        }
    }
}

impl FromStr for FamilyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nuclear" => Ok(FamilyType::Nuclear),
            "joint" => Ok(FamilyType::Joint),
            _ => Err(format!("\"{}\" is not a valid family type", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyStatus {
    MiddleClass,
    UpperMiddleClass,
    Rich,
}

impl FamilyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FamilyStatus::MiddleClass => "middle_class",
            FamilyStatus::UpperMiddleClass => "upper_middle_class",
            FamilyStatus::Rich => "rich",
        }
    }
}

impl FromStr for FamilyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "middle_class" => Ok(FamilyStatus::MiddleClass),
            "upper_middle_class" => Ok(FamilyStatus::UpperMiddleClass),
            "rich" => Ok(FamilyStatus::Rich),
            _ => Err(format!("\"{}\" is not a valid family status", s)),
        }
    }
}

/// Capability of the caller, resolved from the account on every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

/// Registered account (identity store record)
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    /// Bumped whenever previously issued tokens must stop working
    pub token_version: i64,
    pub groups: Vec<i64>,
}

impl Account {
    pub fn role(&self) -> Role {
        if self.is_staff {
            Role::Admin
        } else {
            Role::Member
        }
    }

    pub fn owner(&self) -> Owner {
        Owner {
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

/// Account attributes shown alongside a profile
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Owner {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Matrimony profile, one per account
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub account_id: AccountId,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Blank profile, as created implicitly by `update_me`
    pub fn empty(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            photo: None,
            gender: None,
            phone_number: String::new(),
            height: None,
            weight: None,
            address_line1: String::new(),
            address_line2: String::new(),
            city: String::new(),
            state: String::new(),
            country: String::new(),
            postal_code: String::new(),
            father_name: String::new(),
            mother_name: String::new(),
            siblings: None,
            family_type: None,
            family_status: None,
            bio: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A profile joined with its owner and outgoing interest edges
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    pub profile: Profile,
    pub owner: Owner,
    /// Targets of this profile's interest edges, ascending
    pub interests: Vec<AccountId>,
}

impl ProfileRecord {
    pub fn id(&self) -> AccountId {
        self.profile.account_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub codename: String,
    /// `<app_label>.<model>`
    pub content_type: String,
}

impl Permission {
    pub fn model_name(&self) -> &str {
        self.content_type
            .rsplit_once('.')
            .map(|(_, model)| model)
            .unwrap_or(&self.content_type)
    }
}

/// Group with its permissions resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub permissions: Vec<Permission>,
}
