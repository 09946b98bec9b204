use crate::models::{AccountId, Gender, Profile, Role};
use serde::Deserialize;

/// What a viewer without a profile gets to browse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingProfilePolicy {
    /// Only the (vacuous) self-exclusion applies
    #[default]
    Unfiltered,
    /// Nothing is visible until the viewer has a profile
    Empty,
}

/// The caller as seen by the discovery filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub account_id: AccountId,
    pub role: Role,
    /// `None` when the viewer has no profile yet
    pub profile_gender: Option<Option<Gender>>,
}

impl Viewer {
    pub fn has_profile(&self) -> bool {
        self.profile_gender.is_some()
    }
}

/// Candidate set a viewer is allowed to see, before any narrowing filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryScope {
    /// Administrators see every profile
    All,
    Nothing,
    Excluding {
        account_id: AccountId,
        gender: Option<Gender>,
    },
}

impl DiscoveryScope {
    /// Build the scope for a viewer
    ///
    /// Rules, in order:
    /// 1. the viewer's own profile is excluded
    /// 2. if the viewer's gender is known, every profile of that gender is excluded
    ///
    /// Admins bypass both rules.
    pub fn for_viewer(viewer: &Viewer, policy: MissingProfilePolicy) -> Self {
        if viewer.role == Role::Admin {
            return DiscoveryScope::All;
        }

        match viewer.profile_gender {
            Some(gender) => DiscoveryScope::Excluding {
                account_id: viewer.account_id,
                gender,
            },
            None => match policy {
                MissingProfilePolicy::Unfiltered => DiscoveryScope::Excluding {
                    account_id: viewer.account_id,
                    gender: None,
                },
                MissingProfilePolicy::Empty => DiscoveryScope::Nothing,
            },
        }
    }

    #[inline]
    pub fn admits(&self, profile: &Profile) -> bool {
        match self {
            DiscoveryScope::All => true,
            DiscoveryScope::Nothing => false,
            DiscoveryScope::Excluding { account_id, gender } => {
                if profile.account_id == *account_id {
                    return false;
                }
                match gender {
                    Some(g) => profile.gender != Some(*g),
                    None => true,
                }
            }
        }
    }
}
