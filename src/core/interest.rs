use crate::core::PageWindow;
use crate::models::{AccountId, ProfileRecord};
use crate::services::store::{Listing, ProfileStore, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterestError {
    #[error("profile_id is required")]
    MissingTarget,

    #[error("Target profile not found")]
    TargetNotFound,

    /// The viewer must own a profile before expressing interest
    #[error("You must create a profile before expressing interest")]
    ProfileRequired,

    #[error("You cannot express interest in your own profile")]
    SelfInterest,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub is_interested: bool,
}

impl ToggleOutcome {
    pub fn message(&self) -> &'static str {
        if self.is_interested {
            "Interest expressed"
        } else {
            "Interest removed"
        }
    }
}

/// Flip the viewer→target interest edge.
///
/// Checks run in a fixed order: missing (or zero) target id, unknown target,
/// viewer without a profile, then self-interest. The flip itself is delegated to the
/// store, which serializes concurrent toggles of the same pair.
pub async fn toggle_interest<S: ProfileStore + ?Sized>(
    store: &S,
    viewer: AccountId,
    target: Option<AccountId>,
) -> Result<ToggleOutcome, InterestError> {
    // Zero is never a valid id and is treated like an absent one
    let target = target.filter(|&id| id != 0).ok_or(InterestError::MissingTarget)?;

    if store.get_profile(target).await?.is_none() {
        return Err(InterestError::TargetNotFound);
    }
    if store.get_profile(viewer).await?.is_none() {
        return Err(InterestError::ProfileRequired);
    }
    if viewer == target {
        return Err(InterestError::SelfInterest);
    }

    let is_interested = match store.toggle_interest(viewer, target).await {
        Ok(state) => state,
        // Either side was deleted between the checks and the flip
        Err(StoreError::NotFound(_)) => return Err(InterestError::TargetNotFound),
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        viewer = viewer,
        target = target,
        is_interested = is_interested,
        "Toggled interest"
    );

    Ok(ToggleOutcome { is_interested })
}

/// Profiles the viewer has expressed interest in, newest first.
///
/// A viewer without a profile has no edges and gets an empty listing.
pub async fn my_interests<S: ProfileStore + ?Sized>(
    store: &S,
    viewer: AccountId,
    window: PageWindow,
) -> Result<Listing<ProfileRecord>, InterestError> {
    if store.get_profile(viewer).await?.is_none() {
        return Ok(Listing::empty());
    }
    Ok(store.list_interests(viewer, window).await?)
}
