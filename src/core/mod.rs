// Core domain exports
pub mod discovery;
pub mod filters;
pub mod interest;
pub mod pagination;
pub mod profile;

pub use discovery::{DiscoveryScope, MissingProfilePolicy, Viewer};
pub use filters::{compare_records, matches_filter, OrderField, ProfileFilter, ProfileOrdering};
pub use interest::{my_interests, toggle_interest, InterestError, ToggleOutcome};
pub use pagination::{total_pages, PageLimits, PageLinks, PageRequest, PageWindow, Paginated};
pub use profile::{
    available_username, register, update_me, ProfileUpdate, ProfileUpdateError, Registration, RegistrationError,
    UpdateMode,
};
