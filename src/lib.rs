//! Matrimony - profile discovery and interest service
//!
//! Accounts register with a profile, browse opposite-gender profiles through
//! the discovery filter, and flag interest in each other. Persistence sits
//! behind the [`services::Store`] traits with PostgreSQL and in-memory
//! implementations.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{DiscoveryScope, MissingProfilePolicy, PageLimits, ProfileFilter, Viewer};
pub use error::ApiError;
pub use models::{Account, Gender, Profile, ProfileRecord, Role};
pub use routes::{configure_routes, AppState};
pub use services::{MemoryStore, PostgresStore, Store};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let viewer = Viewer {
            account_id: 1,
            role: Role::Member,
            profile_gender: Some(Some(Gender::Male)),
        };
        let admin = Viewer {
            role: Role::Admin,
            ..viewer
        };

        let policy = MissingProfilePolicy::default();
        assert_eq!(DiscoveryScope::for_viewer(&admin, policy), DiscoveryScope::All);
        assert_ne!(DiscoveryScope::for_viewer(&viewer, policy), DiscoveryScope::All);
    }
}
