// Service exports
pub mod auth;
pub mod memory;
pub mod notifier;
pub mod postgres;
pub mod seed;
pub mod store;

pub use auth::{hash_password, verify_password, AuthError, Claims, TokenIssuer, UNUSABLE_PASSWORD};
pub use memory::MemoryStore;
pub use notifier::{dispatch_unregister, DeviceNotifier, DisabledNotifier, HttpDeviceNotifier, NotifierError};
pub use postgres::PostgresStore;
pub use seed::{seed_sample_profiles, SeedError};
pub use store::{
    AccountChanges, GroupChanges, IdentityStore, Listing, NewAccount, NewGroup, NewPermission, PermissionChanges,
    ProfileChanges, ProfileStore, Store, StoreError, StoreResult,
};
