// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    Account, AccountId, FamilyStatus, FamilyType, Gender, Group, Owner, Permission, Profile, ProfileRecord, Role,
};
pub use requests::{
    AccountProfileRequest, GroupIdsRequest, GroupRequest, LoginRequest, PageQuery, PasswordChangeRequest,
    PermissionRequest, ProfileFieldsRequest, ProfileListQuery, RegisterAccountRequest, RegisterProfileRequest,
    ToggleInterestRequest, UpdateMeRequest, UserRequest,
};
pub use responses::{
    AuthResponse, ErrorResponse, GroupView, HealthResponse, MessageWithUser, PermissionView, ProfileView,
    ToggleInterestResponse, TokenResponse, UserView,
};
