use crate::core::available_username;
use crate::error::ApiError;
use crate::models::{
    Account, AccountProfileRequest, AuthResponse, LoginRequest, PasswordChangeRequest, RegisterAccountRequest,
    TokenResponse, UserView,
};
use crate::routes::extract::{AuthUser, OptionalAuthUser};
use crate::routes::AppState;
use crate::services::{
    dispatch_unregister, hash_password, verify_password, AccountChanges, IdentityStore, NewAccount, StoreError,
};
use actix_web::{web, HttpResponse};
use validator::Validate;

/// Configure account and session routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/profile", web::get().to(profile))
            .route("/profile", web::put().to(update_profile))
            .route("/profile", web::patch().to(update_profile))
            .route("/password/change", web::put().to(change_password))
            .route("/password/change", web::post().to(change_password)),
    );
}

/// Serialize an account with its groups resolved
pub(crate) async fn user_view(state: &AppState, account: Account) -> Result<UserView, ApiError> {
    let groups = state.store.groups_by_ids(&account.groups).await?;
    Ok(UserView::new(account, groups))
}

/// Register an account without a profile
///
/// POST /api/auth/register
async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterAccountRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate()?;

    if state.store.email_taken(&body.email, None).await? {
        return Err(ApiError::validation("Email already exists"));
    }

    let username = available_username(state.store.as_ref(), &body.email).await?;
    let account = state
        .store
        .create_account(
            NewAccount {
                username,
                email: body.email,
                password_hash: hash_password(&body.password)?,
                first_name: body.first_name,
                last_name: body.last_name,
                is_active: true,
                is_staff: false,
                is_superuser: false,
                group_ids: Vec::new(),
            },
            None,
        )
        .await?;

    tracing::info!(account_id = account.id, "Registered account without profile");

    let token = state.tokens.issue(&account)?;
    let user = user_view(&state, account).await?;

    Ok(HttpResponse::Created().json(AuthResponse { token, user }))
}

/// Exchange credentials for a token
///
/// POST /api/auth/login
///
/// Request body:
/// ```json
/// { "email": "a@x.com", "password": "string" }
/// ```
async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate()?;

    let account = state
        .store
        .find_account_by_login(&body.email)
        .await?
        .filter(|account| account.is_active && verify_password(&body.password, &account.password_hash))
        .ok_or_else(|| ApiError::validation("Unable to log in with provided credentials."))?;

    tracing::debug!(account_id = account.id, "Issued token");

    let token = state.tokens.issue(&account)?;
    let user = user_view(&state, account).await?;

    Ok(HttpResponse::Ok().json(AuthResponse { token, user }))
}

/// Tokens are stateless; logging out only tells the device registry
async fn logout(state: web::Data<AppState>, OptionalAuthUser(account): OptionalAuthUser) -> HttpResponse {
    if let Some(account) = account {
        dispatch_unregister(state.notifier.clone(), account.id);
    }
    HttpResponse::NoContent().finish()
}

async fn profile(state: web::Data<AppState>, AuthUser(account): AuthUser) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(user_view(&state, account).await?))
}

/// Update the caller's names and email
async fn update_profile(
    state: web::Data<AppState>,
    AuthUser(account): AuthUser,
    body: web::Json<AccountProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate()?;

    if let Some(email) = &body.email {
        if state.store.email_taken(email, Some(account.id)).await? {
            return Err(ApiError::validation("Email already exists"));
        }
    }

    let updated = match state.store.update_account(account.id, &body.into_changes()).await {
        Ok(updated) => updated,
        Err(StoreError::EmailTaken) => return Err(ApiError::validation("Email already exists")),
        Err(e) => return Err(e.into()),
    };

    Ok(HttpResponse::Ok().json(user_view(&state, updated).await?))
}

/// Change the password; every earlier token stops working
async fn change_password(
    state: web::Data<AppState>,
    AuthUser(account): AuthUser,
    body: web::Json<PasswordChangeRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();

    if !verify_password(&body.old_password, &account.password_hash) {
        return Err(ApiError::validation("Old password is incorrect"));
    }
    body.validate()?;

    let changes = AccountChanges {
        password_hash: Some(hash_password(&body.new_password)?),
        ..Default::default()
    };
    let updated = state.store.update_account(account.id, &changes).await?;

    tracing::info!(account_id = updated.id, "Password changed");

    Ok(HttpResponse::Ok().json(TokenResponse {
        token: state.tokens.issue(&updated)?,
    }))
}
