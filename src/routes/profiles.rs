use crate::core::{DiscoveryScope, ProfileUpdate, Registration, UpdateMode};
use crate::error::ApiError;
use crate::models::{
    Account, AuthResponse, Gender, ProfileFieldsRequest, ProfileListQuery, ProfileView, RegisterProfileRequest,
    ToggleInterestRequest, ToggleInterestResponse, UpdateMeRequest,
};
use crate::routes::extract::{viewer_for, AuthUser, PageParams};
use crate::routes::AppState;
use crate::services::{hash_password, ProfileStore, StoreError};
use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse};
use validator::Validate;

/// Configure all profile routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/profiles")
            .route("", web::get().to(list_profiles))
            .route("", web::post().to(create_profile))
            .route("/register", web::post().to(register))
            .route("/me", web::get().to(me))
            .route("/update_me", web::post().to(update_me))
            .route("/update_me", web::put().to(update_me))
            .route("/update_me", web::patch().to(update_me))
            .route("/toggle_interest", web::post().to(toggle_interest))
            .route("/my_interests", web::get().to(my_interests))
            .route("/{id}", web::get().to(retrieve_profile))
            .route("/{id}", web::put().to(update_profile))
            .route("/{id}", web::patch().to(update_profile))
            .route("/{id}", web::delete().to(delete_profile)),
    );
}

fn update_mode(method: &Method) -> UpdateMode {
    if method == Method::PATCH {
        UpdateMode::Partial
    } else {
        UpdateMode::Full
    }
}

/// Register an account together with its profile
///
/// POST /api/profiles/register
///
/// Request body:
/// ```json
/// {
///   "email": "a@x.com",
///   "password": "string",
///   "first_name": "string",
///   "last_name": "string",
///   "phone_number": "+14155550100",
///   "gender": "Male|Female"
/// }
/// ```
async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();

    let missing = body.missing_fields();
    if !missing.is_empty() {
        return Err(ApiError::validation(format!("Missing required fields: {}", missing.join(", "))));
    }

    let gender: Gender = body
        .gender
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|_| ApiError::validation(r#"Gender must be either "Male" or "Female""#))?;

    body.validate()?;

    let password_hash = hash_password(body.password.as_deref().unwrap_or_default())?;
    let account = crate::core::register(
        state.store.as_ref(),
        Registration {
            email: body.email.unwrap_or_default(),
            password_hash,
            first_name: body.first_name.unwrap_or_default(),
            last_name: body.last_name.unwrap_or_default(),
            phone_number: body.phone_number.unwrap_or_default(),
            gender,
        },
    )
    .await?;

    let token = state.tokens.issue(&account)?;
    let record = state
        .store
        .get_profile(account.id)
        .await?
        .ok_or_else(|| ApiError::Internal("Registered profile disappeared".to_string()))?;

    Ok(HttpResponse::Created().json(AuthResponse {
        token,
        user: ProfileView::from(record),
    }))
}

/// Discovery listing with narrowing filters
///
/// GET /api/profiles?city__icontains=york&ordering=-height&page=2
async fn list_profiles(
    state: web::Data<AppState>,
    AuthUser(account): AuthUser,
    query: web::Query<ProfileListQuery>,
    page: PageParams,
) -> Result<HttpResponse, ApiError> {
    let viewer = viewer_for(&state, &account).await?;
    let scope = DiscoveryScope::for_viewer(&viewer, state.discovery);
    let filter = query.into_inner().into_filter()?;

    let listing = state.store.list_profiles(&scope, &filter, page.window()).await?;

    tracing::debug!(
        account_id = account.id,
        total = listing.total,
        "Listed profiles"
    );

    Ok(HttpResponse::Ok().json(page.finish(listing, ProfileView::from)?))
}

/// Create the caller's own profile
async fn create_profile(
    state: web::Data<AppState>,
    AuthUser(account): AuthUser,
    body: web::Json<ProfileFieldsRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate()?;

    let update = ProfileUpdate {
        profile: body.into_changes()?,
        ..Default::default()
    };
    let missing = update.missing_for(UpdateMode::Full);
    if !missing.is_empty() {
        return Err(ApiError::validation(format!("Missing required fields: {}", missing.join(", "))));
    }

    let record = match state.store.create_profile(account.id, &update.profile).await {
        Ok(record) => record,
        Err(StoreError::Conflict(_)) => return Err(ApiError::validation("Profile already exists")),
        Err(e) => return Err(e.into()),
    };

    Ok(HttpResponse::Created().json(ProfileView::from(record)))
}

/// A profile inside the caller's discovery set
async fn retrieve_profile(
    state: web::Data<AppState>,
    AuthUser(account): AuthUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let viewer = viewer_for(&state, &account).await?;
    let scope = DiscoveryScope::for_viewer(&viewer, state.discovery);

    let record = state
        .store
        .get_profile(id)
        .await?
        .filter(|record| scope.admits(&record.profile))
        .ok_or_else(|| ApiError::not_found("Not found."))?;

    Ok(HttpResponse::Ok().json(ProfileView::from(record)))
}

/// Only the owner or an admin may modify a profile
async fn require_owner(state: &AppState, caller: &Account, id: i64) -> Result<(), ApiError> {
    if state.store.get_profile(id).await?.is_none() {
        return Err(ApiError::not_found("Not found."));
    }
    if caller.id != id && !caller.is_staff {
        return Err(ApiError::forbidden());
    }
    Ok(())
}

async fn update_profile(
    state: web::Data<AppState>,
    AuthUser(account): AuthUser,
    path: web::Path<i64>,
    req: HttpRequest,
    body: web::Json<ProfileFieldsRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    require_owner(&state, &account, id).await?;

    let body = body.into_inner();
    body.validate()?;
    let update = ProfileUpdate {
        profile: body.into_changes()?,
        ..Default::default()
    };
    let missing = update.missing_for(update_mode(req.method()));
    if !missing.is_empty() {
        return Err(ApiError::validation(format!("Missing required fields: {}", missing.join(", "))));
    }

    let record = state.store.update_profile(id, &update.profile).await?;

    tracing::info!(account_id = account.id, profile_id = id, "Updated profile");

    Ok(HttpResponse::Ok().json(ProfileView::from(record)))
}

async fn delete_profile(
    state: web::Data<AppState>,
    AuthUser(account): AuthUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    require_owner(&state, &account, id).await?;

    state.store.delete_profile(id).await?;

    tracing::info!(account_id = account.id, profile_id = id, "Deleted profile");

    Ok(HttpResponse::NoContent().finish())
}

/// The caller's own profile
async fn me(state: web::Data<AppState>, AuthUser(account): AuthUser) -> Result<HttpResponse, ApiError> {
    let record = state
        .store
        .get_profile(account.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    Ok(HttpResponse::Ok().json(ProfileView::from(record)))
}

/// Upsert the caller's account names, email and profile in one step
///
/// POST|PUT /api/profiles/update_me (full), PATCH (partial)
async fn update_me(
    state: web::Data<AppState>,
    AuthUser(account): AuthUser,
    req: HttpRequest,
    body: web::Json<UpdateMeRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate()?;
    let update = body.into_update()?;

    let record = crate::core::update_me(state.store.as_ref(), account.id, &update, update_mode(req.method())).await?;

    Ok(HttpResponse::Ok().json(ProfileView::from(record)))
}

/// Flip the caller's interest in another profile
///
/// POST /api/profiles/toggle_interest
///
/// Request body:
/// ```json
/// { "profile_id": 42 }
/// ```
async fn toggle_interest(
    state: web::Data<AppState>,
    AuthUser(account): AuthUser,
    body: web::Json<ToggleInterestRequest>,
) -> Result<HttpResponse, ApiError> {
    let outcome = crate::core::toggle_interest(state.store.as_ref(), account.id, body.profile_id).await?;

    Ok(HttpResponse::Ok().json(ToggleInterestResponse {
        is_interested: outcome.is_interested,
        message: outcome.message().to_string(),
    }))
}

/// Profiles the caller has expressed interest in, newest first
async fn my_interests(
    state: web::Data<AppState>,
    AuthUser(account): AuthUser,
    page: PageParams,
) -> Result<HttpResponse, ApiError> {
    let listing = crate::core::my_interests(state.store.as_ref(), account.id, page.window()).await?;

    Ok(HttpResponse::Ok().json(page.finish(listing, ProfileView::from)?))
}
