use crate::error::ApiError;
use crate::models::{
    GroupIdsRequest, GroupRequest, GroupView, MessageWithUser, PermissionRequest, PermissionView, UserRequest,
};
use crate::routes::auth::user_view;
use crate::routes::extract::{AdminUser, PageParams};
use crate::routes::AppState;
use crate::services::{hash_password, AccountChanges, IdentityStore, Listing, NewAccount, UNUSABLE_PASSWORD};
use actix_web::{web, HttpResponse};
use validator::Validate;

/// Configure staff-only management routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .route("", web::get().to(list_users))
            .route("", web::post().to(create_user))
            .route("/{id}", web::get().to(retrieve_user))
            .route("/{id}", web::put().to(update_user))
            .route("/{id}", web::patch().to(update_user))
            .route("/{id}", web::delete().to(delete_user))
            .route("/{id}/add-groups", web::post().to(add_groups))
            .route("/{id}/remove-groups", web::post().to(remove_groups)),
    )
    .service(
        web::scope("/groups")
            .route("", web::get().to(list_groups))
            .route("", web::post().to(create_group))
            .route("/{id}", web::get().to(retrieve_group))
            .route("/{id}", web::put().to(update_group))
            .route("/{id}", web::patch().to(update_group))
            .route("/{id}", web::delete().to(delete_group)),
    )
    .service(
        web::scope("/permissions")
            .route("", web::get().to(list_permissions))
            .route("", web::post().to(create_permission))
            .route("/{id}", web::get().to(retrieve_permission))
            .route("/{id}", web::put().to(update_permission))
            .route("/{id}", web::patch().to(update_permission))
            .route("/{id}", web::delete().to(delete_permission)),
    );
}

async fn ensure_groups_exist(state: &AppState, ids: &[i64]) -> Result<(), ApiError> {
    let missing = state.store.missing_groups(ids).await?;
    if missing.is_empty() {
        return Ok(());
    }
    let listed = missing.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
    Err(ApiError::validation(format!("Groups with IDs [{}] do not exist.", listed)))
}

// Users

async fn list_users(
    state: web::Data<AppState>,
    _admin: AdminUser,
    page: PageParams,
) -> Result<HttpResponse, ApiError> {
    let listing = state.store.list_accounts(page.window()).await?;

    let mut users = Vec::with_capacity(listing.items.len());
    for account in listing.items {
        users.push(user_view(&state, account).await?);
    }
    let listing = Listing {
        items: users,
        total: listing.total,
    };

    Ok(HttpResponse::Ok().json(page.finish(listing, |user| user)?))
}

/// Create an account. Without a password it cannot log in.
async fn create_user(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    body: web::Json<UserRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate()?;

    let email = body.email.unwrap_or_default();
    let username = match body.username.or_else(|| (!email.is_empty()).then(|| email.clone())) {
        Some(username) => username,
        None => return Err(ApiError::validation("Missing required fields: username")),
    };
    let group_ids = body.groups.unwrap_or_default();
    ensure_groups_exist(&state, &group_ids).await?;

    let password_hash = match body.password.as_deref() {
        Some(password) if !password.is_empty() => hash_password(password)?,
        _ => UNUSABLE_PASSWORD.to_string(),
    };

    let account = state
        .store
        .create_account(
            NewAccount {
                username,
                email,
                password_hash,
                first_name: body.first_name.unwrap_or_default(),
                last_name: body.last_name.unwrap_or_default(),
                is_active: body.is_active.unwrap_or(true),
                is_staff: body.is_staff.unwrap_or(false),
                is_superuser: body.is_superuser.unwrap_or(false),
                group_ids,
            },
            None,
        )
        .await?;

    tracing::info!(admin_id = admin.id, account_id = account.id, "Created account");

    Ok(HttpResponse::Created().json(user_view(&state, account).await?))
}

async fn retrieve_user(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let account = state
        .store
        .get_account(path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;

    Ok(HttpResponse::Ok().json(user_view(&state, account).await?))
}

async fn update_user(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    path: web::Path<i64>,
    body: web::Json<UserRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let body = body.into_inner();
    body.validate()?;

    if let Some(ids) = &body.groups {
        ensure_groups_exist(&state, ids).await?;
    }

    let password_hash = match body.password.as_deref() {
        Some(password) if !password.is_empty() => Some(hash_password(password)?),
        _ => None,
    };
    let changes = AccountChanges {
        username: body.username,
        email: body.email,
        first_name: body.first_name,
        last_name: body.last_name,
        password_hash,
        is_active: body.is_active,
        is_staff: body.is_staff,
        is_superuser: body.is_superuser,
        group_ids: body.groups,
    };

    let account = state.store.update_account(id, &changes).await?;

    tracing::info!(admin_id = admin.id, account_id = id, "Updated account");

    Ok(HttpResponse::Ok().json(user_view(&state, account).await?))
}

async fn delete_user(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if !state.store.delete_account(id).await? {
        return Err(ApiError::not_found("Not found."));
    }

    tracing::info!(admin_id = admin.id, account_id = id, "Deleted account");

    Ok(HttpResponse::NoContent().finish())
}

async fn add_groups(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
    body: web::Json<GroupIdsRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if state.store.get_account(id).await?.is_none() {
        return Err(ApiError::not_found("Not found."));
    }
    ensure_groups_exist(&state, &body.group_ids).await?;

    // Already-held groups count as added
    let mut requested = body.group_ids.clone();
    requested.sort_unstable();
    requested.dedup();
    state.store.add_account_groups(id, &requested).await?;
    let account = state
        .store
        .get_account(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;

    Ok(HttpResponse::Ok().json(MessageWithUser {
        message: format!("Successfully added {} group(s) to user.", requested.len()),
        user: user_view(&state, account).await?,
    }))
}

async fn remove_groups(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
    body: web::Json<GroupIdsRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if state.store.get_account(id).await?.is_none() {
        return Err(ApiError::not_found("Not found."));
    }

    let removed = state.store.remove_account_groups(id, &body.group_ids).await?;
    let account = state
        .store
        .get_account(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;

    Ok(HttpResponse::Ok().json(MessageWithUser {
        message: format!("Successfully removed {} group(s) from user.", removed),
        user: user_view(&state, account).await?,
    }))
}

// Groups

async fn list_groups(
    state: web::Data<AppState>,
    _admin: AdminUser,
    page: PageParams,
) -> Result<HttpResponse, ApiError> {
    let listing = state.store.list_groups(page.window()).await?;
    Ok(HttpResponse::Ok().json(page.finish(listing, GroupView::from)?))
}

async fn create_group(
    state: web::Data<AppState>,
    _admin: AdminUser,
    body: web::Json<GroupRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate()?;

    let group = body
        .into_new()
        .ok_or_else(|| ApiError::validation("Missing required fields: name"))?;
    let group = state.store.create_group(group).await?;

    Ok(HttpResponse::Created().json(GroupView::from(group)))
}

async fn retrieve_group(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let group = state
        .store
        .get_group(path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;

    Ok(HttpResponse::Ok().json(GroupView::from(group)))
}

async fn update_group(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
    body: web::Json<GroupRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate()?;

    let group = state.store.update_group(path.into_inner(), &body.into_changes()).await?;
    Ok(HttpResponse::Ok().json(GroupView::from(group)))
}

async fn delete_group(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    if !state.store.delete_group(path.into_inner()).await? {
        return Err(ApiError::not_found("Not found."));
    }
    Ok(HttpResponse::NoContent().finish())
}

// Permissions

async fn list_permissions(
    state: web::Data<AppState>,
    _admin: AdminUser,
    page: PageParams,
) -> Result<HttpResponse, ApiError> {
    let listing = state.store.list_permissions(page.window()).await?;
    Ok(HttpResponse::Ok().json(page.finish(listing, PermissionView::from)?))
}

async fn create_permission(
    state: web::Data<AppState>,
    _admin: AdminUser,
    body: web::Json<PermissionRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate()?;

    let permission = body
        .into_new()
        .ok_or_else(|| ApiError::validation("Missing required fields: name, codename, content_type"))?;
    let permission = state.store.create_permission(permission).await?;

    Ok(HttpResponse::Created().json(PermissionView::from(permission)))
}

async fn retrieve_permission(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let permission = state
        .store
        .get_permission(path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;

    Ok(HttpResponse::Ok().json(PermissionView::from(permission)))
}

async fn update_permission(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
    body: web::Json<PermissionRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate()?;

    let permission = state
        .store
        .update_permission(path.into_inner(), &body.into_changes())
        .await?;
    Ok(HttpResponse::Ok().json(PermissionView::from(permission)))
}

async fn delete_permission(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    if !state.store.delete_permission(path.into_inner()).await? {
        return Err(ApiError::not_found("Not found."));
    }
    Ok(HttpResponse::NoContent().finish())
}
