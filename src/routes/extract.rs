use crate::core::{PageLinks, PageRequest, PageWindow, Paginated, Viewer};
use crate::error::ApiError;
use crate::models::{Account, PageQuery};
use crate::routes::AppState;
use crate::services::{IdentityStore, Listing, ProfileStore};
use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use serde::Serialize;
use std::future::{ready, Future, Ready};
use std::pin::Pin;

type BoxedFuture<T> = Pin<Box<dyn Future<Output = Result<T, ApiError>>>>;

fn app_state(req: &HttpRequest) -> Result<web::Data<AppState>, ApiError> {
    req.app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| ApiError::Internal("Application state is not configured".to_string()))
}

/// Token from `Authorization: Token <t>` or `Authorization: Bearer <t>`
fn bearer_token(req: &HttpRequest) -> Result<Option<String>, ApiError> {
    let Some(header) = req.headers().get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| ApiError::AuthenticationRequired("Invalid token header.".to_string()))?;

    match value.split_once(' ') {
        Some((scheme, token))
            if (scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer"))
                && !token.trim().is_empty() =>
        {
            Ok(Some(token.trim().to_string()))
        }
        _ => Err(ApiError::AuthenticationRequired("Invalid token header.".to_string())),
    }
}

/// Resolve a token against the current account row
async fn authenticate(state: &AppState, token: &str) -> Result<Account, ApiError> {
    let claims = state.tokens.decode(token).map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        ApiError::AuthenticationRequired("Invalid token.".to_string())
    })?;

    let account = state
        .store
        .get_account(claims.sub)
        .await?
        .filter(|account| account.is_active)
        .ok_or_else(|| ApiError::AuthenticationRequired("User inactive or deleted.".to_string()))?;

    // Password changes bump the version and revoke older tokens
    if account.token_version != claims.ver {
        tracing::info!(account_id = account.id, "Rejected revoked token");
        return Err(ApiError::AuthenticationRequired("Invalid token.".to_string()));
    }

    Ok(account)
}

/// An authenticated, active caller
pub struct AuthUser(pub Account);

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = BoxedFuture<Self>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = app_state(req);
        let token = bearer_token(req);

        Box::pin(async move {
            let state = state?;
            let token = token?.ok_or_else(|| {
                ApiError::AuthenticationRequired("Authentication credentials were not provided.".to_string())
            })?;
            authenticate(&state, &token).await.map(AuthUser)
        })
    }
}

/// Caller if the request carries a valid token, otherwise anonymous
pub struct OptionalAuthUser(pub Option<Account>);

impl FromRequest for OptionalAuthUser {
    type Error = ApiError;
    type Future = BoxedFuture<Self>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = app_state(req);
        let token = bearer_token(req).ok().flatten();

        Box::pin(async move {
            let state = state?;
            let account = match token {
                Some(token) => authenticate(&state, &token).await.ok(),
                None => None,
            };
            Ok(OptionalAuthUser(account))
        })
    }
}

/// A staff caller
pub struct AdminUser(pub Account);

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = BoxedFuture<Self>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let user = AuthUser::from_request(req, payload);

        Box::pin(async move {
            let AuthUser(account) = user.await?;
            if !account.is_staff {
                return Err(ApiError::forbidden());
            }
            Ok(AdminUser(account))
        })
    }
}

/// The discovery viewer for an account
pub async fn viewer_for(state: &AppState, account: &Account) -> Result<Viewer, ApiError> {
    let profile = state.store.get_profile(account.id).await?;

    Ok(Viewer {
        account_id: account.id,
        role: account.role(),
        profile_gender: profile.map(|record| record.profile.gender),
    })
}

/// Parsed `page`/`page_size` plus what is needed to build `next`/`previous` links
pub struct PageParams {
    pub request: PageRequest,
    window: PageWindow,
    links: PageLinks,
}

impl PageParams {
    pub fn window(&self) -> PageWindow {
        self.window
    }

    /// Wrap a listing in the pagination envelope. Pages past the end are 404.
    pub fn finish<T, V: Serialize>(&self, listing: Listing<T>, f: impl FnMut(T) -> V) -> Result<Paginated<V>, ApiError> {
        if !self.request.is_valid_for(listing.total) {
            return Err(ApiError::not_found("Invalid page."));
        }
        let results = listing.items.into_iter().map(f).collect();
        Ok(Paginated::new(results, listing.total, &self.request, &self.links))
    }
}

impl FromRequest for PageParams {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(page_params(req))
    }
}

fn page_params(req: &HttpRequest) -> Result<PageParams, ApiError> {
    let state = app_state(req)?;

    let query = web::Query::<PageQuery>::from_query(req.query_string())
        .map_err(|e| ApiError::InvalidQuery(e.to_string()))?;
    let request = query
        .to_request(&state.pagination)
        .ok_or_else(|| ApiError::not_found("Invalid page."))?;
    let window = request.window().ok_or_else(|| ApiError::not_found("Invalid page."))?;

    let params = web::Query::<Vec<(String, String)>>::from_query(req.query_string())
        .map(|q| q.into_inner())
        .unwrap_or_default();
    let info = req.connection_info();
    let base = format!("{}://{}{}", info.scheme(), info.host(), req.path());

    Ok(PageParams {
        request,
        window,
        links: PageLinks::new(base, params),
    })
}
