use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session::{self, Identity},
    db::{
        errors::DbError,
        models::users::{UserCreateDBRequest, UserStatus},
    },
    errors::{Error, Result},
    types::Operation,
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::{debug, info, instrument, trace};

/// Extract an identity from a session token in the `Authorization` header or session cookie.
/// Returns:
/// - None: no token present
/// - Some(Ok(identity)): token verified
/// - Some(Err(error)): a bearer token was present but is invalid
fn try_session_auth(parts: &Parts, config: &crate::config::Config) -> Option<Result<Identity>> {
    if let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) {
        let auth_str = match auth_header.to_str() {
            Ok(s) => s,
            Err(e) => {
                return Some(Err(Error::BadRequest {
                    message: format!("Invalid authorization header: {e}"),
                }));
            }
        };
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Some(session::verify_session_token(token.trim(), config));
        }
    }

    let cookie_str = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    let cookie_name = &config.auth.session.cookie_name;
    for cookie in cookie_str.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=')
            && name == cookie_name
        {
            match session::verify_session_token(value, config) {
                Ok(identity) => return Some(Ok(identity)),
                // Stale cookies are expected; keep looking
                Err(_) => continue,
            }
        }
    }
    None
}

/// Extract an identity from headers set by an authenticating proxy
fn try_proxy_header_auth(parts: &Parts, config: &crate::config::Config) -> Option<Identity> {
    let header_value = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let email = header_value(&config.auth.proxy_header.email_header_name)?;
    Some(Identity {
        email,
        name: header_value(&config.auth.proxy_header.name_header_name),
        picture: None,
    })
}

/// Find the user for an identity, creating it on first sign-in
#[instrument(skip_all, fields(email = %identity.email))]
async fn resolve_user(identity: Identity, state: &AppState) -> Result<CurrentUser> {
    let existing = match state.store.get_user_by_email(&identity.email).await? {
        Some(user) => user,
        None => {
            let create = UserCreateDBRequest {
                email: identity.email.clone(),
                display_name: identity.name.clone(),
                photo_url: identity.picture.clone(),
                is_admin: state.config.is_admin_email(&identity.email),
            };
            match state.store.create_user(&create).await {
                Ok(user) => {
                    info!("Created user {} on first sign-in", user.id);
                    user
                }
                // Lost a race with a concurrent first request from the same user
                Err(DbError::UniqueViolation { .. }) => state
                    .store
                    .get_user_by_email(&identity.email)
                    .await?
                    .ok_or(Error::Database(DbError::NotFound))?,
                Err(e) => return Err(e.into()),
            }
        }
    };

    if existing.status == UserStatus::Deleted {
        return Err(Error::Unauthenticated {
            message: Some("This account has been deleted".to_string()),
        });
    }
    Ok(CurrentUser::from(existing))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Each method yields None when its credentials are absent. A present-but-invalid session
        // token does not stop the proxy headers from being tried.
        let mut session_error = None;

        if state.config.auth.session.enabled {
            match try_session_auth(parts, &state.config) {
                Some(Ok(identity)) => {
                    debug!("Found session authenticated identity");
                    return resolve_user(identity, state).await;
                }
                Some(Err(e)) => {
                    trace!("Session authentication failed: {:?}", e);
                    session_error = Some(e);
                }
                None => trace!("No session token in request"),
            }
        }

        if state.config.auth.proxy_header.enabled {
            match try_proxy_header_auth(parts, &state.config) {
                Some(identity) => {
                    debug!("Found proxy header authenticated identity");
                    return resolve_user(identity, state).await;
                }
                None => trace!("No proxy identity headers in request"),
            }
        }

        match session_error {
            Some(e @ Error::Internal { .. }) => Err(e),
            _ => Err(Error::Unauthenticated { message: None }),
        }
    }
}

/// Extractor for admin-only routes
#[derive(Debug, Clone)]
pub struct RequiresAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequiresAdmin {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(Error::InsufficientPermissions {
                action: Operation::Read,
                resource: format!("admin resource {}", parts.uri.path()),
            });
        }
        Ok(RequiresAdmin(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{MemoryStore, Store, models::users::UserUpdateDBRequest},
        test_utils::{TEST_SESSION_SECRET, create_test_config, create_test_user},
    };
    use axum::http::Request;
    use std::sync::Arc;

    fn state(store: Arc<MemoryStore>) -> AppState {
        AppState::builder().store(store).config(create_test_config()).build()
    }

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("http://localhost/api/projects");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn token(email: &str, name: Option<&str>) -> String {
        let config = create_test_config();
        assert_eq!(config.auth.session.secret.as_deref(), Some(TEST_SESSION_SECRET));
        session::create_session_token(
            "uid",
            &Identity {
                email: email.to_string(),
                name: name.map(str::to_string),
                picture: None,
            },
            chrono::Duration::hours(1),
            &config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_existing_user_via_proxy_header() {
        let store = Arc::new(MemoryStore::new());
        let user = create_test_user(store.as_ref(), false).await;
        let state = state(store);

        let mut parts = parts(&[("x-portal-user-email", user.email.as_str())]);
        let current = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(current.id, user.id);
        assert!(!current.is_admin);
    }

    #[tokio::test]
    async fn test_first_sign_in_creates_user() {
        let store = Arc::new(MemoryStore::new());
        let state = state(store.clone());

        let bearer = format!("Bearer {}", token("New.Client@Example.com", Some("New Client")));
        let mut parts = parts(&[("authorization", bearer.as_str())]);
        let current = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();

        assert_eq!(current.display_name.as_deref(), Some("New Client"));
        assert!(!current.is_admin);
        let stored = store.get_user_by_email("new.client@example.com").await.unwrap().unwrap();
        assert_eq!(stored.id, current.id);
    }

    #[tokio::test]
    async fn test_bootstrap_admin_email() {
        let state = state(Arc::new(MemoryStore::new()));
        let mut parts = parts(&[("x-portal-user-email", "owner@agency.test")]);
        let current = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert!(current.is_admin);
    }

    #[tokio::test]
    async fn test_session_cookie() {
        let state = state(Arc::new(MemoryStore::new()));
        let cookie = format!("theme=dark; portal_session={}", token("cookie@example.com", None));
        let mut parts = parts(&[("cookie", cookie.as_str())]);
        let current = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(current.email, "cookie@example.com");
    }

    #[tokio::test]
    async fn test_invalid_token_falls_back_to_proxy_header() {
        let store = Arc::new(MemoryStore::new());
        let user = create_test_user(store.as_ref(), false).await;
        let state = state(store);

        let mut parts = parts(&[
            ("authorization", "Bearer garbage"),
            ("x-portal-user-email", user.email.as_str()),
        ]);
        let current = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(current.id, user.id);

        let mut parts = self::parts(&[("authorization", "Bearer garbage")]);
        assert!(matches!(
            CurrentUser::from_request_parts(&mut parts, &state).await,
            Err(Error::Unauthenticated { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_credentials() {
        let state = state(Arc::new(MemoryStore::new()));
        let mut parts = parts(&[]);
        assert!(matches!(
            CurrentUser::from_request_parts(&mut parts, &state).await,
            Err(Error::Unauthenticated { message: None })
        ));
    }

    #[tokio::test]
    async fn test_deleted_user_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let user = create_test_user(store.as_ref(), false).await;
        store
            .update_user(
                user.id,
                &UserUpdateDBRequest {
                    status: Some(UserStatus::Deleted),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let state = state(store);

        let mut parts = parts(&[("x-portal-user-email", user.email.as_str())]);
        assert!(matches!(
            CurrentUser::from_request_parts(&mut parts, &state).await,
            Err(Error::Unauthenticated { message: Some(_) })
        ));
    }

    #[tokio::test]
    async fn test_requires_admin() {
        let store = Arc::new(MemoryStore::new());
        let client = create_test_user(store.as_ref(), false).await;
        let admin = create_test_user(store.as_ref(), true).await;
        let state = state(store);

        let mut parts = parts(&[("x-portal-user-email", client.email.as_str())]);
        assert!(matches!(
            RequiresAdmin::from_request_parts(&mut parts, &state).await,
            Err(Error::InsufficientPermissions { .. })
        ));

        let mut parts = self::parts(&[("x-portal-user-email", admin.email.as_str())]);
        let RequiresAdmin(current) = RequiresAdmin::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(current.id, admin.id);
    }
}
