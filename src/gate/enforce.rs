//! Gate enforcement middleware.
//!
//! Layered over the whole router. The first request awaits the settings
//! load (nothing is served before a verdict is possible); every later
//! request decides synchronously from the cache, so a blocked path cannot
//! slip through between navigation and decision.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::gate::policy::{decide, Actor, Role, Verdict};
use crate::gate::settings::{MaintenanceSettings, SettingsStore};

/// Role header set by the fronting auth proxy. The service itself does not
/// manage sessions.
pub const ROLE_HEADER: &str = "x-storefront-role";

/// Query parameter that forces the notice even for bypass-capable actors.
pub const PREVIEW_PARAM: &str = "test_maintenance";

pub async fn maintenance_gate(
    State(store): State<Arc<SettingsStore>>,
    req: Request,
    next: Next,
) -> Response {
    let settings = match store.cached() {
        Some(settings) => settings,
        None => store.load().await,
    };
    let actor = actor_from_request(&req);
    match decide(&settings, req.uri().path(), &actor, Utc::now()) {
        Verdict::Allow => next.run(req).await,
        Verdict::ShowNotice => notice_response(&settings),
    }
}

pub fn actor_from_request(req: &Request) -> Actor {
    let role = req
        .headers()
        .get(ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse);
    let preview_requested = req
        .uri()
        .query()
        .map(preview_requested_in)
        .unwrap_or(false);
    Actor { role, preview_requested }
}

fn preview_requested_in(query: &str) -> bool {
    query.split('&').any(|pair| {
        let mut parts = pair.splitn(2, '=');
        parts.next() == Some(PREVIEW_PARAM) && parts.next() == Some("true")
    })
}

fn notice_response(settings: &MaintenanceSettings) -> Response {
    let mut response = (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "maintenance": true,
            "title": settings.title,
            "message": settings.message,
            "countdown_label": settings.countdown_label,
            "resumes_at": settings.ends_at,
        })),
    )
        .into_response();
    if let Some(end) = settings.ends_at {
        let seconds = (end - Utc::now()).num_seconds().max(0);
        if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::settings::{SettingsError, SettingsFetcher, SettingsRecord};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct FixedFetcher {
        calls: Arc<AtomicUsize>,
        record: Option<SettingsRecord>,
        fail: bool,
    }

    #[async_trait]
    impl SettingsFetcher for FixedFetcher {
        async fn fetch(&self) -> Result<Option<SettingsRecord>, SettingsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SettingsError::Unavailable("down".into()));
            }
            Ok(self.record.clone())
        }
    }

    fn active_record() -> SettingsRecord {
        SettingsRecord {
            enabled: true,
            starts_at: None,
            ends_at: None,
            title: "Down for maintenance".into(),
            message: "Back soon".into(),
            countdown_label: "Back in".into(),
            updated_at: Utc::now(),
        }
    }

    fn app(record: Option<SettingsRecord>, fail: bool) -> (Router, Arc<SettingsStore>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(SettingsStore::new(Arc::new(FixedFetcher {
            calls: calls.clone(),
            record,
            fail,
        })));
        let router = Router::new()
            .route("/", get(|| async { "home" }))
            .route("/health", get(|| async { "healthy" }))
            .route("/cart/:session", get(|| async { "cart" }))
            .route("/checkout", get(|| async { "checkout" }))
            .layer(axum::middleware::from_fn_with_state(store.clone(), maintenance_gate));
        (router, store, calls)
    }

    async fn status_of(router: &Router, uri: &str, role: Option<&str>) -> StatusCode {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(role) = role {
            builder = builder.header(ROLE_HEADER, role);
        }
        let response = router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.status()
    }

    #[tokio::test]
    async fn blocked_path_gets_notice_during_maintenance() {
        let (router, _, _) = app(Some(active_record()), false);
        assert_eq!(status_of(&router, "/cart/abc", None).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn allowed_path_passes_during_maintenance() {
        let (router, _, _) = app(Some(active_record()), false);
        assert_eq!(status_of(&router, "/", None).await, StatusCode::OK);
        assert_eq!(status_of(&router, "/health", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_bypasses_but_preview_param_shows_notice() {
        let (router, _, _) = app(Some(active_record()), false);
        assert_eq!(status_of(&router, "/checkout", Some("admin")).await, StatusCode::OK);
        assert_eq!(
            status_of(&router, "/checkout?test_maintenance=true", Some("admin")).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn customer_cannot_bypass() {
        let (router, _, _) = app(Some(active_record()), false);
        assert_eq!(status_of(&router, "/checkout", Some("customer")).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn maintenance_disabled_allows_everything() {
        let mut record = active_record();
        record.enabled = false;
        let (router, _, _) = app(Some(record), false);
        assert_eq!(status_of(&router, "/checkout", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn fetch_failure_fails_open() {
        let (router, _, _) = app(None, true);
        assert_eq!(status_of(&router, "/cart/abc", None).await, StatusCode::OK);
        assert_eq!(status_of(&router, "/checkout", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn warm_cache_decides_without_refetching() {
        let (router, store, calls) = app(Some(active_record()), false);

        // Warm the cache, then hit a blocked path: the verdict must come
        // from the cache alone.
        store.load().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(status_of(&router, "/cart/abc", None).await, StatusCode::SERVICE_UNAVAILABLE);
        // Unrouted but blocked-prefix paths are still gated: the layer wraps
        // the fallback as well.
        assert_eq!(status_of(&router, "/orders", None).await, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notice_body_carries_display_payload() {
        let mut record = active_record();
        record.ends_at = Some("2099-01-01T00:00:00Z".into());
        let (router, _, _) = app(Some(record), false);

        let response = router
            .clone()
            .oneshot(HttpRequest::builder().uri("/cart/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["maintenance"], true);
        assert_eq!(body["title"], "Down for maintenance");
        assert_eq!(body["message"], "Back soon");
    }

    struct SwappableFetcher {
        record: std::sync::Mutex<SettingsRecord>,
    }

    #[async_trait]
    impl SettingsFetcher for SwappableFetcher {
        async fn fetch(&self) -> Result<Option<SettingsRecord>, SettingsError> {
            Ok(Some(self.record.lock().unwrap().clone()))
        }
    }

    #[tokio::test]
    async fn settings_change_applies_to_next_request() {
        let fetcher = Arc::new(SwappableFetcher { record: std::sync::Mutex::new(active_record()) });
        let store = Arc::new(SettingsStore::new(fetcher.clone()));
        let router = Router::new()
            .route("/cart/:session", get(|| async { "cart" }))
            .layer(axum::middleware::from_fn_with_state(store.clone(), maintenance_gate));

        assert_eq!(status_of(&router, "/cart/abc", None).await, StatusCode::SERVICE_UNAVAILABLE);

        // A push notification would invalidate the cache; the next request
        // then decides against the new configuration.
        fetcher.record.lock().unwrap().enabled = false;
        store.invalidate();
        assert_eq!(status_of(&router, "/cart/abc", None).await, StatusCode::OK);
    }
}
