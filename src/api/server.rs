// src/api/server.rs
use crate::api::dto::ApiError;
use crate::api::handlers::{self, AppState};
use crate::config::Config;
use crate::domain::errors::{AppError, AppResult};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS,
    ACCESS_CONTROL_REQUEST_HEADERS, ORIGIN, VARY,
};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode, Uri};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

const ALLOWED_METHODS: &str = "GET, OPTIONS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Root,
    Health,
    IndustryFlow,
    IndustryFlowHealth,
    GlobalFlow,
    GlobalFlowHealth,
    MarketInsights,
}

fn resolve(path: &str, api_prefix: &str) -> Option<Route> {
    let path = path.trim_end_matches('/');
    match path {
        "" => return Some(Route::Root),
        "/health" => return Some(Route::Health),
        _ => {}
    }

    match path.strip_prefix(api_prefix.trim_end_matches('/'))? {
        "/industry-flow" => Some(Route::IndustryFlow),
        "/industry-flow/health" => Some(Route::IndustryFlowHealth),
        "/global-flow" => Some(Route::GlobalFlow),
        "/global-flow/health" => Some(Route::GlobalFlowHealth),
        "/market-insights" => Some(Route::MarketInsights),
        _ => None,
    }
}

/// Answer one request; errors are already turned into JSON responses
pub async fn handle(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    log::debug!("{} {}", req.method(), req.uri());

    let mut response = if req.method() == Method::OPTIONS {
        preflight(&req)
    } else {
        let (method, uri) = (req.method().clone(), req.uri().clone());
        dispatch(&state, &method, &uri).await.unwrap_or_else(ApiError::into_response)
    };

    apply_cors(&state.config, origin.as_deref(), &mut response);
    Ok(response)
}

async fn dispatch(state: &AppState, method: &Method, uri: &Uri) -> Result<Response<Body>, ApiError> {
    let path = uri.path();
    let route = resolve(path, &state.config.server.api_prefix).ok_or_else(|| ApiError::not_found(path))?;
    if method != Method::GET && method != Method::HEAD {
        return Err(ApiError::method_not_allowed());
    }

    let query = uri.query();
    match route {
        Route::Root => handlers::root(state).await,
        Route::Health => handlers::health(state).await,
        Route::IndustryFlow => handlers::industry_flow(state, query).await,
        Route::IndustryFlowHealth => handlers::service_health("industry-flow").await,
        Route::GlobalFlow => handlers::global_flow(state, query).await,
        Route::GlobalFlowHealth => handlers::service_health("global-flow").await,
        Route::MarketInsights => handlers::market_insights(state, query).await,
    }
}

fn preflight(req: &Request<Body>) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    let requested = req
        .headers()
        .get(ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested);
    response
}

/// Echo the origin back when it is one of the configured ones
fn apply_cors(config: &Config, origin: Option<&str>, response: &mut Response<Body>) {
    let headers = response.headers_mut();
    headers.insert(VARY, HeaderValue::from_static("Origin"));

    let Some(origin) = origin else {
        return;
    };
    if !config.server.cors_origins.iter().any(|allowed| allowed == origin) {
        log::debug!("Origin {} is not allowed", origin);
        return;
    }

    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(crate::api::dto::PROVENANCE_HEADER),
        );
    }
}

/// Serve until `shutdown` resolves, finishing in-flight requests
pub async fn serve<F>(state: Arc<AppState>, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()>,
{
    let bind = state.config.bind_address();
    let addr = tokio::net::lookup_host(bind.as_str())
        .await?
        .next()
        .ok_or_else(|| AppError::Config(format!("Cannot resolve bind address {}", bind)))?;

    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), req))) }
    });

    let server = Server::try_bind(&addr)
        .map_err(|e| AppError::Server(format!("Failed to bind {}: {}", addr, e)))?
        .serve(make_svc);
    log::info!("Money Flow Observatory API listening on http://{}", addr);

    server
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AppError::Server(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_resolve_under_the_prefix() {
        assert_eq!(resolve("/", "/api"), Some(Route::Root));
        assert_eq!(resolve("/health", "/api"), Some(Route::Health));
        assert_eq!(resolve("/api/global-flow/", "/api"), Some(Route::GlobalFlow));
        assert_eq!(resolve("/api/industry-flow/health", "/api"), Some(Route::IndustryFlowHealth));
        assert_eq!(resolve("/v2/global-flow", "/v2/"), Some(Route::GlobalFlow));
        assert_eq!(resolve("/global-flow", "/api"), None);
        assert_eq!(resolve("/api/unknown", "/api"), None);
    }

    #[test]
    fn cors_echoes_only_configured_origins() {
        let config = Config::default();

        let mut allowed = Response::new(Body::empty());
        apply_cors(&config, Some("http://localhost:5173"), &mut allowed);
        assert_eq!(allowed.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:5173");

        let mut denied = Response::new(Body::empty());
        apply_cors(&config, Some("http://evil.example"), &mut denied);
        assert!(denied.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
