use crate::{
    api::{
        email::Mailer,
        error::{handle_panic, not_found},
        handlers::{
            auth::{session::resolve_session, AuthState},
            dashboard::{self, ProtectedFiles},
        },
        pipeline::{enforce, Guarded, Stage},
    },
    records::SubscriberStore,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    handler::HandlerWithoutStateExt,
    http::{HeaderName, HeaderValue, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Extension, Router,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::PropagateRequestIdLayer,
    services::{ServeDir, ServeFile},
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub mod email;
pub mod error;
pub mod handlers;
mod openapi;
pub mod pipeline;

pub use openapi::openapi;

/// Pages served as-is from the public directory.
const PAGES: [(&str, &str); 7] = [
    ("/", "index.html"),
    ("/shop", "shop.html"),
    ("/about", "about.html"),
    ("/contact", "contact.html"),
    ("/cart", "cart.html"),
    ("/login", "login.html"),
    ("/signup", "signup.html"),
];

/// Build the JSON API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Everything the application router needs.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthState>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub mailer: Arc<dyn Mailer>,
    pub public_dir: PathBuf,
    pub protected_dir: PathBuf,
}

/// Assemble the full application.
///
/// Layer order, outermost first: panic catching, request id, tracing,
/// extensions, rate limit, session resolution, then per-group guard stages.
pub fn app(state: AppState) -> Router {
    let auth = state.auth.clone();

    let (api, _openapi) = router().split_for_parts();
    let api = api.route_layer(from_fn_with_state(
        Guarded::new(auth.clone(), [Stage::Csrf]),
        enforce,
    ));

    let members = Router::new()
        .route(dashboard::DASHBOARD_PATH, get(dashboard::dashboard))
        .route("/dashboard/{*file}", get(dashboard::dashboard_file))
        .route_layer(from_fn_with_state(
            Guarded::new(auth.clone(), [Stage::RequireAuth]),
            enforce,
        ))
        .layer(from_fn(dashboard::reject_traversal));

    let admin = Router::new()
        .route("/admin", get(dashboard::admin))
        .route_layer(from_fn_with_state(
            Guarded::new(auth.clone(), [Stage::RequireAdmin]),
            enforce,
        ));

    let pages = PAGES.iter().fold(Router::new(), |router, (path, file)| {
        router.route_service(path, ServeFile::new(state.public_dir.join(file)))
    });

    let assets = ServeDir::new(&state.public_dir).not_found_service(not_found.into_service());

    let protected = ProtectedFiles::new(state.protected_dir.clone());
    dashboard::check_protected_root(&protected);

    Router::new()
        .merge(api)
        .merge(members)
        .merge(admin)
        .merge(pages)
        .fallback_service(assets)
        .layer(from_fn_with_state(auth.clone(), resolve_session))
        .layer(from_fn_with_state(
            Guarded::new(auth.clone(), [Stage::RateLimit]),
            enforce,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(auth))
                .layer(Extension(state.subscribers))
                .layer(Extension(state.mailer))
                .layer(Extension(protected)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: AppState) -> Result<()> {
    let app = app(state);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
