use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    middleware,
    routing::{get, post, put},
};
use teus_auth::middleware::{AuthState, authentication_middleware};
use teus_auth::policy::{AccessRule, require_rule};
use teus_auth::storage::{InMemoryRevocationStore, spawn_revocation_sweeper};
use teus_auth::token::{JwtService, SigningKeyPair, TokenConfig, TokenService};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::accounts::UserAccounts;
use crate::bootstrap::bootstrap_admin_user;
use crate::config::AppConfig;
use crate::handlers;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub token_service: Arc<TokenService>,
    pub accounts: Arc<UserAccounts>,
    pub revocations: Arc<InMemoryRevocationStore>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Wires the signing key, revocation store, accounts and token service.
pub fn build_state(cfg: &AppConfig) -> anyhow::Result<AppState> {
    let signing_key =
        SigningKeyPair::from_config(&cfg.auth.signing).context("failed to load signing key")?;
    tracing::info!(
        algorithm = %signing_key.algorithm,
        kid = %signing_key.kid,
        issuer = %cfg.auth.issuer,
        "Token signing key ready"
    );

    let jwt_service = Arc::new(JwtService::new(signing_key, cfg.auth.issuer.clone()));
    let revocations = Arc::new(InMemoryRevocationStore::new());
    let accounts = Arc::new(UserAccounts::new());
    let token_service = Arc::new(TokenService::new(
        jwt_service,
        revocations.clone(),
        accounts.clone(),
        TokenConfig::from(&cfg.auth),
    ));

    Ok(AppState {
        auth: AuthState::new(token_service.clone()),
        token_service,
        accounts,
        revocations,
    })
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;

    // AccessRule::Public; logout validates its own bearer header.
    let public = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route("/api/v1/auth/refresh-token", post(handlers::auth::refresh_token))
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .route("/api/v1/users/register", post(handlers::users::register));

    // AuthenticatedOnly (extractor) and SelfOrAdmin (checked in the handler).
    let authenticated = Router::new()
        .route("/api/v1/users/me", get(handlers::users::me))
        .route("/api/v1/users/{email}", get(handlers::users::get_user));

    let admin = Router::new()
        .route("/api/v1/users", get(handlers::users::list_users))
        .route("/api/v1/users/{email}/role", put(handlers::users::update_role))
        .route_layer(middleware::from_fn_with_state(
            AccessRule::admin_only(),
            require_rule,
        ));

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(admin)
        // Middleware stack (order: body limit -> trace -> compression/cors -> authentication)
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            authentication_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub struct TeusServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    sweep_interval: Duration,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Builds state, bootstraps the admin account and assembles the router.
    pub async fn build(self) -> anyhow::Result<TeusServer> {
        let state = build_state(&self.config)?;

        if let Some(admin) = &self.config.bootstrap.admin_user {
            bootstrap_admin_user(&state.accounts, admin)
                .await
                .context("admin bootstrap failed")?;
        }

        let app = build_app(&self.config, state.clone());

        Ok(TeusServer {
            addr: self.addr,
            app,
            state,
            sweep_interval: self.config.auth.revocation.sweep_interval,
        })
    }
}

impl TeusServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `shutdown` resolves.
    ///
    /// The revocation sweeper runs for exactly as long as the server.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let sweeper = spawn_revocation_sweeper(self.state.revocations.clone(), self.sweep_interval);
        tracing::info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Revocation sweeper started"
        );

        tracing::info!("listening on {}", listener.local_addr()?);
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.abort();
        tracing::info!(
            pending_revocations = self.state.revocations.len(),
            "Server stopped"
        );
        result.map_err(Into::into)
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
