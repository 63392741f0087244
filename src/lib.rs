pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod report;

use std::sync::Arc;
use actix_web::middleware::from_fn;
use actix_web::{web, HttpResponse};
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, MemorySessionStore, PasswordHasher, RedisSessionStore, SessionStore, TokenIssuer};
pub use db::{CredentialStore, DbOperations, LedgerStore, MemoryStore};
pub use ledger::LedgerService;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let mut body = serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    });
    if let Some(db) = &state.db {
        body["database"] = serde_json::json!(db.get_pool_status());
    }
    HttpResponse::Ok().json(body)
}

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth_service: Arc<AuthService>,
    pub ledger: Arc<LedgerService>,
    db: Option<DbOperations>,
}

impl AppState {
    /// Connects to Postgres and Redis using `config`.
    pub async fn new(config: Settings) -> Result<Self> {
        let db = DbOperations::new_with_options(
            &config.database.url,
            config.database.max_connections,
            config.database.acquire_timeout(),
        )
        .await?;
        if config.database.run_migrations {
            db.run_migrations().await?;
            info!("Database migrations applied");
        }

        let sessions = RedisSessionStore::connect(&config.cache).await?;
        let db_store = Arc::new(db.clone());

        let mut state = Self::from_parts(
            config,
            db_store.clone(),
            db_store,
            Arc::new(sessions),
            PasswordHasher::default(),
        )?;
        state.db = Some(db);
        Ok(state)
    }

    /// Wires the services over the given stores.
    pub fn from_parts(
        config: Settings,
        credentials: Arc<dyn CredentialStore>,
        ledger_store: Arc<dyn LedgerStore>,
        sessions: Arc<dyn SessionStore>,
        hasher: PasswordHasher,
    ) -> Result<Self> {
        let issuer = TokenIssuer::new(&config.auth)?;
        let auth_service = AuthService::new(credentials.clone(), sessions, hasher, issuer);
        let ledger = LedgerService::new(ledger_store, credentials);

        Ok(Self {
            config: Arc::new(config),
            auth_service: Arc::new(auth_service),
            ledger: Arc::new(ledger),
            db: None,
        })
    }

    /// Everything in process; nothing survives a restart.
    pub fn in_memory(config: Settings, hasher: PasswordHasher) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        Self::from_parts(
            config,
            store.clone(),
            store,
            Arc::new(MemorySessionStore::new()),
            hasher,
        )
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(db) = &self.db {
            db.close().await;
        }
        Ok(())
    }
}

/// Registers every route. `/v1/api` and logout sit behind the session guard.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    use auth::handlers as auth_handlers;
    use ledger::handlers as ledger_handlers;

    cfg.route("/health", web::get().to(health_check))
        .service(
            web::scope("/v1/auth")
                .route("/create", web::post().to(auth_handlers::register))
                .route("/login", web::post().to(auth_handlers::login))
                .route("/refresh", web::post().to(auth_handlers::refresh))
                .service(
                    web::resource("/logout")
                        .wrap(from_fn(auth::require_session))
                        .route(web::post().to(auth_handlers::logout)),
                ),
        )
        .service(
            web::scope("/v1/api")
                .wrap(from_fn(auth::require_session))
                .route("/me", web::get().to(auth_handlers::me))
                .route("/account", web::post().to(ledger_handlers::create_account))
                .route("/account", web::get().to(ledger_handlers::list_accounts))
                .route("/account", web::put().to(ledger_handlers::update_account))
                .route("/account/{id}", web::get().to(ledger_handlers::get_account))
                .route("/transaction", web::post().to(ledger_handlers::create_transaction))
                .route("/transaction", web::get().to(ledger_handlers::list_transactions))
                .route("/transaction/{id}", web::get().to(ledger_handlers::get_transaction))
                .route("/reports", web::post().to(ledger_handlers::export_report)),
        );
}
