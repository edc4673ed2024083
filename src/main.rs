use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod authz;
mod blogs;
mod cache;
mod cli;
mod config;
mod errors;
mod jobs;
mod mail;
mod models;
mod store;

use auth::session::SessionService;
use auth::token::{TokenSecrets, TokenService};
use blogs::BlogService;
use cache::CredentialCache;
use jobs::handlers::JobContext;
use jobs::queue::RedisQueue;
use jobs::runner::JobRunner;
use jobs::JobQueue;
use mail::http::HttpMailer;
use store::media::ObjectMediaStore;
use store::postgres::PgStore;
use store::{BlogStore, UserStore};

/// Shared application state handed to handlers and guards.
pub struct AppState {
    pub sessions: SessionService,
    pub blogs: BlogService,
    pub tokens: TokenService,
    pub config: config::Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "inkwell=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Worker) => run_worker(cfg).await,
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    tracing::info!("Connecting to Redis...");
    let redis_client = redis::Client::open(cfg.redis_url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;

    tokio::fs::create_dir_all(&cfg.upload_spool_dir).await?;

    let users: Arc<dyn UserStore> = Arc::new(db.clone());
    let blog_store: Arc<dyn BlogStore> = Arc::new(db);

    let cache = CredentialCache::redis(redis_conn.clone());
    let secrets = TokenSecrets::from_config(&cfg);
    let tokens = TokenService::new(cache, users.clone(), &secrets);

    let redis_queue = RedisQueue::new(redis_conn, cfg.job_max_attempts);
    let queue: Arc<dyn JobQueue> = Arc::new(redis_queue.clone());

    let sessions = SessionService::new(users.clone(), tokens.clone(), queue.clone(), &cfg);
    let blog_service = BlogService::new(blog_store.clone(), queue);

    let mailer = HttpMailer::new(
        cfg.mail_api_url.clone(),
        cfg.mail_api_key.clone(),
        cfg.mail_from.clone(),
    );
    let media = ObjectMediaStore::from_url(&cfg.media_store_url, &cfg.media_public_url)?;

    // In-process worker; scale out with dedicated `inkwell worker` processes.
    JobRunner::new(
        redis_queue,
        JobContext {
            users,
            blogs: blog_store,
            mailer: Arc::new(mailer),
            media: Arc::new(media),
        },
    )
    .spawn();

    let cors_origins = cfg.cors_origins.clone();
    let state = Arc::new(AppState {
        sessions,
        blogs: blog_service,
        tokens,
        config: cfg,
    });

    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .route("/readyz", axum::routing::get(readiness_check))
        .nest("/api/v1", api::api_router(state.clone()))
        .with_state(state)
        // Uploads are capped at 1 MB each; leave headroom for the rest of
        // the form.
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    cors_origins.iter().any(|o| o == origin_str)
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                // Credentialed CORS forbids wildcard headers.
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                ])
                .allow_credentials(true)
        })
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("inkwell listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Foreground job worker. Shares nothing with the HTTP server beyond the
/// queue, so it can run on separate hosts.
async fn run_worker(cfg: config::Config) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Connecting to Redis...");
    let redis_client = redis::Client::open(cfg.redis_url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;

    tokio::fs::create_dir_all(&cfg.upload_spool_dir).await?;

    let mailer = HttpMailer::new(cfg.mail_api_url, cfg.mail_api_key, cfg.mail_from);
    let media = ObjectMediaStore::from_url(&cfg.media_store_url, &cfg.media_public_url)?;

    let users: Arc<dyn UserStore> = Arc::new(db.clone());
    let blog_store: Arc<dyn BlogStore> = Arc::new(db);

    JobRunner::new(
        RedisQueue::new(redis_conn, cfg.job_max_attempts),
        JobContext {
            users,
            blogs: blog_store,
            mailer: Arc::new(mailer),
            media: Arc::new(media),
        },
    )
    .run()
    .await;

    Ok(())
}

/// Hardening headers on every response. The API serves tokens and
/// cookies, so responses must never be cached or framed.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::http::HeaderValue;

    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    // tokens travel in links; keep them out of referrer headers
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");
    resp
}

/// Injects a unique X-Request-Id so clients can correlate errors with
/// server logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn readiness_check() -> &'static str {
    "ok"
}
