use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::Redirect,
    routing::get,
};
use clap::Parser;
use serde_json::{Value, json};
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meus_clientes::config::Config;
use meus_clientes::crypto::{MasterKey, hash_password};
use meus_clientes::db::{AppState, create_pool, init_db, migrations, queries};
use meus_clientes::handlers;
use meus_clientes::jobs;
use meus_clientes::models::{NewUser, Plan, Role};
use meus_clientes::util::today;

const MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;

/// Password of the demo tenants created by `--seed`.
const DEMO_PASSWORD: &str = "123456";

#[derive(Parser, Debug)]
#[command(name = "meus-clientes")]
#[command(about = "Invoicing and payment reminders for small businesses")]
struct Cli {
    /// Insert demo tenants when the database has at most one user (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Print a new base64 MASTER_KEY and exit
    #[arg(long)]
    generate_master_key: bool,
}

/// Create the master admin from `BOOTSTRAP_ADMIN_*` when no admin exists yet.
fn bootstrap_master_admin(state: &AppState, email: &str, password: &str) {
    let conn = state.db.get().expect("Failed to get db connection for bootstrap");

    if queries::has_admin(&conn).expect("Failed to check for admins") {
        tracing::debug!("Admin already exists, skipping bootstrap");
        return;
    }

    let password_hash = hash_password(password).expect("Failed to hash bootstrap password");
    let admin = queries::create_user(
        &conn,
        &NewUser {
            name: "Administrador",
            email,
            password_hash: &password_hash,
            whatsapp: None,
            cpf: None,
            plan: Plan::Premium,
            role: Role::Admin,
            is_master: true,
            owner_id: None,
            created_at: today(),
        },
    )
    .expect("Failed to create bootstrap admin");

    tracing::info!("============================================");
    tracing::info!("MASTER ADMIN CREATED: {} (id {})", admin.email, admin.id);
    tracing::info!("============================================");
}

fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");
    let password_hash = hash_password(DEMO_PASSWORD).expect("Failed to hash demo password");

    let created = queries::seed_demo_users(&conn, &password_hash, today())
        .expect("Failed to seed demo users");
    if created == 0 {
        tracing::info!("Database already has users, skipping seed");
    } else {
        tracing::info!("Seeded {} demo users (password: {})", created, DEMO_PASSWORD);
    }
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.db.get() {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" })))
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.generate_master_key {
        println!("{}", MasterKey::generate());
        return;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meus_clientes=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");

    {
        let mut conn = db_pool.get().expect("Failed to get connection");
        migrations::run_migrations(&mut conn, &config.database_path, config.migration_backup_count)
            .expect("Failed to run migrations");
        init_db(&conn).expect("Failed to initialize database");

        let encrypted = queries::encrypt_legacy_smtp_passwords(&conn, &config.master_key)
            .expect("Failed to encrypt stored SMTP passwords");
        if encrypted > 0 {
            tracing::info!("Encrypted {} plaintext SMTP password(s)", encrypted);
        }
    }

    std::fs::create_dir_all(&config.upload_dir).expect("Failed to create upload directory");

    let state = AppState::from_config(db_pool, &config);

    if let (Some(email), Some(password)) = (
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_password.as_deref(),
    ) {
        bootstrap_master_admin(&state, email, password);
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set APP_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    // Dropping the scheduler stops the cron job
    let _scheduler = jobs::start(state.clone(), &config.jobs)
        .await
        .expect("Failed to start background jobs");

    let app = Router::new()
        .merge(handlers::router(state.clone(), config.auth_rate_limit_rpm))
        .route("/", get(|| async { Redirect::temporary("/login.html") }))
        .route("/health", get(health))
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .fallback_service(ServeDir::new(&config.public_dir))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Meus Clientes listening on {} ({})", addr, config.base_url);

    // ConnectInfo feeds the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
