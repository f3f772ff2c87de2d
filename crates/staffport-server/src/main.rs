use std::{env, net::SocketAddr, sync::Arc};

use staffport_auth::{CredentialStore, Directory};
use staffport_core::{Client, ClientAssignment, Role};
use staffport_server::config::loader::load_config;
use staffport_server::config::{AppConfig, BackendKind};
use staffport_server::{AppState, build_app};
use staffport_store_http::HttpStore;
use staffport_store_memory::MemoryStore;

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From STAFFPORT_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (staffport.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (STAFFPORT_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present, before anything else reads the
    // environment.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    staffport_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = config_path.as_deref().unwrap_or("staffport.toml"),
        source = %source,
        "Configuration loaded"
    );
    staffport_server::observability::apply_logging_level(&cfg.logging.level);

    let (store, directory) = match build_backend(&cfg) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Backend initialization failed: {e}");
            std::process::exit(2);
        }
    };

    let state = AppState::new(store, directory, cfg.auth.gate.clone(), cfg.auth.fetch_timeout);
    state.ctx.initialize().await;

    let app = build_app(state.clone());
    let addr: SocketAddr = match format!("{}:{}", cfg.server.host, cfg.server.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Invalid server address: {e}");
            std::process::exit(2);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "staffport listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    state.ctx.shutdown().await;
}

fn resolve_config_path() -> (Option<String>, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (Some(path), ConfigSource::CliArgument);
            }
        }
    }
    if let Ok(path) = env::var("STAFFPORT_CONFIG") {
        return (Some(path), ConfigSource::EnvironmentVariable);
    }
    (None, ConfigSource::Default)
}

fn build_backend(
    cfg: &AppConfig,
) -> Result<(Arc<dyn CredentialStore>, Arc<dyn Directory>), String> {
    match cfg.backend.kind {
        BackendKind::Http => {
            let store = Arc::new(
                HttpStore::new(&cfg.backend.url, &cfg.backend.public_key)
                    .map_err(|e| e.to_string())?,
            );
            Ok((store.clone(), store))
        }
        BackendKind::Memory => {
            let store = Arc::new(demo_store().map_err(|e| e.to_string())?);
            tracing::warn!("Using the in-memory backend; data resets on restart");
            Ok((store.clone(), store))
        }
    }
}

/// Seeds the local-dev backend with one employee and a few clients.
fn demo_store() -> staffport_auth::AuthResult<MemoryStore> {
    let store = MemoryStore::new();
    let ana = store.seed_user("ana@example.com", "password", Some(("Ana Demo", Role::Employee)))?;
    store.seed_user(
        "visitor@example.com",
        "password",
        Some(("Visiting Client", Role::Other("client".to_string()))),
    )?;

    let clients = [
        ("Acme Industries", "ops@acme.example"),
        ("Borealis Labs", "hello@borealis.example"),
    ];
    for (name, email) in clients {
        let client = Client {
            id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            contact_email: email.to_string(),
        };
        store.seed_assignment(ClientAssignment {
            employee_id: ana.id,
            client_id: client.id,
            is_active: true,
        });
        store.seed_client(client);
    }
    tracing::info!("Demo login: ana@example.com / password");
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
