use axum::{Router, routing};
use simple_git_hooks::api::handle_webhook;
use simple_git_hooks::logging::{LogTarget, setup_logging};
use simple_git_hooks::{AppState, HookConfig, load_config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{self, error, info, warn};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:7654";
const DEFAULT_CONFIG_PATH: &str = "hooks.toml";

fn env_setting(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Apply environment overrides on top of the config file.
fn apply_env_overrides(mut config: HookConfig) -> HookConfig {
    if let Some(scripts_path) = env_setting("HOOK_SCRIPTS_PATH") {
        config.scripts_path = Some(PathBuf::from(scripts_path));
    }
    if let Some(secret) = env_setting("HOOK_SECRET") {
        config.secret = secret;
    }
    config
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    let config_path =
        std::env::var("HOOK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let log_target = LogTarget::from_setting(std::env::var("HOOK_LOG").ok().as_deref());

    // Held for the lifetime of the process so file logs get flushed
    let _log_guard = match setup_logging(&log_target) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging error: {}", e);
            std::process::exit(1);
        }
    };

    let config = match load_config(&config_path) {
        Ok(cfg) => apply_env_overrides(cfg),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    match &config.scripts_path {
        Some(dir) => info!("Looking in {} for hook scripts", dir.display()),
        None => info!("Looking on $PATH for hook scripts"),
    }
    if config.secret.is_empty() {
        warn!("Webhook secret is empty; signatures are checked against an empty key");
    }
    info!("Loaded {} hooks from {:?}", config.hooks.len(), config_path);

    let state = Arc::new(AppState::new(config));
    let app = Router::new()
        .route("/", routing::post(handle_webhook))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", bind_address);
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
