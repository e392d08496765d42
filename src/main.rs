//! Recipe API server
//!
//! Serves the recipe REST API over a Sled database.
//!
//! Usage:
//!   cargo run --bin recipe_api                       # serve on RECIPE_BIND_ADDR
//!   cargo run --bin recipe_api -- create-superuser -e admin@example.com -p secret -n Admin
//!   cargo run --bin seed_data                        # optional demo data

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use recipe_api::auth::hash_password;
use recipe_api::config::{self, Config};
use recipe_api::rest::create_router;
use recipe_api::serializers::UserPayload;
use recipe_api::storage::Storage;
use recipe_api::telemetry::init_logging;

#[derive(Parser, Debug)]
#[command(name = "recipe_api", version, about = "Recipe management REST API", long_about = None)]
struct Args {
    /// Address to listen on (overrides RECIPE_BIND_ADDR)
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Sled database directory (overrides RECIPE_DATA_DIR)
    #[arg(short, long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create a staff user with superuser rights
    CreateSuperuser {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    let _log_guard = init_logging(&config::log_dir(), "recipe_api.log");

    let mut config = Config::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    let storage = Storage::open(&config.data_dir)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(storage, config).await?,
        Command::CreateSuperuser {
            email,
            password,
            name,
        } => create_superuser(&storage, email, password, name)?,
    }
    Ok(())
}

async fn serve(storage: Storage, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = config.bind_addr.clone();
    info!(data_dir = %config.data_dir, media_root = %config.media_root.display(), "Opening recipe store");

    let app = create_router(storage.clone(), config);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Recipe API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down, flushing store");
    storage.flush().await?;
    Ok(())
}

fn create_superuser(
    storage: &Storage,
    email: String,
    password: String,
    name: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = UserPayload {
        email: Some(email),
        password: Some(password),
        name: Some(name),
    };
    let input = payload.validate(false).map_err(|errors| {
        error!(?errors, "Invalid superuser details");
        format!("invalid superuser details: {errors:?}")
    })?;
    let (Some(email), Some(password), Some(name)) = (input.email, input.password, input.name) else {
        return Err("invalid superuser details".into());
    };

    let user = storage.create_user(&email, &hash_password(&password)?, &name, true, true)?;
    info!(user_id = user.id, email = %user.email, "Created superuser");
    println!("Superuser {} created (id {})", user.email, user.id);
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM. A handler that cannot be installed
/// never resolves, so a failed install does not stop the server.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_signal_waits_without_a_signal() {
        let waited = tokio::time::timeout(Duration::from_millis(50), shutdown_signal()).await;
        assert!(waited.is_err());
    }
}
