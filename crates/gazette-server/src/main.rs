mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use gazette_db::Database;
use gazette_types::input::{NewUser, ProfileInput};
use gazette_web::forms::normalize_email;
use gazette_web::media::MediaStore;
use gazette_web::password::{UserAttributes, hash_password, validate_password};
use gazette_web::{AppState, AppStateInner, router};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "gazette")]
#[command(about = "A simple news app: articles, issues, comments and reader accounts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web server (default)
    Serve,
    /// Create an active staff account
    CreateStaff {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gazette=debug,gazette_web=debug,gazette_db=debug,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::CreateStaff { email, first_name, last_name, password } => {
            create_staff(&config, &email, &first_name, &last_name, &password)
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let db = Database::open(&config.db_path)?;
    let media = MediaStore::new(config.media_root.clone()).await?;
    let mailer = config.mailer()?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        secret_key: config.secret_key.clone(),
        site_url: config.site_url.clone(),
        media,
        mailer,
        token_timeout: config.token_timeout,
    });
    let app = router::build(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Gazette listening on {}", addr);
    info!("Links in emails point at {}", config.site_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn create_staff(
    config: &Config,
    email: &str,
    first_name: &str,
    last_name: &str,
    password: &str,
) -> anyhow::Result<()> {
    let email = normalize_email(email);
    let complaints = validate_password(
        password,
        &UserAttributes { email: &email, first_name, last_name },
    );
    if !complaints.is_empty() {
        bail!("Password rejected: {}", complaints.join(" "));
    }

    let db = Database::open(&config.db_path)?;
    if db.email_taken(&email)? {
        bail!("That email is already taken.");
    }
    let id = db.create_user(
        &NewUser {
            email: email.clone(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            password_hash: hash_password(password)?,
            is_active: true,
            is_staff: true,
        },
        &ProfileInput::default(),
    )?;
    info!("Created staff account {} ({})", id, email);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
