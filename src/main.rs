use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flatshop_core::{
    CoreConfig, DataService, LogNotifier, Notifier,
    config::{max_collection_bytes_from_env_value, session_ttl_from_env_value},
    constants::DEFAULT_DATA_DIR,
};
use flatshop_mailer::{MailerConfig, SendGridNotifier};

/// Builds the confirmation notifier from the environment.
///
/// `SENDGRID_API_KEY` takes precedence over the JSON file named by `FLATSHOP_MAIL_CONFIG`.
/// Without either, confirmation emails are only logged.
fn build_notifier() -> anyhow::Result<Arc<dyn Notifier>> {
    let config = match (
        std::env::var("SENDGRID_API_KEY").ok().filter(|k| !k.is_empty()),
        std::env::var("FLATSHOP_MAIL_CONFIG").ok(),
    ) {
        (Some(key), _) => MailerConfig::new(SecretString::from(key)),
        (None, Some(path)) => MailerConfig::from_file(&PathBuf::from(path))?,
        (None, None) => {
            tracing::warn!("no mail provider configured; confirmation emails will only be logged");
            return Ok(Arc::new(LogNotifier));
        }
    };

    let config = match std::env::var("FLATSHOP_MAIL_FROM") {
        Ok(from) => config.with_from(from),
        Err(_) => config,
    };
    let config = match std::env::var("FLATSHOP_CONFIRM_URL") {
        Ok(url) => config.with_confirm_url(url),
        Err(_) => config,
    };

    tracing::info!(from = config.from_address(), "sending confirmation emails via SendGrid");
    Ok(Arc::new(SendGridNotifier::new(config)?))
}

/// Main entry point for the flatshop backend
///
/// Resolves configuration, prepares the data directory and serves the REST API.
///
/// # Environment Variables
/// - `FLATSHOP_DATA_DIR`: Directory for collection storage (default: "data")
/// - `FLATSHOP_MAX_COLLECTION_BYTES`: Size above which a collection is sharded (default: 1000)
/// - `FLATSHOP_SESSION_TTL_SECS`: Login session validity in seconds (default: 600)
/// - `FLATSHOP_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `SENDGRID_API_KEY` / `FLATSHOP_MAIL_CONFIG`: mail provider credentials
/// - `FLATSHOP_MAIL_FROM`, `FLATSHOP_CONFIRM_URL`: confirmation email sender and link target
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - configuration values are invalid or the data directory cannot be prepared,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flatshop_run=info".parse()?)
                .add_directive("flatshop_core=info".parse()?)
                .add_directive("flatshop_mailer=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = std::env::var("FLATSHOP_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let max_collection_bytes =
        max_collection_bytes_from_env_value(std::env::var("FLATSHOP_MAX_COLLECTION_BYTES").ok())?;
    let session_ttl = session_ttl_from_env_value(std::env::var("FLATSHOP_SESSION_TTL_SECS").ok())?;
    let cfg = Arc::new(CoreConfig::new(
        PathBuf::from(data_dir),
        max_collection_bytes,
        session_ttl,
    )?);

    let service = Arc::new(DataService::new(cfg, build_notifier()?));
    service.init().await?;

    let rest_addr = std::env::var("FLATSHOP_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    tracing::info!("++ Starting flatshop REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, api_rest::router(service)).await?;

    Ok(())
}
