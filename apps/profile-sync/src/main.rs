use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use profile_sync::backend::http::HttpBackend;
use profile_sync::backend::memory::InMemoryBackend;
use profile_sync::backend::ProfileBackend;
use profile_sync::config::Config;
use profile_sync::models::attachment::PendingFile;
use profile_sync::models::profile::ProfileDraft;
use profile_sync::sync::SyncEngine;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Save,
    Finalize,
}

/// Saves an edited profile draft to the profile backend.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// JSON file holding the edited profile
    #[arg(long)]
    draft: PathBuf,

    #[arg(long, value_enum, default_value = "save")]
    mode: Mode,

    /// Image to upload as the profile picture
    #[arg(long)]
    profile_image: Option<PathBuf>,

    /// Document to upload as the portfolio
    #[arg(long)]
    portfolio: Option<PathBuf>,

    /// Run against an in-memory backend instead of the configured API
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("profile_sync={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting profile-sync v{}", env!("CARGO_PKG_VERSION"));

    let backend: Arc<dyn ProfileBackend> = if args.dry_run {
        info!("Dry run: using in-memory backend");
        Arc::new(InMemoryBackend::new())
    } else {
        Arc::new(HttpBackend::new(
            config.api_base_url.clone(),
            config.api_token.clone(),
            config.request_timeout,
        )?)
    };
    let engine = SyncEngine::new(backend, config.policy());
    info!("Sync policy: {:?}", engine.policy());

    let raw = tokio::fs::read_to_string(&args.draft)
        .await
        .with_context(|| format!("Failed to read draft {}", args.draft.display()))?;
    let edited: ProfileDraft = serde_json::from_str(&raw).context("Draft is not valid JSON")?;

    let mut session = engine.load_session().await?;
    session.replace_draft(edited);
    if let Some(path) = &args.profile_image {
        let file = PendingFile::from_path(path).await?;
        session.draft_mut().profile_image.attach(file);
    }
    if let Some(path) = &args.portfolio {
        let file = PendingFile::from_path(path).await?;
        session.draft_mut().portfolio.attach(file);
    }

    let report = match args.mode {
        Mode::Save => engine.save_draft(&mut session).await?,
        Mode::Finalize => match engine.finalize(session).await {
            Ok(finalized) => finalized.report,
            Err(e) => {
                warn!("Draft kept for another attempt");
                return Err(e.into());
            }
        },
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
