mod launcher;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use scanr_client::{HttpSession, ModCatalogClient, pick_user_agent, register_builtin};
use scanr_core::config::{DEFAULT_SETTINGS_PATH, SessionEngine};
use scanr_core::traits::BrowserSession;
use scanr_core::{
    ExclusiveSession, Pipeline, Settings, SiteIntegration, SiteRegistry, SourceConfig,
    SourceRuntime, TracingReporter,
};
use scanr_db::{Database, DatabaseConfig, QueryRepository};

#[derive(Parser)]
#[command(name = "scanr", version, about = "Mod metadata scraper with one process per source")]
struct Cli {
    /// Settings file
    #[arg(short, long, env = "SCANR_CONFIG", default_value = DEFAULT_SETTINGS_PATH, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch and supervise one process per enabled source
    Run,

    /// Run a single source in this process
    Source {
        /// Position of the source in the settings file
        #[arg(short, long)]
        index: usize,
    },

    /// Print the resolved settings with secrets masked
    List,

    /// Apply database migrations
    Migrate,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;
    settings.apply_env();

    let _log_guard = logging::init(&settings)?;
    if !cli.config.exists() {
        tracing::warn!(path = %cli.config.display(), "Settings file not found, using defaults");
    }
    settings.validate()?;

    match cli.command {
        Commands::Run => {
            let cancel = cancel_on_shutdown_signal()?;
            launcher::run(&settings, &cli.config, cancel).await?;
        }
        Commands::Source { index } => cmd_source(&settings, index).await?,
        Commands::List => cmd_list(&settings)?,
        Commands::Migrate => {
            let db = connect_db(&settings).await?;
            db.migrate().await?;
            tracing::info!("Migrations applied");
        }
    }

    Ok(())
}

/// A token cancelled on CTRL+C or, on Unix, SIGTERM.
fn cancel_on_shutdown_signal() -> Result<CancellationToken> {
    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            tokio::select! {
                result = ctrl_c => log_ctrl_c(result),
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            log_ctrl_c(ctrl_c.await);
        }
        trigger.cancel();
    });
    Ok(cancel)
}

fn log_ctrl_c(result: std::io::Result<()>) {
    match result {
        Ok(()) => tracing::info!("Received CTRL+C, shutting down"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for CTRL+C, shutting down"),
    }
}

async fn connect_db(settings: &Settings) -> Result<Database> {
    let config = DatabaseConfig::from_settings(&settings.database)?;
    Database::connect(&config)
        .await
        .context("Failed to connect to database")
}

async fn cmd_source(settings: &Settings, index: usize) -> Result<()> {
    let source = settings.source(index)?.clone();
    if !source.is_launchable() {
        bail!(
            "Source #{index} ({}) is disabled or has no scraper",
            source.display_name()
        );
    }

    let mut registry = SiteRegistry::new();
    register_builtin(&mut registry);
    let site = registry.build(&source)?;

    let store = connect_db(settings).await?.query_repo();
    let catalog = ModCatalogClient::new(&settings.api)?;
    let user_agent = pick_user_agent(&settings.user_agents);

    match settings.session.engine {
        SessionEngine::Http => {
            let session = HttpSession::new(user_agent, settings.page_timeout())?;
            run_source(settings, source, store, catalog, session, site).await
        }
        SessionEngine::Browser => {
            let session = launch_browser(settings, user_agent).await?;
            run_source(settings, source, store, catalog, session, site).await
        }
    }
}

#[cfg(feature = "browser")]
async fn launch_browser(
    settings: &Settings,
    user_agent: Option<&str>,
) -> Result<scanr_client::ChromiumSession> {
    Ok(scanr_client::ChromiumSession::launch(
        settings.binary_path.as_deref(),
        user_agent,
        settings.page_timeout(),
    )
    .await?)
}

#[cfg(not(feature = "browser"))]
async fn launch_browser(_settings: &Settings, _user_agent: Option<&str>) -> Result<HttpSession> {
    bail!("session.engine is \"browser\" but scanr was built without the `browser` feature")
}

async fn run_source<B: BrowserSession>(
    settings: &Settings,
    source: SourceConfig,
    store: QueryRepository,
    catalog: ModCatalogClient,
    session: B,
    site: Arc<dyn SiteIntegration>,
) -> Result<()> {
    let label = source.display_name().to_string();
    let pipeline = Pipeline::new(
        settings,
        source,
        store,
        catalog,
        ExclusiveSession::new(session),
        site,
    );

    SourceRuntime::new(pipeline)
        .run(cancel_on_shutdown_signal()?, &TracingReporter)
        .await
        .with_context(|| format!("Source {label} stopped with a fatal error"))
}

fn cmd_list(settings: &Settings) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
    println!();
    for (index, source) in settings.sources.iter().enumerate() {
        println!("{}", describe_source(index, source));
    }
    Ok(())
}

/// One-paragraph summary of a source for `scanr list`.
fn describe_source(index: usize, source: &SourceConfig) -> String {
    let state = match (&source.scraper, source.disabled) {
        (None, _) => "no scraper".to_string(),
        (Some(_), true) => "disabled".to_string(),
        (Some(scraper), false) => format!("enabled ({scraper})"),
    };

    let mut lines = vec![format!(
        "[{index}] {} <{}> {state}",
        source.display_name(),
        source.base_url()
    )];
    for (slug, id) in &source.categories {
        lines.push(format!("    category {slug} => {id}"));
        if let Some(children) = source.cats_children.get(slug) {
            for (child, child_id) in children {
                lines.push(format!("        child {child} => {child_id}"));
            }
        }
    }
    if !source.avoid_ids.is_empty() {
        lines.push(format!("    avoid ids: {}", source.avoid_ids.join(", ")));
    }
    lines.join("\n")
}
