use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use eventtrail::analysis_store::AnalysisResultStore;
use eventtrail::app::{self, AppState};
use eventtrail::auth::{SessionManager, VerificationService};
use eventtrail::db::Database;
use eventtrail::environment::Settings;
use eventtrail::logging::configure_logging;
use eventtrail::pipeline::{AnalysisDispatcher, SearchOrchestrator};
use eventtrail::scheduler::{spawn_refresh_daemon, DailyCadence, RefreshScheduler};
use eventtrail::workflow::HttpWorkflowGateway;

#[derive(Parser)]
#[clap(name = "eventtrail", about = "Event search, analysis and tracking service")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the daily favorite refresh (default)
    Serve,
    /// Refresh every favorite once and exit
    Refresh,
    /// Create the database schema and exit
    InitDb,
}

fn orchestrator(settings: &Settings, db: &Database) -> Result<Arc<SearchOrchestrator>> {
    let gateway = HttpWorkflowGateway::new(&settings.workflow.base_url, &settings.workflow.token)
        .context("failed to build workflow client")?;
    let store = Arc::new(AnalysisResultStore::new(db.clone()));
    Ok(Arc::new(SearchOrchestrator::new(
        Arc::new(gateway),
        &settings.workflow,
        store,
        AnalysisDispatcher::new(settings.analysis_workers),
    )))
}

async fn serve(settings: Settings, db: Database) -> Result<()> {
    let orchestrator = orchestrator(&settings, &db)?;

    let cadence = DailyCadence::new(
        settings.refresh.utc_offset_hours,
        settings.refresh.hour,
        settings.refresh.minute,
    )
    .ok_or_else(|| anyhow!("invalid refresh schedule"))?;
    let refresher = Arc::new(RefreshScheduler::new(db.clone(), orchestrator.clone()));
    spawn_refresh_daemon(refresher, cadence);

    let state = AppState {
        db: db.clone(),
        orchestrator,
        verification: Arc::new(VerificationService::new(db.clone(), settings.verification.clone())),
        sessions: Arc::new(SessionManager::new(db, &settings.secret_key, settings.session_hours)),
    };
    app::serve(state, settings.port, &settings.cors_origins).await
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();
    let cli = Cli::parse();

    let settings = Settings::from_env()?;
    let db = Database::new(&settings.database_path)
        .await
        .with_context(|| format!("failed to open database {}", settings.database_path))?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(settings, db).await,
        Commands::Refresh => {
            let refresher = RefreshScheduler::new(db.clone(), orchestrator(&settings, &db)?);
            let summary = refresher.run_once().await;
            info!(
                "refreshed {} of {} favorites ({} failed)",
                summary.refreshed, summary.total, summary.failed
            );
            Ok(())
        }
        Commands::InitDb => {
            info!("database schema ready at {}", settings.database_path);
            Ok(())
        }
    }
}
