use clap::Parser;
use scan_pipeline::collaborators::FixtureCollaborators;
use scan_pipeline::common::CapturedFrame;
use scan_pipeline::pipeline::services::publisher::wait_for_terminal;
use scan_pipeline::{AppError, Configuration, SupervisorBuilder};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn, Level};

/// Runs one item scan against scripted collaborators.
#[derive(Parser, Debug)]
#[command(name = "scan-pipeline")]
#[command(version)]
struct Cli {
    /// Photo of the item
    image: PathBuf,

    /// Barcode or other code read from the item
    #[arg(long)]
    code: Option<String>,

    /// JSON script for the collaborators
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Configuration file layered under SCAN_* environment variables
    #[arg(long)]
    config: Option<String>,
}

fn init_logging(level: &str) {
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let configuration = Configuration::load(cli.config.as_deref())?;
    init_logging(&configuration.log_level);

    let fixtures = match &cli.fixtures {
        Some(path) => FixtureCollaborators::from_json_file(path)?,
        None => FixtureCollaborators::default(),
    };
    let image = image::open(&cli.image)?;
    info!(path = %cli.image.display(), width = image.width(), height = image.height(), "Image loaded");

    let supervisor = SupervisorBuilder::new(configuration)
        .fixtures(fixtures)
        .build()?;
    let mut updates = supervisor.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            let terminal = update.is_terminal();
            if let Ok(line) = serde_json::to_string(&update) {
                println!("{}", line);
            }
            if terminal {
                break;
            }
        }
    });

    let mut terminal = supervisor.subscribe();
    let session_id = supervisor.scan(CapturedFrame::new(image), cli.code).await?;
    let Some(update) = wait_for_terminal(&mut terminal, session_id).await else {
        return Err(AppError::Pipeline("update channel closed".into()));
    };
    if let Err(e) = printer.await {
        warn!(error = %e, "Update printer task failed");
    }

    if let Some(result) = update.result {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}
