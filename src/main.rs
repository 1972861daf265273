//! Survey Sync command line client
//!
//! Runs the client state machine against a remote app, inspects the
//! persisted client config, and evaluates survey eligibility offline from a
//! JSON fixture.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use survey_sync_core::{
    AttributeValue, ConfigStore, Contact, DeviceType, FileConfigStore, Fixture, HttpEnvironmentFetcher,
    HttpUserUpdater, InMemoryRepository, LocalSegmentEvaluator, Settings, SyncClient,
    SyncState, SyncSurveysService,
};
use tracing::{debug, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "survey-sync")]
#[command(about = "Survey eligibility and client state synchronization", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level (overrides the settings file)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Settings file (TOML)
    #[arg(short, long, env = "SURVEY_SYNC_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up (or refresh) the client state for an environment
    Setup {
        /// Environment id
        #[arg(long)]
        environment_id: String,

        /// Base URL of the app serving the client API
        #[arg(long)]
        app_url: String,
    },

    /// Reset the stored user to the anonymous default
    Teardown,

    /// Print the stored client config as JSON
    Status,

    /// Evaluate eligible surveys for a contact from a fixture file
    Eligible {
        /// Fixture JSON with project, surveys, displays and responses
        #[arg(long)]
        fixture: PathBuf,

        /// Contact id (defaults to the fixture's contact)
        #[arg(long)]
        contact_id: Option<String>,

        /// Device type: phone or desktop
        #[arg(long)]
        device_type: Option<DeviceType>,

        /// Contact attribute as key=value (repeatable)
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, AttributeValue)>,
    },
}

/// Parse `key=value`; numeric values become numbers
fn parse_attribute(raw: &str) -> Result<(String, AttributeValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty attribute key in '{}'", raw));
    }
    let value = match value.parse::<f64>() {
        Ok(number) => AttributeValue::Number(number),
        Err(_) => AttributeValue::Text(value.to_string()),
    };
    Ok((key.to_string(), value))
}

fn sync_client(settings: &Settings) -> anyhow::Result<SyncClient> {
    let timeout = settings.request_timeout();
    Ok(SyncClient::new(
        Arc::new(HttpEnvironmentFetcher::new(timeout)?),
        Arc::new(HttpUserUpdater::new(timeout)?),
        Arc::new(FileConfigStore::new(&settings.storage_path)),
    )
    .with_options(settings.sync_options()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    let level = match cli
        .log_level
        .as_deref()
        .unwrap_or(settings.log_level.as_str())
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Keep HTTP client internals quiet unless they fail
    let filter = EnvFilter::new(format!(
        "survey_sync={},survey_sync_core={},reqwest=warn,hyper=warn",
        level.as_str().to_lowercase(),
        level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Survey Sync v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Setup {
            environment_id,
            app_url,
        } => {
            let client = sync_client(&settings)?;
            client.setup(&environment_id, &app_url).await?;

            match client.state().await {
                SyncState::Error => {
                    println!("Setup is backing off after an earlier failure.");
                    println!("Run with debug = true to retry immediately.");
                }
                _ => {
                    let surveys = client.filtered_surveys().await;
                    println!("✓ Set up environment {}", environment_id);
                    println!("  {} survey(s) eligible:", surveys.len());
                    for survey in surveys {
                        println!("  - {} ({})", survey.name, survey.id);
                    }
                }
            }
        }

        Commands::Teardown => {
            let client = sync_client(&settings)?;
            client.tear_down().await;
            println!("✓ User state reset");
        }

        Commands::Status => {
            let store = FileConfigStore::new(&settings.storage_path);
            match store.load().await {
                Ok(Some(config)) => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                    if let Some(environment) = &config.environment {
                        if environment.is_expired() {
                            println!("Environment state expired; the next setup refreshes it");
                        }
                    }
                }
                Ok(None) => println!("No stored configuration at {}", store.path().display()),
                Err(e) => {
                    anyhow::bail!(
                        "Stored configuration at {} is unreadable: {}",
                        store.path().display(),
                        e
                    );
                }
            }
        }

        Commands::Eligible {
            fixture: fixture_path,
            contact_id,
            device_type,
            attributes,
        } => {
            let fixture = Fixture::from_file(&fixture_path)
                .await
                .with_context(|| format!("Failed to load fixture {}", fixture_path.display()))?;
            let repository = Arc::new(InMemoryRepository::from_fixture(&fixture).await?);
            let service = SyncSurveysService::new(
                repository.clone(),
                repository.clone(),
                repository,
                Arc::new(LocalSegmentEvaluator),
                settings.cache_ttl(),
            );

            let mut contact = match (contact_id, fixture.contact.clone()) {
                (Some(id), _) => Contact::new(id),
                (None, Some(contact)) => contact,
                (None, None) => anyhow::bail!("No --contact-id given and the fixture has no contact"),
            };
            if let Some(device_type) = device_type {
                contact.device_type = device_type;
            }
            contact.attributes.extend(attributes);

            let surveys = service
                .get_sync_surveys_for(&fixture.project.environment_id, &contact)
                .await?;
            println!("{}", serde_json::to_string_pretty(&surveys)?);
        }
    }

    Ok(())
}
