use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use cartelera::config::Config;
use cartelera::logging::init_logging;
use cartelera::observability::init_metrics;
use cartelera::pipeline::Orchestrator;
use cartelera::providers::{OpenAiModel, TavilySearch};
use cartelera::storage::{EventStore, InMemoryStore};
use cartelera::types::{RunStatus, Source};

#[derive(Parser)]
#[command(name = "cartelera")]
#[command(about = "Cultural event discovery pipeline for Argentine cities")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the discovery pipeline for a city
    Run {
        /// Target city, e.g. "Córdoba"
        city: String,
        /// Country hint passed to the search provider
        #[arg(long, default_value = "AR")]
        country: String,
        /// Write the run's stored events as pretty JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the configured cities and their aliases
    Cities,
}

fn seed_store(store: &InMemoryStore, config: &Config) -> Source {
    for city in &config.cities {
        let aliases: Vec<&str> = city.aliases.iter().map(|a| a.as_str()).collect();
        store.seed_city(&city.name, city.province.as_deref(), &aliases);
    }

    let mut source = Source::new(&config.source.name, config.source.reliability);
    source.id = Some(store.seed_source(source.clone()));
    source
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();
    init_metrics().context("failed to install metrics recorder")?;

    let cli = Cli::parse();
    let config = Config::load_from(&cli.config).context("failed to load configuration")?;

    match cli.command {
        Commands::Cities => {
            println!("🏙️  Configured cities:");
            for city in &config.cities {
                let aliases = if city.aliases.is_empty() {
                    String::new()
                } else {
                    format!(" (alias: {})", city.aliases.join(", "))
                };
                println!(
                    "   {} — {}{}",
                    city.name,
                    city.province.as_deref().unwrap_or("-"),
                    aliases
                );
            }
        }
        Commands::Run {
            city,
            country,
            output,
        } => {
            let search = Arc::new(TavilySearch::from_env().context("TAVILY_API_KEY not set")?);
            let model = Arc::new(
                OpenAiModel::from_env(config.model.name.clone())
                    .context("OPENAI_API_KEY not set")?,
            );

            let store = Arc::new(InMemoryStore::new());
            let source = seed_store(&store, &config);

            info!(city, country, "Starting pipeline run");
            let orchestrator = Arc::new(Orchestrator::new(
                store.clone(),
                search,
                model,
                config,
                source,
            ));
            let outcome = orchestrator.run_pipeline(&city, &country).await;

            let emoji = match outcome.status {
                RunStatus::Success => "✅",
                RunStatus::Partial => "⚠️",
                _ => "❌",
            };
            println!("\n{} Pipeline run for {}:", emoji, city);
            println!("   Status: {:?}", outcome.status);
            println!("   Found: {}", outcome.events_found);
            println!("   Created: {}", outcome.events_created);
            println!("   Updated: {}", outcome.events_updated);
            println!("   Duplicates: {}", outcome.events_duplicate);
            println!("   Duration: {}ms", outcome.duration_ms);
            if let Some(message) = &outcome.error_message {
                println!("   Note: {}", message);
            }

            if let Some(path) = output {
                let events = store
                    .find_candidate_events(&cartelera::types::CandidateFilter {
                        city_id: None,
                        date_from: None,
                        date_to: None,
                        status: cartelera::types::EventStatus::Active,
                        limit: usize::MAX,
                    })
                    .await?;
                std::fs::write(&path, serde_json::to_string_pretty(&events)?)?;
                println!("   Events written to {}", path.display());
            }
        }
    }

    Ok(())
}
