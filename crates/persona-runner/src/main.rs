//! persona-runner - persona UX test runner
//!
//! Inspects the model chain, checks provider health and lists personas.
//! Full runs need a browser engine wired in through `persona_runner::agent`.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::WrapErr;
use persona_core::chain::{build_chain, classify};
use persona_core::persona::load_all;
use persona_core::{Config, ProviderSettings};
use persona_runner::health::{self, HealthCheckPolicy};
use persona_runner::llm::HttpChatFactory;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "persona-runner", about = "Persona-driven UX test runner", version)]
struct Cli {
    /// Config file path (overrides .persona/config)
    #[arg(long, global = true, env = "PERSONA_CONFIG")]
    config: Option<PathBuf>,

    /// Persona directory (overrides personas_dir)
    #[arg(long, global = true)]
    personas_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the model chain with the provider of each entry
    Chain,
    /// Print the provider owning a model identifier
    Classify {
        /// Model identifier
        model: String,
    },
    /// Ping the preferred provider with one minimal completion
    Health,
    /// List persona definitions
    Personas,
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref()).wrap_err("failed to load config")?;
    if let Some(dir) = cli.personas_dir {
        config.personas_dir = dir;
    }
    let cwd = std::env::current_dir().wrap_err("failed to read working directory")?;
    config.resolve_paths(&cwd);
    let settings = ProviderSettings::from_env();

    match cli.command {
        Command::Chain => {
            let chain = build_chain(&settings);
            if chain.is_empty() {
                eyre::bail!("no provider credential configured");
            }
            for (index, model) in chain.iter().enumerate() {
                println!("{:>2}  {:<11} {model}", index + 1, classify(model, &settings));
            }
        }
        Command::Classify { model } => {
            println!("{}", classify(&model, &settings));
        }
        Command::Health => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .wrap_err("failed to create tokio runtime")?;
            let factory = HttpChatFactory::new().wrap_err("failed to build HTTP client")?;
            let policy = HealthCheckPolicy::from_config(&config);
            let provider = runtime.block_on(health::check(&settings, &factory, policy))?;
            println!("ok  {provider}  {}", settings.model(provider));
        }
        Command::Personas => {
            let personas = load_all(&config.personas_dir).wrap_err_with(|| {
                format!("failed to load personas from {}", config.personas_dir.display())
            })?;
            for persona in &personas {
                println!(
                    "{:<24} {:<24} {}  {} phases",
                    persona.id,
                    persona.name,
                    persona.language.as_str(),
                    persona.conversation_goals.len()
                );
            }
        }
    }
    Ok(())
}
