//! Convo CLI
//!
//! Command-line interface for generating text, inspecting the response
//! cache and checking the generation service.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::{io::Write, path::PathBuf};

use ai_core::{GenerationEngine, OllamaGenerationClient, ResponseCache};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use infrastructure::{AppConfig, Measurement, PerformanceRecorder, init_logging};
use tracing::debug;

/// Convo CLI
#[derive(Parser, Debug)]
#[command(name = "convo-cli")]
#[command(author, version, about = "Cached text generation CLI", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Model to use instead of the configured one
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Configuration file (default: ./config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a complete response, using the cache when possible
    Generate {
        /// Prompt to send
        prompt: String,
    },

    /// Stream a response as it is generated (never cached)
    Stream {
        /// Prompt to send
        prompt: String,
    },

    /// Check whether the generation service is reachable
    Status,

    /// Delete every cached response
    ClearCache,

    /// Print the cache fingerprint a prompt would be stored under
    Fingerprint {
        /// Prompt to fingerprint
        prompt: String,
    },
}

/// Log filter override for a verbosity count; `None` keeps the configured filter
const fn log_filter_from_verbosity(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let telemetry = match log_filter_from_verbosity(cli.verbose) {
        Some(level) => config.telemetry.clone().with_level(level),
        None => config.telemetry.clone(),
    };
    init_logging(&telemetry)?;

    let cache = ResponseCache::from_config(&config.cache)?;
    let client = OllamaGenerationClient::new(config.generation.clone(), cache)?;
    if let Some(model) = &cli.model {
        client.set_model(model);
    }

    match cli.command {
        Commands::Generate { prompt } => {
            let mut recorder = if config.benchmarks.enabled {
                Some(PerformanceRecorder::open(&config.benchmarks.metrics_file)?)
            } else {
                None
            };

            let measurement = Measurement::start("llm", "generate");
            let result = client.generate(&prompt).await;
            if let Some(recorder) = recorder.as_mut() {
                let summary = measurement.finish(recorder)?;
                debug!(
                    elapsed_secs = summary.elapsed.as_secs_f64(),
                    memory_delta_mb = summary.memory_delta_mb,
                    "Recorded measurement"
                );
            }

            if let Some(error) = &result.error {
                eprintln!("❌ {error}");
                std::process::exit(1);
            }

            println!("{}", result.text);

            if cli.verbose > 0 {
                println!();
                println!("📦 Cached: {}", result.cached);
                if let Some(metrics) = &result.metrics {
                    println!("📊 Metrics:");
                    println!("{}", serde_json::to_string_pretty(metrics)?);
                }
            }
        },

        Commands::Stream { prompt } => {
            let mut fragments = client.generate_stream(&prompt);
            let mut stdout = std::io::stdout();

            while let Some(fragment) = fragments.next().await {
                print!("{fragment}");
                stdout.flush()?;
            }
            println!();
        },

        Commands::Status => {
            println!("🔌 Service: {}", client.config().base_url);
            println!("🧠 Model: {}", client.model());
            println!("📁 Cache: {}", client.cache().dir().display());

            match client.health_check().await {
                Ok(true) => println!("✅ Healthy"),
                Ok(false) => {
                    println!("❌ Unhealthy: service not reachable");
                    std::process::exit(1);
                },
                Err(e) => {
                    println!("❌ Unhealthy: {e}");
                    std::process::exit(1);
                },
            }
        },

        Commands::ClearCache => {
            let removed = client.cache().clear().await;
            println!("🧹 Removed {removed} cached response(s)");
        },

        Commands::Fingerprint { prompt } => {
            let fingerprint = client.fingerprint(&prompt);
            println!("{fingerprint}");
            if cli.verbose > 0 {
                println!("📄 {}", client.cache().entry_path(&fingerprint).display());
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_filter_verbosity_zero_keeps_config() {
        assert_eq!(log_filter_from_verbosity(0), None);
    }

    #[test]
    fn log_filter_verbosity_one() {
        assert_eq!(log_filter_from_verbosity(1), Some("info"));
    }

    #[test]
    fn log_filter_verbosity_two() {
        assert_eq!(log_filter_from_verbosity(2), Some("debug"));
    }

    #[test]
    fn log_filter_verbosity_three_or_more() {
        assert_eq!(log_filter_from_verbosity(3), Some("trace"));
        assert_eq!(log_filter_from_verbosity(10), Some("trace"));
    }

    #[test]
    fn parse_generate() {
        let cli = Cli::try_parse_from(["convo-cli", "generate", "What is the capital of France?"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Generate { ref prompt } if prompt == "What is the capital of France?"
        ));
        assert_eq!(cli.verbose, 0);
        assert!(cli.model.is_none());
    }

    #[test]
    fn parse_stream_with_global_flags() {
        let cli = Cli::try_parse_from(["convo-cli", "stream", "Hi", "-vv", "--model", "llama3"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Stream { ref prompt } if prompt == "Hi"));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.model.as_deref(), Some("llama3"));
    }

    #[test]
    fn parse_status() {
        let cli = Cli::try_parse_from(["convo-cli", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn parse_clear_cache() {
        let cli = Cli::try_parse_from(["convo-cli", "clear-cache"]).unwrap();
        assert!(matches!(cli.command, Commands::ClearCache));
    }

    #[test]
    fn parse_fingerprint_with_config() {
        let cli = Cli::try_parse_from([
            "convo-cli",
            "--config",
            "/etc/convo.toml",
            "fingerprint",
            "Hello",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Fingerprint { ref prompt } if prompt == "Hello"));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/convo.toml")));
    }

    #[test]
    fn generate_requires_prompt() {
        assert!(Cli::try_parse_from(["convo-cli", "generate"]).is_err());
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["convo-cli", "backup"]).is_err());
    }

    #[test]
    fn load_explicit_missing_config_fails() {
        assert!(load_config(Some(&PathBuf::from("/nonexistent/convo.toml"))).is_err());
    }
}
