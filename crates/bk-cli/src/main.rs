//! Blocky CLI
//!
//! Offline tools for the navigation-abuse detector: classify URLs, replay
//! navigation traces and validate configuration files.

mod replay;

use std::fs;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use bk_core::{Classifier, EngineConfig};

#[derive(Parser)]
#[command(name = "bk-cli")]
#[command(about = "Blocky navigation-abuse detector tools")]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the URL heuristics against one URL
    Classify {
        /// URL to classify
        url: String,

        /// Previous URL in the same context
        #[arg(short, long)]
        referrer: Option<String>,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Replay a JSONL navigation trace through the engine
    Replay {
        /// Trace file
        #[arg(short, long)]
        input: String,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    CheckConfig {
        /// Configuration file (JSON)
        #[arg(short, long)]
        input: String,
    },

    /// Print the default configuration
    Defaults,
}

fn main() {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(cli.log_level)
        .format_timestamp_millis()
        .init();

    let result = match cli.command {
        Commands::Classify {
            url,
            referrer,
            config,
            json,
        } => cmd_classify(&url, referrer.as_deref(), config.as_deref(), json),
        Commands::Replay { input, config, json } => cmd_replay(&input, config.as_deref(), json),
        Commands::CheckConfig { input } => cmd_check_config(&input),
        Commands::Defaults => cmd_defaults(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> Result<EngineConfig, String> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    EngineConfig::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path, e))
}

fn cmd_classify(url: &str, referrer: Option<&str>, config: Option<&str>, json: bool) -> Result<(), String> {
    let config = load_config(config)?;
    let classifier = Classifier::new(config.classifier);
    let c = classifier.classify(url, referrer);

    if json {
        let text = serde_json::to_string_pretty(&c)
            .map_err(|e| format!("Failed to serialize: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    println!("URL: {}", c.url);
    if let Some(referrer) = referrer {
        println!("  Referrer:     {}", referrer);
    }
    println!("  Parseable:    {}", c.parseable);
    println!("  Query length: {}", c.query_length);
    println!("  Redirect hub: {}", c.redirect_hub);
    println!("  Legitimate:   {}", c.legitimate);
    if referrer.is_some() {
        println!("  Suspicious:   {}", c.suspicious);
    }

    Ok(())
}

fn cmd_replay(input: &str, config: Option<&str>, json: bool) -> Result<(), String> {
    let config = load_config(config)?;
    let text = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read trace '{}': {}", input, e))?;
    let records = replay::parse_trace(&text)?;
    let summary = replay::replay(config, &records)?;

    if json {
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Failed to serialize: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    for step in &summary.steps {
        println!(
            "{:>8}ms  tab {:<4} {:<40} {}",
            step.at,
            step.tab,
            step.verdict.to_string(),
            step.url
        );
    }
    println!();
    println!("Replayed {} records from '{}'", records.len(), input);
    println!("  Navigations: {}", summary.navigations);
    for (action, count) in &summary.by_action {
        println!("  {:<12} {}", format!("{}:", action), count);
    }
    println!("  Swept:       {}", summary.swept);

    Ok(())
}

fn cmd_check_config(input: &str) -> Result<(), String> {
    let config = load_config(Some(input))?;
    println!("Config '{}' is valid", input);
    println!("  Gesture timeout:   {}ms (page {}ms)", config.gesture_timeout_ms, config.page_gesture_timeout_ms);
    println!("  Redirect window:   {}ms", config.redirect_window_ms);
    println!("  Max redirects:     {}", config.max_allowed_redirects);
    println!("  Hub threshold:     {} chars", config.classifier.hub_query_threshold);
    Ok(())
}

fn cmd_defaults() -> Result<(), String> {
    let text = serde_json::to_string_pretty(&EngineConfig::default())
        .map_err(|e| format!("Failed to serialize: {}", e))?;
    println!("{}", text);
    Ok(())
}
