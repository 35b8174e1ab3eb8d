use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use events::{Event, EventEnvelope};
use pathfinder_core::{Coordinates, PlanRequest, StageOutcome};
use server::config::{ServiceConfig, CONFIG_FILE};
use server::state::AppState;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pathfinder")]
#[command(about = "Venue recommendations for group outings", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .pathfinder/config.json in the current directory
    Init,
    /// Run the HTTP and WebSocket server
    Serve {
        #[arg(short, long, env = "PATHFINDER_PORT", default_value_t = server::DEFAULT_PORT)]
        port: u16,

        /// Config file; defaults to .pathfinder/config.json
        #[arg(long, env = "PATHFINDER_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Plan one request in-process and print the response as JSON
    Plan(PlanArgs),
    /// Show which capabilities are configured
    Status {
        #[arg(long, env = "PATHFINDER_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct PlanArgs {
    prompt: String,

    #[arg(long, default_value_t = 1)]
    group_size: u32,

    /// low, medium, high or $-notation
    #[arg(long)]
    budget: Option<String>,

    #[arg(long)]
    location: Option<String>,

    #[arg(long)]
    vibe: Option<String>,

    /// Member location as "lat,lng"; repeat for each member
    #[arg(long = "member", value_parser = parse_coordinates)]
    members: Vec<Coordinates>,

    /// Print stage progress to stderr while planning
    #[arg(long)]
    stream: bool,

    #[arg(long, env = "PATHFINDER_CONFIG")]
    config: Option<PathBuf>,
}

impl PlanArgs {
    fn to_request(&self) -> PlanRequest {
        let mut request = PlanRequest::new(self.prompt.clone()).with_group_size(self.group_size);
        if let Some(ref budget) = self.budget {
            request = request.with_budget(budget.clone());
        }
        if let Some(ref location) = self.location {
            request = request.with_location(location.clone());
        }
        if let Some(ref vibe) = self.vibe {
            request = request.with_vibe(vibe.clone());
        }
        if !self.members.is_empty() {
            request = request.with_member_locations(self.members.clone());
        }
        request
    }
}

fn parse_coordinates(s: &str) -> std::result::Result<Coordinates, String> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lng\", got \"{}\"", s))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {}", e))?;
    let lng: f64 = lng.trim().parse().map_err(|e| format!("bad longitude: {}", e))?;
    Ok(Coordinates::new(lat, lng))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Init => init_config().await,
        Commands::Serve { port, config } => serve(port, config.as_deref()).await,
        Commands::Plan(args) => plan(args).await,
        Commands::Status { config } => status(config.as_deref()).await,
    }
}

async fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    match path {
        Some(path) => Ok(ServiceConfig::read_file(path).await),
        None => Ok(ServiceConfig::read(&std::env::current_dir()?).await),
    }
}

async fn init_config() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_path = cwd.join(CONFIG_FILE);

    if config_path.exists() {
        println!("Already initialized at {}", config_path.display());
        return Ok(());
    }

    ServiceConfig::default()
        .write(&cwd)
        .await
        .context("Failed to write config")?;

    println!("Created {}", config_path.display());
    println!("Add capability endpoints under \"endpoints\", then run 'pathfinder serve'.");

    Ok(())
}

async fn serve(port: u16, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path).await?;

    println!();
    println!("Pathfinder");
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", port);
    println!("  WebSocket:   ws://localhost:{}/api/plan/ws", port);
    println!("  Swagger UI:  http://localhost:{}/swagger-ui", port);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    server::serve(AppState::new(config), port).await
}

async fn plan(args: PlanArgs) -> Result<()> {
    let config = load_config(args.config.as_deref()).await?;
    let service = AppState::new(config).service;
    let request = args.to_request();

    let response = if args.stream {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                print_progress(&envelope);
            }
        });
        let response = service.plan_streaming(request, tx).await;
        printer.await?;
        response?
    } else {
        service.plan(request).await?
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn print_progress(envelope: &EventEnvelope) {
    let line = match &envelope.event {
        Event::StageCompleted {
            label,
            outcome,
            latency_ms,
            attempt,
            ..
        } => {
            let outcome = match outcome {
                StageOutcome::Completed => outcome.as_str().green(),
                StageOutcome::Fallback => outcome.as_str().yellow(),
            };
            format!(
                "{:>3} {} {} ({}ms, attempt {})",
                envelope.sequence, label, outcome, latency_ms, attempt
            )
        }
        Event::VetoRaised {
            attempt,
            reason,
            will_retry,
        } => {
            let next = if *will_retry { "retrying" } else { "giving up" };
            format!(
                "{:>3} {} attempt {}: {} ({})",
                envelope.sequence,
                "veto".red().bold(),
                attempt,
                reason,
                next
            )
        }
        Event::Result { response } => format!(
            "{:>3} {} {} venue(s)",
            envelope.sequence,
            "done".green().bold(),
            response.venues.len()
        ),
    };
    eprintln!("{}", line);
}

async fn status(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path).await?;
    let endpoints = &config.endpoints;

    let show = |name: &str, url: &Option<String>| match url {
        Some(url) => println!("  {} {:<14} {}", "●".green(), name, url),
        None => println!("  {} {:<14} {}", "○".dimmed(), name, "fallback only".dimmed()),
    };

    println!();
    println!("Capabilities:");
    show("intent_model", &endpoints.intent_model);
    show("fit_scorer", &endpoints.fit_scorer);
    show("narrator", &endpoints.narrator);
    show("price_lookup", &endpoints.price_lookup);
    show("risk_signals", &endpoints.risk_signals);
    show("risk_history", &endpoints.risk_history);
    show("identity", &endpoints.identity);
    show("consent", &endpoints.consent);
    println!();

    if endpoints.sources.is_empty() {
        println!("No discovery sources configured.");
    } else {
        println!("Discovery sources ({}):", endpoints.sources.len());
        for source in &endpoints.sources {
            println!("  {} {:<14} {}", "●".green(), source.name, source.url);
        }
    }

    let pipeline = &config.pipeline;
    println!();
    println!(
        "Pipeline: top {} (floor {}), {} retries, {}ms deadline",
        pipeline.top_n, pipeline.floor, pipeline.max_retries, pipeline.deadline_ms
    );
    println!();

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pathfinder=info,server=info,orchestrator=warn,tower_http=info".into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_plan_flags() {
        let cli = Cli::try_parse_from([
            "pathfinder",
            "plan",
            "bowling for 6",
            "--group-size",
            "6",
            "--budget",
            "low",
            "--member",
            "43.65,-79.38",
            "--stream",
        ])
        .unwrap();

        let Commands::Plan(args) = cli.command else {
            panic!("expected plan command");
        };
        assert!(args.stream);
        let request = args.to_request();
        assert_eq!(request.group_size, 6);
        assert_eq!(request.budget.as_deref(), Some("low"));
        assert_eq!(request.member_locations.len(), 1);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_parse_coordinates() {
        let c = parse_coordinates("43.65, -79.38").unwrap();
        assert_eq!(c, Coordinates::new(43.65, -79.38));
        assert!(parse_coordinates("43.65").is_err());
        assert!(parse_coordinates("north,-79").is_err());
    }

    #[tokio::test]
    async fn test_explicit_config_path() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("pathfinder.json");
        std::fs::write(&path, r#"{"pipeline": {"max_retries": 0}}"#).unwrap();

        let config = load_config(Some(&path)).await.unwrap();
        assert_eq!(config.pipeline.max_retries, 0);
    }
}
