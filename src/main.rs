use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mailpilot::agent::Agent;
use mailpilot::config::{Config, DEFAULT_INTERVAL_SECS};
use mailpilot::generator::create_generator;
use mailpilot::logbook::create_log;
use mailpilot::mailbox::create_mailbox;
use mailpilot::pipeline::eligibility::EligibilityFilter;
use mailpilot::pipeline::orchestrator::CycleOrchestrator;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "mailpilot", version, about = "Unattended email auto-reply agent")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "mailpilot.toml")]
    config: PathBuf,

    /// Run one processing cycle and exit.
    #[arg(long)]
    single_run: bool,

    /// Seconds between cycles in continuous mode.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let cli = Cli::parse();

    // Console plus a daily-rotated log file; the guard must outlive main.
    let file_appender = tracing_appender::rolling::daily(".", "mailpilot.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    run(cli).await?;
    Ok(())
}

async fn run(cli: Cli) -> mailpilot::error::Result<()> {
    let config = Config::load(&cli.config)?;

    let generator = create_generator(&config.llm)?;
    let log = create_log(&config.log).await?;
    let mailbox = create_mailbox(config.mailbox, &config.own_address).await?;

    let orchestrator = CycleOrchestrator::new(
        mailbox.clone(),
        generator,
        log,
        EligibilityFilter::new(&config.own_address),
    );

    let agent = Agent::new(orchestrator, mailbox, Duration::from_secs(cli.interval));
    if cli.single_run {
        agent.run_once().await;
    } else {
        agent.run().await;
    }

    Ok(())
}
