//! Summary Bot - Main Entry Point
//!
//! A Discord bot that buffers guild conversations and posts periodic
//! AI-generated summaries to a dedicated channel.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use summary_bot::bot::{BotContext, BotState, EventHandler};
use summary_bot::config::{BotSettings, DiscordConfig, OpenAiConfig, ScheduleConfig};
use summary_bot::discord::{
    DiscordHttp, Gateway, INTENT_GUILD_MESSAGES, INTENT_GUILDS, INTENT_MESSAGE_CONTENT,
};
use summary_bot::scheduler::{SchedulerMessage, SummaryScheduler};
use summary_bot::summary::{OpenAiClient, Summarizer};

/// Discord bot that posts periodic channel summaries.
#[derive(Parser, Debug)]
#[command(name = "summary_bot")]
#[command(about = "Summarize Discord server conversations on a schedule")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional JSON schedule file. The built-in schedule is used when omitted.
    #[arg(short, long)]
    schedule: Option<String>,

    /// Write an example schedule file and exit.
    #[arg(long)]
    generate_schedule: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if args.generate_schedule {
        return generate_example_schedule();
    }

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let discord_config =
        DiscordConfig::from_env().context("Failed to load Discord configuration from environment")?;
    let openai_config =
        OpenAiConfig::from_env().context("Failed to load OpenAI configuration from environment")?;
    let settings = BotSettings::from_env_with_defaults();

    let schedule = match &args.schedule {
        Some(path) => {
            let schedule = ScheduleConfig::load_from_file(path)
                .with_context(|| format!("Failed to load schedule from {path}"))?;
            schedule.validate().context("Schedule validation failed")?;
            info!("Loaded schedule from {}", path);
            schedule
        }
        None => ScheduleConfig::default(),
    };

    let api = DiscordHttp::new(&discord_config.bot_token)
        .context("Failed to create Discord REST client")?;
    let client = OpenAiClient::new(openai_config).context("Failed to create OpenAI client")?;
    let summarizer = Arc::new(Summarizer::new(client, &settings));
    let state = Arc::new(BotState::new(settings, schedule));
    let ctx = BotContext::new(state, Arc::new(api), summarizer);

    info!("Starting summary bot...");
    info!("Command prefix: {}", ctx.state.settings.command_prefix);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(256);
    let (scheduler_tx, scheduler_rx) = mpsc::channel::<SchedulerMessage>(32);

    let gateway = Gateway::new(
        discord_config.bot_token.clone(),
        INTENT_GUILDS | INTENT_GUILD_MESSAGES | INTENT_MESSAGE_CONTENT,
    );
    let mut gateway_handle = tokio::spawn(gateway.run(event_tx, shutdown_rx));

    let handler = EventHandler::new(ctx.clone());
    let events_handle = tokio::spawn(handler.run(event_rx));

    #[cfg(unix)]
    let signals_handle = tokio::spawn(forward_signals(ctx.state.clone(), scheduler_tx.clone()));

    let scheduler = SummaryScheduler::new(ctx);
    let scheduler_handle = tokio::spawn(scheduler.run(scheduler_rx));

    info!("Bot is running. Use Ctrl+C to stop.");

    let mut exit = Ok(());
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        result = &mut gateway_handle => {
            exit = match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("Gateway connection failed"),
                Err(e) => Err(e).context("Gateway task panicked"),
            };
        }
    }

    info!("Shutting down...");
    #[cfg(unix)]
    signals_handle.abort();
    let _ = shutdown_tx.send(true);
    let _ = scheduler_tx.send(SchedulerMessage::Shutdown).await;
    if !gateway_handle.is_finished() {
        match gateway_handle.await {
            Ok(Err(e)) => error!("Gateway stopped with error: {}", e),
            Err(e) => error!("Gateway task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }
    let _ = events_handle.await;
    let _ = scheduler_handle.await;

    exit
}

/// Forwards SIGUSR1 (post the next scheduled summary now) and SIGUSR2
/// (run the memory cleanup now) to the scheduler.
#[cfg(unix)]
async fn forward_signals(state: Arc<BotState>, scheduler: mpsc::Sender<SchedulerMessage>) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut run_now, mut cleanup) = match (
        signal(SignalKind::user_defined1()),
        signal(SignalKind::user_defined2()),
    ) {
        (Ok(run_now), Ok(cleanup)) => (run_now, cleanup),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to install signal handlers: {}", e);
            return;
        }
    };

    loop {
        let message = tokio::select! {
            Some(()) = run_now.recv() => {
                let Some((_, job)) = state.schedule.next_job(state.local_now()) else {
                    continue;
                };
                info!("SIGUSR1: running {} now", job.description);
                SchedulerMessage::RunNow(job)
            }
            Some(()) = cleanup.recv() => {
                info!("SIGUSR2: running memory cleanup");
                SchedulerMessage::Cleanup
            }
            else => break,
        };
        if scheduler.send(message).await.is_err() {
            break;
        }
    }
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Writes the built-in schedule as an editable example.
fn generate_example_schedule() -> Result<()> {
    let path = "schedule.example.json";
    ScheduleConfig::default()
        .save_to_file(path)
        .with_context(|| format!("Failed to write {path}"))?;

    println!("✓ Example schedule written to: {path}");
    println!("\nTo use it:");
    println!("1. Copy {path} to schedule.json and edit the slots");
    println!("2. Check it: validate_schedule --file schedule.json");
    println!("3. Create a .env file with DISCORD_BOT_TOKEN and OPENAI_API_KEY");
    println!("4. Run: summary_bot --schedule schedule.json");

    Ok(())
}
