//! ghost-console: talk to a ghost from the terminal
//!
//! Usage:
//!   ghost-console                         → demo ghost, session "console"
//!   ghost-console --session alice         → another session id
//!   ghost-console --config ghost.toml     → engine settings from TOML
//!   ghost-console --log-file ghost.log    → logs to a file instead of stderr
//!   ghost-console --dump-config           → print the effective config
//!
//! A line starting with `@think#stage` is sent to that url explicitly.

mod demo;

use clap::Parser;
use ghost_core::{GhostConfig, Input, Message, Url};
use ghost_engine::{Ghost, Reply};
use ghost_runtime::{ChannelQueue, MemoryCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "ghost-console",
    about = "Console harness for the ghost dialogue engine",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Session id every line is sent on
    #[arg(short, long, default_value = "console")]
    session: String,

    /// Path to engine config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the effective config as TOML and exit
    #[arg(long, default_value_t = false)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => GhostConfig::load(path),
        None => GhostConfig::default(),
    };
    if cli.dump_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    let (queue, mut deferred) = ChannelQueue::channel();
    let ghost = Arc::new(
        Ghost::builder(config)
            .cache(Arc::new(MemoryCache::new()))
            .mindset(demo::mindset())
            .focus(demo::focus())
            .queue(Arc::new(queue))
            .build()?,
    );

    println!("ghost-console v{}", env!("CARGO_PKG_VERSION"));
    println!("session: {}  (ctrl-d to exit)", cli.session);
    println!();
    tracing::info!(session = %cli.session, "Console started");

    // Greet before the user says anything.
    turn(&ghost, Input::text(&cli.session, "")).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                turn(&ghost, parse_line(&cli.session, line)).await?;
            }
            Some(input) = deferred.recv() => {
                tracing::debug!(mid = %input.mid, "Delivering async input");
                turn(&ghost, input).await?;
            }
        }
    }

    tracing::info!(session = %cli.session, "Console closed");
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ghost=info".into());

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {}", path.display()))?;
    std::fs::create_dir_all(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();
    Ok(Some(guard))
}

/// `@think#stage text` targets a url; anything else is plain text.
fn parse_line(session: &str, line: &str) -> Input {
    if let Some(rest) = line.strip_prefix('@') {
        let (url, text) = rest.split_once(' ').unwrap_or((rest, ""));
        if !url.is_empty() {
            return Input::text(session, text.trim()).with_url(Url::parse(url));
        }
    }
    Input::text(session, line)
}

/// Run one turn, print what came back, and queue its async inputs.
/// Turns are synchronous, so they run off the runtime threads.
async fn turn(ghost: &Arc<Ghost>, input: Input) -> anyhow::Result<()> {
    let worker = ghost.clone();
    let reply = tokio::task::spawn_blocking(move || worker.handle(input)).await?;
    print_reply(&reply);
    ghost.deliver(reply.async_inputs)?;
    Ok(())
}

fn print_reply(reply: &Reply) {
    for output in &reply.outputs {
        let marker = if output.is_async { "ghost (later)" } else { "ghost" };
        for message in &output.messages {
            match message {
                Message::Text { text } => println!("{}> {}", marker, text),
                Message::Error { code, message } => println!("{}! [{}] {}", marker, code, message),
                Message::Json { data } => println!("{}> {}", marker, data),
                Message::Tasked { tid, url } => println!("{}> (task {} at {})", marker, tid, url),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghost_engine::{FnStage, Mind, Mindset, StageThink};
    use std::sync::Mutex;

    #[tokio::test]
    async fn turns_run_off_the_runtime_thread() {
        let seen = Arc::new(Mutex::new(None));
        let record = seen.clone();
        let main = StageThink::new("main").with_stage(FnStage::new("start").activating(
            move |_ctx, this| {
                *record.lock().unwrap() = Some(std::thread::current().id());
                Ok(Some(Mind::new(this).awaits()))
            },
        ));
        let ghost = Arc::new(
            Ghost::builder(GhostConfig::default())
                .cache(Arc::new(MemoryCache::new()))
                .mindset(Mindset::new().with_think(main))
                .build()
                .unwrap(),
        );

        turn(&ghost, Input::text("T1", "hi")).await.unwrap();
        let worker = seen.lock().unwrap().expect("turn ran the root");
        assert_ne!(worker, std::thread::current().id());
    }

    #[test]
    fn parse_line_targets_url() {
        let input = parse_line("T1", "@survey#color blue");
        assert_eq!(input.url, Some(Url::stage("survey", "color")));
        assert_eq!(input.text_payload(), Some("blue"));
        assert!(parse_line("T1", "plain").url.is_none());
    }
}
