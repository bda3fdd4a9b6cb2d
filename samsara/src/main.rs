//! samsara - command-line publisher for the Samsara ingestion API
//!
//! This tool provides commands for:
//! - Showing the effective client configuration
//! - Validating event files before sending them
//! - Sending a batch of events immediately
//! - Piping a stream of newline-delimited JSON events through the buffered client
//!
//! Configuration is read from $XDG_CONFIG_HOME/samsara/config.toml
//! (~/.config/samsara/config.toml) unless `--config` is given.

use std::future::Future;
use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use samsara_core::event::{now_millis, validate_events};
use samsara_core::{Client, ClientConfig, Config, Event, FlushOutcome};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "samsara")]
#[command(about = "Publish events to a Samsara ingestion API")]
#[command(version)]
struct Args {
    /// Config file (default: ~/.config/samsara/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ingestion API URL, overrides the config file
    #[arg(long, global = true)]
    url: Option<String>,

    /// Default sourceId for events that carry none
    #[arg(long, global = true)]
    source_id: Option<String>,

    /// Write logs to ~/.local/state/samsara/
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the effective client configuration
    Status,

    /// Validate events without sending them
    Validate {
        /// JSON file with an object, an array or NDJSON ("-" for stdin)
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// Send events immediately, bypassing the buffer
    Send {
        /// JSON file with an object, an array or NDJSON ("-" for stdin)
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// Record NDJSON events from stdin and publish them in the background
    Pipe {
        /// Publish interval in milliseconds (default: from config)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Events required before a scheduled publish (default: from config)
        #[arg(long)]
        min_buffer_size: Option<usize>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    let _log_guard = if args.verbose {
        Some(samsara_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config.client),
        Command::Validate { ref input } => cmd_validate(&config.client, input),
        Command::Send { ref input } => cmd_send(&config.client, input),
        Command::Pipe {
            interval_ms,
            min_buffer_size,
        } => cmd_pipe(config.client, interval_ms, min_buffer_size),
    }
}

/// Load the config file and apply command-line overrides
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    if let Some(url) = &args.url {
        config.client.url = Some(url.clone());
    }
    if let Some(source_id) = &args.source_id {
        config.client.source_id = Some(source_id.clone());
    }
    Ok(config)
}

/// Run a future to completion on a fresh current-thread runtime
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;
    Ok(runtime.block_on(future))
}

/// Read events from a file or stdin.
///
/// Accepts a single object, an array of objects, or a stream of objects
/// (NDJSON or simply concatenated).
fn read_events(input: &Path) -> Result<Vec<Event>> {
    let mut text = String::new();
    if input == Path::new("-") {
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
    } else {
        text = std::fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
    }

    let mut values = Vec::new();
    for value in serde_json::Deserializer::from_str(&text).into_iter::<Value>() {
        match value.context("malformed JSON input")? {
            Value::Array(items) => values.extend(items),
            other => values.push(other),
        }
    }

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            Event::try_from(value).with_context(|| format!("event #{} is not usable", index))
        })
        .collect()
}

fn enrich_all(config: &ClientConfig, events: &[Event]) -> Vec<Event> {
    let now = now_millis();
    events
        .iter()
        .map(|event| event.enriched(config.source_id.as_deref(), now))
        .collect()
}

fn cmd_status(config: &ClientConfig) -> Result<()> {
    println!("Samsara Client Configuration");
    println!("============================");
    println!();
    println!(
        "URL:              {}",
        config.url.as_deref().unwrap_or("<not set>")
    );
    println!(
        "Endpoint:         {}",
        config.endpoint().as_deref().unwrap_or("<not set>")
    );
    println!(
        "Source ID:        {}",
        config.source_id.as_deref().unwrap_or("<not set>")
    );
    println!("Publish Interval: {}ms", config.publish_interval_ms);
    println!("Max Buffer Size:  {}", config.max_buffer_size);
    println!("Min Buffer Size:  {}", config.min_buffer_size);
    println!("Send Timeout:     {}ms", config.send_timeout_ms);
    println!("Compression:      {}", config.compression);

    println!();
    match config.validate(&Default::default()) {
        Ok(normalized) => {
            println!("Status: Ready to publish");
            if normalized.min_buffer_size != config.min_buffer_size {
                println!(
                    "Note: min_buffer_size {} is out of range, 1 will be used",
                    config.min_buffer_size
                );
            }
        }
        Err(e) => println!("Status: Not valid ({})", e),
    }

    Ok(())
}

fn cmd_validate(config: &ClientConfig, input: &Path) -> Result<()> {
    let events = enrich_all(config, &read_events(input)?);
    validate_events(&events)?;

    println!("{} valid event(s)", events.len());
    Ok(())
}

fn cmd_send(config: &ClientConfig, input: &Path) -> Result<()> {
    let client = Client::new(ClientConfig {
        start_publishing_thread: false,
        ..config.clone()
    })
    .context("failed to create client")?;

    let events = enrich_all(config, &read_events(input)?);
    if events.is_empty() {
        println!("No events to send.");
        return Ok(());
    }

    tracing::info!(events = events.len(), "sending batch");
    block_on(client.publish_events(&events))?
        .with_context(|| format!("failed to publish {} event(s)", events.len()))?;

    println!(
        "Published {} event(s) to {}",
        events.len(),
        config.endpoint().unwrap_or_default()
    );
    Ok(())
}

fn cmd_pipe(
    mut config: ClientConfig,
    interval_ms: Option<u64>,
    min_buffer_size: Option<usize>,
) -> Result<()> {
    config.start_publishing_thread = true;
    if let Some(interval_ms) = interval_ms {
        config.publish_interval_ms = interval_ms;
    }
    if let Some(min_buffer_size) = min_buffer_size {
        config.min_buffer_size = min_buffer_size;
    }

    let client = Client::new(config).context("failed to create client")?;

    let mut recorded = 0usize;
    let mut rejected = 0usize;
    for (index, line) in std::io::stdin().lock().lines().enumerate() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let result = serde_json::from_str::<Value>(&line)
            .map_err(samsara_core::Error::from)
            .and_then(Event::try_from)
            .and_then(|event| client.record_event(&event));
        match result {
            Ok(()) => recorded += 1,
            Err(e) => {
                rejected += 1;
                eprintln!("line {}: {}", index + 1, e);
            }
        }
    }

    client.stop_consuming();
    let last = block_on(client.flush())?;
    let stats = client.stats();
    tracing::info!(recorded, rejected, outcome = ?last, "input exhausted, final flush done");

    println!("Recorded:   {}", recorded);
    println!("Rejected:   {}", rejected);
    println!("Published:  {}", stats.events_published);
    println!("Evicted:    {}", stats.events_evicted);
    println!("Flushes:    {} ok / {} failed", stats.flushes_succeeded, stats.flushes_failed);

    if let FlushOutcome::Failed { events, error } = last {
        bail!("{} event(s) could not be published: {}", events, error);
    }
    Ok(())
}
