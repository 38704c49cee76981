use anyhow::{anyhow, Context};
use clap::Parser;
use ring_pipeline::config::{DEFAULT_FLUSH_INTERVAL, DEFAULT_RING_CAPACITY};
use ring_pipeline::source::STOP_COMMAND;
use ring_pipeline::{run_source, PipelineBuilder, PipelineConfig};
use std::io;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter integers read from stdin and print them in timed batches
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of values the buffer holds between flushes
    #[arg(long, default_value_t = DEFAULT_RING_CAPACITY)]
    capacity: usize,

    /// Flush period of the buffer, in milliseconds
    #[arg(long, default_value_t = DEFAULT_FLUSH_INTERVAL.as_millis() as u64)]
    flush_interval_ms: u64,

    /// Slots per link between stages (0 = direct handoff)
    #[arg(long, default_value_t = 0)]
    link_capacity: usize,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout only carries pipeline output.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let config = PipelineConfig::default()
        .with_ring_capacity(args.capacity)
        .with_flush_interval(Duration::from_millis(args.flush_interval_ms))
        .with_link_capacity(args.link_capacity);
    config.validate()?;

    let mut running = PipelineBuilder::from_config(&config).build()?.start()?;
    let producer = running
        .take_producer()
        .ok_or_else(|| anyhow!("pipeline started without a producer"))?;

    println!("Enter integers to fill the buffer, or {STOP_COMMAND:?} to quit");

    let source = thread::Builder::new()
        .name("source".into())
        .spawn(move || run_source(io::stdin().lock(), producer))
        .context("failed to spawn source thread")?;

    while let Some(value) = running.recv() {
        println!("Received: {value}");
    }

    let summary = source
        .join()
        .map_err(|_| anyhow!("source thread panicked"))??;
    tracing::info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        "input finished"
    );

    running.wait()?;
    println!("Pipeline stopped");
    Ok(())
}
