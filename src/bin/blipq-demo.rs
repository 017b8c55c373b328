//! blipq-demo – walk a producer/consumer pair through each queue variant.
//
//  $ blipq-demo memory --items 5
//  $ blipq-demo delayed --delay-ms 300
//  $ blipq-demo persistent --config blipq.toml
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use blipq::logging::init_logging;
use blipq::{load_config, Config, DelayedQueue, MemoryBackend, MemoryQueue, PersistentQueue};

use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "blipq-demo", version, about = "blipq queue walkthrough")]
struct Cli {
    /// Path to config TOML (env BLIPQ_CONFIG overrides)
    #[arg(short, long, global = true, default_value = "blipq.toml")]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bounded FIFO queue with a consumer that starts before the producer.
    Memory {
        #[arg(long, default_value_t = 5)]
        items: usize,
    },
    /// Delayed queue: items come out in deadline order, one is cancelled.
    Delayed {
        #[arg(long, default_value_t = 300)]
        delay_ms: u64,
    },
    /// Persistent queue: flush, shut down, recover into a second queue.
    Persistent {
        #[arg(long, default_value_t = 5)]
        items: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let cfg_path: String = std::env::var("BLIPQ_CONFIG").unwrap_or(cli.config);
    let cfg: Config = if Path::new(&cfg_path).exists() {
        load_config(&cfg_path)?
    } else {
        info!(path = %cfg_path, "config not found, using defaults");
        Config::default()
    };

    match cli.cmd {
        Command::Memory { items } => memory(&cfg, items).await?,
        Command::Delayed { delay_ms } => delayed(delay_ms).await?,
        Command::Persistent { items } => persistent(&cfg, items).await?,
    }
    Ok(())
}

async fn memory(cfg: &Config, items: usize) -> anyhow::Result<()> {
    let queue = Arc::new(MemoryQueue::new("demo-memory", cfg.queue.capacity));

    let consumer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(Some(item)) = queue.dequeue().await {
                seen.push(item);
            }
            seen
        })
    };

    for i in 0..items {
        if let Err(e) = queue.enqueue(i) {
            println!("offer {i} rejected: {}", e.reason());
        }
    }
    // Let the consumer drain before closing.
    while !queue.is_empty() {
        tokio::task::yield_now().await;
    }
    queue.shutdown();

    let seen = consumer.await?;
    println!("consumed {seen:?}");
    print!("{}", queue.metrics().render(queue.name()));
    Ok(())
}

async fn delayed(delay_ms: u64) -> anyhow::Result<()> {
    let queue = DelayedQueue::unbounded();
    let delay = Duration::from_millis(delay_ms);

    queue.enqueue_delayed("late", delay.saturating_mul(2))?;
    queue.enqueue_delayed("soon", delay)?;
    queue.enqueue_delayed("cancel-me", delay)?;
    queue.enqueue("now")?;

    let cancelled = queue.cancel_delayed(|v| v.starts_with("cancel"));
    println!("cancelled {cancelled} pending item(s)");

    while let Some(at) = queue.next_ready_time() {
        println!("next ready in {:?}", at.saturating_duration_since(tokio::time::Instant::now()));
        match queue.dequeue_timeout(delay.saturating_mul(3)).await? {
            Some(item) => println!("took {item}"),
            None => break,
        }
    }

    queue.shutdown();
    print!("{}", queue.metrics().render(queue.name()));
    Ok(())
}

async fn persistent(cfg: &Config, items: usize) -> anyhow::Result<()> {
    // Both queues share one in-memory backend to simulate a restart.
    let backend: MemoryBackend<String> = MemoryBackend::new();

    let first: PersistentQueue<String> = PersistentQueue::with_backend(
        "demo-persistent",
        cfg.queue.capacity,
        cfg.persistence.clone(),
        Arc::new(backend.clone()),
    );
    for i in 0..items {
        if let Err(e) = first.enqueue(format!("job-{i}")) {
            println!("offer rejected: {}", e.reason());
        }
    }
    println!("before flush: {:?}", first.persistence_status());
    first.flush();
    println!("after flush:  {:?}", first.persistence_status());

    if let Some(job) = first.dequeue().await? {
        println!("took {job}");
    }
    first.shutdown();
    println!("after shutdown: {:?}", first.persistence_status());
    print!("{}", first.metrics().render(first.name()));

    let second: PersistentQueue<String> = PersistentQueue::with_backend(
        "demo-recovered",
        cfg.queue.capacity,
        cfg.persistence.clone(),
        Arc::new(backend),
    );
    let held = second.recover();
    println!("recovered {held} item(s), head = {:?}", second.peek());
    second.shutdown();
    Ok(())
}
