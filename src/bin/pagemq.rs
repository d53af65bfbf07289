//! pagemq – runs a producer, a consumer and a management poller against an
//! embedded server and checks that the queue drains cleanly.
//
//  $ pagemq scenario --config pagemq.toml --messages 1000
//  $ pagemq show-config --config pagemq.toml
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use pagemq::core::Server;
use pagemq::{logging, metrics, Config, Consumer, ManagementPoller, Message, Producer};

#[derive(Debug, Parser)]
#[command(name = "pagemq", version, about = "PageMQ paging scenario runner")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send, drain and poll one queue while the address pages.
    Scenario {
        /// Path to config TOML (env PAGEMQ_CONFIG is used when absent)
        #[arg(short, long)]
        config: Option<String>,
        #[arg(long, default_value_t = 1000)]
        messages: u64,
        #[arg(long, default_value_t = 128)]
        body_size: usize,
        #[arg(long, default_value_t = 1000)]
        poll_interval_ms: u64,
        #[arg(long, default_value_t = 1)]
        producer_delay_ms: u64,
        #[arg(long, default_value_t = 2)]
        consumer_delay_ms: u64,
    },
    /// Print the effective configuration.
    ShowConfig {
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    match cli.cmd {
        Command::Scenario {
            config,
            messages,
            body_size,
            poll_interval_ms,
            producer_delay_ms,
            consumer_delay_ms,
        } => {
            let cfg = Config::load(config.as_deref())?;
            run_scenario(
                &cfg,
                messages,
                body_size,
                Duration::from_millis(poll_interval_ms),
                Duration::from_millis(producer_delay_ms),
                Duration::from_millis(consumer_delay_ms),
            )
            .await?;
        }
        Command::ShowConfig { config } => {
            let cfg = Config::load(config.as_deref())?;
            println!("{cfg:#?}");
        }
    }
    Ok(())
}

async fn run_scenario(
    cfg: &Config,
    messages: u64,
    body_size: usize,
    poll_interval: Duration,
    producer_delay: Duration,
    consumer_delay: Duration,
) -> anyhow::Result<()> {
    let server = Server::start(cfg)?;
    let suffix = Uuid::new_v4().simple().to_string();
    let address = format!("scenario.{suffix}");
    let queue = format!("scenario.{suffix}.q");
    server.create_queue(&address, &queue, None, true)?;

    let control = server.queue_control(&queue)?;
    let poller = ManagementPoller::spawn(control.clone(), poll_interval)?;

    let producer = server.create_producer(&address)?;
    let consumer = server.create_consumer(&queue)?;
    let receive_timeout = cfg.queues.default_receive_timeout();

    let producing = tokio::task::spawn_blocking(move || {
        produce(producer, messages, body_size, producer_delay)
    });
    let consuming = tokio::task::spawn_blocking(move || {
        consume(consumer, messages, receive_timeout, consumer_delay)
    });

    producing.await.context("producer task panicked")??;
    info!(target: "pagemq::scenario", messages, paging = control.is_paging(), "producer finished");
    consuming.await.context("consumer task panicked")??;
    info!(target: "pagemq::scenario", "consumer finished");

    let report = poller.stop();
    if let Some(e) = report.error {
        return Err(e).context("management poller failed");
    }

    let remaining = control.count_messages(None)?;
    if remaining != 0 {
        bail!("queue {queue} still holds {remaining} messages");
    }

    info!(
        target: "pagemq::scenario",
        messages,
        polls = report.polls,
        segments = server.page_store().segment_count(&address),
        "scenario complete"
    );
    for line in metrics::snapshot().lines() {
        info!(target: "pagemq::scenario", "{line}");
    }

    server.shutdown();
    Ok(())
}

fn produce(producer: Producer, messages: u64, body_size: usize, delay: Duration) -> anyhow::Result<()> {
    for i in 0..messages {
        let message = Message::new(true)
            .with_body(vec![(i % 256) as u8; body_size])
            .with_property("i", i as i64)
            .with_property("parity", if i % 2 == 0 { "even" } else { "odd" });
        if producer.send(message)? == 0 {
            bail!("message {i} was not stored");
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
    Ok(())
}

fn consume(mut consumer: Consumer, messages: u64, timeout: Duration, delay: Duration) -> anyhow::Result<()> {
    for expected in 0..messages {
        let Some(delivery) = consumer.receive(timeout)? else {
            bail!("timed out waiting for message {expected}");
        };
        let got = delivery.message.property("i").and_then(|v| v.as_i64());
        if got != Some(expected as i64) {
            bail!("out of order delivery: expected {expected}, got {got:?}");
        }
        if delivery.delivery_count > 1 {
            warn!(target: "pagemq::scenario", i = expected, count = delivery.delivery_count, "redelivered");
        }
        consumer.acknowledge(&delivery);
        consumer.commit()?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
    Ok(())
}
