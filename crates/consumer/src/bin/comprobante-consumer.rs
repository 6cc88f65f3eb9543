//! comprobante-consumer: runs the boleta and/or factura consumers.
//!
//! Each consumer gets its own broker connection and tokio task. The process
//! exits with a failure status as soon as any consumer stops, leaving restarts
//! to the supervisor.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::task::JoinSet;
use tracing::{error, info};

use comprobante_consumer::{ConsumerSettings, DocumentConsumer, Pipeline};
use comprobante_core::config::load_dotenv;
use comprobante_core::{Config, DocumentKind};
use comprobante_enrich::HttpIdentityClient;
use comprobante_notify::{EmailNotifier, ReceiptRenderer};
use comprobante_queue::{AmqpBroker, Broker};
use comprobante_store::connect_repository;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Boleta,
    Factura,
    All,
}

impl KindArg {
    fn kinds(self) -> Vec<DocumentKind> {
        match self {
            KindArg::Boleta => vec![DocumentKind::Boleta],
            KindArg::Factura => vec![DocumentKind::Factura],
            KindArg::All => DocumentKind::ALL.to_vec(),
        }
    }
}

/// Consume purchase messages and issue boletas/facturas.
#[derive(Parser, Debug)]
#[command(name = "comprobante-consumer", version, about)]
struct Cli {
    /// Document kind(s) to consume.
    #[arg(long, env = "CONSUMER_KIND", value_enum, default_value = "all")]
    kind: KindArg,

    /// Unacknowledged deliveries allowed in flight per consumer (1-10).
    #[arg(long)]
    prefetch: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(prefetch) = cli.prefetch {
        config.consumer.set_prefetch(prefetch);
    }
    config.log_summary();

    let lookup = Arc::new(HttpIdentityClient::from_config(&config.identity)?);
    let notifier = Arc::new(EmailNotifier::from_config(&config.mail)?);
    let renderer = Arc::new(ReceiptRenderer::new()?);
    let repository = connect_repository(&config.store)
        .await
        .context("document store unavailable")?;
    let broker: Arc<dyn Broker> = Arc::new(AmqpBroker::new(&config.broker));

    let mut tasks = JoinSet::new();
    for kind in cli.kind.kinds() {
        let pipeline = Arc::new(Pipeline::new(
            kind,
            lookup.clone(),
            notifier.clone(),
            renderer.clone(),
            repository.clone(),
        ));
        let settings = ConsumerSettings::from_config(kind, &config.consumer);
        let mut consumer = DocumentConsumer::new(settings, broker.clone(), pipeline);

        info!(%kind, queue = kind.queue_name(), "starting consumer");
        tasks.spawn(async move { (kind, consumer.run().await) });
    }

    tokio::select! {
        joined = tasks.join_next() => {
            match joined {
                Some(Ok((kind, Err(e)))) => {
                    error!(%kind, error = %e, "consumer stopped");
                    Err(anyhow::Error::new(e).context(format!("{kind} consumer stopped")))
                }
                Some(Ok((kind, Ok(())))) => {
                    anyhow::bail!("{kind} consumer exited unexpectedly")
                }
                Some(Err(e)) => Err(anyhow::Error::new(e).context("consumer task failed")),
                None => anyhow::bail!("no consumers configured"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping consumers");
            tasks.abort_all();
            Ok(())
        }
    }
}
