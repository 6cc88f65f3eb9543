//! comprobante-publish: publishes a purchase-completed event, the same
//! message the storefront sends when a purchase is paid.
//!
//! ```text
//! comprobante-publish --compra-id 42 --kind boleta --identity 72257140 \
//!     --email cliente@example.com --total 150.50
//! ```

use anyhow::Context;
use clap::Parser;
use tracing::info;

use comprobante_core::config::load_dotenv;
use comprobante_core::{Config, DocumentKind, PurchaseEvent};
use comprobante_queue::{publish_purchase, AmqpBroker, Broker};

#[derive(Parser, Debug)]
#[command(name = "comprobante-publish", version, about)]
struct Cli {
    #[arg(long)]
    compra_id: i64,

    /// `boleta` or `factura`.
    #[arg(long)]
    kind: DocumentKind,

    /// DNI for a boleta, RUC for a factura.
    #[arg(long)]
    identity: String,

    /// Customer address for the emailed summary.
    #[arg(long)]
    email: Option<String>,

    #[arg(long, default_value_t = 0.0)]
    total: f64,
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

    // Producers need no mail credentials or API token.
    let broker_config = Config::broker_from_env().context("invalid broker configuration")?;
    let broker = AmqpBroker::new(&broker_config);

    let event = PurchaseEvent::new(cli.compra_id, cli.kind, cli.identity, cli.email, cli.total);
    let mut session = broker.connect().await?;
    publish_purchase(session.as_mut(), &event).await?;
    session.close().await?;

    info!(compra_id = event.compra_id, queue = event.queue_name(), "done");
    Ok(())
}
