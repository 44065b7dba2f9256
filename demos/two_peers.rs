//! # Example: two_peers
//!
//! Two hubs joined over one in-process [`MemoryNetwork`], acting as peers.
//!
//! Shows how to:
//! - Configure hubs with [`BroadcastStrategy::factory`].
//! - Publish on one peer and receive on the other (never on the sender).
//! - Answer a query on one peer and await it on the other.
//! - Watch uncaught subscriber errors on the fault bus.
//!
//! ## Flow
//! ```text
//! peer "billing"                         peer "audit"
//!   publish(Invoiced) ───── app/hub ─────► on(Invoiced) ──► println!
//!   query(Total)      ───── app/hub ─────► reply(Total)
//!        await        ◄──────────────────┘
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=eventtram=debug cargo run --example two_peers
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use eventtram::{
    BroadcastOptions, BroadcastStrategy, EventTram, MemoryNetwork, TramConfig, catalog, define_event, define_query,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Invoice {
    id: u32,
    cents: u64,
}

define_event!(Invoiced = "billing:invoiced" => Invoice);
define_query!(Total = "audit:total" => fn() -> u64);

fn peer(network: &MemoryNetwork) -> EventTram<catalog![], catalog![Invoiced], catalog![Total]> {
    let strategy = BroadcastStrategy::factory(
        network.clone(),
        "app",
        BroadcastOptions::default().with_timeout(Duration::from_secs(1)),
    );
    EventTram::new(TramConfig::default().with_strategy(strategy))
        .register_events::<catalog![Invoiced]>()
        .register_queries::<catalog![Total]>()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let network = MemoryNetwork::new();
    let billing = peer(&network);
    let audit = peer(&network);

    let mut faults = audit.faults();
    tokio::spawn(async move {
        while let Ok(fault) = faults.recv().await {
            println!("[fault] #{} {}", fault.seq, fault.error.as_message());
        }
    });

    let total = Arc::new(Mutex::new(0u64));
    let sum = Arc::clone(&total);
    audit.on(Invoiced, move |invoice| {
        if invoice.cents == 0 {
            anyhow::bail!("invoice {} has no amount", invoice.id);
        }
        let mut sum = sum.lock().map_err(|_| anyhow::anyhow!("total poisoned"))?;
        *sum += invoice.cents;
        println!("[audit] invoice {} for {} cents", invoice.id, invoice.cents);
        Ok(())
    });

    let answer = Arc::clone(&total);
    audit.reply(Total, move |()| {
        let sum = answer.lock().map_err(|_| anyhow::anyhow!("total poisoned"))?;
        Ok(*sum)
    });

    billing.publish(Invoiced, Invoice { id: 1, cents: 1250 })?;
    billing.publish(Invoiced, Invoice { id: 2, cents: 0 })?;
    billing.publish(Invoiced, Invoice { id: 3, cents: 999 })?;

    // Give the audit peer time to receive and dispatch.
    tokio::time::sleep(Duration::from_millis(50)).await;
    audit.flush().await?;

    match billing.query(Total, ())? {
        Some(reply) => println!("[billing] audited total: {} cents", reply.await?),
        None => println!("[billing] nobody keeps totals"),
    }

    Ok(())
}
