use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};

use merger_core::app::{MergerBuilder, MergerConfig};
use merger_core::domain::{MergeKey, MergerError};
use merger_core::impls::InMemoryMergeStore;
use merger_core::ports::BatchHandler;

/// Demo handler: the place a host would enqueue one job carrying the
/// whole batch.
struct PrintBatchHandler;

#[async_trait]
impl BatchHandler for PrintBatchHandler {
    async fn handle(&self, key: &MergeKey, batch: Vec<Value>) -> Result<(), MergerError> {
        println!("[{key}] executing batch of {} message(s): {batch:?}", batch.len());
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // (A) store, handler, and a demo-friendly poll cadence
    let config = MergerConfig {
        poll_interval: Duration::from_millis(500),
        ..MergerConfig::default_v1()
    };
    let merger = MergerBuilder::new()
        .store(Arc::new(InMemoryMergeStore::new()))
        .handler(Arc::new(PrintBatchHandler))
        .config(config)
        .build()
        .expect("wiring is complete");

    // (B) accumulate messages - note the duplicate payload: it counts
    // twice in the sequence but once in the dedup set
    let digest = MergeKey::new("mail:digest");
    let alerts = MergeKey::new("mail:alerts");
    let at = Utc::now() + chrono::Duration::seconds(1);

    merger.push(&digest, &json!([1, 2, 3]), at).await.unwrap();
    merger.push(&digest, &json!([1, 2, 3]), at).await.unwrap();
    merger.push(&digest, &json!([2, 3, 4]), at).await.unwrap();
    merger
        .push(&alerts, &json!({"to": "ops", "level": "warn"}), at)
        .await
        .unwrap();

    println!("pending before dispatch: {:?}", merger.counts().await.unwrap());
    println!(
        "digest already queued [1,2,3]? {}",
        merger.contains(&digest, &json!([1, 2, 3])).await.unwrap()
    );

    // (C) start the scheduler and wait for both keys to drain
    let handle = merger.start();
    loop {
        let counts = merger.counts().await.unwrap();
        if counts.keys == 0 {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    println!("pending after dispatch: {:?}", merger.counts().await.unwrap());

    // (D) graceful shutdown
    handle.shutdown_and_join().await;
}
