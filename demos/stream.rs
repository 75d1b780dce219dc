//! Read JSON-lines metric events from stdin, feed them through a consumer and
//! print the rendered metrics once stdin closes.
//!
//!   printf '{"name":"req_duration","time":0.12,"labels":{"status":200}}\n' \
//!     | cargo run --example stream -- overrides.json

use std::io::BufRead;

use metrics_consumer::{Consumer, ConsumerOptions, MetricEvent};

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let mut consumer = Consumer::new(ConsumerOptions::default())?;
    if let Some(path) = std::env::args().nth(1) {
        let loaded = consumer.load_overrides_json(&std::fs::read_to_string(path)?)?;
        tracing::info!(message = "loaded overrides", count = loaded);
    }

    let mut errors = consumer
        .errors()
        .ok_or_else(|| anyhow::anyhow!("error receiver already taken"))?;
    let reporter = tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            eprintln!("rejected: {err}");
        }
    });
    let (tx, rx) = tokio::sync::mpsc::channel(1024);
    let reader = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        for line in std::io::stdin().lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MetricEvent>(&line) {
                Ok(event) => {
                    if tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(message = "skipping malformed line", error = %e),
            }
        }
        Ok(())
    });

    let consumed = consumer.run(rx).await;
    reader.await??;
    let text = consumer.metrics()?;
    let content_type = consumer.content_type();
    // Dropping the consumer closes the error channel and ends the reporter.
    drop(consumer);
    reporter.await?;
    eprintln!("consumed {consumed} events ({content_type})");
    print!("{text}");
    Ok(())
}
