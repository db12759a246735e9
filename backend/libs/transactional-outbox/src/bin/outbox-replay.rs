//! Outbox replay - inspect and requeue rows the relay gave up on.
//!
//! Environment variables:
//! - DATABASE_URL: PostgreSQL URL holding `events.outbox` (or pass --database-url)
//! - RUST_LOG: log filter (default: "warn")

use clap::Parser;
use transactional_outbox::{
    render_replay_result, FailedEvent, ReplayArgs, ReplayMode, ReplayOptions, ReplayStore,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let options = match ReplayArgs::parse().resolve(|key| std::env::var(key).ok()) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("invalid arguments: {e}");
            std::process::exit(2);
        }
    };

    match tokio::time::timeout(options.timeout, run(&options)).await {
        Ok(Ok(output)) => println!("{output}"),
        Ok(Err(e)) => {
            eprintln!("outbox replay failed: {e:#}");
            std::process::exit(1);
        }
        Err(_) => {
            eprintln!("outbox replay timed out after {:?}", options.timeout);
            std::process::exit(1);
        }
    }
}

async fn run(options: &ReplayOptions) -> anyhow::Result<String> {
    let store = ReplayStore::connect(&options.database_url).await?;
    let topic = options.topic.as_deref();

    let output = match options.mode {
        ReplayMode::ListFailed => {
            let rows = store.list_failed(topic, options.limit).await?;
            render_failed(&rows)
        }
        ReplayMode::RequeueFailed => {
            let ids = store
                .requeue_failed(topic, options.limit, options.dry_run, options.reset_attempts)
                .await?;
            render_replay_result(&ids, options.dry_run)
        }
        ReplayMode::RequeueEvent => {
            let event_id = options.event_id.as_deref().unwrap_or_default();
            let ids = store
                .requeue_event(event_id, options.dry_run, options.reset_attempts)
                .await?;
            render_replay_result(&ids, options.dry_run)
        }
    };

    store.close().await;
    Ok(output)
}

fn render_failed(rows: &[FailedEvent]) -> String {
    if rows.is_empty() {
        return "no failed outbox rows".to_string();
    }
    let mut out = String::from("event_id\ttopic\tattempts\tavailable_at\tlast_error");
    for row in rows {
        out.push_str(&format!(
            "\n{}\t{}\t{}\t{}\t{}",
            row.event_id,
            row.topic,
            row.attempts,
            row.available_at.to_rfc3339(),
            row.last_error
        ));
    }
    out
}
