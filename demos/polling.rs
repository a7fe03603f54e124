//! Polls a public JSON endpoint and prints every update.
//!
//! ```sh
//! RUST_LOG=tether=debug cargo run --example polling -- https://httpbin.org/uuid
//! ```

use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result;
use futures::StreamExt;
use tether::cache::{Cache, MemoryStore, Strategy};
use tether::client::ReqwestClient;
use tether::coordinator::Coordinator;
use tether::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum Message {
    Prefetched(String, bool),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/uuid".to_string());

    let options = Options::default()
        .with_client(Arc::new(ReqwestClient::new()?))
        .with_cache(Cache::new(Strategy::Stale, MemoryStore::new()))
        .with_timeout(Duration::from_secs(5));

    let feed = Resource::from_spec(
        ResourceOptions::new(url).interval(Duration::from_secs(2)),
        &options,
    )?;
    feed.on(Event::Success, |r| {
        println!("[{}] {}", r.status().unwrap_or_default(), r.data().unwrap_or_default());
    });
    feed.on(Event::Error, |r| {
        eprintln!("request failed: {:?}", r.error());
    });

    let coordinator = Coordinator::builder(options).resource("feed", feed).build()?;

    let mut messages = coordinator
        .mount()?
        .map(|(name, outcome)| Message::Prefetched(name, outcome.is_ok()))
        .into_stream();
    while let Some(message) = messages.next().await {
        println!("{message:?}");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = tokio::time::sleep(Duration::from_secs(10)) => {}
    }

    coordinator.unmount();
    Ok(())
}
