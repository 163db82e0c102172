use std::{path::Path, sync::Arc};

use tokio_stream::{wrappers::errors::BroadcastStreamRecvError, StreamExt};
use ytlive_rs::{
    chromium::Chromium,
    config::PollerConfig,
    notify::{self, LogSink},
    poller::Poller,
    transport::HttpClient,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Read config path or channel name from args
    let arg = std::env::args()
        .nth(1)
        .expect("Usage: ytlive-rs <config.json | channel-name>");
    let config = if Path::new(&arg).is_file() {
        PollerConfig::from_file(Path::new(&arg)).expect("Could not load config")
    } else {
        PollerConfig::for_channel(&arg)
    };

    let browser = Chromium::launch().await.expect("Could not launch browser");
    let client = HttpClient::new().expect("Could not create HttpClient");

    let poller = Arc::new(
        Poller::new(config, Arc::new(browser), Arc::new(client)).expect("Invalid config"),
    );
    let mut events = poller.subscribe_stream();
    let handle = poller.spawn().expect("Poller already running");

    let sink = LogSink;
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => notify::report(&sink, &event).await,
                Some(Err(BroadcastStreamRecvError::Lagged(n))) => println!("Dropped {} events", n),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping");
                break;
            }
        }
    }

    handle.stop();
}
