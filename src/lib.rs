//! # ytlive-rs
//!
//! This crate watches a YouTube channel and reports when it goes live, ends a
//! live stream, switches to another one or retitles the current one. It polls
//! the same internal browse API the channel page uses, so it needs a session
//! harvested from a real browser page once per run.
//!
//! ## Usage
//!
//! Build a [`poller::Poller`] from a config, a browser and a transport,
//! register listeners and spawn it. The handle stops the schedule when
//! dropped. A poller runs at most one schedule at a time.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ytlive_rs::{
//!     chromium::Chromium, config::PollerConfig, events::EventKind, poller::Poller,
//!     transport::HttpClient,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PollerConfig::for_channel("somechannel");
//!     let browser = Arc::new(Chromium::launch().await.unwrap());
//!     let client = Arc::new(HttpClient::new().unwrap());
//!
//!     let poller = Arc::new(Poller::new(config, browser, client).unwrap());
//!     poller.on(EventKind::LiveStreamStart, |event| println!("{:?}", event));
//!
//!     let handle = poller.spawn().unwrap();
//!     tokio::signal::ctrl_c().await.unwrap();
//!     handle.stop();
//! }
//! ```
//!
//! Events for one cycle are always emitted in the order `Poll`, then
//! `PollSuccess` or `PollFail`, then at most one live stream transition.

#![forbid(unsafe_code)]
#[macro_use]
extern crate log;

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod config;
pub mod events;
pub mod extractor;
pub mod json;
pub mod notify;
pub mod poller;
pub mod session;
pub mod template;
pub mod transport;
