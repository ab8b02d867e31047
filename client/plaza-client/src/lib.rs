pub mod api;
pub mod client;
pub mod config;
pub mod feed;
pub mod logging;
pub mod media;
pub mod models;
pub mod profile;
pub mod realtime;
pub mod session;
pub mod storage;

pub use client::{ApiSet, PlazaClient};
pub use config::ClientConfig;
pub use error_types::{ClientError, ClientResult};
pub use feed::{FeedSource, FeedSynchronizer};
