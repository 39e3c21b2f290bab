//! GitHub webhook receiver that records pushes, opened pull requests and
//! merges, and serves the most recent ones as a JSON feed.

pub mod config;
pub mod event;
pub mod normalize;
pub mod server;
pub mod signature;
pub mod store;
