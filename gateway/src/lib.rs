//! llmwarden: a man-in-the-middle reverse proxy for LLM API traffic that
//! normalises vendor dialects, scans content in parallel, evaluates policy,
//! and forwards (or blocks) the request — caching, deduplicating, and
//! circuit-breaking along the way.

pub mod app;
pub mod breaker;
pub mod cache;
pub mod client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod http;
pub mod management;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod policy;
pub mod pool;
pub mod scan;
pub mod scanners;
pub mod stream;
pub mod telemetry;

pub use config::Config;
pub use llmwarden_core::strng;
pub use llmwarden_core::strng::Strng;
