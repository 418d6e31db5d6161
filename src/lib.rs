pub mod alerts;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod graph;
pub mod platform;
pub mod server;

pub use cache::{CacheSnapshot, CacheState, GraphCache};
pub use config::Config;
pub use error::{InspectorError, Result};
pub use graph::{scan_entities, DependencyEntry, DependencyGraph, GraphBuilder, GraphSource};
pub use platform::{EntityState, HomeAssistantClient, PlatformApi};
