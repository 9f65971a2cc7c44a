pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod middleware;
pub mod notation;
pub mod router;
pub mod service;
pub mod types;

pub use error::NexusError;
pub use notation::{MathNormalizer, normalize_generated, normalize_math};
