pub mod line_api;
pub mod upstream;

pub use line_api::{LineApi, LineIdToken};
pub use upstream::{UpstreamApi, build_http_client};
