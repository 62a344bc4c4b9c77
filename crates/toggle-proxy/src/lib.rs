//! Toggle Proxy - same-origin chat proxy
//!
//! Thin HTTP shim between the chat widget and the Python backend:
//! - [`routes`]: validation, forwarding and response shaping per route
//! - [`upstream`]: the backend seam and its reqwest implementation
//! - [`config`]: layered proxy configuration

pub mod config;
pub mod routes;
pub mod upstream;

pub use config::{ConfigError, ProxyConfig};
pub use routes::{routes, ProxyState};
pub use upstream::{HttpUpstream, Upstream, UpstreamReply};

use std::sync::Arc;
use toggle_core::ChatError;
use warp::filters::BoxedFilter;
use warp::reply::Response;

/// Routes forwarding to the backend named in `config`
///
/// # Errors
/// `ChatError::Config` if the HTTP client cannot be built
pub fn build_routes(config: &ProxyConfig) -> Result<BoxedFilter<(Response,)>, ChatError> {
    let upstream = HttpUpstream::new(&config.backend_url, config.request_timeout())?;
    Ok(routes(ProxyState::new(Arc::new(upstream), config.industry)))
}
