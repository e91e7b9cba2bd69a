//! HTTP surface for the gateway.
//!
//! This module serves the console CGI endpoints, the inbound mail webhook
//! and a health check.

pub mod error;
pub mod form;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::{ApiError, CGI_CONTENT_TYPE};
pub use form::{CgiForm, FormField};
pub use router::{create_health_router, create_router, MAX_BODY_SIZE};
pub use server::WebServer;
pub use state::AppState;
