//! Router configuration for the HTTP surface.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{account, check, delete, inbound, receive, send};
use super::state::AppState;
use crate::mail::{MAX_MAIL_SIZE, MAX_SLOTS};

/// Largest request body accepted: a full send request plus form overhead.
pub const MAX_BODY_SIZE: usize = MAX_MAIL_SIZE * (MAX_SLOTS + 1);

/// Create the router.
///
/// ```text
/// POST /cgi-bin/account.cgi
/// POST /cgi-bin/check.cgi
/// POST /cgi-bin/send.cgi
/// POST /cgi-bin/receive.cgi
/// POST /cgi-bin/delete.cgi
/// POST /mail/inbound
/// GET  /health
/// ```
pub fn create_router(state: Arc<AppState>) -> Router {
    let cgi_routes = Router::new()
        .route("/account.cgi", post(account))
        .route("/check.cgi", post(check))
        .route("/send.cgi", post(send))
        .route("/receive.cgi", post(receive))
        .route("/delete.cgi", post(delete));

    Router::new()
        .nest("/cgi-bin", cgi_routes)
        .route("/mail/inbound", post(inbound))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(create_health_router())
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_health_check() {
        let server = TestServer::new(create_health_router()).unwrap();
        let response = server.get("/health").await;
        response.assert_status_ok();
        response.assert_text("OK");
    }

    #[test]
    fn test_body_limit_fits_a_full_send() {
        assert!(MAX_BODY_SIZE > MAX_MAIL_SIZE * MAX_SLOTS);
    }
}
