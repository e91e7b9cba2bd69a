//! Account creation handler.

use std::sync::Arc;

use axum::extract::State;
use tracing::error;

use crate::auth::{register_account, RegistrationError};
use crate::cgi::{CgiResponse, CD_ACCOUNT_STORAGE, CD_DUPLICATE, CD_INVALID_MLID};
use crate::web::form::CgiForm;
use crate::web::state::AppState;

/// POST /cgi-bin/account.cgi - Register a console.
pub async fn account(State(state): State<Arc<AppState>>, form: CgiForm) -> CgiResponse {
    let mlid = form.text_or_empty("mlid");
    if mlid.is_empty() {
        return CgiResponse::error(CD_INVALID_MLID, "mlid not found");
    }

    match register_account(state.db.pool(), state.hasher(), &mlid).await {
        Ok(credentials) => CgiResponse::success()
            .with_field("mlid", credentials.mlid)
            .with_field("passwd", credentials.password)
            .with_field("mlchkid", credentials.mlchkid),
        Err(RegistrationError::InvalidFriendCode) => {
            CgiResponse::error(CD_INVALID_MLID, "Invalid Wii Friend Code")
        }
        Err(RegistrationError::DuplicateAccount) => {
            CgiResponse::error(CD_DUPLICATE, "Duplicate registration.")
        }
        Err(e) => {
            error!(mlid = %mlid, error = %e, "account registration failed");
            CgiResponse::error(
                CD_ACCOUNT_STORAGE,
                "An error has occurred while querying the database.",
            )
        }
    }
}
