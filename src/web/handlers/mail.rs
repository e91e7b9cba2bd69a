//! Console mail handlers: check, send, receive and delete.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName},
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::auth::{parse_send_auth, AuthError};
use crate::cgi::{
    CgiResponse, CD_AUTH_FAILED, CD_CHECK_ERROR, CD_CHECK_UNKNOWN_USER, CD_DELETE_DELNUM,
    CD_DELETE_STORAGE, CD_RECEIVE_MAXSIZE, CD_SERVER_ERROR,
};
use crate::db::Account;
use crate::mail::{is_slot_key, parse_max_size, ReceiveError};
use crate::web::form::CgiForm;
use crate::web::state::AppState;

const MSG_QUERY_ERROR: &str = "An error has occurred while querying the database.";

/// Poll spans announced on every check response.
const DOWNLOAD_SPAN_HEADERS: [(HeaderName, &str); 2] = [
    (HeaderName::from_static("x-wii-mail-download-span"), "10"),
    (HeaderName::from_static("x-wii-download-span"), "10"),
];

/// Validate the mlid/password pair, or produce the error record.
async fn authenticate(
    state: &AppState,
    mlid: &str,
    password: &str,
) -> Result<Account, CgiResponse> {
    match state.authenticator.validate_password(mlid, password).await {
        Ok(account) => Ok(account),
        Err(AuthError::Storage(e)) => {
            error!(mlid = %mlid, error = %e, "credential lookup failed");
            Err(CgiResponse::error(CD_SERVER_ERROR, MSG_QUERY_ERROR))
        }
        Err(e) => Err(CgiResponse::error(CD_AUTH_FAILED, e.to_string())),
    }
}

/// POST /cgi-bin/check.cgi - Answer the new-mail challenge.
pub async fn check(State(state): State<Arc<AppState>>, form: CgiForm) -> Response {
    (DOWNLOAD_SPAN_HEADERS, check_record(&state, &form).await).into_response()
}

async fn check_record(state: &AppState, form: &CgiForm) -> CgiResponse {
    let mlchkid = form.text_or_empty("mlchkid");
    if mlchkid.is_empty() {
        return CgiResponse::error(CD_CHECK_ERROR, "Unable to find mlchkid.");
    }

    let challenge = form.text_or_empty("chlng");
    if challenge.is_empty() {
        return CgiResponse::error(CD_CHECK_ERROR, "Unable to find chlng.");
    }

    match state.authenticator.resolve_challenge(&mlchkid, &challenge).await {
        Ok(answer) => CgiResponse::success()
            .with_field("res", answer.digest)
            .with_field("mail.flag", answer.mail_flag)
            .with_field("interval", answer.interval),
        Err(AuthError::UnknownUser) => {
            CgiResponse::error(CD_CHECK_UNKNOWN_USER, "User does not exist.")
        }
        Err(e) => {
            error!(error = %e, "check query failed");
            CgiResponse::error(CD_CHECK_ERROR, "Error has occurred in check query.")
        }
    }
}

/// POST /cgi-bin/send.cgi - Deliver up to sixteen outbound messages.
pub async fn send(State(state): State<Arc<AppState>>, form: CgiForm) -> CgiResponse {
    let (mlid, password) = parse_send_auth(&form.text_or_empty("mlid")).unwrap_or_default();
    if let Err(record) = authenticate(&state, &mlid, &password).await {
        return record;
    }

    // Repeated keys keep their first value
    let mut slots: Vec<(String, String)> = Vec::new();
    for field in form.fields() {
        if is_slot_key(&field.name) && !slots.iter().any(|(name, _)| *name == field.name) {
            slots.push((field.name.clone(), field.text()));
        }
    }

    state.router.route(&mlid, slots).await
}

/// POST /cgi-bin/receive.cgi - Hand pending mail to the console.
pub async fn receive(State(state): State<Arc<AppState>>, form: CgiForm) -> Response {
    let mlid = form.text_or_empty("mlid");
    let account = match authenticate(&state, &mlid, &form.text_or_empty("passwd")).await {
        Ok(account) => account,
        Err(record) => return record.into_response(),
    };

    let max_size = match parse_max_size(&form.text_or_empty("maxsize")) {
        Ok(max_size) => max_size,
        Err(_) => {
            return CgiResponse::error(CD_RECEIVE_MAXSIZE, "maxsize needs to be an int.")
                .into_response()
        }
    };

    match state.mailbox.receive(account.mlid, max_size).await {
        Ok(delivery) => (
            [(header::CONTENT_TYPE, delivery.content_type())],
            delivery.render(),
        )
            .into_response(),
        Err(ReceiveError::Timeout) => {
            warn!(mlid = %mlid, "Database query timed out for console");
            CgiResponse::error(CD_SERVER_ERROR, "Database query timed out.").into_response()
        }
        Err(ReceiveError::InvalidMaxSize) => {
            CgiResponse::error(CD_RECEIVE_MAXSIZE, "maxsize needs to be an int.").into_response()
        }
        Err(ReceiveError::Storage(e)) => {
            error!(mlid = %mlid, error = %e, "mailbox query failed");
            CgiResponse::error(CD_SERVER_ERROR, MSG_QUERY_ERROR).into_response()
        }
    }
}

/// POST /cgi-bin/delete.cgi - Purge delivered mail.
///
/// `delnum` must be an integer but does not limit what is deleted: every
/// delivered message goes. The value is echoed back unchanged.
pub async fn delete(State(state): State<Arc<AppState>>, form: CgiForm) -> CgiResponse {
    let mlid = form.text_or_empty("mlid");
    let account = match authenticate(&state, &mlid, &form.text_or_empty("passwd")).await {
        Ok(account) => account,
        Err(record) => return record,
    };

    let delnum = form.text_or_empty("delnum");
    if delnum.parse::<i64>().is_err() {
        return CgiResponse::error(CD_DELETE_DELNUM, "Invalid delnum value was passed");
    }

    match state.mailbox.delete_sent(account.mlid).await {
        Ok(_) => CgiResponse::success().with_field("deletenum", delnum),
        Err(e) => {
            error!(mlid = %mlid, error = %e, "failed to delete delivered mail");
            CgiResponse::error(
                CD_DELETE_STORAGE,
                "An error has occurred while deleting the messages from the database.",
            )
        }
    }
}
