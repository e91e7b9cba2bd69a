//! Test helpers for HTTP integration tests.
//!
//! Provides a gateway wired to an in-memory database and a recording relay,
//! plus helpers for reading CGI records.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;

use wc24mail::config::Config;
use wc24mail::mail::Relay;
use wc24mail::web::{create_router, AppState};
use wc24mail::{Database, Result};

/// A console with a valid number.
pub const ALICE: &str = "w6382198605942757";
/// A second console with a valid number.
pub const BOB: &str = "w2649255872877667";

/// Relay that keeps every submission in memory.
#[derive(Default)]
pub struct RecordingRelay {
    pub sent: Mutex<Vec<(String, String, Vec<u8>)>>,
}

#[async_trait]
impl Relay for RecordingRelay {
    async fn relay(&self, from: &str, to: &str, payload: &[u8]) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((from.to_string(), to.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// A gateway under test.
pub struct TestGateway {
    pub server: TestServer,
    pub db: Arc<Database>,
    pub state: AppState,
    pub relay: Arc<RecordingRelay>,
}

/// Create a gateway backed by an in-memory database.
pub async fn create_gateway() -> TestGateway {
    let mut config = Config::default();
    config.auth.salt = "test-salt".to_string();

    let db = Arc::new(
        Database::open_in_memory()
            .await
            .expect("Failed to create test database"),
    );
    let relay = Arc::new(RecordingRelay::default());
    let state = AppState::new(db.clone(), &config, relay.clone());

    let server =
        TestServer::new(create_router(Arc::new(state.clone()))).expect("Failed to create test server");

    TestGateway {
        server,
        db,
        state,
        relay,
    }
}

/// Credentials returned by account.cgi.
pub struct Registered {
    pub mlid: String,
    pub password: String,
    pub mlchkid: String,
}

/// Register a console and return its credentials.
pub async fn register(server: &TestServer, mlid: &str) -> Registered {
    let response = server
        .post("/cgi-bin/account.cgi")
        .form(&[("mlid", mlid)])
        .await;
    let text = response.text();
    assert_eq!(field(&text, "cd").as_deref(), Some("100"), "{text}");

    Registered {
        mlid: field(&text, "mlid").unwrap(),
        password: field(&text, "passwd").unwrap(),
        mlchkid: field(&text, "mlchkid").unwrap(),
    }
}

/// First `key=value` line for `key` in a CGI record.
pub fn field(text: &str, key: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (name, value) = line.split_once('=')?;
        (name == key).then(|| value.to_string())
    })
}

/// Build one send slot from `sender` (wire id) to `rcpt`.
pub fn slot(sender: &str, rcpt: &str, body: &str) -> String {
    format!(
        "MAIL FROM: {sender}@rc24.xyz\r\n\
         RCPT TO: {rcpt}\r\n\
         DATA\r\n\
         From: {sender}@rc24.xyz\r\n\
         To: {rcpt}\r\n\
         Subject: hello\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         {body}\r\n"
    )
}
