//! Shared HTTP plumbing for the Graph and Google clients.

use std::time::Duration;

use serde_json::Value;

/// Build the client every remote collaborator shares.
///
/// The timeout bounds each request so a cancelled task is never stuck
/// behind a hung connection for longer than `timeout`.
pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("leadable/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Pull a human-readable message out of an `{"error": …}` body.
///
/// Both Graph (`error.message`) and Google (`error.message`, sometimes a bare
/// string) are handled; anything else is rendered as compact JSON.
pub(crate) fn api_error_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    let message = match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(msg) => msg.to_string(),
            None => error.to_string(),
        },
        other => other.to_string(),
    };
    Some(message)
}
