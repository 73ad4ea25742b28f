//! The login and upload forms: one-shot POSTs with a shared render rule.
//!
//! Success renders the response body as pretty JSON; failure renders the
//! body's `message` field when the server provides one, else the form's own
//! fallback string.

use std::path::PathBuf;

use serde_json::{Value, json};
use tracing::warn;

use crate::api;

pub const LOGIN_PATH: &str = "/api/account/login";
pub const UPLOAD_PATH: &str = "/api/upload";

pub const LOGIN_FAILED: &str = "login failed";
pub const UPLOAD_FAILED: &str = "upload failed";

/// POST `{account, password}` as JSON and hand the rendered outcome to
/// `emit`.
pub fn spawn_login(
    base: String,
    account: String,
    password: String,
    emit: impl FnOnce(String) + Send + 'static,
) {
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("failed to create login runtime");
        let rendered = rt.block_on(async move {
            let payload = json!({ "account": account, "password": password });
            let sent = reqwest::Client::new()
                .post(join(&base, LOGIN_PATH))
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload.to_string())
                .send()
                .await;
            render_response(sent, LOGIN_FAILED).await
        });
        emit(rendered);
    });
}

/// POST the picked file as the `file` part of a multipart form.
pub fn spawn_upload(base: String, path: PathBuf, emit: impl FnOnce(String) + Send + 'static) {
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("failed to create upload runtime");
        let rendered = rt.block_on(async move {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(path = %path.display(), %err, "could not read upload file");
                    return err.to_string();
                }
            };
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("file")
                .to_string();
            let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
            let form = reqwest::multipart::Form::new().part("file", part);

            let sent = reqwest::Client::new()
                .post(join(&base, UPLOAD_PATH))
                .multipart(form)
                .send()
                .await;
            render_response(sent, UPLOAD_FAILED).await
        });
        emit(rendered);
    });
}

fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

async fn render_response(
    sent: Result<reqwest::Response, reqwest::Error>,
    fallback: &str,
) -> String {
    let response = match sent {
        Ok(response) => response,
        Err(err) => {
            warn!(%err, "form request failed");
            return err.to_string();
        }
    };
    let ok = response.status().is_success();
    match response.text().await {
        Ok(body) => render_outcome(ok, &body, fallback),
        Err(err) => {
            warn!(%err, "form response unreadable");
            fallback.to_string()
        }
    }
}

/// The render rule shared by both forms.
fn render_outcome(ok: bool, body: &str, fallback: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) if ok => api::pretty(&value),
        Ok(value) => value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(fallback)
            .to_string(),
        Err(err) => {
            warn!(%err, "form response is not JSON");
            fallback.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_renders_pretty_json() {
        let rendered = render_outcome(true, r#"{"token":"abc"}"#, LOGIN_FAILED);
        assert_eq!(rendered, "{\n    \"token\": \"abc\"\n}");
    }

    #[test]
    fn failure_surfaces_the_message_field() {
        let rendered = render_outcome(false, r#"{"message":"bad credentials"}"#, LOGIN_FAILED);
        assert_eq!(rendered, "bad credentials");
    }

    #[test]
    fn failure_without_message_uses_the_fallback() {
        let rendered = render_outcome(false, r#"{"code":9}"#, UPLOAD_FAILED);
        assert_eq!(rendered, "upload failed");
    }

    #[test]
    fn unparseable_body_uses_the_fallback() {
        let rendered = render_outcome(false, "<html>", UPLOAD_FAILED);
        assert_eq!(rendered, "upload failed");
    }

    #[test]
    fn base_joins_without_doubled_slashes() {
        assert_eq!(
            join("http://localhost:9001/", LOGIN_PATH),
            "http://localhost:9001/api/account/login"
        );
        assert_eq!(
            join("http://localhost:9001", UPLOAD_PATH),
            "http://localhost:9001/api/upload"
        );
    }
}
