//! The generic API tester: build one request from the form fields, send it,
//! render the outcome as text for the result panel.
//!
//! Only [`execute`] touches the wire; preparation and outcome rendering are
//! synchronous.

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// POST and PUT carry the body as a JSON payload; every other method
    /// flattens it into the query string instead.
    fn carries_payload(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

/// One click's worth of request form state, discarded after the response
/// renders.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub url: String,
    pub method: HttpMethod,
    pub body: Option<Value>,
}

/// The finished product of [`prepare`]: everything the executor hands to
/// `reqwest`, with the method-dependent body handling already applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub payload: Option<String>,
    pub content_type: Option<&'static str>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    /// Server-reported failure: the 400 `message` field, or a status reason.
    #[error("{0}")]
    Status(String),
    #[error("{0}")]
    Send(reqwest::Error),
    #[error("{0}")]
    Receive(reqwest::Error),
    #[error("{0}")]
    Decode(serde_json::Error),
    #[error("request aborted")]
    Aborted,
}

const GENERIC_FAILURE: &str = "Something went wrong";

/// Read the form fields into a request descriptor. A body field that is not
/// valid JSON drops the whole request: the failure is logged and `None`
/// comes back, so no network call happens.
pub fn from_fields(url: &str, method: HttpMethod, raw_body: &str) -> Option<ApiRequest> {
    match parse_body(raw_body) {
        Ok(body) => Some(ApiRequest {
            url: url.to_string(),
            method,
            body,
        }),
        Err(err) => {
            warn!(%err, "request body is not valid JSON, dropping request");
            None
        }
    }
}

/// A blank body field means "no body".
pub fn parse_body(raw: &str) -> Result<Option<Value>, serde_json::Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw).map(Some)
}

pub fn prepare(request: ApiRequest) -> PreparedRequest {
    if request.method.carries_payload() {
        let payload = request.body.as_ref().map(Value::to_string);
        let content_type = payload.as_ref().map(|_| "application/json");
        PreparedRequest {
            method: request.method,
            url: request.url,
            payload,
            content_type,
        }
    } else {
        PreparedRequest {
            method: request.method,
            url: append_query(&request.url, request.body.as_ref()),
            payload: None,
            content_type: None,
        }
    }
}

/// Append the body's top-level fields as query parameters, joining with `&`
/// when the URL already has a query string and `?` otherwise.
fn append_query(url: &str, body: Option<&Value>) -> String {
    let fields = match body {
        None => return url.to_string(),
        Some(Value::Object(fields)) => fields,
        Some(other) => {
            warn!(
                body = %other,
                "only object bodies become query parameters, ignoring"
            );
            return url.to_string();
        }
    };
    if fields.is_empty() {
        return url.to_string();
    }

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        query.append_pair(key, &query_value(value));
    }

    let has_query = match url::Url::parse(url) {
        Ok(parsed) => parsed.query().is_some(),
        // Let reqwest report the bad URL at send time.
        Err(_) => url.contains('?'),
    };
    let separator = if has_query { '&' } else { '?' };
    format!("{url}{separator}{}", query.finish())
}

/// Strings go in unquoted; everything else uses its JSON text.
fn query_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Send a prepared request and render the outcome. `Ok` is panel text
/// (pretty JSON), `Err` renders through its `Display` as a plain error line.
pub async fn execute(
    client: &reqwest::Client,
    prepared: PreparedRequest,
) -> Result<String, ApiError> {
    let mut builder = match prepared.method {
        HttpMethod::Get => client.get(&prepared.url),
        HttpMethod::Post => client.post(&prepared.url),
        HttpMethod::Put => client.put(&prepared.url),
        HttpMethod::Delete => client.delete(&prepared.url),
        HttpMethod::Patch => client.patch(&prepared.url),
    };
    if let Some(content_type) = prepared.content_type {
        builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
    }
    if let Some(payload) = prepared.payload {
        builder = builder.body(payload);
    }

    let response = builder.send().await.map_err(ApiError::Send)?;
    let status = response.status();
    let body = response.text().await.map_err(ApiError::Receive)?;
    render_outcome(status, &body)
}

/// Status-dispatched rendering of a completed response.
pub fn render_outcome(status: StatusCode, body: &str) -> Result<String, ApiError> {
    if status.is_success() {
        let value: Value = serde_json::from_str(body).map_err(ApiError::Decode)?;
        return Ok(pretty(&value));
    }

    if status == StatusCode::BAD_REQUEST {
        let value: Value = serde_json::from_str(body).map_err(ApiError::Decode)?;
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(GENERIC_FAILURE);
        return Err(ApiError::Status(message.to_string()));
    }

    // 401 gets no special handling yet and takes the same path as any other
    // failure status: the body verbatim when it parses, a reason otherwise.
    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(pretty(&value)),
        Err(_) => Err(ApiError::Status(
            status
                .canonical_reason()
                .unwrap_or(GENERIC_FAILURE)
                .to_string(),
        )),
    }
}

/// 4-space-indented JSON, the indentation the result panel always shows.
pub fn pretty(value: &Value) -> String {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(url: &str, method: HttpMethod, body: Option<Value>) -> ApiRequest {
        ApiRequest {
            url: url.to_string(),
            method,
            body,
        }
    }

    #[test]
    fn get_body_becomes_query() {
        let prepared = prepare(request(
            "http://x/y",
            HttpMethod::Get,
            Some(json!({"a": 1, "b": 2})),
        ));
        assert_eq!(prepared.url, "http://x/y?a=1&b=2");
        assert_eq!(prepared.payload, None);
        assert_eq!(prepared.content_type, None);
    }

    #[test]
    fn get_preserves_existing_query() {
        let prepared = prepare(request(
            "http://x/y?z=1",
            HttpMethod::Get,
            Some(json!({"a": 1})),
        ));
        assert_eq!(prepared.url, "http://x/y?z=1&a=1");
    }

    #[test]
    fn get_without_body_leaves_url_alone() {
        let prepared = prepare(request("http://x/y", HttpMethod::Get, None));
        assert_eq!(prepared.url, "http://x/y");
    }

    #[test]
    fn string_values_go_in_unquoted() {
        let prepared = prepare(request(
            "http://x/y",
            HttpMethod::Get,
            Some(json!({"q": "hello world"})),
        ));
        assert_eq!(prepared.url, "http://x/y?q=hello+world");
    }

    #[test]
    fn non_object_body_is_ignored_for_query_methods() {
        let prepared = prepare(request(
            "http://x/y",
            HttpMethod::Delete,
            Some(json!([1, 2, 3])),
        ));
        assert_eq!(prepared.url, "http://x/y");
    }

    #[test]
    fn post_serializes_json_payload() {
        let prepared = prepare(request(
            "http://x/y",
            HttpMethod::Post,
            Some(json!({"name": "pie"})),
        ));
        assert_eq!(prepared.url, "http://x/y");
        assert_eq!(prepared.payload.as_deref(), Some(r#"{"name":"pie"}"#));
        assert_eq!(prepared.content_type, Some("application/json"));
    }

    #[test]
    fn put_carries_payload_like_post() {
        let prepared = prepare(request(
            "http://x/y",
            HttpMethod::Put,
            Some(json!({"a": true})),
        ));
        assert_eq!(prepared.payload.as_deref(), Some(r#"{"a":true}"#));
        assert_eq!(prepared.content_type, Some("application/json"));
    }

    #[test]
    fn post_without_body_sends_no_payload() {
        let prepared = prepare(request("http://x/y", HttpMethod::Post, None));
        assert_eq!(prepared.payload, None);
        assert_eq!(prepared.content_type, None);
    }

    #[test]
    fn delete_takes_the_query_path() {
        let prepared = prepare(request(
            "http://x/y",
            HttpMethod::Delete,
            Some(json!({"id": 7})),
        ));
        assert_eq!(prepared.url, "http://x/y?id=7");
        assert_eq!(prepared.payload, None);
    }

    #[test]
    fn invalid_body_yields_no_request() {
        assert!(from_fields("http://x/y", HttpMethod::Get, "{not json").is_none());
    }

    #[test]
    fn blank_body_is_no_body() {
        assert_eq!(parse_body("   \n ").unwrap(), None);
    }

    #[test]
    fn ok_renders_four_space_indented_json() {
        let rendered = render_outcome(StatusCode::OK, r#"{"ok":true}"#).unwrap();
        assert_eq!(rendered, "{\n    \"ok\": true\n}");
    }

    #[test]
    fn ok_with_non_json_body_is_a_decode_error() {
        assert!(matches!(
            render_outcome(StatusCode::OK, "<html>"),
            Err(ApiError::Decode(_))
        ));
    }

    #[test]
    fn bad_request_surfaces_the_message_field() {
        let err = render_outcome(StatusCode::BAD_REQUEST, r#"{"message":"bad"}"#).unwrap_err();
        assert_eq!(err.to_string(), "bad");
    }

    #[test]
    fn bad_request_without_message_falls_back() {
        let err = render_outcome(StatusCode::BAD_REQUEST, r#"{"code":9}"#).unwrap_err();
        assert_eq!(err.to_string(), "Something went wrong");
    }

    #[test]
    fn other_failures_with_json_render_the_body() {
        let rendered =
            render_outcome(StatusCode::INTERNAL_SERVER_ERROR, r#"{"detail":"boom"}"#).unwrap();
        assert_eq!(rendered, "{\n    \"detail\": \"boom\"\n}");
    }

    #[test]
    fn unauthorized_takes_the_generic_path() {
        let rendered = render_outcome(StatusCode::UNAUTHORIZED, r#"{"message":"no"}"#).unwrap();
        assert_eq!(rendered, "{\n    \"message\": \"no\"\n}");
    }

    #[test]
    fn other_failures_without_json_use_the_status_reason() {
        let err = render_outcome(StatusCode::SERVICE_UNAVAILABLE, "<html>").unwrap_err();
        assert_eq!(err.to_string(), "Service Unavailable");
    }

    #[test]
    fn unknown_status_without_json_uses_the_fallback() {
        let status = StatusCode::from_u16(599).unwrap();
        let err = render_outcome(status, "???").unwrap_err();
        assert_eq!(err.to_string(), "Something went wrong");
    }
}
