//! Usage: One-shot localhost listener for the native authorization-code leg.

use crate::shared::error::AppResult;
use crate::shared::security::constant_time_eq;
use reqwest::Url;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const SUCCESS_HTML: &str =
    "<html><body><h1>Authentication successful</h1><p>You may close this window.</p></body></html>";
const ERROR_HTML: &str = "<html><body><h1>Authentication failed</h1><p>You may close this window and retry.</p></body></html>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallbackPayload {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

#[derive(Debug)]
pub(crate) struct BoundCallbackListener {
    port: u16,
    listener_v4: Option<TcpListener>,
    listener_v6: Option<TcpListener>,
}

impl BoundCallbackListener {
    pub(crate) fn port(&self) -> u16 {
        self.port
    }
}

/// Bind the loopback listener on both stacks. The port comes from the
/// registered redirect URI, so unlike a scratch listener there is no
/// fallback to a dynamic port: a mismatched port would break the exchange.
/// Port 0 (tests) binds dynamically.
pub(crate) async fn bind_callback_listener(port: u16) -> AppResult<BoundCallbackListener> {
    if port == 0 {
        let listener_v4 = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| format!("SYSTEM_ERROR: callback bind failed: 127.0.0.1:0 ({e})"))?;
        let bound_port = listener_v4
            .local_addr()
            .map_err(|e| format!("SYSTEM_ERROR: callback local_addr failed: {e}"))?
            .port();
        let listener_v6 = TcpListener::bind(("::1", bound_port)).await.ok();
        return Ok(BoundCallbackListener {
            port: bound_port,
            listener_v4: Some(listener_v4),
            listener_v6,
        });
    }

    let mut bind_errors: Vec<String> = Vec::new();
    let listener_v4 = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            bind_errors.push(format!("127.0.0.1:{port} ({err})"));
            None
        }
    };
    let listener_v6 = match TcpListener::bind(("::1", port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            bind_errors.push(format!("::1:{port} ({err})"));
            None
        }
    };
    if listener_v4.is_none() && listener_v6.is_none() {
        return Err(format!(
            "SYSTEM_ERROR: callback bind failed: {}",
            bind_errors.join("; ")
        )
        .into());
    }

    Ok(BoundCallbackListener {
        port,
        listener_v4,
        listener_v6,
    })
}

pub(crate) async fn wait_for_callback(
    mut listener: BoundCallbackListener,
    expected_path: String,
    expected_state: String,
    timeout: Duration,
) -> AppResult<CallbackPayload> {
    let accept_future = async {
        match (listener.listener_v4.as_mut(), listener.listener_v6.as_mut()) {
            (Some(v4), Some(v6)) => {
                tokio::select! {
                    result = v4.accept() => result,
                    result = v6.accept() => result,
                }
            }
            (Some(v4), None) => v4.accept().await,
            (None, Some(v6)) => v6.accept().await,
            (None, None) => unreachable!("listeners checked at bind time"),
        }
    };

    let (mut socket, _) = tokio::time::timeout(timeout, accept_future)
        .await
        .map_err(|_| "SYSTEM_ERROR: authorization callback timed out".to_string())?
        .map_err(|e| format!("SYSTEM_ERROR: callback accept failed: {e}"))?;

    let mut buffer = vec![0u8; 8192];
    let size = socket
        .read(&mut buffer)
        .await
        .map_err(|e| format!("SYSTEM_ERROR: callback read failed: {e}"))?;
    if size == 0 {
        return Err("SYSTEM_ERROR: callback request is empty".to_string().into());
    }

    let request = String::from_utf8_lossy(&buffer[..size]);
    let target = extract_request_target(request.as_ref())?;
    let payload = parse_callback_target(target, &expected_path)?;
    validate_state(&payload, &expected_state)?;

    let is_error = payload.error.is_some();
    let body = if is_error { ERROR_HTML } else { SUCCESS_HTML };
    let status = if is_error {
        "HTTP/1.1 400 Bad Request"
    } else {
        "HTTP/1.1 200 OK"
    };
    let response = format!(
        "{status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;

    Ok(payload)
}

fn extract_request_target(request: &str) -> AppResult<&str> {
    let first = request
        .lines()
        .next()
        .ok_or_else(|| "SYSTEM_ERROR: callback request is malformed".to_string())?;
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if method != "GET" || target.is_empty() {
        return Err("SYSTEM_ERROR: callback must be a GET request".to_string().into());
    }
    Ok(target)
}

pub(crate) fn parse_callback_target(target: &str, expected_path: &str) -> AppResult<CallbackPayload> {
    let url = Url::parse(&format!("http://127.0.0.1{target}"))
        .map_err(|e| format!("SYSTEM_ERROR: invalid callback target: {e}"))?;

    if url.path() != expected_path {
        return Err("SYSTEM_ERROR: unexpected callback path".to_string().into());
    }

    let mut code: Option<String> = None;
    let mut state: Option<String> = None;
    let mut error: Option<String> = None;
    let mut error_description: Option<String> = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => error = Some(value.to_string()),
            "error_description" => error_description = Some(value.to_string()),
            _ => {}
        }
    }

    if code.is_none() && error.is_none() {
        return Err("SYSTEM_ERROR: callback carries neither code nor error"
            .to_string()
            .into());
    }

    Ok(CallbackPayload {
        code,
        state,
        error,
        error_description,
    })
}

fn validate_state(payload: &CallbackPayload, expected_state: &str) -> AppResult<()> {
    let state = payload
        .state
        .as_deref()
        .ok_or_else(|| "SYSTEM_ERROR: callback is missing state".to_string())?;
    if !constant_time_eq(state.as_bytes(), expected_state.as_bytes()) {
        return Err("SEC_INVALID_INPUT: callback state mismatch".to_string().into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_callback_target_extracts_code_and_state() {
        let payload =
            parse_callback_target("/auth/callback?code=abc123&state=xyz", "/auth/callback")
                .expect("payload");
        assert_eq!(payload.code.as_deref(), Some("abc123"));
        assert_eq!(payload.state.as_deref(), Some("xyz"));
        assert!(payload.error.is_none());
    }

    #[test]
    fn parse_callback_target_accepts_provider_error() {
        let payload = parse_callback_target(
            "/auth/callback?error=access_denied&error_description=nope&state=xyz",
            "/auth/callback",
        )
        .expect("payload");
        assert_eq!(payload.error.as_deref(), Some("access_denied"));
        assert_eq!(payload.error_description.as_deref(), Some("nope"));
    }

    #[test]
    fn parse_callback_target_rejects_wrong_path() {
        let err = parse_callback_target("/other?code=abc&state=x", "/auth/callback")
            .expect_err("wrong path");
        assert!(err.to_string().contains("unexpected callback path"));
    }

    #[test]
    fn parse_callback_target_requires_code_or_error() {
        let err = parse_callback_target("/auth/callback?state=x", "/auth/callback")
            .expect_err("no code");
        assert!(err.to_string().contains("neither code nor error"));
    }

    #[test]
    fn validate_state_rejects_mismatch() {
        let payload = CallbackPayload {
            code: Some("abc".to_string()),
            state: Some("foo".to_string()),
            error: None,
            error_description: None,
        };
        let err = validate_state(&payload, "bar").expect_err("should fail");
        assert!(err.to_string().contains("state mismatch"));
    }

    #[tokio::test]
    async fn wait_for_callback_round_trip_on_dynamic_port() {
        let listener = bind_callback_listener(0).await.expect("bind");
        let port = listener.port();

        let wait = tokio::spawn(wait_for_callback(
            listener,
            "/auth/callback".to_string(),
            "state-1".to_string(),
            Duration::from_secs(5),
        ));

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect");
        stream
            .write_all(b"GET /auth/callback?code=abc123&state=state-1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .expect("send");
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;
        assert!(String::from_utf8_lossy(&response).contains("200 OK"));

        let payload = wait.await.expect("join").expect("payload");
        assert_eq!(payload.code.as_deref(), Some("abc123"));
    }
}
