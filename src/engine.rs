//! Usage: Auth-flow engine — drives authorization, token exchange, refresh, and
//! logout against the provider through a `ProviderAdapter`.

use crate::callback;
use crate::config::{ProviderOptions, SetupConfig};
use crate::manifest::Manifest;
use crate::provider::{ProviderAdapter, RequestDescriptor};
use crate::session::{decode_jwt_claims, AuthSession, SessionProvenance, TokenKind};
use crate::shared::error::{AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::security::{constant_time_eq, mask_token};
use crate::shared::time::now_unix_seconds;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Command;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tokio::task;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The auth-flow contract the session manager programs against. The engine
/// consults the adapter for request shapes and owns the HTTP mechanics.
pub trait AuthFlow: Send + Sync {
    /// One-time platform setup; must run before any other operation.
    fn setup(&self, config: &SetupConfig) -> AppResult<()>;

    /// Build the authorization URL for a web-platform redirect.
    fn authorize_url<'a>(
        &'a self,
        provider: &'a dyn ProviderAdapter,
        options: &'a ProviderOptions,
    ) -> BoxFuture<'a, AppResult<String>>;

    /// Run the full native authorization attempt: browser, loopback
    /// callback, token exchange.
    fn login<'a>(
        &'a self,
        provider: &'a dyn ProviderAdapter,
        options: &'a ProviderOptions,
    ) -> BoxFuture<'a, AppResult<AuthSession>>;

    /// Complete a web-platform attempt from the redirect's query parameters.
    fn handle_login_callback<'a>(
        &'a self,
        provider: &'a dyn ProviderAdapter,
        params: HashMap<String, String>,
        options: &'a ProviderOptions,
    ) -> BoxFuture<'a, AppResult<AuthSession>>;

    /// Tear down the provider-side session.
    fn logout<'a>(
        &'a self,
        provider: &'a dyn ProviderAdapter,
        session: &'a AuthSession,
    ) -> BoxFuture<'a, AppResult<()>>;

    /// Obtain a fresh session from the stored one's refresh token.
    fn refresh_session<'a>(
        &'a self,
        provider: &'a dyn ProviderAdapter,
        session: &'a AuthSession,
    ) -> BoxFuture<'a, AppResult<AuthSession>>;

    fn is_access_token_expired(&self, session: &AuthSession) -> bool;

    fn get_token(&self, kind: TokenKind, session: &AuthSession) -> Option<String>;

    /// Decode a token's claims without verifying the signature.
    fn decode_token(&self, kind: TokenKind, session: &AuthSession) -> AppResult<Value>;
}

/// Fields of a token-endpoint response, with `expires_in` already resolved to
/// an absolute timestamp.
#[derive(Debug, Clone)]
struct TokenFields {
    access_token: String,
    refresh_token: Option<String>,
    id_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    expires_at: Option<i64>,
}

pub struct AuthEngine {
    http: OnceLock<reqwest::Client>,
    setup: OnceLock<SetupConfig>,
    manifest_cache: tokio::sync::Mutex<Option<Manifest>>,
    pending_state: Mutex<Option<String>>,
}

impl AuthEngine {
    pub fn new() -> Self {
        Self {
            http: OnceLock::new(),
            setup: OnceLock::new(),
            manifest_cache: tokio::sync::Mutex::new(None),
            pending_state: Mutex::new(None),
        }
    }

    fn setup_engine(&self, config: &SetupConfig) -> AppResult<()> {
        if self.setup.get().is_some() {
            tracing::debug!("engine setup called again; keeping the existing configuration");
            return Ok(());
        }

        let client = reqwest::Client::builder()
            .user_agent(format!("ping-connect/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: http client init failed: {e}"))?;

        let _ = self.http.set(client);
        let _ = self.setup.set(config.clone());
        tracing::debug!(
            platform = ?config.platform,
            pkce = config.use_pkce(),
            "auth engine initialized"
        );
        Ok(())
    }

    fn client(&self) -> AppResult<&reqwest::Client> {
        self.http
            .get()
            .ok_or_else(|| AppError::from("SYSTEM_ERROR: engine is not initialized; call setup first"))
    }

    fn setup_config(&self) -> AppResult<&SetupConfig> {
        self.setup
            .get()
            .ok_or_else(|| AppError::from("SYSTEM_ERROR: engine is not initialized; call setup first"))
    }

    /// Fetch the discovery document once and reuse it for every later request.
    async fn manifest(&self, options: &ProviderOptions) -> AppResult<Manifest> {
        let mut cache = self.manifest_cache.lock().await;
        if let Some(manifest) = cache.as_ref() {
            return Ok(manifest.clone());
        }

        options.validate()?;
        let response = self
            .client()?
            .get(options.discovery_url.trim())
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: discovery request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!(
                "SYSTEM_ERROR: discovery request failed with status {}",
                response.status()
            )
            .into());
        }
        let manifest: Manifest = response
            .json()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: discovery document is invalid: {e}"))?;

        tracing::info!(
            issuer = manifest.issuer.as_deref().unwrap_or("unknown"),
            "provider manifest discovered"
        );
        *cache = Some(manifest.clone());
        Ok(manifest)
    }

    fn record_pending_state(&self, descriptor: &RequestDescriptor) {
        *self.pending_state.lock_or_recover() = descriptor.param("state").map(str::to_string);
    }

    /// Consuming the state here makes a second callback for the same redirect
    /// skip local validation and fail at the provider instead, which is where
    /// a consumed authorization code is authoritatively rejected.
    fn take_pending_state(&self) -> Option<String> {
        self.pending_state.lock_or_recover().take()
    }

    async fn authorize_url_impl(
        &self,
        provider: &dyn ProviderAdapter,
        options: &ProviderOptions,
    ) -> AppResult<String> {
        let config = self.setup_config()?.clone();
        let manifest = self.manifest(options).await?;
        let descriptor = provider.authorize_request(&manifest, options, &config)?;
        self.record_pending_state(&descriptor);
        build_authorize_url(&descriptor)
    }

    async fn login_impl(
        &self,
        provider: &dyn ProviderAdapter,
        options: &ProviderOptions,
    ) -> AppResult<AuthSession> {
        let config = self.setup_config()?.clone();
        let manifest = self.manifest(options).await?;
        let descriptor = provider.authorize_request(&manifest, options, &config)?;
        let state = descriptor
            .param("state")
            .ok_or_else(|| AppError::from("SYSTEM_ERROR: authorize request is missing state"))?
            .to_string();
        let auth_url = build_authorize_url(&descriptor)?;
        let (port, path) = parse_redirect_target(&options.redirect_uri)?;

        let listener = callback::bind_callback_listener(port).await?;
        let wait = task::spawn(callback::wait_for_callback(
            listener,
            path,
            state,
            CALLBACK_TIMEOUT,
        ));
        // Yield once so the listener task is polled before the browser lands.
        task::yield_now().await;

        if let Err(err) = open_browser(&auth_url) {
            wait.abort();
            return Err(err);
        }

        let payload = wait
            .await
            .map_err(|e| format!("SYSTEM_ERROR: callback task failed: {e}"))??;
        if let Some(code) = payload.error.as_deref() {
            let description = payload
                .error_description
                .as_deref()
                .unwrap_or("authorization failed");
            return Err(format!("SYSTEM_ERROR: provider returned error={code}: {description}").into());
        }
        let code = payload.code.ok_or_else(|| {
            AppError::from("SYSTEM_ERROR: callback is missing the authorization code")
        })?;

        self.exchange_code(provider, &manifest, options, &config, code)
            .await
    }

    async fn handle_callback_impl(
        &self,
        provider: &dyn ProviderAdapter,
        params: HashMap<String, String>,
        options: &ProviderOptions,
    ) -> AppResult<AuthSession> {
        if let Some(code) = params.get("error") {
            let description = params
                .get("error_description")
                .map(String::as_str)
                .unwrap_or("authorization failed");
            return Err(format!("SYSTEM_ERROR: provider returned error={code}: {description}").into());
        }

        let config = self.setup_config()?.clone();
        let manifest = self.manifest(options).await?;

        if let Some(expected) = self.take_pending_state() {
            let state = params
                .get("state")
                .ok_or_else(|| AppError::from("SEC_INVALID_INPUT: callback is missing state"))?;
            if !constant_time_eq(state.as_bytes(), expected.as_bytes()) {
                return Err("SEC_INVALID_INPUT: callback state mismatch".into());
            }
        }

        if config.use_pkce() {
            let code = params
                .get("code")
                .ok_or_else(|| {
                    AppError::from("SEC_INVALID_INPUT: callback is missing the authorization code")
                })?
                .clone();
            self.exchange_code(provider, &manifest, options, &config, code)
                .await
        } else {
            session_from_redirect_params(
                &params,
                SessionProvenance {
                    manifest,
                    options: options.clone(),
                    config,
                },
            )
        }
    }

    async fn exchange_code(
        &self,
        provider: &dyn ProviderAdapter,
        manifest: &Manifest,
        options: &ProviderOptions,
        config: &SetupConfig,
        code: String,
    ) -> AppResult<AuthSession> {
        let descriptor = provider.token_request(manifest, options, config)?;
        let mut form = descriptor.payload.clone().ok_or_else(|| {
            AppError::from(
                "SYSTEM_ERROR: token request has no payload; implicit-flow tokens arrive in the redirect fragment",
            )
        })?;
        form.push((
            descriptor.token_code_name.unwrap_or("code").to_string(),
            code,
        ));

        let fields = self.post_token_form(&descriptor.url, &form).await?;
        Ok(session_from_fields(
            fields,
            SessionProvenance {
                manifest: manifest.clone(),
                options: options.clone(),
                config: config.clone(),
            },
        ))
    }

    async fn refresh_impl(
        &self,
        provider: &dyn ProviderAdapter,
        session: &AuthSession,
    ) -> AppResult<AuthSession> {
        let descriptor = provider.refresh_token_request(Some(session))?;
        let Some(mut form) = descriptor.payload.clone() else {
            return Err(
                "AUTH_REFRESH_UNSUPPORTED: implicit-flow sessions cannot be refreshed; run a new login"
                    .into(),
            );
        };
        let refresh_token = session
            .token(TokenKind::Refresh)
            .ok_or_else(|| AppError::from("AUTH_MISSING_TOKEN: session has no refresh token"))?
            .to_string();
        form.push((
            descriptor
                .token_code_name
                .unwrap_or("refresh_token")
                .to_string(),
            refresh_token,
        ));

        let fields = self.post_token_form(&descriptor.url, &form).await?;

        // The provider may omit tokens it did not rotate; keep the stored ones.
        Ok(AuthSession {
            id_token: fields.id_token.or_else(|| session.id_token.clone()),
            access_token: fields.access_token,
            refresh_token: fields.refresh_token.or_else(|| session.refresh_token.clone()),
            token_type: fields.token_type.or_else(|| session.token_type.clone()),
            scope: fields.scope.or_else(|| session.scope.clone()),
            expires_at: fields.expires_at.or(session.expires_at),
            provider: session.provider.clone(),
        })
    }

    async fn logout_impl(
        &self,
        provider: &dyn ProviderAdapter,
        session: &AuthSession,
    ) -> AppResult<()> {
        let descriptor = provider.logout_request(Some(session))?;
        let response = self
            .client()?
            .get(descriptor.url.trim())
            .query(&descriptor.params)
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: end-session request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!(
                "SYSTEM_ERROR: end-session request failed with status {}",
                response.status()
            )
            .into());
        }
        Ok(())
    }

    async fn post_token_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> AppResult<TokenFields> {
        let response = self
            .client()?
            .post(url.trim())
            .form(form)
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: token request failed: {e}"))?;
        parse_token_response(response).await
    }
}

impl Default for AuthEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthFlow for AuthEngine {
    fn setup(&self, config: &SetupConfig) -> AppResult<()> {
        self.setup_engine(config)
    }

    fn authorize_url<'a>(
        &'a self,
        provider: &'a dyn ProviderAdapter,
        options: &'a ProviderOptions,
    ) -> BoxFuture<'a, AppResult<String>> {
        Box::pin(self.authorize_url_impl(provider, options))
    }

    fn login<'a>(
        &'a self,
        provider: &'a dyn ProviderAdapter,
        options: &'a ProviderOptions,
    ) -> BoxFuture<'a, AppResult<AuthSession>> {
        Box::pin(self.login_impl(provider, options))
    }

    fn handle_login_callback<'a>(
        &'a self,
        provider: &'a dyn ProviderAdapter,
        params: HashMap<String, String>,
        options: &'a ProviderOptions,
    ) -> BoxFuture<'a, AppResult<AuthSession>> {
        Box::pin(self.handle_callback_impl(provider, params, options))
    }

    fn logout<'a>(
        &'a self,
        provider: &'a dyn ProviderAdapter,
        session: &'a AuthSession,
    ) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(self.logout_impl(provider, session))
    }

    fn refresh_session<'a>(
        &'a self,
        provider: &'a dyn ProviderAdapter,
        session: &'a AuthSession,
    ) -> BoxFuture<'a, AppResult<AuthSession>> {
        Box::pin(self.refresh_impl(provider, session))
    }

    fn is_access_token_expired(&self, session: &AuthSession) -> bool {
        token_expired(session.expires_at, now_unix_seconds())
    }

    fn get_token(&self, kind: TokenKind, session: &AuthSession) -> Option<String> {
        session.token(kind).map(str::to_string)
    }

    fn decode_token(&self, kind: TokenKind, session: &AuthSession) -> AppResult<Value> {
        let token = session.token(kind).ok_or_else(|| {
            AppError::from("AUTH_MISSING_TOKEN: requested token is absent from the session")
        })?;
        decode_jwt_claims(token)
    }
}

pub(crate) fn token_expired(expires_at: Option<i64>, now_unix: i64) -> bool {
    // Unknown expiry counts as not expired; a bad guess here forces an
    // unnecessary interactive login.
    let Some(expiry) = expires_at else {
        return false;
    };
    expiry <= now_unix
}

fn build_authorize_url(descriptor: &RequestDescriptor) -> AppResult<String> {
    let mut url = reqwest::Url::parse(descriptor.url.trim())
        .map_err(|e| format!("SYSTEM_ERROR: invalid authorization endpoint: {e}"))?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in &descriptor.params {
            query.append_pair(key, value);
        }
    }
    Ok(url.to_string())
}

fn parse_redirect_target(redirect_uri: &str) -> AppResult<(u16, String)> {
    let url = reqwest::Url::parse(redirect_uri.trim())
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid redirect_uri: {e}"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| AppError::from("SEC_INVALID_INPUT: redirect_uri must carry a port"))?;
    Ok((port, url.path().to_string()))
}

fn session_from_fields(fields: TokenFields, provider: SessionProvenance) -> AuthSession {
    AuthSession {
        id_token: fields.id_token,
        access_token: fields.access_token,
        refresh_token: fields.refresh_token,
        token_type: fields.token_type,
        scope: fields.scope,
        expires_at: fields.expires_at,
        provider,
    }
}

/// Implicit flow: the redirect fragment already carries the tokens, so the
/// session is assembled locally without a token-endpoint round trip.
fn session_from_redirect_params(
    params: &HashMap<String, String>,
    provider: SessionProvenance,
) -> AppResult<AuthSession> {
    let access_token = params
        .get("access_token")
        .map(|s| s.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::from("AUTH_MISSING_TOKEN: redirect is missing access_token"))?
        .to_string();

    let expires_at = params
        .get("expires_in")
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .map(|v| now_unix_seconds().saturating_add(v));

    Ok(AuthSession {
        id_token: non_empty(params.get("id_token")),
        access_token,
        refresh_token: non_empty(params.get("refresh_token")),
        token_type: non_empty(params.get("token_type")),
        scope: non_empty(params.get("scope")),
        expires_at,
        provider,
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn parse_token_response(response: reqwest::Response) -> AppResult<TokenFields> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("SYSTEM_ERROR: token response read failed: {e}"))?;

    if !status.is_success() {
        let (error_code, error_message) = parse_error_details(&body);
        if error_code.as_deref() == Some("invalid_grant") {
            return Err(
                "AUTH_RELOGIN_REQUIRED: the provider rejected the grant; an interactive login is required"
                    .into(),
            );
        }

        let mut msg = format!(
            "SYSTEM_ERROR: token endpoint returned status={}",
            status.as_u16()
        );
        if let Some(code) = error_code {
            msg.push_str(" code=");
            msg.push_str(code.as_str());
        }
        if let Some(detail) = error_message {
            msg.push_str(" message=");
            msg.push_str(detail.chars().take(240).collect::<String>().as_str());
        }
        msg.push_str(" body=");
        msg.push_str(sanitize_error_body(&body).as_str());
        return Err(msg.into());
    }

    let value: Value = serde_json::from_str(&body)
        .map_err(|e| format!("SYSTEM_ERROR: token response json invalid: {e}"))?;

    let access_token = json_str(&value, "access_token")
        .ok_or_else(|| AppError::from("SYSTEM_ERROR: token response is missing access_token"))?;

    let expires_in = value.get("expires_in").and_then(parse_i64_lossy);
    let now = now_unix_seconds();
    let expires_at = expires_in.and_then(|v| {
        if v <= 0 {
            None
        } else {
            Some(now.saturating_add(v))
        }
    });

    Ok(TokenFields {
        access_token,
        refresh_token: json_str(&value, "refresh_token"),
        id_token: json_str(&value, "id_token"),
        token_type: json_str(&value, "token_type"),
        scope: json_str(&value, "scope"),
        expires_at,
    })
}

fn json_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// OAuth error bodies come either as flat `error`/`error_description` strings
/// or as a nested error object with `code`/`type`/`message`.
fn parse_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let code = match value.get("error") {
        Some(Value::String(raw)) => {
            let raw = raw.trim();
            (!raw.is_empty()).then(|| raw.to_string())
        }
        Some(Value::Object(obj)) => obj
            .get("code")
            .or_else(|| obj.get("type"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        _ => None,
    };

    let message = json_str(&value, "error_description").or_else(|| {
        value
            .get("error")
            .and_then(Value::as_object)
            .and_then(|obj| obj.get("message"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    });

    (code, message)
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc.contains("token") || key_lc.contains("secret") || key_lc == "authorization"
}

fn redact_sensitive_json_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_token(raw));
                        continue;
                    }
                }
                redact_sensitive_json_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_json_fields(nested);
            }
        }
        _ => {}
    }
}

fn sanitize_error_body(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(500).collect();
        }
    }
    body.chars().take(500).collect()
}

fn open_browser(url: &str) -> AppResult<()> {
    #[cfg(target_os = "windows")]
    {
        // The URL protocol handler forces the default browser; `explorer <url>`
        // may open File Explorer for some URL shapes.
        Command::new("rundll32.exe")
            .arg("url.dll,FileProtocolHandler")
            .arg(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[cfg(target_os = "macos")]
    {
        Command::new("open")
            .arg(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Command::new("xdg-open")
            .arg(url)
            .spawn()
            .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
        return Ok(());
    }

    #[allow(unreachable_code)]
    Err("SYSTEM_ERROR: browser open is unsupported on this platform"
        .to_string()
        .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ping::PingAdapter;
    use crate::test_support::{implicit_setup, pkce_setup, sample_manifest, sample_options, sample_session};

    #[test]
    fn token_expired_handles_unknown_expiry() {
        assert!(!token_expired(None, 1000));
    }

    #[test]
    fn token_expired_compares_against_now() {
        assert!(!token_expired(Some(2000), 1999));
        assert!(token_expired(Some(2000), 2000));
        assert!(token_expired(Some(2000), 2200));
    }

    #[test]
    fn parse_i64_lossy_supports_number_and_string() {
        assert_eq!(parse_i64_lossy(&Value::from(1200)), Some(1200));
        assert_eq!(parse_i64_lossy(&Value::from("3600")), Some(3600));
        assert_eq!(parse_i64_lossy(&Value::from("x")), None);
    }

    #[test]
    fn parse_error_details_supports_oauth_standard_fields() {
        let payload = r#"{ "error": "invalid_request", "error_description": "bad scope" }"#;
        let (code, message) = parse_error_details(payload);
        assert_eq!(code.as_deref(), Some("invalid_request"));
        assert_eq!(message.as_deref(), Some("bad scope"));
    }

    #[test]
    fn parse_error_details_supports_nested_error_payload() {
        let payload = r#"{
          "error": {
            "message": "The refresh token is no longer valid.",
            "type": "invalid_request_error",
            "code": "invalid_grant"
          }
        }"#;
        let (code, message) = parse_error_details(payload);
        assert_eq!(code.as_deref(), Some("invalid_grant"));
        assert_eq!(message.as_deref(), Some("The refresh token is no longer valid."));
    }

    #[test]
    fn sanitize_error_body_masks_token_fields() {
        let raw = r#"{
          "error": "server_error",
          "refresh_token": "abcd1234xyz9876",
          "nested": {"id_token": "idtokenvalue123456"}
        }"#;
        let snippet = sanitize_error_body(raw);
        assert!(!snippet.contains("abcd1234xyz9876"));
        assert!(!snippet.contains("idtokenvalue123456"));
        assert!(snippet.contains("server_error"));
    }

    #[test]
    fn build_authorize_url_appends_descriptor_params() {
        let adapter = PingAdapter::new();
        let descriptor = adapter
            .authorize_request(&sample_manifest(), &sample_options(), &pkce_setup())
            .expect("descriptor");
        let url = build_authorize_url(&descriptor).expect("url");
        assert!(url.starts_with("https://auth.example.com/as/authorization.oauth2?"));
        assert!(url.contains("client_id=conference-app"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn parse_redirect_target_extracts_port_and_path() {
        let (port, path) = parse_redirect_target("http://localhost:8100/auth/callback").expect("target");
        assert_eq!(port, 8100);
        assert_eq!(path, "/auth/callback");
    }

    #[test]
    fn session_from_redirect_params_builds_implicit_session() {
        let mut params = HashMap::new();
        params.insert("access_token".to_string(), "fragment-access".to_string());
        params.insert("id_token".to_string(), "fragment-id".to_string());
        params.insert("expires_in".to_string(), "3600".to_string());

        let provenance = SessionProvenance {
            manifest: sample_manifest(),
            options: sample_options(),
            config: implicit_setup(),
        };
        let session = session_from_redirect_params(&params, provenance).expect("session");
        assert_eq!(session.access_token, "fragment-access");
        assert_eq!(session.id_token.as_deref(), Some("fragment-id"));
        assert!(session.expires_at.is_some());
    }

    #[test]
    fn session_from_redirect_params_requires_access_token() {
        let params = HashMap::new();
        let provenance = SessionProvenance {
            manifest: sample_manifest(),
            options: sample_options(),
            config: implicit_setup(),
        };
        let err = session_from_redirect_params(&params, provenance).expect_err("missing token");
        assert_eq!(err.code(), "AUTH_MISSING_TOKEN");
    }

    #[test]
    fn pending_state_is_consumed_on_take() {
        let engine = AuthEngine::new();
        let adapter = PingAdapter::new();
        let descriptor = adapter
            .authorize_request(&sample_manifest(), &sample_options(), &pkce_setup())
            .expect("descriptor");

        engine.record_pending_state(&descriptor);
        let first = engine.take_pending_state();
        assert_eq!(first.as_deref(), descriptor.param("state"));
        assert!(engine.take_pending_state().is_none());
    }

    #[test]
    fn setup_is_idempotent() {
        let engine = AuthEngine::new();
        engine.setup(&pkce_setup()).expect("first setup");
        engine.setup(&implicit_setup()).expect("second setup tolerated");
        assert!(engine.setup_config().expect("config").use_pkce());
    }

    #[test]
    fn operations_before_setup_are_rejected() {
        let engine = AuthEngine::new();
        let err = engine.client().expect_err("not initialized");
        assert_eq!(err.code(), "SYSTEM_ERROR");
    }

    #[test]
    fn decode_token_reads_id_claims() {
        let engine = AuthEngine::new();
        let session = sample_session();
        let claims = engine.decode_token(TokenKind::Id, &session).expect("claims");
        assert_eq!(claims["sub"], "user-1");
    }

    #[test]
    fn decode_token_missing_kind_is_missing_claim() {
        let engine = AuthEngine::new();
        let mut session = sample_session();
        session.id_token = None;
        let err = engine
            .decode_token(TokenKind::Id, &session)
            .expect_err("no id token");
        assert_eq!(err.code(), "AUTH_MISSING_TOKEN");
    }
}
