//! Usage: Session orchestration — owns the current session and coordinates the
//! flow engine, provider adapter, vault, and UI events.

use crate::config::{AuthConfig, Platform, ProviderOptions};
use crate::engine::AuthFlow;
use crate::events::{AuthEvent, EventSink};
use crate::provider::ProviderAdapter;
use crate::session::{AuthSession, TokenKind};
use crate::shared::blocking;
use crate::shared::error::{AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::vault::SessionVault;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};


/// Owns the single current-session reference. Operations are not designed to
/// run concurrently with themselves; callers serialize session-mutating calls
/// (e.g. by disabling the login control while a login is in flight).
pub struct SessionManager<F: AuthFlow> {
    flow: F,
    provider: Arc<dyn ProviderAdapter>,
    vault: Arc<dyn SessionVault>,
    events: Arc<dyn EventSink>,
    config: AuthConfig,
    current: Mutex<Option<AuthSession>>,
}

impl<F: AuthFlow> SessionManager<F> {
    pub fn new(
        flow: F,
        provider: Arc<dyn ProviderAdapter>,
        vault: Arc<dyn SessionVault>,
        events: Arc<dyn EventSink>,
        config: AuthConfig,
    ) -> Self {
        Self {
            flow,
            provider,
            vault,
            events,
            config,
            current: Mutex::new(None),
        }
    }

    /// Configure the flow engine. Must run before any other operation;
    /// re-invocation is tolerated.
    pub fn initialize(&self) -> AppResult<()> {
        self.flow.setup(&self.config.setup)
    }

    fn auth_options(&self) -> &ProviderOptions {
        self.config.provider_options()
    }

    /// Start an authorization attempt. Native platforms run the whole flow
    /// here; the web platform gets a provider redirect and finishes in
    /// [`Self::handle_login_callback`]. A failed login commits nothing.
    pub async fn login(&self) -> AppResult<()> {
        self.provider.reset_attempt();
        let options = self.auth_options();

        match self.config.setup.platform {
            Platform::Native => {
                let session = self.flow.login(self.provider.as_ref(), options).await?;
                self.adopt_session(session).await?;
                self.events.emit(AuthEvent::NavigateRoot);
            }
            Platform::Web => {
                let url = self
                    .flow
                    .authorize_url(self.provider.as_ref(), options)
                    .await?;
                self.events.emit(AuthEvent::RedirectToProvider(url));
            }
        }
        Ok(())
    }

    /// Complete a web-platform attempt from the redirect's query parameters.
    /// Valid once per redirect; a consumed authorization code fails at the
    /// provider and that failure surfaces here.
    pub async fn handle_login_callback(
        &self,
        params: HashMap<String, String>,
    ) -> AppResult<()> {
        let options = self.auth_options();
        let session = self
            .flow
            .handle_login_callback(self.provider.as_ref(), params, options)
            .await?;
        self.adopt_session(session).await?;
        self.events.emit(AuthEvent::NavigateRoot);
        Ok(())
    }

    /// End the session. Remote teardown failures are reported through the
    /// event sink and otherwise suppressed: returning the user to the login
    /// screen must not be blocked by a provider-side failure. Local state and
    /// the vault are always cleared.
    pub async fn logout(&self) {
        let session = self.current.lock_or_recover().clone();
        let remote = match session.as_ref() {
            Some(session) => self.flow.logout(self.provider.as_ref(), session).await,
            None => Err(AppError::from(
                "SEC_INVALID_INPUT: no current session to log out",
            )),
        };
        if let Err(err) = remote {
            tracing::warn!("remote logout failed: {err}");
            self.events.emit(AuthEvent::RemoteLogoutFailed {
                error: err.to_string(),
            });
        }

        let vault = Arc::clone(&self.vault);
        if let Err(err) = blocking::run("vault_clear_logout", move || vault.clear()).await {
            tracing::warn!("failed to clear stored session during logout: {err}");
        }
        *self.current.lock_or_recover() = None;
        self.provider.reset_attempt();
        self.events.emit(AuthEvent::NavigateLogin);
    }

    /// The application's sole gate for showing authenticated content. Never
    /// fails: any error along the way clears the vault and reports `false`.
    pub async fn is_authenticated(&self) -> bool {
        match self.check_session().await {
            Ok(authenticated) => authenticated,
            Err(err) => {
                tracing::warn!("authentication check failed: {err}");
                let vault = Arc::clone(&self.vault);
                if let Err(clear_err) =
                    blocking::run("vault_clear_auth_check", move || vault.clear()).await
                {
                    tracing::warn!("failed to clear stored session: {clear_err}");
                }
                false
            }
        }
    }

    async fn check_session(&self) -> AppResult<bool> {
        let vault = Arc::clone(&self.vault);
        let stored = blocking::run("vault_get_auth_check", move || vault.get()).await?;

        let Some(stored) = stored else {
            // No durable copy; trust a live in-memory session.
            return Ok(self.current.lock_or_recover().is_some());
        };

        if stored.token(TokenKind::Id).is_none() {
            return Err("AUTH_MISSING_TOKEN: stored session has no id token".into());
        }

        if !self.flow.is_access_token_expired(&stored) {
            *self.current.lock_or_recover() = Some(stored);
            return Ok(true);
        }

        let refreshed = self
            .flow
            .refresh_session(self.provider.as_ref(), &stored)
            .await?;
        self.adopt_session(refreshed).await?;
        Ok(true)
    }

    pub fn get_access_token(&self) -> AppResult<Option<String>> {
        let current = self.current.lock_or_recover();
        let session = current
            .as_ref()
            .ok_or_else(|| AppError::from("SEC_INVALID_INPUT: no current session"))?;
        Ok(self.flow.get_token(TokenKind::Access, session))
    }

    /// Claims of the current session's id token; decoding only, no signature
    /// verification.
    pub fn decode_token(&self) -> AppResult<Value> {
        let current = self.current.lock_or_recover();
        let session = current
            .as_ref()
            .ok_or_else(|| AppError::from("SEC_INVALID_INPUT: no current session"))?;
        self.flow.decode_token(TokenKind::Id, session)
    }

    pub fn current_session(&self) -> Option<AuthSession> {
        self.current.lock_or_recover().clone()
    }

    async fn adopt_session(&self, session: AuthSession) -> AppResult<()> {
        let vault = Arc::clone(&self.vault);
        let copy = session.clone();
        blocking::run("vault_set_session", move || vault.set(&copy)).await?;
        *self.current.lock_or_recover() = Some(session);
        Ok(())
    }
}

/// Flatten a redirect URL's query into the parameter map
/// [`SessionManager::handle_login_callback`] expects.
pub fn query_params(url: &str) -> AppResult<HashMap<String, String>> {
    let url = reqwest::Url::parse(url.trim())
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid callback url: {e}"))?;
    Ok(url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect())
}
