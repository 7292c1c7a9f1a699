//! Usage: Host-supplied configuration (platform presentation options + provider options).

use crate::shared::error::AppResult;
use serde::{Deserialize, Serialize};

const DEFAULT_IOS_WEB_VIEW: &str = "private";
const DEFAULT_IOS_DISMISS_BUTTON_STYLE: &str = "close";
const DEFAULT_IOS_BAR_TINT_COLOR: &str = "#FFFFFF";
const DEFAULT_IOS_CONTROL_TINT_COLOR: &str = "#333333";
const DEFAULT_WEB_UI_MODE: &str = "current";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Native,
    Web,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Pkce,
    Implicit,
}

/// In-app browser styling applied when the native flow presents the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IosBrowserOptions {
    pub web_view: String,
    pub dismiss_button_style: String,
    pub preferred_bar_tint_color: String,
    pub preferred_control_tint_color: String,
}

impl Default for IosBrowserOptions {
    fn default() -> Self {
        Self {
            web_view: DEFAULT_IOS_WEB_VIEW.to_string(),
            dismiss_button_style: DEFAULT_IOS_DISMISS_BUTTON_STYLE.to_string(),
            preferred_bar_tint_color: DEFAULT_IOS_BAR_TINT_COLOR.to_string(),
            preferred_control_tint_color: DEFAULT_IOS_CONTROL_TINT_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidBrowserOptions {
    pub is_animated: bool,
    pub show_default_share_menu_item: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebFlowOptions {
    pub ui_mode: String,
    pub auth_flow: FlowKind,
}

impl Default for WebFlowOptions {
    fn default() -> Self {
        Self {
            ui_mode: DEFAULT_WEB_UI_MODE.to_string(),
            auth_flow: FlowKind::Pkce,
        }
    }
}

/// One-time engine setup: which platform drives the flow and how the
/// provider UI is presented there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupConfig {
    pub platform: Platform,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub ios: IosBrowserOptions,
    #[serde(default)]
    pub android: AndroidBrowserOptions,
    #[serde(default)]
    pub web: WebFlowOptions,
}

impl SetupConfig {
    /// The native flow always proves possession via PKCE; the web flow only
    /// when configured for it (otherwise it falls back to implicit).
    pub fn use_pkce(&self) -> bool {
        match self.platform {
            Platform::Native => true,
            Platform::Web => self.web.auth_flow == FlowKind::Pkce,
        }
    }
}

/// Static per-provider registration data. Read-only input to every adapter
/// operation; the redirect URI differs between the native and web targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOptions {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub logout_url: String,
    pub discovery_url: String,
    #[serde(default)]
    pub audience: Option<String>,
}

impl ProviderOptions {
    pub(crate) fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("discovery_url", &self.discovery_url),
        ] {
            if value.trim().is_empty() {
                return Err(format!("SEC_INVALID_INPUT: {name} is required").into());
            }
        }
        Ok(())
    }
}

/// Full host configuration: setup plus the per-platform provider options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub setup: SetupConfig,
    pub native: ProviderOptions,
    pub web: ProviderOptions,
}

impl AuthConfig {
    pub fn from_toml_str(raw: &str) -> AppResult<Self> {
        let config: AuthConfig = toml::from_str(raw)
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid auth config: {e}"))?;
        config.native.validate()?;
        config.web.validate()?;
        Ok(config)
    }

    /// The provider options matching the configured platform.
    pub fn provider_options(&self) -> &ProviderOptions {
        match self.setup.platform {
            Platform::Native => &self.native,
            Platform::Web => &self.web,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[setup]
platform = "web"

[setup.web]
ui_mode = "current"
auth_flow = "pkce"

[native]
client_id = "conference-app"
redirect_uri = "http://localhost:8100/callback"
scope = "openid profile email"
logout_url = "https://app.example.com/login"
discovery_url = "https://auth.example.com/.well-known/openid-configuration"

[web]
client_id = "conference-app"
redirect_uri = "https://app.example.com/auth/callback"
scope = "openid profile email"
logout_url = "https://app.example.com/login"
discovery_url = "https://auth.example.com/.well-known/openid-configuration"
"#;

    #[test]
    fn from_toml_parses_platform_and_options() {
        let config = AuthConfig::from_toml_str(SAMPLE).expect("config");
        assert_eq!(config.setup.platform, Platform::Web);
        assert_eq!(
            config.provider_options().redirect_uri,
            "https://app.example.com/auth/callback"
        );
        assert!(config.setup.use_pkce());
    }

    #[test]
    fn from_toml_rejects_blank_client_id() {
        let raw = SAMPLE.replace("client_id = \"conference-app\"", "client_id = \" \"");
        let err = AuthConfig::from_toml_str(&raw).expect_err("blank client_id");
        assert_eq!(err.code(), "SEC_INVALID_INPUT");
    }

    #[test]
    fn native_platform_always_uses_pkce() {
        let config = SetupConfig {
            platform: Platform::Native,
            log_level: None,
            ios: IosBrowserOptions::default(),
            android: AndroidBrowserOptions::default(),
            web: WebFlowOptions {
                ui_mode: "current".to_string(),
                auth_flow: FlowKind::Implicit,
            },
        };
        assert!(config.use_pkce());
    }

    #[test]
    fn web_platform_honors_implicit_selection() {
        let config = SetupConfig {
            platform: Platform::Web,
            log_level: None,
            ios: IosBrowserOptions::default(),
            android: AndroidBrowserOptions::default(),
            web: WebFlowOptions {
                ui_mode: "current".to_string(),
                auth_flow: FlowKind::Implicit,
            },
        };
        assert!(!config.use_pkce());
    }

    #[test]
    fn ios_defaults_match_presentation_contract() {
        let ios = IosBrowserOptions::default();
        assert_eq!(ios.web_view, "private");
        assert_eq!(ios.dismiss_button_style, "close");
    }
}
