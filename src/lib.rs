//! Client-side Ping OIDC integration: a session manager over a PKCE
//! authorization-code flow (with an implicit-flow fallback for the web
//! platform), backed by a pluggable provider adapter and session vault.

pub(crate) mod callback;
pub mod config;
pub mod engine;
pub mod events;
pub mod manager;
pub mod manifest;
pub mod pkce;
pub mod provider;
pub mod session;
pub mod shared;
pub mod test_support;
pub mod vault;

pub use config::{AuthConfig, FlowKind, Platform, ProviderOptions, SetupConfig};
pub use engine::{AuthEngine, AuthFlow};
pub use events::{AuthEvent, EventSink, NullSink};
pub use manager::{query_params, SessionManager};
pub use manifest::Manifest;
pub use provider::ping::PingAdapter;
pub use provider::{ProviderAdapter, RequestDescriptor};
pub use session::{decode_jwt_claims, AuthSession, SessionProvenance, TokenKind};
pub use shared::error::{AppError, AppResult};
pub use vault::{MemoryVault, SessionVault, SqliteVault};
