//! Usage: UI-facing auth events (navigation signals + non-fatal diagnostics).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A session was established; the host should show the application root.
    NavigateRoot,
    /// The session ended; the host should show the login screen.
    NavigateLogin,
    /// Web flow only: the host must redirect the page to the provider.
    RedirectToProvider(String),
    /// The provider-side logout failed but local teardown continued. Emitted
    /// so operators can detect silent remote-logout failures.
    RemoteLogoutFailed { error: String },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: AuthEvent);
}

/// Discards every event; for hosts that poll state instead.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AuthEvent) {}
}
