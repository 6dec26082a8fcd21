use tokio_util::sync::CancellationToken;

/// Thin wrapper around a cancellation token, handed down from
/// `orch-agent::main` to every daemon (context eviction, session expiry,
/// queue consumers, adapter health monitors) so each can observe shutdown
/// and exit within one poll tick.
///
/// Kept as a dedicated type rather than threading `tokio_util::sync::
/// CancellationToken` through every leaf crate's public API directly, so no
/// runtime-specific cancellation type leaks past this one file.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(CancellationToken);

impl Shutdown {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }
}
