use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;

static SHUTDOWN: Lazy<CancellationToken> = Lazy::new(CancellationToken::new);

/// a token cancelled when the process begins shutting down.  In-flight
/// requests built on it are abandoned and their transactions rolled back.
pub fn shutdown_token() -> CancellationToken {
    SHUTDOWN.child_token()
}

pub fn shutdown() {
    SHUTDOWN.cancel();
}

pub fn is_shutting_down() -> bool {
    SHUTDOWN.is_cancelled()
}
