use crate::err::TenancyErr;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline of one boundary request.
///
/// [`RequestCtx::run`] drops the operation's future as soon as the token is
/// cancelled or the deadline passes.  Any registry transaction held by that
/// future is dropped with it and rolled back.
#[derive(Debug, Clone)]
pub struct RequestCtx {
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl Default for RequestCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCtx {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub async fn run<F, T>(&self, fut: F) -> Result<T, TenancyErr>
    where
        F: Future<Output = Result<T, TenancyErr>>,
    {
        if self.cancel.is_cancelled() {
            return Err(TenancyErr::Cancelled);
        }
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TenancyErr::Cancelled),
            _ = deadline => Err(TenancyErr::DeadlineExceeded),
            result = fut => result,
        }
    }
}
