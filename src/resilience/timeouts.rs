//! Timeout enforcement.
//!
//! Every backend call runs under a deadline; elapsing it drops (and so
//! cancels) the inner future.

use std::future::Future;
use std::time::Duration;
use tokio::time;

/// Marker error for an elapsed deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded(pub Duration);

impl std::fmt::Display for DeadlineExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deadline of {} ms exceeded", self.0.as_millis())
    }
}

impl std::error::Error for DeadlineExceeded {}

/// Run `fut` under `deadline`.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    time::timeout(deadline, fut).await.map_err(|_| DeadlineExceeded(deadline))
}
