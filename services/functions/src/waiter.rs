use async_trait::async_trait;
use std::time::Duration;

/// Suspends the current task between paced operations
#[async_trait]
pub trait Waiter: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Wall-clock waiter backed by `tokio::time::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioWaiter;

#[async_trait]
impl Waiter for TokioWaiter {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_waiter_advances_clock() {
        let start = tokio::time::Instant::now();
        TokioWaiter.wait(Duration::from_millis(3000)).await;
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }
}
