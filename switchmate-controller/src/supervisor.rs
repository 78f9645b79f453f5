//! Timeout supervisor
//!
//! One deadline per invocation, armed when the workflow starts and raced
//! against every adapter operation by the runner.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct Supervisor {
    deadline: Option<Instant>,
}

impl Supervisor {
    /// Arm a deadline `after` from now; `None` never fires
    pub fn arm(after: Option<Duration>) -> Self {
        Self {
            deadline: after.map(|after| Instant::now() + after),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the deadline passes, exactly once. Cancel safe: dropping
    /// the future before it resolves leaves the deadline armed.
    pub async fn expired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => futures::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_once() {
        let start = Instant::now();
        let mut supervisor = Supervisor::arm(Some(Duration::from_secs(30)));
        assert!(supervisor.is_armed());

        supervisor.expired().await;
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(!supervisor.is_armed());

        let again = tokio::time::timeout(Duration::from_secs(3600), supervisor.expired()).await;
        assert!(again.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_never_fires() {
        let mut supervisor = Supervisor::arm(None);
        let fired = tokio::time::timeout(Duration::from_secs(3600), supervisor.expired()).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn survives_cancellation() {
        let mut supervisor = Supervisor::arm(Some(Duration::from_secs(10)));

        let early = tokio::time::timeout(Duration::from_secs(4), supervisor.expired()).await;
        assert!(early.is_err());
        assert!(supervisor.is_armed());

        let start = Instant::now();
        supervisor.expired().await;
        assert!(start.elapsed() <= Duration::from_secs(6));
    }
}
