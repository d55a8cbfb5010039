//! Cooperative stop signal shared by one job's tasks.

use std::future::Future;
use tokio::sync::watch;

use crate::error::{PipelineError, PipelineResult};

/// Requested run state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Run,
    /// Stop and record the job as cancelled
    Cancel,
    /// Stop without a terminal transition so the job can be resumed
    Interrupt,
}

/// Read side of a job's control channel.
#[derive(Debug, Clone)]
pub struct CancelFlag {
    rx: watch::Receiver<Control>,
}

impl CancelFlag {
    /// New control channel, initially [`Control::Run`].
    pub fn channel() -> (watch::Sender<Control>, Self) {
        let (tx, rx) = watch::channel(Control::Run);
        (tx, Self { rx })
    }

    /// A flag that is never raised.
    pub fn never() -> Self {
        let (_tx, flag) = Self::channel();
        flag
    }

    pub fn state(&self) -> Control {
        *self.rx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() != Control::Run
    }

    /// `Err(Cancelled)` once a stop was requested.
    pub fn check(&self) -> PipelineResult<()> {
        if self.is_stopped() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when a stop is requested. Pends forever if the sender is gone.
    ///
    /// The returned future owns its receiver, so it does not borrow `self`.
    pub fn stopped(&self) -> impl Future<Output = Control> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            let result = rx.wait_for(|control| *control != Control::Run).await.map(|c| *c);
            match result {
                Ok(control) => control,
                Err(_) => std::future::pending().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready_eq};

    #[tokio::test]
    async fn test_stop_is_observed() {
        let (tx, flag) = CancelFlag::channel();
        assert!(flag.check().is_ok());

        tx.send_replace(Control::Cancel);
        assert!(matches!(flag.check(), Err(PipelineError::Cancelled)));
        assert_eq!(flag.stopped().await, Control::Cancel);
    }

    #[tokio::test]
    async fn test_never_pends() {
        let flag = CancelFlag::never();
        let waited = tokio::time::timeout(Duration::from_millis(20), flag.stopped()).await;
        assert!(waited.is_err());
        assert!(!flag.is_stopped());
    }

    #[test]
    fn test_stopped_wakes_on_interrupt() {
        let (tx, flag) = CancelFlag::channel();
        let mut stopped = tokio_test::task::spawn(flag.stopped());
        assert_pending!(stopped.poll());

        tx.send_replace(Control::Interrupt);
        assert!(stopped.is_woken());
        assert_ready_eq!(stopped.poll(), Control::Interrupt);
    }

    #[tokio::test]
    async fn test_stopped_outlives_the_flag() {
        let (tx, flag) = CancelFlag::channel();
        let stopped = flag.stopped();
        drop(flag);

        let waiter = tokio::spawn(stopped);
        tx.send_replace(Control::Cancel);
        assert_eq!(waiter.await.unwrap(), Control::Cancel);
    }
}
