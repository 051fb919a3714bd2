//! Executors that run response callbacks.

use std::fmt;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::warn;

/// A unit of callback work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs callback deliveries, typically on a thread the caller owns.
pub trait CallbackExecutor: Send + Sync + 'static {
    /// Run `task`.
    fn execute(&self, task: Task);
}

/// Runs tasks one at a time, in submission order, on a tokio runtime.
#[derive(Clone)]
pub struct TokioExecutor {
    sender: mpsc::UnboundedSender<Task>,
}

impl TokioExecutor {
    /// Spawn the worker on `handle`.
    #[must_use]
    pub fn new(handle: &Handle) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();

        handle.spawn(async move {
            while let Some(task) = receiver.recv().await {
                task();
            }
        });

        Self { sender }
    }

    /// Spawn the worker on the current runtime, if there is one.
    #[must_use]
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(|handle| Self::new(&handle))
    }
}

impl CallbackExecutor for TokioExecutor {
    fn execute(&self, task: Task) {
        if self.sender.send(task).is_err() {
            warn!("callback executor stopped; dropping delivery");
        }
    }
}

impl fmt::Debug for TokioExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioExecutor")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use tokio::sync::oneshot;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn test_tasks_run_in_submission_order() {
        let executor = TokioExecutor::current().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = oneshot::channel();

        for i in 0..5 {
            let seen = Arc::clone(&seen);
            executor.execute(Box::new(move || seen.lock().unwrap().push(i)));
        }
        executor.execute(Box::new(move || {
            let _ = done_tx.send(());
        }));

        timeout(Duration::from_secs(1), done_rx).await.unwrap().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
