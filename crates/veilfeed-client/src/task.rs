//! Handles for background tasks.

use tokio::{sync::oneshot, task::JoinHandle};

/// Handle to a spawned inbox or feed task.
///
/// `close()` asks the task to stop after the event it is processing. It is
/// idempotent, and dropping the handle has the same effect.
#[derive(Debug)]
pub struct TaskHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `run` with a shutdown receiver that resolves when the handle is
    /// closed or dropped.
    pub(crate) fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown, receiver) = oneshot::channel();
        let task = tokio::spawn(run(receiver));
        Self { shutdown: Some(shutdown), task }
    }

    /// Ask the task to stop. Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The task may already have exited on its own
            let _ = shutdown.send(());
        }
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_none()
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close and wait for the task to exit.
    pub async fn join(mut self) {
        self.close();
        if let Err(err) = (&mut self.task).await {
            tracing::error!(error = %err, "background task failed");
        }
    }
}
