use std::{future::Future, sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle};

#[derive(Clone, Default)]
pub struct Deferred {
    slot: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    // Only the delay is cancellable. Once it elapses the task leaves the slot
    // and runs to completion.
    pub async fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let owner = self.slot.clone();
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = owner.lock().await;
                if slot.as_ref().is_some_and(|handle| handle.id() == tokio::task::id()) {
                    slot.take();
                }
            }
            task.await;
        }));
    }

    pub async fn cancel(&self) {
        if let Some(previous) = self.slot.lock().await.take() {
            previous.abort();
        }
    }

    #[cfg(test)]
    pub async fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
