//! Bounded concurrent dispatch.
//!
//! Admission control for send tasks: at most `buffer_size` tasks pending or
//! in flight, at most `concurrency` running at once. Admission is FIFO (the
//! semaphore is fair); completion order is unspecified. Once admitted a task
//! always runs to settlement - there is no cancellation path.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use telewire_config::DispatchConfig;

use crate::error::DeliveryError;

pub struct DispatchBuffer {
    semaphore: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    buffer_size: usize,
}

impl DispatchBuffer {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            pending: Arc::new(AtomicUsize::new(0)),
            buffer_size: config.buffer_size,
        }
    }

    /// Admit a task, or reject it synchronously when the buffer is full.
    ///
    /// Rejection is the only possible failure and happens before the task is
    /// spawned; an admitted task settles on its own and frees its slot.
    pub fn try_dispatch<F>(&self, task: F) -> Result<(), DeliveryError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let admitted = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                (pending < self.buffer_size).then_some(pending + 1)
            });

        if admitted.is_err() {
            return Err(DeliveryError::AdmissionRejected);
        }

        let semaphore = Arc::clone(&self.semaphore);
        let pending = Arc::clone(&self.pending);

        tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only fails if the
            // runtime is tearing down; the slot is released either way.
            if let Ok(_permit) = semaphore.acquire_owned().await {
                task.await;
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(())
    }

    /// Tasks currently pending or in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn buffer(buffer_size: usize, concurrency: usize) -> DispatchBuffer {
        DispatchBuffer::new(DispatchConfig {
            buffer_size,
            concurrency,
        })
    }

    async fn settled(buffer: &DispatchBuffer) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while buffer.pending() > 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "tasks did not settle in time"
            );
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_all_admitted_tasks_execute_exactly_once() {
        let buffer = buffer(30, 5);
        let executed = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let executed = Arc::clone(&executed);
            buffer
                .try_dispatch(async move {
                    executed.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        settled(&buffer).await;
        assert_eq!(executed.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrency_limit_holds() {
        let buffer = buffer(30, 2);
        let release = Arc::new(Notify::new());
        let started = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let release = Arc::clone(&release);
            let started = Arc::clone(&started);
            buffer
                .try_dispatch(async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    release.notified().await;
                })
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);

        // Freeing one slot admits exactly the next queued task.
        release.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(started.load(Ordering::SeqCst), 3);

        release.notify_waiters();
        // Stragglers that subscribed after notify_waiters still need a nudge.
        while buffer.pending() > 0 {
            release.notify_waiters();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(started.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_excess_tasks_are_rejected_without_executing() {
        let buffer = buffer(3, 1);
        let release = Arc::new(Notify::new());
        let executed = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let release = Arc::clone(&release);
            let executed = Arc::clone(&executed);
            buffer
                .try_dispatch(async move {
                    executed.fetch_add(1, Ordering::SeqCst);
                    release.notified().await;
                })
                .unwrap();
        }

        let executed_rejected = Arc::clone(&executed);
        let rejected = buffer.try_dispatch(async move {
            executed_rejected.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(rejected, Err(DeliveryError::AdmissionRejected));

        while buffer.pending() > 0 {
            release.notify_waiters();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(executed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_settlement_frees_the_slot_for_new_admissions() {
        let buffer = buffer(1, 1);
        let executed = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let executed = Arc::clone(&executed);
            buffer
                .try_dispatch(async move {
                    executed.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            settled(&buffer).await;
        }

        assert_eq!(executed.load(Ordering::SeqCst), 4);
    }
}
