//! Bounded, key-partitioned worker pool
//!
//! ## Overview
//!
//! The transport's delivery task must return quickly (protocol keep-alive
//! depends on it), so handler bodies only decode and enqueue. All
//! potentially-slow work (storage, downstream notifications) runs on this
//! pool.
//!
//! ## Ordering
//!
//! The transport gives no ordering guarantee across workers, but the
//! cache read-modify-write for one device must be serialized. Each worker
//! owns its own bounded FIFO queue, and [`WorkerPool::submit`] hashes the
//! ordering key (the device id) onto one queue, so all messages for one
//! device execute in arrival order on one worker.
//!
//! ## Backpressure and shutdown
//!
//! `submit` awaits queue capacity (bounded blocking put). `shutdown`
//! closes intake, lets every worker drain its queue, and joins the worker
//! tasks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{ConnectorError, ConnectorResult};

/// Default number of worker tasks.
pub const DEFAULT_WORKERS: usize = 64;

/// Default per-worker queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// A unit of deferred work.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Fixed-size pool of worker tasks, each draining its own bounded queue.
pub struct WorkerPool {
    senders: Mutex<Option<Vec<mpsc::Sender<Task>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    workers: usize,
}

impl WorkerPool {
    /// Spawn a pool with `workers` tasks and `queue_depth` slots each.
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let (tx, mut rx) = mpsc::channel::<Task>(queue_depth.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(async move {
                while let Some(task) = rx.recv().await {
                    task.await;
                }
                log::debug!("worker {index} drained");
            }));
        }

        Self {
            senders: Mutex::new(Some(senders)),
            handles: Mutex::new(handles),
            workers,
        }
    }

    /// Spawn a pool with the default sizing.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_QUEUE_DEPTH)
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    // FNV-1a; the same key always lands on the same worker.
    fn index_for(&self, key: &str) -> usize {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = FNV_OFFSET;
        for byte in key.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        (hash % self.workers as u64) as usize
    }

    /// Enqueue a future on the worker owning `key`.
    ///
    /// Awaits channel capacity when the worker's queue is full; fails only
    /// when the pool is shutting down.
    pub async fn submit<F>(&self, key: &str, future: F) -> ConnectorResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = {
            let senders = self.senders.lock().expect("pool sender lock");
            match senders.as_ref() {
                Some(senders) => senders[self.index_for(key)].clone(),
                None => return Err(ConnectorError::ShuttingDown),
            }
        };

        sender
            .send(Box::pin(future))
            .await
            .map_err(|_| ConnectorError::ShuttingDown)
    }

    /// Stop accepting work, drain in-flight tasks and join the workers.
    pub async fn shutdown(&self) {
        // Dropping the senders ends each worker's recv loop after its
        // queue drains.
        self.senders.lock().expect("pool sender lock").take();

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.handles.lock().expect("pool handle lock"));
        for handle in handles {
            if let Err(err) = handle.await {
                log::warn!("worker join failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn tasks_for_one_key_run_in_order() {
        let pool = WorkerPool::new(4, 16);
        let seen = Arc::new(AsyncMutex::new(Vec::new()));

        for i in 0..32u32 {
            let seen = seen.clone();
            pool.submit("mac1", async move {
                seen.lock().await.push(i);
            })
            .await
            .unwrap();
        }

        pool.shutdown().await;
        let seen = seen.lock().await;
        assert_eq!(*seen, (0..32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn shutdown_drains_before_returning() {
        let pool = WorkerPool::new(2, 64);
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        for i in 0..20 {
            let counter = counter.clone();
            let key = format!("dev{i}");
            pool.submit(&key, async move {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        pool.shutdown().await;
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails() {
        let pool = WorkerPool::new(1, 1);
        pool.shutdown().await;

        let result = pool.submit("mac1", async {}).await;
        assert!(matches!(result, Err(ConnectorError::ShuttingDown)));
    }
}
