//! Fixed-size worker pool for background asset work.

use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::thread::JoinHandle;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};

type Job = Box<dyn FnOnce() + Send>;

/// Handle to a value produced on a pool worker.
///
/// A worker panic surfaces as an `Err` here instead of taking the pool down.
pub struct TaskHandle<T> {
    rx: Receiver<std::thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task finishes.
    pub fn wait(self) -> anyhow::Result<T> {
        let result = self.rx.recv().context("task was dropped before completion")?;
        result.map_err(|payload| anyhow::anyhow!("task panicked: {}", panic_message(payload.as_ref())))
    }

    /// Non-blocking poll; `None` while the task is still running.
    pub fn try_get(&self) -> Option<anyhow::Result<T>> {
        self.rx.try_recv().ok().map(|result| {
            result.map_err(|payload| anyhow::anyhow!("task panicked: {}", panic_message(payload.as_ref())))
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

/// Worker threads draining a shared FIFO job queue.
///
/// Shutdown closes the queue and joins the workers; jobs already queued
/// still run to completion first.
pub struct TaskPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskPool {
    pub fn new(thread_count: usize) -> Self {
        let thread_count = thread_count.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();

        let workers = (0..thread_count)
            .map(|idx| {
                let receiver: Receiver<Job> = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("asset-worker-{idx}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .unwrap()
            })
            .collect();

        log::info!("task pool started with {thread_count} workers");
        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// One worker per available core.
    pub fn new_default() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    /// Queues `f` on a worker. Fails once the pool has shut down.
    pub fn spawn<T, F>(&self, f: F) -> anyhow::Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let sender_guard = self.sender.lock().unwrap();
        let sender = sender_guard.as_ref().context("task pool is shut down")?;

        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move || {
            let result = std::panic::catch_unwind(AssertUnwindSafe(f));
            // receiver may be gone if the caller dropped the handle
            let _ = result_tx.send(result);
        });
        // SendError carries the job back, which is not an Error type
        sender.send(job).map_err(|_| anyhow::anyhow!("task pool workers are gone"))?;
        Ok(TaskHandle { rx: result_rx })
    }

    /// Closes the queue, runs every queued job to completion and joins the
    /// workers. Idempotent.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().unwrap().take();
        let Some(sender) = sender else {
            return;
        };
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            if worker.join().is_err() {
                log::error!("asset worker terminated by panic");
            }
        }
        log::info!("task pool shut down");
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn tasks_produce_results() {
        let pool = TaskPool::new(2);
        let handle = pool.spawn(|| 21 * 2).unwrap();
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn single_worker_runs_jobs_in_order() {
        let pool = TaskPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let order = order.clone();
                pool.spawn(move || order.lock().unwrap().push(i)).unwrap()
            })
            .collect();
        for handle in handles {
            handle.wait().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn queued_jobs_drain_on_shutdown() {
        let pool = TaskPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = counter.clone();
            pool.spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn spawn_after_shutdown_fails() {
        let pool = TaskPool::new(1);
        pool.shutdown();
        assert!(pool.spawn(|| ()).is_err());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let pool = TaskPool::new(2);
        pool.shutdown();
        pool.shutdown();
    }

    #[test]
    fn worker_panic_reports_as_error() {
        let pool = TaskPool::new(1);
        let handle = pool.spawn(|| -> u32 { panic!("boom") }).unwrap();
        let err = handle.wait().unwrap_err();
        assert!(err.to_string().contains("boom"));

        // pool still usable afterwards
        let handle = pool.spawn(|| 7).unwrap();
        assert_eq!(handle.wait().unwrap(), 7);
    }

    #[test]
    fn formatted_panic_payloads_keep_their_message() {
        let pool = TaskPool::new(1);
        let code = 7;
        let handle = pool.spawn(move || -> u32 { panic!("bad code {code}") }).unwrap();
        let err = handle.wait().unwrap_err();
        assert!(err.to_string().contains("bad code 7"));
    }

    #[test]
    fn try_get_polls_without_blocking() {
        let pool = TaskPool::new(1);
        let (block_tx, block_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = pool.spawn(move || block_rx.recv().unwrap()).unwrap();
        assert!(handle.try_get().is_none());
        block_tx.send(()).unwrap();
        handle.wait().unwrap();
    }
}
