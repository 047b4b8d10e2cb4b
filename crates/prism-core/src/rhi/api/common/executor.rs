// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A small pool of background threads used to record command lists in parallel.

use crate::rhi::error::{BackendError, RhiResult};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size worker pool fed through a `crossbeam-channel` job queue.
///
/// Dropping the executor closes the queue and joins every worker once the jobs
/// already queued have run.
pub struct ParallelExecutor {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ParallelExecutor {
    /// Starts `thread_count` workers (at least one).
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Platform`] if a worker thread cannot be spawned.
    pub fn new(name: &str, thread_count: usize) -> RhiResult<Self> {
        let thread_count = thread_count.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let receiver: Receiver<Job> = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })
                .map_err(|e| BackendError::Platform(format!("failed to spawn worker: {e}")))?;
            workers.push(handle);
        }
        log::info!("Parallel executor '{name}' started with {thread_count} workers.");
        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            workers,
        })
    }

    /// Starts one worker per available CPU core.
    pub fn with_available_parallelism(name: &str) -> RhiResult<Self> {
        let threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(name, threads)
    }

    /// Returns the number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Returns the name of the pool.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues a job without waiting for it.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(job)).is_err() {
                log::error!("Parallel executor '{}' has no running workers.", self.name);
            }
        }
    }

    /// Runs `task` once per item on the workers and blocks until all are done.
    ///
    /// Results are returned in item order, whatever order the workers finished in.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WorkerPanicked`] with the lowest index of a task
    /// that panicked.
    pub fn map_indexed<T, R, F>(&self, items: Vec<T>, task: F) -> RhiResult<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> R + Send + Sync + 'static,
    {
        let count = items.len();
        let task = Arc::new(task);
        let (result_tx, result_rx) = crossbeam_channel::bounded(count);
        for (index, item) in items.into_iter().enumerate() {
            let task = Arc::clone(&task);
            let result_tx = result_tx.clone();
            self.spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| task(index, item)));
                let _ = result_tx.send((index, result.ok()));
            });
        }
        drop(result_tx);

        let mut results: Vec<Option<R>> = (0..count).map(|_| None).collect();
        for (index, result) in result_rx.iter() {
            results[index] = result;
        }
        results
            .into_iter()
            .enumerate()
            .map(|(task, result)| result.ok_or_else(|| BackendError::WorkerPanicked { task }.into()))
            .collect()
    }
}

impl Drop for ParallelExecutor {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        log::debug!("Parallel executor '{}' stopped.", self.name);
    }
}

impl std::fmt::Debug for ParallelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExecutor")
            .field("name", &self.name)
            .field("thread_count", &self.workers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_map_indexed_keeps_item_order() {
        let executor = ParallelExecutor::new("test", 4).unwrap();
        let results = executor
            .map_indexed((0..32u64).collect(), |index, item| {
                thread::sleep(std::time::Duration::from_micros(32 - item));
                (index, item * 2)
            })
            .unwrap();
        for (position, (index, doubled)) in results.into_iter().enumerate() {
            assert_eq!(position, index);
            assert_eq!(doubled, position as u64 * 2);
        }
    }

    #[test]
    fn test_panicking_task_is_reported() {
        let executor = ParallelExecutor::new("test", 2).unwrap();
        let result = executor.map_indexed(vec![0, 1, 2], |_, item: i32| {
            if item == 1 {
                panic!("task failed");
            }
            item
        });
        assert!(matches!(
            result,
            Err(crate::rhi::error::RhiError::Backend(BackendError::WorkerPanicked { task: 1 }))
        ));
    }

    #[test]
    fn test_drop_runs_queued_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let executor = ParallelExecutor::new("test", 1).unwrap();
            for _ in 0..10 {
                let counter = Arc::clone(&counter);
                executor.spawn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_zero_threads_still_starts_one_worker() {
        let executor = ParallelExecutor::new("test", 0).unwrap();
        assert_eq!(executor.thread_count(), 1);
    }
}
