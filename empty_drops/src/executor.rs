//! Execution of independent simulation tasks.

use crate::errors::EmptyDropsError;
use anyhow::Result;
use rayon::prelude::*;

/// Runs a batch of independent tasks and returns their results in task order.
///
/// If any task fails the whole batch fails with
/// [`EmptyDropsError::WorkerFailure`] naming the first failed task, and no
/// results are returned.
pub trait TaskExecutor {
    /// Number of workers available, used to decide how to split the work.
    fn num_workers(&self) -> usize;

    /// Run every task to completion.
    fn execute<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, EmptyDropsError>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send;
}

/// Runs tasks one after the other on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

impl TaskExecutor for SerialExecutor {
    fn num_workers(&self) -> usize {
        1
    }

    fn execute<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, EmptyDropsError>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        tasks
            .into_iter()
            .enumerate()
            .map(|(task, run)| run().map_err(|source| EmptyDropsError::WorkerFailure { task, source }))
            .collect()
    }
}

/// Runs tasks on a dedicated rayon thread pool.
#[derive(Debug, Clone, Copy)]
pub struct RayonExecutor {
    threads: usize,
}

impl RayonExecutor {
    /// Executor with `threads` workers. Zero uses rayon's default, which
    /// honours `RAYON_NUM_THREADS`.
    pub fn new(threads: usize) -> Self {
        RayonExecutor { threads }
    }
}

impl TaskExecutor for RayonExecutor {
    fn num_workers(&self) -> usize {
        if self.threads == 0 {
            rayon::current_num_threads()
        } else {
            self.threads
        }
    }

    fn execute<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, EmptyDropsError>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()?;
        pool.install(|| {
            tasks
                .into_par_iter()
                .enumerate()
                .map(|(task, run)| {
                    run().map_err(|source| EmptyDropsError::WorkerFailure { task, source })
                })
                .collect::<Vec<_>>()
        })
        .into_iter()
        // report the lowest-numbered failure regardless of scheduling
        .collect()
    }
}
