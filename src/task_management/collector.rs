//! Batches of submitted jobs that a thread can wait on.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::job::{CancellationToken, ChunkBuilderTask};
use super::job_result::ChunkJobResult;
use super::ChunkBuilder;

/// Counting semaphore released once per finished job.
pub struct JobSemaphore {
    permits: Mutex<usize>,
    released: Condvar,
}

impl JobSemaphore {
    pub fn new() -> Self {
        Self {
            permits: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    pub fn release(&self, permits: usize) {
        *self.permits.lock() += permits;
        self.released.notify_all();
    }

    /// Takes up to `max` permits without blocking.
    ///
    /// # Returns
    /// Number of permits taken
    pub fn try_acquire(&self, max: usize) -> usize {
        let mut permits = self.permits.lock();
        let taken = (*permits).min(max);
        *permits -= taken;
        taken
    }

    pub fn available(&self) -> usize {
        *self.permits.lock()
    }

    /// Blocks until a permit is available or `timeout` passes.
    ///
    /// # Returns
    /// `true` if permits are available
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            self.released.wait_for(&mut permits, timeout);
        }
        *permits > 0
    }
}

impl Default for JobSemaphore {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer receiving the result of every job a collector submitted.
pub type JobConsumer = Arc<dyn Fn(ChunkJobResult) + Send + Sync>;

/// Submits jobs against a budget and waits for all of them.
///
/// Every submitted job releases exactly one permit when it finishes or is
/// discarded, so [`Self::await_completion`] returns once every job is done.
pub struct ChunkJobCollector {
    semaphore: Arc<JobSemaphore>,
    consumer: JobConsumer,
    submitted: Vec<Arc<super::job::ChunkJob>>,
    budget: usize,
}

impl ChunkJobCollector {
    /// # Arguments
    /// * `budget` - Maximum number of jobs this collector accepts
    /// * `consumer` - Receives each result on the thread that ran the job
    pub fn new(budget: usize, consumer: JobConsumer) -> Self {
        Self {
            semaphore: Arc::new(JobSemaphore::new()),
            consumer,
            submitted: Vec::new(),
            budget,
        }
    }

    /// A collector without a budget.
    pub fn unbounded(consumer: JobConsumer) -> Self {
        Self::new(usize::MAX, consumer)
    }

    /// Schedules a task if budget remains.
    ///
    /// # Returns
    /// The job's cancellation token, or `None` when the budget is exhausted
    pub fn submit(
        &mut self,
        builder: &ChunkBuilder,
        task: Box<dyn ChunkBuilderTask>,
        important: bool,
    ) -> Option<CancellationToken> {
        if !self.can_offer() {
            return None;
        }

        let semaphore = self.semaphore.clone();
        let consumer = self.consumer.clone();
        let job = builder.schedule_task(
            task,
            important,
            Box::new(move |result| {
                Self::on_job_finished(&consumer, &semaphore, result);
            }),
        );

        self.budget -= 1;
        let token = job.token().clone();
        self.submitted.push(job);
        Some(token)
    }

    fn on_job_finished(consumer: &JobConsumer, semaphore: &JobSemaphore, result: Option<ChunkJobResult>) {
        if let Some(result) = result {
            consumer(result);
        }
        semaphore.release(1);
    }

    pub fn can_offer(&self) -> bool {
        self.budget > 0
    }

    /// Jobs submitted since the last completed wait.
    pub fn submitted_count(&self) -> usize {
        self.submitted.len()
    }

    /// Blocks until every submitted job has finished or been discarded.
    ///
    /// Unstarted jobs are stolen and run on the calling thread first; the
    /// remaining wait helps drain the builder's queues.
    pub fn await_completion(&mut self, builder: &ChunkBuilder) {
        if self.submitted.is_empty() {
            return;
        }

        for job in &self.submitted {
            if !job.is_started() && !job.is_cancelled() {
                builder.try_steal_task(job);
            }
        }

        let mut remaining = self.submitted.len();
        while remaining > 0 {
            remaining -= self.semaphore.try_acquire(remaining);
            if remaining > 0 {
                builder.managed_block(&self.semaphore);
            }
        }

        self.submitted.clear();
    }
}
