//! # Chunk Job Scheduler
//!
//! Builds and sorts section meshes on a pool of background threads while the
//! main thread keeps owning every GPU resource.
//!
//! ## Architecture Overview
//!
//! - `ChunkBuilder`: worker pool with an important and a deferred queue
//! - `ChunkJob`: a scheduled `ChunkBuilderTask` plus its `CancellationToken`
//! - `ChunkJobCollector`: submits a batch of jobs and can block until all of
//!   them have delivered a result
//! - `ChunkJobMetricsTracker`: execution time statistics per output kind
//!
//! ## Job Lifecycle
//! 1. A task is wrapped in a job via `ChunkBuilder::schedule_task()`
//! 2. The job lands on the important or the deferred queue
//! 3. A worker (or a waiting thread that steals it) claims the job exactly once
//! 4. The job's callback receives the result on the executing thread
//! 5. Results are forwarded to the main thread and uploaded there
//!
//! Workers always drain the important queue before the deferred one. Each
//! worker owns its own `ChunkBuildContext`, so build scratch space is never
//! shared between threads.

pub mod build_context;
pub mod collector;
pub mod job;
pub mod job_result;
pub mod metrics;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::RenderResult;

use build_context::ChunkBuildContext;
use collector::JobSemaphore;
use job::{ChunkBuilderTask, ChunkJob, JobCallback};

/// Jobs each worker may have queued before callers are asked to hold back.
pub const TASK_QUEUE_LIMIT_PER_WORKER: usize = 2;

/// How long an idle worker waits before re-checking for shutdown.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a blocked caller waits for a permit before helping again.
const BLOCK_POLL_INTERVAL: Duration = Duration::from_millis(1);

type JobQueue = (Sender<Arc<ChunkJob>>, Receiver<Arc<ChunkJob>>);

/// Worker pool executing chunk jobs.
pub struct ChunkBuilder {
    important: JobQueue,
    deferred: JobQueue,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
    threads: usize,
    local_context: Mutex<ChunkBuildContext>,
}

impl ChunkBuilder {
    /// Spawns the worker threads.
    ///
    /// # Arguments
    /// * `threads` - Number of worker threads
    /// * `context_factory` - Creates the build context of each worker, and one
    ///   more for the calling thread to use while it steals or helps
    ///
    /// # Errors
    /// Returns `RenderError::Io` if a thread cannot be spawned.
    pub fn new<F>(threads: usize, context_factory: F) -> RenderResult<Self>
    where
        F: Fn() -> ChunkBuildContext + Send + Sync + 'static,
    {
        let context_factory = Arc::new(context_factory);
        let important: JobQueue = unbounded();
        let deferred: JobQueue = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let queued = Arc::new(AtomicUsize::new(0));

        info!("Starting {} chunk builder threads", threads);

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let important_rx = important.1.clone();
            let deferred_rx = deferred.1.clone();
            let shutdown = shutdown.clone();
            let queued = queued.clone();
            let context_factory = context_factory.clone();

            let worker = thread::Builder::new()
                .name(format!("Chunk Render Task Executor #{index}"))
                .spawn(move || {
                    let mut context = context_factory();
                    worker_loop(&important_rx, &deferred_rx, &shutdown, &queued, &mut context);
                    debug!("Chunk builder thread #{index} stopped");
                })?;
            workers.push(worker);
        }

        Ok(Self {
            important,
            deferred,
            workers,
            shutdown,
            queued,
            threads,
            local_context: Mutex::new(context_factory()),
        })
    }

    /// Queues a task for execution.
    ///
    /// # Arguments
    /// * `task` - Work to run
    /// * `important` - Whether the task goes ahead of all deferred work
    /// * `on_finished` - Called once, on the thread that ran or discarded the job
    pub fn schedule_task(
        &self,
        task: Box<dyn ChunkBuilderTask>,
        important: bool,
        on_finished: JobCallback,
    ) -> Arc<ChunkJob> {
        let job = Arc::new(ChunkJob::new(task, important, on_finished));
        let queue = if important { &self.important.0 } else { &self.deferred.0 };

        self.queued.fetch_add(1, Ordering::AcqRel);
        if let Err(rejected) = queue.send(job.clone()) {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            rejected.0.discard();
        }
        job
    }

    /// Runs `job` on the calling thread if no worker has claimed it yet.
    ///
    /// # Returns
    /// `true` if the job ran here
    pub fn try_steal_task(&self, job: &ChunkJob) -> bool {
        let mut context = self.local_context.lock();
        job.execute(&mut context)
    }

    /// Helps drain the queues on the calling thread until `semaphore` has a
    /// permit available.
    pub fn managed_block(&self, semaphore: &JobSemaphore) {
        while semaphore.available() == 0 {
            match self.try_dequeue() {
                Some(job) => {
                    let mut context = self.local_context.lock();
                    job.execute(&mut context);
                }
                None => {
                    semaphore.wait_timeout(BLOCK_POLL_INTERVAL);
                }
            }
        }
    }

    fn try_dequeue(&self) -> Option<Arc<ChunkJob>> {
        let job = self
            .important
            .1
            .try_recv()
            .or_else(|_| self.deferred.1.try_recv())
            .ok()?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Some(job)
    }

    /// Number of jobs that can still be queued without oversubscribing the
    /// workers.
    pub fn scheduling_budget(&self) -> usize {
        (self.threads * TASK_QUEUE_LIMIT_PER_WORKER).saturating_sub(self.queued_job_count())
    }

    pub fn total_threads(&self) -> usize {
        self.threads
    }

    /// Jobs waiting in either queue.
    pub fn queued_job_count(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stops the workers and discards every job that never started.
    ///
    /// Discarded jobs still run their callback, so nothing waiting on them
    /// blocks forever.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Stopping {} chunk builder threads", self.workers.len());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("A chunk builder thread panicked while stopping");
            }
        }

        let mut discarded = 0;
        while let Some(job) = self.try_dequeue() {
            if job.discard() {
                discarded += 1;
            }
        }
        if discarded > 0 {
            debug!("Discarded {} queued chunk jobs on shutdown", discarded);
        }
    }
}

impl Drop for ChunkBuilder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    important: &Receiver<Arc<ChunkJob>>,
    deferred: &Receiver<Arc<ChunkJob>>,
    shutdown: &AtomicBool,
    queued: &AtomicUsize,
    context: &mut ChunkBuildContext,
) {
    while !shutdown.load(Ordering::Acquire) {
        let Some(job) = next_job(important, deferred) else {
            continue;
        };
        queued.fetch_sub(1, Ordering::AcqRel);
        job.execute(context);
    }
}

/// Important jobs first, then deferred ones; waits a little when both are empty.
fn next_job(important: &Receiver<Arc<ChunkJob>>, deferred: &Receiver<Arc<ChunkJob>>) -> Option<Arc<ChunkJob>> {
    if let Ok(job) = important.try_recv() {
        return Some(job);
    }
    if let Ok(job) = deferred.try_recv() {
        return Some(job);
    }

    select! {
        recv(important) -> job => job.ok(),
        recv(deferred) -> job => job.ok(),
        default(WORKER_POLL_INTERVAL) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use cgmath::Point3;

    use super::*;
    use crate::rendering::compile::output::{ChunkBuildOutput, ChunkTaskOutput, TaskOutputKind};

    struct CountingTask {
        section: Point3<i32>,
        executions: Arc<AtomicUsize>,
    }

    impl ChunkBuilderTask for CountingTask {
        fn section(&self) -> Point3<i32> {
            self.section
        }

        fn kind(&self) -> TaskOutputKind {
            TaskOutputKind::Build
        }

        fn execute(self: Box<Self>, _context: &mut ChunkBuildContext) -> RenderResult<ChunkTaskOutput> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(ChunkTaskOutput::Build(ChunkBuildOutput::empty(self.section, 0)))
        }
    }

    fn task(executions: &Arc<AtomicUsize>) -> Box<dyn ChunkBuilderTask> {
        Box::new(CountingTask {
            section: Point3::new(0, 0, 0),
            executions: executions.clone(),
        })
    }

    #[test]
    fn a_builder_without_workers_runs_jobs_when_stolen() {
        let builder = ChunkBuilder::new(0, || ChunkBuildContext::new(false)).unwrap();
        let executions = Arc::new(AtomicUsize::new(0));
        let job = builder.schedule_task(task(&executions), false, Box::new(|_| {}));

        assert_eq!(builder.queued_job_count(), 1);
        assert_eq!(builder.scheduling_budget(), 0);
        assert!(builder.try_steal_task(&job));
        assert!(!builder.try_steal_task(&job));
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn managed_block_drains_queued_work() {
        let builder = ChunkBuilder::new(0, || ChunkBuildContext::new(true)).unwrap();
        let semaphore = Arc::new(JobSemaphore::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let release = semaphore.clone();
        builder.schedule_task(
            task(&executions),
            true,
            Box::new(move |_| release.release(1)),
        );
        builder.managed_block(&semaphore);

        assert_eq!(semaphore.try_acquire(1), 1);
        assert_eq!(builder.queued_job_count(), 0);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_discards_jobs_that_never_ran() {
        let mut builder = ChunkBuilder::new(0, || ChunkBuildContext::new(false)).unwrap();
        let discarded = Arc::new(AtomicUsize::new(0));
        let executions = Arc::new(AtomicUsize::new(0));

        let counter = discarded.clone();
        let job = builder.schedule_task(
            task(&executions),
            false,
            Box::new(move |result| {
                if result.is_none() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        builder.shutdown();

        assert!(builder.is_shut_down());
        assert!(job.token().is_finished());
        assert_eq!(discarded.load(Ordering::SeqCst), 1);
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn workers_execute_scheduled_jobs() {
        let builder = ChunkBuilder::new(2, || ChunkBuildContext::new(false)).unwrap();
        let semaphore = Arc::new(JobSemaphore::new());
        let executions = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let release = semaphore.clone();
            builder.schedule_task(task(&executions), false, Box::new(move |_| release.release(1)));
        }
        let mut remaining = 6;
        while remaining > 0 {
            remaining -= semaphore.try_acquire(remaining);
            if remaining > 0 {
                builder.managed_block(&semaphore);
            }
        }

        assert_eq!(builder.total_threads(), 2);
        assert_eq!(executions.load(Ordering::SeqCst), 6);
    }
}
