//! Jobs, the tasks they run, and the tokens used to cancel them.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use cgmath::Point3;
use log::error;
use parking_lot::Mutex;
use web_time::Instant;

use crate::error::RenderResult;
use crate::rendering::compile::output::{ChunkTaskOutput, TaskOutputKind};

use super::build_context::ChunkBuildContext;
use super::job_result::{ChunkJobFailure, ChunkJobResult};

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const DISCARDED: u8 = 2;
const FINISHED: u8 = 3;

/// Work a job performs on a worker thread.
///
/// Tasks own everything they read (cloned world snapshots, sort states) and
/// get scratch space from the executing worker's [`ChunkBuildContext`].
pub trait ChunkBuilderTask: Send {
    /// Section the task produces output for.
    fn section(&self) -> Point3<i32>;

    fn kind(&self) -> TaskOutputKind;

    fn execute(self: Box<Self>, context: &mut ChunkBuildContext) -> RenderResult<ChunkTaskOutput>;
}

struct JobFlags {
    cancelled: AtomicBool,
    state: AtomicU8,
}

/// Shared handle to a job's cancellation flag and progress.
///
/// Cancelling only has an effect before the job starts; a started job always
/// runs to completion.
#[derive(Clone)]
pub struct CancellationToken(Arc<JobFlags>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(JobFlags {
            cancelled: AtomicBool::new(false),
            state: AtomicU8::new(PENDING),
        }))
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    /// Whether the job has started (or was discarded).
    pub fn is_started(&self) -> bool {
        self.0.state.load(Ordering::Acquire) != PENDING
    }

    /// Whether the job ran to completion or was discarded without running.
    ///
    /// Set before the job's callback runs, so a consumer receiving the result
    /// already sees the token as finished.
    pub fn is_finished(&self) -> bool {
        matches!(self.0.state.load(Ordering::Acquire), FINISHED | DISCARDED)
    }

    fn claim(&self, next: u8) -> bool {
        self.0
            .state
            .compare_exchange(PENDING, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.0.state.store(FINISHED, Ordering::Release);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("state", &self.0.state.load(Ordering::Relaxed))
            .finish()
    }
}

/// Called once per job: with the result when it ran, with `None` when it was
/// discarded without running.
pub type JobCallback = Box<dyn Fn(Option<ChunkJobResult>) + Send + Sync>;

/// A scheduled task. Exactly one thread can claim it, either a worker that
/// dequeued it or a thread stealing it while waiting for results.
pub struct ChunkJob {
    section: Point3<i32>,
    kind: TaskOutputKind,
    task: Mutex<Option<Box<dyn ChunkBuilderTask>>>,
    token: CancellationToken,
    important: bool,
    on_finished: JobCallback,
}

impl ChunkJob {
    pub fn new(task: Box<dyn ChunkBuilderTask>, important: bool, on_finished: JobCallback) -> Self {
        Self {
            section: task.section(),
            kind: task.kind(),
            task: Mutex::new(Some(task)),
            token: CancellationToken::new(),
            important,
            on_finished,
        }
    }

    pub fn section(&self) -> Point3<i32> {
        self.section
    }

    pub fn kind(&self) -> TaskOutputKind {
        self.kind
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_important(&self) -> bool {
        self.important
    }

    pub fn is_started(&self) -> bool {
        self.token.is_started()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Claims and runs the job on the calling thread.
    ///
    /// A job cancelled before it starts is discarded instead.
    ///
    /// # Returns
    /// `true` if this call ran the job
    pub fn execute(&self, context: &mut ChunkBuildContext) -> bool {
        if self.token.is_cancelled() {
            self.discard();
            return false;
        }
        if !self.token.claim(STARTED) {
            return false;
        }
        let Some(task) = self.task.lock().take() else {
            return false;
        };

        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| task.execute(context)));
        let execution_time_nanos = start.elapsed().as_nanos() as u64;

        let result = match outcome {
            Ok(Ok(output)) => ChunkJobResult::Success {
                output,
                execution_time_nanos,
            },
            Ok(Err(err)) => {
                error!("Chunk job for section {:?} failed: {}", self.section, err);
                ChunkJobResult::Failure {
                    section: self.section,
                    failure: ChunkJobFailure::Error(err),
                }
            }
            Err(payload) => {
                error!(
                    "Chunk job for section {:?} panicked: {}",
                    self.section,
                    panic_message(payload.as_ref())
                );
                ChunkJobResult::Failure {
                    section: self.section,
                    failure: ChunkJobFailure::Panic(payload),
                }
            }
        };

        self.token.finish();
        (self.on_finished)(Some(result));
        true
    }

    /// Drops a job that has not started.
    ///
    /// # Returns
    /// `true` if this call discarded the job
    pub fn discard(&self) -> bool {
        if !self.token.claim(DISCARDED) {
            return false;
        }
        self.task.lock().take();
        (self.on_finished)(None);
        true
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::RenderError;
    use crate::rendering::compile::output::ChunkBuildOutput;

    struct StubTask {
        section: Point3<i32>,
        fail: bool,
    }

    impl ChunkBuilderTask for StubTask {
        fn section(&self) -> Point3<i32> {
            self.section
        }

        fn kind(&self) -> TaskOutputKind {
            TaskOutputKind::Build
        }

        fn execute(self: Box<Self>, _context: &mut ChunkBuildContext) -> RenderResult<ChunkTaskOutput> {
            if self.fail {
                return Err(RenderError::JobExecutionFailure {
                    section: [self.section.x, self.section.y, self.section.z],
                    message: "stub failure".to_string(),
                });
            }
            Ok(ChunkTaskOutput::Build(ChunkBuildOutput::empty(self.section, 0)))
        }
    }

    fn counting_job(fail: bool, runs: Arc<AtomicUsize>, discards: Arc<AtomicUsize>) -> ChunkJob {
        ChunkJob::new(
            Box::new(StubTask {
                section: Point3::new(1, 2, 3),
                fail,
            }),
            false,
            Box::new(move |result| match result {
                Some(_) => {
                    runs.fetch_add(1, Ordering::SeqCst);
                }
                None => {
                    discards.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
    }

    #[test]
    fn a_job_runs_at_most_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let discards = Arc::new(AtomicUsize::new(0));
        let job = counting_job(false, runs.clone(), discards.clone());
        let mut context = ChunkBuildContext::new(false);

        assert!(job.execute(&mut context));
        assert!(!job.execute(&mut context));
        assert!(!job.discard());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(discards.load(Ordering::SeqCst), 0);
        assert!(job.token().is_finished());
    }

    #[test]
    fn cancelled_jobs_are_discarded_without_a_result() {
        let runs = Arc::new(AtomicUsize::new(0));
        let discards = Arc::new(AtomicUsize::new(0));
        let job = counting_job(false, runs.clone(), discards.clone());
        job.token().cancel();

        assert!(!job.execute(&mut ChunkBuildContext::new(false)));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(discards.load(Ordering::SeqCst), 1);
        assert!(job.token().is_finished());
    }

    #[test]
    fn cancelling_after_start_still_delivers_the_result() {
        let job = ChunkJob::new(
            Box::new(StubTask {
                section: Point3::new(0, 0, 0),
                fail: true,
            }),
            true,
            Box::new(|result| {
                assert!(matches!(result, Some(ChunkJobResult::Failure { .. })));
            }),
        );
        assert!(job.execute(&mut ChunkBuildContext::new(false)));
        job.token().cancel();
        assert!(job.token().is_finished());
        assert!(job.is_important());
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
