use std::any::Any;
use std::fmt;

use cgmath::Point3;

use crate::error::RenderError;
use crate::rendering::compile::output::ChunkTaskOutput;

use super::job::panic_message;

/// Why a job produced no output.
pub enum ChunkJobFailure {
    /// The task returned an error.
    Error(RenderError),
    /// The task panicked; holds the original payload.
    Panic(Box<dyn Any + Send>),
}

impl ChunkJobFailure {
    /// Re-raises the failure on the calling thread.
    ///
    /// A captured panic resumes unchanged; a returned error panics with a
    /// message wrapping it.
    pub fn abort(self) -> ! {
        match self {
            ChunkJobFailure::Panic(payload) => std::panic::resume_unwind(payload),
            ChunkJobFailure::Error(err) => panic!("Chunk job failed: {err}"),
        }
    }
}

impl fmt::Debug for ChunkJobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkJobFailure::Error(err) => f.debug_tuple("Error").field(err).finish(),
            ChunkJobFailure::Panic(payload) => f.debug_tuple("Panic").field(&panic_message(payload.as_ref())).finish(),
        }
    }
}

/// Outcome of a job that ran.
#[derive(Debug)]
pub enum ChunkJobResult {
    Success {
        output: ChunkTaskOutput,
        execution_time_nanos: u64,
    },
    Failure {
        section: Point3<i32>,
        failure: ChunkJobFailure,
    },
}

impl ChunkJobResult {
    pub fn section(&self) -> Point3<i32> {
        match self {
            ChunkJobResult::Success { output, .. } => output.section(),
            ChunkJobResult::Failure { section, .. } => *section,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChunkJobResult::Success { .. })
    }

    /// Returns the output, re-raising the failure otherwise.
    pub fn unwrap_output(self) -> ChunkTaskOutput {
        match self {
            ChunkJobResult::Success { output, .. } => output,
            ChunkJobResult::Failure { failure, .. } => failure.abort(),
        }
    }
}
