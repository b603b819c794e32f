//! HAL command queue surface (`spec.md` §6), consumed by sequencer dispatch.

use std::time::Instant;

use log::{debug, trace};
use rt_core::{ErrorBuilder, ErrorKind, Result};

use crate::buffer::BufferView;
use crate::executable::Executable;

/// A binary ordering primitive with a deadline-bounded wait, matching the
/// glossary's "Fence / Semaphore" entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FenceValue(pub u64);

/// One unit of queue work: a buffer copy, a dispatch, or a barrier,
/// collected into a [`SubmissionBatch`] by the sequencer (`spec.md` §4.8).
pub enum CommandOp {
    Copy { src: BufferView, dst: BufferView },
    Dispatch { executable: Executable, export: u16, workload: Vec<u32>, bindings: Vec<BufferView> },
    Barrier,
}

/// A group of commands submitted together, batched by the sequencer when
/// there is no intervening synchronization between them (`spec.md` §4.8).
#[derive(Default)]
pub struct SubmissionBatch {
    pub ops: Vec<CommandOp>,
}

impl SubmissionBatch {
    pub fn new() -> SubmissionBatch {
        SubmissionBatch { ops: Vec::new() }
    }

    pub fn push(&mut self, op: CommandOp) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A device's command queue: accepts submissions from any thread; ordering
/// within one queue follows submission order (`spec.md` §5).
pub trait CommandQueue: Send + Sync {
    /// Submits `batches` in order, signaling `fence_value` once all have
    /// completed.
    fn submit(&self, batches: Vec<SubmissionBatch>, fence_value: FenceValue) -> Result<()>;

    /// Issues all previously queued work to the device without waiting.
    fn flush(&self) -> Result<()>;

    /// Blocks until all submitted work completes, or `deadline` elapses.
    fn wait_idle(&self, deadline: Option<Instant>) -> Result<()>;

    /// Blocks until `fence_value` has been signaled, or `deadline` elapses.
    fn wait_fence(&self, fence_value: FenceValue, deadline: Option<Instant>) -> Result<()>;

    /// The highest fence value this queue has signaled so far.
    fn signaled_fence(&self) -> FenceValue;
}

/// An in-process queue that executes every submission synchronously on the
/// calling thread via `run_batch`, used by the interpreter-backed sequencer
/// (`spec.md` §4.8's "interpreter-backed executables").
pub struct InlineQueue<F>
where
    F: Fn(&SubmissionBatch) -> Result<()> + Send + Sync,
{
    run_batch: F,
    signaled: std::sync::atomic::AtomicU64,
}

impl<F> InlineQueue<F>
where
    F: Fn(&SubmissionBatch) -> Result<()> + Send + Sync,
{
    pub fn new(run_batch: F) -> InlineQueue<F> {
        InlineQueue {
            run_batch,
            signaled: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl<F> CommandQueue for InlineQueue<F>
where
    F: Fn(&SubmissionBatch) -> Result<()> + Send + Sync,
{
    fn submit(&self, batches: Vec<SubmissionBatch>, fence_value: FenceValue) -> Result<()> {
        trace!("submitting {} batch(es) up to fence {}", batches.len(), fence_value.0);
        for batch in &batches {
            (self.run_batch)(batch)?;
        }
        self.signaled
            .store(fence_value.0, std::sync::atomic::Ordering::SeqCst);
        debug!("fence {} signaled", fence_value.0);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn wait_idle(&self, _deadline: Option<Instant>) -> Result<()> {
        Ok(())
    }

    fn wait_fence(&self, fence_value: FenceValue, deadline: Option<Instant>) -> Result<()> {
        let signaled = self.signaled.load(std::sync::atomic::Ordering::SeqCst);
        if signaled >= fence_value.0 {
            return Ok(());
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(ErrorBuilder::new(ErrorKind::DeadlineExceeded)
                    .with(format!("fence {} never signaled (at {})", fence_value.0, signaled))
                    .build());
            }
        }
        // An inline queue runs submissions synchronously, so by the time
        // `submit` returns the fence is already signaled; reaching here
        // means the caller is waiting on a fence value nothing ever submits.
        Err(ErrorBuilder::new(ErrorKind::FailedPrecondition)
            .with(format!("fence {} was never submitted", fence_value.0))
            .build())
    }

    fn signaled_fence(&self) -> FenceValue {
        FenceValue(self.signaled.load(std::sync::atomic::Ordering::SeqCst))
    }
}
