//! Sequencer dispatch (spec component C10): turns the `HalRequest`s the
//! interpreter's fetch loop raises for `Dispatch`/`HalSignalFence`/
//! `HalWaitFence` into `CommandOp`s, batching consecutive ops with no
//! intervening fence into one `SubmissionBatch` before handing it to a
//! device's `CommandQueue` (`spec.md` §4.8).

use std::sync::Arc;

use log::trace;
use rt_core::{ErrorBuilder, ErrorKind, Result};
use rt_hal::{CommandOp, CommandQueue, Executable, FenceValue, SubmissionBatch};

use crate::interpreter::HalRequest;
use crate::value::Value;

/// Resolves a `DispatchOrdinal`'s dispatch ordinal to the `Executable`
/// prepared for it; the export index travels with the `DispatchOrdinal`
/// operand itself (`spec.md` §4.5) and needs no resolution. Owned by
/// whatever assembled the module — `rt_vm::Instance` — since only it knows
/// the module's executable table.
pub trait ExecutableResolver {
    fn resolve(&self, executable_ordinal: u32) -> Result<Executable>;
}

/// Accumulates `CommandOp`s raised by one interpreter run and submits them
/// to a device queue, either when a fence is signaled/waited on or when the
/// caller explicitly flushes.
pub struct Sequencer {
    queue: Arc<dyn CommandQueue>,
    pending: SubmissionBatch,
}

impl Sequencer {
    pub fn new(queue: Arc<dyn CommandQueue>) -> Sequencer {
        Sequencer { queue, pending: SubmissionBatch::new() }
    }

    fn take_pending(&mut self) -> SubmissionBatch {
        std::mem::replace(&mut self.pending, SubmissionBatch::new())
    }

    /// Number of ops batched but not yet submitted; used by tests to check
    /// that consecutive dispatches coalesce into one batch.
    pub fn pending_len(&self) -> usize {
        self.pending.ops.len()
    }

    pub fn record(&mut self, op: CommandOp) {
        self.pending.push(op);
    }

    /// Answers one `HalRequest`, the closure `Interpreter::run` is given as
    /// its `hal` parameter by whoever (normally `rt_vm::Instance`) chooses to
    /// run a function through the sequencer rather than execute its HAL ops
    /// as direct no-ops.
    pub fn handle(&mut self, resolver: &dyn ExecutableResolver, request: HalRequest) -> Result<Vec<Value>> {
        match request {
            HalRequest::Dispatch { executable_ordinal, export, workload, bindings } => {
                let executable = resolver.resolve(executable_ordinal)?;
                trace!("dispatch ordinal {executable_ordinal} export {export}, workload {workload:?}");
                self.pending.push(CommandOp::Dispatch { executable, export, workload, bindings });
                Ok(Vec::new())
            }
            // The indirect-dispatch encoding (`spec.md` §4.5) carries a
            // device-local workload buffer but no executable ordinal, so
            // there is nothing here to resolve against the executable
            // table. Rejected rather than guessed at.
            HalRequest::DispatchIndirect { .. } => Err(ErrorBuilder::new(ErrorKind::Unimplemented)
                .with("dispatch_indirect's encoding carries no executable ordinal to resolve".to_string())
                .build()),
            HalRequest::SignalFence(value) => {
                let batch = self.take_pending();
                self.queue.submit(vec![batch], FenceValue(value))?;
                Ok(Vec::new())
            }
            HalRequest::WaitFence(value) => {
                if !self.pending.is_empty() {
                    let batch = self.take_pending();
                    self.queue.submit(vec![batch], FenceValue(value))?;
                }
                self.queue.wait_fence(FenceValue(value), None)?;
                Ok(Vec::new())
            }
        }
    }

    /// Submits any batched ops immediately under a caller-chosen fence,
    /// without waiting for a `HalSignalFence` instruction to ask for it.
    pub fn flush(&mut self, fence_value: FenceValue) -> Result<()> {
        let batch = self.take_pending();
        self.queue.submit(vec![batch], fence_value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rt_hal::InlineQueue;

    use super::*;

    struct RejectResolver;
    impl ExecutableResolver for RejectResolver {
        fn resolve(&self, _executable_ordinal: u32) -> Result<Executable> {
            Err(ErrorBuilder::new(ErrorKind::NotFound).with("no executables registered".to_string()).build())
        }
    }

    fn counting_queue() -> (Arc<InlineQueue<impl Fn(&SubmissionBatch) -> Result<()> + Send + Sync>>, Arc<AtomicUsize>) {
        let submitted_ops = Arc::new(AtomicUsize::new(0));
        let counter = submitted_ops.clone();
        let queue = Arc::new(InlineQueue::new(move |batch: &SubmissionBatch| {
            counter.fetch_add(batch.ops.len(), Ordering::SeqCst);
            Ok(())
        }));
        (queue, submitted_ops)
    }

    #[test]
    fn dispatch_batches_until_signal_fence() {
        let (queue, submitted_ops) = counting_queue();
        let mut sequencer = Sequencer::new(queue);
        let resolver = RejectResolver;

        // Two dispatches in a row against an unresolvable ordinal still
        // demonstrates the resolver is consulted per-dispatch and the
        // failure doesn't silently batch anyway.
        let err = sequencer
            .handle(&resolver, HalRequest::Dispatch { executable_ordinal: 0, export: 0, workload: vec![1], bindings: vec![] })
            .unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::NotFound);
        assert_eq!(sequencer.pending_len(), 0);
        assert_eq!(submitted_ops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn signal_fence_submits_pending_batch() {
        let (queue, submitted_ops) = counting_queue();
        let mut sequencer = Sequencer::new(queue);
        sequencer.record(CommandOp::Barrier);
        sequencer.record(CommandOp::Barrier);
        assert_eq!(sequencer.pending_len(), 2);

        let resolver = RejectResolver;
        sequencer.handle(&resolver, HalRequest::SignalFence(1)).unwrap();
        assert_eq!(sequencer.pending_len(), 0);
        assert_eq!(submitted_ops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wait_fence_blocks_until_signaled() {
        let (queue, _) = counting_queue();
        let mut sequencer = Sequencer::new(queue);
        let resolver = RejectResolver;
        sequencer.record(CommandOp::Barrier);
        sequencer.handle(&resolver, HalRequest::WaitFence(5)).unwrap();
        assert_eq!(sequencer.pending_len(), 0);
    }

    #[test]
    fn dispatch_indirect_is_unimplemented() {
        let (queue, _) = counting_queue();
        let mut sequencer = Sequencer::new(queue);
        let resolver = RejectResolver;
        let allocator = rt_hal::HostAllocator::new(1);
        let buf = rt_hal::Allocator::allocate(&allocator, rt_hal::MemoryType::host_only(), rt_hal::BufferUsage::TRANSFER, 4).unwrap();
        let view = rt_hal::BufferView::new(buf, rt_core::Type::I32, rt_core::Shape::new(vec![1]), 0, 4).unwrap();
        let err = sequencer
            .handle(&resolver, HalRequest::DispatchIndirect { workload_buffer: view, workload: vec![], bindings: vec![] })
            .unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::Unimplemented);
    }
}
