//! `Stack` and `StackFrame` (spec component C7).

use rt_core::{ErrorBuilder, ErrorKind, Result};

use crate::value::Value;

/// One activation record: a fixed-size vector of value slots, a program
/// counter into the frame's bytecode, and a non-owning back-pointer to the
/// caller (`spec.md` §3).
pub struct StackFrame {
    slots: Vec<Value>,
    pc: usize,
    caller_depth: Option<usize>,
}

impl StackFrame {
    pub fn new(slot_count: usize, caller_depth: Option<usize>) -> StackFrame {
        StackFrame {
            slots: (0..slot_count).map(|_| Value::Empty).collect(),
            pc: 0,
            caller_depth,
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn caller_depth(&self) -> Option<usize> {
        self.caller_depth
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Invariant 2 (`spec.md` §3): slot indices must be less than the
    /// frame's slot count.
    fn check_slot(&self, index: u32) -> Result<usize> {
        let index = index as usize;
        if index >= self.slots.len() {
            return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                .with(format!("slot {index} out of range for frame with {} slots", self.slots.len()))
                .build());
        }
        Ok(index)
    }

    pub fn get(&self, index: u32) -> Result<&Value> {
        let index = self.check_slot(index)?;
        Ok(&self.slots[index])
    }

    pub fn set(&mut self, index: u32, value: Value) -> Result<()> {
        let index = self.check_slot(index)?;
        self.slots[index] = value;
        Ok(())
    }
}

/// LIFO of [`StackFrame`]s, capped at a configurable maximum depth
/// (`spec.md` §3 invariant 6; default `256` per `SPEC_FULL.md` §3.1).
pub struct Stack {
    frames: Vec<StackFrame>,
    max_depth: usize,
}

impl Stack {
    pub fn new(max_depth: usize) -> Stack {
        Stack { frames: Vec::new(), max_depth }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Pushes a new frame of `slot_count` slots, copying `inputs` into the
    /// leading slots in order (`spec.md` §4.6: "allocates a frame with slot
    /// capacity declared by the function signature, copies inputs into the
    /// designated input slots, sets PC to 0, and records the caller").
    pub fn push_frame(&mut self, slot_count: usize, inputs: Vec<Value>) -> Result<()> {
        if self.frames.len() >= self.max_depth {
            return Err(ErrorBuilder::new(ErrorKind::ResourceExhausted)
                .with(format!("stack depth limit of {} frames exceeded", self.max_depth))
                .build());
        }
        if inputs.len() > slot_count {
            return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("{} inputs do not fit in a frame of {slot_count} slots", inputs.len()))
                .build());
        }
        let caller_depth = if self.frames.is_empty() { None } else { Some(self.frames.len() - 1) };
        let mut frame = StackFrame::new(slot_count, caller_depth);
        for (i, value) in inputs.into_iter().enumerate() {
            frame.set(i as u32, value)?;
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Result<StackFrame> {
        self.frames.pop().ok_or_else(|| {
            ErrorBuilder::new(ErrorKind::FailedPrecondition)
                .with("pop_frame called on an empty stack".to_string())
                .build()
        })
    }

    pub fn top(&self) -> Result<&StackFrame> {
        self.frames.last().ok_or_else(|| {
            ErrorBuilder::new(ErrorKind::FailedPrecondition)
                .with("no active frame".to_string())
                .build()
        })
    }

    pub fn top_mut(&mut self) -> Result<&mut StackFrame> {
        self.frames.last_mut().ok_or_else(|| {
            ErrorBuilder::new(ErrorKind::FailedPrecondition)
                .with("no active frame".to_string())
                .build()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_restores_empty_stack() {
        let mut stack = Stack::new(4);
        stack.push_frame(2, vec![]).unwrap();
        assert_eq!(stack.depth(), 1);
        stack.pop_frame().unwrap();
        assert!(stack.is_empty());
    }

    #[test]
    fn exceeding_max_depth_is_resource_exhausted() {
        let mut stack = Stack::new(1);
        stack.push_frame(1, vec![]).unwrap();
        let err = stack.push_frame(1, vec![]).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::ResourceExhausted);
    }

    #[test]
    fn slot_access_out_of_range_is_rejected() {
        let mut stack = Stack::new(4);
        stack.push_frame(2, vec![]).unwrap();
        let frame = stack.top().unwrap();
        assert!(frame.get(5).is_err());
    }

    #[test]
    fn inputs_copied_into_leading_slots() {
        let mut stack = Stack::new(4);
        stack
            .push_frame(3, vec![Value::Scalar(crate::value::Scalar::I32(7))])
            .unwrap();
        let frame = stack.top().unwrap();
        assert_eq!(frame.get(0).unwrap().as_scalar().unwrap().as_i64(), 7);
        assert!(matches!(frame.get(1).unwrap(), Value::Empty));
    }
}
