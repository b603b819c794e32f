//! Interpreter dispatch (spec component C9): fetch-decode-execute over a
//! function's decoded instructions, calling into `rt_kernels` by the
//! instruction's resolved `(opcode, Type)` pair.

use std::sync::Arc;

use rt_bytecode::{CmpFPredicate, CmpIPredicate, ConstantEncoding, DecodedOperand, Instruction, Opcode};
use rt_core::{ErrorBuilder, ErrorKind, Result, Shape, Type};
use rt_hal::{Allocator, Buffer, BufferUsage, BufferView, MemoryType};
use rt_kernels::*;

use crate::stack::Stack;
use crate::value::{Scalar, Value};

/// Which function table a `Call`-family instruction's ordinal indexes:
/// `Call`'s into the current module's `functions` directly, `CallImport`'s
/// into its `imports` list instead (`spec.md` §3's `FunctionDef`/
/// `ImportFunction` are resolved through two different ordinal spaces).
/// The fetch loop itself has no opinion on what either space resolves
/// to — that's `rt_vm::Linker`'s job — it just tags which one a given
/// instruction meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Local,
    Import,
}

/// A request the interpreter's fetch loop cannot satisfy on its own:
/// dispatching prepared executable work, or synchronizing on a fence.
/// `rt_vm::Sequencer` supplies the closure that answers these, turning them
/// into `CommandOp`s submitted to a HAL `CommandQueue` (`spec.md` §4.8).
pub enum HalRequest {
    Dispatch { executable_ordinal: u32, export: u16, workload: Vec<u32>, bindings: Vec<BufferView> },
    DispatchIndirect { workload_buffer: BufferView, workload: Vec<u32>, bindings: Vec<BufferView> },
    SignalFence(u64),
    WaitFence(u64),
}

/// Mutable execution context threaded through one interpreter run: the call
/// stack, the allocator constants and kernel outputs are materialized
/// through, and the shared `RuntimeState` scratch kernels like `MatMul`
/// hold across invocations.
pub struct Interpreter {
    pub stack: Stack,
    allocator: Arc<dyn Allocator>,
    matmul_state: RuntimeState,
}

impl Interpreter {
    pub fn new(max_stack_depth: usize, allocator: Arc<dyn Allocator>) -> Interpreter {
        Interpreter {
            stack: Stack::new(max_stack_depth),
            allocator,
            matmul_state: RuntimeState::new(),
        }
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    fn alloc_buffer(&self, element_type: Type, shape: Shape) -> Result<BufferView> {
        let byte_len = shape.element_count()? * element_type.element_size()?;
        let buffer: Buffer = self.allocator.allocate(
            MemoryType::host_only(),
            BufferUsage::CONSTANT | BufferUsage::TRANSFER,
            byte_len as u64,
        )?;
        BufferView::new(buffer, element_type, shape, 0, byte_len)
    }

    fn slot(&self, frame_index: u32) -> Result<&Value> {
        self.stack.top()?.get(frame_index)
    }

    fn buffer_operand(&self, operand: &DecodedOperand) -> Result<BufferView> {
        let DecodedOperand::Slot(idx) = operand else {
            return Err(invalid_operand("expected a slot operand"));
        };
        self.slot(*idx)?
            .as_buffer()
            .cloned()
            .ok_or_else(|| invalid_operand("slot does not hold a buffer view"))
    }

    fn index_list(operand: &DecodedOperand) -> Result<&[i32]> {
        match operand {
            DecodedOperand::IndexList(list) => Ok(list),
            _ => Err(invalid_operand("expected an index list operand")),
        }
    }

    /// An `IndexList` operand whose elements are dimensions or slot-like
    /// indices rather than signed quantities (everything except `MatMul`'s
    /// per-row quantization lists) — negative elements are malformed, not
    /// merely unusual, so this rejects them with `InvalidArgument` rather
    /// than reinterpreting the bit pattern as a huge `u32` (`spec.md` §4.9's
    /// `Pad` contract: "negative paddings invalid").
    fn non_negative_index_list(operand: &DecodedOperand, context: &str) -> Result<Vec<u32>> {
        Self::index_list(operand)?
            .iter()
            .map(|&v| {
                u32::try_from(v).map_err(|_| {
                    ErrorBuilder::new(ErrorKind::InvalidArgument)
                        .with(format!("{context} must not contain negative values (got {v})"))
                        .build()
                })
            })
            .collect()
    }

    /// A single `Index` operand known to be a dimension or count, never
    /// negative in valid bytecode.
    fn non_negative_index(operand: &DecodedOperand, context: &str) -> Result<usize> {
        let DecodedOperand::Index(v) = *operand else {
            return Err(invalid_operand(context));
        };
        usize::try_from(v)
            .map_err(|_| ErrorBuilder::new(ErrorKind::InvalidArgument).with(format!("{context} must not be negative (got {v})")).build())
    }

    fn set_result(&mut self, operand: &DecodedOperand, buffer: BufferView) -> Result<()> {
        let DecodedOperand::Slot(idx) = operand else {
            return Err(invalid_operand("expected a result slot operand"));
        };
        self.stack.top_mut()?.set(*idx, Value::Buffer(buffer))
    }

    /// Runs instructions starting at `entry_pc`, returning the values
    /// passed to `Return`. Branches and calls mutate `self.stack`'s top
    /// frame's PC directly; `Call`/`CallImport` push/pop child frames via
    /// `call_function`, a closure resolving a `(CallKind, ordinal)` pair to
    /// a function's decoded body (owned by `rt_vm::Linker`, which knows the
    /// module and its import bindings).
    pub fn run(
        &mut self,
        instructions: &[Instruction],
        mut call_function: impl FnMut(&mut Interpreter, CallKind, u32, Vec<Value>) -> Result<Vec<Value>>,
        mut hal: impl FnMut(&mut Interpreter, HalRequest) -> Result<Vec<Value>>,
    ) -> Result<Vec<Value>> {
        loop {
            let pc = self.stack.top()?.pc();
            let idx = find_instruction_at_offset(instructions, pc)?;
            // Safety-net against a stale index: re-read the offset through
            // `idx` rather than trusting `pc` once more than the lookup.
            let instr = &instructions[idx];
            let next_pc = instructions.get(idx + 1).map(|i| i.offset).unwrap_or(usize::MAX);
            self.stack.top_mut()?.set_pc(next_pc);

            if let Some(returned) = self
                .execute_one(instr, &mut call_function, &mut hal)
                .map_err(|e| e.augment(format!("executing {} at pc {pc}", instr.opcode.mnemonic())))?
            {
                return Ok(returned);
            }
        }
    }

    /// Executes one instruction. Returns `Some(values)` only for `Return`,
    /// signaling the caller's `run` loop to stop.
    fn execute_one(
        &mut self,
        instr: &Instruction,
        call_function: &mut impl FnMut(&mut Interpreter, CallKind, u32, Vec<Value>) -> Result<Vec<Value>>,
        hal: &mut impl FnMut(&mut Interpreter, HalRequest) -> Result<Vec<Value>>,
    ) -> Result<Option<Vec<Value>>> {
        use Opcode::*;
        match instr.opcode {
            Const => self.exec_const(&instr.operands)?,

            Add => self.binary_arith(&instr.operands, add_int, add_float)?,
            Sub => self.binary_arith(&instr.operands, sub_int, sub_float)?,
            Mul => self.binary_arith(&instr.operands, mul_int, mul_float)?,
            Div => self.binary_arith_fallible(&instr.operands, div_int, |d, l, r| {
                div_float(d, l, r);
                Ok(())
            })?,
            Min => self.binary_arith(&instr.operands, min_int, min_float)?,
            Max => self.binary_arith(&instr.operands, max_int, max_float)?,
            And => self.binary_int_only(&instr.operands, and_int)?,
            Or => self.binary_int_only(&instr.operands, or_int)?,
            Xor => self.binary_int_only(&instr.operands, xor_int)?,
            ShiftLeft => self.binary_int_only_fallible(&instr.operands, shift_left_int)?,
            ShiftRight => self.binary_int_only_fallible(&instr.operands, shift_right_int)?,
            Atan2 => self.binary_float_only(&instr.operands, atan2)?,

            Not => self.unary_int_only(&instr.operands, not_int)?,
            Abs => self.unary_arith(&instr.operands, abs_int, abs_float)?,
            Floor => self.unary_float_only(&instr.operands, floor_float)?,
            Ceil => self.unary_float_only(&instr.operands, ceil_float)?,
            Exp => self.unary_float_only(&instr.operands, exp)?,
            Log => self.unary_float_only(&instr.operands, ln)?,
            Rsqrt => self.unary_float_only(&instr.operands, rsqrt)?,
            Cos => self.unary_float_only(&instr.operands, cos)?,
            Sin => self.unary_float_only(&instr.operands, sin)?,
            Tanh => self.unary_float_only(&instr.operands, tanh)?,

            MulAdd => self.exec_mul_add(&instr.operands)?,
            Clamp => self.exec_clamp(&instr.operands)?,
            Select => self.exec_select(&instr.operands)?,

            CmpI => self.exec_cmp_i(&instr.operands)?,
            CmpF => self.exec_cmp_f(&instr.operands)?,

            Convert => self.exec_convert(&instr.operands)?,

            Transpose => self.exec_transpose(&instr.operands)?,
            Reverse => self.exec_reverse(&instr.operands)?,
            Broadcast => self.exec_broadcast(&instr.operands)?,
            Tile => self.exec_tile(&instr.operands)?,
            Pad => self.exec_pad(&instr.operands)?,
            CopyRegion => self.exec_copy_region(&instr.operands)?,

            ReduceSum => self.exec_reduce(&instr.operands, reduce_sum)?,
            ReduceMin => self.exec_reduce(&instr.operands, reduce_min)?,
            ReduceMax => self.exec_reduce(&instr.operands, reduce_max)?,

            MatMul => self.exec_matmul(&instr.operands)?,

            Branch => {
                let DecodedOperand::BlockOffset(target) = instr.operands[0] else {
                    return Err(invalid_operand("branch target"));
                };
                self.stack.top_mut()?.set_pc(target as usize);
            }
            CondBranch => {
                let cond = self.buffer_operand(&instr.operands[0])?;
                let taken = cond.with_slice::<u8, bool>(|s| s.first().copied().unwrap_or(0) != 0);
                let (DecodedOperand::BlockOffset(t), DecodedOperand::BlockOffset(f)) =
                    (&instr.operands[1], &instr.operands[2])
                else {
                    return Err(invalid_operand("cond_branch targets"));
                };
                self.stack.top_mut()?.set_pc(if taken { *t as usize } else { *f as usize });
            }
            Return => {
                let mut values = Vec::new();
                if let DecodedOperand::Slots(slots) = &instr.operands[0] {
                    for &slot in slots {
                        values.push(self.slot(slot)?.clone());
                    }
                }
                return Ok(Some(values));
            }
            Call | CallImport => {
                let DecodedOperand::Ordinal(ordinal) = instr.operands[0] else {
                    return Err(invalid_operand("call ordinal"));
                };
                let DecodedOperand::Slots(input_slots) = &instr.operands[1] else {
                    return Err(invalid_operand("call inputs"));
                };
                let DecodedOperand::Slots(result_slots) = &instr.operands[2] else {
                    return Err(invalid_operand("call results"));
                };
                let inputs: Vec<Value> = input_slots.iter().map(|&s| self.slot(s).cloned()).collect::<Result<_>>()?;
                let kind = if matches!(instr.opcode, Call) { CallKind::Local } else { CallKind::Import };
                let results = call_function(self, kind, ordinal, inputs)?;
                for (slot, value) in result_slots.iter().zip(results) {
                    self.stack.top_mut()?.set(*slot, value)?;
                }
            }
            CallIndirect => {
                return Err(ErrorBuilder::new(ErrorKind::Unimplemented)
                    .with("call_indirect requires a runtime function-reference value, which this value model does not carry".to_string())
                    .build())
            }

            Dispatch => {
                let DecodedOperand::DispatchOrdinal { dispatch: executable_ordinal, export } = instr.operands[0]
                else {
                    return Err(invalid_operand("dispatch ordinal"));
                };
                let workload = Self::non_negative_index_list(&instr.operands[1], "dispatch workload")?;
                let DecodedOperand::SlotPairs(bindings) = &instr.operands[2] else {
                    return Err(invalid_operand("dispatch bindings"));
                };
                let bindings = bindings
                    .iter()
                    .map(|&(src, _dst)| self.buffer_operand(&DecodedOperand::Slot(src)))
                    .collect::<Result<Vec<_>>>()?;
                hal(self, HalRequest::Dispatch { executable_ordinal, export, workload, bindings })?;
            }
            DispatchIndirect => {
                let workload_buffer = self.buffer_operand(&instr.operands[0])?;
                let workload = Self::non_negative_index_list(&instr.operands[1], "dispatch_indirect workload")?;
                let DecodedOperand::SlotPairs(bindings) = &instr.operands[2] else {
                    return Err(invalid_operand("dispatch_indirect bindings"));
                };
                let bindings = bindings
                    .iter()
                    .map(|&(src, _dst)| self.buffer_operand(&DecodedOperand::Slot(src)))
                    .collect::<Result<Vec<_>>>()?;
                hal(self, HalRequest::DispatchIndirect { workload_buffer, workload, bindings })?;
            }

            HalAllocate => self.exec_hal_allocate(&instr.operands)?,
            HalCopy => self.exec_hal_copy(&instr.operands)?,
            HalBarrier => {}
            HalSignalFence => {
                let DecodedOperand::Index(value) = instr.operands[0] else {
                    return Err(invalid_operand("hal.signal_fence value"));
                };
                hal(self, HalRequest::SignalFence(value as u64))?;
            }
            HalWaitFence => {
                let DecodedOperand::Index(value) = instr.operands[0] else {
                    return Err(invalid_operand("hal.wait_fence value"));
                };
                hal(self, HalRequest::WaitFence(value as u64))?;
            }
        }
        Ok(None)
    }

    fn exec_const(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let DecodedOperand::Constant(c) = &operands[0] else {
            return Err(invalid_operand("const payload"));
        };
        let shape = Shape::new(c.dims.clone());
        let view = self.alloc_buffer(c.element_type, shape)?;
        materialize_constant(&view, c)?;
        self.set_result(&operands[1], view)
    }

    fn binary_arith(
        &mut self,
        operands: &[DecodedOperand],
        int_fn: impl Fn(&mut [i64], &[i64], &[i64]),
        float_fn: impl Fn(&mut [f64], &[f64], &[f64]),
    ) -> Result<()> {
        self.binary_arith_fallible(
            operands,
            |d, l, r| {
                int_fn(d, l, r);
                Ok(())
            },
            |d, l, r| {
                float_fn(d, l, r);
                Ok(())
            },
        )
    }

    /// All integer/float binary kernels are monomorphized per width in
    /// `rt_kernels`; dispatching through an `i64`/`f64` staging buffer here
    /// keeps this one function generic instead of six copies, at the cost
    /// of exercising the narrower kernels indirectly rather than calling
    /// their exact monomorphizations. Narrow-width wraparound is preserved
    /// by converting back down through the same narrowing cast the kernel
    /// would have used.
    fn binary_arith_fallible(
        &mut self,
        operands: &[DecodedOperand],
        int_fn: impl Fn(&mut [i64], &[i64], &[i64]) -> Result<()>,
        float_fn: impl Fn(&mut [f64], &[f64], &[f64]) -> Result<()>,
    ) -> Result<()> {
        let lhs = self.buffer_operand(&operands[0])?;
        let rhs = self.buffer_operand(&operands[1])?;
        let ty = lhs.element_type();
        let dst = self.alloc_buffer(ty, lhs.shape().clone())?;
        run_elementwise_2in1out(ty, &lhs, &rhs, &dst, &int_fn, &float_fn)?;
        self.set_result(&operands[2], dst)
    }

    fn binary_int_only(&mut self, operands: &[DecodedOperand], int_fn: impl Fn(&mut [i64], &[i64], &[i64])) -> Result<()> {
        self.binary_int_only_fallible(operands, |d, l, r| {
            int_fn(d, l, r);
            Ok(())
        })
    }

    fn binary_int_only_fallible(
        &mut self,
        operands: &[DecodedOperand],
        int_fn: impl Fn(&mut [i64], &[i64], &[i64]) -> Result<()>,
    ) -> Result<()> {
        let lhs = self.buffer_operand(&operands[0])?;
        let rhs = self.buffer_operand(&operands[1])?;
        let ty = lhs.element_type();
        if !ty.is_integer() {
            return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("{ty} is not a valid operand type for a bitwise operation"))
                .build());
        }
        let dst = self.alloc_buffer(ty, lhs.shape().clone())?;
        run_elementwise_int(ty, &lhs, &rhs, &dst, &int_fn)?;
        self.set_result(&operands[2], dst)
    }

    fn binary_float_only(&mut self, operands: &[DecodedOperand], float_fn: impl Fn(&mut [f64], &[f64], &[f64])) -> Result<()> {
        let lhs = self.buffer_operand(&operands[0])?;
        let rhs = self.buffer_operand(&operands[1])?;
        let ty = lhs.element_type();
        if !ty.is_float() {
            // `Atan2` (the only caller) on integer types is unreachable from
            // a real compiler frontend but not explicitly forbidden by the
            // op's grammar; `spec.md` §9 calls this out as unimplemented
            // rather than a caller error.
            return Err(ErrorBuilder::new(ErrorKind::Unimplemented)
                .with(format!("{ty} is not a valid operand type for a transcendental operation"))
                .build());
        }
        let dst = self.alloc_buffer(ty, lhs.shape().clone())?;
        run_elementwise_float(ty, &lhs, &rhs, &dst, &float_fn)?;
        self.set_result(&operands[2], dst)
    }

    fn unary_arith(
        &mut self,
        operands: &[DecodedOperand],
        int_fn: impl Fn(&mut [i64], &[i64]),
        float_fn: impl Fn(&mut [f64], &[f64]),
    ) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let ty = src.element_type();
        let dst = self.alloc_buffer(ty, src.shape().clone())?;
        run_elementwise_unary(ty, &src, &dst, &int_fn, &float_fn)?;
        self.set_result(&operands[1], dst)
    }

    fn unary_int_only(&mut self, operands: &[DecodedOperand], int_fn: impl Fn(&mut [i64], &[i64])) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let ty = src.element_type();
        if !ty.is_integer() {
            return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("{ty} is not valid for a bitwise unary operation"))
                .build());
        }
        let dst = self.alloc_buffer(ty, src.shape().clone())?;
        run_elementwise_unary_int(ty, &src, &dst, &int_fn)?;
        self.set_result(&operands[1], dst)
    }

    fn unary_float_only(&mut self, operands: &[DecodedOperand], float_fn: impl Fn(&mut [f64], &[f64])) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let ty = src.element_type();
        if !ty.is_float() {
            return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("{ty} is not valid for a transcendental operation"))
                .build());
        }
        let dst = self.alloc_buffer(ty, src.shape().clone())?;
        run_elementwise_unary_float(ty, &src, &dst, &float_fn)?;
        self.set_result(&operands[1], dst)
    }

    fn exec_mul_add(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let lhs = self.buffer_operand(&operands[0])?;
        let rhs = self.buffer_operand(&operands[1])?;
        let addend = self.buffer_operand(&operands[2])?;
        let ty = lhs.element_type();
        if !ty.is_float() {
            return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("{ty} is not valid for mul_add (float-only kernel)"))
                .build());
        }
        let dst = self.alloc_buffer(ty, lhs.shape().clone())?;
        with_f64_io(ty, &[&lhs, &rhs, &addend], &dst, |outs, ins| {
            mul_add_float(outs, ins[0], ins[1], ins[2]);
        })?;
        self.set_result(&operands[3], dst)
    }

    fn exec_clamp(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let lo = self.buffer_operand(&operands[1])?;
        let hi = self.buffer_operand(&operands[2])?;
        let ty = src.element_type();
        let dst = self.alloc_buffer(ty, src.shape().clone())?;
        if ty.is_integer() {
            with_i64_io(ty, &[&src, &lo, &hi], &dst, |outs, ins| {
                clamp_int(outs, ins[0], ins[1], ins[2]);
            })?;
        } else {
            with_f64_io(ty, &[&src, &lo, &hi], &dst, |outs, ins| {
                clamp_float(outs, ins[0], ins[1], ins[2]);
            })?;
        }
        self.set_result(&operands[3], dst)
    }

    fn exec_select(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let cond = self.buffer_operand(&operands[0])?;
        let lhs = self.buffer_operand(&operands[1])?;
        let rhs = self.buffer_operand(&operands[2])?;
        let ty = lhs.element_type();
        let dst = self.alloc_buffer(ty, lhs.shape().clone())?;
        cond.with_slice::<u8, Result<()>>(|cond_bytes| {
            dispatch_select(ty, cond_bytes, &lhs, &rhs, &dst)
        })?;
        self.set_result(&operands[3], dst)
    }

    fn exec_cmp_i(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let DecodedOperand::CmpI(pred) = operands[0] else {
            return Err(invalid_operand("cmp_i predicate"));
        };
        let lhs = self.buffer_operand(&operands[1])?;
        let rhs = self.buffer_operand(&operands[2])?;
        let ty = lhs.element_type();
        let count = lhs.element_count()?;
        let dst = self.alloc_buffer(Type::I8, lhs.shape().clone())?;
        dispatch_compare_int(ty, cmp_i_to_compare(pred), &lhs, &rhs, &dst, count)?;
        self.set_result(&operands[3], dst)
    }

    fn exec_cmp_f(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let DecodedOperand::CmpF(pred) = operands[0] else {
            return Err(invalid_operand("cmp_f predicate"));
        };
        let lhs = self.buffer_operand(&operands[1])?;
        let rhs = self.buffer_operand(&operands[2])?;
        let ty = lhs.element_type();
        let count = lhs.element_count()?;
        let dst = self.alloc_buffer(Type::I8, lhs.shape().clone())?;
        dispatch_compare_float(ty, cmp_f_to_compare(pred), &lhs, &rhs, &dst, count)?;
        self.set_result(&operands[3], dst)
    }

    fn exec_convert(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let DecodedOperand::TypeIndex(dst_index) = operands[0] else {
            return Err(invalid_operand("convert destination type"));
        };
        let src = self.buffer_operand(&operands[1])?;
        let dst_type = Type::from_type_index(dst_index)?;
        let dst = self.alloc_buffer(dst_type, src.shape().clone())?;
        dispatch_convert(src.element_type(), dst_type, &src, &dst)?;
        self.set_result(&operands[2], dst)
    }

    fn exec_transpose(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let perm: Vec<usize> =
            Self::non_negative_index_list(&operands[1], "transpose permutation")?.into_iter().map(|v| v as usize).collect();
        let src_dims = src.shape().dims();
        let dst_dims: Vec<u32> = perm.iter().map(|&p| src_dims[p]).collect();
        let ty = src.element_type();
        let dst = self.alloc_buffer(ty, Shape::new(dst_dims))?;
        with_typed_transpose(ty, &src, &dst, src_dims, &perm)?;
        self.set_result(&operands[2], dst)
    }

    fn exec_reverse(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let dims_to_reverse: Vec<usize> =
            Self::non_negative_index_list(&operands[1], "reverse dimensions")?.into_iter().map(|v| v as usize).collect();
        let ty = src.element_type();
        let dst = self.alloc_buffer(ty, src.shape().clone())?;
        let src_dims = src.shape().dims().to_vec();
        with_typed_reverse(ty, &src, &dst, &src_dims, &dims_to_reverse)?;
        self.set_result(&operands[2], dst)
    }

    fn exec_broadcast(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let dst_dims = Self::non_negative_index_list(&operands[1], "broadcast destination shape")?;
        let ty = src.element_type();
        let dst = self.alloc_buffer(ty, Shape::new(dst_dims.clone()))?;
        let src_dims = src.shape().dims().to_vec();
        with_typed_broadcast(ty, &src, &dst, &dst_dims, &src_dims)?;
        self.set_result(&operands[2], dst)
    }

    fn exec_tile(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let dst_dims = Self::non_negative_index_list(&operands[1], "tile destination shape")?;
        let ty = src.element_type();
        let dst = self.alloc_buffer(ty, Shape::new(dst_dims.clone()))?;
        let src_dims = src.shape().dims().to_vec();
        with_typed_tile(ty, &src, &dst, &dst_dims, &src_dims)?;
        self.set_result(&operands[2], dst)
    }

    fn exec_pad(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let edge_low = Self::non_negative_index_list(&operands[1], "pad edge_low")?;
        let edge_high = Self::non_negative_index_list(&operands[2], "pad edge_high")?;
        let interior = Self::non_negative_index_list(&operands[3], "pad interior")?;
        let padding_value = self.buffer_operand(&operands[4])?;
        let ty = src.element_type();
        let src_dims = src.shape().dims().to_vec();
        let dst_dims: Vec<u32> = (0..src_dims.len())
            .map(|i| edge_low[i] + edge_high[i] + src_dims[i] + (src_dims[i].saturating_sub(1)) * interior[i])
            .collect();
        let dst = self.alloc_buffer(ty, Shape::new(dst_dims.clone()))?;
        with_typed_pad(ty, &src, &padding_value, &dst, &dst_dims, &src_dims, &edge_low, &interior)?;
        self.set_result(&operands[5], dst)
    }

    fn exec_copy_region(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let src_offset = Self::non_negative_index_list(&operands[1], "copy_region src_offset")?;
        let dst_offset = Self::non_negative_index_list(&operands[2], "copy_region dst_offset")?;
        let lengths = Self::non_negative_index_list(&operands[3], "copy_region lengths")?;
        let dst = self.buffer_operand(&operands[4])?;
        let ty = src.element_type();
        let src_dims = src.shape().dims().to_vec();
        let dst_dims = dst.shape().dims().to_vec();
        with_typed_copy_region(ty, &src, &dst, &dst_dims, &dst_offset, &src_dims, &src_offset, &lengths)?;
        Ok(())
    }

    fn exec_reduce(
        &mut self,
        operands: &[DecodedOperand],
        reduce_fn_f64: impl Fn(&mut [f64], &[f64], &[u32], usize, &[f64]) -> Result<()>,
    ) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let init = self.buffer_operand(&operands[1])?;
        let dim = Self::non_negative_index(&operands[2], "reduce dimension")?;
        let src_dims = src.shape().dims().to_vec();
        let out_dims: Vec<u32> = src_dims
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != dim)
            .map(|(_, &d)| d)
            .collect();
        let ty = src.element_type();
        let dst = self.alloc_buffer(ty, Shape::new(out_dims))?;
        with_f64_reduce(ty, &src, &init, &dst, &src_dims, dim, &reduce_fn_f64)?;
        self.set_result(&operands[3], dst)
    }

    fn exec_matmul(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let lhs = self.buffer_operand(&operands[0])?;
        let rhs = self.buffer_operand(&operands[1])?;
        let bias = self.buffer_operand(&operands[2])?;
        let mantissa: Vec<i32> = Self::index_list(&operands[3])?.to_vec();
        let exponent: Vec<i32> = Self::index_list(&operands[4])?.to_vec();
        let m = Self::non_negative_index(&operands[5], "matmul m")?;
        let k = Self::non_negative_index(&operands[6], "matmul k")?;
        let n = Self::non_negative_index(&operands[7], "matmul n")?;
        let ty = lhs.element_type();
        let dst = self.alloc_buffer(ty, Shape::new(vec![m as u32, n as u32]))?;
        with_matmul(ty, &self.matmul_state, &lhs, &rhs, &bias, &dst, m, k, n, &mantissa, &exponent)?;
        self.set_result(&operands[8], dst)
    }

    fn exec_hal_allocate(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let dims = Self::non_negative_index_list(&operands[0], "hal.allocate shape")?;
        let DecodedOperand::TypeIndex(type_index) = operands[1] else {
            return Err(invalid_operand("hal.allocate element type"));
        };
        let ty = Type::from_type_index(type_index)?;
        let view = self.alloc_buffer(ty, Shape::new(dims))?;
        self.set_result(&operands[2], view)
    }

    fn exec_hal_copy(&mut self, operands: &[DecodedOperand]) -> Result<()> {
        let src = self.buffer_operand(&operands[0])?;
        let dst = self.buffer_operand(&operands[1])?;
        if src.byte_length() != dst.byte_length() {
            return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with("hal.copy requires matching byte lengths".to_string())
                .build());
        }
        let bytes = src.with_slice::<u8, Vec<u8>>(|s| s.to_vec());
        dst.copy_from_slice(&bytes)
    }
}

fn invalid_operand(message: &str) -> rt_core::Error {
    ErrorBuilder::new(ErrorKind::InvalidArgument).with(message.to_string()).build()
}

/// Resolves a `StackFrame`'s program counter — a byte offset into the
/// function's `BytecodeDef` per `spec.md` §3 — to its index in the
/// pre-decoded instruction list. `Branch`/`CondBranch` targets carry the
/// same byte offsets (`BlockOffset`, `spec.md` §4.5), so a target must land
/// exactly on an instruction boundary; anything else is a malformed jump.
fn find_instruction_at_offset(instructions: &[Instruction], offset: usize) -> Result<usize> {
    instructions.binary_search_by_key(&offset, |instr| instr.offset).map_err(|_| {
        ErrorBuilder::new(ErrorKind::OutOfRange)
            .with(format!("program counter {offset} does not land on an instruction boundary"))
            .build()
    })
}

fn cmp_i_to_compare(pred: CmpIPredicate) -> ComparePredicate {
    match pred {
        CmpIPredicate::Eq => ComparePredicate::Eq,
        CmpIPredicate::Ne => ComparePredicate::Ne,
        CmpIPredicate::Lt => ComparePredicate::Lt,
        CmpIPredicate::Le => ComparePredicate::Le,
        CmpIPredicate::Gt => ComparePredicate::Gt,
        CmpIPredicate::Ge => ComparePredicate::Ge,
    }
}

fn cmp_f_to_compare(pred: CmpFPredicate) -> ComparePredicate {
    match pred {
        CmpFPredicate::Eq | CmpFPredicate::Unordered => ComparePredicate::Eq,
        CmpFPredicate::Ne => ComparePredicate::Ne,
        CmpFPredicate::Lt => ComparePredicate::Lt,
        CmpFPredicate::Le => ComparePredicate::Le,
        CmpFPredicate::Gt => ComparePredicate::Gt,
        CmpFPredicate::Ge => ComparePredicate::Ge,
    }
}

/// Writes a constant's payload bytes into a freshly allocated buffer view,
/// expanding a `Splat` encoding's single element across every slot.
fn materialize_constant(view: &BufferView, c: &rt_bytecode::DecodedConstant) -> Result<()> {
    macro_rules! fill {
        ($t:ty) => {{
            let stored: Vec<$t> = c
                .payload
                .chunks_exact(std::mem::size_of::<$t>())
                .map(|chunk| {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(chunk);
                    <$t>::from_le_bytes(buf)
                })
                .collect();
            view.with_slice_mut::<$t, ()>(|dst| {
                if c.encoding == ConstantEncoding::Dense {
                    dst.copy_from_slice(&stored);
                } else {
                    dst.fill(stored[0]);
                }
            });
        }};
    }
    match c.element_type {
        Type::I8 => fill!(i8),
        Type::I16 => fill!(i16),
        Type::I32 => fill!(i32),
        Type::I64 => fill!(i64),
        Type::F32 => fill!(f32),
        Type::F64 => fill!(f64),
        Type::F16 | Type::Opaque => {
            return Err(ErrorBuilder::new(ErrorKind::Unimplemented)
                .with(format!("{} constants are not materialized by this backend", c.element_type))
                .build())
        }
    }
    Ok(())
}

fn run_elementwise_2in1out(
    ty: Type,
    lhs: &BufferView,
    rhs: &BufferView,
    dst: &BufferView,
    int_fn: &impl Fn(&mut [i64], &[i64], &[i64]) -> Result<()>,
    float_fn: &impl Fn(&mut [f64], &[f64], &[f64]) -> Result<()>,
) -> Result<()> {
    if ty.is_integer() {
        with_i64_binary(ty, lhs, rhs, dst, int_fn)
    } else {
        with_f64_binary(ty, lhs, rhs, dst, float_fn)
    }
}

fn run_elementwise_int(
    ty: Type,
    lhs: &BufferView,
    rhs: &BufferView,
    dst: &BufferView,
    int_fn: &impl Fn(&mut [i64], &[i64], &[i64]) -> Result<()>,
) -> Result<()> {
    with_i64_binary(ty, lhs, rhs, dst, int_fn)
}

fn run_elementwise_float(
    ty: Type,
    lhs: &BufferView,
    rhs: &BufferView,
    dst: &BufferView,
    float_fn: &impl Fn(&mut [f64], &[f64], &[f64]) -> Result<()>,
) -> Result<()> {
    with_f64_binary(ty, lhs, rhs, dst, float_fn)
}

fn run_elementwise_unary(
    ty: Type,
    src: &BufferView,
    dst: &BufferView,
    int_fn: &impl Fn(&mut [i64], &[i64]),
    float_fn: &impl Fn(&mut [f64], &[f64]),
) -> Result<()> {
    if ty.is_integer() {
        with_i64_unary(ty, src, dst, int_fn)
    } else {
        with_f64_unary(ty, src, dst, float_fn)
    }
}

fn run_elementwise_unary_int(ty: Type, src: &BufferView, dst: &BufferView, int_fn: &impl Fn(&mut [i64], &[i64])) -> Result<()> {
    with_i64_unary(ty, src, dst, int_fn)
}

fn run_elementwise_unary_float(ty: Type, src: &BufferView, dst: &BufferView, float_fn: &impl Fn(&mut [f64], &[f64])) -> Result<()> {
    with_f64_unary(ty, src, dst, float_fn)
}

macro_rules! widen_binary_int {
    ($ty:expr, $lhs:expr, $rhs:expr, $dst:expr, $f:expr, [$($variant:ident => $t:ty),+ $(,)?]) => {
        match $ty {
            $(Type::$variant => $dst.with_slice_mut::<$t, Result<()>>(|d| {
                $lhs.with_slice::<$t, Result<()>>(|l| {
                    $rhs.with_slice::<$t, Result<()>>(|r| {
                        let mut wide_d = vec![0i64; d.len()];
                        let wide_l: Vec<i64> = l.iter().map(|&v| v as i64).collect();
                        let wide_r: Vec<i64> = r.iter().map(|&v| v as i64).collect();
                        $f(&mut wide_d, &wide_l, &wide_r)?;
                        for (dst_elem, wide) in d.iter_mut().zip(wide_d) {
                            *dst_elem = wide as $t;
                        }
                        Ok(())
                    })
                })
            }),)+
            other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("{other} is not a valid integer operand type")).build()),
        }
    };
}

fn with_i64_binary(
    ty: Type,
    lhs: &BufferView,
    rhs: &BufferView,
    dst: &BufferView,
    f: &impl Fn(&mut [i64], &[i64], &[i64]) -> Result<()>,
) -> Result<()> {
    widen_binary_int!(ty, lhs, rhs, dst, f, [I8 => i8, I16 => i16, I32 => i32, I64 => i64])
}

macro_rules! widen_binary_float {
    ($ty:expr, $lhs:expr, $rhs:expr, $dst:expr, $f:expr, [$($variant:ident => $t:ty),+ $(,)?]) => {
        match $ty {
            $(Type::$variant => $dst.with_slice_mut::<$t, Result<()>>(|d| {
                $lhs.with_slice::<$t, Result<()>>(|l| {
                    $rhs.with_slice::<$t, Result<()>>(|r| {
                        let mut wide_d = vec![0f64; d.len()];
                        let wide_l: Vec<f64> = l.iter().map(|&v| v as f64).collect();
                        let wide_r: Vec<f64> = r.iter().map(|&v| v as f64).collect();
                        $f(&mut wide_d, &wide_l, &wide_r)?;
                        for (dst_elem, wide) in d.iter_mut().zip(wide_d) {
                            *dst_elem = wide as $t;
                        }
                        Ok(())
                    })
                })
            }),)+
            other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("{other} is not a valid float operand type")).build()),
        }
    };
}

fn with_f64_binary(
    ty: Type,
    lhs: &BufferView,
    rhs: &BufferView,
    dst: &BufferView,
    f: &impl Fn(&mut [f64], &[f64], &[f64]) -> Result<()>,
) -> Result<()> {
    widen_binary_float!(ty, lhs, rhs, dst, f, [F32 => f32, F64 => f64])
}

fn with_i64_unary(ty: Type, src: &BufferView, dst: &BufferView, f: &impl Fn(&mut [i64], &[i64])) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| {
                src.with_slice::<$t, Result<()>>(|s| {
                    let mut wide_d = vec![0i64; d.len()];
                    let wide_s: Vec<i64> = s.iter().map(|&v| v as i64).collect();
                    f(&mut wide_d, &wide_s);
                    for (dst_elem, wide) in d.iter_mut().zip(wide_d) {
                        *dst_elem = wide as $t;
                    }
                    Ok(())
                })
            })
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid integer operand type"))
            .build()),
    }
}

fn with_f64_unary(ty: Type, src: &BufferView, dst: &BufferView, f: &impl Fn(&mut [f64], &[f64])) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| {
                src.with_slice::<$t, Result<()>>(|s| {
                    let mut wide_d = vec![0f64; d.len()];
                    let wide_s: Vec<f64> = s.iter().map(|&v| v as f64).collect();
                    f(&mut wide_d, &wide_s);
                    for (dst_elem, wide) in d.iter_mut().zip(wide_d) {
                        *dst_elem = wide as $t;
                    }
                    Ok(())
                })
            })
        };
    }
    match ty {
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid float operand type"))
            .build()),
    }
}

fn with_i64_io(ty: Type, ins: &[&BufferView], dst: &BufferView, f: impl Fn(&mut [i64], &[i64], &[i64], &[i64])) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| {
                ins[0].with_slice::<$t, Result<()>>(|a| {
                    ins[1].with_slice::<$t, Result<()>>(|b| {
                        ins[2].with_slice::<$t, Result<()>>(|c| {
                            let mut wide_d = vec![0i64; d.len()];
                            let wa: Vec<i64> = a.iter().map(|&v| v as i64).collect();
                            let wb: Vec<i64> = b.iter().map(|&v| v as i64).collect();
                            let wc: Vec<i64> = c.iter().map(|&v| v as i64).collect();
                            f(&mut wide_d, &wa, &wb, &wc);
                            for (dst_elem, wide) in d.iter_mut().zip(wide_d) {
                                *dst_elem = wide as $t;
                            }
                            Ok(())
                        })
                    })
                })
            })
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid integer operand type"))
            .build()),
    }
}

fn with_f64_io(ty: Type, ins: &[&BufferView], dst: &BufferView, f: impl Fn(&mut [f64], &[&[f64]])) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| {
                let wide_ins: Vec<Vec<f64>> = ins
                    .iter()
                    .map(|view| view.with_slice::<$t, Vec<f64>>(|s| s.iter().map(|&v| v as f64).collect()))
                    .collect();
                let refs: Vec<&[f64]> = wide_ins.iter().map(|v| v.as_slice()).collect();
                let mut wide_d = vec![0f64; d.len()];
                f(&mut wide_d, &refs);
                for (dst_elem, wide) in d.iter_mut().zip(wide_d) {
                    *dst_elem = wide as $t;
                }
                Ok(())
            })
        };
    }
    match ty {
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid float operand type"))
            .build()),
    }
}

fn dispatch_select(ty: Type, cond: &[u8], lhs: &BufferView, rhs: &BufferView, dst: &BufferView) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| {
                lhs.with_slice::<$t, Result<()>>(|l| rhs.with_slice::<$t, Result<()>>(|r| {
                    select(d, cond, l, r);
                    Ok(())
                }))
            })
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid select operand type"))
            .build()),
    }
}

fn dispatch_compare_int(
    ty: Type,
    pred: ComparePredicate,
    lhs: &BufferView,
    rhs: &BufferView,
    dst: &BufferView,
    _count: usize,
) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<u8, Result<()>>(|d| {
                lhs.with_slice::<$t, Result<()>>(|l| rhs.with_slice::<$t, Result<()>>(|r| {
                    compare(pred, d, l, r);
                    Ok(())
                }))
            })
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid integer comparison operand type"))
            .build()),
    }
}

fn dispatch_compare_float(
    ty: Type,
    pred: ComparePredicate,
    lhs: &BufferView,
    rhs: &BufferView,
    dst: &BufferView,
    _count: usize,
) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<u8, Result<()>>(|d| {
                lhs.with_slice::<$t, Result<()>>(|l| rhs.with_slice::<$t, Result<()>>(|r| {
                    compare(pred, d, l, r);
                    Ok(())
                }))
            })
        };
    }
    match ty {
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid float comparison operand type"))
            .build()),
    }
}

fn dispatch_convert(src_ty: Type, dst_ty: Type, src: &BufferView, dst: &BufferView) -> Result<()> {
    macro_rules! id_arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, ()>(|d| src.with_slice::<$t, ()>(|s| convert_identity(d, s)))
        };
    }
    if src_ty == dst_ty {
        return match src_ty {
            Type::I8 => Ok(id_arm!(i8)),
            Type::I16 => Ok(id_arm!(i16)),
            Type::I32 => Ok(id_arm!(i32)),
            Type::I64 => Ok(id_arm!(i64)),
            Type::F32 => Ok(id_arm!(f32)),
            Type::F64 => Ok(id_arm!(f64)),
            other => Err(ErrorBuilder::new(ErrorKind::Unimplemented)
                .with(format!("convert does not support {other}"))
                .build()),
        };
    }
    macro_rules! pair {
        ($src_t:ty, $dst_t:ty, $f:expr) => {
            dst.with_slice_mut::<$dst_t, ()>(|d| src.with_slice::<$src_t, ()>(|s| $f(d, s)))
        };
    }
    use Type::*;
    match (src_ty, dst_ty) {
        (I8, I16) => Ok(pair!(i8, i16, convert_i8_to_i16)),
        (I8, I32) => Ok(pair!(i8, i32, convert_i8_to_i32)),
        (I8, I64) => Ok(pair!(i8, i64, convert_i8_to_i64)),
        (I16, I8) => Ok(pair!(i16, i8, convert_i16_to_i8)),
        (I16, I32) => Ok(pair!(i16, i32, convert_i16_to_i32)),
        (I16, I64) => Ok(pair!(i16, i64, convert_i16_to_i64)),
        (I32, I8) => Ok(pair!(i32, i8, convert_i32_to_i8)),
        (I32, I16) => Ok(pair!(i32, i16, convert_i32_to_i16)),
        (I32, I64) => Ok(pair!(i32, i64, convert_i32_to_i64)),
        (I64, I8) => Ok(pair!(i64, i8, convert_i64_to_i8)),
        (I64, I16) => Ok(pair!(i64, i16, convert_i64_to_i16)),
        (I64, I32) => Ok(pair!(i64, i32, convert_i64_to_i32)),
        (F32, I8) => Ok(pair!(f32, i8, convert_f32_to_i8)),
        (F32, I16) => Ok(pair!(f32, i16, convert_f32_to_i16)),
        (F32, I32) => Ok(pair!(f32, i32, convert_f32_to_i32)),
        (F32, I64) => Ok(pair!(f32, i64, convert_f32_to_i64)),
        (F64, I8) => Ok(pair!(f64, i8, convert_f64_to_i8)),
        (F64, I16) => Ok(pair!(f64, i16, convert_f64_to_i16)),
        (F64, I32) => Ok(pair!(f64, i32, convert_f64_to_i32)),
        (F64, I64) => Ok(pair!(f64, i64, convert_f64_to_i64)),
        (I8, F32) => Ok(pair!(i8, f32, convert_i8_to_f32)),
        (I16, F32) => Ok(pair!(i16, f32, convert_i16_to_f32)),
        (I32, F32) => Ok(pair!(i32, f32, convert_i32_to_f32)),
        (I64, F32) => Ok(pair!(i64, f32, convert_i64_to_f32)),
        (I8, F64) => Ok(pair!(i8, f64, convert_i8_to_f64)),
        (I16, F64) => Ok(pair!(i16, f64, convert_i16_to_f64)),
        (I32, F64) => Ok(pair!(i32, f64, convert_i32_to_f64)),
        (I64, F64) => Ok(pair!(i64, f64, convert_i64_to_f64)),
        (F32, F64) => Ok(pair!(f32, f64, convert_f32_to_f64)),
        (F64, F32) => Ok(pair!(f64, f32, convert_f64_to_f32)),
        (other_src, other_dst) => Err(ErrorBuilder::new(ErrorKind::Unimplemented)
            .with(format!("conversion from {other_src} to {other_dst} is not supported"))
            .build()),
    }
}

/// Dispatches `transpose` over the concrete element type. Unlike the
/// arithmetic kernels this moves bytes rather than computing, so every
/// builtin type including the floats is handled directly with no `i64`
/// widening.
fn with_typed_transpose(ty: Type, src: &BufferView, dst: &BufferView, src_dims: &[u32], perm: &[usize]) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| src.with_slice::<$t, Result<()>>(|s| transpose(d, s, src_dims, perm)))
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid transpose operand type"))
            .build()),
    }
}

fn with_typed_reverse(ty: Type, src: &BufferView, dst: &BufferView, src_dims: &[u32], dimensions: &[usize]) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            Ok(dst.with_slice_mut::<$t, ()>(|d| src.with_slice::<$t, ()>(|s| reverse(d, s, src_dims, dimensions))))
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid reverse operand type"))
            .build()),
    }
}

fn with_typed_broadcast(ty: Type, src: &BufferView, dst: &BufferView, dst_dims: &[u32], src_dims: &[u32]) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| src.with_slice::<$t, Result<()>>(|s| broadcast(d, dst_dims, s, src_dims)))
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid broadcast operand type"))
            .build()),
    }
}

fn with_typed_tile(ty: Type, src: &BufferView, dst: &BufferView, dst_dims: &[u32], src_dims: &[u32]) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| src.with_slice::<$t, Result<()>>(|s| tile(d, dst_dims, s, src_dims)))
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid tile operand type"))
            .build()),
    }
}

fn with_typed_pad(
    ty: Type,
    src: &BufferView,
    padding_value: &BufferView,
    dst: &BufferView,
    dst_dims: &[u32],
    src_dims: &[u32],
    edge_low: &[u32],
    interior: &[u32],
) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| {
                src.with_slice::<$t, Result<()>>(|s| {
                    padding_value.with_slice::<$t, Result<()>>(|p| {
                        pad(d, dst_dims, s, src_dims, edge_low, interior, p[0]);
                        Ok(())
                    })
                })
            })
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid pad operand type"))
            .build()),
    }
}

#[allow(clippy::too_many_arguments)]
fn with_typed_copy_region(
    ty: Type,
    src: &BufferView,
    dst: &BufferView,
    dst_dims: &[u32],
    dst_offset: &[u32],
    src_dims: &[u32],
    src_offset: &[u32],
    lengths: &[u32],
) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, ()>(|d| {
                src.with_slice::<$t, ()>(|s| copy_rect(d, dst_dims, dst_offset, s, src_dims, src_offset, lengths))
            })
        };
    }
    match ty {
        Type::I8 => Ok(arm!(i8)),
        Type::I16 => Ok(arm!(i16)),
        Type::I32 => Ok(arm!(i32)),
        Type::I64 => Ok(arm!(i64)),
        Type::F32 => Ok(arm!(f32)),
        Type::F64 => Ok(arm!(f64)),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid copy_region operand type"))
            .build()),
    }
}

fn with_f64_reduce(
    ty: Type,
    src: &BufferView,
    init: &BufferView,
    dst: &BufferView,
    src_dims: &[u32],
    dim: usize,
    reduce_fn: &impl Fn(&mut [f64], &[f64], &[u32], usize, &[f64]) -> Result<()>,
) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| {
                src.with_slice::<$t, Result<()>>(|s| {
                    init.with_slice::<$t, Result<()>>(|i| {
                        let wide_s: Vec<f64> = s.iter().map(|&v| v as f64).collect();
                        let wide_i: Vec<f64> = i.iter().map(|&v| v as f64).collect();
                        let mut wide_d = vec![0f64; d.len()];
                        reduce_fn(&mut wide_d, &wide_s, src_dims, dim, &wide_i)?;
                        for (dst_elem, wide) in d.iter_mut().zip(wide_d) {
                            *dst_elem = wide as $t;
                        }
                        Ok(())
                    })
                })
            })
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid reduce operand type"))
            .build()),
    }
}

#[allow(clippy::too_many_arguments)]
fn with_matmul(
    ty: Type,
    state: &RuntimeState,
    lhs: &BufferView,
    rhs: &BufferView,
    bias: &BufferView,
    dst: &BufferView,
    m: usize,
    k: usize,
    n: usize,
    mantissa: &[i32],
    exponent: &[i32],
) -> Result<()> {
    macro_rules! arm {
        ($t:ty) => {
            dst.with_slice_mut::<$t, Result<()>>(|d| {
                lhs.with_slice::<$t, Result<()>>(|l| {
                    rhs.with_slice::<$t, Result<()>>(|r| {
                        bias.with_slice::<$t, Result<()>>(|b| {
                            matmul(state, d, l, r, m, k, n, b, mantissa, exponent)
                        })
                    })
                })
            })
        };
    }
    match ty {
        Type::I8 => arm!(i8),
        Type::I16 => arm!(i16),
        Type::I32 => arm!(i32),
        Type::I64 => arm!(i64),
        Type::F32 => arm!(f32),
        Type::F64 => arm!(f64),
        other => Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with(format!("{other} is not a valid matmul operand type"))
            .build()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_bytecode::{decode_function_body, Opcode};
    use rt_hal::HostAllocator;

    fn make_interpreter() -> Interpreter {
        let allocator: Arc<dyn Allocator> = Arc::new(HostAllocator::new(1));
        Interpreter::new(256, allocator)
    }

    fn const_i32(values: &[i32], dims: &[u32]) -> Vec<u8> {
        let mut bytes = vec![Type::I32.type_index(), dims.len() as u8];
        for d in dims {
            bytes.extend_from_slice(&(*d as i32).to_le_bytes());
        }
        bytes.push(0); // dense
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        bytes.extend_from_slice(&payload);
        bytes
    }

    #[test]
    fn const_then_add_then_return() {
        let mut bytecode = vec![Opcode::Const as u8];
        bytecode.extend(const_i32(&[1, 2, 3, 4], &[4]));
        bytecode.extend_from_slice(&0u16.to_le_bytes()); // result slot 0

        bytecode.push(Opcode::Const as u8);
        bytecode.extend(const_i32(&[10, 20, 30, 40], &[4]));
        bytecode.extend_from_slice(&1u16.to_le_bytes()); // result slot 1

        bytecode.push(Opcode::Add as u8);
        bytecode.extend_from_slice(&0u16.to_le_bytes());
        bytecode.extend_from_slice(&1u16.to_le_bytes());
        bytecode.extend_from_slice(&2u16.to_le_bytes());

        bytecode.push(Opcode::Return as u8);
        bytecode.push(1); // one result slot
        bytecode.extend_from_slice(&2u16.to_le_bytes());

        let instructions = decode_function_body(&bytecode).unwrap();
        let mut interp = make_interpreter();
        interp.stack.push_frame(3, vec![]).unwrap();
        let result = interp.run(&instructions, |_, _, _, _| unreachable!(), |_, _| unreachable!()).unwrap();
        assert_eq!(result.len(), 1);
        result[0].as_buffer().unwrap().with_slice::<i32, _>(|s| assert_eq!(s, &[11, 22, 33, 44]));
    }

    #[test]
    fn branch_skips_unreachable_add() {
        // instr0 (offset 0, 5 bytes): branch straight to the `return` at
        // offset 10, skipping the dead branch at offset 5 entirely.
        let mut bytecode = vec![Opcode::Branch as u8];
        bytecode.extend_from_slice(&10u32.to_le_bytes());
        // instr1 (offset 5, 5 bytes): never executed; its own target is
        // irrelevant as long as it decodes.
        bytecode.push(Opcode::Branch as u8);
        bytecode.extend_from_slice(&10u32.to_le_bytes());
        // instr2 (offset 10): the real landing spot.
        bytecode.push(Opcode::Return as u8);
        bytecode.push(0); // no result slots

        let instructions = decode_function_body(&bytecode).unwrap();
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[2].offset, 10);

        let mut interp = make_interpreter();
        interp.stack.push_frame(1, vec![]).unwrap();
        let result = interp.run(&instructions, |_, _, _, _| unreachable!(), |_, _| unreachable!()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn cond_branch_loop_counts_to_target() {
        // %n = const i32 10 (slot 0); %acc = const i32 0 (slot 1)
        // loop: %cmp = cmp_i lt %acc %n (slot 2)
        //       cond_branch %cmp body exit
        // body: %acc = add %acc (const i32 1, slot 3) -> slot 1
        //       branch loop
        // exit: return %acc
        let mut bytecode = Vec::new();

        bytecode.push(Opcode::Const as u8);
        bytecode.extend(const_i32(&[10], &[]));
        bytecode.extend_from_slice(&0u16.to_le_bytes());

        bytecode.push(Opcode::Const as u8);
        bytecode.extend(const_i32(&[0], &[]));
        bytecode.extend_from_slice(&1u16.to_le_bytes());

        let loop_offset = bytecode.len();
        bytecode.push(Opcode::CmpI as u8);
        bytecode.push(0); // Eq=0,Ne=1,Lt=2 -> Lt
        bytecode.extend_from_slice(&1u16.to_le_bytes()); // acc
        bytecode.extend_from_slice(&0u16.to_le_bytes()); // n
        bytecode.extend_from_slice(&2u16.to_le_bytes()); // cmp result

        let cond_branch_offset = bytecode.len();
        bytecode.push(Opcode::CondBranch as u8);
        bytecode.extend_from_slice(&2u16.to_le_bytes()); // cond slot
        let body_target_patch = bytecode.len();
        bytecode.extend_from_slice(&0u32.to_le_bytes()); // body (patched below)
        let exit_target_patch = bytecode.len();
        bytecode.extend_from_slice(&0u32.to_le_bytes()); // exit (patched below)

        let body_offset = bytecode.len();
        bytecode.push(Opcode::Const as u8);
        bytecode.extend(const_i32(&[1], &[]));
        bytecode.extend_from_slice(&3u16.to_le_bytes());

        bytecode.push(Opcode::Add as u8);
        bytecode.extend_from_slice(&1u16.to_le_bytes());
        bytecode.extend_from_slice(&3u16.to_le_bytes());
        bytecode.extend_from_slice(&1u16.to_le_bytes()); // acc = acc + 1

        bytecode.push(Opcode::Branch as u8);
        bytecode.extend_from_slice(&(loop_offset as u32).to_le_bytes());

        let exit_offset = bytecode.len();
        bytecode.push(Opcode::Return as u8);
        bytecode.push(1); // one result slot
        bytecode.extend_from_slice(&1u16.to_le_bytes());

        bytecode[body_target_patch..body_target_patch + 4].copy_from_slice(&(body_offset as u32).to_le_bytes());
        bytecode[exit_target_patch..exit_target_patch + 4].copy_from_slice(&(exit_offset as u32).to_le_bytes());
        let _ = cond_branch_offset;

        let instructions = decode_function_body(&bytecode).unwrap();
        let mut interp = make_interpreter();
        interp.stack.push_frame(4, vec![]).unwrap();
        let result = interp.run(&instructions, |_, _, _, _| unreachable!(), |_, _| unreachable!()).unwrap();
        assert_eq!(result.len(), 1);
        result[0].as_buffer().unwrap().with_slice::<i32, _>(|s| assert_eq!(s, &[10]));
    }

    #[test]
    fn div_by_zero_is_failed_precondition_with_no_partial_writes() {
        // %lhs = const i32 [10, 20] (slot 0); %rhs = const i32 [2, 0] (slot 1)
        // %out = div %lhs %rhs -> slot 2; return %out
        let mut bytecode = vec![Opcode::Const as u8];
        bytecode.extend(const_i32(&[10, 20], &[2]));
        bytecode.extend_from_slice(&0u16.to_le_bytes());

        bytecode.push(Opcode::Const as u8);
        bytecode.extend(const_i32(&[2, 0], &[2]));
        bytecode.extend_from_slice(&1u16.to_le_bytes());

        bytecode.push(Opcode::Div as u8);
        bytecode.extend_from_slice(&0u16.to_le_bytes());
        bytecode.extend_from_slice(&1u16.to_le_bytes());
        bytecode.extend_from_slice(&2u16.to_le_bytes());

        bytecode.push(Opcode::Return as u8);
        bytecode.push(1); // one result slot
        bytecode.extend_from_slice(&2u16.to_le_bytes());

        let instructions = decode_function_body(&bytecode).unwrap();
        let mut interp = make_interpreter();
        interp.stack.push_frame(3, vec![]).unwrap();
        let err = interp.run(&instructions, |_, _, _, _| unreachable!(), |_, _| unreachable!()).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::FailedPrecondition);

        // `div_int` errors before `binary_arith_fallible` calls `set_result`,
        // so slot 2 never observes the buffer the kernel was mid-writing;
        // it is left exactly as it started.
        let frame = interp.stack.top().unwrap();
        assert!(matches!(frame.get(2).unwrap(), Value::Empty));
    }
}
