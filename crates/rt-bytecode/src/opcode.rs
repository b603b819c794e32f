//! The opcode table: each entry names a mnemonic and the ordered list of
//! operand encodings the decoder must walk (`spec.md` §4.5).

/// One of the closed operand encodings from `spec.md` §4.5's wire-order
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    InputSlot,
    OutputSlot,
    ResultSlot,
    VariadicInputSlots,
    VariadicOutputSlots,
    VariadicResultSlots,
    VariadicTransferSlots,
    Constant,
    FunctionOrdinal,
    DispatchOrdinal,
    ImportOrdinal,
    BlockOffset,
    TypeIndex,
    Index,
    IndexList,
    CmpIPredicate,
    CmpFPredicate,
}

/// Every instruction the grammar defines. Grouped by `spec.md` §4.7/§4.8's
/// categories (arithmetic/elementwise/reduction, constant materialization,
/// control flow, dispatch/sequencer-only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Const = 0,
    Add = 1,
    Sub = 2,
    Mul = 3,
    Div = 4,
    Abs = 5,
    MulAdd = 6,
    Not = 7,
    And = 8,
    Or = 9,
    Xor = 10,
    ShiftLeft = 11,
    ShiftRight = 12,
    Min = 13,
    Max = 14,
    Clamp = 15,
    Floor = 16,
    Ceil = 17,
    Exp = 18,
    Log = 19,
    Rsqrt = 20,
    Cos = 21,
    Sin = 22,
    Tanh = 23,
    Atan2 = 24,
    Select = 25,
    CmpI = 26,
    CmpF = 27,
    Convert = 28,
    Transpose = 29,
    Reverse = 30,
    Pad = 31,
    Broadcast = 32,
    Tile = 33,
    CopyRegion = 34,
    ReduceSum = 35,
    ReduceMin = 36,
    ReduceMax = 37,
    MatMul = 38,
    Branch = 39,
    CondBranch = 40,
    Return = 41,
    Call = 42,
    CallIndirect = 43,
    CallImport = 44,
    Dispatch = 45,
    DispatchIndirect = 46,
    HalAllocate = 47,
    HalCopy = 48,
    HalBarrier = 49,
    HalSignalFence = 50,
    HalWaitFence = 51,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Opcode> {
        use Opcode::*;
        const ALL: &[Opcode] = &[
            Const, Add, Sub, Mul, Div, Abs, MulAdd, Not, And, Or, Xor, ShiftLeft, ShiftRight, Min,
            Max, Clamp, Floor, Ceil, Exp, Log, Rsqrt, Cos, Sin, Tanh, Atan2, Select, CmpI, CmpF,
            Convert, Transpose, Reverse, Pad, Broadcast, Tile, CopyRegion, ReduceSum, ReduceMin,
            ReduceMax, MatMul, Branch, CondBranch, Return, Call, CallIndirect, CallImport,
            Dispatch, DispatchIndirect, HalAllocate, HalCopy, HalBarrier, HalSignalFence,
            HalWaitFence,
        ];
        ALL.iter().copied().find(|op| *op as u8 == value)
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Const => "const",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Abs => "abs",
            MulAdd => "mul_add",
            Not => "not",
            And => "and",
            Or => "or",
            Xor => "xor",
            ShiftLeft => "shl",
            ShiftRight => "shr",
            Min => "min",
            Max => "max",
            Clamp => "clamp",
            Floor => "floor",
            Ceil => "ceil",
            Exp => "exp",
            Log => "log",
            Rsqrt => "rsqrt",
            Cos => "cos",
            Sin => "sin",
            Tanh => "tanh",
            Atan2 => "atan2",
            Select => "select",
            CmpI => "cmp_i",
            CmpF => "cmp_f",
            Convert => "convert",
            Transpose => "transpose",
            Reverse => "reverse",
            Pad => "pad",
            Broadcast => "broadcast",
            Tile => "tile",
            CopyRegion => "copy_region",
            ReduceSum => "reduce_sum",
            ReduceMin => "reduce_min",
            ReduceMax => "reduce_max",
            MatMul => "matmul",
            Branch => "branch",
            CondBranch => "cond_branch",
            Return => "return",
            Call => "call",
            CallIndirect => "call_indirect",
            CallImport => "call_import",
            Dispatch => "dispatch",
            DispatchIndirect => "dispatch_indirect",
            HalAllocate => "hal.allocate",
            HalCopy => "hal.copy",
            HalBarrier => "hal.barrier",
            HalSignalFence => "hal.signal_fence",
            HalWaitFence => "hal.wait_fence",
        }
    }

    /// The ordered operand grammar for this opcode, terminated implicitly by
    /// the end of the slice (`spec.md`'s `kNone` sentinel).
    pub fn operands(self) -> &'static [OperandKind] {
        use OperandKind::*;
        match self {
            Opcode::Const => &[Constant, OperandKind::ResultSlot],
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::ShiftLeft
            | Opcode::ShiftRight
            | Opcode::Min
            | Opcode::Max
            | Opcode::Atan2 => &[InputSlot, InputSlot, OperandKind::ResultSlot],
            Opcode::Not | Opcode::Abs | Opcode::Floor | Opcode::Ceil | Opcode::Exp | Opcode::Log
            | Opcode::Rsqrt | Opcode::Cos | Opcode::Sin | Opcode::Tanh => {
                &[InputSlot, OperandKind::ResultSlot]
            }
            Opcode::MulAdd | Opcode::Clamp | Opcode::Select => {
                &[InputSlot, InputSlot, InputSlot, OperandKind::ResultSlot]
            }
            Opcode::CmpI => &[CmpIPredicate, InputSlot, InputSlot, OperandKind::ResultSlot],
            Opcode::CmpF => &[CmpFPredicate, InputSlot, InputSlot, OperandKind::ResultSlot],
            Opcode::Convert => &[OperandKind::TypeIndex, InputSlot, OperandKind::ResultSlot],
            Opcode::Transpose | Opcode::Reverse | Opcode::Broadcast | Opcode::Tile => {
                &[InputSlot, IndexList, OperandKind::ResultSlot]
            }
            Opcode::Pad => &[InputSlot, IndexList, IndexList, IndexList, InputSlot, OperandKind::ResultSlot],
            Opcode::CopyRegion => &[InputSlot, IndexList, IndexList, IndexList, OperandKind::OutputSlot],
            Opcode::ReduceSum | Opcode::ReduceMin | Opcode::ReduceMax => {
                &[InputSlot, InputSlot, OperandKind::Index, OperandKind::ResultSlot]
            }
            Opcode::MatMul => &[
                InputSlot, InputSlot, InputSlot, IndexList, IndexList, OperandKind::Index,
                OperandKind::Index, OperandKind::Index, OperandKind::ResultSlot,
            ],
            Opcode::Branch => &[OperandKind::BlockOffset],
            Opcode::CondBranch => &[InputSlot, OperandKind::BlockOffset, OperandKind::BlockOffset],
            Opcode::Return => &[OperandKind::VariadicInputSlots],
            Opcode::Call => &[
                OperandKind::FunctionOrdinal,
                OperandKind::VariadicInputSlots,
                OperandKind::VariadicResultSlots,
            ],
            Opcode::CallIndirect => &[
                InputSlot,
                OperandKind::VariadicInputSlots,
                OperandKind::VariadicResultSlots,
            ],
            Opcode::CallImport => &[
                OperandKind::ImportOrdinal,
                OperandKind::VariadicInputSlots,
                OperandKind::VariadicResultSlots,
            ],
            Opcode::Dispatch => &[OperandKind::DispatchOrdinal, IndexList, OperandKind::VariadicTransferSlots],
            Opcode::DispatchIndirect => {
                &[InputSlot, IndexList, OperandKind::VariadicTransferSlots]
            }
            Opcode::HalAllocate => &[IndexList, OperandKind::TypeIndex, OperandKind::ResultSlot],
            Opcode::HalCopy => &[InputSlot, InputSlot],
            Opcode::HalBarrier => &[],
            Opcode::HalSignalFence | Opcode::HalWaitFence => &[OperandKind::Index],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_round_trips_through_its_byte() {
        for value in 0u8..=51 {
            let op = Opcode::from_u8(value).expect("dense opcode range");
            assert_eq!(op as u8, value);
        }
    }

    #[test]
    fn unknown_opcode_byte_is_none() {
        assert!(Opcode::from_u8(255).is_none());
    }
}
