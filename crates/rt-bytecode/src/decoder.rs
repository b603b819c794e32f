//! Turns `OperandKind` grammar entries plus raw bytes into a decoded
//! [`Instruction`] (`spec.md` §4.5).

use rt_core::{ErrorBuilder, ErrorKind, Result};

use crate::constant::{read_constant, DecodedConstant};
use crate::opcode::{Opcode, OperandKind};
use crate::reader::ByteReader;

/// Comparison predicates carried inline by `CmpI`/`CmpF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpIPredicate {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpFPredicate {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Unordered,
}

impl CmpIPredicate {
    fn from_u8(value: u8) -> Result<CmpIPredicate> {
        use CmpIPredicate::*;
        Ok(match value {
            0 => Eq,
            1 => Ne,
            2 => Lt,
            3 => Le,
            4 => Gt,
            5 => Ge,
            other => {
                return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                    .with(format!("{other} is not a valid integer comparison predicate"))
                    .build())
            }
        })
    }
}

impl CmpFPredicate {
    fn from_u8(value: u8) -> Result<CmpFPredicate> {
        use CmpFPredicate::*;
        Ok(match value {
            0 => Eq,
            1 => Ne,
            2 => Lt,
            3 => Le,
            4 => Gt,
            5 => Ge,
            6 => Unordered,
            other => {
                return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                    .with(format!("{other} is not a valid float comparison predicate"))
                    .build())
            }
        })
    }
}

/// A single decoded operand, tagged by the `OperandKind` that produced it.
#[derive(Debug, Clone)]
pub enum DecodedOperand {
    Slot(u32),
    Slots(Vec<u32>),
    /// `VariadicTransferSlots`: `(src, dst)` ordinal pairs, wire-order.
    SlotPairs(Vec<(u32, u32)>),
    Constant(DecodedConstant),
    Ordinal(u32),
    /// `DispatchOrdinal`: the dispatch ordinal plus its paired export index
    /// (`spec.md` §4.5: `u32 dispatch, u16 export`).
    DispatchOrdinal { dispatch: u32, export: u16 },
    BlockOffset(u32),
    TypeIndex(u8),
    Index(i32),
    IndexList(Vec<i32>),
    CmpI(CmpIPredicate),
    CmpF(CmpFPredicate),
}

/// One fully decoded instruction: its opcode, operands in grammar order, and
/// the byte offset it started at (used for branch targets and source maps).
#[derive(Debug, Clone)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub operands: Vec<DecodedOperand>,
}

/// `u8 count, then count × u16 ordinals` (`spec.md` §4.5), widened to `u32`
/// to match the slot-index type used everywhere past decode.
fn read_slot_list(reader: &mut ByteReader<'_>) -> Result<Vec<u32>> {
    let count = reader.read_u8()? as usize;
    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        slots.push(reader.read_u16()? as u32);
    }
    Ok(slots)
}

/// `u8 count, then count × (u16 src, u16 dst)` (`spec.md` §4.5
/// `VariadicTransferSlots`).
fn read_transfer_slot_pairs(reader: &mut ByteReader<'_>) -> Result<Vec<(u32, u32)>> {
    let count = reader.read_u8()? as usize;
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let src = reader.read_u16()? as u32;
        let dst = reader.read_u16()? as u32;
        pairs.push((src, dst));
    }
    Ok(pairs)
}

/// `u8 count, then count × i32` (`spec.md` §4.5 `IndexList`).
fn read_index_list(reader: &mut ByteReader<'_>) -> Result<Vec<i32>> {
    let count = reader.read_u8()? as usize;
    let mut indices = Vec::with_capacity(count);
    for _ in 0..count {
        indices.push(reader.read_i32()?);
    }
    Ok(indices)
}

fn read_operand(reader: &mut ByteReader<'_>, kind: OperandKind) -> Result<DecodedOperand> {
    Ok(match kind {
        OperandKind::InputSlot | OperandKind::OutputSlot | OperandKind::ResultSlot => {
            DecodedOperand::Slot(reader.read_u16()? as u32)
        }
        OperandKind::VariadicInputSlots | OperandKind::VariadicOutputSlots | OperandKind::VariadicResultSlots => {
            DecodedOperand::Slots(read_slot_list(reader)?)
        }
        OperandKind::VariadicTransferSlots => DecodedOperand::SlotPairs(read_transfer_slot_pairs(reader)?),
        OperandKind::Constant => DecodedOperand::Constant(read_constant(reader)?),
        OperandKind::FunctionOrdinal | OperandKind::ImportOrdinal => DecodedOperand::Ordinal(reader.read_u32()?),
        OperandKind::DispatchOrdinal => {
            let dispatch = reader.read_u32()?;
            let export = reader.read_u16()?;
            DecodedOperand::DispatchOrdinal { dispatch, export }
        }
        OperandKind::BlockOffset => DecodedOperand::BlockOffset(reader.read_u32()?),
        OperandKind::TypeIndex => DecodedOperand::TypeIndex(reader.read_u8()?),
        OperandKind::Index => DecodedOperand::Index(reader.read_i32()?),
        OperandKind::IndexList => DecodedOperand::IndexList(read_index_list(reader)?),
        OperandKind::CmpIPredicate => DecodedOperand::CmpI(CmpIPredicate::from_u8(reader.read_u8()?)?),
        OperandKind::CmpFPredicate => DecodedOperand::CmpF(CmpFPredicate::from_u8(reader.read_u8()?)?),
    })
}

/// Decodes exactly one instruction at the reader's current position, walking
/// the opcode's fixed `OperandKind` grammar in order.
pub fn decode_instruction(reader: &mut ByteReader<'_>) -> Result<Instruction> {
    let offset = reader.position();
    let opcode_byte = reader.read_u8()?;
    let opcode = Opcode::from_u8(opcode_byte).ok_or_else(|| {
        ErrorBuilder::new(ErrorKind::OutOfRange)
            .with(format!("byte {opcode_byte} at offset {offset} is not a known opcode"))
            .build()
    })?;
    let mut operands = Vec::with_capacity(opcode.operands().len());
    for &kind in opcode.operands() {
        let operand = read_operand(reader, kind)
            .map_err(|e| e.augment(format!("decoding {} operand of {}", operand_kind_name(kind), opcode.mnemonic())))?;
        operands.push(operand);
    }
    Ok(Instruction { offset, opcode, operands })
}

fn operand_kind_name(kind: OperandKind) -> &'static str {
    use OperandKind::*;
    match kind {
        InputSlot => "an input slot",
        OutputSlot => "an output slot",
        ResultSlot => "a result slot",
        VariadicInputSlots => "variadic input slots",
        VariadicOutputSlots => "variadic output slots",
        VariadicResultSlots => "variadic result slots",
        VariadicTransferSlots => "variadic transfer slots",
        Constant => "a constant",
        FunctionOrdinal => "a function ordinal",
        DispatchOrdinal => "a dispatch ordinal",
        ImportOrdinal => "an import ordinal",
        BlockOffset => "a block offset",
        TypeIndex => "a type index",
        Index => "an index",
        IndexList => "an index list",
        CmpIPredicate => "an integer comparison predicate",
        CmpFPredicate => "a float comparison predicate",
    }
}

/// Decodes every instruction in `bytes` in sequence, stopping at the end of
/// the buffer. A function body's bytecode contains no padding, so a clean
/// decode must consume exactly `bytes.len()` bytes.
pub fn decode_function_body(bytes: &[u8]) -> Result<Vec<Instruction>> {
    let mut reader = ByteReader::new(bytes);
    let mut instructions = Vec::new();
    while !reader.is_empty() {
        instructions.push(decode_instruction(&mut reader)?);
    }
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_add_with_three_slots() {
        let mut bytes = vec![Opcode::Add as u8];
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&3u16.to_le_bytes());
        let mut reader = ByteReader::new(&bytes);
        let instr = decode_instruction(&mut reader).unwrap();
        assert_eq!(instr.opcode, Opcode::Add);
        assert_eq!(instr.operands.len(), 3);
        assert!(matches!(instr.operands[2], DecodedOperand::Slot(3)));
    }

    #[test]
    fn decodes_branch_and_return() {
        let mut bytes = vec![Opcode::Branch as u8];
        bytes.extend_from_slice(&42u32.to_le_bytes());
        bytes.push(Opcode::Return as u8);
        bytes.push(1u8);
        bytes.extend_from_slice(&7u16.to_le_bytes());

        let instrs = decode_function_body(&bytes).unwrap();
        assert_eq!(instrs.len(), 2);
        assert!(matches!(instrs[0].operands[0], DecodedOperand::BlockOffset(42)));
        match &instrs[1].operands[0] {
            DecodedOperand::Slots(slots) => assert_eq!(slots, &[7]),
            other => panic!("expected Slots, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_opcode_byte() {
        let bytes = [255u8];
        let mut reader = ByteReader::new(&bytes);
        assert!(decode_instruction(&mut reader).is_err());
    }

    #[test]
    fn decode_function_body_rejects_trailing_garbage() {
        // Add needs 3 slots but we only supply 2; decode should fail, not
        // silently stop early.
        let mut bytes = vec![Opcode::Add as u8];
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        assert!(decode_function_body(&bytes).is_err());
    }

    #[test]
    fn error_message_names_opcode_and_operand() {
        let bytes = vec![Opcode::Add as u8];
        let err = decode_function_body(&bytes).unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("add"));
    }

    #[test]
    fn decodes_transfer_slot_pairs() {
        let mut bytes = vec![Opcode::Dispatch as u8];
        bytes.extend_from_slice(&9u32.to_le_bytes()); // dispatch ordinal
        bytes.extend_from_slice(&3u16.to_le_bytes()); // export
        bytes.push(0); // empty workload index list
        bytes.push(1); // one transfer pair
        bytes.extend_from_slice(&5u16.to_le_bytes()); // src
        bytes.extend_from_slice(&6u16.to_le_bytes()); // dst

        let mut reader = ByteReader::new(&bytes);
        let instr = decode_instruction(&mut reader).unwrap();
        assert!(matches!(
            instr.operands[0],
            DecodedOperand::DispatchOrdinal { dispatch: 9, export: 3 }
        ));
        match &instr.operands[2] {
            DecodedOperand::SlotPairs(pairs) => assert_eq!(pairs, &[(5, 6)]),
            other => panic!("expected SlotPairs, got {other:?}"),
        }
    }

    #[test]
    fn index_list_reads_negative_elements() {
        let mut bytes = vec![Opcode::Transpose as u8];
        bytes.extend_from_slice(&1u16.to_le_bytes()); // input slot
        bytes.push(1); // one index
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes()); // result slot

        let mut reader = ByteReader::new(&bytes);
        let instr = decode_instruction(&mut reader).unwrap();
        match &instr.operands[1] {
            DecodedOperand::IndexList(list) => assert_eq!(list, &[-1]),
            other => panic!("expected IndexList, got {other:?}"),
        }
    }
}
