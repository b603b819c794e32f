//! Text disassembly (`spec.md` §4.11): decode a function body once, then
//! print results before operands regardless of their wire order, resolving
//! source locations from an attached [`SourceMap`] when present.

use std::fmt::Write as _;

use rt_core::Result;

use crate::constant::ConstantEncoding;
use crate::decoder::{decode_function_body, CmpFPredicate, CmpIPredicate, DecodedOperand, Instruction};
use crate::sourcemap::SourceMap;

fn format_operand(operand: &DecodedOperand) -> String {
    match operand {
        DecodedOperand::Slot(s) => format!("%{s}"),
        DecodedOperand::Slots(slots) => {
            let parts: Vec<String> = slots.iter().map(|s| format!("%{s}")).collect();
            format!("[{}]", parts.join(", "))
        }
        DecodedOperand::SlotPairs(pairs) => {
            let parts: Vec<String> = pairs.iter().map(|(src, dst)| format!("%{src}->%{dst}")).collect();
            format!("[{}]", parts.join(", "))
        }
        DecodedOperand::Constant(c) => format!(
            "const<{} x {:?}, {}>",
            c.element_type,
            c.dims,
            if c.encoding == ConstantEncoding::Dense { "dense" } else { "splat" }
        ),
        DecodedOperand::Ordinal(o) => format!("#{o}"),
        DecodedOperand::DispatchOrdinal { dispatch, export } => format!("#{dispatch}:{export}"),
        DecodedOperand::BlockOffset(o) => format!("@{o}"),
        DecodedOperand::TypeIndex(t) => format!("ty({t})"),
        DecodedOperand::Index(i) => format!("{i}"),
        DecodedOperand::IndexList(list) => format!("{list:?}"),
        DecodedOperand::CmpI(p) => format!("{p:?}"),
        DecodedOperand::CmpF(p) => format!("{p:?}"),
    }
}

/// `ResultSlot`/`OutputSlot` operands print before the rest (results come
/// first in the textual form even though they're encoded last on the wire,
/// per the decoder's two-pass disassembly order in `spec.md` §4.5).
fn is_result_like(operand: &DecodedOperand) -> bool {
    matches!(operand, DecodedOperand::Slot(_) | DecodedOperand::Slots(_))
}

fn format_instruction(instr: &Instruction, source_map: Option<&SourceMap>) -> String {
    let total = instr.operands.len();
    let last_is_result = instr
        .operands
        .last()
        .map(is_result_like)
        .unwrap_or(false);

    let mut out = String::new();
    if last_is_result && total > 0 {
        write!(out, "{} = ", format_operand(&instr.operands[total - 1])).unwrap();
    }
    write!(out, "{}", instr.opcode.mnemonic()).unwrap();
    let operand_count = if last_is_result { total - 1 } else { total };
    for operand in &instr.operands[..operand_count] {
        write!(out, " {}", format_operand(operand)).unwrap();
    }
    if let Some(map) = source_map {
        if let Some(loc) = map.lookup(instr.offset) {
            write!(out, "  ; {}:{}:{}", loc.file, loc.line, loc.column).unwrap();
            if let Some(symbol) = &loc.symbol {
                write!(out, " ({symbol})").unwrap();
            }
        }
    }
    out
}

/// Disassembles a function body into one line of text per instruction.
pub fn disassemble(bytes: &[u8], source_map: Option<&SourceMap>) -> Result<Vec<String>> {
    let instructions = decode_function_body(bytes)?;
    Ok(instructions.iter().map(|i| format_instruction(i, source_map)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;
    use crate::sourcemap::SourceLocation;

    #[test]
    fn disassembles_add_with_result_printed_first() {
        let mut bytes = vec![Opcode::Add as u8];
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&3u16.to_le_bytes());
        let lines = disassemble(&bytes, None).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "%3 = add %1 %2");
    }

    #[test]
    fn attaches_source_location_when_present() {
        let mut bytes = vec![Opcode::Branch as u8];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let map = SourceMap::builder()
            .add_range(0, bytes.len(), SourceLocation {
                file: "model.mlir".to_string(),
                line: 12,
                column: 4,
                symbol: Some("loop_body".to_string()),
            })
            .build();
        let lines = disassemble(&bytes, Some(&map)).unwrap();
        assert!(lines[0].contains("model.mlir:12:4"));
        assert!(lines[0].contains("loop_body"));
    }
}
