//! Bytecode wire format, streaming decoder and disassembler (components C6
//! and C8, plus the module wire format from `spec.md` §6).

pub mod constant;
pub mod decoder;
pub mod disasm;
pub mod module;
pub mod opcode;
pub mod reader;
pub mod sourcemap;

pub use constant::{read_constant, ConstantEncoding, DecodedConstant};
pub use decoder::{decode_function_body, decode_instruction, CmpFPredicate, CmpIPredicate, DecodedOperand, Instruction};
pub use disasm::disassemble;
pub use module::{read_module, write_module, ElementType, FunctionDef, FunctionTable, MemRefType, Module, TypeRef, TypeSignature};
pub use opcode::{Opcode, OperandKind};
pub use reader::ByteReader;
pub use sourcemap::{SourceLocation, SourceMap};
