//! The module wire format (`spec.md` §6): a hand-rolled binary reader/writer
//! for the fixed layout a flatbuffer schema would otherwise produce. The
//! schema generator itself is out of scope; reading and writing the layout
//! it would emit is not.

use byteorder::{LittleEndian, WriteBytesExt};
use rt_core::{ErrorBuilder, ErrorKind, Result, Type};

use crate::reader::ByteReader;

#[derive(Debug, Clone, PartialEq)]
pub enum ElementType {
    Builtin(Type),
    Opaque(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemRefType {
    pub element: ElementType,
    pub shape: Vec<i64>,
    pub memory_space: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Element(ElementType),
    MemRef(MemRefType),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeSignature {
    pub args: Vec<TypeRef>,
    pub results: Vec<TypeRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeDef {
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub signature: TypeSignature,
    /// Slot capacity the function's frame needs (`spec.md` §4.6: "allocates
    /// a frame with slot capacity declared by the function signature").
    /// Not itself part of `TypeSignature` — args/results only describe the
    /// externally visible calling convention, while a frame also needs
    /// slots for intermediate values, so this is carried alongside it.
    pub slot_count: u32,
    pub bytecode: Option<BytecodeDef>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionTable {
    pub functions: Vec<FunctionDef>,
    /// Ordinals into `functions` that are unresolved at publish time.
    pub imports: Vec<u32>,
    /// Ordinals into `functions` that are publicly callable.
    pub exports: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub function_table: FunctionTable,
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.write_u32::<LittleEndian>(s.len() as u32).expect("Vec write is infallible");
    out.extend_from_slice(s.as_bytes());
}

fn write_element_type(out: &mut Vec<u8>, element: &ElementType) {
    match element {
        ElementType::Builtin(ty) => {
            out.push(0);
            out.push(ty.type_index());
        }
        ElementType::Opaque(id) => {
            out.push(1);
            out.write_u32::<LittleEndian>(*id).expect("Vec write is infallible");
        }
    }
}

fn read_element_type(reader: &mut ByteReader<'_>) -> Result<ElementType> {
    match reader.read_u8()? {
        0 => Ok(ElementType::Builtin(Type::from_type_index(reader.read_u8()?)?)),
        1 => Ok(ElementType::Opaque(reader.read_u32()?)),
        other => Err(ErrorBuilder::new(ErrorKind::OutOfRange)
            .with(format!("element type discriminant {other} is neither builtin(0) nor opaque(1)"))
            .build()),
    }
}

fn write_type_ref(out: &mut Vec<u8>, type_ref: &TypeRef) {
    match type_ref {
        TypeRef::Element(e) => {
            out.push(0);
            write_element_type(out, e);
        }
        TypeRef::MemRef(m) => {
            out.push(1);
            write_element_type(out, &m.element);
            out.write_u32::<LittleEndian>(m.shape.len() as u32).expect("Vec write is infallible");
            for dim in &m.shape {
                out.write_i64::<LittleEndian>(*dim).expect("Vec write is infallible");
            }
            out.write_u32::<LittleEndian>(m.memory_space).expect("Vec write is infallible");
        }
    }
}

fn read_type_ref(reader: &mut ByteReader<'_>) -> Result<TypeRef> {
    match reader.read_u8()? {
        0 => Ok(TypeRef::Element(read_element_type(reader)?)),
        1 => {
            let element = read_element_type(reader)?;
            let rank = reader.read_u32()? as usize;
            let mut shape = Vec::with_capacity(rank);
            for _ in 0..rank {
                shape.push(reader.read_i64()?);
            }
            let memory_space = reader.read_u32()?;
            Ok(TypeRef::MemRef(MemRefType { element, shape, memory_space }))
        }
        other => Err(ErrorBuilder::new(ErrorKind::OutOfRange)
            .with(format!("type ref discriminant {other} is neither element(0) nor memref(1)"))
            .build()),
    }
}

fn write_type_signature(out: &mut Vec<u8>, sig: &TypeSignature) {
    out.write_u32::<LittleEndian>(sig.args.len() as u32).expect("Vec write is infallible");
    for a in &sig.args {
        write_type_ref(out, a);
    }
    out.write_u32::<LittleEndian>(sig.results.len() as u32).expect("Vec write is infallible");
    for r in &sig.results {
        write_type_ref(out, r);
    }
}

fn read_type_signature(reader: &mut ByteReader<'_>) -> Result<TypeSignature> {
    let arg_count = reader.read_u32()? as usize;
    let mut args = Vec::with_capacity(arg_count);
    for _ in 0..arg_count {
        args.push(read_type_ref(reader)?);
    }
    let result_count = reader.read_u32()? as usize;
    let mut results = Vec::with_capacity(result_count);
    for _ in 0..result_count {
        results.push(read_type_ref(reader)?);
    }
    Ok(TypeSignature { args, results })
}

fn write_function_def(out: &mut Vec<u8>, f: &FunctionDef) {
    write_string(out, &f.name);
    write_type_signature(out, &f.signature);
    out.write_u32::<LittleEndian>(f.slot_count).expect("Vec write is infallible");
    match &f.bytecode {
        Some(b) => {
            out.push(1);
            out.write_u32::<LittleEndian>(b.contents.len() as u32).expect("Vec write is infallible");
            out.extend_from_slice(&b.contents);
        }
        None => out.push(0),
    }
}

fn read_function_def(reader: &mut ByteReader<'_>) -> Result<FunctionDef> {
    let name = reader.read_string()?;
    let signature = read_type_signature(reader)?;
    let slot_count = reader.read_u32()?;
    let bytecode = match reader.read_u8()? {
        0 => None,
        1 => {
            let len = reader.read_u32()? as usize;
            Some(BytecodeDef { contents: reader.read_bytes(len)?.to_vec() })
        }
        other => {
            return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                .with(format!("function def's bytecode presence flag {other} is neither 0 nor 1"))
                .build())
        }
    };
    Ok(FunctionDef { name, signature, slot_count, bytecode })
}

/// Encodes a [`Module`] into the wire layout.
pub fn write_module(module: &Module) -> Vec<u8> {
    let mut out = Vec::new();
    let table = &module.function_table;
    out.write_u32::<LittleEndian>(table.functions.len() as u32).expect("Vec write is infallible");
    for f in &table.functions {
        write_function_def(&mut out, f);
    }
    out.write_u32::<LittleEndian>(table.imports.len() as u32).expect("Vec write is infallible");
    for &ord in &table.imports {
        out.write_u32::<LittleEndian>(ord).expect("Vec write is infallible");
    }
    out.write_u32::<LittleEndian>(table.exports.len() as u32).expect("Vec write is infallible");
    for &ord in &table.exports {
        out.write_u32::<LittleEndian>(ord).expect("Vec write is infallible");
    }
    out
}

/// Decodes a [`Module`] from its wire layout, validating ordinal bounds
/// (invariant 4 in `spec.md` §3: imports/exports must be valid ordinals).
pub fn read_module(bytes: &[u8]) -> Result<Module> {
    let mut reader = ByteReader::new(bytes);
    let function_count = reader.read_u32()? as usize;
    let mut functions = Vec::with_capacity(function_count);
    for _ in 0..function_count {
        functions.push(read_function_def(&mut reader)?);
    }
    let import_count = reader.read_u32()? as usize;
    let mut imports = Vec::with_capacity(import_count);
    for _ in 0..import_count {
        imports.push(reader.read_u32()?);
    }
    let export_count = reader.read_u32()? as usize;
    let mut exports = Vec::with_capacity(export_count);
    for _ in 0..export_count {
        exports.push(reader.read_u32()?);
    }

    for &ord in imports.iter().chain(exports.iter()) {
        if ord as usize >= functions.len() {
            return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                .with(format!("ordinal {ord} is not a valid index into {} functions", functions.len()))
                .build());
        }
    }

    Ok(Module { function_table: FunctionTable { functions, imports, exports } })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_module() -> Module {
        Module {
            function_table: FunctionTable {
                functions: vec![
                    FunctionDef {
                        name: "main".to_string(),
                        signature: TypeSignature {
                            args: vec![TypeRef::Element(ElementType::Builtin(Type::F32))],
                            results: vec![TypeRef::MemRef(MemRefType {
                                element: ElementType::Builtin(Type::F32),
                                shape: vec![2, 3],
                                memory_space: 0,
                            })],
                        },
                        slot_count: 4,
                        bytecode: Some(BytecodeDef { contents: vec![0, 1, 2, 3] }),
                    },
                    FunctionDef {
                        name: "imported_fn".to_string(),
                        signature: TypeSignature::default(),
                        slot_count: 0,
                        bytecode: None,
                    },
                ],
                imports: vec![1],
                exports: vec![0],
            },
        }
    }

    #[test]
    fn module_round_trips_through_the_wire_format() {
        let module = sample_module();
        let bytes = write_module(&module);
        let decoded = read_module(&bytes).unwrap();
        assert_eq!(decoded, module);
    }

    #[test]
    fn rejects_out_of_range_export_ordinal() {
        let mut module = sample_module();
        module.function_table.exports.push(99);
        let bytes = write_module(&module);
        let err = read_module(&bytes).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::OutOfRange);
    }

    #[test]
    fn empty_module_round_trips() {
        let module = Module::default();
        let bytes = write_module(&module);
        assert_eq!(read_module(&bytes).unwrap(), module);
    }
}
