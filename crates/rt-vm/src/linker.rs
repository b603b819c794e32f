//! Module linking: resolves `Call`/`CallImport` ordinals against a set of
//! loaded `rt_bytecode::Module`s, closing the `call_function` seam
//! `Interpreter::run` leaves open. The host-side counterpart to `spec.md`
//! §3's `ImportFunction` — an import's `link_type ∈ {NativeFunction,
//! Module}` and its `linked_function` are recorded here as a binding rather
//! than an owning pointer, per §9's "cyclic references... broken by storing
//! indices rather than owning pointers; modules are kept alive by the
//! instance that loaded them."

use std::collections::HashMap;
use std::sync::Arc;

use rt_bytecode::{decode_function_body, FunctionDef, Instruction, Module};
use rt_core::{ErrorBuilder, ErrorKind, Result};

use crate::interpreter::{CallKind, Interpreter};
use crate::value::Value;

/// A module handed to a [`Linker`] gets one of these; stable for the
/// module's lifetime in the linker, never reused after unloading (there is
/// no unloading — modules live as long as the `Linker`, matching
/// `spec.md` §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u32);

type NativeFunction = dyn Fn(&mut Interpreter, Vec<Value>) -> Result<Vec<Value>> + Send + Sync;

/// What an import ordinal resolves to, mirroring `spec.md` §3's
/// `ImportFunction.link_type`.
enum Binding {
    NativeFunction(Arc<NativeFunction>),
    Module(ModuleId, u32),
}

struct LoadedModule {
    module: Module,
    /// Parallel to `module.function_table.functions`: `Some` for every
    /// function that carries a `BytecodeDef`, decoded once at load time.
    bodies: Vec<Option<Vec<Instruction>>>,
    /// Keyed by position within `module.function_table.imports`, not by
    /// function ordinal — `CallImport`'s operand is an index into the
    /// import list (spec.md §4.5's `ImportOrdinal`), a different space
    /// than `Call`'s `FunctionOrdinal`.
    bindings: HashMap<u32, Binding>,
}

/// Resolves `Call` ordinals against a loaded module's own function table
/// and `CallImport` ordinals against bindings registered with
/// [`Linker::bind_native`] / [`Linker::bind_module_import`]. A function with
/// no binding and no bytecode body (an import nobody has linked yet) fails
/// with `FailedPrecondition` — spec.md §7 names unresolved-import calls
/// explicitly under that error kind.
pub struct Linker {
    modules: Vec<LoadedModule>,
}

impl Linker {
    pub fn new() -> Linker {
        Linker { modules: Vec::new() }
    }

    /// Decodes every function body the module declares and assigns it a
    /// [`ModuleId`] stable for the linker's lifetime.
    pub fn load_module(&mut self, module: Module) -> Result<ModuleId> {
        let bodies = module
            .function_table
            .functions
            .iter()
            .map(|f: &FunctionDef| f.bytecode.as_ref().map(|b| decode_function_body(&b.contents)).transpose())
            .collect::<Result<Vec<_>>>()?;
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(LoadedModule { module, bodies, bindings: HashMap::new() });
        Ok(id)
    }

    pub fn module(&self, id: ModuleId) -> Result<&Module> {
        Ok(&self.entry(id)?.module)
    }

    /// Binds import ordinal `import_ordinal` (an index into the module's
    /// `imports` list) to a host-provided Rust function — `spec.md` §3's
    /// `LinkType::NativeFunction`.
    pub fn bind_native(
        &mut self,
        module: ModuleId,
        import_ordinal: u32,
        f: impl Fn(&mut Interpreter, Vec<Value>) -> Result<Vec<Value>> + Send + Sync + 'static,
    ) -> Result<()> {
        self.entry_mut(module)?.bindings.insert(import_ordinal, Binding::NativeFunction(Arc::new(f)));
        Ok(())
    }

    /// Binds import ordinal `import_ordinal` to an exported function of
    /// another loaded module — `spec.md` §3's `LinkType::Module`, "points
    /// to a resolved `FunctionDef` in another module at link time."
    pub fn bind_module_import(
        &mut self,
        module: ModuleId,
        import_ordinal: u32,
        target_module: ModuleId,
        target_function_ordinal: u32,
    ) -> Result<()> {
        self.entry_mut(module)?.bindings.insert(import_ordinal, Binding::Module(target_module, target_function_ordinal));
        Ok(())
    }

    fn entry(&self, id: ModuleId) -> Result<&LoadedModule> {
        self.modules.get(id.0 as usize).ok_or_else(|| {
            ErrorBuilder::new(ErrorKind::NotFound).with(format!("no module loaded with id {}", id.0)).build()
        })
    }

    fn entry_mut(&mut self, id: ModuleId) -> Result<&mut LoadedModule> {
        self.modules.get_mut(id.0 as usize).ok_or_else(|| {
            ErrorBuilder::new(ErrorKind::NotFound).with(format!("no module loaded with id {}", id.0)).build()
        })
    }

    /// Calls the exported function at `ordinal` within `module`, pushing and
    /// popping exactly one `StackFrame` (`spec.md` §4.6). `Interpreter::run`
    /// never pushes or pops frames itself (see `interpreter.rs`), so this is
    /// the one place responsible for both halves of every hop, including
    /// recursive ones through `Call`/`CallImport`.
    pub fn call(&self, interp: &mut Interpreter, module: ModuleId, ordinal: u32, inputs: Vec<Value>) -> Result<Vec<Value>> {
        let entry = self.entry(module)?;
        let func = entry.module.function_table.functions.get(ordinal as usize).ok_or_else(|| {
            ErrorBuilder::new(ErrorKind::OutOfRange)
                .with(format!("ordinal {ordinal} is not a valid function in this module"))
                .build()
        })?;

        match &entry.bodies[ordinal as usize] {
            Some(instructions) => {
                interp.stack.push_frame(func.slot_count as usize, inputs)?;
                let result = interp.run(
                    instructions,
                    |interp, kind, callee_ordinal, callee_inputs| match kind {
                        CallKind::Local => self.call(interp, module, callee_ordinal, callee_inputs),
                        CallKind::Import => self.call_import(interp, module, callee_ordinal, callee_inputs),
                    },
                    |_, _| {
                        Err(ErrorBuilder::new(ErrorKind::Unimplemented)
                            .with("this module performs HAL dispatch; run it through a Sequencer instead of Linker::call".to_string())
                            .build())
                    },
                );
                interp.stack.pop_frame()?;
                result
            }
            None => Err(ErrorBuilder::new(ErrorKind::FailedPrecondition)
                .with(format!("function ordinal {ordinal} ('{}') has no bytecode body and cannot be called directly", func.name))
                .build()),
        }
    }

    fn call_import(&self, interp: &mut Interpreter, module: ModuleId, import_ordinal: u32, inputs: Vec<Value>) -> Result<Vec<Value>> {
        match self.entry(module)?.bindings.get(&import_ordinal) {
            Some(Binding::NativeFunction(f)) => f(interp, inputs),
            Some(Binding::Module(target_module, target_ordinal)) => {
                let (target_module, target_ordinal) = (*target_module, *target_ordinal);
                self.call(interp, target_module, target_ordinal, inputs)
            }
            None => Err(ErrorBuilder::new(ErrorKind::FailedPrecondition)
                .with(format!("import ordinal {import_ordinal} has no bound native function or linked module"))
                .build()),
        }
    }
}

impl Default for Linker {
    fn default() -> Linker {
        Linker::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_bytecode::{FunctionTable, Opcode, TypeSignature};
    use rt_core::Type;
    use rt_hal::HostAllocator;

    fn write_slot_list(bytes: &mut Vec<u8>, slots: &[u32]) {
        bytes.push(slots.len() as u8);
        for &s in slots {
            bytes.extend_from_slice(&(s as u16).to_le_bytes());
        }
    }

    /// `const i32 <value>` (a rank-0 scalar) into slot 0, then `return %0`.
    fn bytecode_const_and_return(value: i32) -> Vec<u8> {
        let mut bytes = vec![Opcode::Const as u8, Type::I32.type_index(), 0, 0];
        bytes.extend_from_slice(&value.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes()); // result slot 0
        bytes.push(Opcode::Return as u8);
        write_slot_list(&mut bytes, &[0]);
        bytes
    }

    /// `call/call_import <ordinal>` with no inputs, one result into slot 0,
    /// then `return %0`.
    fn bytecode_call_and_return(opcode: Opcode, ordinal: u32) -> Vec<u8> {
        let mut bytes = vec![opcode as u8];
        bytes.extend_from_slice(&ordinal.to_le_bytes());
        write_slot_list(&mut bytes, &[]);
        write_slot_list(&mut bytes, &[0]);
        bytes.push(Opcode::Return as u8);
        write_slot_list(&mut bytes, &[0]);
        bytes
    }

    /// `Const` always materializes a `BufferView` (never a bare `Value::
    /// Scalar`, see `Interpreter::exec_const`), so reading a constant's
    /// value back out of a `Return` result means reading through the
    /// buffer, not `Value::as_scalar`.
    fn i32_value(value: &Value) -> i32 {
        value.as_buffer().unwrap().with_slice::<i32, i32>(|s| s[0])
    }

    fn new_interpreter() -> Interpreter {
        let allocator: Arc<dyn rt_hal::Allocator> = Arc::new(HostAllocator::new(1));
        Interpreter::new(256, allocator)
    }

    fn function(name: &str, slot_count: u32, body: Vec<u8>) -> FunctionDef {
        FunctionDef {
            name: name.to_string(),
            signature: TypeSignature::default(),
            slot_count,
            bytecode: Some(rt_bytecode::BytecodeDef { contents: body }),
        }
    }

    /// Wraps `main` (ordinal 0) alongside one placeholder import declaration
    /// (ordinal 1, no bytecode) so `imports: [1]` is a real, resolvable
    /// index — `CallImport`'s operand is the *position within this list*
    /// (here, `0`, pointing at import ordinal `1`), not the function
    /// ordinal directly.
    fn module_with_import(main: FunctionDef) -> Module {
        let import_placeholder =
            FunctionDef { name: "imported".to_string(), signature: TypeSignature::default(), slot_count: 0, bytecode: None };
        Module {
            function_table: FunctionTable { functions: vec![main, import_placeholder], imports: vec![1], exports: vec![0] },
        }
    }

    #[test]
    fn calls_local_function_and_returns_its_result() {
        let mut linker = Linker::new();
        let caller = function("caller", 1, bytecode_call_and_return(Opcode::Call, 1));
        let callee = function("callee", 1, bytecode_const_and_return(42));
        let module = Module {
            function_table: FunctionTable { functions: vec![caller, callee], imports: vec![], exports: vec![0] },
        };
        let id = linker.load_module(module).unwrap();

        let mut interp = new_interpreter();
        let result = linker.call(&mut interp, id, 0, vec![]).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(i32_value(&result[0]), 42);
        assert!(interp.stack.is_empty());
    }

    #[test]
    fn calling_unbound_import_is_failed_precondition() {
        let mut linker = Linker::new();
        let module = module_with_import(function(
            "uses_import",
            1,
            bytecode_call_and_return(Opcode::CallImport, 0),
        ));
        let id = linker.load_module(module).unwrap();

        let mut interp = new_interpreter();
        let err = linker.call(&mut interp, id, 0, vec![]).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::FailedPrecondition);
        assert!(interp.stack.is_empty());
    }

    #[test]
    fn native_import_binding_is_invoked() {
        let mut linker = Linker::new();
        let module = module_with_import(function(
            "uses_import",
            1,
            bytecode_call_and_return(Opcode::CallImport, 0),
        ));
        let id = linker.load_module(module).unwrap();
        linker.bind_native(id, 0, |_, _| Ok(vec![Value::Scalar(crate::value::Scalar::I32(7))])).unwrap();

        let mut interp = new_interpreter();
        let result = linker.call(&mut interp, id, 0, vec![]).unwrap();
        assert_eq!(result[0].as_scalar().unwrap().as_i64(), 7);
    }

    #[test]
    fn module_import_binding_hops_to_another_loaded_module() {
        let mut linker = Linker::new();
        let provider = module_with_import(function("provide", 1, bytecode_const_and_return(99)));
        let provider_id = linker.load_module(provider).unwrap();

        let consumer = module_with_import(function(
            "consume",
            1,
            bytecode_call_and_return(Opcode::CallImport, 0),
        ));
        let consumer_id = linker.load_module(consumer).unwrap();
        linker.bind_module_import(consumer_id, 0, provider_id, 0).unwrap();

        let mut interp = new_interpreter();
        let result = linker.call(&mut interp, consumer_id, 0, vec![]).unwrap();
        assert_eq!(i32_value(&result[0]), 99);
    }

    #[test]
    fn unknown_module_id_is_not_found() {
        let linker = Linker::new();
        let mut interp = new_interpreter();
        let bogus = ModuleId(7);
        let err = linker.call(&mut interp, bogus, 0, vec![]).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::NotFound);
    }
}
