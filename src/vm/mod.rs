pub mod chunk;
pub mod compiler;
pub mod stack;
pub mod table;
pub mod value;
#[allow(clippy::module_inception)]
pub mod vm;

use log::debug;

use crate::error::{CompileError, InterpretError};
use crate::parser::Parser;
use crate::vm::chunk::Chunk;
use crate::vm::compiler::Compiler;
use crate::vm::vm::Vm;

/// Parse and compile source code to a chunk without running it.
pub fn compile_to_chunk(source: &str) -> Result<Chunk, Vec<CompileError>> {
    let program = Parser::from_source(source).parse()?;
    debug!("parsed {} top-level declarations", program.declarations.len());
    let chunk = Compiler::new().compile(&program).map_err(|e| vec![e])?;
    debug!(
        "compiled {} bytes, {} constants",
        chunk.code.len(),
        chunk.constants.len()
    );
    Ok(chunk)
}

/// Compile `source` and run it on `vm`. Nothing executes if compilation
/// fails; globals defined by earlier calls on the same `vm` stay visible.
pub fn interpret(vm: &mut Vm, source: &str) -> Result<(), InterpretError> {
    let chunk = compile_to_chunk(source)?;
    vm.run(&chunk)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_errors_skip_execution() {
        let mut vm = Vm::capturing();
        let err = interpret(&mut vm, "print 1\nprint +").expect_err("parse error");
        assert!(matches!(err, InterpretError::Compile(ref errors) if errors.len() == 1));
        assert_eq!(err.exit_code(), 65);
        assert!(vm.output().is_empty());
    }

    #[test]
    fn codegen_errors_are_compile_errors() {
        let mut vm = Vm::capturing();
        let err = interpret(&mut vm, "define x: u8 = 300").expect_err("out of range");
        let InterpretError::Compile(errors) = err else {
            panic!("expected compile error");
        };
        assert!(matches!(errors[0], CompileError::Codegen { .. }));
    }

    #[test]
    fn runtime_error_after_partial_output() {
        let mut vm = Vm::capturing();
        let err = interpret(&mut vm, "print 1\nprint 1 / 0\nprint 2").expect_err("runtime");
        assert_eq!(err.exit_code(), 70);
        assert_eq!(err.to_string(), "[line 2] Division by zero");
        assert_eq!(vm.output(), ["1"]);
    }

    #[test]
    fn vm_recovers_after_runtime_error() {
        let mut vm = Vm::capturing();
        interpret(&mut vm, "define x = 1").expect("define");
        interpret(&mut vm, "print x + nil").expect_err("type error");
        interpret(&mut vm, "print x").expect("globals survive");
        assert_eq!(vm.output(), ["1"]);
    }
}
