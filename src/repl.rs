use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::error::InterpretError;
use crate::vm::interpret;
use crate::vm::vm::Vm;

/// What the REPL should do with one line of input.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Skip,
    Exit,
    Run(&'a str),
}

fn classify(line: &str) -> Command<'_> {
    match line.trim() {
        "" => Command::Skip,
        "exit" => Command::Exit,
        source => Command::Run(source),
    }
}

/// Run the interactive REPL. Globals persist across lines; errors are
/// reported and the session continues.
pub fn run_repl() -> Result<(), ReadlineError> {
    let mut editor = DefaultEditor::new()?;
    let mut vm = Vm::new();
    println!("Camel REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' to quit.");

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        };

        match classify(&line) {
            Command::Skip => continue,
            Command::Exit => break,
            Command::Run(source) => {
                editor.add_history_entry(source)?;
                if let Err(e) = interpret(&mut vm, source) {
                    report(&e);
                }
            }
        }
    }
    Ok(())
}

fn report(error: &InterpretError) {
    match error {
        InterpretError::Compile(errors) => {
            for e in errors {
                eprintln!("{e}");
            }
        }
        InterpretError::Runtime(e) => eprintln!("{e}"),
    }
}
