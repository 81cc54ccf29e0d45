use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::debug;

use camel::ast::printer;
use camel::error::{CompileError, InterpretError};
use camel::parser::Parser as CamelParser;
use camel::scanner::Lexer;
use camel::vm::chunk::{self, Chunk};
use camel::vm::vm::Vm;

const EXIT_USAGE: u8 = 64;
const EXIT_IO: u8 = 74;

#[derive(Parser, Debug)]
#[command(name = "camel", version, about = "Camel scripting language bytecode VM")]
struct Cli {
    /// Camel source file to run (omit for REPL)
    file: Option<PathBuf>,

    /// Dump tokens and exit
    #[arg(long)]
    dump_tokens: bool,

    /// Dump AST and exit
    #[arg(long)]
    dump_ast: bool,

    /// AST output format
    #[arg(long, default_value = "sexp", value_parser = ["sexp", "json"])]
    ast_format: String,

    /// Save compiled bytecode to a file
    #[arg(long, value_name = "FILE")]
    save_bytecode: Option<PathBuf>,

    /// Load and execute bytecode from a file
    #[arg(long, value_name = "FILE")]
    load_bytecode: Option<PathBuf>,

    /// Disassemble bytecode (from source or saved file) and print
    #[arg(long)]
    disassemble: bool,
}

fn source_name(cli: &Cli) -> String {
    cli.file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<script>".to_string())
}

fn read_source(cli: &Cli) -> Result<String> {
    match &cli.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read source file '{}'", path.display())),
        None => bail!("source file required for this operation"),
    }
}

fn save_chunk(compiled: &Chunk, path: &Path) -> Result<()> {
    let bytes = compiled.to_bytes()?;
    std::fs::write(path, bytes).with_context(|| format!("write bytecode to '{}'", path.display()))
}

fn load_chunk(path: &Path) -> Result<Chunk> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read bytecode from '{}'", path.display()))?;
    Chunk::from_bytes(&bytes).with_context(|| format!("load bytecode '{}'", path.display()))
}

/// Print compile errors as miette reports with the source attached.
fn print_compile_errors(errors: Vec<CompileError>, name: &str, source: &str) {
    for e in errors {
        let report = miette::Report::new(e.with_source_code(name, source));
        eprintln!("{report:?}");
    }
}

fn report_error(error: InterpretError, name: &str, source: &str) -> ExitCode {
    let code = ExitCode::from(error.exit_code());
    match error {
        InterpretError::Compile(errors) => print_compile_errors(errors, name, source),
        InterpretError::Runtime(e) => eprintln!("{e}"),
    }
    code
}

fn compile_or_report(cli: &Cli, source: &str) -> std::result::Result<Chunk, ExitCode> {
    camel::compile_to_chunk(source)
        .map_err(|errors| report_error(errors.into(), &source_name(cli), source))
}

fn run(cli: &Cli) -> Result<ExitCode> {
    if cli.dump_tokens {
        let source = read_source(cli)?;
        for token in Lexer::new(&source) {
            println!("{token}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if cli.dump_ast {
        let source = read_source(cli)?;
        let program = match CamelParser::from_source(&source).parse() {
            Ok(program) => program,
            Err(errors) => return Ok(report_error(errors.into(), &source_name(cli), &source)),
        };
        match cli.ast_format.as_str() {
            "json" => println!("{}", printer::to_json(&program).context("serialize AST")?),
            _ => print!("{}", printer::to_sexp(&program)),
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Load bytecode from file and execute or disassemble
    if let Some(ref path) = cli.load_bytecode {
        let compiled = load_chunk(path)?;
        if cli.disassemble {
            print!("{}", chunk::disassemble(&compiled, &path.display().to_string())?);
            return Ok(ExitCode::SUCCESS);
        }
        let mut vm = Vm::new();
        return Ok(match vm.run(&compiled) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => report_error(e.into(), "", ""),
        });
    }

    // Disassemble source to bytecode listing
    if cli.disassemble {
        let source = read_source(cli)?;
        let compiled = match compile_or_report(cli, &source) {
            Ok(compiled) => compiled,
            Err(code) => return Ok(code),
        };
        print!("{}", chunk::disassemble(&compiled, &source_name(cli))?);
        return Ok(ExitCode::SUCCESS);
    }

    // Save bytecode to file
    if let Some(ref path) = cli.save_bytecode {
        let source = read_source(cli)?;
        let compiled = match compile_or_report(cli, &source) {
            Ok(compiled) => compiled,
            Err(code) => return Ok(code),
        };
        save_chunk(&compiled, path)?;
        eprintln!("bytecode saved to '{}'", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    match cli.file {
        Some(_) => {
            let source = read_source(cli)?;
            let mut vm = Vm::new();
            Ok(match camel::interpret(&mut vm, &source) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => report_error(e, &source_name(cli), &source),
            })
        }
        None => {
            camel::repl::run_repl().context("REPL input failed")?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    debug!("{cli:?}");

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_IO)
        }
    }
}
