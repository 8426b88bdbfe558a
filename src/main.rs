use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use pytac::ast;
use pytac::compiler::{compile, CompileResult, Options};
use pytac::diagnostics::Phase;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            // Internal failure, distinct from any compilation phase.
            ExitCode::from(5)
        }
    }
}

fn run() -> Result<ExitCode> {
    let mut options = Options::default();
    let mut input_path: Option<String> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" | "-d" => options.debug = true,
            "--no-ir" => options.emit_ir = false,
            "--help" | "-h" => {
                print_usage();
                return Ok(ExitCode::SUCCESS);
            }
            _ if arg.starts_with('-') => bail!("Unknown option '{arg}'"),
            _ => {
                if input_path.is_some() {
                    bail!("Only one input file is supported");
                }
                input_path = Some(arg);
            }
        }
    }

    let source = if let Some(path) = &input_path {
        fs::read_to_string(path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let result = compile(&source, &options);

    for diagnostic in &result.diagnostics {
        eprintln!("{diagnostic}");
    }
    if options.debug {
        print_debug_artifacts(&result);
    }
    if !result.success {
        print_summary(&result);
    }
    if let Some(ir) = result.ir_text() {
        print!("{ir}");
    }
    Ok(ExitCode::from(result.exit_code()))
}

fn print_debug_artifacts(result: &CompileResult<'_>) {
    if let Some(tokens) = &result.tokens {
        eprintln!("-- tokens ({})", tokens.len());
        for token in tokens {
            eprintln!("{}:{} {:?}", token.span.line, token.span.column, token.kind);
        }
    }
    if let Some(program) = &result.ast {
        eprintln!("-- ast");
        eprint!("{}", ast::to_source(program));
    }
    if let Some(tables) = &result.symbol_tables {
        eprintln!("-- symbols");
        eprint!("{}", tables.render());
    }
}

fn print_summary(result: &CompileResult<'_>) {
    for phase in [Phase::Lex, Phase::Parse, Phase::Semantic, Phase::Codegen] {
        let count = result.error_count(phase);
        if count > 0 {
            eprintln!("{count} {phase} error(s)");
        }
    }
    eprintln!("compilation failed (exit code {})", result.exit_code());
}

fn print_usage() {
    println!("Usage: pytac [options] [file]");
    println!("Reads from stdin when no file is given.");
    println!();
    println!("Options:");
    println!("  -d, --debug   Dump tokens, AST, and symbol tables to stderr");
    println!("      --no-ir   Skip printing the instruction listing");
    println!("  -h, --help    Show this help message");
}
