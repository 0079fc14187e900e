// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Quill - compiler, disassembler and shell for the Quill scripting language
//!
//! ## Features
//!
//! - Interactive shell with highlighting, history and multi-line input
//! - Running files and snippets on the reference machine
//! - Disassembly listings
//! - Parallel checking of many files

mod config;
mod highlight;
mod repl;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use quill_compiler::vm::Machine;
use quill_compiler::{Bytecode, CompileError, Compiler, Error, GeneratorConfig};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::Theme;

/// Compiler and shell for the Quill scripting language
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// File to run; starts the shell when omitted
    file: Option<PathBuf>,

    /// Compile and run CODE
    #[arg(short, long = "eval", value_name = "CODE", conflicts_with = "file")]
    eval: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Keep statement values on the stack instead of discarding them
    #[arg(long, global = true)]
    no_pop: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the bytecode listing of a file
    #[command(alias = "dis")]
    Disasm {
        /// Source file
        file: PathBuf,
    },

    /// Compile and run a file
    Run {
        /// Source file
        file: PathBuf,
    },

    /// Compile files in parallel and report their diagnostics
    Check {
        /// Source files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let compiler = Compiler::new().with_config(if cli.no_pop {
        GeneratorConfig::repl()
    } else {
        GeneratorConfig::default()
    });

    match (&cli.command, &cli.eval, &cli.file) {
        (Some(Commands::Disasm { file }), _, _) => disassemble(&compiler, file),
        (Some(Commands::Run { file }), _, _) => run_file(&compiler, file, cli.no_pop),
        (Some(Commands::Check { files }), _, _) => check(&compiler, files),
        (None, Some(code), _) => run_source(&compiler, "<eval>", code, cli.no_pop),
        (None, None, Some(file)) => run_file(&compiler, file, cli.no_pop),
        (None, None, None) => run_repl(),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("quill=debug,quill_compiler=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("quill=warn,quill_compiler=warn"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run_repl() -> ExitCode {
    let theme = Theme::load().unwrap_or_else(|err| {
        eprintln!("{}: {}", "Warning".yellow().bold(), err);
        Theme::default()
    });

    let mut repl = match repl::Repl::new(theme) {
        Ok(repl) => repl,
        Err(err) => {
            eprintln!("{}: failed to start the shell: {:?}", "Error".red().bold(), err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = repl.run() {
        eprintln!("{}: {:?}", "Error".red().bold(), err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn read_source(path: &Path) -> Result<String, Error> {
    Ok(std::fs::read_to_string(path)?)
}

/// Compiles one unit, printing its diagnostics prefixed with `name`.
fn build(compiler: &Compiler, name: &str, source: &str) -> Option<Bytecode> {
    let compilation = compiler.compile(source);
    report(name, compilation.diagnostics.iter());
    compiler.generate(&compilation).ok()
}

fn report<'a>(name: &str, errors: impl Iterator<Item = &'a CompileError>) {
    for error in errors {
        eprintln!("{}: {}: {}", name.bold(), "error".red().bold(), error);
    }
}

fn run_file(compiler: &Compiler, path: &Path, echo: bool) -> ExitCode {
    match read_source(path) {
        Ok(source) => run_source(compiler, &path.display().to_string(), &source, echo),
        Err(err) => {
            eprintln!("{}: {}: {}", path.display().bold(), "error".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn run_source(compiler: &Compiler, name: &str, source: &str, echo: bool) -> ExitCode {
    let Some(bytecode) = build(compiler, name, source) else {
        return ExitCode::FAILURE;
    };

    let mut machine = Machine::new();
    let result = machine.run(&bytecode);
    print!("{}", machine.take_output());

    match result {
        Ok(()) => {
            if echo && let Some(value) = machine.pop() {
                println!("{value}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}: {}", name.bold(), err.red());
            ExitCode::FAILURE
        }
    }
}

fn disassemble(compiler: &Compiler, path: &Path) -> ExitCode {
    let name = path.display().to_string();
    let source = match read_source(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}: {}: {}", name.bold(), "error".red().bold(), err);
            return ExitCode::FAILURE;
        }
    };
    match build(compiler, &name, &source) {
        Some(bytecode) => {
            print!("{}", bytecode.disassemble());
            ExitCode::SUCCESS
        }
        None => ExitCode::FAILURE,
    }
}

/// Compiles every file on the rayon pool, one compilation per file, and
/// reports in argument order.
fn check(compiler: &Compiler, files: &[PathBuf]) -> ExitCode {
    let results: Vec<Result<Vec<CompileError>, Error>> = files
        .par_iter()
        .map(|path| {
            let source = read_source(path)?;
            Ok(compiler.compile(&source).diagnostics.into_vec())
        })
        .collect();

    let mut failed = 0;
    for (path, result) in files.iter().zip(&results) {
        let name = path.display().to_string();
        match result {
            Ok(errors) if errors.is_empty() => {
                tracing::debug!(file = %name, "ok");
            }
            Ok(errors) => {
                failed += 1;
                report(&name, errors.iter());
            }
            Err(err) => {
                failed += 1;
                eprintln!("{}: {}: {}", name.bold(), "error".red().bold(), err);
            }
        }
    }

    if failed > 0 {
        eprintln!("{} of {} file(s) failed", failed, files.len());
        ExitCode::FAILURE
    } else {
        println!("{} file(s) ok", files.len());
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::parse_from(["quill", "check", "a.ql", "b.ql"]);
        assert!(matches!(cli.command, Some(Commands::Check { files }) if files.len() == 2));

        let cli = Cli::parse_from(["quill", "--no-pop", "-e", "1 + 1"]);
        assert!(cli.no_pop);
        assert_eq!(cli.eval.as_deref(), Some("1 + 1"));

        let cli = Cli::parse_from(["quill", "script.ql"]);
        assert_eq!(cli.file, Some(PathBuf::from("script.ql")));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_build_reports_failure() {
        let compiler = Compiler::new();
        assert!(build(&compiler, "t", "print undefined_name").is_none());
        assert!(build(&compiler, "t", "print 1").is_some());
    }
}
