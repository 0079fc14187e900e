// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive shell for Quill.
//!
//! Each accepted input is compiled as its own unit and run on one long-lived
//! [`Machine`], so globals, functions and classes carry over between inputs.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use quill_compiler::lexer::{Lexer, tags};
use quill_compiler::vm::{Machine, Value};
use quill_compiler::{Compiler, GeneratorConfig};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config, Editor, Helper};

use crate::config::Theme;
use crate::highlight::LineHighlighter;

const HISTORY_FILE: &str = ".quill_history";
const MAX_HISTORY_SIZE: usize = 1000;

const KEYWORDS: &[&str] = &[
    "break", "class", "continue", "else", "extends", "false", "func", "if", "new", "not",
    "null", "print", "return", "super", "this", "true", "var", "while",
];

/// Shell commands, written with a leading dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
    Bytecode,
    Globals,
}

impl ReplCommand {
    /// Parses a command and its argument.
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let rest = input.trim().strip_prefix('.')?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        let command = match cmd.as_str() {
            "help" | "h" | "?" => ReplCommand::Help,
            "exit" | "quit" | "q" => ReplCommand::Exit,
            "clear" | "cls" => ReplCommand::Clear,
            "version" | "v" => ReplCommand::Version,
            "load" | "l" => ReplCommand::Load,
            "bytecode" | "bc" => ReplCommand::Bytecode,
            "globals" | "g" => ReplCommand::Globals,
            _ => return None,
        };
        Some((command, arg))
    }

    /// Commands with their descriptions, for help and completion.
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the shell"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".load <file>", "Compile and run a file in this session"),
            (".bytecode", "Toggle printing the disassembly of each input"),
            (".globals", "List the globals declared so far"),
        ]
    }
}

/// Returns true while the input has unclosed brackets, an unterminated
/// string or a trailing operator.
fn needs_more(lexer: &Lexer, input: &str) -> bool {
    let (tokens, error) = lexer.tokenize_partial(input);
    if error.is_some() {
        let end = tokens.last().map_or(0, |t| t.span.end);
        return input[end..].starts_with(['"', '\'']);
    }

    let mut depth: i64 = 0;
    for token in &tokens {
        match token.tag {
            tags::LEFT_BRACE | tags::LEFT_PARENTHESIS | tags::LEFT_BRACKET => depth += 1,
            tags::RIGHT_BRACE | tags::RIGHT_PARENTHESIS | tags::RIGHT_BRACKET => depth -= 1,
            _ => {}
        }
    }
    if depth > 0 {
        return true;
    }

    let last = tokens
        .iter()
        .rev()
        .find(|t| !matches!(t.tag, tags::IGNORE | tags::NEWLINE | tags::COMMENT));
    matches!(
        last.map(|t| t.tag),
        Some(
            tags::OP1
                | tags::OP2
                | tags::OP3
                | tags::COMP
                | tags::EXPONENTIATION
                | tags::SET
                | tags::COMMA
                | tags::DOT
        )
    )
}

/// Completion, hints, highlighting and multi-line validation.
struct QuillHelper {
    words: Vec<String>,
    lexer: Lexer,
    highlighter: LineHighlighter,
}

impl QuillHelper {
    fn new(theme: Theme) -> Self {
        let words = KEYWORDS
            .iter()
            .map(|w| w.to_string())
            .chain(ReplCommand::all_commands().iter().map(|(cmd, _)| {
                cmd.split_whitespace().next().unwrap_or(cmd).to_string()
            }))
            .collect();
        Self {
            words,
            lexer: Lexer::default(),
            highlighter: LineHighlighter::new(theme),
        }
    }

    fn word_start(line: &str) -> usize {
        line.rfind(|c: char| !c.is_alphanumeric() && c != '_' && c != '.')
            .map_or(0, |i| i + 1)
    }
}

impl Completer for QuillHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = Self::word_start(&line[..pos]);
        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, Vec::new()));
        }

        let matches = self
            .words
            .iter()
            .filter(|w| w.starts_with(word))
            .map(|w| Pair {
                display: w.clone(),
                replacement: w[word.len()..].to_string(),
            })
            .collect();
        Ok((pos, matches))
    }
}

impl Hinter for QuillHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        let word = &line[Self::word_start(line)..];
        if word.len() < 2 {
            return None;
        }
        self.words
            .iter()
            .find(|w| w.starts_with(word) && w.len() > word.len())
            .map(|w| (&w[word.len()..]).dimmed().to_string())
    }
}

impl Highlighter for QuillHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.trim_start().starts_with('.') {
            return Cow::Owned(line.magenta().to_string());
        }
        Cow::Owned(self.highlighter.highlight(line))
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Borrowed(hint)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Validator for QuillHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        if !input.trim_start().starts_with('.') && needs_more(&self.lexer, input) {
            return Ok(ValidationResult::Incomplete);
        }
        Ok(ValidationResult::Valid(None))
    }
}

impl Helper for QuillHelper {}

/// Result of a shell command.
enum CommandResult {
    Continue,
    Exit,
}

/// The interactive shell.
pub struct Repl {
    compiler: Compiler,
    machine: Machine,
    globals: BTreeSet<String>,
    show_bytecode: bool,
    editor: Editor<QuillHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    /// Creates a shell. Statement values stay on the stack so the last one
    /// can be echoed.
    pub fn new(theme: Theme) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(QuillHelper::new(theme)));

        let history_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quill")
            .join(HISTORY_FILE);
        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.load_history(&history_path);

        Ok(Self {
            compiler: Compiler::new().with_config(GeneratorConfig::repl()),
            machine: Machine::new(),
            globals: BTreeSet::new(),
            show_bytecode: false,
            editor,
            history_path,
        })
    }

    /// Runs the read-eval-print loop until `.exit` or end of input.
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            let prompt = format!("{} ", "quill>".bright_green().bold());
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }
                    self.eval_and_print(&line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        if let Err(err) = self.editor.save_history(&self.history_path) {
            tracing::debug!(%err, "could not save history");
        }
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!(
            "  {} {} {}",
            "Quill".white().bold(),
            "v".dimmed(),
            env!("CARGO_PKG_VERSION").bright_yellow()
        );
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => {
                println!("{}: {}", "Quill".bright_cyan().bold(), env!("CARGO_PKG_VERSION"));
            }
            ReplCommand::Load => match arg {
                Some(path) => self.load_file(Path::new(path)),
                None => eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    ".load".cyan(),
                    "requires a file path".dimmed()
                ),
            },
            ReplCommand::Bytecode => {
                self.show_bytecode = !self.show_bytecode;
                let state = if self.show_bytecode { "on" } else { "off" };
                println!("{} {}", "bytecode".dimmed(), state.cyan());
            }
            ReplCommand::Globals => {
                for name in &self.globals {
                    let value = self.machine.global(name).cloned().unwrap_or_default();
                    println!("  {} = {}", name.cyan(), format_value(&value));
                }
            }
        }
        CommandResult::Continue
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Shell Commands:".white().bold());
        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:16} {}", cmd.cyan(), desc.dimmed());
        }
        println!();
        println!("{}", "Keyboard Shortcuts:".white().bold());
        println!("  {:16} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
        println!("  {:16} {}", "Ctrl+D".yellow(), "Exit".dimmed());
        println!("  {:16} {}", "Tab".yellow(), "Complete keywords".dimmed());
        println!();
    }

    fn load_file(&mut self, path: &Path) {
        match std::fs::read_to_string(path) {
            Ok(source) => self.eval_and_print(&source),
            Err(err) => eprintln!(
                "{}: cannot read {}: {}",
                "Error".red().bold(),
                path.display(),
                err
            ),
        }
    }

    fn eval_and_print(&mut self, input: &str) {
        let compilation = self
            .compiler
            .compile_with_globals(input, self.globals.iter().map(String::as_str));
        if !compilation.is_ok() {
            for error in compilation.diagnostics.iter() {
                print_error(&error.to_string());
            }
            return;
        }

        let bytecode = match self.compiler.generate(&compilation) {
            Ok(bytecode) => bytecode,
            Err(err) => return print_error(&err.to_string()),
        };
        if self.show_bytecode {
            print!("{}", bytecode.disassemble().dimmed());
        }

        let depth = self.machine.stack().len();
        let result = self.machine.run(&bytecode);
        print!("{}", self.machine.take_output());

        match result {
            Ok(()) => {
                self.globals
                    .extend(compilation.bindings.globals().map(str::to_string));
                if self.machine.stack().len() > depth
                    && let Some(value) = self.machine.pop()
                {
                    println!("{}", format_value(&value));
                }
                self.machine.recover(depth);
            }
            Err(err) => {
                print_error(&err.to_string());
                self.machine.recover(depth);
            }
        }
    }
}

/// Formats a value with colours by type.
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".blue().to_string(),
        Value::Boolean(b) => b.yellow().to_string(),
        Value::Number(_) => value.yellow().to_string(),
        Value::String(s) => format!("{s:?}").green().to_string(),
        Value::Function(_) | Value::Class(_) => value.magenta().to_string(),
        _ => value.cyan().to_string(),
    }
}

/// Prints an error with its kind in red.
fn print_error(message: &str) {
    match message.split_once(':') {
        Some((kind, rest)) => eprintln!("{}:{}", kind.red().bold(), rest),
        None => eprintln!("{}", message.red()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repl_command_parse() {
        assert!(matches!(ReplCommand::parse(".help"), Some((ReplCommand::Help, None))));
        assert!(matches!(ReplCommand::parse(".q"), Some((ReplCommand::Exit, None))));
        assert!(matches!(
            ReplCommand::parse(".load  demo.ql"),
            Some((ReplCommand::Load, Some("demo.ql")))
        ));
        assert!(matches!(ReplCommand::parse(".bc"), Some((ReplCommand::Bytecode, None))));
        assert!(ReplCommand::parse("print 1").is_none());
        assert!(ReplCommand::parse(".unknown").is_none());
    }

    #[test]
    fn test_needs_more() {
        let lexer = Lexer::default();
        assert!(needs_more(&lexer, "while x < 3 {"));
        assert!(needs_more(&lexer, "func f(a,"));
        assert!(needs_more(&lexer, "var xs = [1, 2"));
        assert!(needs_more(&lexer, "var x = 1 +"));
        assert!(needs_more(&lexer, "print \"open"));
        assert!(!needs_more(&lexer, "while x < 3 {\n  x = x + 1\n}"));
        assert!(!needs_more(&lexer, "print \"{\""));
        assert!(!needs_more(&lexer, "var x = 1 // {"));
        assert!(!needs_more(&lexer, "x $"));
    }
}
