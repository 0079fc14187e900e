//! Line highlighter driven by the compiler's own lexer.

use owo_colors::OwoColorize;
use quill_compiler::lexer::{Lexer, Tag};

use crate::config::Theme;

/// Re-lexes a line and colours each token by its tag.
pub struct LineHighlighter {
    lexer: Lexer,
    theme: Theme,
}

impl LineHighlighter {
    /// Creates a highlighter with the standard lexer.
    pub fn new(theme: Theme) -> Self {
        Self {
            lexer: Lexer::default(),
            theme,
        }
    }

    /// Returns `line` with ANSI colours. Input the lexer cannot consume is
    /// shown in red from the failing position on.
    pub fn highlight(&self, line: &str) -> String {
        let (tokens, error) = self.lexer.tokenize_partial(line);
        let mut out = String::with_capacity(line.len() * 2);
        let mut end = 0;

        for token in &tokens {
            out.push_str(&line[end..token.span.start]);
            out.push_str(&self.paint(token.tag, &token.text));
            end = token.span.end;
        }

        let rest = &line[end..];
        if error.is_some() {
            out.push_str(&rest.red().to_string());
        } else {
            out.push_str(rest);
        }
        out
    }

    fn paint(&self, tag: Tag, text: &str) -> String {
        match self.theme.color(tag).ansi() {
            Some(color) => text.color(color).to_string(),
            None => text.to_string(),
        }
    }
}
