//! The lexer that turns source text into tagged tokens.

use regex::Regex;

use super::literals;
use super::token::{Span, Tag, Token, tags};
use crate::error::CompileError;

/// How a recognizer decides whether it matches at the current position.
#[derive(Debug, Clone)]
pub enum Recognizer {
    /// A regular expression anchored at the current position
    Pattern(Regex),
    /// A hand-written matcher returning the matched byte length
    Custom(fn(&str) -> Option<usize>),
}

impl Recognizer {
    /// Length of the match at the start of `input`, if any.
    pub fn matches(&self, input: &str) -> Option<usize> {
        match self {
            Recognizer::Pattern(regex) => regex.find(input).map(|m| m.end()),
            Recognizer::Custom(matcher) => matcher(input),
        }
    }
}

/// An ordered list of named recognizers.
///
/// Recognizers are tried in registration order and the first one that
/// consumes input wins, so keywords and multi-character operators go before
/// identifiers and single-character operators.
#[derive(Debug, Clone)]
pub struct Lexer {
    recognizers: Vec<(Tag, Recognizer)>,
}

impl Lexer {
    /// Creates a lexer with no recognizers.
    pub fn new() -> Self {
        Self {
            recognizers: Vec::new(),
        }
    }

    /// Creates a lexer with the language's recognizer table.
    pub fn standard() -> Result<Self, regex::Error> {
        let mut lexer = Self::new();
        lexer
            .register_custom(tags::NEWLINE, literals::newline_run)
            .register_custom(tags::TXT, literals::string_literal)
            .register_pattern(tags::COMMENT, r"//[^\n]*")?
            .register_pattern(tags::NUM, r"[0-9]+(\.[0-9]+)?")?
            .register_pattern(tags::BOOL, r"(true|false)\b")?
            .register_pattern(tags::NULL, r"null\b")?
            .register_pattern(tags::PRINT, r"print\b")?
            .register_pattern(tags::SEMICOLON, r";")?
            .register_pattern(tags::EXPONENTIATION, r"\*\*")?
            .register_pattern(tags::OP1, r"\*|/|%")?
            .register_pattern(tags::OP2, r"-|\+")?
            .register_pattern(tags::OP3, r"\|\||&&|\||&|\^|>>|<<|(and|or)\b")?
            .register_pattern(tags::COMP, r"!=|==|<=|>=|<|>")?
            .register_pattern(tags::NOT, r"!|not\b")?
            .register_pattern(tags::TILDE, r"~")?
            .register_pattern(tags::SET, r"=")?
            .register_pattern(tags::WHILE, r"while\b")?
            .register_pattern(tags::IF, r"if\b")?
            .register_pattern(tags::ELSEIF, r"else\s+if\b")?
            .register_pattern(tags::ELSE, r"else\b")?
            .register_pattern(tags::IGNORE, r"[ \t\r]+")?
            .register_pattern(tags::LEFT_BRACE, r"\{")?
            .register_pattern(tags::RIGHT_BRACE, r"\}")?
            .register_pattern(tags::LEFT_PARENTHESIS, r"\(")?
            .register_pattern(tags::RIGHT_PARENTHESIS, r"\)")?
            .register_pattern(tags::LEFT_BRACKET, r"\[")?
            .register_pattern(tags::RIGHT_BRACKET, r"\]")?
            .register_pattern(tags::COLON, r":")?
            .register_pattern(tags::DOT, r"\.")?
            .register_pattern(tags::COMMA, r",")?
            .register_pattern(tags::VAR, r"var\b")?
            .register_pattern(tags::FUNC, r"func\b")?
            .register_pattern(tags::RETURN, r"return\b")?
            .register_pattern(tags::CONTINUE, r"continue\b")?
            .register_pattern(tags::BREAK, r"break\b")?
            .register_pattern(tags::CLASS, r"class\b")?
            .register_pattern(tags::EXTENDS, r"extends\b")?
            .register_pattern(tags::NEW, r"new\b")?
            .register_pattern(tags::THIS, r"this\b")?
            .register_pattern(tags::SUPER, r"super\b")?
            .register_pattern(tags::ID, r"[A-Za-z_][A-Za-z0-9_]*")?;
        Ok(lexer)
    }

    /// Appends a regular-expression recognizer.
    ///
    /// The pattern is anchored at the current input position.
    pub fn register_pattern(&mut self, tag: Tag, pattern: &str) -> Result<&mut Self, regex::Error> {
        let anchored = Regex::new(&format!("^(?:{pattern})"))?;
        self.recognizers.push((tag, Recognizer::Pattern(anchored)));
        Ok(self)
    }

    /// Appends a custom recognizer.
    pub fn register_custom(&mut self, tag: Tag, matcher: fn(&str) -> Option<usize>) -> &mut Self {
        self.recognizers.push((tag, Recognizer::Custom(matcher)));
        self
    }

    /// Number of registered recognizers.
    pub fn len(&self) -> usize {
        self.recognizers.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }

    /// Tokenizes the whole source.
    ///
    /// Fails at the first position no recognizer can consume; nothing lexed
    /// before that point is returned.
    pub fn tokenize(&self, source: &str) -> Result<Vec<Token>, CompileError> {
        match self.tokenize_partial(source) {
            (tokens, None) => Ok(tokens),
            (_, Some(error)) => Err(error),
        }
    }

    /// Tokenizes as far as possible.
    ///
    /// Returns the tokens recognized before the first failure together with
    /// the failure, if any. Used by the highlighter and the shell, which
    /// need to work on incomplete input.
    pub fn tokenize_partial(&self, source: &str) -> (Vec<Token>, Option<CompileError>) {
        let mut tokens = Vec::new();
        let mut offset = 0;
        let mut line = 1;

        while offset < source.len() {
            let rest = &source[offset..];
            let Some((tag, len)) = self.recognize(rest) else {
                let snippet: String = rest.chars().take(12).collect();
                tracing::debug!(line, offset, "no recognizer matched");
                return (
                    tokens,
                    Some(CompileError::Lexical {
                        line,
                        offset,
                        snippet,
                    }),
                );
            };

            let text = &rest[..len];
            tokens.push(Token::new(tag, text, line, Span::new(offset, offset + len)));
            line += text.matches('\n').count();
            offset += len;
        }

        (tokens, None)
    }

    /// First recognizer that makes progress on `input`.
    fn recognize(&self, input: &str) -> Option<(Tag, usize)> {
        self.recognizers.iter().find_map(|(tag, recognizer)| {
            recognizer
                .matches(input)
                .filter(|&len| len > 0)
                .map(|len| (*tag, len))
        })
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Self::standard().expect("built-in recognizer patterns are valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags_of(src: &str) -> Vec<Tag> {
        Lexer::default()
            .tokenize(src)
            .expect("should tokenize")
            .into_iter()
            .map(|t| t.tag)
            .filter(|t| *t != tags::IGNORE)
            .collect()
    }

    #[test]
    fn test_standard_table_builds() {
        assert!(Lexer::standard().is_ok());
        assert!(Lexer::new().is_empty());
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            tags_of("10 * 2 + 5 ** 2"),
            vec![
                tags::NUM,
                tags::OP1,
                tags::NUM,
                tags::OP2,
                tags::NUM,
                tags::EXPONENTIATION,
                tags::NUM
            ]
        );
    }

    #[test]
    fn test_keywords_need_word_boundary() {
        assert_eq!(tags_of("order"), vec![tags::ID]);
        assert_eq!(tags_of("a or b"), vec![tags::ID, tags::OP3, tags::ID]);
        assert_eq!(tags_of("iffy"), vec![tags::ID]);
        assert_eq!(tags_of("variable"), vec![tags::ID]);
    }

    #[test]
    fn test_multi_character_operators_first() {
        assert_eq!(tags_of("a == b"), vec![tags::ID, tags::COMP, tags::ID]);
        assert_eq!(tags_of("a != b"), vec![tags::ID, tags::COMP, tags::ID]);
        assert_eq!(tags_of("!a"), vec![tags::NOT, tags::ID]);
        assert_eq!(tags_of("a << 2"), vec![tags::ID, tags::OP3, tags::NUM]);
        assert_eq!(tags_of("a && b"), vec![tags::ID, tags::OP3, tags::ID]);
        assert_eq!(tags_of("x = 1"), vec![tags::ID, tags::SET, tags::NUM]);
    }

    #[test]
    fn test_else_if() {
        assert_eq!(
            tags_of("else if else"),
            vec![tags::ELSEIF, tags::ELSE]
        );
    }

    #[test]
    fn test_line_numbers() {
        let tokens = Lexer::default().tokenize("a\n\nb \"x\ny\" c").unwrap();
        let lines: Vec<(Tag, usize)> = tokens
            .iter()
            .filter(|t| t.tag != tags::IGNORE)
            .map(|t| (t.tag, t.line))
            .collect();
        assert_eq!(
            lines,
            vec![
                (tags::ID, 1),
                (tags::NEWLINE, 1),
                (tags::ID, 3),
                (tags::TXT, 3),
                (tags::ID, 4),
            ]
        );
    }

    #[test]
    fn test_comment() {
        assert_eq!(
            tags_of("a // note\nb"),
            vec![tags::ID, tags::COMMENT, tags::NEWLINE, tags::ID]
        );
    }

    #[test]
    fn test_lexical_error() {
        let err = Lexer::default().tokenize("a = 1\nb = $").unwrap_err();
        assert!(matches!(err, CompileError::Lexical { line: 2, offset: 10, .. }));
    }

    #[test]
    fn test_partial_keeps_prefix() {
        let (tokens, error) = Lexer::default().tokenize_partial("if x { \"open");
        assert!(error.is_some());
        let tags: Vec<Tag> = tokens.iter().map(|t| t.tag).collect();
        assert_eq!(
            tags,
            vec![
                tags::IF,
                tags::IGNORE,
                tags::ID,
                tags::IGNORE,
                tags::LEFT_BRACE,
                tags::IGNORE
            ]
        );
    }

    #[test]
    fn test_custom_registration_order() {
        let mut lexer = Lexer::new();
        lexer.register_pattern("WORD", "[a-z]+").unwrap();
        lexer.register_pattern("KEY", "key").unwrap();
        let tokens = lexer.tokenize("key").unwrap();
        assert_eq!(tokens[0].tag, "WORD");
    }
}
