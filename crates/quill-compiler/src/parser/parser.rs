//! Rule application over a token stream.

use regex::Regex;

use super::stream::{Entry, TagMap, TokenStream};
use crate::Diagnostics;
use crate::ast::{Ast, NodeId};
use crate::lexer::{Span, Tag, Token, tags};

/// What a builder gets besides the consumed tokens.
pub struct BuildContext<'a> {
    /// Arena the built nodes go into
    pub ast: &'a mut Ast,
    /// Collector for structural errors
    pub diagnostics: &'a mut Diagnostics,
}

/// Builds the node for a reduced span. Receives a child parser holding only
/// the consumed tokens. `None` leaves the new token without a node.
pub type Builder = fn(&mut Parser<'_>, &mut BuildContext<'_>) -> Option<NodeId>;

/// Decides whether a structurally valid match may be reduced.
pub type Predicate = fn(&Parser<'_>, &Match) -> bool;

/// Where a rule matched, in active-list terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Active index of the first consumed token
    pub start: usize,
    /// Number of consumed active tokens
    pub len: usize,
}

impl Match {
    /// Active index of the token right before the match.
    pub fn before(&self) -> Option<usize> {
        self.start.checked_sub(1)
    }

    /// Active index of the token right after the match.
    pub fn after(&self) -> usize {
        self.start + self.len
    }
}

/// A grammar rule: a pattern over tags and what to reduce it to.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: String,
    regex: Regex,
    result: Tag,
    builder: Builder,
    included: Vec<Tag>,
    predicate: Option<Predicate>,
}

impl Rule {
    /// Creates a rule reducing `pattern` to a `result` token built by `builder`.
    pub fn new(pattern: &str, result: Tag, builder: Builder) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&format!(" (?:{pattern}) "))?,
            result,
            builder,
            included: Vec::new(),
            predicate: None,
        })
    }

    /// Lets the rule see detached tokens with these tags.
    pub fn including(mut self, tags: &[Tag]) -> Self {
        self.included.extend_from_slice(tags);
        self
    }

    /// Only reduce matches the predicate accepts.
    pub fn when(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// The tag pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Tag of the token a reduction produces.
    pub fn result(&self) -> Tag {
        self.result
    }
}

/// A token list being rewritten by rules.
///
/// Builders run on a child parser holding just the tokens of the span being
/// reduced; its parent is the parser the span was taken from.
#[derive(Debug)]
pub struct Parser<'p> {
    stream: TokenStream,
    parent: Option<&'p Parser<'p>>,
}

impl Parser<'static> {
    /// Creates a top-level parser.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            stream: TokenStream::new(tokens),
            parent: None,
        }
    }
}

impl<'p> Parser<'p> {
    /// The active tokens.
    pub fn tokens(&self) -> &[Token] {
        self.stream.active()
    }

    /// The underlying stream.
    pub fn stream(&self) -> &TokenStream {
        &self.stream
    }

    /// Active token at `index`.
    pub fn token(&self, index: usize) -> Option<&Token> {
        self.stream.active().get(index)
    }

    /// Tag of the active token at `index`.
    pub fn tag_at(&self, index: usize) -> Option<Tag> {
        self.token(index).map(|t| t.tag)
    }

    /// Node bound to the active token at `index`.
    pub fn node_at(&self, index: usize) -> Option<NodeId> {
        self.token(index).and_then(|t| t.node)
    }

    /// Text of the active token at `index`, empty when out of range.
    pub fn text_at(&self, index: usize) -> &str {
        self.token(index).map_or("", |t| t.text.as_str())
    }

    /// Line of the first token, or 1 for an empty parser.
    pub fn line(&self) -> usize {
        self.token(0).map_or(1, |t| t.line)
    }

    /// The parser this one was split off from.
    pub fn parent(&self) -> Option<&Parser<'p>> {
        self.parent
    }

    /// Returns true if the token at `index` was detached in the parent and
    /// spliced back in by the rule that built this parser.
    pub fn was_reinserted(&self, index: usize) -> bool {
        match (self.parent, self.token(index)) {
            (Some(parent), Some(token)) => parent.stream.is_detached(token.tag, token.span),
            _ => false,
        }
    }

    /// Returns true if a detached line break sits right in front of the
    /// active token at `index`.
    pub fn line_break_before(&self, index: usize) -> bool {
        self.stream
            .detached()
            .iter()
            .any(|d| d.position == index && d.token.tag == tags::NEWLINE)
    }

    /// Nodes of every token tagged `tag`, in order.
    pub fn nodes_tagged(&self, tag: Tag) -> Vec<NodeId> {
        self.tokens()
            .iter()
            .filter(|t| t.tag == tag)
            .filter_map(|t| t.node)
            .collect()
    }

    /// Detaches tokens tagged `tag`, keeping them recoverable.
    pub fn remove(&mut self, tag: Tag) {
        self.stream.remove(tag);
    }

    /// Drops tokens tagged `tag` for good.
    pub fn purge(&mut self, tag: Tag) {
        self.stream.purge(tag);
    }

    /// The tag map without detached tokens.
    pub fn tag_map(&self) -> String {
        self.stream.tag_map(&[]).text().trim().to_string()
    }

    /// Consumes the parser, returning the active tokens.
    pub fn into_tokens(self) -> Vec<Token> {
        self.stream.into_active()
    }

    /// Reduces matches of `rule` until none is left.
    ///
    /// Matches are taken leftmost first. Returns the number of reductions.
    pub fn apply(&mut self, rule: &Rule, ctx: &mut BuildContext<'_>) -> usize {
        let mut reductions = 0;
        while self.reduce_once(rule, ctx) {
            reductions += 1;
        }
        reductions
    }

    fn reduce_once(&mut self, rule: &Rule, ctx: &mut BuildContext<'_>) -> bool {
        let map = self.stream.tag_map(&rule.included);
        let Some((range, found)) = self.find(rule, &map) else {
            return false;
        };

        let consumed = self.stream.collect(&map, range.clone());
        let (Some(first), Some(last)) = (consumed.first(), consumed.last()) else {
            return false;
        };
        let line = first.line;
        let span = Span::new(first.span.start, last.span.end);

        let node = {
            let mut child = Parser {
                stream: TokenStream::new(consumed),
                parent: Some(&*self),
            };
            (rule.builder)(&mut child, ctx)
        };

        tracing::trace!(
            rule = rule.pattern.as_str(),
            result = rule.result,
            start = found.start,
            len = found.len,
            "reduced"
        );
        self.stream
            .replace(&map, range, Token::reduced(rule.result, line, span, node))
    }

    /// First match the rule's predicate accepts, as a range of map entries.
    fn find(&self, rule: &Rule, map: &TagMap) -> Option<(std::ops::Range<usize>, Match)> {
        let text = map.text();
        let mut from = 0;

        while let Some(m) = rule.regex.find_at(text, from) {
            from = m.start() + 1;

            let Some(first) = map.entry_at(m.start() + 1) else {
                continue;
            };
            let count = m.as_str().split_whitespace().count();
            let range = first..first + count;

            let entries = &map.entries()[range.clone()];
            let active: Vec<usize> = entries
                .iter()
                .filter_map(|e| match e {
                    Entry::Active(i) => Some(*i),
                    Entry::Detached(_) => None,
                })
                .collect();
            let Some(&start) = active.first() else {
                continue;
            };
            let found = Match {
                start,
                len: active.len(),
            };

            if rule.predicate.is_none_or(|accept| accept(self, &found)) {
                return Some((range, found));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;
    use crate::lexer::Lexer;

    fn parser(src: &str) -> Parser<'static> {
        let mut parser = Parser::new(Lexer::default().tokenize(src).unwrap());
        parser.purge(tags::IGNORE);
        parser.remove(tags::NEWLINE);
        parser
    }

    fn null(_: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
        Some(ctx.ast.add(Node::Null, 1))
    }

    fn count_reinserted(p: &mut Parser<'_>, ctx: &mut BuildContext<'_>) -> Option<NodeId> {
        let reinserted = (0..p.tokens().len()).filter(|&i| p.was_reinserted(i)).count();
        Some(ctx.ast.add(Node::Blocks(vec![]), reinserted))
    }

    #[test]
    fn test_apply_reduces_every_match() {
        let mut p = parser("1 2 3");
        let mut ast = Ast::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = BuildContext {
            ast: &mut ast,
            diagnostics: &mut diagnostics,
        };
        let rule = Rule::new("NUM", tags::EXPRESSION, null).unwrap();
        assert_eq!(p.apply(&rule, &mut ctx), 3);
        assert_eq!(p.tag_map(), "expression expression expression");
        assert!(p.tokens().iter().all(|t| t.node.is_some()));
    }

    #[test]
    fn test_pattern_does_not_match_inside_tag() {
        let mut p = parser("print x");
        let mut ast = Ast::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = BuildContext {
            ast: &mut ast,
            diagnostics: &mut diagnostics,
        };
        let rule = Rule::new("RINT", tags::EXPRESSION, null).unwrap();
        assert_eq!(p.apply(&rule, &mut ctx), 0);
    }

    #[test]
    fn test_predicate_skips_to_later_match() {
        fn not_first(_: &Parser<'_>, m: &Match) -> bool {
            m.start > 0
        }
        let mut p = parser("a b");
        let mut ast = Ast::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = BuildContext {
            ast: &mut ast,
            diagnostics: &mut diagnostics,
        };
        let rule = Rule::new("ID", tags::EXPRESSION, null)
            .unwrap()
            .when(not_first);
        assert_eq!(p.apply(&rule, &mut ctx), 1);
        assert_eq!(p.tag_map(), "ID expression");
    }

    #[test]
    fn test_included_tokens_reach_the_builder() {
        let mut p = parser("a\nb");
        let mut ast = Ast::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = BuildContext {
            ast: &mut ast,
            diagnostics: &mut diagnostics,
        };
        let rule = Rule::new("ID NEWLINE ID", tags::PROGRAM, count_reinserted)
            .unwrap()
            .including(&[tags::NEWLINE]);
        assert_eq!(p.apply(&rule, &mut ctx), 1);
        assert_eq!(p.tag_map(), "program");
        assert!(p.stream().detached().is_empty());

        let node = p.node_at(0).unwrap();
        // The builder saw exactly one spliced-back token.
        assert_eq!(ast.line(node), 1);
    }

    #[test]
    fn test_hidden_tokens_do_not_block_matches() {
        let mut p = parser("a\nb");
        let mut ast = Ast::new();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = BuildContext {
            ast: &mut ast,
            diagnostics: &mut diagnostics,
        };
        let rule = Rule::new("ID ID", tags::PROGRAM, null).unwrap();
        assert_eq!(p.apply(&rule, &mut ctx), 1);
        assert_eq!(p.tokens()[0].line, 1);
        assert_eq!(p.tokens()[0].span, Span::new(0, 3));
    }

    #[test]
    fn test_line_break_before() {
        let p = parser("a\nb c");
        assert!(!p.line_break_before(0));
        assert!(p.line_break_before(1));
        assert!(!p.line_break_before(2));
    }
}
