//! The token list the grammar engine rewrites.
//!
//! Tokens are kept in two lists. `active` is what rules normally see.
//! `detached` holds tokens taken out of `active` (line breaks) together with
//! the active index they sat in front of, so a rule that asks for them can
//! see them again in the tag map.

use crate::lexer::{Span, Tag, Token};

/// A token moved out of the active list.
#[derive(Debug, Clone, PartialEq)]
pub struct Detached {
    /// Index in the active list of the token this one precedes
    pub position: usize,
    /// The token itself
    pub token: Token,
}

/// One entry of a tag map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// Index into the active list
    Active(usize),
    /// Index into the detached list
    Detached(usize),
}

/// The space-joined tag string rules are matched against.
///
/// The text is padded with a space on both sides, so every tag is
/// surrounded by spaces and patterns can't match inside a tag name.
#[derive(Debug, Clone)]
pub struct TagMap {
    text: String,
    entries: Vec<Entry>,
    starts: Vec<usize>,
}

impl TagMap {
    /// The padded tag string.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Entries in map order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entry whose tag begins at byte `offset` of the text.
    pub fn entry_at(&self, offset: usize) -> Option<usize> {
        self.starts.binary_search(&offset).ok()
    }
}

/// Active and detached tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    active: Vec<Token>,
    detached: Vec<Detached>,
}

impl TokenStream {
    /// Creates a stream where every token is active.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            active: tokens,
            detached: Vec::new(),
        }
    }

    /// The active tokens.
    pub fn active(&self) -> &[Token] {
        &self.active
    }

    /// The detached tokens, ordered by position.
    pub fn detached(&self) -> &[Detached] {
        &self.detached
    }

    /// Consumes the stream, returning the active tokens.
    pub fn into_active(self) -> Vec<Token> {
        self.active
    }

    /// Returns true if a detached token with this tag and span exists.
    pub fn is_detached(&self, tag: Tag, span: Span) -> bool {
        self.detached
            .iter()
            .any(|d| d.token.tag == tag && d.token.span == span)
    }

    /// Moves every active token tagged `tag` into the detached list.
    ///
    /// Neighbouring detached tokens of the same tag are folded into one.
    pub fn remove(&mut self, tag: Tag) {
        let mut kept = Vec::with_capacity(self.active.len());
        let mut moved = Vec::new();
        let mut before = 0;
        let mut old = self.detached.iter().peekable();
        let mut renumbered = Vec::with_capacity(self.detached.len());

        for (index, token) in std::mem::take(&mut self.active).into_iter().enumerate() {
            while let Some(d) = old.next_if(|d| d.position <= index) {
                renumbered.push(Detached {
                    position: d.position - before,
                    token: d.token.clone(),
                });
            }
            if token.tag == tag {
                before += 1;
                moved.push(Detached {
                    position: kept.len(),
                    token,
                });
            } else {
                kept.push(token);
            }
        }
        for d in old {
            renumbered.push(Detached {
                position: d.position - before,
                token: d.token.clone(),
            });
        }

        renumbered.extend(moved);
        renumbered.sort_by_key(|d| d.position);
        self.detached = fold_neighbours(renumbered);
        self.active = kept;
    }

    /// Drops every token tagged `tag`, active or detached, for good.
    ///
    /// Detached tokens that end up in the same gap are folded like in
    /// [`remove`](Self::remove).
    pub fn purge(&mut self, tag: Tag) {
        let mut purged_before = Vec::with_capacity(self.active.len() + 1);
        let mut purged = 0;
        for token in &self.active {
            purged_before.push(purged);
            if token.tag == tag {
                purged += 1;
            }
        }
        purged_before.push(purged);

        self.active.retain(|t| t.tag != tag);
        self.detached.retain(|d| d.token.tag != tag);
        for d in &mut self.detached {
            d.position -= purged_before[d.position.min(purged_before.len() - 1)];
        }
        self.detached = fold_neighbours(std::mem::take(&mut self.detached));
    }

    /// Builds the tag map, splicing back detached tokens tagged with one of
    /// `included`.
    ///
    /// A detached token shows up right after the active token that preceded
    /// it; one that preceded the very first token stays hidden.
    pub fn tag_map(&self, included: &[Tag]) -> TagMap {
        let mut text = String::from(" ");
        let mut entries = Vec::new();
        let mut starts = Vec::new();
        let mut push = |tag: Tag, entry: Entry, text: &mut String| {
            starts.push(text.len());
            entries.push(entry);
            text.push_str(tag);
            text.push(' ');
        };

        let mut detached = self.detached.iter().enumerate().peekable();
        for (index, token) in self.active.iter().enumerate() {
            push(token.tag, Entry::Active(index), &mut text);
            while let Some((d_index, d)) = detached.next_if(|(_, d)| d.position <= index + 1) {
                if d.position == index + 1 && included.contains(&d.token.tag) {
                    push(d.token.tag, Entry::Detached(d_index), &mut text);
                }
            }
        }

        TagMap {
            text,
            entries,
            starts,
        }
    }

    /// Clones the tokens behind a run of tag map entries.
    pub fn collect(&self, map: &TagMap, range: std::ops::Range<usize>) -> Vec<Token> {
        map.entries[range]
            .iter()
            .map(|entry| match entry {
                Entry::Active(i) => self.active[*i].clone(),
                Entry::Detached(i) => self.detached[*i].token.clone(),
            })
            .collect()
    }

    /// Replaces the tokens behind a run of tag map entries with `token`.
    ///
    /// Detached tokens inside the run are consumed. Detached tokens that sat
    /// between consumed active tokens but were not part of the run are
    /// dropped, and the positions of those after the run are shifted to
    /// match the shorter active list. Returns false if the run holds no
    /// active token.
    pub fn replace(&mut self, map: &TagMap, range: std::ops::Range<usize>, token: Token) -> bool {
        let mut first = None;
        let mut last = 0;
        let mut consumed = Vec::new();
        for entry in &map.entries[range] {
            match *entry {
                Entry::Active(i) => {
                    first.get_or_insert(i);
                    last = i;
                }
                Entry::Detached(i) => consumed.push(i),
            }
        }
        let Some(first) = first else {
            return false;
        };

        let shift = last - first;
        let detached = std::mem::take(&mut self.detached);
        self.detached = detached
            .into_iter()
            .enumerate()
            .filter(|(i, d)| !consumed.contains(i) && (d.position <= first || d.position > last))
            .map(|(_, mut d)| {
                if d.position > last {
                    d.position -= shift;
                }
                d
            })
            .collect();

        self.active.splice(first..=last, std::iter::once(token));
        true
    }
}

fn fold_neighbours(detached: Vec<Detached>) -> Vec<Detached> {
    let mut folded: Vec<Detached> = Vec::with_capacity(detached.len());
    for d in detached {
        match folded.last_mut() {
            Some(prev) if prev.position == d.position && prev.token.tag == d.token.tag => {
                prev.token.text.push_str(&d.token.text);
                prev.token.span.end = prev.token.span.end.max(d.token.span.end);
            }
            _ => folded.push(d),
        }
    }
    folded
}
