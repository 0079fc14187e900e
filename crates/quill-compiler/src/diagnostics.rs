//! Per-compilation error collector.

use crate::error::CompileError;

/// Errors accumulated while compiling one unit.
///
/// Every stage takes the collector by `&mut` and keeps going after recording
/// a problem. Each compilation owns its own collector, so independent units
/// can be compiled on different threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    errors: Vec<CompileError>,
}

impl Diagnostics {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error.
    pub fn push(&mut self, error: CompileError) {
        tracing::debug!(%error, "diagnostic recorded");
        self.errors.push(error);
    }

    /// Returns true if anything was recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterates over the recorded errors in the order they were found.
    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.errors.iter()
    }

    /// Discards everything recorded so far.
    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// Consumes the collector, returning the errors.
    pub fn into_vec(self) -> Vec<CompileError> {
        self.errors
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a CompileError;
    type IntoIter = std::slice::Iter<'a, CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_in_order() {
        let mut diagnostics = Diagnostics::new();
        assert!(!diagnostics.has_errors());

        diagnostics.push(CompileError::DanglingElse { line: 3 });
        diagnostics.push(CompileError::UndefinedAccess {
            name: "x".into(),
            line: 4,
        });

        assert_eq!(diagnostics.len(), 2);
        let lines: Vec<usize> = diagnostics.iter().map(CompileError::line).collect();
        assert_eq!(lines, vec![3, 4]);
    }

    #[test]
    fn test_messages() {
        let access = CompileError::UndefinedAccess {
            name: "x".into(),
            line: 2,
        };
        assert_eq!(
            access.to_string(),
            "Tried to access undefined variable \"x\" in line 2"
        );
        let dangling = CompileError::DanglingElse { line: 1 };
        assert_eq!(
            dangling.to_string(),
            "Else-if/Else statements can only be used after an if statement (line 1)"
        );
    }

    #[test]
    fn test_clear() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(CompileError::ElseIfAfterElse { line: 9 });
        diagnostics.clear();
        assert!(diagnostics.is_empty());
    }
}
