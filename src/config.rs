//! Highlighter theme.
//!
//! The theme maps token tags to colour names. Built-in defaults cover every
//! tag the standard lexer produces; `~/.config/quill/colors.toml` may
//! override any of them:
//!
//! ```toml
//! [colors]
//! NUM = "bright_yellow"
//! COMMENT = "plain"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use owo_colors::AnsiColors;
use quill_compiler::lexer::{Tag, tags};
use serde::Deserialize;
use thiserror::Error;

/// Failure to load a theme file.
#[derive(Debug, Error)]
pub enum ThemeError {
    /// The file exists but could not be read
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Theme file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid theme
    #[error("invalid theme {}: {source}", path.display())]
    Parse {
        /// Theme file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },
}

/// A terminal colour, or no styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Plain,
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

impl Color {
    /// The ANSI colour, `None` for [`Color::Plain`].
    pub fn ansi(self) -> Option<AnsiColors> {
        Some(match self {
            Color::Plain => return None,
            Color::Black => AnsiColors::Black,
            Color::Red => AnsiColors::Red,
            Color::Green => AnsiColors::Green,
            Color::Yellow => AnsiColors::Yellow,
            Color::Blue => AnsiColors::Blue,
            Color::Magenta => AnsiColors::Magenta,
            Color::Cyan => AnsiColors::Cyan,
            Color::White => AnsiColors::White,
            Color::BrightBlack => AnsiColors::BrightBlack,
            Color::BrightRed => AnsiColors::BrightRed,
            Color::BrightGreen => AnsiColors::BrightGreen,
            Color::BrightYellow => AnsiColors::BrightYellow,
            Color::BrightBlue => AnsiColors::BrightBlue,
            Color::BrightMagenta => AnsiColors::BrightMagenta,
            Color::BrightCyan => AnsiColors::BrightCyan,
            Color::BrightWhite => AnsiColors::BrightWhite,
        })
    }
}

/// On-disk layout. Only the listed tags are overridden.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThemeFile {
    colors: BTreeMap<String, Color>,
}

/// Token tag to colour.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    colors: BTreeMap<String, Color>,
}

const KEYWORDS: &[Tag] = &[
    tags::PRINT,
    tags::WHILE,
    tags::IF,
    tags::ELSEIF,
    tags::ELSE,
    tags::VAR,
    tags::FUNC,
    tags::RETURN,
    tags::CONTINUE,
    tags::BREAK,
    tags::CLASS,
    tags::EXTENDS,
    tags::NEW,
];

const OPERATORS: &[Tag] = &[
    tags::EXPONENTIATION,
    tags::OP1,
    tags::OP2,
    tags::OP3,
    tags::COMP,
    tags::NOT,
    tags::TILDE,
    tags::SET,
];

const BRACKETS: &[Tag] = &[
    tags::LEFT_BRACE,
    tags::RIGHT_BRACE,
    tags::LEFT_PARENTHESIS,
    tags::RIGHT_PARENTHESIS,
    tags::LEFT_BRACKET,
    tags::RIGHT_BRACKET,
];

impl Default for Theme {
    fn default() -> Self {
        let mut colors = BTreeMap::new();
        let mut set = |group: &[Tag], color: Color| {
            for tag in group {
                colors.insert(tag.to_string(), color);
            }
        };
        set(KEYWORDS, Color::Magenta);
        set(OPERATORS, Color::Cyan);
        set(BRACKETS, Color::Yellow);
        set(&[tags::NUM], Color::Yellow);
        set(&[tags::TXT], Color::Green);
        set(&[tags::BOOL, tags::NULL, tags::THIS, tags::SUPER], Color::Blue);
        set(&[tags::COMMENT], Color::BrightBlack);
        Self { colors }
    }
}

impl Theme {
    /// Location of the user's theme file.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("quill").join("colors.toml"))
    }

    /// Loads the user's theme file if there is one, else the defaults.
    pub fn load() -> Result<Self, ThemeError> {
        match Self::path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Loads a theme file over the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ThemeError> {
        let text = std::fs::read_to_string(path).map_err(|source| ThemeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let theme = Self::from_toml(&text).map_err(|source| ThemeError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded theme");
        Ok(theme)
    }

    /// Parses theme text over the defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let file: ThemeFile = toml::from_str(text)?;
        let mut theme = Self::default();
        theme.colors.extend(file.colors);
        Ok(theme)
    }

    /// Colour for a tag. Unknown tags are plain.
    pub fn color(&self, tag: &str) -> Color {
        self.colors.get(tag).copied().unwrap_or(Color::Plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let theme = Theme::default();
        assert_eq!(theme.color(tags::WHILE), Color::Magenta);
        assert_eq!(theme.color(tags::TXT), Color::Green);
        assert_eq!(theme.color(tags::ID), Color::Plain);
        assert_eq!(theme.color("NOT_A_TAG"), Color::Plain);
    }

    #[test]
    fn test_overrides_keep_other_defaults() {
        let theme = Theme::from_toml("[colors]\nNUM = \"bright_red\"\nID = \"cyan\"\n").unwrap();
        assert_eq!(theme.color(tags::NUM), Color::BrightRed);
        assert_eq!(theme.color(tags::ID), Color::Cyan);
        assert_eq!(theme.color(tags::IF), Color::Magenta);
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(Theme::from_toml("").unwrap(), Theme::default());
    }

    #[test]
    fn test_unknown_colour() {
        assert!(Theme::from_toml("[colors]\nNUM = \"mauve\"\n").is_err());
    }

    #[test]
    fn test_plain_has_no_ansi() {
        assert_eq!(Color::Plain.ansi(), None);
        assert_eq!(Color::Red.ansi(), Some(AnsiColors::Red));
    }
}
