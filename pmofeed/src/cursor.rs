//! Page continuation state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the next page starts
///
/// A provider paginates either by numeric offset or by an opaque token,
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPosition {
    /// Number of items already consumed
    Offset(u64),
    /// Opaque continuation token; `None` designates the first page
    Token(Option<String>),
}

impl CursorPosition {
    /// First page of an offset-paginated collection
    pub fn first_offset() -> Self {
        Self::Offset(0)
    }

    /// First page of a token-paginated collection
    pub fn first_token() -> Self {
        Self::Token(None)
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Offset(o) => Some(*o),
            Self::Token(_) => None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Token(t) => t.as_deref(),
            Self::Offset(_) => None,
        }
    }
}

impl fmt::Display for CursorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offset(o) => write!(f, "offset={}", o),
            Self::Token(Some(t)) => write!(f, "token={}", t),
            Self::Token(None) => write!(f, "token=<first>"),
        }
    }
}

/// Per-loader continuation state plus the "has more" flag
///
/// Once `has_more` is false the cursor stays exhausted: [`advance`] is
/// ignored and only [`reset`] can make it fetchable again.
///
/// [`advance`]: PageCursor::advance
/// [`reset`]: PageCursor::reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    position: CursorPosition,
    has_more: bool,
}

impl PageCursor {
    /// A fetchable cursor at `position`
    pub fn new(position: CursorPosition) -> Self {
        Self {
            position,
            has_more: true,
        }
    }

    pub fn position(&self) -> &CursorPosition {
        &self.position
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Moves to the continuation returned with a page
    pub fn advance(&mut self, next: CursorPosition, has_more: bool) {
        if !self.has_more {
            return;
        }
        self.position = next;
        self.has_more = has_more;
    }

    /// Rewinds to `first` and makes the cursor fetchable again
    pub fn reset(&mut self, first: CursorPosition) {
        self.position = first;
        self.has_more = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_until_exhausted() {
        let mut cursor = PageCursor::new(CursorPosition::first_offset());
        assert!(cursor.has_more());

        cursor.advance(CursorPosition::Offset(5), true);
        assert_eq!(cursor.position().offset(), Some(5));

        cursor.advance(CursorPosition::Offset(7), false);
        assert!(!cursor.has_more());
    }

    #[test]
    fn test_exhausted_cursor_never_reopens_on_its_own() {
        let mut cursor = PageCursor::new(CursorPosition::first_token());
        cursor.advance(CursorPosition::Token(Some("abc".into())), false);

        cursor.advance(CursorPosition::Token(Some("def".into())), true);
        assert!(!cursor.has_more());
        assert_eq!(cursor.position().token(), Some("abc"));

        cursor.reset(CursorPosition::first_token());
        assert!(cursor.has_more());
        assert_eq!(cursor.position(), &CursorPosition::Token(None));
    }

    #[test]
    fn test_display() {
        assert_eq!(CursorPosition::Offset(3).to_string(), "offset=3");
        assert_eq!(CursorPosition::first_token().to_string(), "token=<first>");
    }
}
