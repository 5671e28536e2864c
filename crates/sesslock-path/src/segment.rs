use std::borrow::Cow;

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Numeric-looking segment, usable as a list position or a map key
    Index(usize),
    /// Any other segment
    Key(String),
}

impl Segment {
    /// Normalize a raw path segment.
    ///
    /// Only canonical non-negative integers become indices: `"0"` and `"42"` do,
    /// `"007"`, `"-1"` and `"1e3"` stay string keys.
    pub fn parse(raw: &str) -> Self {
        let canonical = !raw.is_empty()
            && raw.bytes().all(|b| b.is_ascii_digit())
            && (raw == "0" || !raw.starts_with('0'));

        match raw.parse::<usize>() {
            Ok(index) if canonical => Segment::Index(index),
            _ => Segment::Key(raw.to_string()),
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Segment::Index(i) => Some(*i),
            Segment::Key(_) => None,
        }
    }

    /// The segment as a mapping key
    pub fn key(&self) -> Cow<'_, str> {
        match self {
            Segment::Index(i) => Cow::Owned(i.to_string()),
            Segment::Key(k) => Cow::Borrowed(k),
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}
