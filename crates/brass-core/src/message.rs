//! Message types for the Brass engine.
//!
//! A [`Message`] is an ordered list of platform-agnostic [`Segment`]s.
//! Adapters convert their native message formats into it on the way in and
//! back out of it on the way out.
//!
//! Messages serialize to a JSON array, which is how the engine stores them in
//! handler state (named slots, command arguments).

use std::fmt::{self, Display};
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

// ============================================================================
// Segment
// ============================================================================

/// A platform-agnostic message segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text content.
    Text(String),
    /// A user mention, identified by a user ID string.
    At(String),
    /// An image, identified by a platform-specific reference string
    /// (file path, URL, base64, etc.).
    Image(String),
}

impl Segment {
    /// Creates a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text(text.into())
    }

    /// Returns the type identifier of this segment.
    pub fn segment_type(&self) -> &'static str {
        match self {
            Segment::Text(_) => "text",
            Segment::At(_) => "at",
            Segment::Image(_) => "image",
        }
    }

    /// Returns the text content if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if this is a plain text segment.
    pub fn is_text(&self) -> bool {
        matches!(self, Segment::Text(_))
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Text(s) => f.write_str(s),
            Segment::At(id) => write!(f, "[at:{id}]"),
            Segment::Image(reference) => write!(f, "[image:{reference}]"),
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// A message composed of [`Segment`]s.
///
/// `Display` renders non-text segments as `[at:..]`/`[image:..]` markers,
/// which is what regex rules match against. Use
/// [`extract_plain_text`](Message::extract_plain_text) for text-only content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    segments: Vec<Segment>,
}

impl Message {
    /// Creates a new empty message.
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Creates a message from a vector of segments.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Concatenates the text content of all text segments.
    pub fn extract_plain_text(&self) -> String {
        self.iter().filter_map(Segment::as_text).collect()
    }

    /// Adds a segment to the end of the message.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Consumes the message and adds a segment (builder pattern).
    pub fn with(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    /// Adds a text segment.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.with(Segment::Text(text.into()))
    }

    /// Adds an at-mention segment.
    pub fn at(self, id: impl Into<String>) -> Self {
        self.with(Segment::At(id.into()))
    }

    /// Adds an image segment.
    pub fn image(self, reference: impl Into<String>) -> Self {
        self.with(Segment::Image(reference.into()))
    }

    /// Consumes the message and returns the inner segments vector.
    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }
}

impl Deref for Message {
    type Target = [Segment];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

impl DerefMut for Message {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.segments
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<Vec<Segment>> for Message {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl From<Segment> for Message {
    fn from(segment: Segment) -> Self {
        Self {
            segments: vec![segment],
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Segment::text(text).into()
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Segment::Text(text).into()
    }
}

impl FromIterator<Segment> for Message {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_skips_non_text() {
        let msg = Message::new().at("42").text("hello ").image("a.png").text("world");
        assert_eq!(msg.extract_plain_text(), "hello world");
        assert_eq!(msg.to_string(), "[at:42]hello [image:a.png]world");
    }

    #[test]
    fn test_serde_shape() {
        let msg = Message::from("42");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, serde_json::json!([{"type": "text", "data": "42"}]));
        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }
}
