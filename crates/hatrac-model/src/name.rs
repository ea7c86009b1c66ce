//! Hierarchical names and their URL codec.
//!
//! A [`NamePath`] is a sequence of decoded segments rooted at `/`. On the
//! wire, `/`, `:`, and `;` are meta-syntax: `/` separates segments, `:`
//! introduces a version qualifier, `;` introduces a subresource. Segment
//! characters outside the configured safe class must be percent-encoded
//! UTF-8; splitting happens on raw text so encoded meta characters never
//! split.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use hatrac_core::{HatracError, HatracResult};

/// Characters escaped when rendering a decoded segment back into a URL:
/// everything except unreserved characters.
const SEGMENT_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'!')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Check a raw (still-encoded) token against the configured safe class:
/// ASCII alphanumerics, the configured punctuation, and `%` for escapes.
pub fn check_raw_token(raw: &str, allowed_punctuation: &str) -> HatracResult<()> {
    for c in raw.chars() {
        let ok = c.is_ascii_alphanumeric() || c == '%' || allowed_punctuation.contains(c);
        if !ok {
            return Err(HatracError::bad_request(format!(
                "illegal character {c:?} in {raw:?}"
            )));
        }
    }
    Ok(())
}

/// Decode one raw path token into a segment string.
///
/// Validates the safe class, percent-decodes, and requires the result to
/// be valid non-empty UTF-8 that is not a relative-path traversal token.
pub fn decode_segment(raw: &str, allowed_punctuation: &str) -> HatracResult<String> {
    check_raw_token(raw, allowed_punctuation)?;
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| HatracError::bad_request(format!("segment {raw:?} is not valid UTF-8")))?;
    if decoded.is_empty() {
        return Err(HatracError::bad_request("empty name segment"));
    }
    if decoded == "." || decoded == ".." {
        return Err(HatracError::bad_request(
            "relative path segments are not allowed",
        ));
    }
    Ok(decoded.into_owned())
}

/// Render a decoded segment in wire form, escaping everything outside the
/// unreserved set.
#[must_use]
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT_ESCAPE).to_string()
}

/// A resolved hierarchical name: decoded segments under the root.
///
/// The empty path is the root namespace itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamePath {
    segments: Vec<String>,
}

impl NamePath {
    /// The root namespace path `/`.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from decoded segments.
    #[must_use]
    pub fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Parse a decoded, slash-separated path such as `/ns/obj`. Intended
    /// for configuration values and tools, not for URL parsing, which must
    /// go through [`decode_segment`] token by token.
    pub fn parse(text: &str) -> HatracResult<Self> {
        let mut segments = Vec::new();
        for part in text.split('/').filter(|p| !p.is_empty()) {
            if part == "." || part == ".." {
                return Err(HatracError::bad_request(
                    "relative path segments are not allowed",
                ));
            }
            segments.push(part.to_owned());
        }
        Ok(Self { segments })
    }

    /// Whether this is the root namespace.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments under the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The decoded segments, root-first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final segment, if any.
    #[must_use]
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The parent path; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Extend this path with one more segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// All ancestor paths from the root down to the parent.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        (0..self.segments.len())
            .map(|n| Self {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }

    /// Wire form with percent-encoded segments, always starting with `/`.
    #[must_use]
    pub fn encoded(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_owned();
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            out.push_str(&encode_segment(segment));
        }
        out
    }
}

impl fmt::Display for NamePath {
    /// Decoded display form, `/`-joined. Used for storage addressing and
    /// log lines; use [`NamePath::encoded`] for URLs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUNCT: &str = "-._~";

    #[test]
    fn test_should_decode_plain_segment() {
        let seg = decode_segment("data-file_1.bin", PUNCT).expect("valid segment");
        assert_eq!(seg, "data-file_1.bin");
    }

    #[test]
    fn test_should_decode_percent_encoded_utf8() {
        let seg = decode_segment("r%C3%A9sum%C3%A9", PUNCT).expect("valid segment");
        assert_eq!(seg, "résumé");
    }

    #[test]
    fn test_should_reject_illegal_raw_characters() {
        assert!(decode_segment("a b", PUNCT).is_err());
        assert!(decode_segment("a|b", PUNCT).is_err());
        assert!(decode_segment("a:b", PUNCT).is_err());
        assert!(decode_segment("a;b", PUNCT).is_err());
    }

    #[test]
    fn test_should_reject_relative_segments() {
        assert!(decode_segment(".", PUNCT).is_err());
        assert!(decode_segment("..", PUNCT).is_err());
        // Encoded traversal decodes to ".." and is still rejected.
        assert!(decode_segment("%2E%2E", PUNCT).is_err());
    }

    #[test]
    fn test_should_reject_invalid_utf8_escapes() {
        assert!(decode_segment("%FF%FE", PUNCT).is_err());
    }

    #[test]
    fn test_should_keep_encoded_meta_characters_inside_segment() {
        // %3A is ':' and %3B is ';', both legal inside a decoded segment.
        let seg = decode_segment("a%3Ab%3Bc", PUNCT).expect("valid segment");
        assert_eq!(seg, "a:b;c");
        assert_eq!(encode_segment(&seg), "a%3Ab%3Bc");
    }

    #[test]
    fn test_should_round_trip_path_encoding() {
        let path = NamePath::from_segments(vec!["ns one".to_owned(), "obj:v".to_owned()]);
        assert_eq!(path.encoded(), "/ns%20one/obj%3Av");
        assert_eq!(path.to_string(), "/ns one/obj:v");
    }

    #[test]
    fn test_should_expose_tree_relations() {
        let path = NamePath::parse("/a/b/c").expect("parse");
        assert_eq!(path.depth(), 3);
        assert_eq!(path.leaf(), Some("c"));
        assert_eq!(path.parent().expect("parent").to_string(), "/a/b");

        let ancestors = path.ancestors();
        assert_eq!(ancestors.len(), 3);
        assert!(ancestors[0].is_root());
        assert_eq!(ancestors[2].to_string(), "/a/b");
    }

    #[test]
    fn test_should_treat_empty_path_as_root() {
        let root = NamePath::parse("/").expect("parse");
        assert!(root.is_root());
        assert_eq!(root.encoded(), "/");
        assert!(root.parent().is_none());
    }
}
