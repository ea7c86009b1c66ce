//! ETags and conditional-request evaluation.
//!
//! Every mutable resource surface presents an ETag: object and version
//! ETags quote the version id; namespace-listing and ACL ETags quote a
//! content hash. On writes, `If-Match` requires the current state to
//! match and `If-None-Match: *` requires absence, with 412 on mismatch.
//! On reads, an `If-None-Match` match yields 304.

use http::HeaderMap;

use hatrac_core::{HatracError, HatracResult};

/// Quote an opaque tag value into ETag wire form.
#[must_use]
pub fn quote_etag(tag: &str) -> String {
    format!("\"{tag}\"")
}

/// One member of an `If-Match` / `If-None-Match` list.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EtagPattern {
    /// The `*` wildcard: matches any existing state.
    Any,
    /// A specific (unquoted) tag value.
    Tag(String),
}

impl EtagPattern {
    fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        if token == "*" {
            return Some(Self::Any);
        }
        // Weak validators compare by value here.
        let token = token.strip_prefix("W/").unwrap_or(token);
        let token = token.trim_matches('"');
        Some(Self::Tag(token.to_owned()))
    }

    fn matches(&self, tag: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Tag(expected) => expected == tag,
        }
    }
}

/// Parsed conditional-request headers.
#[derive(Debug, Clone, Default)]
pub struct Preconditions {
    if_match: Option<Vec<EtagPattern>>,
    if_none_match: Option<Vec<EtagPattern>>,
}

impl Preconditions {
    /// Parse the conditional headers of a request.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            if_match: parse_list(headers, "if-match"),
            if_none_match: parse_list(headers, "if-none-match"),
        }
    }

    /// Whether the request carries any condition at all.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.if_match.is_some() || self.if_none_match.is_some()
    }

    /// Evaluate write preconditions against the current state tag
    /// (`None` when the resource state does not exist yet).
    pub fn check_write(&self, current: Option<&str>) -> HatracResult<()> {
        if let Some(patterns) = &self.if_match {
            let matched = match current {
                Some(tag) => patterns.iter().any(|p| p.matches(tag)),
                None => false,
            };
            if !matched {
                return Err(HatracError::PreconditionFailed);
            }
        }
        if let Some(patterns) = &self.if_none_match {
            let matched = match current {
                Some(tag) => patterns.iter().any(|p| p.matches(tag)),
                None => false,
            };
            if matched {
                return Err(HatracError::PreconditionFailed);
            }
        }
        Ok(())
    }

    /// Evaluate read preconditions: `true` means the client's cache is
    /// current and the response should be 304.
    #[must_use]
    pub fn check_not_modified(&self, current: &str) -> bool {
        match &self.if_none_match {
            Some(patterns) => patterns.iter().any(|p| p.matches(current)),
            None => false,
        }
    }
}

fn parse_list(headers: &HeaderMap, name: &str) -> Option<Vec<EtagPattern>> {
    let mut patterns = Vec::new();
    let mut present = false;
    for value in headers.get_all(name) {
        present = true;
        if let Ok(text) = value.to_str() {
            patterns.extend(text.split(',').filter_map(EtagPattern::parse));
        }
    }
    present.then_some(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                http::header::HeaderName::from_bytes(name.as_bytes()).expect("name"),
                value.parse().expect("value"),
            );
        }
        map
    }

    #[test]
    fn test_should_pass_unconditional_requests() {
        let pre = Preconditions::from_headers(&HeaderMap::new());
        assert!(!pre.is_conditional());
        assert!(pre.check_write(Some("V1")).is_ok());
        assert!(pre.check_write(None).is_ok());
    }

    #[test]
    fn test_should_enforce_if_match() {
        let pre = Preconditions::from_headers(&headers(&[("if-match", "\"V1\"")]));
        assert!(pre.check_write(Some("V1")).is_ok());
        assert!(matches!(
            pre.check_write(Some("V2")),
            Err(HatracError::PreconditionFailed)
        ));
        // If-Match against a non-existent state always fails.
        assert!(pre.check_write(None).is_err());
    }

    #[test]
    fn test_should_treat_if_match_star_as_existence_check() {
        let pre = Preconditions::from_headers(&headers(&[("if-match", "*")]));
        assert!(pre.check_write(Some("anything")).is_ok());
        assert!(pre.check_write(None).is_err());
    }

    #[test]
    fn test_should_enforce_if_none_match_star_absence() {
        let pre = Preconditions::from_headers(&headers(&[("if-none-match", "*")]));
        assert!(pre.check_write(None).is_ok());
        assert!(pre.check_write(Some("V1")).is_err());
    }

    #[test]
    fn test_should_match_any_member_of_etag_list() {
        let pre = Preconditions::from_headers(&headers(&[("if-match", "\"V1\", \"V2\"")]));
        assert!(pre.check_write(Some("V2")).is_ok());
        assert!(pre.check_write(Some("V3")).is_err());
    }

    #[test]
    fn test_should_compare_weak_validators_by_value() {
        let pre = Preconditions::from_headers(&headers(&[("if-match", "W/\"V1\"")]));
        assert!(pre.check_write(Some("V1")).is_ok());
    }

    #[test]
    fn test_should_report_not_modified_on_read_match() {
        let pre = Preconditions::from_headers(&headers(&[("if-none-match", "\"V1\"")]));
        assert!(pre.check_not_modified("V1"));
        assert!(!pre.check_not_modified("V2"));
    }

    #[test]
    fn test_should_quote_etags() {
        assert_eq!(quote_etag("VER1"), "\"VER1\"");
    }
}
