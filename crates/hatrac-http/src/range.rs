//! HTTP Range header handling.
//!
//! Only a single `bytes=a-b` range is supported: multi-range requests are
//! 501, an unsatisfiable range is 416, and a syntactically invalid header
//! is ignored so the full content streams with 200.

/// The outcome of evaluating a `Range` header against a content size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No usable range: serve the full content with 200.
    Full,
    /// A satisfiable inclusive byte range: serve 206.
    Single(u64, u64),
    /// Syntactically valid but unsatisfiable: 416.
    Unsatisfiable,
    /// A multi-range request: 501.
    NotImplemented,
}

/// Evaluate a `Range` header value against the total content size.
#[must_use]
pub fn parse_range(header: &str, total: u64) -> RangeOutcome {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };

    if spec.contains(',') {
        return RangeOutcome::NotImplemented;
    }

    let spec = spec.trim();
    if let Some(suffix) = spec.strip_prefix('-') {
        // bytes=-N: the final N bytes.
        let Ok(n) = suffix.parse::<u64>() else {
            return RangeOutcome::Full;
        };
        if n == 0 || total == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        let start = total.saturating_sub(n);
        return RangeOutcome::Single(start, total - 1);
    }

    let Some((first, last)) = spec.split_once('-') else {
        return RangeOutcome::Full;
    };
    let Ok(start) = first.parse::<u64>() else {
        return RangeOutcome::Full;
    };

    if last.is_empty() {
        // bytes=N-: from N to the end.
        if start >= total {
            return RangeOutcome::Unsatisfiable;
        }
        return RangeOutcome::Single(start, total - 1);
    }

    let Ok(end) = last.parse::<u64>() else {
        return RangeOutcome::Full;
    };
    if start > end {
        // Inverted ranges are a syntax-level problem: ignore.
        return RangeOutcome::Full;
    }
    if start >= total {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Single(start, end.min(total - 1))
}
