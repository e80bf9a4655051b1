use http::HeaderName;

use crate::types::Request;

/// Name of the header read by default to classify a request's priority.
pub const DEFAULT_PRIORITY_HEADER: &str = "x-ratelimit-priority";

/// The scheduling class of a request within its group.
///
/// Read from the limiter's priority header; values are matched
/// case-insensitively, and anything other than `high` or `low` (including
/// a missing header) is [`Priority::Normal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Dispatched ahead of normal and low traffic whenever ready.
    High,
    /// The default class.
    Normal,
    /// Dispatched only when no high or normal item is ready.
    Low,
}

impl Priority {
    pub(crate) fn from_request(req: &Request, header: &HeaderName) -> Self {
        let Some(value) = req.headers().get(header) else {
            return Self::Normal;
        };
        match value.to_str() {
            Ok(v) if v.eq_ignore_ascii_case("high") => Self::High,
            Ok(v) if v.eq_ignore_ascii_case("low") => Self::Low,
            _ => Self::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Body;

    fn request_with(header: &str, value: &str) -> Request {
        http::Request::get("http://example.com/")
            .header(header, value)
            .body(Body::empty())
            .unwrap()
    }

    fn default_header() -> HeaderName {
        HeaderName::from_static(DEFAULT_PRIORITY_HEADER)
    }

    #[test]
    fn matches_case_insensitively() {
        let header = default_header();
        assert_eq!(
            Priority::from_request(&request_with(DEFAULT_PRIORITY_HEADER, "HIGH"), &header),
            Priority::High
        );
        assert_eq!(
            Priority::from_request(&request_with(DEFAULT_PRIORITY_HEADER, "Low"), &header),
            Priority::Low
        );
    }

    #[test]
    fn unknown_values_and_missing_header_are_normal() {
        let header = default_header();
        assert_eq!(
            Priority::from_request(&request_with(DEFAULT_PRIORITY_HEADER, "urgent"), &header),
            Priority::Normal
        );

        let bare = http::Request::get("http://example.com/")
            .body(Body::empty())
            .unwrap();
        assert_eq!(Priority::from_request(&bare, &header), Priority::Normal);
    }

    #[test]
    fn respects_a_custom_header_name() {
        let header = HeaderName::from_static("x-lane");
        assert_eq!(
            Priority::from_request(&request_with("x-lane", "high"), &header),
            Priority::High
        );
        // The default header is ignored once a custom one is configured.
        assert_eq!(
            Priority::from_request(&request_with(DEFAULT_PRIORITY_HEADER, "high"), &header),
            Priority::Normal
        );
    }
}
