//! Delivery-failure classification.
//!
//! Classes resolve in a fixed order: BUFFER_FULL → RATE_LIMIT →
//! NETWORK_ISSUE → GENERIC_FAILURE. The first class whose keyword set
//! matches the error code, message, or any cause in the chain wins, and
//! each failure increments exactly one class counter.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BufferFull,
    RateLimit,
    NetworkIssue,
    GenericFailure,
}

const BUFFER_FULL_KEYWORDS: &[&str] = &[
    "serviceunavailable",
    "service unavailable",
    "buffer full",
    "capacity exceeded",
    "slow down",
];

const RATE_LIMIT_KEYWORDS: &[&str] = &[
    "throttl",
    "rate exceeded",
    "too many requests",
    "limit exceeded",
    "limitexceeded",
    "429",
];

const NETWORK_KEYWORDS: &[&str] = &[
    "connection refused",
    "unknown host",
    "no such host",
    "dns",
    "timed out",
    "timeout",
    "connection reset",
    "broken pipe",
    "dispatch failure",
];

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::BufferFull => "BUFFER_FULL",
            ErrorClass::RateLimit => "RATE_LIMIT",
            ErrorClass::NetworkIssue => "NETWORK_ISSUE",
            ErrorClass::GenericFailure => "GENERIC_FAILURE",
        }
    }

    pub fn counter(&self) -> &'static str {
        match self {
            ErrorClass::BufferFull => "classify_buffer_full",
            ErrorClass::RateLimit => "classify_rate_limit",
            ErrorClass::NetworkIssue => "classify_network_issue",
            ErrorClass::GenericFailure => "classify_generic_failure",
        }
    }

    /// Capacity-style failures back off twice as long before the next
    /// attempt.
    pub fn backoff_multiplier(&self) -> u32 {
        match self {
            ErrorClass::BufferFull | ErrorClass::RateLimit => 2,
            _ => 1,
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            ErrorClass::BufferFull => BUFFER_FULL_KEYWORDS,
            ErrorClass::RateLimit => RATE_LIMIT_KEYWORDS,
            ErrorClass::NetworkIssue => NETWORK_KEYWORDS,
            ErrorClass::GenericFailure => &[],
        }
    }
}

/// Classify from the pieces of a failure: optional error code, message,
/// and the stringified cause chain. Matching is case-insensitive
/// substring search.
pub fn classify_parts(code: Option<&str>, message: &str, causes: &[String]) -> ErrorClass {
    let mut haystacks: Vec<String> = Vec::with_capacity(2 + causes.len());
    if let Some(code) = code {
        haystacks.push(code.to_lowercase());
    }
    haystacks.push(message.to_lowercase());
    haystacks.extend(causes.iter().map(|c| c.to_lowercase()));

    for class in [
        ErrorClass::BufferFull,
        ErrorClass::RateLimit,
        ErrorClass::NetworkIssue,
    ] {
        if class
            .keywords()
            .iter()
            .any(|kw| haystacks.iter().any(|h| h.contains(kw)))
        {
            return class;
        }
    }
    ErrorClass::GenericFailure
}

/// Classify a concrete error, walking its cause chain.
pub fn classify_error(err: &(dyn std::error::Error + 'static), code: Option<&str>) -> ErrorClass {
    let message = err.to_string();
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    classify_parts(code, &message, &causes)
}
