//! Failure classification.
//!
//! Maps raw task failures to a stable [`ErrorKind`] tag. Classification is
//! total and priority-ordered: structured information (I/O error kinds on the
//! source chain, HTTP status codes) wins over keyword matching on the
//! message, and the first matching rule decides.

use crate::error::ErrorKind;

/// Classifies an arbitrary error value.
///
/// Walks the `source` chain looking for an [`std::io::Error`] first; if none
/// is conclusive, falls back to [`classify_message`] on the error's display
/// output.
pub fn classify_error(err: &(dyn std::error::Error + 'static)) -> ErrorKind {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if let Some(kind) = classify_io(io.kind()) {
                return kind;
            }
        }
        current = e.source();
    }
    classify_message(&err.to_string())
}

/// Classifies an HTTP status code. Only 4xx/5xx are failures.
pub fn classify_status(status: u16) -> Option<ErrorKind> {
    (400..=599).contains(&status).then_some(ErrorKind::HttpError)
}

fn classify_io(kind: std::io::ErrorKind) -> Option<ErrorKind> {
    use std::io::ErrorKind as Io;
    match kind {
        Io::TimedOut => Some(ErrorKind::Timeout),
        Io::ConnectionRefused
        | Io::ConnectionReset
        | Io::ConnectionAborted
        | Io::NotConnected
        | Io::AddrNotAvailable
        | Io::BrokenPipe
        | Io::UnexpectedEof => Some(ErrorKind::ConnectionError),
        Io::OutOfMemory => Some(ErrorKind::SystemError),
        Io::InvalidInput | Io::InvalidData => Some(ErrorKind::ValidationError),
        _ => None,
    }
}

/// Classifies a failure from its message alone.
///
/// First match wins; the order mirrors the classifier contract: timeout,
/// connection, HTTP, assertion, validation, system, other.
pub fn classify_message(message: &str) -> ErrorKind {
    let msg = message.to_ascii_lowercase();

    const TIMEOUT: &[&str] = &["timeout", "timed out", "deadline"];
    const CONNECTION: &[&str] = &[
        "connection",
        "connect",
        "network",
        "refused",
        "reset by peer",
        "unreachable",
        "broken pipe",
        "dns",
        "name resolution",
        "name or service not known",
    ];
    const HTTP: &[&str] = &[
        "http error",
        "status code",
        "bad request",
        "unauthorized",
        "forbidden",
        "not found",
        "internal server error",
        "bad gateway",
        "service unavailable",
    ];
    const ASSERTION: &[&str] = &["assert"];
    const VALIDATION: &[&str] = &["validation", "invalid", "schema mismatch"];
    const SYSTEM: &[&str] = &[
        "out of memory",
        "cannot allocate",
        "no space left",
        "too many open files",
        "os error",
    ];

    let contains_any = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

    if contains_any(TIMEOUT) {
        ErrorKind::Timeout
    } else if contains_any(CONNECTION) {
        ErrorKind::ConnectionError
    } else if contains_any(HTTP) || has_http_status(&msg) {
        ErrorKind::HttpError
    } else if contains_any(ASSERTION) {
        ErrorKind::AssertionError
    } else if contains_any(VALIDATION) {
        ErrorKind::ValidationError
    } else if contains_any(SYSTEM) {
        ErrorKind::SystemError
    } else {
        ErrorKind::Other
    }
}

/// True if the message carries an `http` token immediately followed by a
/// 4xx/5xx status.
fn has_http_status(msg: &str) -> bool {
    let mut saw_http = false;
    for token in msg
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        if saw_http {
            if let Ok(code) = token.parse::<u16>() {
                if classify_status(code).is_some() {
                    return true;
                }
            }
        }
        saw_http = token.eq_ignore_ascii_case("http");
    }
    false
}
