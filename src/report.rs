//! Diagnostics for failed license requests.
//!
//! License servers commonly answer errors with an HTML page; its `<title>`
//! is the useful part. 403 and 404 are routine (expired token, wrong URL) and
//! their bodies are not dumped.
use std::sync::LazyLock;

use regex::Regex;

use crate::transport::TransportFailure;

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>(.*)</title>").expect("valid title pattern"));

/// Statuses whose bodies are not worth printing.
const QUIET_STATUSES: [u16; 2] = [403, 404];

/// The lines reported for `failure`, in order.
#[must_use]
pub fn failure_lines(failure: &TransportFailure) -> Vec<String> {
    let mut lines = vec![failure.to_string()];

    let Some(body) = failure.body.as_deref() else {
        return lines;
    };
    let text = String::from_utf8_lossy(body);
    if text.is_empty() {
        return lines;
    }

    if let Some(title) = title_of(&text) {
        lines.push(title.to_string());
    }
    if failure.status.is_some_and(|status| !QUIET_STATUSES.contains(&status)) {
        lines.push(format!("Body: {}", text));
    }
    lines
}

/// Contents of the first single-line `<title>` element.
pub fn title_of(text: &str) -> Option<&str> {
    TITLE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Emit the diagnostics for `failure`.
pub fn report_failure(failure: &TransportFailure) {
    for line in failure_lines(failure) {
        error!("{}", line);
    }
}
