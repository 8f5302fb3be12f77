use crate::model::{ClassifiedLine, Severity};

/// Prefixes in match order; the first hit decides the severity.
const PREFIXES: &[(&str, Severity)] = &[
    ("error:", Severity::Error),
    ("err:", Severity::Error),
    ("warning:", Severity::Warn),
    ("notice:", Severity::Warn),
    ("info:", Severity::Info),
    ("debug:", Severity::Debug),
];

/// Classify one line of provisioning output. Total: unprefixed lines are
/// `Info` with the full line kept.
pub fn classify_line(raw: &str) -> ClassifiedLine {
    let line = raw.trim_end_matches(&['\n', '\r'][..]);
    for (prefix, severity) in PREFIXES {
        let matched = line
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matched {
            return ClassifiedLine {
                severity: *severity,
                message: line[prefix.len()..].trim_start().to_string(),
            };
        }
    }
    ClassifiedLine {
        severity: Severity::Info,
        message: line.to_string(),
    }
}
