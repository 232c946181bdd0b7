//! Segmented clinical message structure checks
//!
//! Rules:
//! - The first segment is the `MSH` header
//! - The field separator is the 4th character of the header; the encoding
//!   characters are the next field (4 or 5 distinct delimiter characters)
//! - Every segment id is 3 uppercase alphanumerics followed by the field
//!   separator (or the end of the segment)
//! - MSH-9 (message type), MSH-10 (control id), and MSH-12 (version) are present

use super::result::{RuleTracker, ValidationResult, codes};

const HEADER_ID: &str = "MSH";
const DEFAULT_FIELD_SEPARATOR: char = '|';

/// 1-based MSH field numbers checked for presence
const REQUIRED_HEADER_FIELDS: &[(usize, &str, &str)] = &[
    (9, codes::MISSING_MESSAGE_TYPE, "message type"),
    (10, codes::MISSING_CONTROL_ID, "message control id"),
    (12, codes::MISSING_VERSION_ID, "version id"),
];

pub(crate) fn validate(payload: &str) -> ValidationResult {
    let mut tracker = RuleTracker::new();

    let segments: Vec<&str> = payload
        .split(['\r', '\n'])
        .filter(|s| !s.trim().is_empty())
        .collect();

    if !tracker.check(
        !segments.is_empty(),
        codes::EMPTY_MESSAGE,
        "Message contains no segments",
        None,
    ) {
        return tracker.finish(None);
    }

    let header = segments[0];
    let has_header = tracker.check(
        header.starts_with(HEADER_ID),
        codes::MISSING_HEADER_SEGMENT,
        format!("Message must begin with the {} header segment", HEADER_ID),
        Some("segment 1".to_string()),
    );

    let separator = if has_header {
        check_header(&mut tracker, header)
    } else {
        DEFAULT_FIELD_SEPARATOR
    };

    for (index, segment) in segments.iter().enumerate() {
        check_segment(&mut tracker, segment, separator, index + 1);
    }

    tracker.finish(None)
}

/// Check the header's delimiters and control fields, returning the separator in use
fn check_header(tracker: &mut RuleTracker, header: &str) -> char {
    let location = || Some(HEADER_ID.to_string());

    let Some(separator) = header.chars().nth(3) else {
        tracker.fail(
            codes::HEADER_TOO_SHORT,
            "Header segment ends before its field separator",
            location(),
        );
        return DEFAULT_FIELD_SEPARATOR;
    };

    if !tracker.check(
        !separator.is_ascii_alphanumeric() && !separator.is_whitespace(),
        codes::INVALID_FIELD_SEPARATOR,
        format!("Field separator {:?} must be a delimiter character", separator),
        Some("MSH-1".to_string()),
    ) {
        return DEFAULT_FIELD_SEPARATOR;
    }

    let fields: Vec<&str> = header.split(separator).collect();

    let encoding = fields.get(1).copied().unwrap_or_default();
    let mut seen = Vec::with_capacity(encoding.len());
    let encoding_ok = (4..=5).contains(&encoding.chars().count())
        && encoding.chars().all(|c| {
            let fresh = !seen.contains(&c);
            seen.push(c);
            fresh && c != separator && !c.is_ascii_alphanumeric() && !c.is_whitespace()
        });
    tracker.check(
        encoding_ok,
        codes::INVALID_ENCODING_CHARACTERS,
        "Encoding characters must be 4 or 5 distinct delimiter characters",
        Some("MSH-2".to_string()),
    );

    // MSH-1 is the separator itself, so MSH-n sits at split index n - 1
    for (field, code, name) in REQUIRED_HEADER_FIELDS {
        let present = fields
            .get(field - 1)
            .is_some_and(|value| !value.trim().is_empty());
        tracker.check(
            present,
            code,
            format!("Header is missing the {}", name),
            Some(format!("MSH-{}", field)),
        );
    }

    separator
}

fn check_segment(tracker: &mut RuleTracker, segment: &str, separator: char, number: usize) {
    let location = Some(format!("segment {}", number));
    let mut chars = segment.chars();
    let id: String = chars.by_ref().take(3).collect();

    let id_ok = tracker.check(
        id.chars().count() == 3
            && id
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
        codes::INVALID_SEGMENT_ID,
        format!("Segment id {:?} must be 3 uppercase letters or digits", id),
        location.clone(),
    );
    if !id_ok {
        return;
    }

    let next = chars.next();
    tracker.check(
        next.is_none() || next == Some(separator),
        codes::INCONSISTENT_FIELD_SEPARATOR,
        format!(
            "Segment {} does not use the header's field separator {:?}",
            id, separator
        ),
        location,
    );
}
