//! Imaging metadata structure checks (DICOM JSON model)
//!
//! The document is an object keyed by 8-hex-digit tags; each element carries a
//! two-letter `vr` and an optional `Value` array. The Query/Retrieve Level
//! (0008,0052) selects which tags must be present.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::result::{RuleTracker, ValidationResult, codes};

const QUERY_LEVEL_TAG: &str = "00080052";
const MAX_UID_LENGTH: usize = 64;

const STUDY_INSTANCE_UID: &str = "0020000D";
const SERIES_INSTANCE_UID: &str = "0020000E";
const SOP_INSTANCE_UID: &str = "00080018";
const SOP_CLASS_UID: &str = "00080016";
const PATIENT_ID: &str = "00100020";
const PATIENT_NAME: &str = "00100010";
const STUDY_DATE: &str = "00080020";
const MODALITY: &str = "00080060";

/// Required tags per query/retrieve level
const REQUIRED_TAGS: &[(&str, &[&str])] = &[
    ("PATIENT", &[PATIENT_ID, PATIENT_NAME]),
    ("STUDY", &[STUDY_INSTANCE_UID, PATIENT_ID, STUDY_DATE]),
    ("SERIES", &[STUDY_INSTANCE_UID, SERIES_INSTANCE_UID, MODALITY]),
    (
        "IMAGE",
        &[
            STUDY_INSTANCE_UID,
            SERIES_INSTANCE_UID,
            SOP_INSTANCE_UID,
            SOP_CLASS_UID,
        ],
    ),
];

pub(crate) fn validate(payload: &str) -> ValidationResult {
    let mut tracker = RuleTracker::new();

    let document = match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            tracker.pass();
            value
        }
        Err(e) => {
            tracker.fail(
                codes::INVALID_JSON,
                format!("Metadata is not valid JSON: {}", e),
                Some(format!("line {}, column {}", e.line(), e.column())),
            );
            return tracker.finish(None);
        }
    };

    let Some(object) = document.as_object() else {
        tracker.fail(
            codes::NOT_AN_OBJECT,
            "Metadata must be a JSON object keyed by tag",
            None,
        );
        return tracker.finish(None);
    };
    tracker.pass();

    // Tags are hex; compare case-insensitively
    let elements: Map<String, Value> = object
        .iter()
        .map(|(tag, element)| (tag.to_ascii_uppercase(), element.clone()))
        .collect();

    for (tag, element) in &elements {
        check_element(&mut tracker, tag, element);
    }

    check_level(&mut tracker, &elements);

    tracker.finish(None)
}

fn check_element(tracker: &mut RuleTracker, tag: &str, element: &Value) {
    let location = Some(tag.to_string());

    if !tracker.check(
        tag.len() == 8 && tag.chars().all(|c| c.is_ascii_hexdigit()),
        codes::INVALID_TAG,
        format!("Tag {:?} must be 8 hexadecimal digits", tag),
        location.clone(),
    ) {
        return;
    }

    let vr = element.get("vr").and_then(Value::as_str);
    if !tracker.check(
        vr.is_some_and(|vr| vr.len() == 2 && vr.chars().all(|c| c.is_ascii_uppercase())),
        codes::INVALID_VR,
        "Element must declare a two-letter value representation",
        location.clone(),
    ) {
        return;
    }

    let values = element
        .get("Value")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    match vr {
        Some("UI") => {
            for value in values {
                let uid = value.as_str().unwrap_or_default();
                tracker.check(
                    is_valid_uid(uid),
                    codes::INVALID_UID,
                    format!(
                        "UID must be dot-separated numbers of at most {} characters",
                        MAX_UID_LENGTH
                    ),
                    location.clone(),
                );
            }
        }
        Some("DA") => {
            for value in values {
                let date = value.as_str().unwrap_or_default();
                tracker.check(
                    is_valid_date(date),
                    codes::INVALID_DATE,
                    "Date must be YYYYMMDD or a YYYYMMDD-YYYYMMDD range",
                    location.clone(),
                );
            }
        }
        _ => {}
    }
}

fn check_level(tracker: &mut RuleTracker, elements: &Map<String, Value>) {
    let location = Some(QUERY_LEVEL_TAG.to_string());

    let Some(level) = first_string(elements, QUERY_LEVEL_TAG) else {
        tracker.fail(
            codes::MISSING_QUERY_LEVEL,
            "Metadata does not declare its query/retrieve level",
            location,
        );
        return;
    };

    let level = level.trim().to_ascii_uppercase();
    let Some((_, required)) = REQUIRED_TAGS.iter().find(|(l, _)| *l == level) else {
        tracker.fail(
            codes::UNKNOWN_QUERY_LEVEL,
            format!(
                "Unknown query/retrieve level {:?}; expected PATIENT, STUDY, SERIES, or IMAGE",
                level
            ),
            location,
        );
        return;
    };
    tracker.pass();

    for tag in required.iter() {
        let present = elements
            .get(*tag)
            .and_then(|e| e.get("Value"))
            .and_then(Value::as_array)
            .is_some_and(|values| !values.is_empty());
        tracker.check(
            present,
            codes::MISSING_REQUIRED_TAG,
            format!("{} level metadata requires tag {}", level, tag),
            Some(tag.to_string()),
        );
    }
}

fn first_string<'a>(elements: &'a Map<String, Value>, tag: &str) -> Option<&'a str> {
    elements
        .get(tag)?
        .get("Value")?
        .as_array()?
        .first()?
        .as_str()
}

fn is_valid_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid.len() <= MAX_UID_LENGTH
        && uid.split('.').all(|component| {
            !component.is_empty()
                && component.chars().all(|c| c.is_ascii_digit())
                && (component == "0" || !component.starts_with('0'))
        })
}

fn is_valid_date(value: &str) -> bool {
    let parse = |s: &str| s.len() == 8 && NaiveDate::parse_from_str(s, "%Y%m%d").is_ok();
    match value.split_once('-') {
        None => parse(value),
        // Open-ended ranges are allowed on one side
        Some((from, to)) => {
            (from.is_empty() || parse(from)) && (to.is_empty() || parse(to)) && value != "-"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(value: Value) -> ValidationResult {
        validate(&value.to_string())
    }

    fn image() -> Value {
        json!({
            "00080052": {"vr": "CS", "Value": ["IMAGE"]},
            "0020000D": {"vr": "UI", "Value": ["1.2.840.113619.2.55.3"]},
            "0020000E": {"vr": "UI", "Value": ["1.2.840.113619.2.55.3.1"]},
            "00080018": {"vr": "UI", "Value": ["1.2.840.113619.2.55.3.1.1"]},
            "00080016": {"vr": "UI", "Value": ["1.2.840.10008.5.1.4.1.1.2"]},
            "00080020": {"vr": "DA", "Value": ["20240131"]}
        })
    }

    #[test]
    fn test_complete_image_level() {
        let result = run(image());
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.quality_score, 1.0);
    }

    #[test]
    fn test_missing_required_tag_for_level() {
        let mut doc = image();
        doc.as_object_mut().unwrap().remove("00080018");
        let result = run(doc);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, codes::MISSING_REQUIRED_TAG);
        assert_eq!(result.errors[0].location.as_deref(), Some("00080018"));
    }

    #[test]
    fn test_level_selects_tag_set() {
        let patient = json!({
            "00080052": {"vr": "CS", "Value": ["PATIENT"]},
            "00100020": {"vr": "LO", "Value": ["MRN-1"]},
            "00100010": {"vr": "PN", "Value": [{"Alphabetic": "Doe^Jane"}]}
        });
        assert!(run(patient).valid);

        let series = json!({
            "00080052": {"vr": "CS", "Value": ["SERIES"]},
            "0020000D": {"vr": "UI", "Value": ["1.2.3"]}
        });
        let result = run(series);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_lowercase_tags_are_accepted() {
        let doc = json!({
            "00080052": {"vr": "CS", "Value": ["SERIES"]},
            "0020000d": {"vr": "UI", "Value": ["1.2.3"]},
            "0020000e": {"vr": "UI", "Value": ["1.2.3.4"]},
            "00080060": {"vr": "CS", "Value": ["CT"]}
        });
        assert!(run(doc).valid);
    }

    #[test]
    fn test_missing_and_unknown_level() {
        assert!(run(json!({})).has_error(codes::MISSING_QUERY_LEVEL));
        let result = run(json!({"00080052": {"vr": "CS", "Value": ["FRAME"]}}));
        assert!(result.has_error(codes::UNKNOWN_QUERY_LEVEL));
    }

    #[test]
    fn test_bad_tags_and_vrs() {
        let mut doc = image();
        let object = doc.as_object_mut().unwrap();
        object.insert("0008ZZZZ".into(), json!({"vr": "CS"}));
        object.insert("00081030".into(), json!({"Value": ["no vr"]}));
        let result = run(doc);
        assert!(result.has_error(codes::INVALID_TAG));
        assert!(result.has_error(codes::INVALID_VR));
    }

    #[test]
    fn test_uid_rules() {
        assert!(is_valid_uid("1.2.840.10008.1.2"));
        assert!(is_valid_uid("1.0.3"));
        assert!(!is_valid_uid("1.02.3"));
        assert!(!is_valid_uid("1..2"));
        assert!(!is_valid_uid("1.2.a"));
        assert!(!is_valid_uid(""));
        assert!(!is_valid_uid(&"1.".repeat(33)));

        let mut doc = image();
        doc["0020000E"]["Value"] = json!(["1.2.3."]);
        assert!(run(doc).has_error(codes::INVALID_UID));
    }

    #[test]
    fn test_date_rules() {
        assert!(is_valid_date("20240229"));
        assert!(!is_valid_date("20230229"));
        assert!(!is_valid_date("2024-01-01"));
        assert!(is_valid_date("20240101-20240131"));
        assert!(is_valid_date("-20240131"));
        assert!(!is_valid_date("-"));
    }

    #[test]
    fn test_garbage_does_not_panic() {
        for payload in ["", "null", "[]", "{\"00080052\": 5}", "{\"00080052\": {\"Value\": [null]}}"] {
            assert!(!validate(payload).valid, "{:?}", payload);
        }
    }
}
