//! Resource document structure checks
//!
//! A resource document is a JSON object declaring its `resourceType`. Each
//! known type has a set of top-level fields that must be present and
//! non-empty. Bundles are checked recursively through `entry[].resource`.

use serde_json::{Map, Value};

use super::result::{RuleTracker, ValidationResult, codes};

const MAX_BUNDLE_DEPTH: usize = 8;
const MAX_ID_LENGTH: usize = 64;

/// Required top-level fields per resource type
const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    ("Patient", &["identifier", "name"]),
    ("Observation", &["status", "code", "subject"]),
    ("Encounter", &["status", "class", "subject"]),
    ("DiagnosticReport", &["status", "code", "subject"]),
    ("ImagingStudy", &["status", "subject"]),
    ("Bundle", &["type"]),
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
                format!("Document is not valid JSON: {}", e),
                Some(format!("line {}, column {}", e.line(), e.column())),
            );
            return tracker.finish(None);
        }
    };

    check_resource(&mut tracker, &document, "$", 0);
    tracker.finish(None)
}

fn check_resource(tracker: &mut RuleTracker, value: &Value, path: &str, depth: usize) {
    let Some(object) = value.as_object() else {
        tracker.fail(
            codes::NOT_AN_OBJECT,
            "Resource must be a JSON object",
            Some(path.to_string()),
        );
        return;
    };
    tracker.pass();

    let resource_type = match object.get("resourceType").and_then(Value::as_str) {
        Some(t) if !t.is_empty() => {
            tracker.pass();
            t
        }
        _ => {
            tracker.fail(
                codes::MISSING_RESOURCE_TYPE,
                "Resource does not declare a resourceType",
                Some(format!("{}.resourceType", path)),
            );
            return;
        }
    };

    if let Some(id) = object.get("id") {
        let ok = id.as_str().is_some_and(is_valid_id);
        tracker.check(
            ok,
            codes::INVALID_RESOURCE_ID,
            format!(
                "Resource id must be 1-{} letters, digits, '-' or '.'",
                MAX_ID_LENGTH
            ),
            Some(format!("{}.id", path)),
        );
    }

    let Some((_, required)) = REQUIRED_FIELDS.iter().find(|(t, _)| *t == resource_type) else {
        tracker.fail(
            codes::UNKNOWN_RESOURCE_TYPE,
            format!("Unknown resource type {:?}", resource_type),
            Some(format!("{}.resourceType", path)),
        );
        return;
    };
    tracker.pass();

    for field in required.iter() {
        tracker.check(
            is_present(object, field),
            codes::MISSING_REQUIRED_FIELD,
            format!("{} requires field {:?}", resource_type, field),
            Some(format!("{}.{}", path, field)),
        );
    }

    if resource_type == "Bundle" {
        check_bundle_entries(tracker, object, path, depth);
    }
}

fn check_bundle_entries(
    tracker: &mut RuleTracker,
    bundle: &Map<String, Value>,
    path: &str,
    depth: usize,
) {
    let Some(entries) = bundle.get("entry").and_then(Value::as_array) else {
        return;
    };

    if !tracker.check(
        depth < MAX_BUNDLE_DEPTH,
        codes::NESTING_TOO_DEEP,
        format!("Bundles nested more than {} levels deep", MAX_BUNDLE_DEPTH),
        Some(format!("{}.entry", path)),
    ) {
        return;
    }

    for (index, entry) in entries.iter().enumerate() {
        let entry_path = format!("{}.entry[{}]", path, index);
        match entry.get("resource") {
            Some(resource) => {
                tracker.pass();
                check_resource(tracker, resource, &format!("{}.resource", entry_path), depth + 1);
            }
            None => tracker.fail(
                codes::MISSING_ENTRY_RESOURCE,
                "Bundle entry has no resource",
                Some(entry_path),
            ),
        }
    }
}

/// Present and carrying a value: not null, not an empty string, array, or object
fn is_present(object: &Map<String, Value>, field: &str) -> bool {
    match object.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

fn is_valid_id(id: &str) -> bool {
    (1..=MAX_ID_LENGTH).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(value: Value) -> ValidationResult {
        validate(&value.to_string())
    }

    #[test]
    fn test_complete_patient() {
        let result = run(json!({
            "resourceType": "Patient",
            "id": "pat-1",
            "identifier": [{"system": "urn:national", "value": "9434765919"}],
            "name": [{"family": "Doe", "given": ["Jane"]}]
        }));
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.quality_score, 1.0);
    }

    #[test]
    fn test_missing_required_fields_are_each_reported() {
        let result = run(json!({"resourceType": "Observation", "status": "final"}));
        assert!(!result.valid);
        let locations: Vec<_> = result
            .errors
            .iter()
            .map(|e| e.location.clone().unwrap_or_default())
            .collect();
        assert_eq!(locations, vec!["$.code", "$.subject"]);
        assert!(result.quality_score < 1.0);
    }

    #[test]
    fn test_empty_values_count_as_missing() {
        let result = run(json!({
            "resourceType": "Encounter",
            "status": "",
            "class": {},
            "subject": {"reference": "Patient/1"}
        }));
        assert_eq!(result.errors.len(), 2);
        assert!(result.has_error(codes::MISSING_REQUIRED_FIELD));
    }

    #[test]
    fn test_unknown_resource_type() {
        let result = run(json!({"resourceType": "Spaceship"}));
        assert!(result.has_error(codes::UNKNOWN_RESOURCE_TYPE));
    }

    #[test]
    fn test_missing_resource_type() {
        let result = run(json!({"status": "final"}));
        assert!(result.has_error(codes::MISSING_RESOURCE_TYPE));
    }

    #[test]
    fn test_invalid_json_and_non_objects() {
        let result = validate("{\"resourceType\": ");
        assert!(result.has_error(codes::INVALID_JSON));
        assert!(result.errors[0].location.is_some());

        assert!(validate("[1, 2]").has_error(codes::NOT_AN_OBJECT));
    }

    #[test]
    fn test_invalid_id() {
        let result = run(json!({
            "resourceType": "ImagingStudy",
            "id": "has spaces",
            "status": "available",
            "subject": {"reference": "Patient/1"}
        }));
        assert!(result.has_error(codes::INVALID_RESOURCE_ID));
    }

    #[test]
    fn test_bundle_entries_are_checked() {
        let result = run(json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {"resource": {"resourceType": "Patient", "identifier": [{"value": "1"}], "name": [{"family": "A"}]}},
                {"resource": {"resourceType": "DiagnosticReport", "status": "final"}},
                {"fullUrl": "urn:uuid:1"}
            ]
        }));
        assert!(!result.valid);
        assert!(result.has_error(codes::MISSING_ENTRY_RESOURCE));
        assert!(result.errors.iter().any(|e| {
            e.location.as_deref() == Some("$.entry[1].resource.code")
        }));
    }

    #[test]
    fn test_deeply_nested_bundles_are_cut_off() {
        let mut doc = json!({"resourceType": "Patient", "identifier": [1], "name": [1]});
        for _ in 0..(MAX_BUNDLE_DEPTH + 2) {
            doc = json!({"resourceType": "Bundle", "type": "collection", "entry": [{"resource": doc}]});
        }
        let result = run(doc);
        assert!(result.has_error(codes::NESTING_TOO_DEEP));
    }
}
