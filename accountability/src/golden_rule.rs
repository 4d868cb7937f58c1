//! Golden Rule — every request must be fully anchored before it exists
//!
//! 1. `contractId` — anchor to the trunk
//! 2. `title`      — what is being asked
//! 3. `tag`        — categorization
//! 4. `ownerId`    — who is responsible
//! 5. `dueAt`      — when it is due
//!
//! The check is pure and collects every violation in one pass.

use serde::{Deserialize, Serialize};

/// One missing or blank field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Raw request fields as supplied by a caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldenRuleInput {
    #[serde(default)]
    pub contract_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub due_at: Option<String>,
}

/// Outcome of a golden rule check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenRuleReport {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

fn is_missing(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

/// Check a request against the golden rule
pub fn validate(input: &GoldenRuleInput) -> GoldenRuleReport {
    let mut violations = Vec::new();

    if is_missing(&input.contract_id) {
        violations.push(Violation::new(
            "contractId",
            "Every request must be anchored to a contract",
        ));
    }

    if input.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
        violations.push(Violation::new("title", "Request title is required"));
    }

    if is_missing(&input.tag) {
        violations.push(Violation::new(
            "tag",
            "Request must have a tag (TASK, DELIVERABLE, APPROVAL, etc.)",
        ));
    }

    if is_missing(&input.owner_id) {
        violations.push(Violation::new(
            "ownerId",
            "Every request must have an assigned owner",
        ));
    }

    if is_missing(&input.due_at) {
        violations.push(Violation::new("dueAt", "Every request must have a due date"));
    }

    GoldenRuleReport {
        valid: violations.is_empty(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> GoldenRuleInput {
        GoldenRuleInput {
            contract_id: Some("c1".to_string()),
            title: Some("Quarterly report".to_string()),
            tag: Some("TASK".to_string()),
            owner_id: Some("u1".to_string()),
            due_at: Some("2026-01-01".to_string()),
        }
    }

    #[test]
    fn test_empty_input_has_five_violations() {
        let report = validate(&GoldenRuleInput::default());
        assert!(!report.valid);
        let fields: Vec<&str> = report.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["contractId", "title", "tag", "ownerId", "dueAt"]);
    }

    #[test]
    fn test_blank_title_only() {
        let input = GoldenRuleInput {
            title: Some(" ".to_string()),
            ..complete()
        };
        let report = validate(&input);
        assert!(!report.valid);
        assert_eq!(
            report.violations,
            vec![Violation::new("title", "Request title is required")]
        );
    }

    #[test]
    fn test_complete_input_is_valid() {
        let report = validate(&complete());
        assert!(report.valid);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_empty_strings_count_as_missing() {
        let input = GoldenRuleInput {
            contract_id: Some(String::new()),
            owner_id: Some(String::new()),
            ..complete()
        };
        let fields: Vec<String> = validate(&input)
            .violations
            .into_iter()
            .map(|v| v.field)
            .collect();
        assert_eq!(fields, vec!["contractId", "ownerId"]);
    }

    #[test]
    fn test_deserializes_from_camel_case_json() {
        let input: GoldenRuleInput = serde_json::from_str(
            r#"{"contractId":"c1","title":" ","tag":"TASK","ownerId":"u1","dueAt":"2026-01-01"}"#,
        )
        .unwrap();
        let report = validate(&input);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].field, "title");

        let empty: GoldenRuleInput = serde_json::from_str("{}").unwrap();
        assert_eq!(validate(&empty).violations.len(), 5);
    }
}
