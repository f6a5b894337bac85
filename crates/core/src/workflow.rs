//! Typed workflow records and boundary validation.
//!
//! The workflow list endpoint returns loosely shaped JSON objects. Records
//! are parsed into [`Workflow`] at the boundary: `id` is required, `name`
//! and `description` are optional strings, and any other fields are kept
//! verbatim in [`Workflow::extra`]. Records that do not fit this shape are
//! set aside as [`QuarantinedRecord`]s instead of being displayed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Maximum length of a workflow name.
const MAX_NAME_LEN: usize = 128;

/// Maximum length of a workflow description.
const MAX_DESCRIPTION_LEN: usize = 4096;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A workflow as seen by API clients.
///
/// Identity is [`Workflow::id`]. Clients never mutate workflows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fields not covered above, preserved as received.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Why a record was refused at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineReason {
    NotAnObject,
    MissingId,
    InvalidId,
    InvalidField(String),
}

impl std::fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "record is not a JSON object"),
            Self::MissingId => write!(f, "record has no id"),
            Self::InvalidId => write!(f, "record id is not a non-empty string or integer"),
            Self::InvalidField(field) => write!(f, "field `{field}` is not a string"),
        }
    }
}

/// A record that failed validation, kept with its raw payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarantinedRecord {
    /// Zero-based position in the server response.
    pub index: usize,
    pub reason: QuarantineReason,
    pub raw: Value,
}

impl Workflow {
    /// Parse one raw record.
    ///
    /// Integer ids are accepted and normalised to their decimal string.
    pub fn from_value(value: Value) -> Result<Self, QuarantineReason> {
        let Value::Object(mut fields) = value else {
            return Err(QuarantineReason::NotAnObject);
        };

        let id = match fields.remove("id") {
            None | Some(Value::Null) => return Err(QuarantineReason::MissingId),
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            Some(_) => return Err(QuarantineReason::InvalidId),
        };

        let name = take_optional_string(&mut fields, "name")?;
        let description = take_optional_string(&mut fields, "description")?;

        Ok(Self {
            id,
            name,
            description,
            extra: fields,
        })
    }

    /// The title shown for this workflow. Falls back to the id when the
    /// record carries no name.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// The full record re-serialized as compact JSON.
    pub fn raw_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn take_optional_string(
    fields: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<String>, QuarantineReason> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(QuarantineReason::InvalidField(key.to_string())),
    }
}

impl<'de> Deserialize<'de> for Workflow {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Workflow::from_value(value).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Workflow list
// ---------------------------------------------------------------------------

/// Wire body of `GET /api/workflows`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowListResponse {
    pub workflows: Vec<Workflow>,
}

/// A parsed workflow list: accepted records in server order plus the
/// records that were refused.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowList {
    pub workflows: Vec<Workflow>,
    pub quarantined: Vec<QuarantinedRecord>,
}

impl WorkflowList {
    /// Parse the body of `GET /api/workflows`.
    ///
    /// Fails only when the envelope itself is wrong (no `workflows` array).
    /// Individual bad records are quarantined and the rest are kept in the
    /// order the server sent them.
    pub fn from_response(body: Value) -> Result<Self, CoreError> {
        let Value::Object(mut envelope) = body else {
            return Err(CoreError::Validation(
                "workflow list response is not a JSON object".into(),
            ));
        };
        let Some(Value::Array(records)) = envelope.remove("workflows") else {
            return Err(CoreError::Validation(
                "workflow list response has no `workflows` array".into(),
            ));
        };

        let mut list = WorkflowList::default();
        for (index, raw) in records.into_iter().enumerate() {
            match Workflow::from_value(raw.clone()) {
                Ok(workflow) => list.workflows.push(workflow),
                Err(reason) => list.quarantined.push(QuarantinedRecord { index, reason, raw }),
            }
        }
        Ok(list)
    }
}

// ---------------------------------------------------------------------------
// Registration input validation
// ---------------------------------------------------------------------------

/// Validate a workflow name for registration.
pub fn validate_workflow_name(name: &str) -> Result<(), CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Workflow name must not be empty".into()));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Workflow name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate an optional workflow description.
pub fn validate_workflow_description(description: Option<&str>) -> Result<(), CoreError> {
    match description {
        Some(d) if d.len() > MAX_DESCRIPTION_LEN => Err(CoreError::Validation(format!(
            "Workflow description exceeds {MAX_DESCRIPTION_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

/// Validate the on-disk directory of a workflow. It must be an absolute path.
pub fn validate_workflow_dir(dir: &str) -> Result<(), CoreError> {
    if dir.trim().is_empty() {
        return Err(CoreError::Validation("Workflow directory must not be empty".into()));
    }
    if !std::path::Path::new(dir).is_absolute() {
        return Err(CoreError::Validation(format!(
            "Workflow directory must be an absolute path, got '{dir}'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_complete_record() {
        let wf = Workflow::from_value(json!({
            "id": "w1",
            "name": "Denoise",
            "description": "x",
        }))
        .unwrap();
        assert_eq!(wf.id, "w1");
        assert_eq!(wf.name.as_deref(), Some("Denoise"));
        assert_eq!(wf.description.as_deref(), Some("x"));
        assert!(wf.extra.is_empty());
    }

    #[test]
    fn integer_id_is_normalised() {
        let wf = Workflow::from_value(json!({ "id": 7, "name": "Upscale" })).unwrap();
        assert_eq!(wf.id, "7");
    }

    #[test]
    fn extra_fields_are_preserved() {
        let wf = Workflow::from_value(json!({
            "id": "w1",
            "workflow_dir": "/srv/w1",
            "created_at": "2024-05-01T00:00:00Z",
        }))
        .unwrap();
        assert_eq!(wf.extra["workflow_dir"], "/srv/w1");
        assert!(wf.raw_json().contains("\"workflow_dir\":\"/srv/w1\""));
    }

    #[test]
    fn missing_name_falls_back_to_id() {
        let wf = Workflow::from_value(json!({ "id": "w9" })).unwrap();
        assert_eq!(wf.display_name(), "w9");
    }

    #[test]
    fn bad_shapes_are_refused() {
        assert_matches!(
            Workflow::from_value(json!("w1")),
            Err(QuarantineReason::NotAnObject)
        );
        assert_matches!(
            Workflow::from_value(json!({ "name": "x" })),
            Err(QuarantineReason::MissingId)
        );
        assert_matches!(
            Workflow::from_value(json!({ "id": "  " })),
            Err(QuarantineReason::InvalidId)
        );
        assert_matches!(
            Workflow::from_value(json!({ "id": 1.5 })),
            Err(QuarantineReason::InvalidId)
        );
        assert_matches!(
            Workflow::from_value(json!({ "id": "w1", "name": 3 })),
            Err(QuarantineReason::InvalidField(f)) if f == "name"
        );
    }

    #[test]
    fn list_keeps_server_order_and_quarantines_bad_records() {
        let list = WorkflowList::from_response(json!({
            "workflows": [
                { "id": "b", "name": "Second" },
                { "name": "no id" },
                { "id": "a", "name": "First" },
            ]
        }))
        .unwrap();

        let ids: Vec<_> = list.workflows.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(list.quarantined.len(), 1);
        assert_eq!(list.quarantined[0].index, 1);
        assert_eq!(list.quarantined[0].reason, QuarantineReason::MissingId);
    }

    #[test]
    fn list_without_envelope_is_an_error() {
        assert_matches!(
            WorkflowList::from_response(json!([{ "id": "w1" }])),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            WorkflowList::from_response(json!({ "items": [] })),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn deserialize_goes_through_boundary_checks() {
        let ok: Workflow = serde_json::from_value(json!({ "id": "w1" })).unwrap();
        assert_eq!(ok.id, "w1");
        assert!(serde_json::from_value::<Workflow>(json!({ "name": "x" })).is_err());
    }

    #[test]
    fn name_validation() {
        assert!(validate_workflow_name("Denoise").is_ok());
        assert!(validate_workflow_name("   ").is_err());
        assert!(validate_workflow_name(&"a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn dir_validation() {
        assert!(validate_workflow_dir("/srv/workflows/sticker").is_ok());
        assert!(validate_workflow_dir("workflows/sticker").is_err());
        assert!(validate_workflow_dir("").is_err());
    }

    #[test]
    fn description_validation() {
        assert!(validate_workflow_description(None).is_ok());
        assert!(validate_workflow_description(Some("short")).is_ok());
        assert!(validate_workflow_description(Some(&"d".repeat(MAX_DESCRIPTION_LEN + 1))).is_err());
    }
}
