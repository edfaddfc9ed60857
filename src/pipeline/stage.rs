use crate::error::{PumpTrackError, TrackResult};
use crate::record::SERIAL_NO_FIELD;
use serde::{Deserialize, Serialize};

/// Collection holding raw records waiting for the first stage
pub const INTAKE_COLLECTION: &str = "intake";

/// Declarative description of one pipeline stage
///
/// A stage reads its input from the history of `upstream` (or from the intake
/// collection for the first stage), adds `contributed_fields` from its form
/// and stamps `completion_field` with the completion time.
///
/// # Example
/// ```
/// use pumptrack_lib::pipeline::StageDefinition;
///
/// let stage = StageDefinition::builder("sanction")
///     .label("Sanction")
///     .upstream("work_order")
///     .fields(["sanctionNo", "sanctionDate"])
///     .completion_field("sanctionAt")
///     .build()
///     .unwrap();
///
/// assert_eq!(stage.history_collection(), "sanction");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Unique identifier, also the name of the history collection
    pub name: String,

    /// Human-readable title
    pub label: String,

    /// Stage whose history feeds this one; `None` for the first stage
    pub upstream: Option<String>,

    /// Fields this stage's form adds to the record
    pub contributed_fields: Vec<String>,

    /// Field whose non-empty value marks the record as done here
    pub completion_field: String,
}

impl StageDefinition {
    /// Create a new stage builder
    pub fn builder(name: impl Into<String>) -> StageDefinitionBuilder {
        StageDefinitionBuilder::new(name)
    }

    /// Collection storing this stage's history
    pub fn history_collection(&self) -> &str {
        &self.name
    }

    /// Collection this stage draws pending work from
    pub fn source_collection(&self) -> &str {
        self.upstream.as_deref().unwrap_or(INTAKE_COLLECTION)
    }

    pub fn is_first(&self) -> bool {
        self.upstream.is_none()
    }

    /// Whether the field is one this stage's form is expected to fill
    pub fn contributes(&self, field: &str) -> bool {
        self.contributed_fields.iter().any(|f| f == field)
    }
}

/// Builder for [`StageDefinition`]
#[derive(Debug, Default)]
pub struct StageDefinitionBuilder {
    name: String,
    label: Option<String>,
    upstream: Option<String>,
    contributed_fields: Vec<String>,
    completion_field: Option<String>,
}

impl StageDefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn upstream(mut self, upstream: impl Into<String>) -> Self {
        self.upstream = Some(upstream.into());
        self
    }

    /// Add one contributed field
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.contributed_fields.push(field.into());
        self
    }

    /// Add several contributed fields
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contributed_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn completion_field(mut self, field: impl Into<String>) -> Self {
        self.completion_field = Some(field.into());
        self
    }

    /// Build the stage definition
    ///
    /// # Errors
    /// Returns `PumpTrackError::BuilderError` if the name or completion field is
    /// missing, or a field collides with `serialNo` or the completion field.
    pub fn build(self) -> TrackResult<StageDefinition> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(PumpTrackError::BuilderError(
                "stage name is required".to_string(),
            ));
        }
        if name == INTAKE_COLLECTION {
            return Err(PumpTrackError::BuilderError(format!(
                "'{}' is reserved for the intake collection",
                INTAKE_COLLECTION
            )));
        }

        let completion_field = self
            .completion_field
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| {
                PumpTrackError::BuilderError(format!(
                    "completion field is required for stage '{}'",
                    name
                ))
            })?;
        if completion_field == SERIAL_NO_FIELD {
            return Err(PumpTrackError::BuilderError(format!(
                "stage '{}' cannot use {} as its completion field",
                name, SERIAL_NO_FIELD
            )));
        }

        if let Some(upstream) = &self.upstream {
            if upstream == &name {
                return Err(PumpTrackError::BuilderError(format!(
                    "stage '{}' cannot be its own upstream",
                    name
                )));
            }
        }

        let mut contributed_fields: Vec<String> = Vec::new();
        for field in self.contributed_fields {
            if field == SERIAL_NO_FIELD || field == completion_field {
                return Err(PumpTrackError::BuilderError(format!(
                    "stage '{}' cannot contribute engine-owned field '{}'",
                    name, field
                )));
            }
            if !contributed_fields.contains(&field) {
                contributed_fields.push(field);
            }
        }

        Ok(StageDefinition {
            label: self.label.unwrap_or_else(|| name.clone()),
            name,
            upstream: self.upstream,
            contributed_fields,
            completion_field,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_first_stage() {
        let stage = StageDefinition::builder("registration")
            .fields(["beneficiaryName", "village"])
            .completion_field("registeredAt")
            .build()
            .unwrap();

        assert!(stage.is_first());
        assert_eq!(stage.source_collection(), INTAKE_COLLECTION);
        assert_eq!(stage.label, "registration");
        assert!(stage.contributes("village"));
        assert!(!stage.contributes("registeredAt"));
    }

    #[test]
    fn test_builder_downstream_stage() {
        let stage = StageDefinition::builder("foundation")
            .label("Foundation")
            .upstream("sanction")
            .field("foundationDate")
            .field("foundationDate")
            .completion_field("foundationAt")
            .build()
            .unwrap();

        assert_eq!(stage.source_collection(), "sanction");
        assert_eq!(stage.contributed_fields, vec!["foundationDate"]);
    }

    #[test]
    fn test_builder_missing_completion_field() {
        let result = StageDefinition::builder("sanction").upstream("work_order").build();
        assert!(matches!(result.unwrap_err(), PumpTrackError::BuilderError(_)));
    }

    #[test]
    fn test_builder_rejects_serial_field() {
        let result = StageDefinition::builder("sanction")
            .field(SERIAL_NO_FIELD)
            .completion_field("sanctionAt")
            .build();
        assert!(matches!(result.unwrap_err(), PumpTrackError::BuilderError(_)));
    }

    #[test]
    fn test_builder_rejects_self_upstream() {
        let result = StageDefinition::builder("sanction")
            .upstream("sanction")
            .completion_field("sanctionAt")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_reserved_name() {
        let result = StageDefinition::builder(INTAKE_COLLECTION)
            .completion_field("at")
            .build();
        assert!(result.is_err());
    }
}
