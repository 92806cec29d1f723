//! Field reconciler
//!
//! Resource schemas partition their fields into mutability categories. Given
//! desired and observed attribute sets, [`ResourceSchema::plan`] works out the
//! smallest mutation the remote API can act on.

use super::error::{ReconcileError, Warning};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field name to value mapping, used for both desired and observed state
pub type Attributes = BTreeMap<String, Value>;

/// What may happen to a field once the resource exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    /// Changeable through a masked update at any time
    Mutable,
    /// Settable only at creation
    ImmutableAfterCreate,
    /// Accepted at creation; the remote API cannot change it afterwards
    RemoteUnsupported,
    /// Assigned by the remote system, never sent
    Computed,
}

/// Value type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Bool,
}

impl FieldType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Bool => value.is_boolean(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub category: FieldCategory,
    pub required: bool,
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: &'static str, field_type: FieldType, category: FieldCategory) -> Self {
        Self {
            name,
            field_type,
            category,
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Outcome of comparing desired against observed state
#[derive(Debug, Clone, PartialEq)]
pub enum PlanAction {
    /// Nothing to send
    Noop,
    /// Full field set for a new resource
    Create { fields: Attributes },
    /// Partial update naming exactly the fields to overwrite
    Patch { fields: Attributes, mask: Vec<String> },
    /// A change to a field that is fixed after creation
    Forbidden {
        field: String,
        current: Value,
        desired: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub action: PlanAction,
    pub warnings: Vec<Warning>,
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        self.action == PlanAction::Noop
    }

    /// Turn a forbidden plan into the error the controller reports
    pub fn into_result(self) -> Result<Self, ReconcileError> {
        match self.action {
            PlanAction::Forbidden {
                field,
                current,
                desired,
            } => Err(ReconcileError::ConfigurationConflict {
                field,
                current,
                desired,
            }),
            _ => Ok(self),
        }
    }
}

/// Field layout of one remote resource type
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    pub type_name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl ResourceSchema {
    pub fn new(type_name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { type_name, fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn category(&self, name: &str) -> Option<FieldCategory> {
        self.field(name).map(|f| f.category)
    }

    /// Reject unknown fields, mistyped values and computed fields set by the caller
    pub fn validate(&self, desired: &Attributes) -> Result<(), ReconcileError> {
        for (name, value) in desired {
            let Some(spec) = self.field(name) else {
                return Err(ReconcileError::UnknownField(name.clone()));
            };
            if spec.category == FieldCategory::Computed {
                return Err(ReconcileError::InvalidField {
                    field: name.clone(),
                    reason: "value is assigned by the remote system".to_string(),
                });
            }
            if !spec.field_type.accepts(value) {
                return Err(ReconcileError::InvalidField {
                    field: name.clone(),
                    reason: format!("expected {}", spec.field_type.name()),
                });
            }
        }
        Ok(())
    }

    /// Immutable field values out of a state snapshot
    pub fn immutable_values(&self, state: &Attributes) -> Attributes {
        self.fields
            .iter()
            .filter(|f| f.category == FieldCategory::ImmutableAfterCreate)
            .filter_map(|f| state.get(f.name).map(|v| (f.name.to_string(), v.clone())))
            .collect()
    }

    /// Plan a mutation.
    ///
    /// With no `observed` state this is a create plan: every configured field,
    /// with defaults filled in, is sent. Otherwise each desired field that
    /// differs from `observed` is sorted by its category.
    pub fn plan(
        &self,
        desired: &Attributes,
        observed: Option<&Attributes>,
    ) -> Result<Plan, ReconcileError> {
        self.validate(desired)?;

        let Some(observed) = observed else {
            return Ok(Plan {
                action: PlanAction::Create {
                    fields: self.create_fields(desired)?,
                },
                warnings: Vec::new(),
            });
        };

        let mut fields = Attributes::new();
        let mut warnings = Vec::new();

        for spec in &self.fields {
            let Some(wanted) = desired.get(spec.name) else {
                continue;
            };
            let current = observed.get(spec.name).cloned().unwrap_or(Value::Null);
            if &current == wanted {
                continue;
            }

            match spec.category {
                FieldCategory::Mutable => {
                    fields.insert(spec.name.to_string(), wanted.clone());
                }
                FieldCategory::ImmutableAfterCreate => {
                    return Ok(Plan {
                        action: PlanAction::Forbidden {
                            field: spec.name.to_string(),
                            current,
                            desired: wanted.clone(),
                        },
                        warnings,
                    });
                }
                FieldCategory::RemoteUnsupported => {
                    let warning = Warning::UnsupportedChange {
                        field: spec.name.to_string(),
                        current,
                        desired: wanted.clone(),
                    };
                    tracing::warn!("{}", warning);
                    warnings.push(warning);
                }
                FieldCategory::Computed => {}
            }
        }

        let action = if fields.is_empty() {
            PlanAction::Noop
        } else {
            let mask = fields.keys().cloned().collect();
            PlanAction::Patch { fields, mask }
        };

        Ok(Plan { action, warnings })
    }

    /// Full field set sent at creation, defaults filled in
    pub fn create_fields(&self, desired: &Attributes) -> Result<Attributes, ReconcileError> {
        self.validate(desired)?;
        let mut fields = Attributes::new();

        for spec in &self.fields {
            if spec.category == FieldCategory::Computed {
                continue;
            }
            match desired.get(spec.name).or(spec.default.as_ref()) {
                Some(value) => {
                    fields.insert(spec.name.to_string(), value.clone());
                }
                None if spec.required => {
                    return Err(ReconcileError::MissingField(spec.name.to_string()));
                }
                None => {}
            }
        }

        Ok(fields)
    }
}
