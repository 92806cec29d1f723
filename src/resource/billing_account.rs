//! Billing account resource definition

use crate::reconcile::{FieldCategory, FieldSpec, FieldType, ResourceSchema};
use serde_json::json;

/// Resource type name used in manifests and logs
pub const TYPE_NAME: &str = "greseller_cloud_billing_account";

/// Field layout of a reseller billing account.
///
/// `open` can be set at creation but the API has no way to close or reopen an
/// account afterwards. Once it does, the field moves to [`FieldCategory::Mutable`].
pub fn schema() -> ResourceSchema {
    ResourceSchema::new(
        TYPE_NAME,
        vec![
            FieldSpec::new("name", FieldType::String, FieldCategory::Computed),
            FieldSpec::new("display_name", FieldType::String, FieldCategory::Mutable).required(),
            FieldSpec::new(
                "master_billing_account",
                FieldType::String,
                FieldCategory::ImmutableAfterCreate,
            )
            .required(),
            FieldSpec::new("open", FieldType::Bool, FieldCategory::RemoteUnsupported)
                .with_default(json!(true)),
        ],
    )
}
