use serde::{Deserialize, Serialize};

pub mod logging;

// ============================================================================
// Directory Types
// ============================================================================

/// One directory user as filed in the configuration store.
///
/// Every attribute is kept in its string form; the store schema is a
/// schema-less JSON blob and the rule decodes the flags on its side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "SAMAccountName")]
    pub account_id: String,
    #[serde(rename = "Name")]
    pub display_name: String,
    #[serde(rename = "PwdLastSet")]
    pub password_last_set: String,
    #[serde(rename = "userAccountControl")]
    pub account_control_flags: String,
}

impl UserRecord {
    pub fn new(
        account_id: impl Into<String>,
        display_name: impl Into<String>,
        password_last_set: impl Into<String>,
        account_control_flags: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            display_name: display_name.into(),
            password_last_set: password_last_set.into(),
            account_control_flags: account_control_flags.into(),
        }
    }

    /// JSON blob stored as the resource configuration
    pub fn to_configuration_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AdcError::Data(e.to_string()))
    }
}

// ============================================================================
// Store Types
// ============================================================================

/// A resource write keyed by `(resource_type, resource_id)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResource {
    pub resource_type: String,
    pub schema_version_id: String,
    pub resource_id: String,
    pub configuration: String,
}

impl StoredResource {
    pub fn from_user(resource_type: &str, schema_version_id: &str, user: &UserRecord) -> Result<Self> {
        Ok(Self {
            resource_type: resource_type.to_string(),
            schema_version_id: schema_version_id.to_string(),
            resource_id: user.account_id.clone(),
            configuration: user.to_configuration_json()?,
        })
    }
}

/// One page of a resource listing. `next_token` is `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct ResourcePage {
    pub resource_ids: Vec<String>,
    pub next_token: Option<String>,
}

// ============================================================================
// Compliance Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceType {
    Compliant,
    NonCompliant,
    NotApplicable,
}

impl ComplianceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceType::Compliant => "COMPLIANT",
            ComplianceType::NonCompliant => "NON_COMPLIANT",
            ComplianceType::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

impl std::fmt::Display for ComplianceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub compliance_type: ComplianceType,
    pub annotation: String,
}

impl ComplianceVerdict {
    pub fn new(compliance_type: ComplianceType, annotation: impl Into<String>) -> Self {
        Self {
            compliance_type,
            annotation: annotation.into(),
        }
    }
}

/// Configuration item snapshot carried by a change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationItem {
    pub resource_type: String,
    pub resource_id: String,
    #[serde(rename = "configurationItemStatus")]
    pub status: String,
    #[serde(rename = "configurationItemCaptureTime")]
    pub capture_time: String,
    #[serde(default)]
    pub configuration: Option<serde_json::Value>,
}

/// Verdict addressed back to the store for one configuration item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationResult {
    pub resource_type: String,
    pub resource_id: String,
    pub compliance_type: ComplianceType,
    pub annotation: String,
    pub ordering_timestamp: String,
    pub result_token: String,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AdcError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Data error: {0}")]
    Data(String),
}

impl AdcError {
    /// Short label used for log fields and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            AdcError::Configuration(_) => "configuration",
            AdcError::Credential(_) => "credential",
            AdcError::Directory(_) => "directory",
            AdcError::Store(_) => "store",
            AdcError::Data(_) => "data",
        }
    }
}

pub type Result<T> = std::result::Result<T, AdcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_configuration_json_keys() {
        let user = UserRecord::new("jdoe", "John Doe", "132514560000000000", "66048");
        let json: serde_json::Value =
            serde_json::from_str(&user.to_configuration_json().unwrap()).unwrap();

        assert_eq!(json["SAMAccountName"], "jdoe");
        assert_eq!(json["Name"], "John Doe");
        assert_eq!(json["PwdLastSet"], "132514560000000000");
        assert_eq!(json["userAccountControl"], "66048");
    }

    #[test]
    fn test_configuration_item_field_names() {
        let item: ConfigurationItem = serde_json::from_value(serde_json::json!({
            "resourceType": "MyCompany::AD::User",
            "resourceId": "jdoe",
            "configurationItemStatus": "OK",
            "configurationItemCaptureTime": "2024-01-01T00:00:00.000Z",
            "configuration": { "userAccountControl": "512" },
            "awsAccountId": "123456789012"
        }))
        .unwrap();

        assert_eq!(item.resource_id, "jdoe");
        assert_eq!(item.status, "OK");
        assert_eq!(item.capture_time, "2024-01-01T00:00:00.000Z");
        assert!(item.configuration.is_some());
    }

    #[test]
    fn test_compliance_type_serialization() {
        let json = serde_json::to_string(&ComplianceType::NonCompliant).unwrap();
        assert_eq!(json, "\"NON_COMPLIANT\"");
        assert_eq!(ComplianceType::NotApplicable.to_string(), "NOT_APPLICABLE");
    }
}
