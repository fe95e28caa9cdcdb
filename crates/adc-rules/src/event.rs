//! Change notification payload.
//!
//! `invokingEvent` arrives JSON-encoded as a string from the hosted store;
//! an already-decoded object is accepted too.

use adc_common::{AdcError, ConfigurationItem, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub invoking_event: serde_json::Value,
    pub result_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvokingEvent {
    configuration_item: ConfigurationItem,
}

impl ChangeEvent {
    pub fn new(configuration_item: &ConfigurationItem, result_token: impl Into<String>) -> Self {
        Self {
            invoking_event: serde_json::json!({ "configurationItem": configuration_item }),
            result_token: result_token.into(),
        }
    }

    pub fn configuration_item(&self) -> Result<ConfigurationItem> {
        let invoking: InvokingEvent = match &self.invoking_event {
            serde_json::Value::String(raw) => serde_json::from_str(raw),
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|e| AdcError::Data(format!("Malformed invoking event: {}", e)))?;

        Ok(invoking.configuration_item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = r#"{
        "configurationItem": {
            "resourceType": "MyCompany::AD::User",
            "resourceId": "jdoe",
            "configurationItemStatus": "OK",
            "configurationItemCaptureTime": "2024-03-01T12:00:00.000Z",
            "configuration": { "userAccountControl": "66048" }
        },
        "messageType": "ConfigurationItemChangeNotification"
    }"#;

    #[test]
    fn test_string_encoded_invoking_event() {
        let event: ChangeEvent = serde_json::from_value(serde_json::json!({
            "invokingEvent": ITEM,
            "resultToken": "token-1",
            "ruleParameters": "{}"
        }))
        .unwrap();

        let item = event.configuration_item().unwrap();
        assert_eq!(item.resource_id, "jdoe");
        assert_eq!(event.result_token, "token-1");
    }

    #[test]
    fn test_object_invoking_event() {
        let invoking: serde_json::Value = serde_json::from_str(ITEM).unwrap();
        let event: ChangeEvent = serde_json::from_value(serde_json::json!({
            "invokingEvent": invoking,
            "resultToken": "token-2"
        }))
        .unwrap();

        assert_eq!(event.configuration_item().unwrap().capture_time, "2024-03-01T12:00:00.000Z");
    }

    #[test]
    fn test_missing_configuration_item_is_data_error() {
        let event = ChangeEvent {
            invoking_event: serde_json::json!({ "messageType": "ScheduledNotification" }),
            result_token: "token-3".to_string(),
        };
        assert_eq!(event.configuration_item().unwrap_err().kind(), "data");
    }
}
