use std::sync::Arc;

use adc_common::{
    AdcError, ComplianceType, ComplianceVerdict, ConfigurationItem, EvaluationResult, Result,
};
use adc_store::ConfigStore;
use tracing::{debug, info};

use crate::event::ChangeEvent;

/// userAccountControl bit: password never expires
pub const DONT_EXPIRE_PASSWORD: u64 = 0x10000;

const ATTR_ACCOUNT_CONTROL: &str = "userAccountControl";
const STATUS_DELETED: &str = "ResourceDeleted";

pub const ANNOTATION_DELETED: &str =
    "The configurationItem was deleted and therefore cannot be validated.";
pub const ANNOTATION_NEVER_EXPIRES: &str = "Password Never Expire is enabled";
pub const ANNOTATION_EXPIRES: &str = "No Password Never Expire";

/// Read `configuration.userAccountControl` as a number or numeric string
pub fn account_control_flags(item: &ConfigurationItem) -> Result<u64> {
    let value = item
        .configuration
        .as_ref()
        .and_then(|c| c.get(ATTR_ACCOUNT_CONTROL))
        .ok_or_else(|| {
            AdcError::Data(format!("{} has no {}", item.resource_id, ATTR_ACCOUNT_CONTROL))
        })?;

    let flags = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    flags.ok_or_else(|| {
        AdcError::Data(format!(
            "{} of {} is not numeric: {}",
            ATTR_ACCOUNT_CONTROL, item.resource_id, value
        ))
    })
}

/// Verdict for one configuration item; deleted items are not applicable
pub fn evaluate_compliance(item: &ConfigurationItem) -> Result<ComplianceVerdict> {
    if item.status == STATUS_DELETED {
        return Ok(ComplianceVerdict::new(ComplianceType::NotApplicable, ANNOTATION_DELETED));
    }

    let flags = account_control_flags(item)?;
    if flags & DONT_EXPIRE_PASSWORD != 0 {
        Ok(ComplianceVerdict::new(ComplianceType::NonCompliant, ANNOTATION_NEVER_EXPIRES))
    } else {
        Ok(ComplianceVerdict::new(ComplianceType::Compliant, ANNOTATION_EXPIRES))
    }
}

pub struct ComplianceEvaluator {
    store: Arc<dyn ConfigStore>,
}

impl ComplianceEvaluator {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub async fn handle_event(&self, event: &ChangeEvent) -> Result<EvaluationResult> {
        let item = event.configuration_item()?;
        self.evaluate(&item, &event.result_token).await
    }

    /// Evaluate and report. Nothing is reported when the item is malformed;
    /// a failed report is returned as is.
    pub async fn evaluate(&self, item: &ConfigurationItem, result_token: &str) -> Result<EvaluationResult> {
        debug!(resource_id = %item.resource_id, status = %item.status, "Evaluating configuration item");
        let verdict = evaluate_compliance(item)?;

        let result = EvaluationResult {
            resource_type: item.resource_type.clone(),
            resource_id: item.resource_id.clone(),
            compliance_type: verdict.compliance_type,
            annotation: verdict.annotation,
            ordering_timestamp: item.capture_time.clone(),
            result_token: result_token.to_string(),
        };

        self.store.put_evaluation_result(&result).await?;
        metrics::counter!("adc_evaluations_total", "compliance_type" => result.compliance_type.as_str())
            .increment(1);

        info!(
            resource_id = %result.resource_id,
            compliance_type = %result.compliance_type,
            annotation = %result.annotation,
            "Evaluation reported"
        );
        Ok(result)
    }
}
