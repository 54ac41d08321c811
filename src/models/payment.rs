use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an STK push as seen by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    /// `0` is the only code the provider uses for a completed payment.
    pub fn from_result_code(code: i64) -> Self {
        if code == 0 {
            PaymentStatus::Success
        } else {
            PaymentStatus::Failed
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub public_id: String,
    pub checkout_request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    pub phone: String,
    pub amount: u64,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpesa_receipt_number: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl PaymentRecord {
    pub fn pending(
        public_id: String,
        checkout_request_id: String,
        merchant_request_id: Option<String>,
        phone: String,
        amount: u64,
    ) -> Self {
        let now = DateTime::now();
        PaymentRecord {
            public_id,
            checkout_request_id,
            merchant_request_id,
            phone,
            amount,
            status: PaymentStatus::Pending,
            result_code: None,
            result_desc: None,
            mpesa_receipt_number: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a callback outcome. No precondition on the current status.
    pub fn apply(&mut self, outcome: &PaymentOutcome) {
        self.status = outcome.status;
        self.result_code = Some(outcome.result_code);
        self.result_desc = outcome.result_desc.clone();
        self.mpesa_receipt_number = outcome.mpesa_receipt_number.clone();
        self.updated_at = DateTime::now();
    }
}

/// What a provider callback says about a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub status: PaymentStatus,
    pub result_code: i64,
    pub result_desc: Option<String>,
    pub mpesa_receipt_number: Option<String>,
}

/// Row-level change notification for one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub public_id: String,
    pub status: PaymentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_zero_is_success() {
        assert_eq!(PaymentStatus::from_result_code(0), PaymentStatus::Success);
        assert_eq!(PaymentStatus::from_result_code(1032), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from_result_code(1), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from_result_code(-1), PaymentStatus::Failed);
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Success.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Pending).unwrap(),
            "\"pending\""
        );
        let parsed: PaymentStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, PaymentStatus::Failed);
    }

    #[test]
    fn apply_overwrites_without_checking_current_status() {
        let mut record = PaymentRecord::pending(
            "abc".into(),
            "ws_CO_1".into(),
            None,
            "254712345678".into(),
            50,
        );
        record.apply(&PaymentOutcome {
            status: PaymentStatus::Success,
            result_code: 0,
            result_desc: Some("ok".into()),
            mpesa_receipt_number: Some("QKX123".into()),
        });
        assert_eq!(record.status, PaymentStatus::Success);

        record.apply(&PaymentOutcome {
            status: PaymentStatus::Failed,
            result_code: 1032,
            result_desc: None,
            mpesa_receipt_number: None,
        });
        assert_eq!(record.status, PaymentStatus::Failed);
        assert_eq!(record.result_code, Some(1032));
    }
}
