//! Provider callback envelope.
//!
//! Every level is optional so a partial body can be reported precisely
//! instead of failing inside the JSON extractor.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{AppError, Result};
use crate::models::payment::{PaymentOutcome, PaymentStatus};

#[derive(Debug, Deserialize)]
pub struct CallbackData {
    #[serde(rename = "Body")]
    pub body: Option<CallbackBody>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: Option<StkCallback>,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResultCode")]
    pub result_code: Option<Value>,
    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

/// The fields of a callback this service acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCallback {
    pub checkout_request_id: String,
    pub outcome: PaymentOutcome,
}

impl StkCallback {
    /// The provider sends a number; some relays stringify it.
    fn numeric_result_code(&self) -> Option<i64> {
        match self.result_code.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn metadata_value(&self, name: &str) -> Option<String> {
        let item = self
            .callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?;

        match item.value.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl ParsedCallback {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let data: CallbackData = serde_json::from_slice(body)
            .map_err(|e| AppError::malformed_callback(format!("invalid JSON: {}", e)))?;

        let callback = data
            .body
            .and_then(|body| body.stk_callback)
            .ok_or_else(|| AppError::malformed_callback("missing Body.stkCallback"))?;

        let checkout_request_id = callback
            .checkout_request_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::malformed_callback("missing CheckoutRequestID"))?;

        let result_code = callback
            .numeric_result_code()
            .ok_or_else(|| AppError::malformed_callback("missing ResultCode"))?;

        let outcome = PaymentOutcome {
            status: PaymentStatus::from_result_code(result_code),
            result_code,
            result_desc: callback.result_desc.clone(),
            mpesa_receipt_number: callback.metadata_value("MpesaReceiptNumber"),
        };

        Ok(ParsedCallback {
            checkout_request_id,
            outcome,
        })
    }
}
