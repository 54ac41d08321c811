use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::payment::PaymentStatus;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    #[validate(length(min = 9, max = 16, message = "Enter a valid Safaricom number"))]
    pub phone: Option<String>,

    #[validate(range(min = 1, message = "Amount must be at least 1 KES"))]
    pub amount: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitiatePaymentResponse {
    pub public_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub public_id: Option<String>,
}

/// Acknowledgment body the provider expects from a callback endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accept() -> Self {
        CallbackAck {
            result_code: 0,
            result_desc: "Accept".to_string(),
        }
    }

    pub fn reject(desc: impl Into<String>) -> Self {
        CallbackAck {
            result_code: 1,
            result_desc: desc.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionRequest {
    pub public_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    pub public_id: String,
    pub status: PaymentStatus,
}
