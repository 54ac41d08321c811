pub mod mpesa_service;
pub mod payment_service;
pub mod session_service;
