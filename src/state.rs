use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::PaymentStore;
use crate::errors::Result;
use crate::services::mpesa_service::MpesaService;
use crate::services::payment_service::PaymentService;
use crate::services::session_service::SessionService;

#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentService,
    pub sessions: SessionService,
    pub mpesa_service: Arc<MpesaService>,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Arc<dyn PaymentStore>) -> Result<Self> {
        let mpesa_service = Arc::new(MpesaService::new(config.mpesa.clone())?);
        Ok(AppState {
            payments: PaymentService::new(mpesa_service.clone(), store),
            sessions: SessionService::new(&config.session),
            mpesa_service,
        })
    }

    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        self.payments.store()
    }
}
