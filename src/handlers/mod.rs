pub mod application_handlers;
pub mod audit_handlers;
pub mod auth_handlers;
pub mod document_handlers;
pub mod message_handlers;
pub mod outbox_handlers;
pub mod payment_handlers;
pub mod user_handlers;
pub mod workflow_admin_handlers;

use std::sync::Arc;

use crate::integrations::{DocumentAnalyzer, IntegrationSync, NotificationDispatcher, PaymentGateway};

/// Collaborator implementations shared across handlers and workers.
#[derive(Clone)]
pub struct Integrations {
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub sync: Arc<dyn IntegrationSync>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub analyzer: Arc<dyn DocumentAnalyzer>,
}
