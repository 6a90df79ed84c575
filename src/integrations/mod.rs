//! External collaborator seams.
//!
//! The engine and handlers consume these traits; the real SIS/LMS,
//! notification, payment and document-analysis backends live behind
//! them. The default implementations log and succeed so the service is
//! fully operable in development.

use rand::RngCore;
use serde_json::Value;

/// Fire a notification for an event to an audience. Implementations own
/// their own delivery retries; callers treat this as fire-and-forget.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: &str, audience: &str, context: &Value) -> Result<(), String>;
}

/// Best-effort student-record sync on status change. May fail
/// independently of the transition; the outbox handles retries.
pub trait IntegrationSync: Send + Sync {
    fn sync_on_status_change(&self, application_id: i64, stage_name: &str) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub status: String,
    pub gateway_reference: String,
}

pub trait PaymentGateway: Send + Sync {
    fn process(&self, amount_cents: i64, currency: &str) -> Result<PaymentOutcome, String>;
}

#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub status: String,
    pub confidence: f64,
}

/// "Verify document" capability: returns a status plus a confidence
/// score, as produced by the document analysis service.
pub trait DocumentAnalyzer: Send + Sync {
    fn verify(&self, document_type: &str, file_name: &str) -> Result<VerificationOutcome, String>;
}

pub struct LogNotifier;

impl NotificationDispatcher for LogNotifier {
    fn dispatch(&self, event: &str, audience: &str, context: &Value) -> Result<(), String> {
        log::info!("notify [{}] -> {}: {}", event, audience, context);
        Ok(())
    }
}

pub struct LogSync;

impl IntegrationSync for LogSync {
    fn sync_on_status_change(&self, application_id: i64, stage_name: &str) -> Result<(), String> {
        log::info!("sis sync: application {} now at '{}'", application_id, stage_name);
        Ok(())
    }
}

/// Development gateway: approves everything and mints a random reference.
pub struct DevGateway;

impl PaymentGateway for DevGateway {
    fn process(&self, amount_cents: i64, currency: &str) -> Result<PaymentOutcome, String> {
        let mut bytes = [0u8; 8];
        rand::rng().fill_bytes(&mut bytes);
        let reference = format!("dev-{}", hex::encode(bytes));
        log::info!("payment processed: {} {} ({})", amount_cents, currency, reference);
        Ok(PaymentOutcome { status: "completed".to_string(), gateway_reference: reference })
    }
}

/// Development analyzer: verifies everything with high confidence.
pub struct DevAnalyzer;

impl DocumentAnalyzer for DevAnalyzer {
    fn verify(&self, document_type: &str, file_name: &str) -> Result<VerificationOutcome, String> {
        log::info!("document verified: {} ({})", document_type, file_name);
        Ok(VerificationOutcome { status: "verified".to_string(), confidence: 0.95 })
    }
}
