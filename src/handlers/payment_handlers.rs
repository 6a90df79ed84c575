use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde::Deserialize;

use crate::audit;
use crate::auth::session::actor_from_session;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::handlers::Integrations;
use crate::models::{application, payment};

pub const PURPOSE_APPLICATION_FEE: &str = "application_fee";

#[derive(Debug, Deserialize)]
pub struct CreatePaymentForm {
    pub amount_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_purpose")]
    pub purpose: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_purpose() -> String {
    PURPOSE_APPLICATION_FEE.to_string()
}

fn check_payment_access(
    conn: &rusqlite::Connection,
    application_id: i64,
    actor: &crate::auth::session::Actor,
) -> Result<application::Application, AppError> {
    let app = application::find_by_id(conn, application_id)?.ok_or(AppError::NotFound)?;
    if app.applicant_user_id != actor.user_id && !actor.permissions.has("payment.process") {
        return Err(AppError::PermissionDenied("payment.process".to_string()));
    }
    Ok(app)
}

/// GET /api/applications/{id}/payments
pub async fn list(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let conn = pool.get()?;
    let app = check_payment_access(&conn, path.into_inner(), &actor)?;
    let payments = payment::list_for_application(&conn, app.id)?;
    Ok(HttpResponse::Ok().json(payments))
}

/// POST /api/applications/{id}/payments
///
/// Creates the payment, runs it through the gateway and records the
/// outcome. A completed application-fee payment also fulfils the
/// `fee_paid` required action on the application.
pub async fn process(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<CreatePaymentForm>,
    integrations: web::Data<Integrations>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    if form.amount_cents <= 0 {
        return Err(AppError::Validation("amount_cents must be positive".to_string()));
    }

    let conn = pool.get()?;
    let app = check_payment_access(&conn, path.into_inner(), &actor)?;
    let payment_id =
        payment::create(&conn, app.id, form.amount_cents, &form.currency, &form.purpose)?;

    match integrations.gateway.process(form.amount_cents, &form.currency) {
        Ok(outcome) => {
            payment::set_outcome(&conn, payment_id, &outcome.status, &outcome.gateway_reference)?;
            if outcome.status == payment::STATUS_COMPLETED
                && form.purpose == PURPOSE_APPLICATION_FEE
            {
                application::complete_action(&conn, app.id, "fee_paid", actor.user_id)?;
            }
        }
        Err(e) => {
            payment::set_outcome(&conn, payment_id, payment::STATUS_FAILED, "")?;
            log::warn!("Payment {} failed at gateway: {}", payment_id, e);
        }
    }

    let _ = audit::log(
        &conn,
        actor.user_id,
        "payment.process",
        "payment",
        payment_id,
        serde_json::json!({ "application_id": app.id, "amount_cents": form.amount_cents }),
    );

    let recorded = payment::find_by_id(&conn, payment_id)?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Created().json(recorded))
}
