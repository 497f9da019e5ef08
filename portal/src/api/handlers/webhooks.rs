//! Payment gateway webhook receiver.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    AppState,
    errors::{Error, Result},
    webhooks::{GatewayEvent, WebhookProcessor, verify_signature},
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[utoipa::path(
    post,
    path = "/webhook",
    tag = "payments",
    summary = "Payment gateway webhook",
    description = "Receives signed gateway events. Completed checkouts confirm project payments, settled payment \
                   intents are split between the two payout accounts and transfer events are mirrored. Each event \
                   id is processed at most once.",
    request_body(content = String, content_type = "application/json", description = "Raw event payload"),
    params(("stripe-signature" = String, Header, description = "t=<timestamp>,v1=<hex hmac>")),
    responses(
        (status = 200, description = "Event accepted: `{\"received\": true}`"),
        (status = 400, description = "Missing or invalid signature, or an event that cannot be applied"),
        (status = 503, description = "Payments are not configured"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| Error::BadRequest {
            message: "Missing stripe-signature header".to_string(),
        })?;

    let (Some(payment), Some(gateway)) = (state.config.payment.as_ref(), state.gateway.clone()) else {
        warn!("Webhook received but payments are not configured");
        return Err(Error::ServiceUnavailable {
            service: "Payment gateway".to_string(),
            message: "payments are not configured".to_string(),
        });
    };

    verify_signature(&body, signature, &payment.webhook_secret, payment.webhook_tolerance, Utc::now().timestamp()).map_err(|e| {
        warn!("Rejected webhook: {}", e);
        Error::BadRequest {
            message: format!("Webhook signature verification failed: {e}"),
        }
    })?;

    let event: GatewayEvent = serde_json::from_slice(&body).map_err(|e| Error::BadRequest {
        message: format!("Invalid event payload: {e}"),
    })?;
    info!("Received webhook event {} ({})", event.id, event.event_type);

    let processor = WebhookProcessor::new(state.store.clone(), gateway, payment.payouts.clone());
    let outcome = processor.handle(&event).await.map_err(|e| {
        metrics::counter!("portal_webhook_events_total", "type" => event.event_type.clone(), "outcome" => "failed").increment(1);
        Error::BadRequest {
            message: format!("Webhook error: {e}"),
        }
    })?;

    metrics::counter!("portal_webhook_events_total", "type" => event.event_type.clone(), "outcome" => outcome.as_str())
        .increment(1);
    Ok(Json(json!({ "received": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::Store,
        lifecycle::project::{PaymentStatus, ProjectStatus},
        test_utils::*,
        webhooks::sign_payload,
    };
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn checkout_payload(event_id: &str, project_id: Uuid, amount: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": event_id,
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": format!("cs_{event_id}"),
                "metadata": {"projectId": project_id.to_string(), "type": "initial_payment"},
                "payment_intent": format!("pi_{event_id}"),
                "amount_total": amount,
                "currency": "gbp"
            }}
        }))
        .unwrap()
    }

    fn signed(payload: &[u8]) -> String {
        sign_payload(Utc::now().timestamp(), payload, TEST_WEBHOOK_SECRET)
    }

    #[test_log::test(tokio::test)]
    async fn test_bad_signature_changes_nothing() {
        let app = create_test_app().await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let project = create_test_project(app.store.as_ref(), &client, 15000).await;
        let payload = checkout_payload("evt_forged", project.id, 7500);

        let forged = sign_payload(Utc::now().timestamp(), &payload, "whsec_wrong");
        let response = app
            .server
            .post("/api/webhook")
            .add_header(SIGNATURE_HEADER, forged.as_str())
            .bytes(payload.clone().into())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["message"].as_str().unwrap().contains("signature"));

        app.server
            .post("/api/webhook")
            .bytes(payload.into())
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let stored = app.store.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::AwaitingPayment);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
    }

    #[test_log::test(tokio::test)]
    async fn test_checkout_completion_and_redelivery() {
        let app = create_test_app().await;
        let client = create_test_user(app.store.as_ref(), false).await;
        let project = create_test_project(app.store.as_ref(), &client, 15000).await;
        let payload = checkout_payload("evt_1", project.id, 7500);

        for _ in 0..2 {
            let response = app
                .server
                .post("/api/webhook")
                .add_header(SIGNATURE_HEADER, signed(&payload).as_str())
                .bytes(payload.clone().into())
                .await;
            response.assert_status_ok();
            response.assert_json(&json!({"received": true}));
        }

        let stored = app.store.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::InProgress);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        let payments = app.store.list_payments(&crate::db::OwnerFilter::all()).await.unwrap();
        assert_eq!(payments.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_odd_amount_split() {
        let app = create_test_app().await;
        let payload = serde_json::to_vec(&json!({
            "id": "evt_split",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_split", "amount": 1001, "currency": "gbp",
                "transfer_group": "project_X", "latest_charge": "ch_1"
            }}
        }))
        .unwrap();

        app.server
            .post("/api/webhook")
            .add_header(SIGNATURE_HEADER, signed(&payload).as_str())
            .bytes(payload.into())
            .await
            .assert_status_ok();

        let transfers = app.gateway.transfers().await;
        let amounts: Vec<i64> = transfers.iter().map(|(_, t)| t.amount.amount_minor).collect();
        assert_eq!(amounts, vec![500, 501]);
        assert_eq!(transfers[0].1.destination, PRIMARY_ACCOUNT);
        assert_eq!(transfers[1].1.destination, SECONDARY_ACCOUNT);
        assert!(transfers.iter().all(|(_, t)| t.transfer_group == "project_X"));
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_project_is_rejected_and_retried() {
        let app = create_test_app().await;
        let payload = checkout_payload("evt_orphan", Uuid::new_v4(), 7500);

        for _ in 0..2 {
            app.server
                .post("/api/webhook")
                .add_header(SIGNATURE_HEADER, signed(&payload).as_str())
                .bytes(payload.clone().into())
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }
        // Released, so a later redelivery is not swallowed as a duplicate
        assert!(app.store.claim_event("evt_orphan", "checkout.session.completed").await.unwrap());
    }
}
