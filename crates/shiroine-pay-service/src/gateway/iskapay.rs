//! Iskapay adapter.
//!
//! Iskapay sells QRIS only. Callbacks are unsigned and not reliably
//! delivered, so status is normally discovered by polling.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use shiroine_pay_core::{Transaction, TransactionStatus};
use shiroine_pay_store::Store;

use super::{
    parse_rfc3339, read_json, record_unpaid, CallbackEvent, CreateTransactionRequest,
    CreatedTransaction, GatewayError, PaymentChannel, PaymentGateway, Result, StatusReport,
    StatusSource,
};
use crate::config::IskapayConfig;

const NAME: &str = "iskapay";
const METHOD: &str = "QRIS";

/// Iskapay `payment.status` literals.
pub const STATUS_TABLE: &[(&str, TransactionStatus)] = &[
    ("pending", TransactionStatus::Unpaid),
    ("completed", TransactionStatus::Paid),
    ("paid", TransactionStatus::Paid),
    ("success", TransactionStatus::Paid),
    ("failed", TransactionStatus::Failed),
    ("expired", TransactionStatus::Expired),
    ("cancelled", TransactionStatus::Cancelled),
    ("canceled", TransactionStatus::Cancelled),
];

/// Iskapay callback `event` names, consulted before `payment.status`.
pub const EVENT_TABLE: &[(&str, TransactionStatus)] = &[
    ("payment.completed", TransactionStatus::Paid),
    ("payment.failed", TransactionStatus::Failed),
    ("payment.expired", TransactionStatus::Expired),
    ("payment.cancelled", TransactionStatus::Cancelled),
];

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    amount: i64,
    payment_method: &'a str,
    customer_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaymentData {
    #[serde(default)]
    merchant_order_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    qr_string: Option<String>,
    #[serde(default)]
    payment_url: Option<String>,
    #[serde(default)]
    expired_at: Option<String>,
    #[serde(default)]
    paid_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackPayload {
    #[serde(default)]
    event: Option<String>,
    payment: Option<CallbackPayment>,
}

#[derive(Debug, Deserialize)]
struct CallbackPayment {
    #[serde(default)]
    merchant_order_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    paid_at: Option<String>,
}

/// Normalize a callback from its event name, falling back to the payment status.
#[must_use]
pub fn callback_status(event: &str, payment_status: &str) -> TransactionStatus {
    let event = event.trim().to_ascii_lowercase();
    EVENT_TABLE
        .iter()
        .find(|(name, _)| *name == event)
        .map_or_else(
            || TransactionStatus::from_provider(payment_status, STATUS_TABLE),
            |(_, status)| *status,
        )
}

/// Iskapay payment gateway.
pub struct IskapayGateway {
    config: IskapayConfig,
    base_url: String,
    http: reqwest::Client,
    store: Arc<dyn Store>,
}

impl IskapayGateway {
    /// Create a new Iskapay adapter.
    #[must_use]
    pub fn new(config: IskapayConfig, http: reqwest::Client, store: Arc<dyn Store>) -> Self {
        if config.api_key.is_none() {
            tracing::warn!("Iskapay not configured - set ISKAPAY_API_KEY");
        }
        let base_url = config.base_url();
        Self {
            config,
            base_url,
            http,
            store,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| GatewayError::Configuration("ISKAPAY_API_KEY is not set".into()))
    }
}

#[async_trait]
impl PaymentGateway for IskapayGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn list_channels(&self) -> Result<Vec<PaymentChannel>> {
        Ok(vec![PaymentChannel::fixed(
            METHOD, METHOD, "qris", "E-Wallet", "qris.png",
        )])
    }

    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<CreatedTransaction> {
        let payer = request.validate()?;
        let api_key = self.api_key()?;
        let customer_name = request.customer_name_for(&payer);

        let response = self
            .http
            .post(format!("{}/payments", self.base_url))
            .bearer_auth(api_key)
            .json(&CreateBody {
                amount: request.amount,
                payment_method: "qris",
                customer_name: &customer_name,
            })
            .send()
            .await?;

        let envelope: Envelope = read_json(NAME, response).await?;
        let Some(raw) = envelope.data else {
            return Err(GatewayError::Upstream {
                provider: NAME,
                message: envelope
                    .message
                    .unwrap_or_else(|| "Failed to create transaction".into()),
            });
        };
        let data: PaymentData = serde_json::from_value(raw.clone())?;
        let order_id = data
            .merchant_order_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::Upstream {
                provider: NAME,
                message: "response is missing merchant_order_id".into(),
            })?;
        let expired_at = parse_rfc3339(data.expired_at.as_deref());

        let transaction = Transaction::unpaid(
            order_id.clone(),
            order_id.clone(),
            payer,
            customer_name,
            METHOD,
            request.amount,
            request.order_items.clone(),
        )
        .with_payment_details(data.qr_string.clone(), expired_at);
        record_unpaid(self.store.as_ref(), &transaction).await;

        tracing::info!(
            reference = %order_id,
            amount = request.amount,
            "Iskapay transaction created"
        );

        Ok(CreatedTransaction {
            reference: order_id.clone(),
            merchant_ref: order_id,
            payment_method: METHOD.into(),
            amount: data.amount.unwrap_or(request.amount),
            status: TransactionStatus::Unpaid,
            checkout_url: data.payment_url,
            payment_number: None,
            qr_string: data.qr_string,
            expired_at,
            fee: None,
            provider_data: Some(raw),
        })
    }

    async fn get_status(&self, reference: &str) -> Result<StatusReport> {
        let response = self
            .http
            .get(format!("{}/payments/{reference}", self.base_url))
            .bearer_auth(self.api_key()?)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(format!("transaction {reference}")));
        }

        let envelope: Envelope = read_json(NAME, response).await?;
        let raw = envelope
            .data
            .ok_or_else(|| GatewayError::NotFound(format!("transaction {reference}")))?;
        let data: PaymentData = serde_json::from_value(raw.clone())?;

        let provider_status = data.status.unwrap_or_default();
        Ok(StatusReport {
            reference: data
                .merchant_order_id
                .unwrap_or_else(|| reference.to_string()),
            status: TransactionStatus::from_provider(&provider_status, STATUS_TABLE),
            provider_status,
            paid_at: parse_rfc3339(data.paid_at.as_deref()),
            amount: data.amount,
            payment_method: Some(METHOD.into()),
            source: StatusSource::Provider,
            provider_data: Some(raw),
        })
    }

    fn parse_callback(&self, body: &[u8], _headers: &HeaderMap) -> Result<CallbackEvent> {
        let payload: CallbackPayload = serde_json::from_slice(body)
            .map_err(|e| GatewayError::Parse(format!("invalid JSON payload: {e}")))?;

        let payment = payload
            .payment
            .ok_or_else(|| GatewayError::Parse("payment data not found in callback".into()))?;
        let reference = payment
            .merchant_order_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::Parse("merchant_order_id not found in callback".into()))?;

        let event = payload.event.unwrap_or_default();
        let payment_status = payment.status.unwrap_or_default();
        let status = callback_status(&event, &payment_status);

        Ok(CallbackEvent {
            reference,
            status,
            provider_status: if event.is_empty() { payment_status } else { event },
            paid_at: parse_rfc3339(payment.paid_at.as_deref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiroine_pay_store::MemoryStore;

    fn gateway() -> IskapayGateway {
        IskapayGateway::new(
            IskapayConfig {
                api_key: Some("key".into()),
                api_url: None,
            },
            reqwest::Client::new(),
            Arc::new(MemoryStore::new()),
        )
    }

    #[test]
    fn event_wins_over_payment_status() {
        assert_eq!(
            callback_status("payment.completed", "pending"),
            TransactionStatus::Paid
        );
        assert_eq!(
            callback_status("payment.cancelled", ""),
            TransactionStatus::Cancelled
        );
        assert_eq!(callback_status("", "canceled"), TransactionStatus::Cancelled);
        assert_eq!(callback_status("payment.updated", "success"), TransactionStatus::Paid);
        assert_eq!(callback_status("", "weird"), TransactionStatus::Unpaid);
    }

    #[test]
    fn nested_callback_parses() {
        let body = br#"{
            "event": "payment.completed",
            "payment": {
                "id": 12345,
                "merchant_order_id": "INV-1-20250112-ABCD",
                "amount": 50000,
                "status": "completed",
                "paid_at": "2025-01-12T09:30:00Z"
            },
            "customer": {"name": "Budi"},
            "timestamp": "2025-01-12T09:30:05Z"
        }"#;
        let event = gateway().parse_callback(body, &HeaderMap::new()).unwrap();
        assert_eq!(event.reference, "INV-1-20250112-ABCD");
        assert_eq!(event.status, TransactionStatus::Paid);
        assert_eq!(event.provider_status, "payment.completed");
        assert_eq!(
            event.paid_at,
            parse_rfc3339(Some("2025-01-12T09:30:00Z"))
        );
    }

    #[test]
    fn callback_without_payment_is_parse_error() {
        for body in [
            &br#"{"event":"payment.completed"}"#[..],
            &br#"{"payment":{"status":"completed"}}"#[..],
            &b"{"[..],
        ] {
            assert!(matches!(
                gateway().parse_callback(body, &HeaderMap::new()),
                Err(GatewayError::Parse(_))
            ));
        }
    }

    #[tokio::test]
    async fn single_qris_channel() {
        let channels = gateway().list_channels().await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].code, "QRIS");
        assert!(channels[0].active);
    }
}
