//! Tripay adapter.
//!
//! Tripay signs transaction creation with
//! `HMAC-SHA256(private_key, merchant_code + merchant_ref + amount)` and signs
//! every callback body with the same key in `X-Callback-Signature`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use shiroine_pay_core::{premium_merchant_ref, OrderItem, Transaction, TransactionStatus};
use shiroine_pay_store::Store;

use super::{
    from_unix, read_json, record_unpaid, CallbackEvent, CreateTransactionRequest,
    CreatedTransaction, GatewayError, PaymentChannel, PaymentGateway, Result, StatusReport,
    StatusSource,
};
use crate::config::TripayConfig;
use crate::crypto::{tripay_request_signature, verify_body_signature};

const NAME: &str = "tripay";

/// Header carrying the callback signature.
pub const SIGNATURE_HEADER: &str = "x-callback-signature";

/// Tripay status literals.
pub const STATUS_TABLE: &[(&str, TransactionStatus)] = &[
    ("UNPAID", TransactionStatus::Unpaid),
    ("PAID", TransactionStatus::Paid),
    ("FAILED", TransactionStatus::Failed),
    ("EXPIRED", TransactionStatus::Expired),
    ("REFUND", TransactionStatus::Cancelled),
];

/// Tripay response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, fallback: &str) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(GatewayError::Upstream {
                provider: NAME,
                message: self.message.unwrap_or_else(|| fallback.to_string()),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    method: &'a str,
    merchant_ref: &'a str,
    amount: i64,
    customer_name: &'a str,
    customer_email: String,
    customer_phone: &'a str,
    order_items: &'a [OrderItem],
    return_url: String,
    expired_time: i64,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    reference: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    checkout_url: Option<String>,
    #[serde(default)]
    pay_code: Option<String>,
    #[serde(default)]
    qr_string: Option<String>,
    #[serde(default)]
    expired_time: Option<i64>,
    #[serde(default)]
    paid_at: Option<i64>,
    #[serde(default)]
    total_fee: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CallbackPayload {
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    merchant_ref: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    paid_at: Option<i64>,
}

/// Tripay payment gateway.
pub struct TripayGateway {
    config: TripayConfig,
    base_url: String,
    domain: String,
    http: reqwest::Client,
    store: Arc<dyn Store>,
}

impl TripayGateway {
    /// Create a new Tripay adapter.
    #[must_use]
    pub fn new(
        config: TripayConfig,
        domain: String,
        http: reqwest::Client,
        store: Arc<dyn Store>,
    ) -> Self {
        if config.api_key.is_none() || config.private_key.is_none() || config.merchant_code.is_none()
        {
            tracing::warn!(
                "Tripay credentials not configured - set TRIPAY_API_KEY, TRIPAY_PRIVATE_KEY and TRIPAY_MERCHANT_CODE"
            );
        }
        let base_url = config.base_url();
        Self {
            config,
            base_url,
            domain,
            http,
            store,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| GatewayError::Configuration("TRIPAY_API_KEY is not set".into()))
    }

    fn private_key(&self) -> Result<&str> {
        self.config
            .private_key
            .as_deref()
            .ok_or_else(|| GatewayError::Configuration("TRIPAY_PRIVATE_KEY is not set".into()))
    }

    fn merchant_code(&self) -> Result<&str> {
        self.config
            .merchant_code
            .as_deref()
            .ok_or_else(|| GatewayError::Configuration("TRIPAY_MERCHANT_CODE is not set".into()))
    }
}

#[async_trait]
impl PaymentGateway for TripayGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn list_channels(&self) -> Result<Vec<PaymentChannel>> {
        let response = self
            .http
            .get(format!("{}/merchant/payment-channel", self.base_url))
            .bearer_auth(self.api_key()?)
            .send()
            .await?;

        let envelope: Envelope<Vec<PaymentChannel>> = read_json(NAME, response).await?;
        let channels = envelope.into_data("Failed to fetch payment channels")?;

        Ok(channels.into_iter().filter(|c| c.active).collect())
    }

    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<CreatedTransaction> {
        if request.method.trim().is_empty() {
            return Err(GatewayError::Validation("method is required".into()));
        }
        let payer = request.validate()?;
        let api_key = self.api_key()?;
        let private_key = self.private_key()?;
        let merchant_code = self.merchant_code()?;

        let now = Utc::now();
        let merchant_ref = premium_merchant_ref(now);
        let customer_name = request.customer_name_for(&payer);
        let return_url = request
            .return_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("https://{}/pricing", self.domain));

        let body = CreateBody {
            method: &request.method,
            merchant_ref: &merchant_ref,
            amount: request.amount,
            customer_name: &customer_name,
            customer_email: format!("noreply@{}", self.domain),
            customer_phone: request.customer_phone.as_deref().unwrap_or_default(),
            order_items: &request.order_items,
            return_url,
            expired_time: (now + Duration::hours(24)).timestamp(),
            signature: tripay_request_signature(
                private_key,
                merchant_code,
                &merchant_ref,
                request.amount,
            ),
        };

        let response = self
            .http
            .post(format!("{}/transaction/create", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let envelope: Envelope<serde_json::Value> = read_json(NAME, response).await?;
        let raw = envelope.into_data("Failed to create transaction")?;
        let data: TransactionData = serde_json::from_value(raw.clone())?;

        let payment_number = data.pay_code.clone().or_else(|| data.qr_string.clone());
        let expired_at = from_unix(data.expired_time);

        let transaction = Transaction::unpaid(
            data.reference.clone(),
            merchant_ref.clone(),
            payer,
            customer_name,
            request.method.clone(),
            request.amount,
            request.order_items.clone(),
        )
        .with_payment_details(payment_number.clone(), expired_at);
        record_unpaid(self.store.as_ref(), &transaction).await;

        tracing::info!(
            reference = %data.reference,
            merchant_ref = %merchant_ref,
            method = %request.method,
            amount = request.amount,
            "Tripay transaction created"
        );

        Ok(CreatedTransaction {
            reference: data.reference,
            merchant_ref,
            payment_method: data.payment_method.unwrap_or_else(|| request.method.clone()),
            amount: data.amount.unwrap_or(request.amount),
            status: TransactionStatus::Unpaid,
            checkout_url: data.checkout_url,
            payment_number: data.pay_code,
            qr_string: data.qr_string,
            expired_at,
            fee: data.total_fee,
            provider_data: Some(raw),
        })
    }

    async fn get_status(&self, reference: &str) -> Result<StatusReport> {
        let response = self
            .http
            .get(format!("{}/transaction/detail", self.base_url))
            .query(&[("reference", reference)])
            .bearer_auth(self.api_key()?)
            .send()
            .await?;

        let envelope: Envelope<serde_json::Value> = read_json(NAME, response).await?;
        let raw = envelope
            .into_data("Transaction not found")
            .map_err(|_| GatewayError::NotFound(format!("transaction {reference}")))?;
        let data: TransactionData = serde_json::from_value(raw.clone())?;

        let provider_status = data.status.unwrap_or_default();
        Ok(StatusReport {
            reference: data.reference,
            status: TransactionStatus::from_provider(&provider_status, STATUS_TABLE),
            provider_status,
            paid_at: from_unix(data.paid_at),
            amount: data.amount,
            payment_method: data.payment_method,
            source: StatusSource::Provider,
            provider_data: Some(raw),
        })
    }

    fn parse_callback(&self, body: &[u8], headers: &HeaderMap) -> Result<CallbackEvent> {
        let private_key = self.private_key()?;
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| GatewayError::Authentication("missing callback signature".into()))?;

        if !verify_body_signature(private_key, body, signature) {
            tracing::warn!("Invalid Tripay callback signature");
            return Err(GatewayError::Authentication(
                "invalid callback signature".into(),
            ));
        }

        let payload: CallbackPayload = serde_json::from_slice(body)
            .map_err(|e| GatewayError::Parse(format!("invalid JSON payload: {e}")))?;

        let reference = payload
            .reference
            .filter(|r| !r.is_empty())
            .or_else(|| payload.merchant_ref.filter(|r| !r.is_empty()))
            .ok_or_else(|| GatewayError::Parse("reference not found in callback".into()))?;
        let provider_status = payload.status.unwrap_or_default();

        Ok(CallbackEvent {
            reference,
            status: TransactionStatus::from_provider(&provider_status, STATUS_TABLE),
            provider_status,
            paid_at: from_unix(payload.paid_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hmac_sha256_hex;
    use axum::http::HeaderValue;
    use shiroine_pay_store::MemoryStore;

    fn gateway(private_key: Option<&str>) -> TripayGateway {
        TripayGateway::new(
            TripayConfig {
                api_key: Some("key".into()),
                private_key: private_key.map(Into::into),
                merchant_code: Some("T0001".into()),
                mode: "sandbox".into(),
                api_url: None,
            },
            "shiroine.my.id".into(),
            reqwest::Client::new(),
            Arc::new(MemoryStore::new()),
        )
    }

    fn signed(body: &[u8], key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&hmac_sha256_hex(key, body)).unwrap(),
        );
        headers
    }

    #[test]
    fn status_table_is_total() {
        for (raw, expected) in [
            ("UNPAID", TransactionStatus::Unpaid),
            ("paid", TransactionStatus::Paid),
            ("FAILED", TransactionStatus::Failed),
            ("EXPIRED", TransactionStatus::Expired),
            ("REFUND", TransactionStatus::Cancelled),
            ("SOMETHING_NEW", TransactionStatus::Unpaid),
        ] {
            assert_eq!(TransactionStatus::from_provider(raw, STATUS_TABLE), expected);
        }
    }

    #[test]
    fn signed_callback_parses() {
        let body = br#"{"reference":"T1","merchant_ref":"PREMIUM-1-abc","status":"PAID","paid_at":1700000000}"#;
        let event = gateway(Some("pk")).parse_callback(body, &signed(body, "pk")).unwrap();
        assert_eq!(event.reference, "T1");
        assert_eq!(event.status, TransactionStatus::Paid);
        assert_eq!(event.paid_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn empty_reference_falls_back_to_merchant_ref() {
        let body = br#"{"reference":"","merchant_ref":"PREMIUM-1-abc","status":"PAID"}"#;
        let event = gateway(Some("pk")).parse_callback(body, &signed(body, "pk")).unwrap();
        assert_eq!(event.reference, "PREMIUM-1-abc");

        let body = br#"{"reference":"","merchant_ref":"","status":"PAID"}"#;
        let err = gateway(Some("pk"))
            .parse_callback(body, &signed(body, "pk"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Parse(_)));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let body = br#"{"reference":"T1","status":"PAID"}"#;
        let err = gateway(Some("pk"))
            .parse_callback(body, &signed(body, "wrong"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Authentication(_)));

        let err = gateway(Some("pk"))
            .parse_callback(body, &HeaderMap::new())
            .unwrap_err();
        assert!(matches!(err, GatewayError::Authentication(_)));
    }

    #[test]
    fn malformed_signed_body_is_parse_error() {
        let body = b"not json";
        let err = gateway(Some("pk"))
            .parse_callback(body, &signed(body, "pk"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Parse(_)));
    }

    #[test]
    fn missing_private_key_is_configuration_error() {
        let body = br#"{"reference":"T1","status":"PAID"}"#;
        let err = gateway(None).parse_callback(body, &signed(body, "pk")).unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }
}
