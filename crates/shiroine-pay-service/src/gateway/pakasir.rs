//! Pakasir adapter.
//!
//! Pakasir authenticates with the API key inside the request body or query.
//! Virtual account and `PayPal` payments are only reported through the
//! callback, so their status is answered from the ledger.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shiroine_pay_core::{invoice_order_id, Transaction, TransactionStatus};
use shiroine_pay_store::Store;

use super::{
    parse_rfc3339, read_json, record_unpaid, CallbackEvent, CreateTransactionRequest,
    CreatedTransaction, GatewayError, PaymentChannel, PaymentGateway, Result, StatusReport,
    StatusSource,
};
use crate::config::PakasirConfig;

const NAME: &str = "pakasir";

/// Pakasir status literals.
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

/// Caller codes (lowercased, underscores stripped) that differ from Pakasir's method names.
const METHOD_ALIASES: &[(&str, &str)] = &[
    ("qris", "qris"),
    ("cimbniagava", "cimb_niaga_va"),
    ("bniva", "bni_va"),
    ("briva", "bri_va"),
    ("permatava", "permata_va"),
    ("sampoernava", "sampoerna_va"),
    ("bncva", "bnc_va"),
    ("maybankva", "maybank_va"),
    ("atmbersama", "atm_bersama_va"),
    ("atmbersamava", "atm_bersama_va"),
    ("arthagraha", "artha_graha_va"),
    ("arthagrahava", "artha_graha_va"),
    ("paypal", "paypal"),
];

/// Map a caller channel code to a Pakasir method name.
///
/// Unknown codes are passed through lowercased with underscores removed.
#[must_use]
pub fn map_method(code: &str) -> String {
    let normalized = code.trim().to_ascii_lowercase().replace('_', "");
    match METHOD_ALIASES.iter().find(|(alias, _)| *alias == normalized) {
        Some((_, method)) => (*method).to_string(),
        None => normalized,
    }
}

/// Whether a Pakasir method is created through the JSON API.
#[must_use]
pub fn uses_api_flow(method: &str) -> bool {
    method == "qris" || method.contains("_va") || method == "paypal"
}

/// Whether a recorded method only reports status through the callback.
#[must_use]
pub fn is_callback_only(method: &str) -> bool {
    let method = method.to_ascii_lowercase();
    method.contains("paypal") || method.contains("_va") || method.contains("virtual")
}

/// The fixed Pakasir channel catalog.
#[must_use]
pub fn channels() -> Vec<PaymentChannel> {
    const VA: &str = "virtual_account";
    const VA_GROUP: &str = "Virtual Account";
    vec![
        PaymentChannel::fixed("QRIS", "QRIS", "qris", "E-Wallet", "qris.png"),
        PaymentChannel::fixed("CIMB_NIAGA_VA", "CIMB Niaga Virtual Account", VA, VA_GROUP, "cimb.png"),
        PaymentChannel::fixed("BNI_VA", "BNI Virtual Account", VA, VA_GROUP, "bni.png"),
        PaymentChannel::fixed("BRI_VA", "BRI Virtual Account", VA, VA_GROUP, "bri.png"),
        PaymentChannel::fixed("PERMATA_VA", "Permata Virtual Account", VA, VA_GROUP, "permata.png"),
        PaymentChannel::fixed("SAMPOERNA_VA", "Sampoerna Virtual Account", VA, VA_GROUP, "sampoerna.png"),
        PaymentChannel::fixed("BNC_VA", "BNC Virtual Account", VA, VA_GROUP, "bnc.png"),
        PaymentChannel::fixed("MAYBANK_VA", "Maybank Virtual Account", VA, VA_GROUP, "maybank.png"),
        PaymentChannel::fixed("ATM_BERSAMA_VA", "ATM Bersama Virtual Account", VA, VA_GROUP, "atm_bersama.png"),
        PaymentChannel::fixed("ARTHA_GRAHA_VA", "Artha Graha Virtual Account", VA, VA_GROUP, "artha_graha.png"),
        PaymentChannel::fixed("PAYPAL", "PayPal", "paypal", "International", "paypal.png"),
    ]
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    project: &'a str,
    order_id: &'a str,
    amount: i64,
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    payment: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PaymentData {
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    payment_number: Option<String>,
    #[serde(default)]
    expired_at: Option<String>,
    #[serde(default)]
    fee: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    transaction: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DetailData {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    completed_at: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackPayload {
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    completed_at: Option<String>,
}

/// Callbacks arrive either flat or wrapped in `data`.
#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
    #[serde(default)]
    data: Option<CallbackPayload>,
    #[serde(flatten)]
    flat: CallbackPayload,
}

/// Pakasir payment gateway.
pub struct PakasirGateway {
    config: PakasirConfig,
    base_url: String,
    domain: String,
    http: reqwest::Client,
    store: Arc<dyn Store>,
}

impl PakasirGateway {
    /// Create a new Pakasir adapter.
    #[must_use]
    pub fn new(
        config: PakasirConfig,
        domain: String,
        http: reqwest::Client,
        store: Arc<dyn Store>,
    ) -> Self {
        if config.api_key.is_none() || config.slug.is_none() {
            tracing::warn!("Pakasir not configured - set PAKASIR_API_KEY and PAKASIR_SLUG");
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

    fn credentials(&self) -> Result<(&str, &str)> {
        match (self.config.slug.as_deref(), self.config.api_key.as_deref()) {
            (Some(slug), Some(key)) => Ok((slug, key)),
            _ => Err(GatewayError::Configuration(
                "PAKASIR_API_KEY and PAKASIR_SLUG must be set".into(),
            )),
        }
    }

    /// Hosted payment page for methods without an API integration.
    fn checkout_url(&self, slug: &str, amount: i64, order_id: &str) -> Result<String> {
        let redirect = format!("https://{}/pay/{order_id}", self.domain);
        let url = reqwest::Url::parse_with_params(
            &format!("{}/pay/{slug}/{amount}", self.base_url),
            &[("order_id", order_id), ("redirect", redirect.as_str())],
        )
        .map_err(|e| GatewayError::Configuration(format!("invalid Pakasir URL: {e}")))?;
        Ok(url.into())
    }

    async fn create_via_api(
        &self,
        slug: &str,
        api_key: &str,
        method: &str,
        order_id: &str,
        amount: i64,
    ) -> Result<(serde_json::Value, PaymentData)> {
        let response = self
            .http
            .post(format!("{}/api/transactioncreate/{method}", self.base_url))
            .json(&CreateBody {
                project: slug,
                order_id,
                amount,
                api_key,
            })
            .send()
            .await?;

        let body: CreateResponse = read_json(NAME, response).await?;
        let raw = body.payment.ok_or_else(|| GatewayError::Upstream {
            provider: NAME,
            message: body
                .message
                .unwrap_or_else(|| "Failed to create transaction".into()),
        })?;
        let data = serde_json::from_value(raw.clone())?;
        Ok((raw, data))
    }

    fn ledger_report(transaction: &Transaction) -> StatusReport {
        StatusReport {
            reference: transaction.reference.clone(),
            status: transaction.status,
            provider_status: transaction.status.as_str().to_ascii_lowercase(),
            paid_at: transaction.paid_at,
            amount: Some(transaction.amount),
            payment_method: Some(transaction.method.clone()),
            source: StatusSource::Ledger,
            provider_data: None,
        }
    }
}

#[async_trait]
impl PaymentGateway for PakasirGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn list_channels(&self) -> Result<Vec<PaymentChannel>> {
        Ok(channels())
    }

    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<CreatedTransaction> {
        let payer = request.validate()?;
        let (slug, api_key) = self.credentials()?;
        let customer_name = request.customer_name_for(&payer);
        let method = map_method(&request.method);
        let order_id = invoice_order_id(Utc::now());

        let mut created = CreatedTransaction {
            reference: order_id.clone(),
            merchant_ref: order_id.clone(),
            payment_method: method.to_ascii_uppercase(),
            amount: request.amount,
            status: TransactionStatus::Unpaid,
            checkout_url: None,
            payment_number: None,
            qr_string: None,
            expired_at: None,
            fee: None,
            provider_data: None,
        };

        if uses_api_flow(&method) {
            let (raw, data) = self
                .create_via_api(slug, api_key, &method, &order_id, request.amount)
                .await?;
            if let Some(id) = data.order_id.filter(|id| !id.is_empty()) {
                created.reference = id;
            }
            if method == "qris" {
                created.qr_string.clone_from(&data.payment_number);
            }
            created.payment_number = data.payment_number;
            created.expired_at = parse_rfc3339(data.expired_at.as_deref());
            created.fee = data.fee;
            created.provider_data = Some(raw);
        } else {
            created.checkout_url = Some(self.checkout_url(slug, request.amount, &order_id)?);
        }

        let transaction = Transaction::unpaid(
            created.reference.clone(),
            created.merchant_ref.clone(),
            payer,
            customer_name,
            created.payment_method.clone(),
            request.amount,
            request.order_items.clone(),
        )
        .with_payment_details(created.payment_number.clone(), created.expired_at);
        record_unpaid(self.store.as_ref(), &transaction).await;

        tracing::info!(
            reference = %created.reference,
            method = %method,
            amount = request.amount,
            api_flow = uses_api_flow(&method),
            "Pakasir transaction created"
        );

        Ok(created)
    }

    async fn get_status(&self, reference: &str) -> Result<StatusReport> {
        let transaction = self
            .store
            .find(reference)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("transaction {reference}")))?;

        if is_callback_only(&transaction.method) {
            return Ok(Self::ledger_report(&transaction));
        }

        let (slug, api_key) = self.credentials()?;
        let amount = transaction.amount.to_string();
        let response = self
            .http
            .get(format!("{}/api/transactiondetail", self.base_url))
            .query(&[
                ("project", slug),
                ("amount", amount.as_str()),
                ("order_id", transaction.reference.as_str()),
                ("api_key", api_key),
            ])
            .send()
            .await?;

        let body: DetailResponse = read_json(NAME, response).await?;
        let raw = body
            .transaction
            .ok_or_else(|| GatewayError::NotFound(format!("transaction {reference}")))?;
        let data: DetailData = serde_json::from_value(raw.clone())?;

        let provider_status = data.status.unwrap_or_default();
        Ok(StatusReport {
            reference: transaction.reference,
            status: TransactionStatus::from_provider(&provider_status, STATUS_TABLE),
            provider_status,
            paid_at: parse_rfc3339(data.completed_at.as_deref()),
            amount: data.amount.or(Some(transaction.amount)),
            payment_method: data.payment_method.or(Some(transaction.method)),
            source: StatusSource::Provider,
            provider_data: Some(raw),
        })
    }

    fn parse_callback(&self, body: &[u8], _headers: &HeaderMap) -> Result<CallbackEvent> {
        let envelope: CallbackEnvelope = serde_json::from_slice(body)
            .map_err(|e| GatewayError::Parse(format!("invalid JSON payload: {e}")))?;
        let payload = envelope.data.unwrap_or(envelope.flat);

        let reference = payload
            .order_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::Parse("order_id not found in callback".into()))?;
        let provider_status = payload.status.unwrap_or_default();
        let paid_at: Option<DateTime<Utc>> = parse_rfc3339(payload.completed_at.as_deref());

        Ok(CallbackEvent {
            reference,
            status: TransactionStatus::from_provider(&provider_status, STATUS_TABLE),
            provider_status,
            paid_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiroine_pay_core::{OrderItem, Payer};
    use shiroine_pay_store::{Ledger, MemoryStore};

    fn gateway(store: Arc<MemoryStore>) -> PakasirGateway {
        PakasirGateway::new(
            PakasirConfig {
                api_key: Some("key".into()),
                slug: Some("shiroine".into()),
                api_url: Some("https://app.pakasir.test".into()),
            },
            "shiroine.my.id".into(),
            reqwest::Client::new(),
            store,
        )
    }

    #[test]
    fn method_mapping() {
        assert_eq!(map_method("QRIS"), "qris");
        assert_eq!(map_method("CIMB_NIAGA_VA"), "cimb_niaga_va");
        assert_eq!(map_method("SAMPOERNA_VA"), "sampoerna_va");
        assert_eq!(map_method("ATM_BERSAMA_VA"), "atm_bersama_va");
        assert_eq!(map_method("ARTHA_GRAHA_VA"), "artha_graha_va");
        assert_eq!(map_method("BRIVA"), "bri_va");
        assert_eq!(map_method("PayPal"), "paypal");
        assert_eq!(map_method("OVO_WALLET"), "ovowallet");
    }

    #[test]
    fn flow_selection() {
        for code in ["QRIS", "BNI_VA", "MAYBANK_VA", "PAYPAL"] {
            assert!(uses_api_flow(&map_method(code)), "{code}");
        }
        assert!(!uses_api_flow(&map_method("OVO")));
    }

    #[test]
    fn catalog_has_eleven_active_channels() {
        let channels = channels();
        assert_eq!(channels.len(), 11);
        assert!(channels.iter().all(|c| c.active));
        assert_eq!(channels[0].code, "QRIS");
        assert_eq!(channels[10].code, "PAYPAL");
    }

    #[test]
    fn callback_flat_and_nested() {
        let gw = gateway(Arc::new(MemoryStore::new()));
        let flat = br#"{"amount":22000,"order_id":"INV-20250112-000123","project":"shiroine","status":"completed","payment_method":"qris","completed_at":"2024-09-10T08:07:02.819+07:00"}"#;
        let event = gw.parse_callback(flat, &HeaderMap::new()).unwrap();
        assert_eq!(event.reference, "INV-20250112-000123");
        assert_eq!(event.status, TransactionStatus::Paid);
        assert!(event.paid_at.is_some());

        let nested = br#"{"data":{"order_id":"INV-20250112-000124","status":"expired"}}"#;
        let event = gw.parse_callback(nested, &HeaderMap::new()).unwrap();
        assert_eq!(event.reference, "INV-20250112-000124");
        assert_eq!(event.status, TransactionStatus::Expired);
        assert!(event.paid_at.is_none());

        let missing = br#"{"status":"completed"}"#;
        assert!(matches!(
            gw.parse_callback(missing, &HeaderMap::new()),
            Err(GatewayError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn url_flow_builds_checkout_locally() {
        let store = Arc::new(MemoryStore::new());
        let gw = gateway(store.clone());
        let created = gw
            .create_transaction(&CreateTransactionRequest {
                method: "OVO".into(),
                amount: 15000,
                customer_phone: Some("628123".into()),
                order_items: vec![OrderItem::new("User Premium - 15 Days", 15000)],
                ..Default::default()
            })
            .await
            .unwrap();

        let url = created.checkout_url.unwrap();
        assert!(url.starts_with("https://app.pakasir.test/pay/shiroine/15000?order_id=INV-"));
        assert!(url.contains("redirect=https%3A%2F%2Fshiroine.my.id%2Fpay%2FINV-"));
        assert_eq!(created.reference, created.merchant_ref);

        let row = store.find(&created.reference).await.unwrap().unwrap();
        assert_eq!(row.method, "OVO");
        assert_eq!(row.status, TransactionStatus::Unpaid);
    }

    #[tokio::test]
    async fn virtual_account_status_comes_from_ledger() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(&Transaction::unpaid(
                "INV-20250112-000001",
                "INV-20250112-000001",
                Payer::Individual("628123".into()),
                "Budi",
                "BNI_VA",
                15000,
                vec![OrderItem::new("User Premium - 15 Days", 15000)],
            ))
            .await
            .unwrap();

        let report = gateway(store)
            .get_status("INV-20250112-000001")
            .await
            .unwrap();
        assert_eq!(report.source, StatusSource::Ledger);
        assert_eq!(report.status, TransactionStatus::Unpaid);
        assert_eq!(report.payment_method.as_deref(), Some("BNI_VA"));
    }

    #[tokio::test]
    async fn unknown_reference_is_not_found() {
        let result = gateway(Arc::new(MemoryStore::new()))
            .get_status("INV-missing")
            .await;
        assert!(matches!(result, Err(GatewayError::NotFound(_))));
    }
}
