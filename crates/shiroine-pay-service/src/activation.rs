//! Premium activation.
//!
//! Turns a PAID transaction into an entitlement: resolve the identity,
//! infer the plan from the first order item, then stack the new period on
//! whatever the identity already has.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use shiroine_pay_core::{CoreError, Entitlement, Payer, Plan};
use shiroine_pay_store::{Store, StoreError};

/// Errors raised while activating premium.
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    /// The transaction row vanished between reconcile and activation.
    #[error("transaction not found: {0}")]
    MissingTransaction(String),

    /// No plan could be determined from the order items.
    #[error("plan resolution failed: {0}")]
    Plan(#[from] CoreError),

    /// The plan is sold to the other kind of payer.
    #[error("plan {plan} cannot be activated for {payer}")]
    AudienceMismatch {
        /// The inferred plan.
        plan: Plan,
        /// The payer id (phone number or group id).
        payer: String,
    },

    /// Ledger or entitlement storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The `(jid, lid)` pair an entitlement is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Phone number or group id.
    pub jid: String,
    /// Directory lid, or the jid when unresolved.
    pub lid: String,
}

/// Grants premium for paid transactions.
///
/// Activations for the same identity are serialized so that two purchases
/// settling at once both stack instead of one overwriting the other.
pub struct Activator {
    store: Arc<dyn Store>,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Activator {
    /// Create an activator over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Activate premium for `reference` at the current time.
    ///
    /// # Errors
    ///
    /// See [`Activator::activate_at`].
    pub async fn activate(&self, reference: &str) -> Result<Entitlement, ActivationError> {
        self.activate_at(reference, Utc::now()).await
    }

    /// Activate premium for `reference` as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `MissingTransaction` if no row matches, `Plan` if the first
    /// order item names no known plan, `AudienceMismatch` if a group bought
    /// an individual plan or the reverse, and `Store` on storage failure.
    pub async fn activate_at(
        &self,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<Entitlement, ActivationError> {
        let (payer, items) = self
            .store
            .find_payer_and_items(reference)
            .await?
            .ok_or_else(|| ActivationError::MissingTransaction(reference.to_string()))?;

        let item = items.first().ok_or(CoreError::NoOrderItems)?;
        let plan = Plan::infer_from_item_name(&item.name)?;
        if plan.is_group() != payer.is_group() {
            return Err(ActivationError::AudienceMismatch {
                plan,
                payer: payer.id().to_string(),
            });
        }
        let identity = self.resolve_identity(&payer).await;

        let lock = self.lock_for(&identity.jid);
        let result = {
            let _guard = lock.lock().await;
            self.stack(&identity, plan, now).await
        };
        drop(lock);
        self.release(&identity.jid);
        let entitlement = result?;

        tracing::info!(
            reference,
            jid = %entitlement.jid,
            lid = %entitlement.lid,
            plan = %plan,
            expired = ?entitlement.expired,
            "Premium activated"
        );
        Ok(entitlement)
    }

    /// Resolve the entitlement identity for a payer.
    ///
    /// Groups key on their id twice. Individuals use the directory lid and
    /// fall back to the phone number when it is unknown or the lookup fails.
    pub async fn resolve_identity(&self, payer: &Payer) -> Identity {
        match payer {
            Payer::Group(group_id) => Identity {
                jid: group_id.clone(),
                lid: group_id.clone(),
            },
            Payer::Individual(phone) => {
                let lid = match self.store.lid_for_phone(phone).await {
                    Ok(Some(lid)) => lid,
                    Ok(None) => {
                        tracing::warn!(phone_number = %phone, "No lid for phone number, using phone as lid");
                        phone.clone()
                    }
                    Err(e) => {
                        tracing::warn!(phone_number = %phone, error = %e, "Lid lookup failed, using phone as lid");
                        phone.clone()
                    }
                };
                Identity {
                    jid: phone.clone(),
                    lid,
                }
            }
        }
    }

    /// Read, extend and write back the entitlement. Caller holds the identity lock.
    async fn stack(
        &self,
        identity: &Identity,
        plan: Plan,
        now: DateTime<Utc>,
    ) -> Result<Entitlement, StoreError> {
        let existing = self
            .store
            .get_entitlement(&identity.jid, &identity.lid)
            .await?;
        let entitlement = Entitlement::activate(
            existing.as_ref(),
            identity.jid.clone(),
            identity.lid.clone(),
            plan,
            now,
        );
        self.store.upsert_entitlement(&entitlement).await?;
        Ok(entitlement)
    }

    fn lock_for(&self, jid: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(jid.to_string()).or_default().clone()
    }

    /// Drop the lock entry once nobody else holds it.
    fn release(&self, jid: &str) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if locks.get(jid).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(jid);
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use shiroine_pay_core::{OrderItem, Transaction};
    use shiroine_pay_store::{Entitlements, Ledger, MemoryStore};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 12, 9, 0, 0).unwrap()
    }

    async fn seed(store: &MemoryStore, reference: &str, payer: Payer, item: &str) {
        store
            .insert(&Transaction::unpaid(
                reference,
                format!("M-{reference}"),
                payer,
                "Budi",
                "QRIS",
                15000,
                vec![OrderItem::new(item, 15000)],
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn individual_uses_directory_lid() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("628123", "lid-1@lid");
        seed(&store, "T1", Payer::Individual("628123".into()), "User Premium - 15 Days").await;

        let activator = Activator::new(store.clone());
        let entitlement = activator.activate_at("T1", now()).await.unwrap();

        assert_eq!(entitlement.jid, "628123");
        assert_eq!(entitlement.lid, "lid-1@lid");
        assert_eq!(entitlement.max_special_limit, 10);
        assert_eq!(entitlement.expired, Some(now() + Duration::days(15)));
        assert_eq!(
            store.get_entitlement("628123", "lid-1@lid").await.unwrap(),
            Some(entitlement)
        );
        assert_eq!(activator.lock_count(), 0);
    }

    #[tokio::test]
    async fn unknown_phone_falls_back_to_jid() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "T1", Payer::Individual("628999".into()), "User Premium - 1 Month").await;

        let entitlement = Activator::new(store)
            .activate_at("T1", now())
            .await
            .unwrap();
        assert_eq!(entitlement.lid, "628999");
        assert_eq!(entitlement.max_special_limit, 15);
    }

    #[tokio::test]
    async fn group_keys_on_group_id() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "T1", Payer::Group("1203@g.us".into()), "Grup Premium - 1 Bulan").await;

        let entitlement = Activator::new(store)
            .activate_at("T1", now())
            .await
            .unwrap();
        assert_eq!(entitlement.jid, "1203@g.us");
        assert_eq!(entitlement.lid, "1203@g.us");
        assert_eq!(entitlement.max_special_limit, 50);
        assert_eq!(entitlement.expired, Some(now() + Duration::days(30)));
    }

    #[tokio::test]
    async fn second_purchase_stacks() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "T1", Payer::Individual("628123".into()), "User Premium - 15 Days").await;
        seed(&store, "T2", Payer::Individual("628123".into()), "User Premium - 5 Days").await;

        let activator = Activator::new(store);
        activator.activate_at("T1", now()).await.unwrap();
        let entitlement = activator
            .activate_at("T2", now() + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(entitlement.expired, Some(now() + Duration::days(22)));
        assert_eq!(entitlement.special_limit, 0);
        assert_eq!(entitlement.max_special_limit, 5);
    }

    #[tokio::test]
    async fn unresolvable_plan_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "T1", Payer::Individual("628123".into()), "Sticker Pack").await;

        let result = Activator::new(store).activate_at("T1", now()).await;
        assert!(matches!(result, Err(ActivationError::Plan(_))));
    }

    #[tokio::test]
    async fn group_cannot_take_individual_plan() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "T1", Payer::Group("1203@g.us".into()), "User Premium - 15 Days").await;

        let result = Activator::new(store.clone()).activate_at("T1", now()).await;
        assert!(matches!(
            result,
            Err(ActivationError::AudienceMismatch { plan: Plan::User15d, .. })
        ));
        assert_eq!(
            store.get_entitlement("1203@g.us", "1203@g.us").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn individual_cannot_take_group_plan() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("628123", "lid-1@lid");
        seed(&store, "T1", Payer::Individual("628123".into()), "Grup Premium - 1 Bulan").await;

        let activator = Activator::new(store.clone());
        let result = activator.activate_at("T1", now()).await;
        assert!(matches!(
            result,
            Err(ActivationError::AudienceMismatch { plan: Plan::Group1m, .. })
        ));
        assert_eq!(
            store.get_entitlement("628123", "lid-1@lid").await.unwrap(),
            None
        );
        assert_eq!(activator.lock_count(), 0);
    }

    #[tokio::test]
    async fn missing_transaction() {
        let result = Activator::new(Arc::new(MemoryStore::new()))
            .activate("nope")
            .await;
        assert!(matches!(result, Err(ActivationError::MissingTransaction(_))));
    }
}
