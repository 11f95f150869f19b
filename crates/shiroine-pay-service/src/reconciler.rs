//! Status reconciliation.
//!
//! Callbacks and polling both funnel through [`Reconciler::reconcile`]. The
//! ledger write is conditional on the status that was read, so when the two
//! paths race on the same payment exactly one of them wins the PAID
//! transition and only the winner activates premium.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use shiroine_pay_core::TransactionStatus;
use shiroine_pay_store::{Store, StoreError};

use crate::activation::Activator;

/// What a reconcile call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// No ledger row matches the reference.
    Missing,
    /// The stored status already equals the incoming one.
    Unchanged {
        /// Stored status.
        status: TransactionStatus,
    },
    /// The transition is not allowed (e.g. leaving PAID).
    Rejected {
        /// Stored status.
        from: TransactionStatus,
        /// Incoming status.
        to: TransactionStatus,
    },
    /// Another writer changed the row first.
    Superseded {
        /// Status that was read before the write.
        from: TransactionStatus,
    },
    /// The status changed to something other than PAID.
    Updated {
        /// Previous status.
        from: TransactionStatus,
        /// New status.
        to: TransactionStatus,
    },
    /// The row became PAID and premium was granted.
    Activated {
        /// Previous status.
        from: TransactionStatus,
    },
    /// The row became PAID but premium could not be granted.
    ActivationFailed {
        /// Previous status.
        from: TransactionStatus,
        /// Why activation failed.
        reason: String,
    },
}

/// Applies provider statuses to the ledger and triggers activation.
pub struct Reconciler {
    store: Arc<dyn Store>,
    activator: Activator,
}

impl Reconciler {
    /// Create a reconciler over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        let activator = Activator::new(store.clone());
        Self { store, activator }
    }

    /// The activator used after PAID transitions.
    #[must_use]
    pub const fn activator(&self) -> &Activator {
        &self.activator
    }

    /// Apply `incoming` to the transaction named by `reference`.
    ///
    /// `paid_at` defaults to now for PAID. Activation failures are logged and
    /// reported in the outcome; the PAID row is kept either way.
    ///
    /// # Errors
    ///
    /// Returns the store error if the ledger cannot be read or written.
    pub async fn reconcile(
        &self,
        reference: &str,
        incoming: TransactionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Outcome, StoreError> {
        let Some(current) = self.store.current_status(reference).await? else {
            tracing::warn!(reference, status = %incoming, "Payment record not found in ledger");
            return Ok(Outcome::Missing);
        };

        if current == incoming {
            tracing::debug!(reference, status = %current, "Status unchanged");
            return Ok(Outcome::Unchanged { status: current });
        }

        if !current.can_transition_to(incoming) {
            tracing::warn!(
                reference,
                from = %current,
                to = %incoming,
                "Ignoring status transition"
            );
            return Ok(Outcome::Rejected {
                from: current,
                to: incoming,
            });
        }

        let paid_at = match incoming {
            TransactionStatus::Paid => Some(paid_at.unwrap_or_else(Utc::now)),
            _ => None,
        };

        if !self
            .store
            .transition_status(reference, current, incoming, paid_at)
            .await?
        {
            tracing::info!(
                reference,
                from = %current,
                to = %incoming,
                "Status changed concurrently, skipping"
            );
            return Ok(Outcome::Superseded { from: current });
        }

        tracing::info!(reference, from = %current, to = %incoming, "Transaction status updated");

        if incoming != TransactionStatus::Paid {
            return Ok(Outcome::Updated {
                from: current,
                to: incoming,
            });
        }

        match self.activator.activate(reference).await {
            Ok(_) => Ok(Outcome::Activated { from: current }),
            Err(e) => {
                tracing::error!(reference, error = %e, "Premium activation failed");
                Ok(Outcome::ActivationFailed {
                    from: current,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// [`Reconciler::reconcile`] for the polling path, where ledger failures
    /// must not hide the provider status from the caller.
    pub async fn reconcile_polled(
        &self,
        reference: &str,
        incoming: TransactionStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Option<Outcome> {
        match self.reconcile(reference, incoming, paid_at).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(reference, error = %e, "Failed to reconcile polled status");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiroine_pay_core::{OrderItem, Payer, Transaction};
    use shiroine_pay_store::{Entitlements, Ledger, MemoryStore};

    async fn store_with(reference: &str, item: &str) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_user("628123", "lid-1@lid");
        store
            .insert(&Transaction::unpaid(
                reference,
                format!("PREMIUM-{reference}"),
                Payer::Individual("628123".into()),
                "Budi",
                "QRIS",
                15000,
                vec![OrderItem::new(item, 15000)],
            ))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn paid_activates_once() {
        let store = store_with("T1", "User Premium - 15 Days").await;
        let reconciler = Reconciler::new(store.clone());

        let first = reconciler
            .reconcile("T1", TransactionStatus::Paid, None)
            .await
            .unwrap();
        assert_eq!(
            first,
            Outcome::Activated {
                from: TransactionStatus::Unpaid
            }
        );

        let second = reconciler
            .reconcile("T1", TransactionStatus::Paid, None)
            .await
            .unwrap();
        assert_eq!(
            second,
            Outcome::Unchanged {
                status: TransactionStatus::Paid
            }
        );

        let row = store.find("T1").await.unwrap().unwrap();
        assert!(row.paid_at.is_some());
        assert!(store
            .get_entitlement("628123", "lid-1@lid")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn merchant_ref_also_reconciles() {
        let store = store_with("T1", "User Premium - 15 Days").await;
        let outcome = Reconciler::new(store)
            .reconcile("PREMIUM-T1", TransactionStatus::Expired, None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Updated {
                from: TransactionStatus::Unpaid,
                to: TransactionStatus::Expired
            }
        );
    }

    #[tokio::test]
    async fn paid_is_final() {
        let store = store_with("T1", "User Premium - 15 Days").await;
        let reconciler = Reconciler::new(store.clone());
        reconciler
            .reconcile("T1", TransactionStatus::Paid, None)
            .await
            .unwrap();

        for status in [
            TransactionStatus::Unpaid,
            TransactionStatus::Failed,
            TransactionStatus::Expired,
        ] {
            let outcome = reconciler.reconcile("T1", status, None).await.unwrap();
            assert!(matches!(outcome, Outcome::Rejected { .. }), "{status}");
        }
        assert_eq!(
            store.current_status("T1").await.unwrap(),
            Some(TransactionStatus::Paid)
        );
    }

    #[tokio::test]
    async fn late_capture_after_expiry_activates() {
        let store = store_with("T1", "User Premium - 15 Days").await;
        let reconciler = Reconciler::new(store);
        reconciler
            .reconcile("T1", TransactionStatus::Expired, None)
            .await
            .unwrap();

        let outcome = reconciler
            .reconcile("T1", TransactionStatus::Paid, None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Activated {
                from: TransactionStatus::Expired
            }
        );
    }

    #[tokio::test]
    async fn unknown_plan_keeps_paid_row() {
        let store = store_with("T1", "Sticker Pack").await;
        let outcome = Reconciler::new(store.clone())
            .reconcile("T1", TransactionStatus::Paid, None)
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::ActivationFailed { .. }));
        assert_eq!(
            store.current_status("T1").await.unwrap(),
            Some(TransactionStatus::Paid)
        );
    }

    #[tokio::test]
    async fn group_plan_for_individual_fails_activation() {
        let store = store_with("T1", "Group Premium - 15 Days").await;
        let outcome = Reconciler::new(store.clone())
            .reconcile("T1", TransactionStatus::Paid, None)
            .await
            .unwrap();

        let Outcome::ActivationFailed { reason, .. } = outcome else {
            panic!("expected activation failure, got {outcome:?}");
        };
        assert!(reason.contains("group-15d"), "{reason}");
        assert_eq!(
            store.get_entitlement("628123", "lid-1@lid").await.unwrap(),
            None
        );
        assert_eq!(
            store.current_status("T1").await.unwrap(),
            Some(TransactionStatus::Paid)
        );
    }

    #[tokio::test]
    async fn missing_row() {
        let outcome = Reconciler::new(Arc::new(MemoryStore::new()))
            .reconcile("nope", TransactionStatus::Paid, None)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Missing);
    }

    #[tokio::test]
    async fn store_failure_propagates_but_polling_swallows() {
        let store = store_with("T1", "User Premium - 15 Days").await;
        store.set_fail_writes(true);
        let reconciler = Reconciler::new(store);

        assert!(reconciler
            .reconcile("T1", TransactionStatus::Paid, None)
            .await
            .is_err());
        assert!(reconciler
            .reconcile_polled("T1", TransactionStatus::Paid, None)
            .await
            .is_none());
    }
}
