//! Payment session state
//!
//! `PaymentSession` is the one mutable object a presenter drives. It owns the
//! working reference collection, the review batch and the search term, turns
//! every outcome into a [`Notification`], and mirrors its state to a
//! [`SessionCache`] so an interrupted session can be resumed.

use crate::cache::{self, SessionCache, SessionKey};
use crate::logging::mask_reference;
use crate::multipay::aggregator::{confirm_and_build_batch, total_sum, Batch, ReferenceCollection};
use crate::multipay::client::MultipayApi;
use crate::multipay::error::MultipayError;
use crate::multipay::initiation::{Navigator, PaymentInitiator};
use crate::multipay::notification::{format_currency, Notification, NotificationVariant};
use crate::multipay::types::{BatchRow, ReferenceEntry};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which screen the session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    References,
    Review,
}

/// What is stored under the batch key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub rows: Vec<BatchRow>,
    pub valid_transaction_ids: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

pub struct PaymentSession {
    api: Arc<dyn MultipayApi>,
    cache: Arc<dyn SessionCache>,
    navigator: Arc<dyn Navigator>,
    references: ReferenceCollection,
    batch: Option<Batch>,
    search: String,
}

impl PaymentSession {
    pub fn new(
        api: Arc<dyn MultipayApi>,
        cache: Arc<dyn SessionCache>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            api,
            cache,
            navigator,
            references: ReferenceCollection::new(),
            batch: None,
            search: String::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self.batch {
            Some(_) => Stage::Review,
            None => Stage::References,
        }
    }

    pub fn references(&self) -> &ReferenceCollection {
        &self.references
    }

    pub fn batch(&self) -> Option<&Batch> {
        self.batch.as_ref()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    /// Validates and verifies one user-entered reference.
    ///
    /// Refused while a review batch is open; go back to the reference stage
    /// first.
    pub async fn add_reference(&mut self, input: &str) -> Notification {
        if self.batch.is_some() {
            return Notification::new(
                "Batch Awaiting Payment",
                "Go back to the reference list to add more transaction IDs",
                NotificationVariant::Warning,
            );
        }

        match self.references.add(self.api.as_ref(), input).await {
            Ok((entry, outcome)) => {
                let description = match entry.payment_record.as_ref() {
                    Some(record) => format!(
                        "Valid payment reference for {}",
                        format_currency(&record.amount)
                    ),
                    None => "Transaction reference validated successfully".to_string(),
                };
                let title = outcome
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Success".to_string());
                Notification::success(title, description)
            }
            Err(e) => {
                debug!(kind = ?e.kind(), error = %e, "reference not added");
                Notification::from(&e)
            }
        }
    }

    pub fn remove_reference(&mut self, id: &str) -> Notification {
        let value = self.references.get(id).map(|entry| entry.value.clone());
        match value {
            Some(value) if self.references.remove(id) => {
                info!(reference = %mask_reference(&value), "reference removed");
                Notification::info("Removed", format!("{} was removed", value))
            }
            _ => Notification::info("Not Found", "That transaction ID is no longer in the list"),
        }
    }

    /// Re-verifies every valid reference and moves to the review stage.
    ///
    /// On failure the session stays on the reference stage with its entries
    /// untouched.
    pub async fn confirm(&mut self) -> Notification {
        match confirm_and_build_batch(self.api.as_ref(), &self.references).await {
            Ok(batch) => {
                let count = batch.len();
                self.batch = Some(batch);
                self.search.clear();
                self.mirror().await;
                Notification::success(
                    "Validation Successful",
                    format!("{} transaction(s) ready for payment", count),
                )
            }
            Err(e) => {
                if let MultipayError::PaymentStatusError { paid_references } = &e {
                    let masked: Vec<String> =
                        paid_references.iter().map(|r| mask_reference(r)).collect();
                    warn!(paid = ?masked, "confirmation refused");
                }
                Notification::from(&e)
            }
        }
    }

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.search = term.into();
    }

    /// Review rows matching the current search term.
    pub fn visible_rows(&self) -> Vec<&BatchRow> {
        match self.batch.as_ref() {
            Some(batch) => batch.filter(&self.search).collect(),
            None => Vec::new(),
        }
    }

    /// Sum over the visible rows only.
    pub fn visible_total(&self) -> BigDecimal {
        total_sum(self.visible_rows())
    }

    pub fn select_row(&mut self, id: &str) -> bool {
        self.batch.as_mut().map_or(false, |batch| batch.select(id))
    }

    pub fn select_all_visible(&mut self) {
        let term = self.search.clone();
        if let Some(batch) = self.batch.as_mut() {
            batch.select_all(&term);
        }
    }

    pub fn clear_selection(&mut self) {
        if let Some(batch) = self.batch.as_mut() {
            batch.clear_selection();
        }
    }

    pub async fn delete_row(&mut self, id: &str) -> Notification {
        let removed = match self.batch.as_mut() {
            Some(batch) => batch.delete_rows(&[id]),
            None => 0,
        };
        self.after_delete(removed).await
    }

    pub async fn delete_selected(&mut self) -> Notification {
        let removed = self
            .batch
            .as_mut()
            .map_or(0, |batch| batch.delete_selected());
        self.after_delete(removed).await
    }

    async fn after_delete(&mut self, removed: usize) -> Notification {
        if removed == 0 {
            return Notification::info("Nothing Deleted", "No matching transactions were found");
        }

        info!(removed, "rows deleted from review batch");
        self.mirror().await;
        Notification::success("Deleted", format!("{} transaction(s) removed", removed))
    }

    /// Initializes payment for the whole batch and redirects.
    pub async fn proceed(&mut self) -> Notification {
        let batch = match self.batch.as_ref() {
            Some(batch) if !batch.is_empty() => batch,
            _ => {
                return Notification::from(&MultipayError::InitializationError {
                    message: "There are no transactions to pay for".to_string(),
                })
            }
        };

        let references = batch.references();
        if let Err(e) =
            cache::set_json(self.cache.as_ref(), SessionKey::TransactionReferences, &references)
                .await
        {
            warn!(error = %e, "failed to record transaction references");
        }

        match PaymentInitiator::proceed(self.api.as_ref(), self.navigator.as_ref(), batch).await {
            Ok(_) => Notification::success("Redirecting", "Redirecting to payment gateway..."),
            Err(e) => {
                warn!(
                    kind = ?e.kind(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "payment initialization failed"
                );
                Notification::from(&e)
            }
        }
    }

    /// Leaves the review stage, keeping the batch references as valid entries.
    pub async fn back_to_references(&mut self) -> Notification {
        let Some(batch) = self.batch.take() else {
            return Notification::info("References", "Already on the reference list");
        };

        self.references = ReferenceCollection::restored(batch.references());
        self.search.clear();
        self.mirror().await;
        Notification::info(
            "References",
            format!("{} transaction ID(s) kept", self.references.len()),
        )
    }

    /// Writes the current state to the cache.
    pub async fn save(&self) -> Notification {
        match self.write_snapshot().await {
            Ok(()) => Notification::info("Session Saved", "Your progress has been saved"),
            Err(e) => {
                warn!(error = %e, "session save failed");
                Notification::new(
                    "Session Not Saved",
                    "Your progress could not be saved",
                    NotificationVariant::Warning,
                )
            }
        }
    }

    /// Reloads a previously saved session, replacing the current state.
    ///
    /// A saved batch resumes the review stage; otherwise saved references
    /// resume the reference stage.
    pub async fn restore(&mut self) -> Notification {
        let snapshot: Option<SessionSnapshot> =
            match cache::get_json(self.cache.as_ref(), SessionKey::BatchData).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "ignoring unreadable saved batch");
                    None
                }
            };

        if let Some(snapshot) = snapshot.filter(|s| !s.rows.is_empty()) {
            info!(
                rows = snapshot.rows.len(),
                saved_at = %snapshot.saved_at,
                "restored review batch"
            );
            self.references = ReferenceCollection::restored(snapshot.valid_transaction_ids);
            self.batch = Some(Batch::new(snapshot.rows));
            self.search.clear();
            return Notification::info(
                "Session Restored",
                format!("{} transaction(s) awaiting payment", self.batch_len()),
            );
        }

        let ids: Option<Vec<String>> =
            match cache::get_json(self.cache.as_ref(), SessionKey::ValidTransactionIds).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(error = %e, "ignoring unreadable saved references");
                    None
                }
            };

        match ids.filter(|ids| !ids.is_empty()) {
            Some(ids) => {
                self.references = ReferenceCollection::restored(ids);
                self.batch = None;
                self.search.clear();
                Notification::info(
                    "Session Restored",
                    format!("{} transaction ID(s) restored", self.references.len()),
                )
            }
            None => Notification::info("Nothing to Restore", "No saved session was found"),
        }
    }

    fn batch_len(&self) -> usize {
        self.batch.as_ref().map_or(0, Batch::len)
    }

    fn valid_ids(&self) -> Vec<String> {
        self.references
            .valid_entries()
            .map(|entry: &ReferenceEntry| entry.value.clone())
            .collect()
    }

    async fn write_snapshot(&self) -> cache::CacheResult<()> {
        let valid_transaction_ids = self.valid_ids();
        cache::set_json(
            self.cache.as_ref(),
            SessionKey::ValidTransactionIds,
            &valid_transaction_ids,
        )
        .await?;

        match self.batch.as_ref() {
            Some(batch) => {
                let snapshot = SessionSnapshot {
                    rows: batch.rows().to_vec(),
                    valid_transaction_ids,
                    saved_at: Utc::now(),
                };
                cache::set_json(self.cache.as_ref(), SessionKey::BatchData, &snapshot).await
            }
            None => self.cache.delete(SessionKey::BatchData).await,
        }
    }

    /// Best-effort write after a state change.
    async fn mirror(&self) {
        if let Err(e) = self.write_snapshot().await {
            warn!(error = %e, "failed to mirror session to cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, CacheResult, MemoryCache};
    use crate::multipay::error::MultipayResult;
    use crate::multipay::types::{
        BatchDetails, InitializationResponse, PaymentRecord, VerifyOutcome,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn record(reference: &str, amount: i64, status: &str) -> PaymentRecord {
        PaymentRecord {
            id: None,
            reference: reference.to_string(),
            amount: BigDecimal::from(amount),
            currency: Some("NGN".to_string()),
            email: Some(format!("{}@example.com", reference.to_lowercase())),
            status: status.to_string(),
            created_at: None,
            metadata: None,
            application_fee: None,
            charges: None,
        }
    }

    struct StubApi {
        status: &'static str,
    }

    #[async_trait]
    impl MultipayApi for StubApi {
        async fn verify_single(&self, reference: &str) -> MultipayResult<VerifyOutcome> {
            Ok(VerifyOutcome {
                is_valid: true,
                message: None,
                record: Some(record(reference, 5000, "unpaid")),
            })
        }

        async fn verify_batch(&self, references: &[String]) -> MultipayResult<BatchDetails> {
            Ok(BatchDetails {
                payments: references
                    .iter()
                    .map(|r| record(r, 5000, self.status))
                    .collect(),
                references: references.to_vec(),
                total: None,
            })
        }

        async fn initialize_payment(
            &self,
            _references: &[String],
        ) -> MultipayResult<InitializationResponse> {
            Ok(serde_json::from_value(serde_json::json!({
                "status": true,
                "data": {"payment_url": "https://pay.example/checkout"}
            }))
            .unwrap())
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        visited: Mutex<Vec<String>>,
    }

    impl Navigator for RecordingNavigator {
        fn redirect(&self, url: &str) {
            self.visited.lock().unwrap().push(url.to_string());
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl SessionCache for BrokenCache {
        async fn get_raw(&self, _key: SessionKey) -> CacheResult<Option<String>> {
            Err(CacheError::ConnectionError("down".to_string()))
        }

        async fn set_raw(&self, _key: SessionKey, _value: String) -> CacheResult<()> {
            Err(CacheError::ConnectionError("down".to_string()))
        }

        async fn delete(&self, _key: SessionKey) -> CacheResult<()> {
            Err(CacheError::ConnectionError("down".to_string()))
        }
    }

    fn session_with(status: &'static str, cache: Arc<dyn SessionCache>) -> PaymentSession {
        PaymentSession::new(
            Arc::new(StubApi { status }),
            cache,
            Arc::new(RecordingNavigator::default()),
        )
    }

    #[tokio::test]
    async fn test_add_reports_amount_in_naira() {
        let mut session = session_with("unpaid", Arc::new(MemoryCache::new()));
        let n = session.add_reference("ABCD1234EFGH5678").await;
        assert_eq!(n.title, "Success");
        assert_eq!(n.description, "Valid payment reference for ₦5,000");
        assert_eq!(session.references().len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_moves_to_review_and_mirrors_state() {
        let cache = Arc::new(MemoryCache::new());
        let mut session = session_with("unpaid", cache.clone());
        session.add_reference("ABCD1234EFGH5678").await;
        session.add_reference("WXYZ1234EFGH5678").await;

        let n = session.confirm().await;
        assert_eq!(n.variant, NotificationVariant::Success);
        assert_eq!(session.stage(), Stage::Review);
        assert_eq!(session.visible_total(), BigDecimal::from(10000));

        let saved: Option<SessionSnapshot> = cache::get_json(cache.as_ref(), SessionKey::BatchData)
            .await
            .unwrap();
        assert_eq!(saved.unwrap().rows.len(), 2);
    }

    #[tokio::test]
    async fn test_paid_record_keeps_reference_stage() {
        let mut session = session_with("paid", Arc::new(MemoryCache::new()));
        session.add_reference("ABCD1234EFGH5678").await;

        let n = session.confirm().await;
        assert_eq!(n.title, "Payment Status Error");
        assert_eq!(n.description, "Some transactions have already been paid");
        assert_eq!(session.stage(), Stage::References);
        assert_eq!(session.references().len(), 1);
    }

    #[tokio::test]
    async fn test_search_narrows_total_and_select_all() {
        let mut session = session_with("unpaid", Arc::new(MemoryCache::new()));
        session.add_reference("ABCD1234EFGH5678").await;
        session.add_reference("WXYZ1234EFGH5678").await;
        session.confirm().await;

        session.set_search("wxyz");
        assert_eq!(session.visible_rows().len(), 1);
        assert_eq!(session.visible_total(), BigDecimal::from(5000));

        session.select_all_visible();
        let n = session.delete_selected().await;
        assert_eq!(n.description, "1 transaction(s) removed");

        session.set_search("");
        assert_eq!(session.visible_rows().len(), 1);
        assert!(session.batch().unwrap().selected().is_empty());
    }

    #[tokio::test]
    async fn test_add_is_refused_while_batch_awaits_payment() {
        let cache: Arc<dyn SessionCache> = Arc::new(MemoryCache::new());
        let mut first = session_with("unpaid", cache.clone());
        first.add_reference("ABCD1234EFGH5678").await;
        first.confirm().await;

        let mut resumed = session_with("unpaid", cache);
        resumed.restore().await;
        assert_eq!(resumed.stage(), Stage::Review);

        let n = resumed.add_reference("WXYZ1234EFGH5678").await;
        assert_eq!(n.title, "Batch Awaiting Payment");
        assert_eq!(n.variant, NotificationVariant::Warning);
        assert_eq!(resumed.references().len(), 1);
        assert_eq!(resumed.visible_rows().len(), 1);

        resumed.back_to_references().await;
        let n = resumed.add_reference("WXYZ1234EFGH5678").await;
        assert_eq!(n.variant, NotificationVariant::Success);
        assert_eq!(resumed.references().len(), 2);
    }

    #[tokio::test]
    async fn test_row_selection_drives_delete_selected() {
        let mut session = session_with("unpaid", Arc::new(MemoryCache::new()));
        assert!(!session.select_row("anything"));

        session.add_reference("ABCD1234EFGH5678").await;
        session.add_reference("WXYZ1234EFGH5678").await;
        session.confirm().await;

        let first = session.batch().unwrap().rows()[0].id.clone();
        assert!(session.select_row(&first));
        assert!(!session.select_row("missing"));

        session.clear_selection();
        let n = session.delete_selected().await;
        assert_eq!(n.title, "Nothing Deleted");
        assert_eq!(session.visible_rows().len(), 2);

        session.select_row(&first);
        let n = session.delete_selected().await;
        assert_eq!(n.title, "Deleted");
        assert_eq!(
            session.batch().unwrap().references(),
            vec!["WXYZ1234EFGH5678".to_string()]
        );
    }

    #[tokio::test]
    async fn test_back_to_references_restores_valid_entries() {
        let mut session = session_with("unpaid", Arc::new(MemoryCache::new()));
        session.add_reference("ABCD1234EFGH5678").await;
        session.confirm().await;

        session.back_to_references().await;
        assert_eq!(session.stage(), Stage::References);
        let entry = &session.references().entries()[0];
        assert!(entry.is_valid());
        assert_eq!(entry.id, "restored_0_ABCD1234EFGH5678");
    }

    #[tokio::test]
    async fn test_restore_resumes_review_from_cache() {
        let cache: Arc<dyn SessionCache> = Arc::new(MemoryCache::new());
        let mut first = session_with("unpaid", cache.clone());
        first.add_reference("ABCD1234EFGH5678").await;
        first.confirm().await;

        let mut second = session_with("unpaid", cache);
        let n = second.restore().await;
        assert_eq!(n.title, "Session Restored");
        assert_eq!(second.stage(), Stage::Review);
        assert_eq!(second.visible_rows().len(), 1);
        assert_eq!(second.references().valid_references(), vec!["ABCD1234EFGH5678"]);
    }

    #[tokio::test]
    async fn test_cache_failures_do_not_block_the_flow() {
        let mut session = session_with("unpaid", Arc::new(BrokenCache));
        session.add_reference("ABCD1234EFGH5678").await;

        let n = session.confirm().await;
        assert_eq!(n.variant, NotificationVariant::Success);

        let n = session.proceed().await;
        assert_eq!(n.title, "Redirecting");

        let n = session.save().await;
        assert_eq!(n.variant, NotificationVariant::Warning);

        let n = session.restore().await;
        assert_eq!(n.title, "Nothing to Restore");
        assert_eq!(session.stage(), Stage::Review);
    }

    #[tokio::test]
    async fn test_proceed_without_batch_is_an_error() {
        let mut session = session_with("unpaid", Arc::new(MemoryCache::new()));
        let n = session.proceed().await;
        assert!(n.is_error());
    }
}
