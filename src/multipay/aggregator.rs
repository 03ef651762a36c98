//! Working set of references and the review batch built from them.

use crate::logging::mask_reference;
use crate::multipay::client::MultipayApi;
use crate::multipay::error::{MultipayError, MultipayResult};
use crate::multipay::types::{BatchRow, ReferenceEntry, ValidationState, VerifyOutcome};
use crate::multipay::validator::{ReferenceValidator, MAX_REFERENCES};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// References entered on the first screen, in submission order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReferenceCollection {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection whose entries are already known to be valid.
    pub fn restored<I, S>(references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: references
                .into_iter()
                .take(MAX_REFERENCES)
                .enumerate()
                .map(|(index, value)| ReferenceEntry::restored(index, value))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ReferenceEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn valid_entries(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.entries.iter().filter(|entry| entry.is_valid())
    }

    pub fn valid_references(&self) -> Vec<String> {
        self.valid_entries().map(|entry| entry.value.clone()).collect()
    }

    /// Validates `input`, inserts it as pending and verifies it remotely.
    ///
    /// On a format failure nothing changes. When the server rejects the
    /// reference or the call fails, the pending entry is removed again.
    pub async fn add(
        &mut self,
        api: &dyn MultipayApi,
        input: &str,
    ) -> MultipayResult<(ReferenceEntry, VerifyOutcome)> {
        let value = ReferenceValidator::validate_format(input, &self.entries)?;
        let entry = ReferenceEntry::pending(value.clone());
        let id = entry.id.clone();
        self.entries.push(entry);

        match api.verify_single(&value).await {
            Ok(outcome) if outcome.is_valid => {
                let entry = self
                    .entries
                    .iter_mut()
                    .find(|entry| entry.id == id)
                    .ok_or(MultipayError::ValidationError {
                        message: "reference was removed during validation".to_string(),
                    })?;
                entry.state = ValidationState::Valid;
                entry.payment_record = outcome.record.clone();
                info!(entry_id = %id, reference = %mask_reference(&value), "reference verified");
                Ok((entry.clone(), outcome))
            }
            Ok(outcome) => {
                self.remove(&id);
                warn!(entry_id = %id, reference = %mask_reference(&value), "reference rejected by server");
                Err(MultipayError::ValidationError {
                    message: outcome
                        .message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| "Invalid payment reference".to_string()),
                })
            }
            Err(e) => {
                self.remove(&id);
                warn!(entry_id = %id, error = %e, "reference verification failed");
                Err(e)
            }
        }
    }

    /// Removes the entry if present. Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        before != self.entries.len()
    }
}

/// Rows under review plus the current row selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Batch {
    rows: Vec<BatchRow>,
    #[serde(default)]
    selected: HashSet<String>,
}

impl Batch {
    pub fn new(rows: Vec<BatchRow>) -> Self {
        Self {
            rows,
            selected: HashSet::new(),
        }
    }

    pub fn rows(&self) -> &[BatchRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn references(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.reference_id.clone()).collect()
    }

    /// Rows matching `term`, case-insensitively, in batch order.
    pub fn filter<'a>(&'a self, term: &str) -> impl Iterator<Item = &'a BatchRow> + 'a {
        let needle = term.trim().to_lowercase();
        self.rows
            .iter()
            .filter(move |row| needle.is_empty() || row_matches(row, &needle))
    }

    pub fn total(&self) -> BigDecimal {
        total_sum(self.rows.iter())
    }

    pub fn selected(&self) -> &HashSet<String> {
        &self.selected
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    /// Selects a row that exists in the batch. Returns whether it was selected.
    pub fn select(&mut self, id: &str) -> bool {
        if self.rows.iter().any(|row| row.id == id) {
            self.selected.insert(id.to_string())
        } else {
            false
        }
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        self.selected.remove(id)
    }

    /// Replaces the selection with the rows currently visible under `term`.
    pub fn select_all(&mut self, term: &str) {
        let visible: HashSet<String> = self.filter(term).map(|row| row.id.clone()).collect();
        self.selected = visible;
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Removes the given rows and drops them from the selection. Unknown ids
    /// are ignored. Returns the number of rows removed.
    pub fn delete_rows<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let doomed: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
        let before = self.rows.len();
        self.rows.retain(|row| !doomed.contains(row.id.as_str()));
        self.selected.retain(|id| !doomed.contains(id.as_str()));
        before - self.rows.len()
    }

    pub fn delete_selected(&mut self) -> usize {
        let ids: Vec<String> = self.selected.iter().cloned().collect();
        self.delete_rows(&ids)
    }
}

fn row_matches(row: &BatchRow, needle: &str) -> bool {
    row.reference_id.to_lowercase().contains(needle)
        || row.customer_name.to_lowercase().contains(needle)
        || row.customer_email.to_lowercase().contains(needle)
        || row.application_fee.to_string().contains(needle)
        || row.charges.to_string().contains(needle)
        || row.sub_total.to_string().contains(needle)
}

/// Exact sum of `sub_total` over the given rows.
pub fn total_sum<'a, I>(rows: I) -> BigDecimal
where
    I: IntoIterator<Item = &'a BatchRow>,
{
    rows.into_iter()
        .fold(BigDecimal::from(0), |acc, row| acc + &row.sub_total)
}

/// Re-checks every valid reference and builds the review batch.
///
/// All-or-nothing: an empty response or any record that is not unpaid aborts
/// without producing a batch.
pub async fn confirm_and_build_batch(
    api: &dyn MultipayApi,
    collection: &ReferenceCollection,
) -> MultipayResult<Batch> {
    let references = collection.valid_references();
    if references.is_empty() {
        return Err(MultipayError::NoValidReferences);
    }

    let details = api.verify_batch(&references).await?;
    if details.payments.is_empty() {
        return Err(MultipayError::EmptyBatch);
    }

    let paid_references: Vec<String> = details
        .payments
        .iter()
        .filter(|payment| !payment.is_unpaid())
        .map(|payment| payment.reference.clone())
        .collect();
    if !paid_references.is_empty() {
        warn!(count = paid_references.len(), "batch contains settled payments");
        return Err(MultipayError::PaymentStatusError { paid_references });
    }

    let rows: Vec<BatchRow> = details.payments.iter().map(BatchRow::from_record).collect();
    info!(rows = rows.len(), "review batch built");
    Ok(Batch::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipay::types::{BatchDetails, InitializationResponse, PaymentRecord};
    use async_trait::async_trait;
    use std::str::FromStr;
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

    fn row(reference: &str, amount: &str) -> BatchRow {
        BatchRow {
            id: format!("row-{}", reference),
            reference_id: reference.to_string(),
            customer_name: "Customer".to_string(),
            customer_email: String::new(),
            application_fee: BigDecimal::from(0),
            charges: BigDecimal::from(0),
            sub_total: BigDecimal::from_str(amount).unwrap(),
        }
    }

    struct MockApi {
        verify: Box<dyn Fn(&str) -> MultipayResult<VerifyOutcome> + Send + Sync>,
        batch: Vec<PaymentRecord>,
        batch_calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockApi {
        fn accepting(batch: Vec<PaymentRecord>) -> Self {
            Self {
                verify: Box::new(|reference| {
                    Ok(VerifyOutcome {
                        is_valid: true,
                        message: Some("Payment found".to_string()),
                        record: Some(record(reference, 5000, "unpaid")),
                    })
                }),
                batch,
                batch_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MultipayApi for MockApi {
        async fn verify_single(&self, reference: &str) -> MultipayResult<VerifyOutcome> {
            (self.verify)(reference)
        }

        async fn verify_batch(&self, references: &[String]) -> MultipayResult<BatchDetails> {
            self.batch_calls.lock().unwrap().push(references.to_vec());
            Ok(BatchDetails {
                payments: self.batch.clone(),
                references: references.to_vec(),
                total: None,
            })
        }

        async fn initialize_payment(
            &self,
            _references: &[String],
        ) -> MultipayResult<InitializationResponse> {
            Ok(InitializationResponse::failed("not used"))
        }
    }

    #[tokio::test]
    async fn test_add_marks_verified_reference_valid() {
        let api = MockApi::accepting(vec![]);
        let mut collection = ReferenceCollection::new();
        let (entry, outcome) = collection
            .add(&api, "ABCD1234EFGH5678")
            .await
            .expect("add should succeed");
        assert!(outcome.is_valid);
        assert_eq!(entry.state, ValidationState::Valid);
        assert_eq!(
            entry.payment_record.as_ref().map(|r| r.amount.clone()),
            Some(BigDecimal::from(5000))
        );
        assert_eq!(collection.valid_references(), vec!["ABCD1234EFGH5678"]);
    }

    #[tokio::test]
    async fn test_rejected_reference_is_removed() {
        let mut api = MockApi::accepting(vec![]);
        api.verify = Box::new(|_| {
            Ok(VerifyOutcome {
                is_valid: false,
                message: Some("Reference not found".to_string()),
                record: None,
            })
        });
        let mut collection = ReferenceCollection::new();
        let err = collection.add(&api, "ABCD1234EFGH5678").await.unwrap_err();
        assert_eq!(err.user_message(), "Reference not found");
        assert!(collection.is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_discards_pending_entry() {
        let mut api = MockApi::accepting(vec![]);
        api.verify = Box::new(|_| {
            Err(MultipayError::NetworkError {
                message: "connection refused".to_string(),
            })
        });
        let mut collection = ReferenceCollection::new();
        let err = collection.add(&api, "ABCD1234EFGH5678").await.unwrap_err();
        assert!(matches!(err, MultipayError::NetworkError { .. }));
        assert!(collection.is_empty());
    }

    #[tokio::test]
    async fn test_format_failure_leaves_collection_untouched() {
        let api = MockApi::accepting(vec![]);
        let mut collection = ReferenceCollection::new();
        collection.add(&api, "ABCD1234EFGH5678").await.unwrap();
        let err = collection.add(&api, "ABCD1234EFGH5678").await.unwrap_err();
        assert_eq!(err.to_string(), "Format error: duplicate");
        assert_eq!(collection.len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_builds_rows_for_every_payment() {
        let api = MockApi::accepting(vec![
            record("ABCD1234EFGH5678", 500, "unpaid"),
            record("WXYZ1234EFGH5678", 1500, "unpaid"),
        ]);
        let collection = ReferenceCollection::restored(["ABCD1234EFGH5678", "WXYZ1234EFGH5678"]);
        let batch = confirm_and_build_batch(&api, &collection).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.total(), BigDecimal::from(2000));
        assert_eq!(batch.rows()[0].customer_name, "abcd1234efgh5678");
        assert_eq!(
            api.batch_calls.lock().unwrap()[0],
            vec!["ABCD1234EFGH5678".to_string(), "WXYZ1234EFGH5678".to_string()]
        );
    }

    #[tokio::test]
    async fn test_confirm_rejects_batch_with_paid_reference() {
        let api = MockApi::accepting(vec![
            record("ABCD1234EFGH5678", 500, "unpaid"),
            record("WXYZ1234EFGH5678", 1500, "paid"),
        ]);
        let collection = ReferenceCollection::restored(["ABCD1234EFGH5678", "WXYZ1234EFGH5678"]);
        let err = confirm_and_build_batch(&api, &collection).await.unwrap_err();
        assert_eq!(err.title(), "Payment Status Error");
        match err {
            MultipayError::PaymentStatusError { paid_references } => {
                assert_eq!(paid_references, vec!["WXYZ1234EFGH5678".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_confirm_requires_valid_references_and_payments() {
        let api = MockApi::accepting(vec![]);
        let err = confirm_and_build_batch(&api, &ReferenceCollection::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MultipayError::NoValidReferences));

        let collection = ReferenceCollection::restored(["ABCD1234EFGH5678"]);
        let err = confirm_and_build_batch(&api, &collection).await.unwrap_err();
        assert!(matches!(err, MultipayError::EmptyBatch));
    }

    #[test]
    fn test_filter_matches_stringified_amounts() {
        let batch = Batch::new(vec![row("ABCD1234EFGH5678", "500"), row("WXYZ1234EFGH5678", "1500")]);
        assert_eq!(batch.filter("500").count(), 2);
        assert_eq!(batch.filter("1500").count(), 1);
        assert_eq!(batch.filter("wxyz").count(), 1);
        assert_eq!(batch.filter("").count(), 2);
        assert_eq!(batch.filter("customer").count(), 2);
    }

    #[test]
    fn test_total_sum_is_zero_for_no_rows_and_order_independent() {
        assert_eq!(total_sum(std::iter::empty()), BigDecimal::from(0));
        let rows = vec![row("A", "0.10"), row("B", "0.20"), row("C", "1500")];
        let reversed: Vec<BatchRow> = rows.iter().rev().cloned().collect();
        assert_eq!(total_sum(&rows), total_sum(&reversed));
        assert_eq!(total_sum(&rows), BigDecimal::from_str("1500.30").unwrap());
    }

    #[test]
    fn test_delete_rows_is_idempotent_and_clears_selection() {
        let mut batch = Batch::new(vec![row("A", "500"), row("B", "1500")]);
        assert!(batch.select("row-A"));
        assert!(!batch.select("row-missing"));
        assert_eq!(batch.delete_rows(&["row-A"]), 1);
        assert!(!batch.is_selected("row-A"));
        assert_eq!(batch.delete_rows(&["row-A", "row-missing"]), 0);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.delete_rows(&["row-B"]), 1);
        assert!(batch.is_empty());
        assert_eq!(batch.total(), BigDecimal::from(0));
    }

    #[test]
    fn test_select_all_only_takes_visible_rows() {
        let mut batch = Batch::new(vec![row("A", "500"), row("B", "1500")]);
        batch.select_all("1500");
        assert_eq!(batch.selected().len(), 1);
        assert_eq!(batch.delete_selected(), 1);
        assert_eq!(batch.references(), vec!["A".to_string()]);
    }
}
