use bigdecimal::BigDecimal;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::str::FromStr;

/// Status the remote system reports for a payable reference.
pub const UNPAID_STATUS: &str = "unpaid";

/// A payment as reported by the remote system. Read-only once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub reference: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub application_fee: Option<BigDecimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub charges: Option<BigDecimal>,
}

impl PaymentRecord {
    pub fn is_unpaid(&self) -> bool {
        self.status == UNPAID_STATUS
    }
}

/// Reads an amount from its JSON text, not through `f64`.
///
/// serde_json parses `99.99` as a float; its shortest round-trip rendering is
/// what the server sent, so the decimal is rebuilt from that. Quoted amounts
/// are accepted as well.
pub fn decimal_from_json(value: &JsonValue) -> Result<BigDecimal, String> {
    let text = match value {
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.trim().to_string(),
        other => return Err(format!("expected a decimal amount, got {}", other)),
    };
    BigDecimal::from_str(&text).map_err(|e| format!("invalid amount {:?}: {}", text, e))
}

fn deserialize_decimal<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    decimal_from_json(&value).map_err(D::Error::custom)
}

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::Null => Ok(None),
        value => decimal_from_json(&value).map(Some).map_err(D::Error::custom),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Pending,
    Valid,
    Invalid,
}

/// One user-submitted reference in the working collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceEntry {
    pub id: String,
    pub value: String,
    pub state: ValidationState,
    pub payment_record: Option<PaymentRecord>,
}

impl ReferenceEntry {
    pub fn pending(value: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            value: value.into(),
            state: ValidationState::Pending,
            payment_record: None,
        }
    }

    /// Entry rebuilt from a previously confirmed reference.
    pub fn restored(index: usize, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            id: format!("restored_{}_{}", index, value),
            value,
            state: ValidationState::Valid,
            payment_record: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state == ValidationState::Valid
    }
}

/// Review-stage projection of a payment record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRow {
    pub id: String,
    pub reference_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub application_fee: BigDecimal,
    pub charges: BigDecimal,
    pub sub_total: BigDecimal,
}

impl BatchRow {
    pub fn from_record(record: &PaymentRecord) -> Self {
        let customer_email = record.email.clone().unwrap_or_default();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            reference_id: record.reference.clone(),
            customer_name: customer_name_from_email(&customer_email),
            customer_email,
            application_fee: record.application_fee.clone().unwrap_or_default(),
            charges: record.charges.clone().unwrap_or_default(),
            sub_total: record.amount.clone(),
        }
    }
}

/// Local part of the address, or "Customer" when there is none.
pub fn customer_name_from_email(email: &str) -> String {
    email
        .split('@')
        .next()
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .unwrap_or("Customer")
        .to_string()
}

/// Normalized result of a single-reference verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyOutcome {
    pub is_valid: bool,
    pub message: Option<String>,
    pub record: Option<PaymentRecord>,
}

/// Normalized `fetch-details` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchDetails {
    pub payments: Vec<PaymentRecord>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub total: Option<BigDecimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitializationData {
    #[serde(default)]
    pub access_code: Option<String>,
    #[serde(default)]
    pub payment_url: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub amount: Option<JsonValue>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitializationResponse {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<InitializationData>,
    #[serde(default)]
    pub error: Option<String>,
}

impl InitializationResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    /// The checkout URL, when the server returned a non-blank one.
    pub fn payment_url(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.payment_url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchDetailsRequest<'a> {
    pub references: &'a [String],
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest<'a> {
    pub payments: &'a [String],
}
