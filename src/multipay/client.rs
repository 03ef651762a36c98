use crate::multipay::error::{MultipayError, MultipayResult};
use crate::multipay::http::{ApiReply, MultipayHttpClient};
use crate::multipay::types::{
    decimal_from_json, BatchDetails, FetchDetailsRequest, InitializationResponse,
    InitializeRequest, PaymentRecord, VerifyOutcome,
};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

const VERIFY_PATH: [&str; 2] = ["multipay", "verify"];
const FETCH_DETAILS_PATH: [&str; 2] = ["multipay", "fetch-details"];
const INITIALISE_PATH: [&str; 2] = ["multipay", "initialise"];

/// Remote operations the payment flow depends on.
#[async_trait]
pub trait MultipayApi: Send + Sync {
    /// Checks one reference. A server-side rejection is `Ok` with
    /// `is_valid == false`; only transport failures are errors.
    async fn verify_single(&self, reference: &str) -> MultipayResult<VerifyOutcome>;

    /// Authoritative re-check of every reference about to be paid.
    async fn verify_batch(&self, references: &[String]) -> MultipayResult<BatchDetails>;

    /// Requests a hosted checkout for the given references.
    async fn initialize_payment(
        &self,
        references: &[String],
    ) -> MultipayResult<InitializationResponse>;
}

/// Pulls a human-readable message out of an API error body.
///
/// Precedence: `message`, `error`, `data.message`, `data.error`, then
/// `fallback`. Blank strings are skipped.
pub fn extract_error_message(body: Option<&JsonValue>, fallback: &str) -> String {
    let non_blank = |value: Option<&JsonValue>| {
        value
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    body.and_then(|body| {
        let data = body.get("data");
        non_blank(body.get("message"))
            .or_else(|| non_blank(body.get("error")))
            .or_else(|| non_blank(data.and_then(|d| d.get("message"))))
            .or_else(|| non_blank(data.and_then(|d| d.get("error"))))
    })
    .unwrap_or_else(|| fallback.to_string())
}

fn status_fallback(reply: &ApiReply) -> String {
    format!("Request failed with status {}", reply.status.as_u16())
}

pub fn interpret_verify_reply(reply: ApiReply) -> MultipayResult<VerifyOutcome> {
    if !reply.is_success() {
        return match reply.body {
            Some(ref body) => Ok(VerifyOutcome {
                is_valid: false,
                message: Some(extract_error_message(
                    Some(body),
                    "Invalid payment reference",
                )),
                record: None,
            }),
            None => Err(MultipayError::NetworkError {
                message: status_fallback(&reply),
            }),
        };
    }

    let body = reply.body.unwrap_or(JsonValue::Null);
    let is_valid = body.get("status").and_then(JsonValue::as_bool) == Some(true);
    let message = body
        .get("message")
        .and_then(JsonValue::as_str)
        .map(str::to_string);
    let record = match body.get("payment") {
        Some(JsonValue::Null) | None => None,
        Some(payment) => match serde_json::from_value::<PaymentRecord>(payment.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "ignoring malformed payment record in verify response");
                None
            }
        },
    };

    Ok(VerifyOutcome {
        is_valid,
        message,
        record,
    })
}

pub fn interpret_batch_reply(reply: ApiReply) -> MultipayResult<BatchDetails> {
    if !reply.is_success() {
        return Err(MultipayError::ValidationError {
            message: extract_error_message(reply.body.as_ref(), &status_fallback(&reply)),
        });
    }

    let body = reply.body.ok_or(MultipayError::ValidationError {
        message: "No response data received from server".to_string(),
    })?;

    if body.get("status").and_then(JsonValue::as_bool) == Some(false) {
        return Err(MultipayError::ValidationError {
            message: extract_error_message(Some(&body), "API returned error status"),
        });
    }

    let payments = body
        .get("payments")
        .filter(|p| !p.is_null())
        .or_else(|| {
            body.get("data")
                .and_then(|d| d.get("payments"))
                .filter(|p| !p.is_null())
        })
        .cloned()
        .ok_or(MultipayError::ValidationError {
            message: "Invalid response format - no payments data found".to_string(),
        })?;

    let payments: Vec<PaymentRecord> =
        serde_json::from_value(payments).map_err(|e| MultipayError::ValidationError {
            message: format!("Invalid payments data: {}", e),
        })?;

    let references = body
        .get("references")
        .and_then(|r| serde_json::from_value::<Vec<String>>(r.clone()).ok())
        .unwrap_or_else(|| payments.iter().map(|p| p.reference.clone()).collect());
    let total = body
        .get("total")
        .filter(|t| !t.is_null())
        .and_then(|t| decimal_from_json(t).ok());

    Ok(BatchDetails {
        payments,
        references,
        total,
    })
}

pub fn interpret_initialize_reply(reply: ApiReply) -> MultipayResult<InitializationResponse> {
    match reply.body {
        Some(ref body) if reply.is_success() => {
            serde_json::from_value::<InitializationResponse>(body.clone()).map_err(|e| {
                MultipayError::InitializationError {
                    message: format!("invalid initialization response: {}", e),
                }
            })
        }
        Some(ref body) => Ok(InitializationResponse::failed(extract_error_message(
            Some(body),
            "Failed to initialize payment",
        ))),
        None => Err(MultipayError::InitializationError {
            message: status_fallback(&reply),
        }),
    }
}

/// reqwest-backed [`MultipayApi`].
pub struct MultipayClient {
    http: MultipayHttpClient,
}

impl MultipayClient {
    pub fn new(
        base_url: &str,
        override_key: &str,
        timeout: Option<Duration>,
    ) -> MultipayResult<Self> {
        Ok(Self {
            http: MultipayHttpClient::new(base_url, override_key, timeout)?,
        })
    }

    pub fn with_http(http: MultipayHttpClient) -> Self {
        Self { http }
    }

    pub fn from_config(config: &crate::config::ApiConfig) -> MultipayResult<Self> {
        Self::new(
            &config.base_url,
            &config.override_key,
            config.request_timeout_secs.map(Duration::from_secs),
        )
    }
}

#[async_trait]
impl MultipayApi for MultipayClient {
    async fn verify_single(&self, reference: &str) -> MultipayResult<VerifyOutcome> {
        let reply = self
            .http
            .send_json::<JsonValue>(
                Method::GET,
                &[VERIFY_PATH[0], VERIFY_PATH[1], reference],
                None,
            )
            .await?;
        interpret_verify_reply(reply)
    }

    async fn verify_batch(&self, references: &[String]) -> MultipayResult<BatchDetails> {
        let reply = self
            .http
            .send_json(
                Method::POST,
                &FETCH_DETAILS_PATH,
                Some(&FetchDetailsRequest { references }),
            )
            .await?;
        let details = interpret_batch_reply(reply)?;
        info!(
            requested = references.len(),
            returned = details.payments.len(),
            "fetched batch payment details"
        );
        Ok(details)
    }

    async fn initialize_payment(
        &self,
        references: &[String],
    ) -> MultipayResult<InitializationResponse> {
        let reply = self
            .http
            .send_json(
                Method::POST,
                &INITIALISE_PATH,
                Some(&InitializeRequest {
                    payments: references,
                }),
            )
            .await
            .map_err(|e| MultipayError::InitializationError {
                message: e.user_message(),
            })?;
        interpret_initialize_reply(reply)
    }
}
