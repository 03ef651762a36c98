use thiserror::Error;

pub type MultipayResult<T> = Result<T, MultipayError>;

/// Local format violations reported by the reference validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatViolation {
    #[error("required")]
    Required,

    #[error("invalid length")]
    InvalidLength,

    #[error("duplicate")]
    Duplicate,

    #[error("limit reached")]
    LimitReached,
}

/// Broad category of a failure, used to decide how it is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Network,
    Validation,
    Initialization,
}

#[derive(Debug, Clone, Error)]
pub enum MultipayError {
    #[error("Format error: {0}")]
    Format(FormatViolation),

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Validation error: no valid references to confirm")]
    NoValidReferences,

    #[error("Validation error: no payment data found for the provided references")]
    EmptyBatch,

    #[error("Payment status error: already paid: {}", paid_references.join(", "))]
    PaymentStatusError { paid_references: Vec<String> },

    #[error("Initialization error: {message}")]
    InitializationError { message: String },
}

impl MultipayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MultipayError::Format(_) => ErrorKind::Format,
            MultipayError::NetworkError { .. } => ErrorKind::Network,
            MultipayError::ValidationError { .. }
            | MultipayError::NoValidReferences
            | MultipayError::EmptyBatch
            | MultipayError::PaymentStatusError { .. } => ErrorKind::Validation,
            MultipayError::InitializationError { .. } => ErrorKind::Initialization,
        }
    }

    /// Headline shown above the message in a notification.
    pub fn title(&self) -> &'static str {
        match self {
            MultipayError::Format(FormatViolation::Required) => "Error",
            MultipayError::Format(FormatViolation::InvalidLength) => "Invalid Length",
            MultipayError::Format(FormatViolation::Duplicate) => "Duplicate ID",
            MultipayError::Format(FormatViolation::LimitReached) => "Limit Reached",
            MultipayError::NetworkError { .. } => "Error",
            MultipayError::ValidationError { .. } => "Validation Failed",
            MultipayError::NoValidReferences => "No Transactions",
            MultipayError::EmptyBatch => "Validation Error",
            MultipayError::PaymentStatusError { .. } => "Payment Status Error",
            MultipayError::InitializationError { .. } => "Error",
        }
    }

    pub fn user_message(&self) -> String {
        use crate::multipay::validator::{MAX_REFERENCES, REFERENCE_LENGTH};

        match self {
            MultipayError::Format(FormatViolation::Required) => {
                "Please enter a Transaction ID".to_string()
            }
            MultipayError::Format(FormatViolation::InvalidLength) => format!(
                "Transaction ID must be exactly {} characters",
                REFERENCE_LENGTH
            ),
            MultipayError::Format(FormatViolation::Duplicate) => {
                "This Transaction ID has already been added".to_string()
            }
            MultipayError::Format(FormatViolation::LimitReached) => format!(
                "You can add up to {} Transaction IDs only",
                MAX_REFERENCES
            ),
            MultipayError::NetworkError { message } => message.clone(),
            MultipayError::ValidationError { message } => message.clone(),
            MultipayError::NoValidReferences => {
                "Please add at least one valid transaction ID".to_string()
            }
            MultipayError::EmptyBatch => {
                "No payment data found for the provided transaction IDs".to_string()
            }
            MultipayError::PaymentStatusError { .. } => {
                "Some transactions have already been paid".to_string()
            }
            MultipayError::InitializationError { message } => message.clone(),
        }
    }

    /// Whether re-submitting the same action could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MultipayError::NetworkError { .. } | MultipayError::InitializationError { .. }
        )
    }
}

impl From<FormatViolation> for MultipayError {
    fn from(violation: FormatViolation) -> Self {
        MultipayError::Format(violation)
    }
}
