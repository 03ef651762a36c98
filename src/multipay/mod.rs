//! Multi-reference payment flow: validate references, build a review batch,
//! hand off to the hosted checkout.

pub mod aggregator;
pub mod client;
pub mod error;
pub mod http;
pub mod initiation;
pub mod notification;
pub mod types;
pub mod validator;

pub use aggregator::{confirm_and_build_batch, total_sum, Batch, ReferenceCollection};
pub use client::{extract_error_message, MultipayApi, MultipayClient};
pub use error::{ErrorKind, FormatViolation, MultipayError, MultipayResult};
pub use initiation::{ConsoleNavigator, Navigator, PaymentInitiator, Redirect};
pub use notification::{Notification, NotificationVariant};
pub use validator::{ReferenceValidator, MAX_REFERENCES, REFERENCE_LENGTH};
