use crate::multipay::aggregator::Batch;
use crate::multipay::client::MultipayApi;
use crate::multipay::error::{MultipayError, MultipayResult};
use crate::multipay::types::InitializationResponse;
use std::io::Write;
use tracing::{error, info};

/// Hands control to the hosted checkout page.
pub trait Navigator: Send + Sync {
    fn redirect(&self, url: &str);
}

/// Prints the checkout URL for the user to open.
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn redirect(&self, url: &str) {
        info!(url = %url, "redirecting to payment gateway");
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "Continue to the payment gateway: {}", url);
    }
}

/// A completed hand-off to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub url: String,
    pub message: Option<String>,
    pub access_code: Option<String>,
}

pub struct PaymentInitiator;

impl PaymentInitiator {
    /// Initializes payment for every row in `batch` and redirects.
    ///
    /// Selection is ignored: the whole batch is paid. On any failure the
    /// batch is left as it was so the user can retry.
    pub async fn proceed(
        api: &dyn MultipayApi,
        navigator: &dyn Navigator,
        batch: &Batch,
    ) -> MultipayResult<Redirect> {
        if batch.is_empty() {
            return Err(MultipayError::InitializationError {
                message: "There are no transactions to pay for".to_string(),
            });
        }

        let references = batch.references();
        let response = api.initialize_payment(&references).await?;
        let redirect = Self::redirect_from(response)?;

        info!(
            references = references.len(),
            "payment initialized, leaving for the gateway"
        );
        navigator.redirect(&redirect.url);
        Ok(redirect)
    }

    fn redirect_from(response: InitializationResponse) -> MultipayResult<Redirect> {
        let url = match (response.status, response.payment_url()) {
            (true, Some(url)) => url.to_string(),
            _ => {
                let message = response
                    .message
                    .clone()
                    .or(response.error.clone())
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Failed to initialize payment".to_string());
                error!(status = response.status, message = %message, "payment initialization refused");
                return Err(MultipayError::InitializationError { message });
            }
        };

        Ok(Redirect {
            url,
            message: response.message,
            access_code: response.data.and_then(|d| d.access_code),
        })
    }
}
