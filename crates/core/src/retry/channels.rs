//! Channel-specific delivery wrappers.
//!
//! Each wrapper runs the shared retry loop and converts an exhausted sequence
//! into a channel-typed [`DeliveryError`] carrying the recipient.

use std::future::Future;

use super::errors::DeliveryError;
use super::executor::RetryExecutor;
use super::model::{DeliveryChannel, RetryConfig};
use crate::errors::{Error, Result};

impl RetryExecutor {
    /// Deliver through `channel`, retrying with backoff.
    pub async fn deliver<F, Fut, T>(
        &self,
        channel: DeliveryChannel,
        recipient: &str,
        resource_id: &str,
        operation: F,
        config: Option<RetryConfig>,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self
            .execute_with_retry(operation, resource_id, channel, config)
            .await
        {
            Err(Error::RetryExhausted(exhausted)) => {
                Err(DeliveryError::from_exhausted(channel, recipient, exhausted).into())
            }
            other => other,
        }
    }

    pub async fn send_email<F, Fut, T>(
        &self,
        recipient: &str,
        resource_id: &str,
        operation: F,
        config: Option<RetryConfig>,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.deliver(DeliveryChannel::Email, recipient, resource_id, operation, config)
            .await
    }

    pub async fn send_sms<F, Fut, T>(
        &self,
        recipient: &str,
        resource_id: &str,
        operation: F,
        config: Option<RetryConfig>,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.deliver(DeliveryChannel::Sms, recipient, resource_id, operation, config)
            .await
    }
}
