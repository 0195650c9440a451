use thiserror::Error;

use super::model::DeliveryChannel;

/// Every configured attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Delivery of '{resource_id}' failed after {attempts} attempts: {last_error}")]
pub struct RetryExhaustedError {
    pub resource_id: String,
    pub attempts: u32,
    pub last_error: String,
}

/// Channel-typed delivery failure raised by the channel wrappers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Email delivery to {recipient} failed after {attempts} attempts: {last_error}")]
    Email {
        recipient: String,
        last_error: String,
        attempts: u32,
    },

    #[error("SMS delivery to {recipient} failed after {attempts} attempts: {last_error}")]
    Sms {
        recipient: String,
        last_error: String,
        attempts: u32,
    },

    #[error("Push delivery to {recipient} failed after {attempts} attempts: {last_error}")]
    Push {
        recipient: String,
        last_error: String,
        attempts: u32,
    },

    #[error("Webhook delivery to {recipient} failed after {attempts} attempts: {last_error}")]
    Webhook {
        recipient: String,
        last_error: String,
        attempts: u32,
    },
}

impl DeliveryError {
    /// Wrap an exhausted retry sequence with the recipient it was meant for.
    pub fn from_exhausted(
        channel: DeliveryChannel,
        recipient: impl Into<String>,
        exhausted: RetryExhaustedError,
    ) -> Self {
        let recipient = recipient.into();
        let RetryExhaustedError {
            attempts,
            last_error,
            ..
        } = exhausted;
        match channel {
            DeliveryChannel::Email => Self::Email {
                recipient,
                last_error,
                attempts,
            },
            DeliveryChannel::Sms => Self::Sms {
                recipient,
                last_error,
                attempts,
            },
            DeliveryChannel::Push => Self::Push {
                recipient,
                last_error,
                attempts,
            },
            DeliveryChannel::Webhook => Self::Webhook {
                recipient,
                last_error,
                attempts,
            },
        }
    }

    pub fn channel(&self) -> DeliveryChannel {
        match self {
            Self::Email { .. } => DeliveryChannel::Email,
            Self::Sms { .. } => DeliveryChannel::Sms,
            Self::Push { .. } => DeliveryChannel::Push,
            Self::Webhook { .. } => DeliveryChannel::Webhook,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::Email { recipient, .. }
            | Self::Sms { recipient, .. }
            | Self::Push { recipient, .. }
            | Self::Webhook { recipient, .. } => recipient,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Email { attempts, .. }
            | Self::Sms { attempts, .. }
            | Self::Push { attempts, .. }
            | Self::Webhook { attempts, .. } => *attempts,
        }
    }

    pub fn last_error(&self) -> &str {
        match self {
            Self::Email { last_error, .. }
            | Self::Sms { last_error, .. }
            | Self::Push { last_error, .. }
            | Self::Webhook { last_error, .. } => last_error,
        }
    }
}
