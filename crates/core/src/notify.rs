//! Delivery of one-time codes to users.
//!
//! Delivery goes through the [`Notifier`] trait so the reset flow does not care whether the
//! code travels by mail, SMS or only to the log. The bundled [`LogNotifier`] writes the
//! message to the tracing output, which is what development and tests use.

use crate::otp::OtpCode;
use chrono::Duration;

pub const OTP_MESSAGE_SUBJECT: &str = "Oncobloom - OTP Verification";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("no delivery channel is configured")]
    NotConfigured,
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// A message ready for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtpMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl OtpMessage {
    pub fn password_reset(recipient: &str, code: &OtpCode, ttl: Duration) -> Self {
        Self {
            recipient: recipient.to_owned(),
            subject: OTP_MESSAGE_SUBJECT.to_owned(),
            body: format!(
                "Your OTP for password reset is: {}\n\nValid for {} minutes.",
                code.as_str(),
                ttl_minutes(ttl)
            ),
        }
    }
}

/// Whole minutes, rounded up so a 90 second code is never advertised as "1 minute".
fn ttl_minutes(ttl: Duration) -> i64 {
    let secs = ttl.num_seconds().max(0);
    (secs + 59) / 60
}

pub trait Notifier: Send + Sync {
    fn send_otp(&self, recipient: &str, code: &OtpCode, ttl: Duration) -> Result<(), NotifyError>;
}

/// Writes messages to the log instead of delivering them.
///
/// The code itself only appears in the log when `reveal_codes` is set, which is meant for
/// local development.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier {
    reveal_codes: bool,
}

impl LogNotifier {
    pub fn new(reveal_codes: bool) -> Self {
        Self { reveal_codes }
    }
}

impl Notifier for LogNotifier {
    fn send_otp(&self, recipient: &str, code: &OtpCode, ttl: Duration) -> Result<(), NotifyError> {
        let message = OtpMessage::password_reset(recipient, code, ttl);
        if self.reveal_codes {
            tracing::info!(
                "OTP message for {}: {} | {}",
                message.recipient,
                message.subject,
                message.body
            );
        } else {
            tracing::info!(
                "OTP message for {} queued ({} minutes)",
                message.recipient,
                ttl_minutes(ttl)
            );
        }
        Ok(())
    }
}

/// A notifier that always fails; stands in for an unconfigured channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn send_otp(&self, recipient: &str, _code: &OtpCode, _ttl: Duration) -> Result<(), NotifyError> {
        tracing::warn!("cannot deliver OTP to {}: no delivery channel", recipient);
        Err(NotifyError::NotConfigured)
    }
}
