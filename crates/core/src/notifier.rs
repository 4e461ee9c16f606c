//! Outbound signup confirmation.
//!
//! The service hands a [`ConfirmationMessage`] to a [`Notifier`] after a user has been stored.
//! Delivery is best-effort: implementations must not block on the network, and any error
//! they return is logged by the caller and otherwise ignored.

/// Everything needed to build a confirmation email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmationMessage {
    pub to: String,
    pub name: String,
    pub cpf: String,
    pub code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
    #[error("failed to build message: {0}")]
    Message(String),
}

pub trait Notifier: Send + Sync {
    /// Queues `message` for delivery and returns without waiting for it.
    fn send_confirmation(&self, message: ConfirmationMessage) -> Result<(), NotifyError>;
}

/// Notifier that only records the message in the log.
///
/// Used when no mail provider is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_confirmation(&self, message: ConfirmationMessage) -> Result<(), NotifyError> {
        tracing::info!(
            to = %message.to,
            cpf = %message.cpf,
            code = %message.code,
            "confirmation email not sent: no mail provider configured"
        );
        Ok(())
    }
}
