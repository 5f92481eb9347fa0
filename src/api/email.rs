//! Outbound mail for contact-form submissions.
//!
//! Delivery is behind the `Mailer` trait. The default `LogMailer` only logs
//! the message, which is what local and demo deployments run with.

use anyhow::Result;
use tracing::info;

#[derive(Clone, Debug)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
}

pub trait Mailer: Send + Sync {
    /// Deliver a contact message or return an error describing why not.
    fn send_contact(&self, message: &ContactMessage) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_contact(&self, message: &ContactMessage) -> Result<()> {
        info!(
            from_name = %message.name,
            from_email = %message.email,
            length = message.message.len(),
            "contact message received"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_mailer_accepts_messages() {
        let message = ContactMessage {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            message: "Hello".to_string(),
        };
        assert!(LogMailer.send_contact(&message).is_ok());
    }
}
