mod digest;
mod smtp;

use async_trait::async_trait;
use thiserror::Error;

use crate::{directory::ContactAddress, models::Submission};

pub use digest::{render_digest, DigestEmail};
pub use smtp::{SmtpConfig, SmtpNotifier};

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Invalid email address `{address}`: {source}")]
    Address {
        address: String,
        source: lettre::address::AddressError,
    },
    #[error("Could not build the email: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("Could not deliver the email: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Delivers submission digests to partners.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one email listing `submissions` in the given order to every address in `to`.
    async fn send_digest(
        &self,
        to: &[ContactAddress],
        partner_display_name: &str,
        submissions: &[Submission],
    ) -> Result<(), NotifierError>;
}
