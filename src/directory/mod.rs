mod gravity;

use std::fmt::Display;

use async_trait::async_trait;
use thiserror::Error;

pub use gravity::GravityDirectory;

/// An email address a partner wants consignment digests delivered to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContactAddress(pub String);

impl Display for ContactAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Directory responded with {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("Partner not found in the directory: {0}")]
    PartnerNotFound(String),
    #[error("Invalid directory URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Directory URL cannot have a path: {0}")]
    NotABaseUrl(String),
}

/// Looks up partner details kept outside of this service, keyed by the partner's external id.
#[async_trait]
pub trait PartnerDirectory: Send + Sync {
    async fn partner_display_name(&self, external_id: &str) -> Result<String, DirectoryError>;

    /// May be empty if the partner has not configured anyone to receive consignments.
    async fn partner_contacts(
        &self,
        external_id: &str,
    ) -> Result<Vec<ContactAddress>, DirectoryError>;
}
