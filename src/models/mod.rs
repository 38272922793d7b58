mod partner;
mod partner_submission;
mod submission;

pub mod types;

pub use partner::{NewPartner, Partner, PartnerId};
pub use partner_submission::{PartnerSubmission, PartnerSubmissionId};
pub use submission::{NewSubmission, Submission, SubmissionId, SubmissionState};
