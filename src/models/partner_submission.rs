use super::{types::UtcDateTime, PartnerId, SubmissionId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartnerSubmissionId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartnerSubmission {
    pub id: PartnerSubmissionId,
    pub submission_id: SubmissionId,
    pub partner_id: PartnerId,
    /// `None` while the partner has not been sent a digest containing this submission.
    pub notified_at: Option<UtcDateTime>,
    pub created_at: UtcDateTime,
}

impl PartnerSubmission {
    pub fn is_pending(&self) -> bool {
        self.notified_at.is_none()
    }
}
