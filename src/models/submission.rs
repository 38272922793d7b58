use strum::{AsRefStr, Display, EnumString};

use super::types::UtcDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SubmissionState {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub id: SubmissionId,
    pub state: SubmissionState,
    pub artist_id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub year: Option<String>,
    pub created_at: UtcDateTime,
}

impl Submission {
    pub fn is_approved(&self) -> bool {
        self.state == SubmissionState::Approved
    }
}

#[derive(Clone, Debug)]
pub struct NewSubmission {
    pub state: SubmissionState,
    pub artist_id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub year: Option<String>,
}
