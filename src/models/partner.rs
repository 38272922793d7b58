use super::types::UtcDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartnerId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partner {
    pub id: PartnerId,
    pub name: String,
    /// Partner id in the external directory, used to look up contacts and the display name.
    pub external_id: String,
    pub created_at: UtcDateTime,
}

#[derive(Clone, Debug)]
pub struct NewPartner {
    pub name: String,
    pub external_id: String,
}
