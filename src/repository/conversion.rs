use thiserror::Error;
use time::{format_description::well_known::Iso8601, OffsetDateTime};

use crate::models::{
    types::UtcDateTime, PartnerId, PartnerSubmissionId, SubmissionId, SubmissionState,
};

pub trait DBConvertible: Sized {
    type DBType;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError>;

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError>;
}

#[derive(Debug, Error)]
pub enum DBFromConversionError {
    #[error("Failed to parse datetime: {0}")]
    DateTime(#[from] time::error::Parse),
    #[error("Failed to parse enum variant: {0}")]
    NoSuchVariant(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(i64),
}

#[derive(Debug, Error)]
pub enum DBToConversionError {
    #[error("Failed to format datetime")]
    DateTime(#[from] time::error::Format),
    #[error("Number does not fit into a database integer: {0}")]
    InvalidNumber(u64),
}

impl DBConvertible for UtcDateTime {
    type DBType = String;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        let string = OffsetDateTime::from(*self).format(&Iso8601::DEFAULT)?;
        Ok(string)
    }

    fn from_db(db_value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        let datetime = OffsetDateTime::parse(db_value, &Iso8601::DEFAULT)?;
        Ok(UtcDateTime::from(datetime))
    }
}

impl<T: DBConvertible> DBConvertible for Option<T> {
    type DBType = Option<T::DBType>;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        self.as_ref().map(T::to_db).transpose()
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        value.as_ref().map(T::from_db).transpose()
    }
}

fn id_to_db(value: u64) -> Result<i64, DBToConversionError> {
    i64::try_from(value).map_err(|_| DBToConversionError::InvalidNumber(value))
}

fn id_from_db(value: i64) -> Result<u64, DBFromConversionError> {
    u64::try_from(value).map_err(|_| DBFromConversionError::InvalidNumber(value))
}

impl DBConvertible for SubmissionId {
    type DBType = i64;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        id_to_db(self.0)
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(SubmissionId(id_from_db(*value)?))
    }
}

impl DBConvertible for PartnerId {
    type DBType = i64;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        id_to_db(self.0)
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(PartnerId(id_from_db(*value)?))
    }
}

impl DBConvertible for PartnerSubmissionId {
    type DBType = i64;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        id_to_db(self.0)
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(PartnerSubmissionId(id_from_db(*value)?))
    }
}

impl DBConvertible for SubmissionState {
    type DBType = String;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(self.as_ref().to_string())
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        value
            .parse()
            .map_err(|_| DBFromConversionError::NoSuchVariant(value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;
    use time::macros::datetime;

    use super::{DBConvertible, DBFromConversionError};
    use crate::models::{types::UtcDateTime, SubmissionId, SubmissionState};

    #[test]
    fn submission_state_uses_snake_case_names() {
        assert_eq!(SubmissionState::Approved.to_db().unwrap(), "approved");
        assert_eq!(
            SubmissionState::from_db(&"rejected".to_string()).unwrap(),
            SubmissionState::Rejected
        );
    }

    #[test]
    fn unknown_submission_state_is_rejected() {
        assert!(matches!(
            SubmissionState::from_db(&"published".to_string()),
            Err(DBFromConversionError::NoSuchVariant(_))
        ));
    }

    #[test]
    fn negative_ids_are_rejected() {
        assert!(matches!(
            SubmissionId::from_db(&-1),
            Err(DBFromConversionError::InvalidNumber(-1))
        ));
    }

    #[test]
    fn datetimes_sort_in_text_form() {
        let earlier = UtcDateTime::assume_utc(datetime!(2017-03-01 09:30:00))
            .to_db()
            .unwrap();
        let later = UtcDateTime::assume_utc(datetime!(2017-11-20 18:00:00))
            .to_db()
            .unwrap();

        assert!(earlier < later);
        assert_eq!(
            UtcDateTime::from_db(&later).unwrap(),
            UtcDateTime::assume_utc(datetime!(2017-11-20 18:00:00))
        );
    }
}
