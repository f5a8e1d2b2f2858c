//! SigV4 date formatting.
//!
//! SigV4 uses two date formats derived from the same instant: the full
//! `amz-date` (`YYYYMMDDTHHMMSSZ`) used in the `x-amz-date` header/query
//! param and embedded in the string-to-sign, and the `short-date`
//! (`YYYYMMDD`) used to scope the signing key and credential scope.

use chrono::{DateTime, Utc};

pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
pub const SHORT_DATE_FORMAT: &str = "%Y%m%d";

pub fn amz_date(date: &DateTime<Utc>) -> String {
    date.format(AMZ_DATE_FORMAT).to_string()
}

pub fn short_date(date: &DateTime<Utc>) -> String {
    date.format(SHORT_DATE_FORMAT).to_string()
}
