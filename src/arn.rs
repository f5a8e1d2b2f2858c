//! Parsing of Amazon Resource Names.
//!
//! `arn:{partition}:{service}:{region?}:{accountId?}:{resource}` where the
//! final field accepts `resourceId`, `resourceType/resourceId`, or a
//! sixth-colon-separated `resourceType:resourceId` form.

use std::fmt;

use crate::region::Region;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: String,
}

#[derive(Debug, PartialEq)]
pub enum ArnParseError {
    NotAnArn,
    MissingField(&'static str),
    NonNumericAccountId,
    RegionNotInPartition,
}

impl fmt::Display for ArnParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArnParseError::NotAnArn => write!(f, "string does not start with \"arn:\""),
            ArnParseError::MissingField(field) => write!(f, "ARN missing field: {}", field),
            ArnParseError::NonNumericAccountId => write!(f, "ARN account id must be all digits"),
            ArnParseError::RegionNotInPartition => {
                write!(f, "ARN region does not belong to its partition")
            }
        }
    }
}

impl std::error::Error for ArnParseError {}

impl FromStr for Arn {
    type Err = ArnParseError;

    fn from_str(s: &str) -> Result<Arn, ArnParseError> {
        let mut parts = s.splitn(6, ':');
        let lit = parts.next().ok_or(ArnParseError::NotAnArn)?;
        if lit != "arn" {
            return Err(ArnParseError::NotAnArn);
        }
        let partition = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(ArnParseError::MissingField("partition"))?
            .to_owned();
        let service = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(ArnParseError::MissingField("service"))?
            .to_owned();
        let region_field = parts.next().ok_or(ArnParseError::MissingField("region"))?;
        let account_field = parts
            .next()
            .ok_or(ArnParseError::MissingField("accountId"))?;
        let resource_field = parts
            .next()
            .ok_or(ArnParseError::MissingField("resource"))?;

        let region = if region_field.is_empty() {
            None
        } else {
            Some(region_field.to_owned())
        };
        let account_id = if account_field.is_empty() {
            None
        } else {
            if !account_field.chars().all(|c| c.is_ascii_digit()) {
                return Err(ArnParseError::NonNumericAccountId);
            }
            Some(account_field.to_owned())
        };

        let (resource_type, resource_id) = if let Some(idx) = resource_field.find('/') {
            (
                Some(resource_field[..idx].to_owned()),
                resource_field[idx + 1..].to_owned(),
            )
        } else if let Some(idx) = resource_field.find(':') {
            (
                Some(resource_field[..idx].to_owned()),
                resource_field[idx + 1..].to_owned(),
            )
        } else {
            (None, resource_field.to_owned())
        };

        if let Some(ref region_name) = region {
            if let Ok(parsed) = Region::from_str(region_name) {
                let expected_partition = parsed.partition().id();
                if expected_partition != partition {
                    return Err(ArnParseError::RegionNotInPartition);
                }
            }
        }

        Ok(Arn {
            partition,
            service,
            region,
            account_id,
            resource_type,
            resource_id,
        })
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition,
            self.service,
            self.region.as_deref().unwrap_or(""),
            self.account_id.as_deref().unwrap_or(""),
            match &self.resource_type {
                Some(t) => format!("{}/{}", t, self.resource_id),
                None => self.resource_id.clone(),
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_s3_object_arn() {
        let arn: Arn = "arn:aws:s3:::my-bucket/my-key".parse().unwrap();
        assert_eq!(arn.partition, "aws");
        assert_eq!(arn.service, "s3");
        assert_eq!(arn.region, None);
        assert_eq!(arn.account_id, None);
        assert_eq!(arn.resource_id, "my-key");
        assert_eq!(arn.resource_type.as_deref(), Some("my-bucket"));
    }

    #[test]
    fn parses_resource_type_slash_id() {
        let arn: Arn = "arn:aws:iam::123456789012:role/my-role".parse().unwrap();
        assert_eq!(arn.account_id.as_deref(), Some("123456789012"));
        assert_eq!(arn.resource_type.as_deref(), Some("role"));
        assert_eq!(arn.resource_id, "my-role");
    }

    #[test]
    fn rejects_non_numeric_account_id() {
        let err = "arn:aws:iam::abc123:role/x".parse::<Arn>().unwrap_err();
        assert_eq!(err, ArnParseError::NonNumericAccountId);
    }

    #[test]
    fn rejects_region_not_in_partition() {
        let err = "arn:aws:s3:cn-north-1::my-bucket"
            .parse::<Arn>()
            .unwrap_err();
        assert_eq!(err, ArnParseError::RegionNotInPartition);
    }

    #[test]
    fn rejects_non_arn_strings() {
        assert_eq!("not-an-arn".parse::<Arn>().unwrap_err(), ArnParseError::NotAnArn);
    }
}
