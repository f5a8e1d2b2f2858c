//! Regions, partitions, and endpoint resolution.
//!
//! A `Region` belongs to exactly one `Partition`. Endpoint resolution walks a
//! fixed precedence: explicit override, then a per-service per-region map,
//! then the partition's global endpoint (for services that have one), then
//! the default `{service}.{region}.{dnsSuffix}` template. `EndpointVariant`
//! flags (`fips`, `dualstack`) select an alternate hostname template; a
//! variant with no matching template is a resolution error, not a silent
//! fallback.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// The set of AWS partitions. Every `Region` belongs to exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Partition {
    Aws,
    AwsCn,
    AwsUsGov,
    AwsIso,
    AwsIsoB,
}

impl Partition {
    /// DNS suffix used to build default endpoints in this partition.
    pub fn dns_suffix(&self) -> &'static str {
        match self {
            Partition::Aws => "amazonaws.com",
            Partition::AwsCn => "amazonaws.com.cn",
            Partition::AwsUsGov => "amazonaws.com",
            Partition::AwsIso => "c2s.ic.gov",
            Partition::AwsIsoB => "sc2s.sgov.gov",
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Partition::Aws => "aws",
            Partition::AwsCn => "aws-cn",
            Partition::AwsUsGov => "aws-us-gov",
            Partition::AwsIso => "aws-iso",
            Partition::AwsIsoB => "aws-iso-b",
        }
    }
}

/// Endpoint variant flags that select an alternate hostname template.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EndpointVariant {
    pub fips: bool,
    pub dualstack: bool,
}

impl EndpointVariant {
    pub fn none() -> Self {
        EndpointVariant::default()
    }

    fn is_none(&self) -> bool {
        !self.fips && !self.dualstack
    }
}

/// An AWS region. A fixed set of well-known regions plus an `Other` escape
/// hatch for regions not yet known to this build (new regions launch more
/// often than this crate is updated).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    ApEast1,
    ApNortheast1,
    ApNortheast2,
    ApNortheast3,
    ApSouth1,
    ApSoutheast1,
    ApSoutheast2,
    CaCentral1,
    EuCentral1,
    EuWest1,
    EuWest2,
    EuWest3,
    EuNorth1,
    EuSouth1,
    MeSouth1,
    SaEast1,
    UsEast1,
    UsEast2,
    UsWest1,
    UsWest2,
    UsGovEast1,
    UsGovWest1,
    CnNorth1,
    CnNorthwest1,
    AfSouth1,
    /// A region not in the closed set above. Still resolved through the
    /// normal partition/endpoint machinery by inferring its partition from
    /// its name prefix (see `Region::partition`).
    Other(String),
}

impl Region {
    pub fn name(&self) -> &str {
        match self {
            Region::ApEast1 => "ap-east-1",
            Region::ApNortheast1 => "ap-northeast-1",
            Region::ApNortheast2 => "ap-northeast-2",
            Region::ApNortheast3 => "ap-northeast-3",
            Region::ApSouth1 => "ap-south-1",
            Region::ApSoutheast1 => "ap-southeast-1",
            Region::ApSoutheast2 => "ap-southeast-2",
            Region::CaCentral1 => "ca-central-1",
            Region::EuCentral1 => "eu-central-1",
            Region::EuWest1 => "eu-west-1",
            Region::EuWest2 => "eu-west-2",
            Region::EuWest3 => "eu-west-3",
            Region::EuNorth1 => "eu-north-1",
            Region::EuSouth1 => "eu-south-1",
            Region::MeSouth1 => "me-south-1",
            Region::SaEast1 => "sa-east-1",
            Region::UsEast1 => "us-east-1",
            Region::UsEast2 => "us-east-2",
            Region::UsWest1 => "us-west-1",
            Region::UsWest2 => "us-west-2",
            Region::UsGovEast1 => "us-gov-east-1",
            Region::UsGovWest1 => "us-gov-west-1",
            Region::CnNorth1 => "cn-north-1",
            Region::CnNorthwest1 => "cn-northwest-1",
            Region::AfSouth1 => "af-south-1",
            Region::Other(name) => name,
        }
    }

    /// The partition this region belongs to.
    pub fn partition(&self) -> Partition {
        match self {
            Region::CnNorth1 | Region::CnNorthwest1 => Partition::AwsCn,
            Region::UsGovEast1 | Region::UsGovWest1 => Partition::AwsUsGov,
            Region::Other(name) => {
                if name.starts_with("cn-") {
                    Partition::AwsCn
                } else if name.starts_with("us-gov-") {
                    Partition::AwsUsGov
                } else if name.starts_with("us-iso-") {
                    Partition::AwsIso
                } else if name.starts_with("us-isob-") {
                    Partition::AwsIsoB
                } else {
                    Partition::Aws
                }
            }
            _ => Partition::Aws,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct ParseRegionError {
    message: String,
}

impl ParseRegionError {
    pub fn new(input: &str) -> Self {
        ParseRegionError {
            message: format!("Not a valid AWS region: {}", input),
        }
    }
}

impl Error for ParseRegionError {}

impl Display for ParseRegionError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl FromStr for Region {
    type Err = ParseRegionError;

    fn from_str(s: &str) -> Result<Region, ParseRegionError> {
        Ok(match s {
            "ap-east-1" => Region::ApEast1,
            "ap-northeast-1" => Region::ApNortheast1,
            "ap-northeast-2" => Region::ApNortheast2,
            "ap-northeast-3" => Region::ApNortheast3,
            "ap-south-1" => Region::ApSouth1,
            "ap-southeast-1" => Region::ApSoutheast1,
            "ap-southeast-2" => Region::ApSoutheast2,
            "ca-central-1" => Region::CaCentral1,
            "eu-central-1" => Region::EuCentral1,
            "eu-west-1" => Region::EuWest1,
            "eu-west-2" => Region::EuWest2,
            "eu-west-3" => Region::EuWest3,
            "eu-north-1" => Region::EuNorth1,
            "eu-south-1" => Region::EuSouth1,
            "me-south-1" => Region::MeSouth1,
            "sa-east-1" => Region::SaEast1,
            "us-east-1" => Region::UsEast1,
            "us-east-2" => Region::UsEast2,
            "us-west-1" => Region::UsWest1,
            "us-west-2" => Region::UsWest2,
            "us-gov-east-1" => Region::UsGovEast1,
            "us-gov-west-1" => Region::UsGovWest1,
            "cn-north-1" => Region::CnNorth1,
            "cn-northwest-1" => Region::CnNorthwest1,
            "af-south-1" => Region::AfSouth1,
            other if !other.is_empty() => Region::Other(other.to_owned()),
            _ => return Err(ParseRegionError::new(s)),
        })
    }
}

impl Default for Region {
    fn default() -> Region {
        match std::env::var("AWS_DEFAULT_REGION").or_else(|_| std::env::var("AWS_REGION")) {
            Ok(ref v) => Region::from_str(v).unwrap_or(Region::UsEast1),
            Err(_) => Region::UsEast1,
        }
    }
}

/// Per-service endpoint configuration: a default template plus any explicit
/// per-region overrides, a partition-global endpoint for "global" services
/// (IAM, CloudFront, ...), and alternate hostname templates per endpoint
/// variant.
#[derive(Clone, Debug, Default)]
pub struct EndpointConfig {
    /// Explicit override; wins over everything else if set.
    pub override_endpoint: Option<String>,
    /// Per-region endpoint overrides, e.g. S3's `cn-north-1` special case.
    pub region_endpoints: HashMap<String, String>,
    /// Endpoint shared by every region in a partition, for global services.
    pub partition_global: HashMap<&'static str, String>,
    /// Alternate hostname templates keyed by variant; `{region}` and
    /// `{dnsSuffix}` are substituted.
    pub variant_templates: HashMap<(bool, bool), String>,
}

#[derive(Debug, PartialEq)]
pub enum EndpointError {
    NoEndpointForVariant,
}

impl Display for EndpointError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            EndpointError::NoEndpointForVariant => {
                write!(f, "no endpoint template for the requested endpoint variant")
            }
        }
    }
}

impl Error for EndpointError {}

/// Resolves the endpoint host (without scheme) for `service` in `region`
/// under `config`, honoring `variant`. See §4.1 for the precedence order.
pub fn resolve_endpoint(
    service: &str,
    region: &Region,
    config: &EndpointConfig,
    variant: EndpointVariant,
) -> Result<String, EndpointError> {
    if let Some(ref explicit) = config.override_endpoint {
        return Ok(explicit.clone());
    }
    if let Some(region_endpoint) = config.region_endpoints.get(region.name()) {
        return Ok(region_endpoint.clone());
    }
    if let Some(global) = config.partition_global.get(region.partition().id()) {
        return Ok(global.clone());
    }
    if !variant.is_none() {
        let key = (variant.fips, variant.dualstack);
        return config
            .variant_templates
            .get(&key)
            .map(|tpl| {
                tpl.replace("{region}", region.name())
                    .replace("{dnsSuffix}", region.partition().dns_suffix())
            })
            .ok_or(EndpointError::NoEndpointForVariant);
    }
    Ok(format!(
        "{}.{}.{}",
        service,
        region.name(),
        region.partition().dns_suffix()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_belongs_to_expected_partition() {
        assert_eq!(Region::UsEast1.partition(), Partition::Aws);
        assert_eq!(Region::CnNorth1.partition(), Partition::AwsCn);
        assert_eq!(Region::UsGovWest1.partition(), Partition::AwsUsGov);
        assert_eq!(
            Region::Other("us-gov-foo-1".into()).partition(),
            Partition::AwsUsGov
        );
    }

    #[test]
    fn default_endpoint_template() {
        let cfg = EndpointConfig::default();
        let host = resolve_endpoint("s3", &Region::UsWest2, &cfg, EndpointVariant::none()).unwrap();
        assert_eq!(host, "s3.us-west-2.amazonaws.com");
    }

    #[test]
    fn explicit_override_wins() {
        let mut cfg = EndpointConfig::default();
        cfg.override_endpoint = Some("http://localhost:9000".to_owned());
        let host = resolve_endpoint("s3", &Region::UsEast1, &cfg, EndpointVariant::none()).unwrap();
        assert_eq!(host, "http://localhost:9000");
    }

    #[test]
    fn missing_variant_template_is_an_error() {
        let cfg = EndpointConfig::default();
        let err = resolve_endpoint(
            "s3",
            &Region::UsEast1,
            &cfg,
            EndpointVariant { fips: true, dualstack: false },
        )
        .unwrap_err();
        assert_eq!(err, EndpointError::NoEndpointForVariant);
    }
}
