// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const MIN_BUCKET_NAME_LEN: usize = 3;
const MAX_BUCKET_NAME_LEN: usize = 63;

/// DNS-compatible S3 bucket name.
/// 3-63 chars of lowercase letters, digits, dots and hyphens; starts and ends
/// with a letter or digit; no adjacent dots; not formatted as an IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketName(String);

impl BucketName {
    /// Create a new BucketName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        let invalid = |reason: &str| ValidationError::InvalidBucketName {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if name.len() < MIN_BUCKET_NAME_LEN || name.len() > MAX_BUCKET_NAME_LEN {
            return Err(invalid(&format!(
                "length must be between {} and {} characters",
                MIN_BUCKET_NAME_LEN, MAX_BUCKET_NAME_LEN
            )));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
        {
            return Err(invalid(
                "only lowercase letters, digits, dots and hyphens are allowed",
            ));
        }

        let first = name.chars().next().unwrap_or('-');
        let last = name.chars().last().unwrap_or('-');
        if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
            return Err(invalid("must start and end with a letter or digit"));
        }

        if name.contains("..") {
            return Err(invalid("must not contain adjacent dots"));
        }

        if name.parse::<Ipv4Addr>().is_ok() {
            return Err(invalid("must not be formatted as an IP address"));
        }

        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for BucketName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BucketName> for String {
    fn from(name: BucketName) -> Self {
        name.0
    }
}

/// Non-empty service endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    /// Create a new Endpoint; blank input fails for the named service.
    pub fn new(service: &'static str, url: impl Into<String>) -> Result<Self, ValidationError> {
        let url = url.into();
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingEndpoint { service });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the endpoint URL.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runtime mode the compose stack runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    #[default]
    Docker,
    Containerd,
}

impl RuntimeMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Containerd => "containerd",
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "containerd" => Ok(Self::Containerd),
            other => Err(ValidationError::InvalidFieldValue {
                field: "mode",
                value: other.to_string(),
                reason: "expected 'docker' or 'containerd'".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_name_valid() {
        assert!(BucketName::new("my-bucket").is_ok());
        assert!(BucketName::new("logs.example.com").is_ok());
        assert!(BucketName::new("abc").is_ok());
        assert!(BucketName::new("a".repeat(63)).is_ok());
    }

    #[test]
    fn test_bucket_name_invalid() {
        assert!(BucketName::new("ab").is_err());
        assert!(BucketName::new("a".repeat(64)).is_err());
        assert!(BucketName::new("My-Bucket").is_err());
        assert!(BucketName::new("bucket_name").is_err());
        assert!(BucketName::new("-bucket").is_err());
        assert!(BucketName::new("bucket-").is_err());
        assert!(BucketName::new("my..bucket").is_err());
        assert!(BucketName::new("192.168.0.1").is_err());
    }

    #[test]
    fn test_bucket_name_error_names_bucket() {
        let err = BucketName::new("Bad_Name").unwrap_err();
        assert!(err.to_string().contains("Bad_Name"));
    }

    #[test]
    fn test_endpoint_requires_value() {
        assert!(Endpoint::new("dynamodb", "").is_err());
        assert!(Endpoint::new("s3", "   ").is_err());
        let endpoint = Endpoint::new("s3", " http://localhost:9000 ").unwrap();
        assert_eq!(endpoint.as_str(), "http://localhost:9000");
    }

    #[test]
    fn test_runtime_mode_parse() {
        assert_eq!("docker".parse::<RuntimeMode>().unwrap(), RuntimeMode::Docker);
        assert_eq!(
            "Containerd".parse::<RuntimeMode>().unwrap(),
            RuntimeMode::Containerd
        );
        assert!("podman".parse::<RuntimeMode>().is_err());
    }
}
