use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::ip_utils::{parse_cidr, parse_ipv4, ADDRESS_BITS};

/// Lease pool configuration loaded from YAML
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    /// Subnet in CIDR notation, e.g. "192.168.1.0/24"
    pub subnet: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<Operation>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let (_, prefix) = parse_cidr(&self.subnet).map_err(ValidationError::InvalidSubnet)?;
        if prefix <= 1 || prefix >= ADDRESS_BITS - 1 {
            return Err(ValidationError::InvalidSubnet(format!(
                "prefix /{} must be between /2 and /30",
                prefix
            )));
        }

        for (index, operation) in self.operations.iter().enumerate() {
            let address = match operation {
                Operation::Free { free } => Some(free),
                Operation::Allocate { allocate } => allocate.as_ref(),
            };
            if let Some(address) = address {
                parse_ipv4(address)
                    .map_err(|e| ValidationError::InvalidOperation(format!("operation {}: {}", index, e)))?;
            }
        }

        if let Some(level) = &self.general.log_level {
            if level.parse::<log::LevelFilter>().is_err() {
                return Err(ValidationError::InvalidGeneral(format!(
                    "unknown log_level '{}'",
                    level
                )));
            }
        }

        Ok(())
    }

    /// Base network bytes and prefix length of the configured subnet
    pub fn subnet_parts(&self) -> Result<([u8; 4], u32), ValidationError> {
        parse_cidr(&self.subnet).map_err(ValidationError::InvalidSubnet)
    }
}

/// Shared general configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GeneralConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// One step of a scripted workload
///
/// Each entry must carry exactly one of the `free` or `allocate` keys;
/// `allocate: ~` requests any free address.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged, deny_unknown_fields)]
pub enum Operation {
    /// Release an address
    Free { free: String },
    /// Allocate an address, optionally asking for a specific one
    Allocate {
        #[serde(deserialize_with = "required_key")]
        allocate: Option<String>,
    },
}

/// Deserialize an optional value whose key must still be present
fn required_key<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid subnet: {0}")]
    InvalidSubnet(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_parsing() {
        let yaml = r#"
general:
  log_level: debug
subnet: "192.168.1.0/24"
operations:
  - allocate: "192.168.1.10"
  - allocate: ~
  - free: "192.168.1.10"
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.subnet_parts().unwrap(), ([192, 168, 1, 0], 24));
        assert_eq!(
            config.operations,
            vec![
                Operation::Allocate { allocate: Some("192.168.1.10".to_string()) },
                Operation::Allocate { allocate: None },
                Operation::Free { free: "192.168.1.10".to_string() },
            ]
        );
    }

    #[test]
    fn test_minimal_config() {
        let config: Config = serde_yaml::from_str("subnet: 10.0.0.0/30\n").unwrap();
        assert!(config.validate().is_ok());
        assert!(config.operations.is_empty());
        assert!(config.general.log_level.is_none());
    }

    #[test]
    fn test_rejects_unknown_operation_keys() {
        for entry in ["fre: \"192.168.1.1\"", "{}", "allocat: ~", "free: \"10.0.0.1\"\n    extra: 1"] {
            let yaml = format!("subnet: 10.0.0.0/30\noperations:\n  - {}\n", entry);
            assert!(
                serde_yaml::from_str::<Config>(&yaml).is_err(),
                "entry '{}' should not parse",
                entry
            );
        }
    }

    #[test]
    fn test_validation_failures() {
        let config: Config = serde_yaml::from_str("subnet: 10.0.0.0/31\n").unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidSubnet(_))));

        let config: Config = serde_yaml::from_str("subnet: 10.0.0.0\n").unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidSubnet(_))));

        let yaml = "subnet: 10.0.0.0/24\noperations:\n  - free: \"10.0.0.300\"\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidOperation(_))));

        let yaml = "general:\n  log_level: loud\nsubnet: 10.0.0.0/24\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidGeneral(_))));
    }
}
