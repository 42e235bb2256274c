//! Structured data deserialization.
//!
//! Turns a data file into a JSON tree, chosen by extension:
//!
//! | Extension      | Parser       |
//! |----------------|--------------|
//! | `yaml`, `yml`  | `serde_yaml` |
//! | `json`         | `serde_json` |
//! | `toml`         | `toml`       |
//! | `xml`          | not compiled in (`DependencyMissing`) |

use crate::document::{DocumentError, yaml_to_json};
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Yaml,
    Json,
    Toml,
    Xml,
}

impl DataFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }
}

pub fn deserialize(path: &str, extension: &str, raw: &str) -> Result<Json, DocumentError> {
    let format = DataFormat::from_extension(extension).ok_or_else(|| {
        DocumentError::UnsupportedDataType {
            path: path.to_string(),
            extension: extension.to_string(),
        }
    })?;

    match format {
        DataFormat::Yaml => serde_yaml::from_str::<serde_yaml::Value>(raw)
            .map(|value| yaml_to_json(&value))
            .map_err(|e| DocumentError::payload(path, e)),
        DataFormat::Json => serde_json::from_str(raw).map_err(|e| DocumentError::payload(path, e)),
        DataFormat::Toml => toml::from_str::<toml::Table>(raw)
            .map_err(|e| DocumentError::payload(path, e))
            .and_then(|table| serde_json::to_value(table).map_err(|e| DocumentError::payload(path, e))),
        DataFormat::Xml => Err(DocumentError::DependencyMissing {
            path: path.to_string(),
            feature: "XML",
            remediation: "convert the file to YAML, JSON or TOML",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_formats() {
        assert_eq!(deserialize("a.yml", "yml", "a: 1").unwrap(), json!({"a": 1}));
        assert_eq!(deserialize("a.json", "json", r#"{"a": [1]}"#).unwrap(), json!({"a": [1]}));
        assert_eq!(
            deserialize("a.toml", "TOML", "[x]\ny = \"z\"").unwrap(),
            json!({"x": {"y": "z"}})
        );
    }

    #[test]
    fn test_xml_is_dependency_missing() {
        let err = deserialize("_data/a.xml", "xml", "<a/>").unwrap_err();
        assert!(matches!(err, DocumentError::DependencyMissing { .. }));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = deserialize("_data/a.csv", "csv", "a,b").unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedDataType { ref extension, .. } if extension == "csv"));
    }

    #[test]
    fn test_malformed_payload() {
        assert!(deserialize("a.json", "json", "{").is_err());
    }
}
