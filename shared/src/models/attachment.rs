//! File attachment models

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Records that can own attachments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Vehicle,
    Driver,
    Inspection,
    Agreement,
    ComplianceCheck,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Vehicle => "vehicle",
            EntityType::Driver => "driver",
            EntityType::Inspection => "inspection",
            EntityType::Agreement => "agreement",
            EntityType::ComplianceCheck => "compliance_check",
        }
    }

    /// Table holding the owning record
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Vehicle => "vehicles",
            EntityType::Driver => "drivers",
            EntityType::Inspection => "inspections",
            EntityType::Agreement => "agreements",
            EntityType::ComplianceCheck => "contractor_vehicle_checks",
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vehicle" => Ok(EntityType::Vehicle),
            "driver" => Ok(EntityType::Driver),
            "inspection" => Ok(EntityType::Inspection),
            "agreement" => Ok(EntityType::Agreement),
            "compliance_check" => Ok(EntityType::ComplianceCheck),
            _ => Err(format!("unknown entity type: {}", s)),
        }
    }
}

/// Content types accepted for upload
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/heic",
    "application/pdf",
];

pub fn is_allowed_content_type(content_type: &str) -> bool {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    ALLOWED_CONTENT_TYPES.contains(&base.as_str())
}

/// Reduce a client-supplied filename to `[A-Za-z0-9._-]`, keeping the
/// extension and dropping any directory components
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.chars().take(120).collect()
    }
}

/// Object storage key for a new attachment
pub fn object_key(entity_type: EntityType, entity_id: Uuid, file_id: Uuid, filename: &str) -> String {
    format!(
        "{}/{}/{}-{}",
        entity_type.as_str(),
        entity_id,
        file_id,
        sanitize_filename(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("photo 1.jpg"), "photo_1.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\rego.pdf"), "rego.pdf");
        assert_eq!(sanitize_filename("..."), "file");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[test]
    fn test_content_types() {
        assert!(is_allowed_content_type("image/png"));
        assert!(is_allowed_content_type("application/pdf; charset=binary"));
        assert!(is_allowed_content_type("IMAGE/JPEG"));
        assert!(!is_allowed_content_type("text/html"));
        assert!(!is_allowed_content_type(""));
    }

    #[test]
    fn test_object_key_layout() {
        let entity = Uuid::nil();
        let file = Uuid::nil();
        let key = object_key(EntityType::ComplianceCheck, entity, file, "my file.png");
        assert_eq!(
            key,
            format!("compliance_check/{}/{}-my_file.png", entity, file)
        );
    }
}
