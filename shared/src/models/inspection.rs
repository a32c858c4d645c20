//! Vehicle inspection models

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Overall outcome of an inspection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InspectionResult {
    Pass,
    Fail,
    /// Passed with findings that need follow-up
    Advisory,
}

impl InspectionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionResult::Pass => "pass",
            InspectionResult::Fail => "fail",
            InspectionResult::Advisory => "advisory",
        }
    }
}

impl FromStr for InspectionResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(InspectionResult::Pass),
            "fail" => Ok(InspectionResult::Fail),
            "advisory" => Ok(InspectionResult::Advisory),
            _ => Err(format!("unknown inspection result: {}", s)),
        }
    }
}

/// Kind of inspection performed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InspectionType {
    #[default]
    Routine,
    PreTrip,
    Handover,
    Return,
    Damage,
}

impl InspectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionType::Routine => "routine",
            InspectionType::PreTrip => "pre_trip",
            InspectionType::Handover => "handover",
            InspectionType::Return => "return",
            InspectionType::Damage => "damage",
        }
    }
}

/// One line of an inspection or compliance checklist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecklistItem {
    pub item: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Validate a checklist: at least one item, no blank or duplicate names
pub fn validate_checklist(items: &[ChecklistItem]) -> Result<(), &'static str> {
    if items.is_empty() {
        return Err("Checklist must contain at least one item");
    }
    let mut seen = std::collections::HashSet::new();
    for item in items {
        let name = item.item.trim().to_lowercase();
        if name.is_empty() {
            return Err("Checklist item names cannot be empty");
        }
        if !seen.insert(name) {
            return Err("Checklist contains duplicate items");
        }
    }
    Ok(())
}

/// Derive the overall result from the checklist.
///
/// An explicit `Advisory` from the inspector is kept; otherwise the result
/// is `Fail` as soon as any item failed.
pub fn derive_result(
    items: &[ChecklistItem],
    stated: Option<InspectionResult>,
) -> InspectionResult {
    if stated == Some(InspectionResult::Advisory) {
        return InspectionResult::Advisory;
    }
    if items.iter().all(|i| i.passed) {
        InspectionResult::Pass
    } else {
        InspectionResult::Fail
    }
}
