//! Vehicle and vehicle group models

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operational status of a vehicle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    #[default]
    Available,
    Assigned,
    Maintenance,
    OutOfService,
    Retired,
}

impl VehicleStatus {
    pub const ALL: [VehicleStatus; 5] = [
        VehicleStatus::Available,
        VehicleStatus::Assigned,
        VehicleStatus::Maintenance,
        VehicleStatus::OutOfService,
        VehicleStatus::Retired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "available",
            VehicleStatus::Assigned => "assigned",
            VehicleStatus::Maintenance => "maintenance",
            VehicleStatus::OutOfService => "out_of_service",
            VehicleStatus::Retired => "retired",
        }
    }

    /// Whether a driver may be attached to a vehicle in this status
    pub fn can_assign_driver(&self) -> bool {
        matches!(self, VehicleStatus::Available | VehicleStatus::Assigned)
    }

    /// Status after a driver is attached or detached
    pub fn after_assignment(&self, has_driver: bool) -> VehicleStatus {
        match (self, has_driver) {
            (VehicleStatus::Available, true) => VehicleStatus::Assigned,
            (VehicleStatus::Assigned, false) => VehicleStatus::Available,
            (status, _) => *status,
        }
    }

    /// Status after a failed inspection
    pub fn after_failed_inspection(&self) -> VehicleStatus {
        match self {
            VehicleStatus::Available => VehicleStatus::Maintenance,
            status => *status,
        }
    }
}

impl std::fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VehicleStatus::Available => write!(f, "Available"),
            VehicleStatus::Assigned => write!(f, "Assigned"),
            VehicleStatus::Maintenance => write!(f, "Maintenance"),
            VehicleStatus::OutOfService => write!(f, "Out of Service"),
            VehicleStatus::Retired => write!(f, "Retired"),
        }
    }
}

impl FromStr for VehicleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown vehicle status: {}", s))
    }
}

/// Who owns the vehicle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    #[default]
    Owned,
    Leased,
    /// Supplied by a contractor; subject to weekly compliance checks
    Contractor,
}

impl Ownership {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ownership::Owned => "owned",
            Ownership::Leased => "leased",
            Ownership::Contractor => "contractor",
        }
    }
}

impl FromStr for Ownership {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owned" => Ok(Ownership::Owned),
            "leased" => Ok(Ownership::Leased),
            "contractor" => Ok(Ownership::Contractor),
            _ => Err(format!("unknown ownership: {}", s)),
        }
    }
}

/// Fuel or energy source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    Petrol,
    Diesel,
    Hybrid,
    Electric,
    Lpg,
}

impl FuelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuelType::Petrol => "petrol",
            FuelType::Diesel => "diesel",
            FuelType::Hybrid => "hybrid",
            FuelType::Electric => "electric",
            FuelType::Lpg => "lpg",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in VehicleStatus::ALL {
            assert_eq!(status.as_str().parse::<VehicleStatus>(), Ok(status));
        }
        assert!("parked".parse::<VehicleStatus>().is_err());
    }

    #[test]
    fn test_assignment_transitions() {
        assert_eq!(
            VehicleStatus::Available.after_assignment(true),
            VehicleStatus::Assigned
        );
        assert_eq!(
            VehicleStatus::Assigned.after_assignment(false),
            VehicleStatus::Available
        );
        assert_eq!(
            VehicleStatus::Maintenance.after_assignment(false),
            VehicleStatus::Maintenance
        );
    }

    #[test]
    fn test_retired_vehicle_cannot_be_assigned() {
        assert!(!VehicleStatus::Retired.can_assign_driver());
        assert!(!VehicleStatus::OutOfService.can_assign_driver());
        assert!(VehicleStatus::Available.can_assign_driver());
    }

    #[test]
    fn test_failed_inspection_moves_available_to_maintenance() {
        assert_eq!(
            VehicleStatus::Available.after_failed_inspection(),
            VehicleStatus::Maintenance
        );
        assert_eq!(
            VehicleStatus::Assigned.after_failed_inspection(),
            VehicleStatus::Assigned
        );
    }
}
