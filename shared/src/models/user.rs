//! User, role and permission models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role_id: Uuid,
    pub email: String,
    pub name: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Resources that can be accessed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Vehicle,
    VehicleGroup,
    Driver,
    Inspection,
    Agreement,
    AgreementTemplate,
    Compliance,
    Attachment,
    User,
    Role,
    EmailConfig,
    AuditLog,
}

impl Resource {
    pub const ALL: [Resource; 12] = [
        Resource::Vehicle,
        Resource::VehicleGroup,
        Resource::Driver,
        Resource::Inspection,
        Resource::Agreement,
        Resource::AgreementTemplate,
        Resource::Compliance,
        Resource::Attachment,
        Resource::User,
        Resource::Role,
        Resource::EmailConfig,
        Resource::AuditLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Vehicle => "vehicle",
            Resource::VehicleGroup => "vehicle_group",
            Resource::Driver => "driver",
            Resource::Inspection => "inspection",
            Resource::Agreement => "agreement",
            Resource::AgreementTemplate => "agreement_template",
            Resource::Compliance => "compliance",
            Resource::Attachment => "attachment",
            Resource::User => "user",
            Resource::Role => "role",
            Resource::EmailConfig => "email_config",
            Resource::AuditLog => "audit_log",
        }
    }

    /// Administrative resources are reserved for the admin role
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            Resource::User | Resource::Role | Resource::EmailConfig | Resource::AuditLog
        )
    }
}

/// Actions that can be performed on resources
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Export,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::View,
        Action::Create,
        Action::Edit,
        Action::Delete,
        Action::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Export => "export",
        }
    }
}

/// Permission key in `resource:action` form, as carried in access tokens
pub fn permission_key(resource: Resource, action: Action) -> String {
    format!("{}:{}", resource.as_str(), action.as_str())
}

/// Split a `resource:action` key into its parts
pub fn parse_permission_key(key: &str) -> Option<(&str, &str)> {
    let (resource, action) = key.split_once(':')?;
    if resource.is_empty() || action.is_empty() || action.contains(':') {
        return None;
    }
    Some((resource, action))
}

/// System roles created by the initial migration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SystemRole {
    Admin,
    Manager,
    Viewer,
}

impl SystemRole {
    pub const ALL: [SystemRole; 3] = [SystemRole::Admin, SystemRole::Manager, SystemRole::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemRole::Admin => "admin",
            SystemRole::Manager => "manager",
            SystemRole::Viewer => "viewer",
        }
    }

    /// Whether `name` collides with a system role (case-insensitive)
    pub fn is_reserved_name(name: &str) -> bool {
        let name = name.trim().to_lowercase();
        Self::ALL.iter().any(|r| r.as_str() == name)
    }

    /// Permission keys granted to the role
    pub fn permissions(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for resource in Resource::ALL {
            for action in Action::ALL {
                let granted = match self {
                    SystemRole::Admin => true,
                    SystemRole::Manager => !resource.is_administrative(),
                    SystemRole::Viewer => {
                        !resource.is_administrative() && action == Action::View
                    }
                };
                if granted {
                    keys.push(permission_key(resource, action));
                }
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_key_round_trip() {
        let key = permission_key(Resource::VehicleGroup, Action::Edit);
        assert_eq!(key, "vehicle_group:edit");
        assert_eq!(parse_permission_key(&key), Some(("vehicle_group", "edit")));
    }

    #[test]
    fn test_parse_permission_key_rejects_malformed() {
        assert_eq!(parse_permission_key("vehicle"), None);
        assert_eq!(parse_permission_key(":view"), None);
        assert_eq!(parse_permission_key("vehicle:"), None);
        assert_eq!(parse_permission_key("a:b:c"), None);
    }

    #[test]
    fn test_admin_has_every_permission() {
        let perms = SystemRole::Admin.permissions();
        assert_eq!(perms.len(), Resource::ALL.len() * Action::ALL.len());
    }

    #[test]
    fn test_manager_excludes_administration() {
        let perms = SystemRole::Manager.permissions();
        assert!(perms.contains(&"vehicle:delete".to_string()));
        assert!(perms.contains(&"agreement:create".to_string()));
        assert!(!perms.contains(&"user:view".to_string()));
        assert!(!perms.contains(&"email_config:edit".to_string()));
    }

    #[test]
    fn test_viewer_is_read_only() {
        let perms = SystemRole::Viewer.permissions();
        assert!(perms.iter().all(|p| p.ends_with(":view")));
        assert!(!perms.contains(&"audit_log:view".to_string()));
    }

    #[test]
    fn test_reserved_names() {
        assert!(SystemRole::is_reserved_name("Admin"));
        assert!(SystemRole::is_reserved_name(" viewer "));
        assert!(!SystemRole::is_reserved_name("dispatcher"));
    }
}
