//! Local mapping configuration

use serde::{Deserialize, Serialize};
use std::fmt;

use relsync_core::{normalize_name, RelSyncError, RelSyncResult, DEFAULT_COMPONENT};

use crate::store::RoleRecord;

/// Which role attribute external role values are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleField {
    #[default]
    Shortname,
    Name,
    Id,
}

impl RoleField {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleField::Shortname => "shortname",
            RoleField::Name => "name",
            RoleField::Id => "id",
        }
    }

    pub fn parse(value: &str) -> RelSyncResult<Self> {
        match normalize_name(value).as_str() {
            "shortname" => Ok(RoleField::Shortname),
            "name" => Ok(RoleField::Name),
            "id" => Ok(RoleField::Id),
            other => Err(RelSyncError::configuration(format!(
                "local role field '{other}' must be one of shortname, name or id"
            ))),
        }
    }

    /// The attribute of `role` this field selects.
    pub fn value_of(self, role: &RoleRecord) -> String {
        match self {
            RoleField::Shortname => role.shortname.clone(),
            RoleField::Name => role.name.clone(),
            RoleField::Id => role.id.to_string(),
        }
    }
}

impl fmt::Display for RoleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the target store side of a sync is mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMappingConfig {
    /// Field mapping of the subject, e.g. `user_email`.
    pub subject: String,

    /// Field mapping of the object, e.g. `profile_f3`.
    pub object: String,

    /// Role attribute matched against external role values.
    #[serde(default = "default_role_field")]
    pub role: String,

    /// Component tag of assignments this tool owns.
    #[serde(default = "default_component")]
    pub component: String,
}

fn default_role_field() -> String {
    RoleField::Shortname.as_str().to_string()
}

fn default_component() -> String {
    DEFAULT_COMPONENT.to_string()
}

impl LocalMappingConfig {
    pub fn new(subject: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            role: default_role_field(),
            component: default_component(),
        }
    }

    #[must_use]
    pub fn with_role_field(mut self, role: RoleField) -> Self {
        self.role = role.as_str().to_string();
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn role_field(&self) -> RelSyncResult<RoleField> {
        RoleField::parse(&self.role)
    }

    pub fn validate(&self) -> RelSyncResult<()> {
        if normalize_name(&self.subject).is_empty() {
            return Err(RelSyncError::configuration("local subject field is required"));
        }
        if normalize_name(&self.object).is_empty() {
            return Err(RelSyncError::configuration("local object field is required"));
        }
        if self.component.trim().is_empty() {
            return Err(RelSyncError::configuration("component tag must not be empty"));
        }
        self.role_field()?;
        Ok(())
    }
}
