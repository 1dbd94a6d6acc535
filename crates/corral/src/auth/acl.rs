//! Access-control rules for reserve/unreserve, evaluated after
//! authentication. Rule lists are first-match; when no rule matches the
//! acting principal the `permissive` flag decides.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityKind {
    #[default]
    Some,
    Any,
    None,
}

/// A set of principals or roles in a rule: an explicit value list, any, or none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type", default)]
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl Entity {
    pub fn any() -> Self {
        Entity {
            kind: EntityKind::Any,
            values: Vec::new(),
        }
    }

    pub fn none() -> Self {
        Entity {
            kind: EntityKind::None,
            values: Vec::new(),
        }
    }

    pub fn values<I: IntoIterator<Item = S>, S: Into<String>>(values: I) -> Self {
        Entity {
            kind: EntityKind::Some,
            values: values.into_iter().map(|v| v.into()).collect(),
        }
    }

    pub fn matches(&self, item: &str) -> bool {
        match self.kind {
            EntityKind::Any => true,
            EntityKind::None => false,
            EntityKind::Some => self.values.iter().any(|v| v == item),
        }
    }
}

/// Who may reserve resources for which roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveAcl {
    pub principals: Entity,
    pub roles: Entity,
}

/// Who may unreserve resources previously reserved by which principals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreserveAcl {
    pub principals: Entity,
    pub reserver_principals: Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acls {
    #[serde(default = "default_permissive")]
    pub permissive: bool,
    #[serde(default)]
    pub reserve: Vec<ReserveAcl>,
    #[serde(default)]
    pub unreserve: Vec<UnreserveAcl>,
}

fn default_permissive() -> bool {
    true
}

impl Default for Acls {
    fn default() -> Self {
        Acls {
            permissive: true,
            reserve: Vec::new(),
            unreserve: Vec::new(),
        }
    }
}

impl Acls {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// May `principal` reserve resources for `role`?
    pub fn authorize_reserve(&self, principal: &str, role: &str) -> bool {
        for rule in &self.reserve {
            if rule.principals.matches(principal) {
                return rule.roles.matches(role);
            }
        }
        self.permissive
    }

    /// May `principal` unreserve resources that `reserver_principal` reserved?
    pub fn authorize_unreserve(&self, principal: &str, reserver_principal: &str) -> bool {
        for rule in &self.unreserve {
            if rule.principals.matches(principal) {
                return rule.reserver_principals.matches(reserver_principal);
            }
        }
        self.permissive
    }
}
