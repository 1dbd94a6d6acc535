use crate::FrameworkId;
use crate::resources::{DEFAULT_ROLE, Role};

/// A registered scheduler: receives offers and launches tasks.
#[derive(Debug, Clone)]
pub struct Framework {
    id: FrameworkId,
    name: String,
    roles: Vec<Role>,
}

impl Framework {
    pub fn new(id: FrameworkId, name: String, roles: Vec<Role>) -> Self {
        Framework { id, name, roles }
    }

    pub fn id(&self) -> FrameworkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// May resources of `role` be offered to this framework?
    /// Unreserved resources may go to anyone.
    pub fn accepts_role(&self, role: &str) -> bool {
        role == DEFAULT_ROLE || self.roles.iter().any(|r| r == role)
    }
}
