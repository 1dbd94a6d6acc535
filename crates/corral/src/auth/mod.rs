pub mod acl;
pub mod authn;

pub use acl::{Acls, Entity};
pub use authn::CredentialStore;
