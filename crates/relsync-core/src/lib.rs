//! # relsync-core
//!
//! Shared vocabulary for synchronizing role relationships from an external
//! source into a target identity store.
//!
//! A relationship is a triple `(role, subject, object)`: the subject user
//! holds the role in the scope of the object user. Each side of a sync is a
//! [`DataPort`]; the target side also implements [`RelationshipWriter`].

pub mod error;
pub mod ids;
pub mod model;
pub mod port;

pub use error::{BoxError, RelSyncError, RelSyncResult};
pub use ids::{ContextId, IdentityKey, ParseIdError, RoleId};
pub use model::{
    normalize_name, relationship_key, role_catalog, FieldValue, Provenance, RelationshipRow,
    RelationshipSet, Role, RoleCatalog, Side, DEFAULT_COMPONENT, KEY_SEPARATOR,
};
pub use port::{DataPort, PortKind, RelationshipWriter};
