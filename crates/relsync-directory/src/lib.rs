//! # relsync-directory
//!
//! Target store side of a relationship sync.
//!
//! - [`DirectoryStore`]: the store operations the sync needs, backed by
//!   PostgreSQL ([`PgDirectory`]) or process memory ([`MemoryDirectory`]).
//! - Field mappings ([`UserField`], [`ProfileField`]) that translate external
//!   identifying values into identity keys, built by [`FieldFactory`].
//! - [`InternalDataPort`]: the read/write data port over the store.

pub mod config;
pub mod factory;
pub mod field;
pub mod memory;
pub mod port;
pub mod postgres;
pub mod store;

pub use config::{LocalMappingConfig, RoleField};
pub use factory::FieldFactory;
pub use field::{
    FieldDescriptor, FieldKind, IdentityField, ProfileField, ProfileFieldCatalog, UserField,
};
pub use memory::{MemoryDirectory, MemoryFaults};
pub use port::{run_lock_key, InternalDataPort};
pub use postgres::{PgDirectory, USER_CONTEXT_LEVEL};
pub use store::{
    AssignmentFilter, AssignmentRecord, DirectoryStore, ProfileFieldRecord, RoleRecord, UserColumn,
};
