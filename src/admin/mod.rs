/// Administration
///
/// Role management with an audit trail, and event authoring.

pub mod events;
pub mod roles;

pub use events::{Event, EventDefinition, EventKind, EventManager, EventStatus};
pub use roles::{AuditLogEntry, Capability, Role, RoleManager};
