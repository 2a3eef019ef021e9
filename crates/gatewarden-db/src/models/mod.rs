//! Database row models.
//!
//! Each model file owns its table's queries; conversions to and from the
//! domain types live beside the rows they map.

pub mod access_attempt;
pub mod access_link;
pub mod audit_record;

pub use access_attempt::AccessAttemptRow;
pub use access_link::AccessLinkRow;
pub use audit_record::AuditRecordRow;
