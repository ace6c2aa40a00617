pub mod criterion;
pub mod error;
pub mod region;
pub mod sanitization;
pub mod types;

// Re-export commonly used types
pub use criterion::{BoolOp, Comparator, Criterion, MAX_CONDITIONS};
pub use error::{CrmError, CrmResult, FieldError};
pub use region::{Region, UnknownRegion};
pub use sanitization::{create_debug_string, is_sensitive_field, redact_secrets, sanitize_json_value};
pub use types::{
    record_from_value, AccessCredential, ConnectionRef, DeleteConfirmation, ModuleName,
    PageInfo, Pagination, Record, RecordId, RecordPage, SecretToken, SortOrder,
    WriteConfirmation, DEFAULT_PER_PAGE, MAX_PER_PAGE,
};
