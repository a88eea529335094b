//! Data carried through the worker: raw stream events, their persisted form, filter terms,
//! credentials, and the worker status record read by external monitors.

pub mod credentials;
pub mod event;
pub mod status;
pub mod term;

pub use credentials::{select_credentials, Credentials, CredentialsError};
pub use event::{StatusRecord, StreamEvent};
pub use status::{StreamStatus, WorkerStatus};
pub use term::{enabled_term_set, FilterTerm};
