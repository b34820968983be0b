//! Registry store and change-list ingestion.
//!
//! The store publishes immutable snapshots; ingestion builds the next snapshot
//! from a copy-on-write draft and swaps it in once every entry of a change list
//! has been applied, so scorers never observe a half-applied list.

pub mod domain;
pub mod ingestion;
pub mod parser;
pub mod router;
pub mod store;


pub use crate::workflows::phone::{AreaCode, PhoneKey};
pub use domain::{
    AuthorizedScope, ChangeList, ChangeListEntry, ChangeListId, ChangeListRequest,
    ChangeListStatus, ChangeType, EntryFailure, EntryFailureReason, IngestOutcome,
    IngestionReport, RegistryEntry, RegistryHit, RegistrySource, RejectionReason, StateCode,
    UserId,
};
pub use ingestion::{ChangeListIngestor, ChangeListLedger, IngestError, LedgerError};
pub use parser::{parse_change_list_csv, parse_change_list_file, ChangeListFileError};
pub use router::registry_router;
pub use store::{RegistryError, RegistryReader, RegistrySnapshot, RegistryStore};
