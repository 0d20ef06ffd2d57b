//! Precursor Pivot: parallel loading and pivot queries for precursor reports
//!
//! This library loads large tab-separated precursor quantification reports
//! into memory and answers the queries a plotting front end needs.
//!
//! # Features
//!
//! - **Parallel ingestion**: Rayon fork/join over line-aligned byte ranges
//! - **Two load modes**: memory-mapped whole file, or bounded chunks read
//!   through independent file handles
//! - **Source aliases**: short, deduplicated names for long acquisition
//!   file names, assigned deterministically in file order
//!
//! # Example
//!
//! ```rust,no_run
//! use precursor_pivot::{LoadMode, Session};
//!
//! let session = Session::new();
//! session.load("report.tsv", LoadMode::InMemory).unwrap();
//!
//! let store = session.store().unwrap();
//! let series = store.sorted_series_ids("GAPDH");
//! let aliases = store.aliases_for_group("GAPDH");
//! let table = store.pivot("GAPDH", &series, &aliases);
//! ```

pub mod alias;
pub mod chunk;
pub mod config;
pub mod output;
pub mod parallel;
pub mod query;
pub mod record;
pub mod session;
pub mod store;
pub mod tsv;

// Re-export commonly used types
pub use alias::{base_name, AliasRegistry};
pub use config::{AliasOrder, ColumnNames, IngestConfig, LoadMode};
pub use parallel::{ingest, LoadStats};
pub use query::PivotTable;
pub use record::Record;
pub use session::{LoadStatus, Session};
pub use store::RecordStore;
pub use tsv::LoadError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::alias::{base_name, AliasRegistry};
    pub use crate::config::{AliasOrder, IngestConfig, LoadMode};
    pub use crate::query::PivotTable;
    pub use crate::record::Record;
    pub use crate::session::{LoadStatus, Session};
    pub use crate::store::RecordStore;
    pub use crate::tsv::LoadError;
}
