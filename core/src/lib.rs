pub mod aggregate;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod pattern;
pub mod replace;
pub mod report;
pub mod scanner;
pub mod selection;
pub mod session;
pub mod session_log;
pub mod store;
pub mod walker;

pub use aggregate::Aggregator;
pub use batch::{BatchOrchestrator, BatchState, RecordFailure, ReplaceReport, ReplaceTarget};
pub use classifier::{classify, FieldClassification};
pub use config::{ConfigError, LoggingOptions, ReplaceConfig, ReplaceOptions, StoreOptions};
pub use context::context_around;
pub use error::{EngineError, ErrorEvent, ErrorKind};
pub use model::{
    AggregatedRecord, FieldMatch, FieldMatches, FieldSchema, FieldValue, Occurrence, Record,
    RecordTypeInfo, ReplaceProgress, SiteInfo,
};
pub use pattern::{find_occurrences, highlight_segments, HighlightSegment, SearchPattern};
pub use replace::{build_patch, ReplaceEngine, ReplaceOutcome};
pub use report::{ReplaceSummary, ScanSummary};
pub use scanner::{RawMatch, RecordScan, RecordScanner};
pub use selection::Selection;
pub use session::ScanSession;
pub use store::{CmaClient, MemoryStore, PageRequest, RecordStore, StoreError};
pub use walker::{CollectionWalker, SessionCache, SkippedRecordType, WalkOutcome};
