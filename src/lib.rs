pub mod capture;
pub mod engine;
pub mod error;
pub mod extract;
pub mod output;
pub mod search;
pub mod sessions;
pub mod signatures;
pub mod stats;
pub mod types;

pub use engine::{CommandOutcome, Engine};
pub use error::{CarveError, Result};
pub use search::{MatchResult, SearchThread, scan};
pub use sessions::{SESSION_BUCKETS, Session, SessionStore, TableStats};
pub use signatures::{SignatureSpec, SignatureTable, builtin_specs, load_specs};
pub use stats::Statistics;
pub use types::{FourTuple, Signature, SpecType};
