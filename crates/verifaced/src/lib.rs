//! Liveness session service.
//!
//! Wraps the `veriface-core` state machine and matcher with the parts that
//! have side effects: frame delivery, the vector store and outcome
//! reporting.

pub mod config;
pub mod feed;
pub mod pipeline;
pub mod session;
pub mod store;

pub use config::Config;
pub use pipeline::{Frame, FrameReport, Pipeline, ProgressUpdate, SessionOutcome};
pub use session::{spawn_session, SessionError, SessionEvent, SessionHandle};
pub use store::{NewVectorRecord, NullStore, SqliteVectorStore, StoreError, VectorStore};
