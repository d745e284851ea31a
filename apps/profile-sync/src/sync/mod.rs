//! The profile save pipeline: classify, upload, coordinate, merge.

pub mod classifier;
pub mod coordinator;
pub mod merger;
pub mod policy;
pub mod report;
pub mod session;
pub mod upload;
pub mod validation;

pub use policy::SyncPolicy;
pub use report::{SaveMode, SaveReport, SyncEvent};
pub use session::{EditorSession, FinalizeError, FinalizedProfile, SyncEngine};
