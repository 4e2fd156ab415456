pub mod format;
pub mod ops;
pub mod render;
pub mod report;
pub mod store;
pub mod truncation;

pub use ops::{fingerprint, Operation};
pub use render::ContextRenderer;
pub use report::{RenderReport, SnapshotReport};
pub use store::{ContextStore, Snapshot};
