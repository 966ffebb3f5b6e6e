pub mod exclusion;
pub mod manifest;
pub mod selector;
pub mod store;

pub use exclusion::*;
pub use manifest::*;
pub use selector::*;
pub use store::{JsonRecordingStore, RecordingStore};
