// Recording storage and file metadata

pub mod metadata;
pub mod storage;

pub use metadata::*;
pub use storage::*;
