//! Domain model module declarations.

pub mod process;
pub mod title;

pub use process::{ProcessId, ProcessRecord, ProcessSnapshot};
pub use title::TitleSource;
