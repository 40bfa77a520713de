//! The binary dialect: wire-format types, streaming decoders, and the
//! encoder.

pub mod encoding;
pub mod lazy;
pub mod linking_section;
pub mod name_section;
pub mod read;
pub mod reader;
pub mod types;
pub mod write;

pub use lazy::{read_module, LazyModule, LazySection, Section};
pub use read::ReadCtx;
pub use reader::Reader;
pub use types::Module;
pub use write::write_module;
