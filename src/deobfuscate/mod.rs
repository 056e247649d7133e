//! Pure text transforms used by two scrapers to recover obfuscated proxy
//! port numbers (spec.md §4.2, C2). Neither submodule touches the network,
//! so both are directly testable with string fixtures captured from the
//! sites (spec.md §9).

pub mod packer;
pub mod xor;

pub use packer::{deobfuscate, UnpackResult};
pub use xor::XorDict;
