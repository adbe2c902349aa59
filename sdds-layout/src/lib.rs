//! The schema of an SDDS dataset.
//!
//! A [`Layout`] holds four [`SymbolTable`]s of definitions (parameters, arrays, columns and
//! associates) together with file-level metadata. The [`header`] module reads and writes the
//! `&keyword ... &end` header syntax that introduces every stream.

pub use definition::*;
pub use layout::*;
pub use symbols::*;
pub use wildcard::*;

mod definition;
pub mod header;
mod layout;
mod symbols;
mod wildcard;
