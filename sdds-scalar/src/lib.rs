//! Scalar values of the SDDS type system and the buffers that hold them.
//!
//! [`Value`] is a single typed value, [`ColumnValues`] a typed vector of them. The [`text`]
//! module parses and formats the ASCII representation, honouring printf-style format hints.

pub use columns::*;
pub use compare::*;
pub use value::*;

mod columns;
mod compare;
pub mod longdouble;
pub mod printf;
pub mod text;
mod value;
