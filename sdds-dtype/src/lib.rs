#![deny(missing_docs)]

//! The scalar type system of the SDDS data format.
//!
//! Every parameter, array and column carries one of the closed set of [`SddsType`]s. The type
//! determines the on-wire width of binary values and how text tokens are parsed.

pub use stype::*;

mod stype;
