//! A reverse-Polish expression engine.
//!
//! An [`RpnContext`] owns numeric, string, logical and array stacks, named memories and a
//! registry of user-defined functions. Text is compiled to [`Opcode`]s and run against the
//! context; the dataset utilities use it to compute new columns and filter rows.
//!
//! ```
//! use sdds_rpn::RpnContext;
//!
//! let mut ctx = RpnContext::new();
//! ctx.store("x", 3.0).unwrap();
//! ctx.create_udf("sq", "dup *").unwrap();
//! assert_eq!(ctx.evaluate("x sq 1 +").unwrap(), 10.0);
//! ```

pub use builtins::{Builtin, FunctionKind, builtins, find_builtin};
pub use compile::*;
pub use context::*;
pub use files::*;
pub use infix::*;
pub use memory::*;
pub use udf::*;

mod builtins;
mod compile;
mod context;
mod files;
mod infix;
mod memory;
mod stack;
#[cfg(test)]
mod tests;
mod udf;
