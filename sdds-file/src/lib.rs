//! Read and write SDDS datasets.
//!
//! A stream is a text header followed by zero or more pages. The header (see
//! [`sdds_layout::header`]) names every parameter, array and column and ends with a `&data`
//! directive choosing the page encoding:
//!
//! * ASCII pages are line oriented. Each starts with a `! page number N` comment, followed by the
//!   parameter values one per line, each array as an extents line and its elements, then the
//!   row count and the rows.
//! * Binary pages start with a 64-bit row count, then the parameters, then each array as 32-bit
//!   extents and its elements, then the column data in row- or column-major order. Strings are
//!   a 32-bit length followed by bytes. The byte order is declared in the header; streams that
//!   do not declare it are recognised from the first row count.
//!
//! [`SddsDataset`] drives both directions through a small state machine. Files ending in `.gz`
//! or `.bz2` are (de)compressed in process, `.xz` and `.lzma` through an `xz` child process.

pub use dataset::*;
pub use io::{Compression, Location};
pub use options::*;
pub use page::*;

mod ascii;
mod binary;
mod dataset;
pub mod io;
mod options;
mod page;
#[cfg(test)]
mod tests;
