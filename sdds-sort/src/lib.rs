//! Sorting of SDDS pages.
//!
//! [`rows`] orders rows by any number of column keys and finds runs of identical rows,
//! [`pages`] orders whole pages by parameter keys, and [`nondominated`] ranks rows into Pareto
//! fronts. The functions in this crate's root apply them to the current page of a dataset.

pub use dataset::*;
pub use nondominated::{Direction, Fronts, Objective, aggregate_constraints, non_dominated_sort};
pub use pages::page_order;
pub use rows::{Duplicates, KeyColumn, SortKey, compare_rows, find_duplicates, sort_order};

mod dataset;
pub mod nondominated;
pub mod pages;
pub mod rows;
