//! Sorting applied to the current page of an [`SddsDataset`].

use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail};
use sdds_file::SddsDataset;
use sdds_layout::MatchOptions;
use sdds_mask::FlagOp;
use sdds_scalar::ColumnValues;

use crate::nondominated::{Direction, Fronts, Objective, aggregate_constraints, non_dominated_sort};
use crate::rows::{KeyColumn, SortKey, find_duplicates, sort_order};

/// Column counting the rows each kept row stands for after removing duplicates.
pub const IDENTICAL_COUNT: &str = "IdenticalCount";
/// Column holding the Pareto front of each row.
pub const RANK: &str = "Rank";
/// Column holding the crowding distance of each row.
pub const CROWDING_DISTANCE: &str = "CrowdingDistance";
/// Column holding the aggregated constraint violation of each row.
pub const CONSTRAINTS_VIOLATION: &str = "ConstraintsViolation";
/// Columns summed into [`CONSTRAINTS_VIOLATION`] when it is not supplied.
pub const CONSTRAINTS_PATTERN: &str = "*Constraints*";

fn key_columns<'a>(
    dataset: &'a SddsDataset,
    keys: &[SortKey],
    numeric_high: bool,
) -> SddsResult<Vec<KeyColumn<'a>>> {
    keys.iter()
        .map(|key| Ok(KeyColumn::new(dataset.get_column(&key.name)?, key, numeric_high)))
        .collect()
}

/// Stably sort every row of the current page by `keys`. Returns the applied order.
pub fn sort_rows(
    dataset: &mut SddsDataset,
    keys: &[SortKey],
    numeric_high: bool,
) -> SddsResult<Vec<usize>> {
    let order = sort_order(&key_columns(dataset, keys, numeric_high)?)?;
    dataset.permute_rows(&order)?;
    Ok(order)
}

/// Clear the row flags of all but the first of each run of adjacent rows equal under `keys`.
///
/// Rows are expected to be sorted by `keys` already. Returns the identical count of every row.
pub fn unset_duplicate_rows(
    dataset: &mut SddsDataset,
    keys: &[SortKey],
    numeric_high: bool,
) -> SddsResult<Vec<i64>> {
    let rows = dataset.row_count()?;
    let in_order = (0..rows).collect::<Vec<_>>();
    let duplicates = find_duplicates(&key_columns(dataset, keys, numeric_high)?, &in_order)?;
    let kept = dataset.flag_rows_of_interest(&duplicates.keep, FlagOp::And)?;
    log::debug!("{} of {} rows are unique", kept, rows);
    Ok(duplicates.identical_count)
}

/// The constraint violation of every row of the current page.
///
/// A [`CONSTRAINTS_VIOLATION`] column is used as is. Otherwise the negative parts of the columns
/// matching [`CONSTRAINTS_PATTERN`] are summed; with no such columns every row is feasible.
pub fn constraint_violation(dataset: &SddsDataset) -> SddsResult<Vec<f64>> {
    let rows = dataset.row_count()?;
    if dataset.column_names().iter().any(|n| n == CONSTRAINTS_VIOLATION) {
        return dataset.get_column(CONSTRAINTS_VIOLATION)?.to_f64();
    }
    let columns = dataset
        .match_column_names(CONSTRAINTS_PATTERN, MatchOptions::default())?
        .into_iter()
        .map(|name| dataset.get_column(&name)?.to_f64())
        .collect::<SddsResult<Vec<_>>>()?;
    Ok(aggregate_constraints(&columns, rows))
}

/// Rank the rows of the current page by the named objective columns.
pub fn rank_rows(dataset: &SddsDataset, objectives: &[(String, Direction)]) -> SddsResult<Fronts> {
    let objectives = objectives
        .iter()
        .map(|(name, direction)| {
            let values = dataset.get_column(name)?;
            if !values.sdds_type().is_numeric() {
                sdds_bail!(NonNumericObjective: "column {} is not numeric", name);
            }
            Ok(Objective::new(values.to_f64()?, *direction))
        })
        .collect::<SddsResult<Vec<_>>>()?;
    let violation = constraint_violation(dataset)?;
    non_dominated_sort(&objectives, Some(&violation))
}

/// Reorder the current page by `fronts` and fill in the rank, crowding distance and violation
/// columns that the layout defines.
pub fn apply_fronts(dataset: &mut SddsDataset, fronts: &Fronts) -> SddsResult<()> {
    dataset.permute_rows(&fronts.order)?;
    let names = dataset.column_names();
    let defined = |name: &str| names.iter().any(|n| n == name);
    if defined(RANK) {
        let rank = fronts
            .order
            .iter()
            .map(|&row| i32::try_from(fronts.rank[row]).unwrap_or(i32::MAX))
            .collect::<Vec<_>>();
        dataset.set_column(RANK, &ColumnValues::from(rank))?;
    }
    if defined(CROWDING_DISTANCE) {
        let crowding = fronts.order.iter().map(|&row| fronts.crowding[row]).collect::<Vec<_>>();
        dataset.set_column(CROWDING_DISTANCE, &ColumnValues::from(crowding))?;
    }
    if defined(CONSTRAINTS_VIOLATION) {
        let violation = fronts.order.iter().map(|&row| fronts.violation[row]).collect::<Vec<_>>();
        dataset.set_column(CONSTRAINTS_VIOLATION, &ColumnValues::from(violation))?;
    }
    Ok(())
}

/// Define the columns [`apply_fronts`] fills, skipping any the layout already has.
pub fn define_front_columns(dataset: &mut SddsDataset) -> SddsResult<()> {
    for (name, ty) in [
        (RANK, SddsType::Long),
        (CROWDING_DISTANCE, SddsType::Double),
        (CONSTRAINTS_VIOLATION, SddsType::Double),
    ] {
        if !dataset.column_names().iter().any(|n| n == name) {
            dataset.define_simple_column(name, None, ty)?;
        }
    }
    Ok(())
}
