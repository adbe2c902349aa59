use std::cmp::Ordering;

use sdds_error::{SddsResult, sdds_bail};
use sdds_scalar::{ColumnValues, CompareOptions};

/// One sort key: a column and how to order it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortKey {
    pub name: String,
    pub decreasing: bool,
    /// Order numeric values by magnitude.
    pub absolute: bool,
}

impl SortKey {
    pub fn increasing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn decreasing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decreasing: true,
            ..Default::default()
        }
    }

    pub fn with_absolute(mut self, absolute: bool) -> Self {
        self.absolute = absolute;
        self
    }
}

/// A sort key bound to the buffer it orders.
#[derive(Debug, Clone, Copy)]
pub struct KeyColumn<'a> {
    pub values: &'a ColumnValues,
    pub decreasing: bool,
    pub options: CompareOptions,
}

impl<'a> KeyColumn<'a> {
    pub fn new(values: &'a ColumnValues, key: &SortKey, numeric_high: bool) -> Self {
        Self {
            values,
            decreasing: key.decreasing,
            options: CompareOptions {
                absolute: key.absolute,
                numeric_high,
            },
        }
    }
}

/// Compare rows `a` and `b` key by key; the first key that differs decides.
pub fn compare_rows(keys: &[KeyColumn<'_>], a: usize, b: usize) -> Ordering {
    for key in keys {
        let ord = key.values.compare(a, b, key.options);
        if ord != Ordering::Equal {
            return if key.decreasing { ord.reverse() } else { ord };
        }
    }
    Ordering::Equal
}

fn check_lengths(keys: &[KeyColumn<'_>]) -> SddsResult<usize> {
    let Some(first) = keys.first() else {
        sdds_bail!("no sort keys given");
    };
    let rows = first.values.len();
    if keys.iter().any(|k| k.values.len() != rows) {
        sdds_bail!(InvalidArgument: "sort keys differ in length");
    }
    Ok(rows)
}

/// The stable order of rows under `keys`: entry `i` is the row that belongs at position `i`.
pub fn sort_order(keys: &[KeyColumn<'_>]) -> SddsResult<Vec<usize>> {
    let rows = check_lengths(keys)?;
    let mut order = (0..rows).collect::<Vec<_>>();
    order.sort_by(|&a, &b| compare_rows(keys, a, b));
    Ok(order)
}

/// Runs of identical rows in `order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicates {
    /// Per row, whether it is the first of its run.
    pub keep: Vec<bool>,
    /// Per row, the length of the run it starts; 1 for rows that are not kept.
    pub identical_count: Vec<i64>,
}

/// Find runs of rows that compare equal under `keys`, visiting rows in `order`.
///
/// The first row of each run is kept and counts the run's length.
pub fn find_duplicates(keys: &[KeyColumn<'_>], order: &[usize]) -> SddsResult<Duplicates> {
    let rows = check_lengths(keys)?;
    let mut keep = vec![false; rows];
    let mut identical_count = vec![1i64; rows];
    let mut run_start: Option<usize> = None;
    for &row in order {
        match run_start {
            Some(first) if compare_rows(keys, first, row) == Ordering::Equal => {
                identical_count[first] += 1;
            }
            _ => {
                keep[row] = true;
                run_start = Some(row);
            }
        }
    }
    Ok(Duplicates {
        keep,
        identical_count,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn order_of(values: &ColumnValues, key: &SortKey) -> Vec<usize> {
        sort_order(&[KeyColumn::new(values, key, false)]).unwrap()
    }

    #[rstest]
    #[case(SortKey::increasing("x"), vec![3, 1, 0, 2])]
    #[case(SortKey::decreasing("x"), vec![2, 0, 1, 3])]
    #[case(SortKey::increasing("x").with_absolute(true), vec![1, 0, 2, 3])]
    fn single_key(#[case] key: SortKey, #[case] expected: Vec<usize>) {
        let values = ColumnValues::from(vec![2.0, 1.0, 3.0, -4.0]);
        assert_eq!(order_of(&values, &key), expected);
    }

    #[test]
    fn later_keys_break_ties_stably() {
        let group = ColumnValues::from(vec![1i32, 0, 1, 0, 1]);
        let name = ColumnValues::from(vec![
            "b".to_string(),
            "z".to_string(),
            "a".to_string(),
            "y".to_string(),
            "a".to_string(),
        ]);
        let keys = [
            KeyColumn::new(&group, &SortKey::increasing("g"), false),
            KeyColumn::new(&name, &SortKey::decreasing("n"), false),
        ];
        assert_eq!(sort_order(&keys).unwrap(), vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn numeric_high_strings() {
        let names = ColumnValues::from(vec!["x10".to_string(), "x9".to_string(), "x100".to_string()]);
        let key = SortKey::increasing("n");
        assert_eq!(order_of(&names, &key), vec![0, 2, 1]);
        assert_eq!(
            sort_order(&[KeyColumn::new(&names, &key, true)]).unwrap(),
            vec![1, 0, 2]
        );
    }

    #[test]
    fn duplicates_count_their_run() {
        let k = ColumnValues::from(vec![3i32, 1, 2, 1, 3]);
        let keys = [KeyColumn::new(&k, &SortKey::increasing("k"), false)];
        let order = sort_order(&keys).unwrap();
        assert_eq!(order, vec![1, 3, 2, 0, 4]);
        let duplicates = find_duplicates(&keys, &order).unwrap();
        assert_eq!(duplicates.keep, vec![true, true, true, false, false]);
        assert_eq!(duplicates.identical_count, vec![2, 2, 1, 1, 1]);
    }

    #[test]
    fn keys_are_required() {
        assert!(sort_order(&[]).is_err());
    }

    proptest! {
        #[test]
        fn sorting_is_idempotent_and_reversible(values in prop::collection::vec(-50i32..50, 0..40)) {
            let column = ColumnValues::from(values);
            let up = SortKey::increasing("v");
            let down = SortKey::decreasing("v");
            let order = order_of(&column, &up);
            let sorted = column.take(&order);
            prop_assert_eq!(order_of(&sorted, &up), (0..sorted.len()).collect::<Vec<_>>());

            let reversed = sorted.take(&(0..sorted.len()).rev().collect::<Vec<_>>());
            let descending = column.take(&order_of(&column, &down));
            prop_assert_eq!(reversed, descending);
        }
    }
}
