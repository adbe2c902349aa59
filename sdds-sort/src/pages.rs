use sdds_error::SddsResult;
use sdds_file::Page;
use sdds_layout::Layout;
use sdds_scalar::{ColumnValues, Value};

use crate::rows::{KeyColumn, SortKey, sort_order};

/// Order whole pages by parameter values.
///
/// Each key names a parameter of `layout`. Returns the page indices in sorted order; pages that
/// tie on every key keep their original order.
pub fn page_order(
    layout: &Layout,
    pages: &[Page],
    keys: &[SortKey],
    numeric_high: bool,
) -> SddsResult<Vec<usize>> {
    let gathered = keys
        .iter()
        .map(|key| {
            let index = layout.parameters().lookup(&key.name)?;
            let ty = layout.parameters().get_by_name(&key.name)?.sdds_type;
            let values = pages
                .iter()
                .map(|page| page.parameter(index).cloned())
                .collect::<SddsResult<Vec<Value>>>()?;
            ColumnValues::from_values(ty, &values)
        })
        .collect::<SddsResult<Vec<_>>>()?;
    let columns = gathered
        .iter()
        .zip(keys)
        .map(|(values, key)| KeyColumn::new(values, key, numeric_high))
        .collect::<Vec<_>>();
    sort_order(&columns)
}
