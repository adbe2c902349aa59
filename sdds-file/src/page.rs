use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_layout::{Definition, Layout};
use sdds_mask::{FlagOp, Mask};
use sdds_scalar::text::parse_value;
use sdds_scalar::{ColumnValues, Value};

/// The value of one array on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    /// Extent of each dimension.
    pub dimensions: Vec<usize>,
    /// Elements in row-major order; `product(dimensions)` of them.
    pub values: ColumnValues,
}

impl ArrayValue {
    /// An array of zero elements with `rank` zero-length dimensions.
    pub fn empty(def: &sdds_layout::ArrayDefinition) -> Self {
        Self {
            dimensions: vec![0; def.dimensions],
            values: ColumnValues::new(def.sdds_type),
        }
    }

    /// Number of elements implied by the dimensions.
    pub fn element_count(&self) -> usize {
        self.dimensions.iter().product()
    }
}

/// One page of data conforming to a [`Layout`].
///
/// Every column holds exactly [`Page::row_count`] values and the row flags have the same length.
/// `capacity` bounds the rows addressable through [`Page::set_row`].
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    parameters: Vec<Value>,
    arrays: Vec<ArrayValue>,
    columns: Vec<ColumnValues>,
    rows: usize,
    capacity: usize,
    row_flags: Mask,
    column_flags: Mask,
}

impl Page {
    /// An empty page for `layout` with room for `capacity` rows.
    pub fn new(layout: &Layout, capacity: usize) -> SddsResult<Self> {
        let parameters = layout
            .parameters()
            .iter()
            .map(|def| match &def.fixed_value {
                Some(literal) => parse_value(def.sdds_type, literal),
                None => Ok(Value::zero(def.sdds_type)),
            })
            .collect::<SddsResult<Vec<_>>>()?;
        let arrays = layout.arrays().iter().map(ArrayValue::empty).collect();
        let columns = layout
            .columns()
            .iter()
            .map(|def| {
                let mut values = ColumnValues::new(def.sdds_type);
                values.try_reserve(capacity)?;
                Ok(values)
            })
            .collect::<SddsResult<Vec<_>>>()?;
        Ok(Self {
            parameters,
            arrays,
            columns,
            rows: 0,
            capacity,
            row_flags: Mask::new_true(0),
            column_flags: Mask::new_true(layout.columns().len()),
        })
    }

    /// Number of valid rows.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Rows addressable by [`Page::set_row`].
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All parameter values, in definition order.
    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// The parameter value at `index`.
    pub fn parameter(&self, index: usize) -> SddsResult<&Value> {
        self.parameters
            .get(index)
            .ok_or_else(|| sdds_err!(NotFound: "parameter index {} out of range", index))
    }

    /// Store a parameter value, converting it to the parameter's type.
    pub fn set_parameter(&mut self, index: usize, value: &Value) -> SddsResult<()> {
        let slot = self
            .parameters
            .get_mut(index)
            .ok_or_else(|| sdds_err!(NotFound: "parameter index {} out of range", index))?;
        *slot = value.cast(slot.sdds_type())?;
        Ok(())
    }

    /// All arrays, in definition order.
    pub fn arrays(&self) -> &[ArrayValue] {
        &self.arrays
    }

    /// The array at `index`.
    pub fn array(&self, index: usize) -> SddsResult<&ArrayValue> {
        self.arrays
            .get(index)
            .ok_or_else(|| sdds_err!(NotFound: "array index {} out of range", index))
    }

    /// Store an array. The number of values must equal the product of `dimensions` and the
    /// number of dimensions must match the definition.
    pub fn set_array(
        &mut self,
        index: usize,
        dimensions: Vec<usize>,
        values: &ColumnValues,
    ) -> SddsResult<()> {
        let slot = self
            .arrays
            .get_mut(index)
            .ok_or_else(|| sdds_err!(NotFound: "array index {} out of range", index))?;
        if dimensions.len() != slot.dimensions.len() {
            sdds_bail!(
                ValueOutOfRange: "array has {} dimensions, {} given",
                slot.dimensions.len(),
                dimensions.len()
            );
        }
        let expected: usize = dimensions.iter().product();
        if expected != values.len() {
            sdds_bail!(
                ValueOutOfRange: "array dimensions {:?} need {} values, {} given",
                dimensions,
                expected,
                values.len()
            );
        }
        slot.values = values.cast(slot.values.sdds_type())?;
        slot.dimensions = dimensions;
        Ok(())
    }

    /// All columns, in definition order.
    pub fn columns(&self) -> &[ColumnValues] {
        &self.columns
    }

    /// The column at `index`.
    pub fn column(&self, index: usize) -> SddsResult<&ColumnValues> {
        self.columns
            .get(index)
            .ok_or_else(|| sdds_err!(NotFound: "column index {} out of range", index))
    }

    fn resize_rows(&mut self, rows: usize) -> SddsResult<()> {
        if rows > self.capacity {
            let extra = rows - self.capacity;
            for column in &mut self.columns {
                column.try_reserve(extra)?;
            }
            self.capacity = rows;
        }
        for column in &mut self.columns {
            column.resize(rows);
        }
        self.row_flags.resize(rows, true);
        self.rows = rows;
        Ok(())
    }

    /// Set the row count, zero-filling new rows and growing the capacity as needed.
    pub fn set_row_count(&mut self, rows: usize) -> SddsResult<()> {
        self.resize_rows(rows)
    }

    /// Store a whole column, setting the row count of the page.
    ///
    /// Once any column data is present, every later column must have the same length.
    pub fn set_column(&mut self, index: usize, values: &ColumnValues) -> SddsResult<()> {
        let ty = self.column(index)?.sdds_type();
        if self.rows != 0 && values.len() != self.rows {
            sdds_bail!(
                ValueOutOfRange: "column has {} rows but the page has {}",
                values.len(),
                self.rows
            );
        }
        let values = values.cast(ty)?;
        if self.rows == 0 {
            self.resize_rows(values.len())?;
        }
        self.columns[index] = values;
        Ok(())
    }

    /// Store one value. `row` must be below the capacity; the row count grows to cover it.
    pub fn set_value(&mut self, column: usize, row: usize, value: &Value) -> SddsResult<()> {
        self.column(column)?;
        self.ensure_row(row)?;
        self.columns[column].set(row, value)
    }

    /// Store several values of one row, given as `(column index, value)` pairs. Nothing is stored
    /// unless every value converts.
    pub fn set_row(&mut self, row: usize, values: &[(usize, Value)]) -> SddsResult<()> {
        let cast = values
            .iter()
            .map(|(column, value)| Ok((*column, value.cast(self.column(*column)?.sdds_type())?)))
            .collect::<SddsResult<Vec<_>>>()?;
        self.ensure_row(row)?;
        for (column, value) in cast {
            self.columns[column].set(row, &value)?;
        }
        Ok(())
    }

    fn ensure_row(&mut self, row: usize) -> SddsResult<()> {
        if row >= self.capacity {
            sdds_bail!(
                ValueOutOfRange: "row {} is beyond the page capacity {}",
                row,
                self.capacity
            );
        }
        if row >= self.rows {
            self.resize_rows(row + 1)?;
        }
        Ok(())
    }

    /// The value of one cell.
    pub fn value(&self, column: usize, row: usize) -> SddsResult<Value> {
        self.column(column)?.get(row).ok_or_else(|| {
            sdds_err!(ValueOutOfRange: "row {} out of range for {} rows", row, self.rows)
        })
    }

    /// Grow the capacity by `delta` rows.
    pub fn lengthen_table(&mut self, delta: usize) -> SddsResult<()> {
        for column in &mut self.columns {
            column.try_reserve(self.capacity + delta - column.len())?;
        }
        self.capacity += delta;
        Ok(())
    }

    /// Row flags of interest.
    pub fn row_flags(&self) -> &Mask {
        &self.row_flags
    }

    /// Column flags of interest.
    pub fn column_flags(&self) -> &Mask {
        &self.column_flags
    }

    /// Combine newly selected rows into the row flags.
    pub fn flag_rows(&mut self, selected: &[bool], op: FlagOp) -> SddsResult<()> {
        self.row_flags.combine(selected, op)
    }

    /// Replace the row flags.
    pub fn assert_row_flags(&mut self, flags: &[bool]) -> SddsResult<()> {
        self.flag_rows(flags, FlagOp::Set)
    }

    /// Set or clear every row flag.
    pub fn set_all_rows_of_interest(&mut self, value: bool) {
        self.row_flags.set_all(value);
    }

    /// Combine newly selected columns into the column flags.
    pub fn flag_columns(&mut self, selected: &[bool], op: FlagOp) -> SddsResult<()> {
        self.column_flags.combine(selected, op)
    }

    /// Number of rows flagged as of interest.
    pub fn count_rows_of_interest(&self) -> usize {
        self.row_flags.true_count()
    }

    /// Indices of the rows of interest, ascending.
    pub fn rows_of_interest(&self) -> Vec<usize> {
        self.row_flags.indices()
    }

    /// Exchange two rows in every column, flags included.
    pub fn swap_rows(&mut self, a: usize, b: usize) -> SddsResult<()> {
        if a >= self.rows || b >= self.rows {
            sdds_bail!(ValueOutOfRange: "cannot swap rows {} and {} of {}", a, b, self.rows);
        }
        for column in &mut self.columns {
            column.swap(a, b);
        }
        self.row_flags.swap(a, b);
        Ok(())
    }

    /// Reorder rows so that row `i` becomes the old row `order[i]`. `order` must be a
    /// permutation of the row indices.
    pub fn permute_rows(&mut self, order: &[usize]) -> SddsResult<()> {
        if order.len() != self.rows {
            sdds_bail!(
                ValueOutOfRange: "permutation has {} entries for {} rows",
                order.len(),
                self.rows
            );
        }
        let mut seen = vec![false; self.rows];
        for &i in order {
            match seen.get_mut(i) {
                Some(s) if !*s => *s = true,
                _ => sdds_bail!("row order is not a permutation"),
            }
        }
        for column in &mut self.columns {
            column.permute(order);
        }
        self.row_flags.permute(order);
        Ok(())
    }

    /// Drop the rows not of interest. Every remaining row is of interest.
    pub fn delete_unset_rows(&mut self) {
        let flags = self.row_flags.to_bools();
        for column in &mut self.columns {
            column.retain_flags(&flags);
        }
        self.rows = self.row_flags.true_count();
        self.row_flags = Mask::new_true(self.rows);
    }

    /// The rows of interest of a column, promoted to `f64`.
    pub fn column_in_doubles(&self, index: usize) -> SddsResult<Vec<f64>> {
        let column = self.column(index)?;
        if column.sdds_type().is_numeric() {
            let all = column.to_f64()?;
            Ok(self.rows_of_interest().into_iter().map(|r| all[r]).collect())
        } else {
            sdds_bail!(TypeMismatch: "column of type {} is not numeric", column.sdds_type())
        }
    }

    /// A copy holding only the rows of interest, all flagged.
    pub fn compacted(&self) -> Self {
        let mut page = self.clone();
        if page.count_rows_of_interest() != page.rows {
            page.delete_unset_rows();
        }
        page
    }

    /// Check that this page fits `layout`: same definitions, same types.
    pub fn conforms_to(&self, layout: &Layout) -> bool {
        self.parameters.len() == layout.parameters().len()
            && self.arrays.len() == layout.arrays().len()
            && self.columns.len() == layout.columns().len()
            && self
                .columns
                .iter()
                .zip(layout.columns().iter())
                .all(|(c, d)| Some(c.sdds_type()) == d.sdds_type())
    }

    /// Assemble a page from decoded parts. Column lengths must agree.
    pub(crate) fn from_parts(
        parameters: Vec<Value>,
        arrays: Vec<ArrayValue>,
        columns: Vec<ColumnValues>,
        rows: usize,
    ) -> SddsResult<Self> {
        if columns.iter().any(|c| c.len() != rows) {
            sdds_bail!(TruncatedPage: "column lengths disagree with the row count {}", rows);
        }
        let column_count = columns.len();
        Ok(Self {
            parameters,
            arrays,
            columns,
            rows,
            capacity: rows,
            row_flags: Mask::new_true(rows),
            column_flags: Mask::new_true(column_count),
        })
    }
}
