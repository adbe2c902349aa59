use std::fmt::{Display, Formatter};
use std::str::FromStr;

use log::debug;
use sdds_dtype::SddsType;
use sdds_error::{SddsError, SddsResult, sdds_bail, sdds_err};

use crate::{
    ArrayDefinition, AssociateDefinition, ColumnDefinition, Definition, DefinitionKind, InfoField,
    ParameterDefinition, SymbolTable,
};

/// The header version written by this crate.
pub const SDDS_VERSION: u32 = 5;

/// How page data is encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Whitespace-separated text.
    Ascii,
    /// Fixed-width native values.
    #[default]
    Binary,
}

impl Encoding {
    /// The `&data mode=` spelling.
    pub fn keyword(self) -> &'static str {
        match self {
            Encoding::Ascii => "ascii",
            Encoding::Binary => "binary",
        }
    }
}

impl FromStr for Encoding {
    type Err = SddsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" => Ok(Encoding::Ascii),
            "binary" => Ok(Encoding::Binary),
            _ => sdds_bail!("unknown data mode \"{}\"", s),
        }
    }
}

/// Whether column data is laid out row by row or column by column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MajorOrder {
    /// One row after another.
    #[default]
    Row,
    /// One column after another.
    Column,
}

impl MajorOrder {
    /// The `&data major_order=` spelling.
    pub fn keyword(self) -> &'static str {
        match self {
            MajorOrder::Row => "row",
            MajorOrder::Column => "column",
        }
    }
}

impl FromStr for MajorOrder {
    type Err = SddsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "row" => Ok(MajorOrder::Row),
            "column" => Ok(MajorOrder::Column),
            _ => sdds_bail!("unknown major order \"{}\"", s),
        }
    }
}

/// Byte order of binary page data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Most significant byte first.
    Big,
    /// Least significant byte first.
    Little,
}

impl Endianness {
    /// The byte order of the running host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// The other byte order.
    pub fn swapped(self) -> Self {
        match self {
            Endianness::Big => Endianness::Little,
            Endianness::Little => Endianness::Big,
        }
    }

    /// The `&data endian=` spelling.
    pub fn keyword(self) -> &'static str {
        match self {
            Endianness::Big => "big",
            Endianness::Little => "little",
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Self::native()
    }
}

impl Display for Endianness {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-endian", self.keyword())
    }
}

impl FromStr for Endianness {
    type Err = SddsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().trim_end_matches("-endian") {
            "big" => Ok(Endianness::Big),
            "little" => Ok(Endianness::Little),
            _ => sdds_bail!("unknown byte order \"{}\"", s),
        }
    }
}

/// The `&data` directive: how pages following the header are encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMode {
    /// ASCII or binary.
    pub encoding: Encoding,
    /// Row- or column-major column data.
    pub major_order: MajorOrder,
    /// Declared byte order of binary data; `None` when the stream does not say.
    pub endianness: Option<Endianness>,
    /// ASCII rows may span this many lines.
    pub lines_per_row: usize,
    /// ASCII pages omit the row count and end at a blank line.
    pub no_row_counts: bool,
    /// Lines to skip after the header before the first page.
    pub additional_header_lines: usize,
}

impl Default for DataMode {
    fn default() -> Self {
        Self {
            encoding: Encoding::Binary,
            major_order: MajorOrder::Row,
            endianness: None,
            lines_per_row: 1,
            no_row_counts: false,
            additional_header_lines: 0,
        }
    }
}

impl DataMode {
    /// ASCII, row-major.
    pub fn ascii() -> Self {
        Self {
            encoding: Encoding::Ascii,
            ..Self::default()
        }
    }

    /// Binary, row-major, host byte order.
    pub fn binary() -> Self {
        Self {
            endianness: Some(Endianness::native()),
            ..Self::default()
        }
    }

    /// The declared byte order, or the host's.
    pub fn endianness_or_native(&self) -> Endianness {
        self.endianness.unwrap_or_default()
    }
}

/// The schema of a dataset.
///
/// A layout is mutable until [`Layout::freeze`]; afterwards only metadata may change, and the
/// type of a definition only until the first page is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// File-level description text.
    pub description: Option<String>,
    /// File-level contents text.
    pub contents: Option<String>,
    /// Header version.
    pub version: u32,
    /// Encoding of the pages.
    pub data_mode: DataMode,
    parameters: SymbolTable<ParameterDefinition>,
    arrays: SymbolTable<ArrayDefinition>,
    columns: SymbolTable<ColumnDefinition>,
    associates: SymbolTable<AssociateDefinition>,
    frozen: bool,
    data_written: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            description: None,
            contents: None,
            version: SDDS_VERSION,
            data_mode: DataMode::default(),
            parameters: SymbolTable::new(),
            arrays: SymbolTable::new(),
            columns: SymbolTable::new(),
            associates: SymbolTable::new(),
            frozen: false,
            data_written: false,
        }
    }
}

impl Layout {
    /// An empty, mutable layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameter definitions.
    pub fn parameters(&self) -> &SymbolTable<ParameterDefinition> {
        &self.parameters
    }

    /// Array definitions.
    pub fn arrays(&self) -> &SymbolTable<ArrayDefinition> {
        &self.arrays
    }

    /// Column definitions.
    pub fn columns(&self) -> &SymbolTable<ColumnDefinition> {
        &self.columns
    }

    /// Associate definitions.
    pub fn associates(&self) -> &SymbolTable<AssociateDefinition> {
        &self.associates
    }

    /// True once the layout has been published.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Publish the layout. Definitions can no longer be added or removed.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// A mutable copy of a published layout, for building a related dataset.
    pub fn thawed(&self) -> Self {
        Self {
            frozen: false,
            data_written: false,
            ..self.clone()
        }
    }

    /// Record that a page has been written; types are fixed from here on.
    pub fn mark_data_written(&mut self) {
        self.data_written = true;
    }

    /// True once a page has been written.
    pub fn data_written(&self) -> bool {
        self.data_written
    }

    fn ensure_mutable(&self, what: &str) -> SddsResult<()> {
        if self.frozen {
            sdds_bail!(WrongState: "cannot {} after the layout is written", what);
        }
        Ok(())
    }

    /// Add a parameter definition, returning its index.
    pub fn define_parameter(&mut self, definition: ParameterDefinition) -> SddsResult<usize> {
        self.ensure_mutable("define a parameter")?;
        if let Some(literal) = &definition.fixed_value {
            sdds_scalar::text::parse_value(definition.sdds_type, literal).map_err(|e| {
                e.with_context(format!("fixed value of parameter {}", definition.name))
            })?;
        }
        self.parameters.define(definition)
    }

    /// Add an array definition, returning its index.
    pub fn define_array(&mut self, definition: ArrayDefinition) -> SddsResult<usize> {
        self.ensure_mutable("define an array")?;
        self.arrays.define(definition)
    }

    /// Add a column definition, returning its index.
    pub fn define_column(&mut self, definition: ColumnDefinition) -> SddsResult<usize> {
        self.ensure_mutable("define a column")?;
        self.columns.define(definition)
    }

    /// Add an associate definition, returning its index.
    pub fn define_associate(&mut self, definition: AssociateDefinition) -> SddsResult<usize> {
        self.ensure_mutable("define an associate")?;
        self.associates.define(definition)
    }

    /// Copy one parameter definition from `source`, optionally under a new name.
    pub fn transfer_parameter_definition(
        &mut self,
        source: &Layout,
        name: &str,
        rename: Option<&str>,
    ) -> SddsResult<usize> {
        let def = renamed(source.parameters.get_by_name(name)?, rename);
        self.define_parameter(def)
    }

    /// Copy one array definition from `source`, optionally under a new name.
    pub fn transfer_array_definition(
        &mut self,
        source: &Layout,
        name: &str,
        rename: Option<&str>,
    ) -> SddsResult<usize> {
        let def = renamed(source.arrays.get_by_name(name)?, rename);
        self.define_array(def)
    }

    /// Copy one column definition from `source`, optionally under a new name.
    pub fn transfer_column_definition(
        &mut self,
        source: &Layout,
        name: &str,
        rename: Option<&str>,
    ) -> SddsResult<usize> {
        let def = renamed(source.columns.get_by_name(name)?, rename);
        self.define_column(def)
    }

    /// Copy one associate definition from `source`, optionally under a new name.
    pub fn transfer_associate_definition(
        &mut self,
        source: &Layout,
        name: &str,
        rename: Option<&str>,
    ) -> SddsResult<usize> {
        let def = renamed(source.associates.get_by_name(name)?, rename);
        self.define_associate(def)
    }

    /// Replace the parameter definition of the same name, or add it.
    pub fn replace_parameter(&mut self, definition: ParameterDefinition) -> SddsResult<usize> {
        self.ensure_mutable("replace a parameter")?;
        match self.parameters.index_of(&definition.name) {
            Some(index) => {
                self.parameters.replace(index, definition)?;
                Ok(index)
            }
            None => self.parameters.define(definition),
        }
    }

    /// Drop every column for which `keep` is false.
    pub fn retain_columns(&mut self, keep: &[bool]) -> SddsResult<()> {
        self.ensure_mutable("delete columns")?;
        self.columns.retain_indices(keep);
        Ok(())
    }

    /// Drop every parameter for which `keep` is false.
    pub fn retain_parameters(&mut self, keep: &[bool]) -> SddsResult<()> {
        self.ensure_mutable("delete parameters")?;
        self.parameters.retain_indices(keep);
        Ok(())
    }

    /// Drop every array for which `keep` is false.
    pub fn retain_arrays(&mut self, keep: &[bool]) -> SddsResult<()> {
        self.ensure_mutable("delete arrays")?;
        self.arrays.retain_indices(keep);
        Ok(())
    }

    /// Read one attribute of a named definition.
    pub fn information(
        &self,
        kind: DefinitionKind,
        name: &str,
        field: InfoField,
    ) -> SddsResult<Option<String>> {
        match kind {
            DefinitionKind::Parameter => self.parameters.get_by_name(name)?.info(field),
            DefinitionKind::Array => self.arrays.get_by_name(name)?.info(field),
            DefinitionKind::Column => self.columns.get_by_name(name)?.info(field),
            DefinitionKind::Associate => self.associates.get_by_name(name)?.info(field),
        }
    }

    /// Change one attribute of a named definition.
    ///
    /// Before publication any field may change. Afterwards only metadata fields may, and `type`
    /// only until the first page is written.
    pub fn change_information(
        &mut self,
        kind: DefinitionKind,
        name: &str,
        field: InfoField,
        value: &str,
    ) -> SddsResult<()> {
        if self.frozen && !field.is_metadata() {
            sdds_bail!(
                WrongState: "cannot change {} of {} {} after the layout is written",
                field.attribute(),
                kind,
                name
            );
        }
        if field == InfoField::Type && self.data_written {
            sdds_bail!(
                WrongState: "cannot change the type of {} {} after data is written",
                kind,
                name
            );
        }
        debug!("{} {}: {} = {:?}", kind, name, field.attribute(), value);
        match kind {
            DefinitionKind::Parameter => {
                let index = self.parameters.lookup(name)?;
                self.parameters.set_info(index, field, value)
            }
            DefinitionKind::Array => {
                let index = self.arrays.lookup(name)?;
                self.arrays.set_info(index, field, value)
            }
            DefinitionKind::Column => {
                let index = self.columns.lookup(name)?;
                self.columns.set_info(index, field, value)
            }
            DefinitionKind::Associate => {
                let index = self.associates.lookup(name)?;
                self.associates.set_info(index, field, value)
            }
        }
    }

    /// Parameters whose values travel in page data, i.e. those without a fixed value.
    pub fn stored_parameters(&self) -> impl Iterator<Item = (usize, &ParameterDefinition)> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.fixed_value.is_none())
    }

    /// Bytes per row of binary column data, or `None` if any column holds strings.
    pub fn row_stride(&self) -> Option<usize> {
        self.columns
            .iter()
            .map(|c| c.sdds_type.size())
            .sum::<Option<usize>>()
    }

    /// Type of the named column.
    pub fn column_type(&self, name: &str) -> SddsResult<SddsType> {
        Ok(self.columns.get_by_name(name)?.sdds_type)
    }

    /// Type of the named parameter.
    pub fn parameter_type(&self, name: &str) -> SddsResult<SddsType> {
        Ok(self.parameters.get_by_name(name)?.sdds_type)
    }

    /// Type of the named array.
    pub fn array_type(&self, name: &str) -> SddsResult<SddsType> {
        Ok(self.arrays.get_by_name(name)?.sdds_type)
    }

    /// Fails with `NotFound` unless the column exists.
    pub fn require_column(&self, name: &str) -> SddsResult<usize> {
        self.columns
            .index_of(name)
            .ok_or_else(|| sdds_err!(NotFound: "column {} does not exist", name))
    }
}

fn renamed<D: Definition>(def: &D, rename: Option<&str>) -> D {
    let mut def = def.clone();
    if let Some(name) = rename {
        // Name is the one field every kind accepts.
        let _ = def.set_info(InfoField::Name, name);
    }
    def
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    fn sample() -> Layout {
        let mut layout = Layout::new();
        layout
            .define_parameter(ParameterDefinition::new("p", SddsType::String))
            .unwrap();
        layout
            .define_column(ColumnDefinition::new("x", SddsType::Double).units("m"))
            .unwrap();
        layout
            .define_column(ColumnDefinition::new("n", SddsType::Short))
            .unwrap();
        layout
    }

    #[test]
    fn frozen_layout_rejects_definitions() {
        let mut layout = sample();
        layout.freeze();
        let err = layout
            .define_column(ColumnDefinition::new("y", SddsType::Long))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongState);
    }

    #[rstest]
    #[case(InfoField::Units, "mm", false, true)]
    #[case(InfoField::Type, "float", false, true)]
    #[case(InfoField::Type, "float", true, false)]
    #[case(InfoField::Name, "z", false, false)]
    fn change_after_publish(
        #[case] field: InfoField,
        #[case] value: &str,
        #[case] written: bool,
        #[case] allowed: bool,
    ) {
        let mut layout = sample();
        layout.freeze();
        if written {
            layout.mark_data_written();
        }
        let result = layout.change_information(DefinitionKind::Column, "x", field, value);
        assert_eq!(result.is_ok(), allowed);
        if allowed {
            assert_eq!(
                layout
                    .information(DefinitionKind::Column, "x", field)
                    .unwrap()
                    .as_deref(),
                Some(value)
            );
        }
    }

    #[test]
    fn transfer_with_rename() {
        let mut source = sample();
        source.freeze();
        let mut dest = Layout::new();
        dest.transfer_column_definition(&source, "x", Some("x2"))
            .unwrap();
        let def = dest.columns().get_by_name("x2").unwrap();
        assert_eq!(def.units.as_deref(), Some("m"));
        assert!(dest.columns().index_of("x").is_none());
        assert_eq!(
            dest.transfer_column_definition(&source, "nope", None)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn row_stride() {
        let mut layout = Layout::new();
        layout
            .define_column(ColumnDefinition::new("a", SddsType::Double))
            .unwrap();
        layout
            .define_column(ColumnDefinition::new("b", SddsType::Short))
            .unwrap();
        assert_eq!(layout.row_stride(), Some(10));
        assert_eq!(sample().row_stride(), Some(10));
        layout
            .define_column(ColumnDefinition::new("s", SddsType::String))
            .unwrap();
        assert_eq!(layout.row_stride(), None);
    }

    #[test]
    fn fixed_value_must_parse() {
        let mut layout = Layout::new();
        let err = layout
            .define_parameter(ParameterDefinition::new("p", SddsType::Long).fixed_value("abc"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(layout.stored_parameters().count(), 0);
    }

    #[rstest]
    #[case("little", Endianness::Little)]
    #[case("BIG", Endianness::Big)]
    #[case("big-endian", Endianness::Big)]
    fn parse_endianness(#[case] text: &str, #[case] expected: Endianness) {
        assert_eq!(text.parse::<Endianness>().unwrap(), expected);
    }
}
