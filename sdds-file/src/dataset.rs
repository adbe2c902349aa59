use std::io::Write;

use log::debug;
use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_layout::header::{read_header, write_header};
use sdds_layout::{
    ArrayDefinition, AssociateDefinition, ColumnDefinition, DataMode, Definition, DefinitionKind,
    Encoding, InfoField, Layout, MatchOptions, ParameterDefinition, WildcardPattern,
};
use sdds_mask::FlagOp;
use sdds_scalar::{ColumnValues, Value};

use crate::ascii::{self, AsciiStyle, DEFAULT_LINE_LIMIT};
use crate::binary::{BinaryDecoder, encode_page};
use crate::io::{InputStream, Location, OutputStream};
use crate::options::{InputOptions, OutputOptions};
use crate::page::{ArrayValue, Page};

/// Where a dataset is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetState {
    /// Not attached to any stream.
    Closed,
    /// Header read; no page loaded yet.
    OpenRead,
    /// Accepting definitions; nothing written yet.
    OpenWrite,
    /// The layout is fixed and no page is current.
    LayoutFrozen,
    /// A page is being filled or has just been read.
    PageInProgress,
}

/// How [`SddsDataset::initialize_copy`] treats its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyMode {
    /// Create or truncate the destination.
    FreshWrite,
    /// Add pages to an existing file with a compatible layout.
    AppendWrite,
    /// Keep pages in memory for later random access.
    InMemory,
}

/// How [`SddsDataset::transfer_all_parameter_definitions`] resolves name collisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ParameterTransfer {
    /// The definition already present wins.
    #[default]
    KeepOld,
    /// The transferred definition replaces the present one.
    Overwrite,
}

/// Accepted types for the `check_*` queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TypeConstraint {
    /// Any type.
    #[default]
    Any,
    /// Any numeric type, character included.
    Numeric,
    /// Any integer type.
    Integer,
    /// float, double or longdouble.
    Floating,
    /// Exactly this type.
    Exact(SddsType),
}

impl TypeConstraint {
    fn accepts(self, ty: SddsType) -> bool {
        match self {
            TypeConstraint::Any => true,
            TypeConstraint::Numeric => ty.is_numeric(),
            TypeConstraint::Integer => ty.is_integer(),
            TypeConstraint::Floating => ty.is_float(),
            TypeConstraint::Exact(t) => t == ty,
        }
    }
}

/// Outcome of the `check_*` queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    /// The definition exists and satisfies the constraints.
    Ok,
    /// The units differ from those required.
    WrongUnits,
    /// The type is not acceptable.
    WrongType,
    /// No definition of that name.
    NotFound,
}

enum Sink {
    Stream(OutputStream),
    Memory(Vec<Page>),
}

/// A dataset bound to an input or output: its layout, the current page and the stream state.
///
/// Reading: [`SddsDataset::initialize_input`], then [`SddsDataset::read_page`] until it returns
/// `None`. Writing: [`SddsDataset::initialize_output`] or [`SddsDataset::initialize_copy`],
/// definitions, [`SddsDataset::write_layout`], then [`SddsDataset::start_page`] (or
/// [`SddsDataset::copy_page`]) and [`SddsDataset::write_page`] per page. Finish with
/// [`SddsDataset::terminate`].
pub struct SddsDataset {
    state: DatasetState,
    layout: Layout,
    page: Option<Page>,
    page_number: usize,
    location: Option<Location>,
    input: Option<InputStream>,
    decoder: BinaryDecoder,
    sink: Option<Sink>,
    line_limit: usize,
    header_present: bool,
    popen_used: bool,
}

impl Default for SddsDataset {
    fn default() -> Self {
        Self {
            state: DatasetState::Closed,
            layout: Layout::new(),
            page: None,
            page_number: 0,
            location: None,
            input: None,
            decoder: BinaryDecoder::default(),
            sink: None,
            line_limit: DEFAULT_LINE_LIMIT,
            header_present: false,
            popen_used: false,
        }
    }
}

impl SddsDataset {
    /// A closed dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `location` for reading and parse its header.
    pub fn initialize_input(
        &mut self,
        location: impl Into<Location>,
        options: &InputOptions,
    ) -> SddsResult<()> {
        self.require_state(&[DatasetState::Closed], "open for reading")?;
        let location = location.into();
        let mut input = InputStream::open(&location, options.force_subprocess())?;
        let layout = read_header(&mut input)
            .map_err(|e| e.with_context(format!("reading header of {location}")))?;
        debug!(
            "opened {} ({:?}, {} columns)",
            location,
            layout.data_mode.encoding,
            layout.columns().len()
        );
        self.decoder = BinaryDecoder::new(layout.data_mode.endianness);
        self.popen_used = input.popen_used();
        self.layout = layout;
        self.input = Some(input);
        self.location = Some(location);
        self.page_number = 0;
        self.state = DatasetState::OpenRead;
        Ok(())
    }

    /// Create `location` for writing. Definitions may be added until [`Self::write_layout`].
    pub fn initialize_output(
        &mut self,
        location: impl Into<Location>,
        options: &OutputOptions,
    ) -> SddsResult<()> {
        self.require_state(&[DatasetState::Closed], "open for writing")?;
        let location = location.into();
        let out = OutputStream::create(&location)?;
        let mut layout = Layout::new();
        layout.data_mode = writer_data_mode(options.data_mode().clone());
        layout.description = options.description().map(str::to_string);
        layout.contents = options.contents().map(str::to_string);
        self.begin_writing(layout, Sink::Stream(out), Some(location), options.line_limit());
        Ok(())
    }

    /// Start writing a dataset whose layout is a copy of `source`'s.
    ///
    /// `location` is ignored for [`CopyMode::InMemory`]; `None` otherwise means standard output.
    /// In [`CopyMode::AppendWrite`] the destination must exist with a layout of the same
    /// definitions; its header and data mode are kept and pages continue its numbering.
    pub fn initialize_copy(
        &mut self,
        source: &SddsDataset,
        location: Option<Location>,
        mode: CopyMode,
    ) -> SddsResult<()> {
        self.require_state(&[DatasetState::Closed], "initialize a copy")?;
        if source.state == DatasetState::Closed || !source.layout.is_frozen() {
            sdds_bail!(WrongState: "the copy source has no published layout");
        }
        let location = location.unwrap_or(Location::Pipe);
        match mode {
            CopyMode::FreshWrite => {
                let out = OutputStream::create(&location)?;
                let mut layout = source.layout.thawed();
                layout.data_mode = writer_data_mode(layout.data_mode);
                self.begin_writing(layout, Sink::Stream(out), Some(location), source.line_limit);
            }
            CopyMode::InMemory => {
                let layout = source.layout.thawed();
                self.begin_writing(layout, Sink::Memory(Vec::new()), None, source.line_limit);
            }
            CopyMode::AppendWrite => {
                let (existing, pages) = scan_existing(&location)?;
                if !same_definitions(&existing, &source.layout) {
                    sdds_bail!(
                        "cannot append to {}: its definitions differ from the source",
                        location
                    );
                }
                let out = OutputStream::append(&location)?;
                let mut layout = existing;
                layout.mark_data_written();
                debug!("appending to {} after {} pages", location, pages);
                self.begin_writing(layout, Sink::Stream(out), Some(location), source.line_limit);
                self.header_present = true;
                self.page_number = pages;
            }
        }
        Ok(())
    }

    fn begin_writing(
        &mut self,
        layout: Layout,
        sink: Sink,
        location: Option<Location>,
        line_limit: usize,
    ) {
        self.layout = layout;
        self.sink = Some(sink);
        self.location = location;
        self.line_limit = line_limit;
        self.page = None;
        self.page_number = 0;
        self.header_present = false;
        self.state = DatasetState::OpenWrite;
    }

    fn require_state(&self, allowed: &[DatasetState], what: &str) -> SddsResult<()> {
        if !allowed.contains(&self.state) {
            sdds_bail!(WrongState: "cannot {} while the dataset is {:?}", what, self.state);
        }
        Ok(())
    }

    fn require_writer(&self, allowed: &[DatasetState], what: &str) -> SddsResult<()> {
        self.require_state(allowed, what)?;
        if self.sink.is_none() {
            sdds_bail!(WrongState: "cannot {} on a dataset opened for reading", what);
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DatasetState {
        self.state
    }

    /// The layout. Frozen once written or read.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The stream this dataset is bound to.
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// True when the input was read through a decompressor child process, which makes it
    /// impossible to reread.
    pub fn popen_used(&self) -> bool {
        self.popen_used
    }

    /// Number of the last page read or written, starting at 1.
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    /// The current page.
    pub fn page(&self) -> SddsResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| sdds_err!(WrongState: "no page is loaded"))
    }

    fn page_mut(&mut self) -> SddsResult<&mut Page> {
        if self.state != DatasetState::PageInProgress {
            sdds_bail!(WrongState: "no page is in progress");
        }
        self.page
            .as_mut()
            .ok_or_else(|| sdds_err!(WrongState: "no page is loaded"))
    }

    // Layout construction.

    /// Replace the data mode. Only before the layout is written.
    pub fn set_data_mode(&mut self, mode: DataMode) -> SddsResult<()> {
        self.require_writer(&[DatasetState::OpenWrite], "change the data mode")?;
        if self.header_present {
            sdds_bail!(WrongState: "cannot change the data mode of an appended file");
        }
        self.layout.data_mode = writer_data_mode(mode);
        Ok(())
    }

    /// Replace the file-level description and contents. Only before the layout is written.
    pub fn set_description(
        &mut self,
        description: Option<&str>,
        contents: Option<&str>,
    ) -> SddsResult<()> {
        self.require_writer(&[DatasetState::OpenWrite], "change the description")?;
        self.layout.description = description.map(str::to_string);
        self.layout.contents = contents.map(str::to_string);
        Ok(())
    }

    /// Add a parameter definition.
    pub fn define_parameter(&mut self, definition: ParameterDefinition) -> SddsResult<usize> {
        self.require_writer(&[DatasetState::OpenWrite], "define a parameter")?;
        self.layout.define_parameter(definition)
    }

    /// Add an array definition.
    pub fn define_array(&mut self, definition: ArrayDefinition) -> SddsResult<usize> {
        self.require_writer(&[DatasetState::OpenWrite], "define an array")?;
        self.layout.define_array(definition)
    }

    /// Add a column definition.
    pub fn define_column(&mut self, definition: ColumnDefinition) -> SddsResult<usize> {
        self.require_writer(&[DatasetState::OpenWrite], "define a column")?;
        self.layout.define_column(definition)
    }

    /// Add an associate definition.
    pub fn define_associate(&mut self, definition: AssociateDefinition) -> SddsResult<usize> {
        self.require_writer(&[DatasetState::OpenWrite], "define an associate")?;
        self.layout.define_associate(definition)
    }

    /// Add a column given only its name, units and type.
    pub fn define_simple_column(
        &mut self,
        name: &str,
        units: Option<&str>,
        ty: SddsType,
    ) -> SddsResult<usize> {
        let mut def = ColumnDefinition::new(name, ty);
        def.units = units.map(str::to_string);
        self.define_column(def)
    }

    /// Add a parameter given only its name, units and type.
    pub fn define_simple_parameter(
        &mut self,
        name: &str,
        units: Option<&str>,
        ty: SddsType,
    ) -> SddsResult<usize> {
        let mut def = ParameterDefinition::new(name, ty);
        def.units = units.map(str::to_string);
        self.define_parameter(def)
    }

    /// Copy one column definition from `source`, optionally renamed.
    pub fn transfer_column_definition(
        &mut self,
        source: &SddsDataset,
        name: &str,
        rename: Option<&str>,
    ) -> SddsResult<usize> {
        self.require_writer(&[DatasetState::OpenWrite], "transfer a column")?;
        self.layout
            .transfer_column_definition(&source.layout, name, rename)
    }

    /// Copy one parameter definition from `source`, optionally renamed.
    pub fn transfer_parameter_definition(
        &mut self,
        source: &SddsDataset,
        name: &str,
        rename: Option<&str>,
    ) -> SddsResult<usize> {
        self.require_writer(&[DatasetState::OpenWrite], "transfer a parameter")?;
        self.layout
            .transfer_parameter_definition(&source.layout, name, rename)
    }

    /// Copy one array definition from `source`, optionally renamed.
    pub fn transfer_array_definition(
        &mut self,
        source: &SddsDataset,
        name: &str,
        rename: Option<&str>,
    ) -> SddsResult<usize> {
        self.require_writer(&[DatasetState::OpenWrite], "transfer an array")?;
        self.layout
            .transfer_array_definition(&source.layout, name, rename)
    }

    /// Copy every column definition of `source` not already defined here.
    pub fn transfer_all_column_definitions(&mut self, source: &SddsDataset) -> SddsResult<()> {
        self.require_writer(&[DatasetState::OpenWrite], "transfer columns")?;
        for def in source.layout.columns().iter() {
            if self.layout.columns().index_of(&def.name).is_none() {
                self.layout.define_column(def.clone())?;
            }
        }
        Ok(())
    }

    /// Copy every array definition of `source` not already defined here.
    pub fn transfer_all_array_definitions(&mut self, source: &SddsDataset) -> SddsResult<()> {
        self.require_writer(&[DatasetState::OpenWrite], "transfer arrays")?;
        for def in source.layout.arrays().iter() {
            if self.layout.arrays().index_of(&def.name).is_none() {
                self.layout.define_array(def.clone())?;
            }
        }
        Ok(())
    }

    /// Copy every parameter definition of `source`, resolving collisions per `transfer`.
    pub fn transfer_all_parameter_definitions(
        &mut self,
        source: &SddsDataset,
        transfer: ParameterTransfer,
    ) -> SddsResult<()> {
        self.require_writer(&[DatasetState::OpenWrite], "transfer parameters")?;
        for def in source.layout.parameters().iter() {
            match (self.layout.parameters().index_of(&def.name), transfer) {
                (None, _) => {
                    self.layout.define_parameter(def.clone())?;
                }
                (Some(_), ParameterTransfer::KeepOld) => {}
                (Some(_), ParameterTransfer::Overwrite) => {
                    self.layout.replace_parameter(def.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Keep only the columns flagged in `keep`. Only before the layout is written.
    pub fn retain_columns(&mut self, keep: &[bool]) -> SddsResult<()> {
        self.require_writer(&[DatasetState::OpenWrite], "delete columns")?;
        self.layout.retain_columns(keep)
    }

    /// Keep only the parameters flagged in `keep`. Only before the layout is written.
    pub fn retain_parameters(&mut self, keep: &[bool]) -> SddsResult<()> {
        self.require_writer(&[DatasetState::OpenWrite], "delete parameters")?;
        self.layout.retain_parameters(keep)
    }

    /// Keep only the arrays flagged in `keep`. Only before the layout is written.
    pub fn retain_arrays(&mut self, keep: &[bool]) -> SddsResult<()> {
        self.require_writer(&[DatasetState::OpenWrite], "delete arrays")?;
        self.layout.retain_arrays(keep)
    }

    /// Read one attribute of a definition.
    pub fn information(
        &self,
        kind: DefinitionKind,
        name: &str,
        field: InfoField,
    ) -> SddsResult<Option<String>> {
        self.layout.information(kind, name, field)
    }

    /// Change one attribute of a definition.
    ///
    /// After the layout is written only metadata may change; a type only until the first page
    /// is written, and never while a page is in progress.
    pub fn change_information(
        &mut self,
        kind: DefinitionKind,
        name: &str,
        field: InfoField,
        value: &str,
    ) -> SddsResult<()> {
        if self.state == DatasetState::Closed {
            sdds_bail!(WrongState: "cannot change a definition of a closed dataset");
        }
        if field == InfoField::Type && self.state == DatasetState::PageInProgress {
            sdds_bail!(WrongState: "cannot change the type of {} {} during a page", kind, name);
        }
        self.layout.change_information(kind, name, field, value)
    }

    /// Publish the layout, writing the header unless the destination already has one.
    pub fn write_layout(&mut self) -> SddsResult<()> {
        self.require_writer(&[DatasetState::OpenWrite], "write the layout")?;
        self.layout.freeze();
        if let Some(Sink::Stream(out)) = self.sink.as_mut() {
            if !self.header_present {
                write_header(&self.layout, out)?;
                out.flush()?;
                self.header_present = true;
            }
        }
        self.state = DatasetState::LayoutFrozen;
        Ok(())
    }

    // Pages.

    /// Begin a new, empty page with room for `capacity` rows.
    pub fn start_page(&mut self, capacity: usize) -> SddsResult<()> {
        self.require_writer(
            &[DatasetState::LayoutFrozen, DatasetState::PageInProgress],
            "start a page",
        )?;
        self.page = Some(Page::new(&self.layout, capacity)?);
        self.state = DatasetState::PageInProgress;
        Ok(())
    }

    /// Grow the current page's capacity by `delta` rows.
    pub fn lengthen_table(&mut self, delta: usize) -> SddsResult<()> {
        self.page_mut()?.lengthen_table(delta)
    }

    /// Write the current page and return its number. Only rows of interest are written.
    pub fn write_page(&mut self) -> SddsResult<usize> {
        self.require_writer(&[DatasetState::PageInProgress], "write a page")?;
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| sdds_err!(WrongState: "no page is in progress"))?;
        let number = self.page_number + 1;
        match self.sink.as_mut() {
            Some(Sink::Memory(pages)) => pages.push(page.clone()),
            Some(Sink::Stream(out)) => {
                let mode = &self.layout.data_mode;
                let bytes = match mode.encoding {
                    Encoding::Ascii => {
                        let mut buf = Vec::new();
                        let style = AsciiStyle {
                            line_limit: self.line_limit,
                        };
                        ascii::write_page(&mut buf, &self.layout, page, number, style)?;
                        buf
                    }
                    Encoding::Binary => {
                        encode_page(&self.layout, page, mode.endianness_or_native())?.to_vec()
                    }
                };
                out.write_all(&bytes)?;
                out.flush()?;
            }
            None => sdds_bail!(WrongState: "dataset has no output"),
        }
        self.layout.mark_data_written();
        self.page_number = number;
        self.state = DatasetState::LayoutFrozen;
        Ok(number)
    }

    /// Read the next page, returning its number, or `None` at the end of the stream.
    pub fn read_page(&mut self) -> SddsResult<Option<usize>> {
        self.require_state(
            &[
                DatasetState::OpenRead,
                DatasetState::LayoutFrozen,
                DatasetState::PageInProgress,
            ],
            "read a page",
        )?;
        let input = self
            .input
            .as_mut()
            .ok_or_else(|| sdds_err!(WrongState: "dataset has no input"))?;
        let page = match self.layout.data_mode.encoding {
            Encoding::Ascii => ascii::read_page(input, &self.layout),
            Encoding::Binary => self.decoder.read_page(input, &self.layout),
        }
        .map_err(|e| e.with_context(format!("reading page {}", self.page_number + 1)))?;
        match page {
            Some(page) => {
                self.page = Some(page);
                self.page_number += 1;
                self.state = DatasetState::PageInProgress;
                Ok(Some(self.page_number))
            }
            None => {
                self.page = None;
                self.state = DatasetState::LayoutFrozen;
                Ok(None)
            }
        }
    }

    /// Start a page holding `source`'s current page, matched by name. Definitions missing from
    /// `source` are left at zero; row and column flags are carried over.
    pub fn copy_page(&mut self, source: &SddsDataset) -> SddsResult<()> {
        self.require_writer(
            &[DatasetState::LayoutFrozen, DatasetState::PageInProgress],
            "copy a page",
        )?;
        let from = source.page()?;
        let from_layout = &source.layout;
        let mut page = Page::new(&self.layout, from.row_count())?;

        for (i, def) in self.layout.parameters().iter().enumerate() {
            if def.fixed_value.is_some() {
                continue;
            }
            if let Some(j) = from_layout.parameters().index_of(&def.name) {
                page.set_parameter(i, from.parameter(j)?)?;
            }
        }
        for (i, def) in self.layout.arrays().iter().enumerate() {
            if let Some(j) = from_layout.arrays().index_of(&def.name) {
                let array = from.array(j)?;
                page.set_array(i, array.dimensions.clone(), &array.values)?;
            }
        }
        page.set_row_count(from.row_count())?;
        let mut column_flags = Vec::with_capacity(self.layout.columns().len());
        for (i, def) in self.layout.columns().iter().enumerate() {
            match from_layout.columns().index_of(&def.name) {
                Some(j) => {
                    page.set_column(i, from.column(j)?)?;
                    column_flags.push(from.column_flags().value(j));
                }
                None => column_flags.push(true),
            }
        }
        page.assert_row_flags(&from.row_flags().to_bools())?;
        page.flag_columns(&column_flags, FlagOp::Set)?;

        self.page = Some(page);
        self.state = DatasetState::PageInProgress;
        Ok(())
    }

    /// Pages buffered by an in-memory copy.
    pub fn memory_pages(&self) -> &[Page] {
        match &self.sink {
            Some(Sink::Memory(pages)) => pages,
            _ => &[],
        }
    }

    /// Make buffered page `index` current, so it can be read or used as a copy source.
    pub fn select_page(&mut self, index: usize) -> SddsResult<()> {
        let page = self
            .memory_pages()
            .get(index)
            .cloned()
            .ok_or_else(|| sdds_err!(NotFound: "no buffered page {}", index))?;
        self.page = Some(page);
        self.state = DatasetState::PageInProgress;
        Ok(())
    }

    // Values.

    /// Set a parameter of the current page, converting to its type.
    pub fn set_parameter(&mut self, name: &str, value: &Value) -> SddsResult<()> {
        let index = self.layout.parameters().lookup(name)?;
        self.page_mut()?.set_parameter(index, value)
    }

    /// A parameter of the current page.
    pub fn get_parameter(&self, name: &str) -> SddsResult<&Value> {
        let index = self.layout.parameters().lookup(name)?;
        self.page()?.parameter(index)
    }

    /// A numeric parameter promoted to `f64`.
    pub fn get_parameter_as_double(&self, name: &str) -> SddsResult<f64> {
        self.get_parameter(name)?
            .as_f64()
            .ok_or_else(|| sdds_err!(TypeMismatch: "parameter {} is not numeric", name))
    }

    /// Set an array of the current page.
    pub fn set_array(
        &mut self,
        name: &str,
        dimensions: Vec<usize>,
        values: &ColumnValues,
    ) -> SddsResult<()> {
        let index = self.layout.arrays().lookup(name)?;
        self.page_mut()?.set_array(index, dimensions, values)
    }

    /// An array of the current page.
    pub fn get_array(&self, name: &str) -> SddsResult<&ArrayValue> {
        let index = self.layout.arrays().lookup(name)?;
        self.page()?.array(index)
    }

    /// Set a whole column, fixing the row count of the page.
    pub fn set_column(&mut self, name: &str, values: &ColumnValues) -> SddsResult<()> {
        let index = self.layout.columns().lookup(name)?;
        self.page_mut()?.set_column(index, values)
    }

    /// A column of the current page, every row included.
    pub fn get_column(&self, name: &str) -> SddsResult<&ColumnValues> {
        let index = self.layout.columns().lookup(name)?;
        self.page()?.column(index)
    }

    /// The rows of interest of a numeric column, promoted to `f64`.
    pub fn get_column_in_doubles(&self, name: &str) -> SddsResult<Vec<f64>> {
        let index = self.layout.columns().lookup(name)?;
        self.page()?
            .column_in_doubles(index)
            .map_err(|e| e.with_context(format!("column {name}")))
    }

    /// Set one cell.
    pub fn set_value(&mut self, column: &str, row: usize, value: &Value) -> SddsResult<()> {
        let index = self.layout.columns().lookup(column)?;
        self.page_mut()?.set_value(index, row, value)
    }

    /// Set several cells of one row by column name. Nothing changes if any value fails.
    pub fn set_row(&mut self, row: usize, values: &[(&str, Value)]) -> SddsResult<()> {
        let indexed = values
            .iter()
            .map(|(name, value)| Ok((self.layout.columns().lookup(name)?, value.clone())))
            .collect::<SddsResult<Vec<_>>>()?;
        self.page_mut()?.set_row(row, &indexed)
    }

    /// One cell of the current page.
    pub fn value(&self, column: &str, row: usize) -> SddsResult<Value> {
        let index = self.layout.columns().lookup(column)?;
        self.page()?.value(index, row)
    }

    /// Rows in the current page.
    pub fn row_count(&self) -> SddsResult<usize> {
        Ok(self.page()?.row_count())
    }

    // Rows and columns of interest.

    /// Combine `selected` into the row flags; returns the number of rows of interest.
    pub fn flag_rows_of_interest(&mut self, selected: &[bool], op: FlagOp) -> SddsResult<usize> {
        let page = self.page_mut()?;
        page.flag_rows(selected, op)?;
        Ok(page.count_rows_of_interest())
    }

    /// Flag rows by a predicate over row indices.
    pub fn flag_rows_where<F>(&mut self, op: FlagOp, mut predicate: F) -> SddsResult<usize>
    where
        F: FnMut(usize) -> bool,
    {
        let rows = self.page()?.row_count();
        let selected: Vec<bool> = (0..rows).map(&mut predicate).collect();
        self.flag_rows_of_interest(&selected, op)
    }

    /// Flag rows whose string `column` matches a wildcard pattern.
    pub fn match_rows_of_interest(
        &mut self,
        column: &str,
        pattern: &str,
        options: MatchOptions,
        op: FlagOp,
    ) -> SddsResult<usize> {
        let pattern = WildcardPattern::new(pattern, options)?;
        let values = self.get_column(column)?;
        let strings = values
            .as_strings()
            .ok_or_else(|| sdds_err!(TypeMismatch: "column {} is not a string column", column))?;
        let selected: Vec<bool> = strings.iter().map(|s| pattern.is_match(s)).collect();
        self.flag_rows_of_interest(&selected, op)
    }

    /// Flag rows whose numeric `column` lies within `[lower, upper]`.
    pub fn filter_rows_of_interest(
        &mut self,
        column: &str,
        lower: f64,
        upper: f64,
        op: FlagOp,
    ) -> SddsResult<usize> {
        let values = self.get_column(column)?;
        if !values.sdds_type().is_numeric() {
            sdds_bail!(TypeMismatch: "column {} is not numeric", column);
        }
        let selected: Vec<bool> = values
            .to_f64()?
            .into_iter()
            .map(|v| v >= lower && v <= upper)
            .collect();
        self.flag_rows_of_interest(&selected, op)
    }

    /// Replace the row flags.
    pub fn assert_row_flags(&mut self, flags: &[bool]) -> SddsResult<()> {
        self.page_mut()?.assert_row_flags(flags)
    }

    /// Set or clear every row flag.
    pub fn set_all_rows_of_interest(&mut self, value: bool) -> SddsResult<()> {
        self.page_mut()?.set_all_rows_of_interest(value);
        Ok(())
    }

    /// Number of rows of interest in the current page.
    pub fn count_rows_of_interest(&self) -> SddsResult<usize> {
        Ok(self.page()?.count_rows_of_interest())
    }

    /// Indices of the rows of interest.
    pub fn rows_of_interest(&self) -> SddsResult<Vec<usize>> {
        Ok(self.page()?.rows_of_interest())
    }

    /// Drop the rows not of interest from the current page.
    pub fn delete_unset_rows(&mut self) -> SddsResult<()> {
        self.page_mut()?.delete_unset_rows();
        Ok(())
    }

    /// Exchange two rows of the current page.
    pub fn swap_rows(&mut self, a: usize, b: usize) -> SddsResult<()> {
        self.page_mut()?.swap_rows(a, b)
    }

    /// Reorder the rows of the current page so that row `i` becomes old row `order[i]`.
    pub fn permute_rows(&mut self, order: &[usize]) -> SddsResult<()> {
        self.page_mut()?.permute_rows(order)
    }

    /// Combine the columns matching `pattern` into the column flags; returns how many columns
    /// are of interest.
    pub fn flag_columns_of_interest(&mut self, pattern: &str, op: FlagOp) -> SddsResult<usize> {
        let matched = self
            .layout
            .columns()
            .match_names(pattern, MatchOptions::default())?;
        let mut selected = vec![false; self.layout.columns().len()];
        for i in matched {
            selected[i] = true;
        }
        let page = self.page_mut()?;
        page.flag_columns(&selected, op)?;
        Ok(page.column_flags().true_count())
    }

    /// Names of the columns of interest.
    pub fn columns_of_interest(&self) -> SddsResult<Vec<String>> {
        let flags = self.page()?.column_flags();
        Ok(self
            .layout
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| flags.value(*i))
            .map(|(_, def)| def.name.clone())
            .collect())
    }

    // Names and checks.

    /// Column names in definition order.
    pub fn column_names(&self) -> Vec<String> {
        self.layout.columns().names()
    }

    /// Parameter names in definition order.
    pub fn parameter_names(&self) -> Vec<String> {
        self.layout.parameters().names()
    }

    /// Array names in definition order.
    pub fn array_names(&self) -> Vec<String> {
        self.layout.arrays().names()
    }

    /// Column names matching a wildcard pattern, in definition order.
    pub fn match_column_names(
        &self,
        pattern: &str,
        options: MatchOptions,
    ) -> SddsResult<Vec<String>> {
        let columns = self.layout.columns();
        Ok(columns
            .match_names(pattern, options)?
            .into_iter()
            .filter_map(|i| columns.name_of(i).map(str::to_string))
            .collect())
    }

    /// Whether a column exists with the given units and an acceptable type.
    pub fn check_column(
        &self,
        name: &str,
        units: Option<&str>,
        ty: TypeConstraint,
    ) -> CheckStatus {
        match self.layout.columns().get_by_name(name) {
            Ok(def) => check(def.units.as_deref(), def.sdds_type, units, ty),
            Err(_) => CheckStatus::NotFound,
        }
    }

    /// Whether a parameter exists with the given units and an acceptable type.
    pub fn check_parameter(
        &self,
        name: &str,
        units: Option<&str>,
        ty: TypeConstraint,
    ) -> CheckStatus {
        match self.layout.parameters().get_by_name(name) {
            Ok(def) => check(def.units.as_deref(), def.sdds_type, units, ty),
            Err(_) => CheckStatus::NotFound,
        }
    }

    /// Whether an array exists with the given units and an acceptable type.
    pub fn check_array(&self, name: &str, units: Option<&str>, ty: TypeConstraint) -> CheckStatus {
        match self.layout.arrays().get_by_name(name) {
            Ok(def) => check(def.units.as_deref(), def.sdds_type, units, ty),
            Err(_) => CheckStatus::NotFound,
        }
    }

    /// Flush and release every resource, returning to [`DatasetState::Closed`].
    pub fn terminate(&mut self) -> SddsResult<()> {
        let input = self.input.take();
        let sink = self.sink.take();
        *self = Self::default();
        let finished = match sink {
            Some(Sink::Stream(out)) => out.finish(),
            _ => Ok(()),
        };
        let closed = input.map_or(Ok(()), InputStream::close);
        finished.and(closed)
    }
}

fn check(
    units: Option<&str>,
    ty: SddsType,
    wanted_units: Option<&str>,
    wanted_type: TypeConstraint,
) -> CheckStatus {
    if let Some(wanted) = wanted_units {
        if units.unwrap_or_default() != wanted {
            return CheckStatus::WrongUnits;
        }
    }
    if !wanted_type.accepts(ty) {
        return CheckStatus::WrongType;
    }
    CheckStatus::Ok
}

/// Binary output always declares its byte order.
fn writer_data_mode(mut mode: DataMode) -> DataMode {
    if mode.encoding == Encoding::Binary && mode.endianness.is_none() {
        mode.endianness = Some(Default::default());
    }
    mode
}

fn same_definitions(a: &Layout, b: &Layout) -> bool {
    fn signature<'a, D: Definition + 'a>(
        defs: impl Iterator<Item = &'a D>,
    ) -> Vec<(String, Option<SddsType>)> {
        defs.map(|d| (d.name().to_string(), d.sdds_type())).collect()
    }
    signature(a.parameters().iter()) == signature(b.parameters().iter())
        && signature(a.arrays().iter()) == signature(b.arrays().iter())
        && signature(a.columns().iter()) == signature(b.columns().iter())
}

/// Read the layout of an existing file and count its pages.
fn scan_existing(location: &Location) -> SddsResult<(Layout, usize)> {
    let mut reader = SddsDataset::new();
    reader.initialize_input(location.clone(), &InputOptions::default())?;
    let mut pages = 0;
    while reader.read_page()?.is_some() {
        pages += 1;
    }
    let layout = reader.layout.clone();
    reader.terminate()?;
    Ok((layout, pages))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    fn memory_writer() -> SddsDataset {
        let mut source = SddsDataset::new();
        source.state = DatasetState::LayoutFrozen;
        source.layout.freeze();
        let mut ds = SddsDataset::new();
        ds.initialize_copy(&source, None, CopyMode::InMemory).unwrap();
        ds
    }

    #[test]
    fn out_of_state_calls_fail() {
        let mut ds = SddsDataset::new();
        assert_eq!(
            ds.start_page(1).unwrap_err().kind(),
            ErrorKind::WrongState
        );
        assert_eq!(ds.read_page().unwrap_err().kind(), ErrorKind::WrongState);
        assert_eq!(
            ds.define_simple_column("x", None, SddsType::Double)
                .unwrap_err()
                .kind(),
            ErrorKind::WrongState
        );

        let mut ds = memory_writer();
        ds.define_simple_column("x", None, SddsType::Double).unwrap();
        assert_eq!(ds.write_page().unwrap_err().kind(), ErrorKind::WrongState);
        ds.write_layout().unwrap();
        assert_eq!(
            ds.define_simple_column("y", None, SddsType::Double)
                .unwrap_err()
                .kind(),
            ErrorKind::WrongState
        );
        assert_eq!(
            ds.set_column("x", &ColumnValues::from(vec![1.0]))
                .unwrap_err()
                .kind(),
            ErrorKind::WrongState
        );
    }

    #[rstest]
    #[case("x", Some("m"), TypeConstraint::Floating, CheckStatus::Ok)]
    #[case("x", Some("s"), TypeConstraint::Any, CheckStatus::WrongUnits)]
    #[case("x", None, TypeConstraint::Integer, CheckStatus::WrongType)]
    #[case("n", None, TypeConstraint::Exact(SddsType::Long), CheckStatus::Ok)]
    #[case("n", Some(""), TypeConstraint::Numeric, CheckStatus::Ok)]
    #[case("z", None, TypeConstraint::Any, CheckStatus::NotFound)]
    fn check_column(
        #[case] name: &str,
        #[case] units: Option<&str>,
        #[case] ty: TypeConstraint,
        #[case] expected: CheckStatus,
    ) {
        let mut ds = memory_writer();
        ds.define_simple_column("x", Some("m"), SddsType::Double)
            .unwrap();
        ds.define_simple_column("n", None, SddsType::Long).unwrap();
        assert_eq!(ds.check_column(name, units, ty), expected);
        assert_eq!(ds.check_parameter(name, units, ty), CheckStatus::NotFound);
    }

    #[test]
    fn set_row_is_atomic() {
        let mut ds = memory_writer();
        ds.define_simple_column("x", None, SddsType::Double).unwrap();
        ds.define_simple_column("n", None, SddsType::Short).unwrap();
        ds.write_layout().unwrap();
        ds.start_page(2).unwrap();
        ds.set_row(0, &[("x", Value::Double(1.5)), ("n", Value::Long(3))])
            .unwrap();
        let err = ds
            .set_row(1, &[("x", Value::Double(2.5)), ("n", Value::Long(1 << 20))])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueOutOfRange);
        assert_eq!(ds.row_count().unwrap(), 1);
        assert_eq!(
            ds.set_row(2, &[("x", Value::Double(0.0))])
                .unwrap_err()
                .kind(),
            ErrorKind::ValueOutOfRange
        );
        ds.lengthen_table(1).unwrap();
        ds.set_row(2, &[("x", Value::Double(0.0))]).unwrap();
        assert_eq!(ds.row_count().unwrap(), 3);
    }

    #[test]
    fn copy_page_maps_by_name_and_keeps_flags() {
        let mut src = memory_writer();
        src.define_simple_column("a", None, SddsType::Long).unwrap();
        src.define_simple_column("b", None, SddsType::String).unwrap();
        src.define_simple_parameter("p", None, SddsType::Double)
            .unwrap();
        src.write_layout().unwrap();
        src.start_page(3).unwrap();
        src.set_column("a", &ColumnValues::from(vec![1i32, 2, 3]))
            .unwrap();
        src.set_column("b", &ColumnValues::from(vec!["x", "y", "z"]))
            .unwrap();
        src.set_parameter("p", &Value::Double(2.5)).unwrap();
        src.assert_row_flags(&[true, false, true]).unwrap();

        let mut dst = SddsDataset::new();
        dst.initialize_copy(&src, None, CopyMode::InMemory).unwrap();
        dst.retain_columns(&[false, true]).unwrap();
        dst.define_simple_column("c", None, SddsType::Double).unwrap();
        dst.write_layout().unwrap();
        dst.copy_page(&src).unwrap();
        assert_eq!(dst.column_names(), vec!["b", "c"]);
        assert_eq!(
            dst.get_column("b").unwrap(),
            &ColumnValues::from(vec!["x", "y", "z"])
        );
        assert_eq!(
            dst.get_column("c").unwrap(),
            &ColumnValues::from(vec![0.0, 0.0, 0.0])
        );
        assert_eq!(dst.rows_of_interest().unwrap(), vec![0, 2]);
        assert_eq!(dst.get_parameter_as_double("p").unwrap(), 2.5);
        assert_eq!(dst.write_page().unwrap(), 1);
        assert_eq!(dst.memory_pages().len(), 1);
    }

    #[test]
    fn parameter_transfer_collisions() {
        let mut src = memory_writer();
        src.define_parameter(ParameterDefinition::new("p", SddsType::Double).units("m"))
            .unwrap();
        src.define_simple_parameter("q", None, SddsType::Long).unwrap();
        src.write_layout().unwrap();

        for (transfer, units) in [
            (ParameterTransfer::KeepOld, None),
            (ParameterTransfer::Overwrite, Some("m".to_string())),
        ] {
            let mut dst = memory_writer();
            dst.define_simple_parameter("p", None, SddsType::Short).unwrap();
            dst.transfer_all_parameter_definitions(&src, transfer).unwrap();
            assert_eq!(dst.parameter_names(), vec!["p", "q"]);
            assert_eq!(
                dst.information(DefinitionKind::Parameter, "p", InfoField::Units)
                    .unwrap(),
                units
            );
        }
    }

    #[test]
    fn row_filters() {
        let mut ds = memory_writer();
        ds.define_simple_column("name", None, SddsType::String).unwrap();
        ds.define_simple_column("v", None, SddsType::Double).unwrap();
        ds.write_layout().unwrap();
        ds.start_page(4).unwrap();
        ds.set_column("name", &ColumnValues::from(vec!["q1", "q2", "s1", "q3"]))
            .unwrap();
        ds.set_column("v", &ColumnValues::from(vec![0.5, 3.0, 1.0, f64::NAN]))
            .unwrap();
        assert_eq!(
            ds.match_rows_of_interest("name", "q*", MatchOptions::default(), FlagOp::Set)
                .unwrap(),
            3
        );
        assert_eq!(
            ds.filter_rows_of_interest("v", 0.0, 1.0, FlagOp::And)
                .unwrap(),
            1
        );
        assert_eq!(ds.rows_of_interest().unwrap(), vec![0]);
        assert_eq!(
            ds.filter_rows_of_interest("name", 0.0, 1.0, FlagOp::Or)
                .unwrap_err()
                .kind(),
            ErrorKind::TypeMismatch
        );
        ds.delete_unset_rows().unwrap();
        assert_eq!(ds.row_count().unwrap(), 1);
        assert_eq!(ds.flag_columns_of_interest("n*", FlagOp::Set).unwrap(), 1);
        assert_eq!(ds.columns_of_interest().unwrap(), vec!["name"]);
    }

    #[test]
    fn type_change_blocked_after_data() {
        let mut ds = memory_writer();
        ds.define_simple_column("x", None, SddsType::Double).unwrap();
        ds.write_layout().unwrap();
        ds.change_information(DefinitionKind::Column, "x", InfoField::Type, "float")
            .unwrap();
        ds.start_page(0).unwrap();
        assert_eq!(
            ds.change_information(DefinitionKind::Column, "x", InfoField::Type, "long")
                .unwrap_err()
                .kind(),
            ErrorKind::WrongState
        );
        ds.write_page().unwrap();
        assert_eq!(
            ds.change_information(DefinitionKind::Column, "x", InfoField::Type, "long")
                .unwrap_err()
                .kind(),
            ErrorKind::WrongState
        );
        ds.change_information(DefinitionKind::Column, "x", InfoField::Units, "mm")
            .unwrap();
    }
}
