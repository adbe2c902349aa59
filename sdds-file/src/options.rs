use sdds_layout::{DataMode, Encoding, Endianness, MajorOrder};

use crate::ascii::DEFAULT_LINE_LIMIT;

/// Options for opening a dataset for reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputOptions {
    force_subprocess: bool,
}

impl InputOptions {
    /// Read `.gz` and `.bz2` files through a decompressor child process instead of in process.
    pub fn with_force_subprocess(mut self, force: bool) -> Self {
        self.force_subprocess = force;
        self
    }

    /// Whether compressed input always goes through a child process.
    pub fn force_subprocess(&self) -> bool {
        self.force_subprocess
    }
}

/// Options for creating a dataset for writing.
///
/// The default writes binary, row-major pages in the host byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    data_mode: DataMode,
    line_limit: usize,
    description: Option<String>,
    contents: Option<String>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            data_mode: DataMode::binary(),
            line_limit: DEFAULT_LINE_LIMIT,
            description: None,
            contents: None,
        }
    }
}

impl OutputOptions {
    /// ASCII output.
    pub fn ascii() -> Self {
        Self::default().with_encoding(Encoding::Ascii)
    }

    /// Binary output in the host byte order.
    pub fn binary() -> Self {
        Self::default()
    }

    /// Choose the page encoding.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.data_mode.encoding = encoding;
        self
    }

    /// Choose row- or column-major column data.
    pub fn with_major_order(mut self, major_order: MajorOrder) -> Self {
        self.data_mode.major_order = major_order;
        self
    }

    /// Byte order of binary pages.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.data_mode.endianness = Some(endianness);
        self
    }

    /// Spread each ASCII row over this many lines.
    pub fn with_lines_per_row(mut self, lines: usize) -> Self {
        self.data_mode.lines_per_row = lines.max(1);
        self
    }

    /// Omit ASCII row counts and end each page's rows with a blank line.
    pub fn with_no_row_counts(mut self, no_row_counts: bool) -> Self {
        self.data_mode.no_row_counts = no_row_counts;
        self
    }

    /// Wrap ASCII array and column-major value runs at this width.
    pub fn with_line_limit(mut self, limit: usize) -> Self {
        self.line_limit = limit.max(1);
        self
    }

    /// File-level description text.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// File-level contents text.
    pub fn with_contents(mut self, contents: impl Into<String>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    /// The data mode written to the header.
    pub fn data_mode(&self) -> &DataMode {
        &self.data_mode
    }

    /// The ASCII wrapping width.
    pub fn line_limit(&self) -> usize {
        self.line_limit
    }

    pub(crate) fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub(crate) fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }
}
