//! Pieces shared by the utilities.

use sdds_error::{SddsResult, sdds_bail};
use sdds_file::{InputOptions, Location, SddsDataset};
use sdds_layout::{DefinitionKind, Encoding, Endianness, MajorOrder, MatchOptions};

use crate::filenames::Filenames;
use crate::scan::{require_option, single_item};

/// Output data mode chosen on the command line: `-ascii`, `-binary`, `-majorOrder`, `-endian`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeArgs {
    pub encoding: Option<Encoding>,
    pub major_order: Option<MajorOrder>,
    pub endianness: Option<Endianness>,
}

impl ModeArgs {
    pub fn set_major_order(&mut self, items: &[String]) -> SddsResult<()> {
        let word: String = single_item("majorOrder", items)?;
        self.major_order = Some(match require_option(&word, &["row", "column"], "major order")? {
            0 => MajorOrder::Row,
            _ => MajorOrder::Column,
        });
        Ok(())
    }

    pub fn set_endianness(&mut self, items: &[String]) -> SddsResult<()> {
        let word: String = single_item("endian", items)?;
        self.endianness = Some(match require_option(&word, &["big", "little"], "byte order")? {
            0 => Endianness::Big,
            _ => Endianness::Little,
        });
        Ok(())
    }

    /// Change the data mode of an output that has not written its layout yet.
    pub fn apply(&self, output: &mut SddsDataset) -> SddsResult<()> {
        if *self == Self::default() {
            return Ok(());
        }
        let mut mode = output.layout().data_mode.clone();
        if let Some(encoding) = self.encoding {
            mode.encoding = encoding;
        }
        if let Some(order) = self.major_order {
            mode.major_order = order;
        }
        if self.endianness.is_some() {
            mode.endianness = self.endianness;
        }
        output.set_data_mode(mode)
    }
}

pub fn open_input(location: &Location) -> SddsResult<SddsDataset> {
    let mut input = SddsDataset::new();
    input
        .initialize_input(location.clone(), &InputOptions::default())
        .map_err(|e| e.with_context(format!("opening {location}")))?;
    Ok(input)
}

/// Move a finished output into place, or discard it if the utility failed.
pub fn finish_filter(filenames: Filenames, result: SddsResult<()>) -> SddsResult<()> {
    match result {
        Ok(()) => filenames.finish(),
        Err(e) => {
            filenames.abandon();
            Err(e)
        }
    }
}

/// Parse `column`, `parameter` or `array` by prefix.
pub fn definition_kind(word: &str) -> SddsResult<DefinitionKind> {
    Ok(
        match require_option(word, &["column", "parameter", "array"], "definition kind")? {
            0 => DefinitionKind::Column,
            1 => DefinitionKind::Parameter,
            _ => DefinitionKind::Array,
        },
    )
}

/// Names of definitions of `kind` matching any of `patterns`, as a flag per definition.
pub fn match_definitions(
    dataset: &SddsDataset,
    kind: DefinitionKind,
    patterns: &[String],
) -> SddsResult<Vec<bool>> {
    let layout = dataset.layout();
    let mut flags = vec![
        false;
        match kind {
            DefinitionKind::Column => layout.columns().len(),
            DefinitionKind::Parameter => layout.parameters().len(),
            DefinitionKind::Array => layout.arrays().len(),
            DefinitionKind::Associate => layout.associates().len(),
        }
    ];
    for pattern in patterns {
        let matched = match kind {
            DefinitionKind::Column => layout.columns().match_names(pattern, MatchOptions::default()),
            DefinitionKind::Parameter => {
                layout.parameters().match_names(pattern, MatchOptions::default())
            }
            DefinitionKind::Array => layout.arrays().match_names(pattern, MatchOptions::default()),
            DefinitionKind::Associate => {
                layout.associates().match_names(pattern, MatchOptions::default())
            }
        }?;
        for i in matched {
            flags[i] = true;
        }
    }
    Ok(flags)
}

pub fn unknown_option(arg: impl std::fmt::Display) -> sdds_error::SddsError {
    sdds_error::sdds_err!("unknown option {}", arg)
}

/// Fail unless an option was given no items.
pub fn no_items(keyword: &str, items: &[String]) -> SddsResult<()> {
    if !items.is_empty() {
        sdds_bail!("-{} takes no values", keyword);
    }
    Ok(())
}
