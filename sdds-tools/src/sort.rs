use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail};
use sdds_file::{CopyMode, Location, SddsDataset};
use sdds_scalar::ColumnValues;
use sdds_sort::{
    Direction, IDENTICAL_COUNT, SortKey, apply_fronts, define_front_columns, page_order,
    rank_rows, sort_rows, unset_duplicate_rows,
};
use tempfile::NamedTempFile;

use crate::common::{ModeArgs, finish_filter, no_items, open_input, unknown_option};
use crate::filenames::process_filenames;
use crate::scan::{PipeFlags, ScannedArg, match_option, require_option, scan_args};

const OPTIONS: &[&str] = &[
    "column",
    "parameter",
    "unique",
    "nonDominate",
    "numericHigh",
    "majorOrder",
    "pipe",
];

const COLUMN_QUALIFIERS: &[&str] = &[
    "increasing",
    "decreasing",
    "minimize",
    "maximize",
    "absolute",
];

#[derive(Debug, Default)]
struct Flags {
    columns: Vec<SortKey>,
    directions: Vec<Direction>,
    parameters: Vec<SortKey>,
    unique: bool,
    count: bool,
    non_dominate: bool,
    numeric_high: bool,
    mode: ModeArgs,
    pipe: PipeFlags,
    positionals: Vec<String>,
}

fn parse(args: &[String]) -> SddsResult<Flags> {
    let mut flags = Flags::default();
    for arg in scan_args(args) {
        let (keyword, items) = match &arg {
            ScannedArg::Positional(word) => {
                flags.positionals.push(word.clone());
                continue;
            }
            ScannedArg::Option { keyword, items } => (keyword.as_str(), items.as_slice()),
        };
        match match_option(keyword, OPTIONS) {
            Some(0) => {
                let [name, qualifiers @ ..] = items else {
                    sdds_bail!("-column needs a column name");
                };
                let mut key = SortKey::increasing(name.as_str());
                let mut direction = Direction::Minimize;
                for qualifier in qualifiers {
                    match require_option(qualifier, COLUMN_QUALIFIERS, "-column qualifier")? {
                        0 => key.decreasing = false,
                        1 => key.decreasing = true,
                        2 => direction = Direction::Minimize,
                        3 => direction = Direction::Maximize,
                        _ => key.absolute = true,
                    }
                }
                flags.columns.push(key);
                flags.directions.push(direction);
            }
            Some(1) => {
                let [name, qualifiers @ ..] = items else {
                    sdds_bail!("-parameter needs a parameter name");
                };
                let mut key = SortKey::increasing(name.as_str());
                for qualifier in qualifiers {
                    let which = require_option(
                        qualifier,
                        &["increasing", "decreasing"],
                        "-parameter qualifier",
                    )?;
                    key.decreasing = which == 1;
                }
                flags.parameters.push(key);
            }
            Some(2) => {
                flags.unique = true;
                for item in items {
                    require_option(item, &["count"], "-unique qualifier")?;
                    flags.count = true;
                }
            }
            Some(3) => {
                no_items(keyword, items)?;
                flags.non_dominate = true;
            }
            Some(4) => {
                no_items(keyword, items)?;
                flags.numeric_high = true;
            }
            Some(5) => flags.mode.set_major_order(items)?,
            Some(6) => flags.pipe = PipeFlags::from_items(items)?,
            _ => return Err(unknown_option(&arg)),
        }
    }
    if flags.columns.is_empty() && flags.parameters.is_empty() {
        sdds_bail!("give at least one -column or -parameter to sort by");
    }
    if flags.non_dominate && flags.columns.len() < 2 {
        sdds_bail!("-nonDominate needs at least two -column objectives");
    }
    Ok(flags)
}

/// Sort rows by column keys or Pareto rank, and pages by parameter keys.
pub fn exec_sort(args: &[String]) -> SddsResult<()> {
    let flags = parse(args)?;
    let filenames = process_filenames(&flags.positionals, flags.pipe)?;
    let result = sort(&flags, &filenames.input, &filenames.output);
    finish_filter(filenames, result)
}

fn sort(flags: &Flags, input: &Location, output: &Location) -> SddsResult<()> {
    let (mut source, _spool) = spool_piped(open_input(input)?)?;
    let mut target = SddsDataset::new();
    target.initialize_copy(&source, Some(output.clone()), CopyMode::FreshWrite)?;
    flags.mode.apply(&mut target)?;
    let names = source.column_names();
    if flags.unique && flags.count && !names.iter().any(|n| n == IDENTICAL_COUNT) {
        target.define_simple_column(IDENTICAL_COUNT, None, SddsType::Long64)?;
    }
    if flags.non_dominate {
        define_front_columns(&mut target)?;
    }
    target.write_layout()?;

    if flags.parameters.is_empty() {
        while source.read_page()?.is_some() {
            sort_page(flags, &source, &mut target)?;
        }
    } else {
        let mut buffer = SddsDataset::new();
        buffer.initialize_copy(&source, None, CopyMode::InMemory)?;
        buffer.write_layout()?;
        while source.read_page()?.is_some() {
            buffer.copy_page(&source)?;
            buffer.write_page()?;
        }
        let order = page_order(
            buffer.layout(),
            buffer.memory_pages(),
            &flags.parameters,
            flags.numeric_high,
        )?;
        for index in order {
            buffer.select_page(index)?;
            sort_page(flags, &buffer, &mut target)?;
        }
    }
    target.terminate()?;
    source.terminate()
}

/// Inputs read through a decompression process are copied to a temporary file in the same data mode
/// and reopened from there. The file lives as long as the returned handle.
fn spool_piped(mut source: SddsDataset) -> SddsResult<(SddsDataset, Option<NamedTempFile>)> {
    if !source.popen_used() {
        return Ok((source, None));
    }
    let file = NamedTempFile::new()?;
    let location = Location::Path(file.path().to_path_buf());
    let mut copy = SddsDataset::new();
    copy.initialize_copy(&source, Some(location.clone()), CopyMode::FreshWrite)?;
    copy.write_layout()?;
    let mut pages = 0usize;
    while source.read_page()?.is_some() {
        copy.copy_page(&source)?;
        copy.write_page()?;
        pages += 1;
    }
    copy.terminate()?;
    source.terminate()?;
    log::debug!("spooled {pages} piped page(s) to {}", file.path().display());
    Ok((open_input(&location)?, Some(file)))
}

/// Copy the current page of `source` to `target`, sort it and write it.
fn sort_page(flags: &Flags, source: &SddsDataset, target: &mut SddsDataset) -> SddsResult<()> {
    target.copy_page(source)?;
    if target.row_count()? > 0 && !flags.columns.is_empty() {
        if flags.non_dominate {
            let objectives = flags
                .columns
                .iter()
                .zip(&flags.directions)
                .map(|(key, direction)| (key.name.clone(), *direction))
                .collect::<Vec<_>>();
            let fronts = rank_rows(source, &objectives)?;
            apply_fronts(target, &fronts)?;
        } else {
            sort_rows(target, &flags.columns, flags.numeric_high)?;
            if flags.unique {
                let counts = unset_duplicate_rows(target, &flags.columns, flags.numeric_high)?;
                if flags.count {
                    target.set_column(IDENTICAL_COUNT, &ColumnValues::from(counts))?;
                }
            }
        }
    }
    target.write_page()?;
    Ok(())
}
