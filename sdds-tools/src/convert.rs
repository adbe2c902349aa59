use sdds_error::{SddsResult, sdds_bail};
use sdds_file::{CopyMode, Location, SddsDataset};
use sdds_layout::{DefinitionKind, Encoding};

use crate::common::{
    ModeArgs, definition_kind, finish_filter, match_definitions, no_items, open_input,
    unknown_option,
};
use crate::filenames::process_filenames;
use crate::scan::{PipeFlags, ScannedArg, match_option, scan_args, single_item};

const OPTIONS: &[&str] = &[
    "ascii",
    "binary",
    "majorOrder",
    "endian",
    "fromPage",
    "toPage",
    "retain",
    "delete",
    "description",
    "pipe",
];

#[derive(Debug, Default)]
struct Flags {
    mode: ModeArgs,
    from_page: Option<usize>,
    to_page: Option<usize>,
    selections: Vec<(DefinitionKind, bool, Vec<String>)>,
    description: Option<(String, Option<String>)>,
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
                no_items(keyword, items)?;
                flags.mode.encoding = Some(Encoding::Ascii);
            }
            Some(1) => {
                no_items(keyword, items)?;
                flags.mode.encoding = Some(Encoding::Binary);
            }
            Some(2) => flags.mode.set_major_order(items)?,
            Some(3) => flags.mode.set_endianness(items)?,
            Some(4) => flags.from_page = Some(single_item(keyword, items)?),
            Some(5) => flags.to_page = Some(single_item(keyword, items)?),
            Some(i @ (6 | 7)) => {
                let [kind, patterns @ ..] = items else {
                    sdds_bail!("-{} needs a definition kind and patterns", keyword);
                };
                if patterns.is_empty() {
                    sdds_bail!("-{} needs at least one pattern", keyword);
                }
                flags
                    .selections
                    .push((definition_kind(kind)?, i == 6, patterns.to_vec()));
            }
            Some(8) => match items {
                [text] => flags.description = Some((text.clone(), None)),
                [text, contents] => {
                    flags.description = Some((text.clone(), Some(contents.clone())));
                }
                _ => sdds_bail!("-description takes text and optional contents"),
            },
            Some(9) => flags.pipe = PipeFlags::from_items(items)?,
            _ => return Err(unknown_option(&arg)),
        }
    }
    if let (Some(from), Some(to)) = (flags.from_page, flags.to_page) {
        if from > to {
            sdds_bail!("-fromPage {} is after -toPage {}", from, to);
        }
    }
    Ok(flags)
}

/// Flags per definition of `kind`: retained patterns select, deleted patterns then remove.
///
/// `None` when no option names `kind`.
fn kept(
    input: &SddsDataset,
    kind: DefinitionKind,
    flags: &Flags,
) -> SddsResult<Option<Vec<bool>>> {
    let (mut retain, mut delete) = (Vec::new(), Vec::new());
    for (k, retained, patterns) in &flags.selections {
        if *k == kind {
            let list = if *retained { &mut retain } else { &mut delete };
            list.extend(patterns.iter().cloned());
        }
    }
    if retain.is_empty() && delete.is_empty() {
        return Ok(None);
    }
    let mut keep = match_definitions(input, kind, &retain)?;
    if retain.is_empty() {
        keep.fill(true);
    }
    let deleted = match_definitions(input, kind, &delete)?;
    for (k, d) in keep.iter_mut().zip(deleted) {
        *k &= !d;
    }
    log::debug!(
        "keeping {} of {} {} definitions",
        keep.iter().filter(|k| **k).count(),
        keep.len(),
        kind
    );
    Ok(Some(keep))
}

/// Copy a dataset, changing its encoding and selecting pages and definitions.
pub fn exec_convert(args: &[String]) -> SddsResult<()> {
    let flags = parse(args)?;
    let filenames = process_filenames(&flags.positionals, flags.pipe)?;
    let result = convert(&flags, &filenames.input, &filenames.output);
    finish_filter(filenames, result)
}

fn convert(flags: &Flags, input: &Location, output: &Location) -> SddsResult<()> {
    let mut source = open_input(input)?;
    let mut target = SddsDataset::new();
    target.initialize_copy(&source, Some(output.clone()), CopyMode::FreshWrite)?;
    flags.mode.apply(&mut target)?;
    if let Some((text, contents)) = &flags.description {
        target.set_description(Some(text), contents.as_deref())?;
    }
    if let Some(keep) = kept(&source, DefinitionKind::Column, flags)? {
        target.retain_columns(&keep)?;
    }
    if let Some(keep) = kept(&source, DefinitionKind::Parameter, flags)? {
        target.retain_parameters(&keep)?;
    }
    if let Some(keep) = kept(&source, DefinitionKind::Array, flags)? {
        target.retain_arrays(&keep)?;
    }
    target.write_layout()?;

    let from = flags.from_page.unwrap_or(1);
    while let Some(number) = source.read_page()? {
        if number < from {
            continue;
        }
        if flags.to_page.is_some_and(|to| number > to) {
            break;
        }
        target.copy_page(&source)?;
        target.write_page()?;
    }
    target.terminate()?;
    source.terminate()
}
