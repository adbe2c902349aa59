use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail};
use sdds_file::{CopyMode, Location, SddsDataset};
use sdds_layout::{Definition, DefinitionKind, InfoField, Layout, MatchOptions, WildcardPattern};

use crate::common::{
    ModeArgs, definition_kind, finish_filter, no_items, open_input, unknown_option,
};
use crate::filenames::process_filenames;
use crate::scan::{PipeFlags, ScannedArg, match_option, scan_args};

const OPTIONS: &[&str] = &["cast", "noWarnings", "majorOrder", "pipe"];

/// One `-cast=kind,names[,types],newType` request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CastRequest {
    kind: DefinitionKind,
    names: String,
    types: Option<String>,
    new_type: SddsType,
}

#[derive(Debug, Default)]
struct Flags {
    casts: Vec<CastRequest>,
    warnings: bool,
    mode: ModeArgs,
    pipe: PipeFlags,
    positionals: Vec<String>,
}

fn parse_cast(items: &[String]) -> SddsResult<CastRequest> {
    let (kind, names, types, new_type) = match items {
        [kind, names, new_type] => (kind, names, None, new_type),
        [kind, names, types, new_type] => (kind, names, Some(types.clone()), new_type),
        _ => sdds_bail!("-cast takes a kind, a name pattern, optional type patterns and a new type"),
    };
    let new_type = SddsType::parse_name(new_type)?;
    if !new_type.is_numeric() || new_type == SddsType::Character {
        sdds_bail!("cannot cast to {}; the new type must be numeric", new_type);
    }
    Ok(CastRequest {
        kind: definition_kind(kind)?,
        names: names.clone(),
        types,
        new_type,
    })
}

fn parse(args: &[String]) -> SddsResult<Flags> {
    let mut flags = Flags {
        warnings: true,
        ..Flags::default()
    };
    for arg in scan_args(args) {
        let (keyword, items) = match &arg {
            ScannedArg::Positional(word) => {
                flags.positionals.push(word.clone());
                continue;
            }
            ScannedArg::Option { keyword, items } => (keyword.as_str(), items.as_slice()),
        };
        match match_option(keyword, OPTIONS) {
            Some(0) => flags.casts.push(parse_cast(items)?),
            Some(1) => {
                no_items(keyword, items)?;
                flags.warnings = false;
            }
            Some(2) => flags.mode.set_major_order(items)?,
            Some(3) => flags.pipe = PipeFlags::from_items(items)?,
            _ => return Err(unknown_option(&arg)),
        }
    }
    if flags.casts.is_empty() {
        sdds_bail!("give at least one -cast");
    }
    Ok(flags)
}

fn named_types<D: Definition>(definitions: impl Iterator<Item = D>) -> Vec<(String, SddsType)> {
    definitions
        .filter_map(|d| d.sdds_type().map(|ty| (d.name().to_string(), ty)))
        .collect()
}

/// Names and types of every definition of `kind`.
fn definitions(layout: &Layout, kind: DefinitionKind) -> Vec<(String, SddsType)> {
    match kind {
        DefinitionKind::Column => named_types(layout.columns().iter().cloned()),
        DefinitionKind::Parameter => named_types(layout.parameters().iter().cloned()),
        DefinitionKind::Array => named_types(layout.arrays().iter().cloned()),
        DefinitionKind::Associate => Vec::new(),
    }
}

/// Names of the definitions a request converts.
fn resolve(layout: &Layout, request: &CastRequest, warnings: bool) -> SddsResult<Vec<String>> {
    let names = WildcardPattern::new(&request.names, MatchOptions::default())?;
    let types = request
        .types
        .as_deref()
        .map(|t| WildcardPattern::new(t, MatchOptions::default()))
        .transpose()?;
    let mut selected = Vec::new();
    for (name, ty) in definitions(layout, request.kind) {
        if !names.is_match(&name) || types.as_ref().is_some_and(|t| !t.is_match(ty.name())) {
            continue;
        }
        if !ty.is_numeric() {
            if warnings {
                log::warn!("{} {} is {} and is left as it is", request.kind, name, ty);
            }
            continue;
        }
        selected.push(name);
    }
    if selected.is_empty() && warnings {
        log::warn!("no {} matches {}", request.kind, request.names);
    }
    Ok(selected)
}

/// Convert numeric columns, parameters or arrays to another numeric type.
pub fn exec_cast(args: &[String]) -> SddsResult<()> {
    let flags = parse(args)?;
    let filenames = process_filenames(&flags.positionals, flags.pipe)?;
    let result = cast(&flags, &filenames.input, &filenames.output);
    finish_filter(filenames, result)
}

fn cast(flags: &Flags, input: &Location, output: &Location) -> SddsResult<()> {
    let mut source = open_input(input)?;
    let mut target = SddsDataset::new();
    target.initialize_copy(&source, Some(output.clone()), CopyMode::FreshWrite)?;
    flags.mode.apply(&mut target)?;
    for request in &flags.casts {
        for name in resolve(source.layout(), request, flags.warnings)? {
            target.change_information(
                request.kind,
                &name,
                InfoField::Type,
                request.new_type.name(),
            )?;
        }
    }
    target.write_layout()?;
    while source.read_page()?.is_some() {
        target.copy_page(&source)?;
        target.write_page()?;
    }
    target.terminate()?;
    source.terminate()
}
