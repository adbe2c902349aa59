use std::path::Path;

use sdds_error::{SddsResult, sdds_bail};
use sdds_file::{CopyMode, Location, SddsDataset};
use sdds_layout::Encoding;
use sdds_scalar::text::format_value;

use crate::common::{ModeArgs, no_items, open_input, unknown_option};
use crate::scan::{PipeFlags, ScannedArg, match_option, scan_args, single_item};

const OPTIONS: &[&str] = &[
    "rootname",
    "digits",
    "extension",
    "firstPage",
    "lastPage",
    "interval",
    "offset",
    "nameParameter",
    "groupParameter",
    "ascii",
    "binary",
    "majorOrder",
    "pipe",
];

#[derive(Debug)]
struct Flags {
    rootname: Option<String>,
    digits: usize,
    extension: Option<String>,
    first_page: Option<usize>,
    last_page: Option<usize>,
    interval: usize,
    offset: i64,
    name_parameter: Option<String>,
    group_parameter: Option<String>,
    mode: ModeArgs,
    pipe: PipeFlags,
    positionals: Vec<String>,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            rootname: None,
            digits: 3,
            extension: Some("sdds".to_string()),
            first_page: None,
            last_page: None,
            interval: 1,
            offset: 0,
            name_parameter: None,
            group_parameter: None,
            mode: ModeArgs::default(),
            pipe: PipeFlags::default(),
            positionals: Vec::new(),
        }
    }
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
            Some(0) => flags.rootname = Some(single_item(keyword, items)?),
            Some(1) => {
                flags.digits = single_item(keyword, items)?;
                if flags.digits == 0 {
                    sdds_bail!("-digits must be positive");
                }
            }
            Some(2) => {
                let extension: String = single_item(keyword, items)?;
                flags.extension = (!extension.trim().is_empty()).then_some(extension);
            }
            Some(3) => flags.first_page = Some(page_number(keyword, items)?),
            Some(4) => flags.last_page = Some(page_number(keyword, items)?),
            Some(5) => {
                flags.interval = single_item(keyword, items)?;
                if flags.interval == 0 {
                    sdds_bail!("-interval must be positive");
                }
            }
            Some(6) => flags.offset = single_item(keyword, items)?,
            Some(7) => flags.name_parameter = Some(single_item(keyword, items)?),
            Some(8) => flags.group_parameter = Some(single_item(keyword, items)?),
            Some(9) => {
                no_items(keyword, items)?;
                flags.mode.encoding = Some(Encoding::Ascii);
            }
            Some(10) => {
                no_items(keyword, items)?;
                flags.mode.encoding = Some(Encoding::Binary);
            }
            Some(11) => flags.mode.set_major_order(items)?,
            Some(12) => {
                flags.pipe = PipeFlags::from_items(items)?;
                if flags.pipe.output {
                    sdds_bail!("sdds split writes files; only -pipe=input is accepted");
                }
            }
            _ => return Err(unknown_option(&arg)),
        }
    }
    if let (Some(first), Some(last)) = (flags.first_page, flags.last_page) {
        if first > last {
            sdds_bail!("-firstPage {} is after -lastPage {}", first, last);
        }
    }
    Ok(flags)
}

fn page_number(keyword: &str, items: &[String]) -> SddsResult<usize> {
    let page: usize = single_item(keyword, items)?;
    if page == 0 {
        sdds_bail!("-{} counts pages from 1", keyword);
    }
    Ok(page)
}

/// The input with everything from its last `.` removed.
fn default_rootname(input: &str) -> String {
    let file_start = input.rfind('/').map_or(0, |i| i + 1);
    match input[file_start..].rfind('.') {
        Some(dot) => input[..file_start + dot].to_string(),
        None => input.to_string(),
    }
}

/// `{rootname}{index:0digits}[.{extension}]`.
fn output_name(rootname: &str, index: i64, digits: usize, extension: Option<&str>) -> String {
    match extension {
        Some(extension) => format!("{rootname}{index:0digits$}.{extension}"),
        None => format!("{rootname}{index:0digits$}"),
    }
}

/// Write each selected page of a dataset to its own file.
pub fn exec_split(args: &[String]) -> SddsResult<()> {
    let flags = parse(args)?;
    let input = match (flags.positionals.as_slice(), flags.pipe.input) {
        ([], true) => Location::Pipe,
        ([name], false) => Location::from(name.as_str()),
        ([], false) => sdds_bail!("no input file given"),
        _ => sdds_bail!("too many file names: {}", flags.positionals.join(" ")),
    };
    let rootname = match (&flags.rootname, &input) {
        (Some(rootname), _) => rootname.clone(),
        (None, _) if flags.name_parameter.is_some() => String::new(),
        (None, Location::Path(path)) => default_rootname(&path.to_string_lossy()),
        (None, Location::Pipe) => sdds_bail!("give -rootname or -nameParameter with -pipe"),
    };
    split(&flags, &input, &rootname)
}

fn split(flags: &Flags, input: &Location, rootname: &str) -> SddsResult<()> {
    let mut source = open_input(input)?;
    let mut target: Option<SddsDataset> = None;
    let mut last_group: Option<String> = None;
    let first = flags.first_page.unwrap_or(1);
    let mut written = 0usize;
    while let Some(number) = source.read_page()? {
        if number < first {
            continue;
        }
        if flags.last_page.is_some_and(|last| number > last) {
            break;
        }
        if (number - first) % flags.interval != 0 {
            continue;
        }
        let group = match &flags.group_parameter {
            Some(name) => Some(parameter_text(&source, name)?),
            None => None,
        };
        if target.is_none() || group.is_none() || group != last_group {
            if let Some(mut finished) = target.take() {
                finished.terminate()?;
            }
            let name = match &flags.name_parameter {
                Some(parameter) => parameter_text(&source, parameter)?,
                None => output_name(
                    rootname,
                    number as i64 - flags.offset,
                    flags.digits,
                    flags.extension.as_deref(),
                ),
            };
            target = Some(start_output(flags, &source, &name)?);
            written += 1;
        }
        last_group = group;
        if let Some(target) = target.as_mut() {
            target.copy_page(&source)?;
            target.write_page()?;
        }
    }
    if let Some(mut finished) = target.take() {
        finished.terminate()?;
    }
    log::debug!("wrote {written} file(s) from {input}");
    source.terminate()
}

fn start_output(flags: &Flags, source: &SddsDataset, name: &str) -> SddsResult<SddsDataset> {
    if Path::new(name).as_os_str().is_empty() {
        sdds_bail!("empty output file name");
    }
    let mut target = SddsDataset::new();
    target.initialize_copy(source, Some(Location::from(name)), CopyMode::FreshWrite)?;
    flags.mode.apply(&mut target)?;
    target.write_layout()?;
    Ok(target)
}

fn parameter_text(source: &SddsDataset, name: &str) -> SddsResult<String> {
    let value = source
        .get_parameter(name)
        .map_err(|e| e.with_context(format!("reading parameter {name}")))?;
    format_value(value, None)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("run.sdds", "run")]
    #[case("dir.v2/run", "dir.v2/run")]
    #[case("dir/run.out.gz", "dir/run.out")]
    #[case("plain", "plain")]
    fn rootnames(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(default_rootname(input), expected);
    }

    #[rstest]
    #[case(2, 3, Some("sdds"), "run002.sdds")]
    #[case(12, 1, Some("txt"), "run12.txt")]
    #[case(7, 4, None, "run0007")]
    fn names(
        #[case] index: i64,
        #[case] digits: usize,
        #[case] extension: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(output_name("run", index, digits, extension), expected);
    }

    #[test]
    fn page_range_is_checked() {
        let args = ["in.sdds", "-firstPage=4", "-lastPage=2"].map(String::from);
        assert!(parse(&args).is_err());
        let args = ["in.sdds", "-interval=0"].map(String::from);
        assert!(parse(&args).is_err());
    }

    #[test]
    fn blank_extension_is_dropped() {
        let args = ["in.sdds", "-extension= "].map(String::from);
        assert_eq!(parse(&args).unwrap().extension, None);
    }

    #[test]
    fn pipe_needs_a_rootname() {
        let err = exec_split(&["-pipe=input".to_string()]).unwrap_err();
        assert!(err.to_string().contains("rootname"));
    }
}
