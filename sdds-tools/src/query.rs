use std::io::{self, Write};

use sdds_error::{SddsError, SddsResult, sdds_bail};
use sdds_file::Location;
use sdds_layout::{Encoding, Endianness, Layout};

use crate::common::{no_items, open_input, unknown_option};
use crate::scan::{PipeFlags, ScannedArg, match_option, require_option, scan_args};

const OPTIONS: &[&str] = &[
    "columnList",
    "parameterList",
    "arrayList",
    "associateList",
    "version",
    "delimiter",
    "appendUnits",
    "pipe",
];

/// What to print for each file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Report {
    #[default]
    Summary,
    Columns,
    Parameters,
    Arrays,
    Associates,
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppendUnits {
    Parenthesized,
    Bare,
}

#[derive(Debug, Default)]
struct Flags {
    report: Report,
    delimiter: Option<String>,
    append_units: Option<AppendUnits>,
    pipe: bool,
    files: Vec<String>,
}

fn parse(args: &[String]) -> SddsResult<Flags> {
    let mut flags = Flags::default();
    let mut reports = 0;
    for arg in scan_args(args) {
        let (keyword, items) = match &arg {
            ScannedArg::Positional(word) => {
                flags.files.push(word.clone());
                continue;
            }
            ScannedArg::Option { keyword, items } => (keyword.as_str(), items.as_slice()),
        };
        let report = match match_option(keyword, OPTIONS) {
            Some(0) => Report::Columns,
            Some(1) => Report::Parameters,
            Some(2) => Report::Arrays,
            Some(3) => Report::Associates,
            Some(4) => Report::Version,
            Some(5) => {
                // Commas split items, so `-delimiter=,` arrives as two empty ones.
                if items.is_empty() {
                    sdds_bail!("-{} takes a value", keyword);
                }
                flags.delimiter = Some(items.join(","));
                continue;
            }
            Some(6) => {
                flags.append_units = Some(match items {
                    [] => AppendUnits::Parenthesized,
                    [word] => {
                        require_option(word, &["bare"], "-appendUnits qualifier")?;
                        AppendUnits::Bare
                    }
                    _ => sdds_bail!("-appendUnits takes at most one value"),
                });
                continue;
            }
            Some(7) => {
                let pipe = PipeFlags::from_items(items)?;
                if pipe.output {
                    sdds_bail!("sdds query writes text; only -pipe=input is accepted");
                }
                flags.pipe = true;
                continue;
            }
            _ => return Err(unknown_option(&arg)),
        };
        no_items(keyword, items)?;
        flags.report = report;
        reports += 1;
    }
    if reports > 1 {
        sdds_bail!("give only one list option or -version");
    }
    match (flags.files.is_empty(), flags.pipe) {
        (true, false) => sdds_bail!("no input file given"),
        (false, true) => sdds_bail!("file names cannot be given with -pipe"),
        _ => {}
    }
    Ok(flags)
}

/// Print a summary of the layout of each input.
pub fn exec_query(args: &[String]) -> SddsResult<()> {
    let flags = parse(args)?;
    let locations = if flags.pipe {
        vec![Location::Pipe]
    } else {
        flags.files.iter().map(|f| Location::from(f.as_str())).collect()
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for location in &locations {
        let mut input = open_input(location)?;
        report(&flags, &location.to_string(), input.layout(), &mut out)
            .map_err(SddsError::from)?;
        input.terminate()?;
    }
    out.flush().map_err(SddsError::from)
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("NULL")
}

fn report(flags: &Flags, name: &str, layout: &Layout, out: &mut impl Write) -> io::Result<()> {
    let delimiter = flags.delimiter.as_deref().unwrap_or("\n");
    let list = |out: &mut dyn Write, entries: Vec<(&str, Option<&str>)>| -> io::Result<()> {
        for (name, units) in entries {
            out.write_all(name.as_bytes())?;
            match (flags.append_units, units.filter(|u| !u.trim().is_empty())) {
                (Some(AppendUnits::Parenthesized), Some(units)) => write!(out, " ({units})")?,
                (Some(AppendUnits::Bare), Some(units)) => write!(out, " {units}")?,
                _ => {}
            }
            out.write_all(delimiter.as_bytes())?;
        }
        Ok(())
    };
    match flags.report {
        Report::Columns => list(
            out,
            layout
                .columns()
                .iter()
                .map(|d| (d.name.as_str(), d.units.as_deref()))
                .collect(),
        ),
        Report::Parameters => list(
            out,
            layout
                .parameters()
                .iter()
                .map(|d| (d.name.as_str(), d.units.as_deref()))
                .collect(),
        ),
        Report::Arrays => list(
            out,
            layout
                .arrays()
                .iter()
                .map(|d| (d.name.as_str(), d.units.as_deref()))
                .collect(),
        ),
        Report::Associates => list(
            out,
            layout
                .associates()
                .iter()
                .map(|d| (text(&d.filename), None))
                .collect(),
        ),
        Report::Version => writeln!(out, "{}", layout.version),
        Report::Summary => summary(name, layout, out),
    }
}

fn summary(name: &str, layout: &Layout, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "\nfile {} is in SDDS protocol version {}", name, layout.version)?;
    writeln!(out, "description: {}", text(&layout.description))?;
    writeln!(out, "contents: {}", text(&layout.contents))?;
    let mode = &layout.data_mode;
    match (mode.encoding, mode.endianness) {
        (Encoding::Ascii, _) => {
            writeln!(
                out,
                "\ndata is ASCII with {} lines per row and {} additional header lines expected.",
                mode.lines_per_row, mode.additional_header_lines
            )?;
            writeln!(out, "row counts: {}", if mode.no_row_counts { "no" } else { "yes" })?;
        }
        (Encoding::Binary, None) => writeln!(out, "\ndata is binary (no byte order declared)")?,
        (Encoding::Binary, Some(Endianness::Little)) => {
            writeln!(out, "\ndata is little-endian binary")?
        }
        (Encoding::Binary, Some(Endianness::Big)) => writeln!(out, "\ndata is big-endian binary")?,
    }

    if !layout.columns().is_empty() {
        writeln!(out, "\n{} columns of data:", layout.columns().len())?;
        writeln!(
            out,
            "{:<15} {:<15} {:<15} {:<15} {:<7} {:<7} DESCRIPTION",
            "NAME", "UNITS", "SYMBOL", "FORMAT", "TYPE", "FIELD"
        )?;
        writeln!(out, "{:72}LENGTH", "")?;
        for d in layout.columns().iter() {
            writeln!(
                out,
                "{:<15} {:<15} {:<15} {:<15} {:<7} {:<7} {}",
                d.name,
                text(&d.units),
                text(&d.symbol),
                text(&d.format_string),
                d.sdds_type.name(),
                d.field_length,
                text(&d.description)
            )?;
        }
    }

    if !layout.parameters().is_empty() {
        writeln!(out, "\n{} parameters:", layout.parameters().len())?;
        writeln!(
            out,
            "{:<19} {:<19} {:<19} {:<19} DESCRIPTION",
            "NAME", "UNITS", "SYMBOL", "TYPE"
        )?;
        for d in layout.parameters().iter() {
            writeln!(
                out,
                "{:<19} {:<19} {:<19} {:<19} {}",
                d.name,
                text(&d.units),
                text(&d.symbol),
                d.sdds_type.name(),
                text(&d.description)
            )?;
        }
    }

    if !layout.arrays().is_empty() {
        writeln!(out, "\n{} arrays of data:", layout.arrays().len())?;
        writeln!(
            out,
            "{:<15} {:<15} {:<15} {:<7} {:<15} {:<7} {:<15} DESCRIPTION",
            "NAME", "UNITS", "SYMBOL", "FORMAT", "TYPE", "FIELD", "GROUP"
        )?;
        for d in layout.arrays().iter() {
            let ty = format!("{}*^{}", d.sdds_type.name(), d.dimensions);
            writeln!(
                out,
                "{:<15} {:<15} {:<15} {:<7} {:<15} {:<7} {:<15} {}",
                d.name,
                text(&d.units),
                text(&d.symbol),
                text(&d.format_string),
                ty,
                d.field_length,
                text(&d.group_name),
                text(&d.description)
            )?;
        }
    }

    if !layout.associates().is_empty() {
        writeln!(out, "\n{} associates:", layout.associates().len())?;
        writeln!(
            out,
            "{:<5} {:<19} {:<29} {:<19} DESCRIPTION",
            "SDDS", "FILENAME", "PATH", "CONTENTS"
        )?;
        for d in layout.associates().iter() {
            writeln!(
                out,
                "{:<5} {:<19} {:<29} {:<19} {}",
                if d.sdds { "yes" } else { "no" },
                text(&d.filename),
                text(&d.path),
                text(&d.contents),
                text(&d.description)
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_dtype::SddsType;
    use sdds_layout::{ColumnDefinition, ParameterDefinition};

    use super::*;

    fn layout() -> Layout {
        let mut layout = Layout::new();
        layout
            .define_column(ColumnDefinition::new("x", SddsType::Double).units("m"))
            .unwrap();
        layout
            .define_column(ColumnDefinition::new("label", SddsType::String))
            .unwrap();
        layout
            .define_parameter(ParameterDefinition::new("step", SddsType::Long))
            .unwrap();
        layout
    }

    fn run(args: &[&str]) -> String {
        let args = args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let flags = parse(&args).unwrap();
        let mut out = Vec::new();
        report(&flags, "in.sdds", &layout(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[rstest]
    #[case(&["in.sdds", "-columnList"], "x\nlabel\n")]
    #[case(&["in.sdds", "-col", "-appendUnits"], "x (m)\nlabel\n")]
    #[case(&["in.sdds", "-col", "-appendUnits=bare", "-delimiter=,"], "x m,label,")]
    #[case(&["in.sdds", "-col", "-delim=a,b"], "xa,blabela,b")]
    #[case(&["in.sdds", "-col", "-delimiter= "], "x label ")]
    #[case(&["in.sdds", "-parameterList"], "step\n")]
    #[case(&["in.sdds", "-arrayList"], "")]
    fn lists(#[case] args: &[&str], #[case] expected: &str) {
        assert_eq!(run(args), expected);
    }

    #[test]
    fn summary_lists_every_definition() {
        let text = run(&["in.sdds"]);
        assert!(text.contains("file in.sdds is in SDDS protocol version"));
        assert!(text.contains("2 columns of data:"));
        assert!(text.contains("1 parameters:"));
        let x = text.lines().find(|l| l.starts_with("x ")).unwrap();
        assert!(x.contains("double"));
        assert!(x.contains(" m "));
    }

    #[test]
    fn one_report_at_a_time() {
        let args = ["in.sdds", "-columnList", "-parameterList"].map(String::from);
        assert!(parse(&args).is_err());
        assert!(parse(&["-columnList".to_string()]).is_err());
        assert!(parse(&["in.sdds".to_string(), "-delimiter".to_string()]).is_err());
    }
}
