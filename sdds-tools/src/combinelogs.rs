use std::collections::HashMap;
use std::path::Path;

use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_file::{Location, OutputOptions, SddsDataset};
use sdds_scalar::ColumnValues;

use crate::common::{no_items, open_input, unknown_option};
use crate::scan::{PipeFlags, ScannedArg, match_option, scan_args};

const OPTIONS: &[&str] = &["pipe", "overwrite"];

const TIME: &str = "Time";
const CA_ERRORS: &str = "CAerrors";

#[derive(Debug, Default)]
struct Flags {
    overwrite: bool,
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
                flags.pipe = PipeFlags::from_items(items)?;
                if flags.pipe.input {
                    sdds_bail!("sdds combinelogfiles reads files; only -pipe=output is accepted");
                }
            }
            Some(1) => {
                no_items(keyword, items)?;
                flags.overwrite = true;
            }
            _ => return Err(unknown_option(&arg)),
        }
    }
    Ok(flags)
}

/// Every sample logged for one channel, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
struct Channel {
    name: String,
    times: Vec<f64>,
    values: Vec<f64>,
}

/// The logged value's column in a file holding `Time`, that column and optionally `CAerrors`.
fn data_column(names: &[String]) -> SddsResult<&str> {
    if !(2..=3).contains(&names.len()) {
        sdds_bail!(
            "expected Time, one data column and optionally CAerrors, found {} columns",
            names.len()
        );
    }
    if !names.iter().any(|n| n == TIME) {
        sdds_bail!(NotFound: "no {} column", TIME);
    }
    if names.len() == 3 && !names.iter().any(|n| n == CA_ERRORS) {
        sdds_bail!(NotFound: "no {} column beside {}", CA_ERRORS, names.join(", "));
    }
    names
        .iter()
        .find(|n| *n != TIME && *n != CA_ERRORS)
        .map(String::as_str)
        .ok_or_else(|| sdds_err!(NotFound: "no data column beside {}", TIME))
}

/// Append every page of `location` to the channel it logs.
fn read_channel(location: &Location, channels: &mut Vec<Channel>) -> SddsResult<()> {
    let mut input = open_input(location)?;
    let names = input.column_names();
    let name = data_column(&names)
        .map_err(|e| e.with_context(format!("reading {location}")))?
        .to_string();
    let at = match channels.iter().position(|c| c.name == name) {
        Some(at) => at,
        None => {
            channels.push(Channel {
                name: name.clone(),
                ..Channel::default()
            });
            channels.len() - 1
        }
    };
    while input.read_page()?.is_some() {
        if input.row_count()? == 0 {
            continue;
        }
        let times = input.get_column_in_doubles(TIME)?;
        let values = input.get_column_in_doubles(&name)?;
        let channel = &mut channels[at];
        channel.times.extend(times);
        channel.values.extend(values);
    }
    input.terminate()
}

fn time_key(t: f64) -> u64 {
    // Fold -0.0 into 0.0.
    (t + 0.0).to_bits()
}

/// The times of the first channel that every other channel also logged, with each channel's
/// value at those times. A lone channel keeps all of its samples.
fn combine(channels: &[Channel]) -> SddsResult<(Vec<f64>, Vec<Vec<f64>>)> {
    let Some((first, others)) = channels.split_first() else {
        sdds_bail!(EmptyInput: "no pages in the input files");
    };
    if others.is_empty() {
        return Ok((first.times.clone(), vec![first.values.clone()]));
    }
    let lookups = others
        .iter()
        .map(|c| {
            c.times
                .iter()
                .zip(&c.values)
                .map(|(&t, &v)| (time_key(t), v))
                .collect::<HashMap<_, _>>()
        })
        .collect::<Vec<_>>();

    let mut times = Vec::new();
    let mut columns = vec![Vec::new(); channels.len()];
    for (&t, &v) in first.times.iter().zip(&first.values) {
        let key = time_key(t);
        let Some(row) = lookups
            .iter()
            .map(|lookup| lookup.get(&key).copied())
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };
        times.push(t);
        columns[0].push(v);
        for (column, value) in columns[1..].iter_mut().zip(row) {
            column.push(value);
        }
    }
    if times.is_empty() {
        sdds_bail!(EmptyInput: "no {} values are common to all inputs", TIME);
    }
    Ok((times, columns))
}

fn write_combined(
    output: &Location,
    channels: &[Channel],
    times: Vec<f64>,
    columns: Vec<Vec<f64>>,
) -> SddsResult<()> {
    let mut target = SddsDataset::new();
    target.initialize_output(output.clone(), &OutputOptions::binary())?;
    target.define_simple_column(TIME, Some("s"), SddsType::Double)?;
    for channel in channels {
        target.define_simple_column(&channel.name, None, SddsType::Double)?;
    }
    target.write_layout()?;
    target.start_page(times.len())?;
    target.set_column(TIME, &ColumnValues::from(times))?;
    for (channel, values) in channels.iter().zip(columns) {
        target.set_column(&channel.name, &ColumnValues::from(values))?;
    }
    target.write_page()?;
    target.terminate()
}

/// Merge data logger files that each hold one channel into one table on their common times.
pub fn exec_combinelogfiles(args: &[String]) -> SddsResult<()> {
    let flags = parse(args)?;
    let (inputs, output) = match (flags.positionals.as_slice(), flags.pipe.output) {
        ([], _) => sdds_bail!("no input file given"),
        (inputs, true) => (inputs, Location::Pipe),
        ([_], false) => sdds_bail!("no output file given; name one or give -pipe=output"),
        ([inputs @ .., output], false) => {
            if Path::new(output).exists() && !flags.overwrite {
                sdds_bail!(
                    DuplicateName: "output file {} already exists; give -overwrite to replace it",
                    output
                );
            }
            (inputs, Location::from(output.as_str()))
        }
    };

    let mut channels = Vec::new();
    for input in inputs {
        read_channel(&Location::from(input.as_str()), &mut channels)?;
    }
    let (times, columns) = combine(&channels)?;
    log::debug!(
        "combined {} channel(s) from {} file(s) into {} row(s)",
        channels.len(),
        inputs.len(),
        times.len()
    );
    write_combined(&output, &channels, times, columns)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    fn channel(name: &str, samples: &[(f64, f64)]) -> Channel {
        Channel {
            name: name.to_string(),
            times: samples.iter().map(|s| s.0).collect(),
            values: samples.iter().map(|s| s.1).collect(),
        }
    }

    fn names(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case(&["Time", "pv"], "pv")]
    #[case(&["pv", "Time"], "pv")]
    #[case(&["CAerrors", "Time", "pv"], "pv")]
    #[case(&["pv", "CAerrors", "Time"], "pv")]
    fn data_columns(#[case] columns: &[&str], #[case] expected: &str) {
        assert_eq!(data_column(&names(columns)).unwrap(), expected);
    }

    #[rstest]
    #[case(&["Time"], ErrorKind::InvalidArgument)]
    #[case(&["a", "b"], ErrorKind::NotFound)]
    #[case(&["Time", "a", "b"], ErrorKind::NotFound)]
    #[case(&["Time", "CAerrors"], ErrorKind::NotFound)]
    #[case(&["Time", "a", "b", "c"], ErrorKind::InvalidArgument)]
    fn unexpected_columns(#[case] columns: &[&str], #[case] kind: ErrorKind) {
        assert_eq!(data_column(&names(columns)).unwrap_err().kind(), kind);
    }

    #[test]
    fn lone_channel_keeps_every_sample() {
        let a = channel("a", &[(3.0, 30.0), (1.0, 10.0), (3.0, 31.0)]);
        let (times, columns) = combine(std::slice::from_ref(&a)).unwrap();
        assert_eq!(times, a.times);
        assert_eq!(columns, vec![a.values]);
    }

    #[test]
    fn only_common_times_survive() {
        let channels = [
            channel("a", &[(1.0, 10.0), (2.0, 20.0), (3.0, 30.0), (4.0, 40.0)]),
            channel("b", &[(4.0, 400.0), (2.0, 200.0), (-0.0, 0.5)]),
            channel("c", &[(2.0, 2000.0), (4.0, 4000.0), (5.0, 5000.0)]),
        ];
        let (times, columns) = combine(&channels).unwrap();
        assert_eq!(times, vec![2.0, 4.0]);
        assert_eq!(
            columns,
            vec![vec![20.0, 40.0], vec![200.0, 400.0], vec![2000.0, 4000.0]]
        );
    }

    #[test]
    fn negative_zero_matches_zero() {
        let channels = [channel("a", &[(0.0, 1.0)]), channel("b", &[(-0.0, 2.0)])];
        let (times, columns) = combine(&channels).unwrap();
        assert_eq!(times, vec![0.0]);
        assert_eq!(columns, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn disjoint_times_fail() {
        let channels = [channel("a", &[(1.0, 1.0)]), channel("b", &[(2.0, 2.0)])];
        assert_eq!(combine(&channels).unwrap_err().kind(), ErrorKind::EmptyInput);
        assert_eq!(combine(&[]).unwrap_err().kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn pipe_input_is_rejected() {
        assert!(parse(&names(&["-pipe=input"])).is_err());
        let flags = parse(&names(&["a", "b", "-pipe=out", "-over"])).unwrap();
        assert!(flags.pipe.output);
        assert!(flags.overwrite);
        assert_eq!(flags.positionals, ["a", "b"]);
    }
}
