use std::ops::Range;

use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_file::{Location, OutputOptions, SddsDataset};
use sdds_scalar::{ColumnValues, Value};

use crate::common::{finish_filter, open_input, unknown_option};
use crate::filenames::process_filenames;
use crate::scan::{PipeFlags, ScannedArg, match_option, require_option, scan_args, single_item};

const OPTIONS: &[&str] = &[
    "pipe",
    "profileType",
    "columnPrefix",
    "method",
    "areaOfInterest",
    "background",
];

const METHODS: &[&str] = &["centerLine", "integrated", "averaged", "peak", "centralLine"];

/// How the lines of the area of interest are reduced to one profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Method {
    /// The largest value across the profile direction.
    #[default]
    Highest,
    /// The line whose sum is largest.
    CenterLine,
    Integrated,
    Averaged,
    /// The line through the largest single value.
    Peak,
}

/// `x` profiles run along the rows, `y` profiles across the lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Axis {
    #[default]
    X,
    Y,
}

/// Rows and lines bounding the profiled area, counted from 1. An end that is unset, past the
/// image or before its start reaches to the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Area {
    row_start: usize,
    row_end: Option<usize>,
    line_start: usize,
    line_end: Option<usize>,
}

impl Default for Area {
    fn default() -> Self {
        Self {
            row_start: 1,
            row_end: None,
            line_start: 1,
            line_end: None,
        }
    }
}

#[derive(Debug, Default)]
struct Flags {
    prefix: Option<String>,
    axis: Axis,
    method: Method,
    area: Area,
    background: Option<String>,
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
            Some(0) => flags.pipe = PipeFlags::from_items(items)?,
            Some(1) => {
                let axis: String = single_item(keyword, items)?;
                flags.axis = match require_option(&axis, &["x", "y"], "-profileType")? {
                    0 => Axis::X,
                    _ => Axis::Y,
                };
            }
            Some(2) => flags.prefix = Some(single_item(keyword, items)?),
            Some(3) => {
                let method: String = single_item(keyword, items)?;
                flags.method = match require_option(&method, METHODS, "-method")? {
                    1 => Method::Integrated,
                    2 => Method::Averaged,
                    3 => Method::Peak,
                    _ => Method::CenterLine,
                };
            }
            Some(4) => flags.area = parse_area(items)?,
            Some(5) => flags.background = Some(single_item(keyword, items)?),
            _ => return Err(unknown_option(&arg)),
        }
    }
    Ok(flags)
}

fn parse_area(items: &[String]) -> SddsResult<Area> {
    let [row_start, row_end, line_start, line_end] = items else {
        sdds_bail!("-areaOfInterest takes <rowStart>,<rowEnd>,<columnStart>,<columnEnd>");
    };
    let bound = |item: &String| match item.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(sdds_err!(
            "invalid -areaOfInterest bound \"{}\"; bounds count from 1",
            item
        )),
    };
    Ok(Area {
        row_start: bound(row_start)?,
        row_end: Some(bound(row_end)?),
        line_start: bound(line_start)?,
        line_end: Some(bound(line_end)?),
    })
}

/// The number at the start of `text`, or zero when there is none.
fn leading_number(text: &str) -> f64 {
    let text = text.trim_start();
    (1..=text.len())
        .rev()
        .filter(|&end| text.is_char_boundary(end))
        .find_map(|end| text[..end].parse::<f64>().ok())
        .filter(|x| x.is_finite())
        .unwrap_or(0.0)
}

/// An image stored one line per column, the lines ordered by the number after the prefix.
#[derive(Debug, Clone, PartialEq)]
struct Image {
    coordinates: Vec<f64>,
    types: Vec<SddsType>,
    lines: Vec<Vec<f64>>,
    rows: usize,
}

impl Image {
    /// Read the first page of `location`, keeping numeric columns whose names start with
    /// `prefix`.
    fn read(location: &Location, prefix: &str) -> SddsResult<Self> {
        let mut input = open_input(location)?;
        if input.read_page()?.is_none() {
            sdds_bail!(EmptyInput: "{} has no pages", location);
        }
        let rows = input.row_count()?;
        let mut lines = Vec::new();
        for name in input.column_names() {
            let Some(suffix) = name.strip_prefix(prefix) else {
                continue;
            };
            let ty = input.layout().column_type(&name)?;
            if !ty.is_numeric() {
                continue;
            }
            let values = input.get_column_in_doubles(&name)?;
            lines.push((leading_number(suffix), ty, values));
        }
        input.terminate()?;
        if lines.is_empty() {
            sdds_bail!(NotFound: "no numeric columns of {} start with {}", location, prefix);
        }
        lines.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self {
            coordinates: lines.iter().map(|l| l.0).collect(),
            types: lines.iter().map(|l| l.1).collect(),
            lines: lines.into_iter().map(|l| l.2).collect(),
            rows,
        })
    }

    fn subtract(&mut self, background: &Image) -> SddsResult<()> {
        if background.rows != self.rows {
            sdds_bail!(
                "the background has {} rows, the image {}",
                background.rows,
                self.rows
            );
        }
        if background.lines.len() != self.lines.len() {
            sdds_bail!(
                "the background has {} lines, the image {}",
                background.lines.len(),
                self.lines.len()
            );
        }
        if background.types != self.types {
            sdds_bail!(TypeMismatch: "background column types differ from the image's");
        }
        if background.coordinates != self.coordinates {
            sdds_bail!("background lines are numbered differently from the image's");
        }
        for (line, bg) in self.lines.iter_mut().zip(&background.lines) {
            for (value, b) in line.iter_mut().zip(bg) {
                *value -= b;
            }
        }
        Ok(())
    }

    /// Zero-based row and line ranges of `area` on this image.
    fn bounds(&self, area: &Area) -> SddsResult<(Range<usize>, Range<usize>)> {
        fn clamp(
            start: usize,
            end: Option<usize>,
            len: usize,
            what: &str,
        ) -> SddsResult<Range<usize>> {
            if start > len {
                sdds_bail!(
                    ValueOutOfRange: "the area of interest starts at {} {} of {}",
                    what,
                    start,
                    len
                );
            }
            let end = end.filter(|&e| e >= start && e <= len).unwrap_or(len);
            Ok(start - 1..end)
        }
        if self.rows == 0 {
            sdds_bail!(EmptyInput: "the image has no rows");
        }
        Ok((
            clamp(area.row_start, area.row_end, self.rows, "row")?,
            clamp(area.line_start, area.line_end, self.lines.len(), "line")?,
        ))
    }
}

/// Index of the first largest value.
fn first_max(values: impl Iterator<Item = f64>) -> usize {
    let mut best: Option<(usize, f64)> = None;
    for (i, x) in values.enumerate() {
        if best.is_none_or(|(_, b)| x > b) {
            best = Some((i, x));
        }
    }
    best.map_or(0, |(i, _)| i)
}

fn highest(values: impl Iterator<Item = f64>) -> f64 {
    values.reduce(f64::max).unwrap_or(f64::NAN)
}

/// One output page.
#[derive(Debug, Clone, PartialEq)]
struct Profile {
    positions: ColumnValues,
    values: Vec<f64>,
    zone: String,
}

fn profile(
    image: &Image,
    axis: Axis,
    method: Method,
    rows: Range<usize>,
    lines: Range<usize>,
) -> Profile {
    let line = |l: usize| &image.lines[l][rows.clone()];
    let zone = format!(
        "({},{}) x ({},{})",
        rows.start + 1,
        lines.start + 1,
        rows.end,
        lines.end
    );
    let (positions, values) = match axis {
        Axis::X => {
            let positions = rows.clone().map(|r| r as i64 + 1).collect::<Vec<_>>();
            let across = |r: usize| lines.clone().map(move |l| image.lines[l][r]);
            let values: Vec<f64> = match method {
                Method::Highest => rows.clone().map(|r| highest(across(r))).collect(),
                Method::Integrated => rows.clone().map(|r| across(r).sum::<f64>()).collect(),
                Method::Averaged => {
                    let n = lines.len() as f64;
                    rows.clone().map(|r| across(r).sum::<f64>() / n).collect()
                }
                Method::CenterLine | Method::Peak => {
                    let chosen = if method == Method::Peak {
                        peak(image, &rows, &lines).0
                    } else {
                        lines.start + first_max(lines.clone().map(|l| line(l).iter().sum::<f64>()))
                    };
                    line(chosen).to_vec()
                }
            };
            (ColumnValues::from(positions), values)
        }
        Axis::Y => {
            let positions = image.coordinates[lines.clone()].to_vec();
            let values: Vec<f64> = match method {
                Method::Highest => lines
                    .clone()
                    .map(|l| highest(line(l).iter().copied()))
                    .collect(),
                Method::Integrated => lines.clone().map(|l| line(l).iter().sum::<f64>()).collect(),
                Method::Averaged => {
                    let n = rows.len() as f64;
                    lines.clone().map(|l| line(l).iter().sum::<f64>() / n).collect()
                }
                Method::CenterLine | Method::Peak => {
                    let chosen = if method == Method::Peak {
                        peak(image, &rows, &lines).1
                    } else {
                        let across = |r: usize| lines.clone().map(|l| image.lines[l][r]).sum::<f64>();
                        rows.start + first_max(rows.clone().map(across))
                    };
                    lines.clone().map(|l| image.lines[l][chosen]).collect()
                }
            };
            (ColumnValues::from(positions), values)
        }
    };
    Profile {
        positions,
        values,
        zone,
    }
}

/// Line and row of the first largest value, scanning line by line.
fn peak(image: &Image, rows: &Range<usize>, lines: &Range<usize>) -> (usize, usize) {
    let width = rows.len();
    let at = first_max(
        lines
            .clone()
            .flat_map(|l| image.lines[l][rows.clone()].iter().copied()),
    );
    (lines.start + at / width, rows.start + at % width)
}

fn write_profile(output: &Location, axis: Axis, profile: Profile) -> SddsResult<()> {
    let mut target = SddsDataset::new();
    target.initialize_output(output.clone(), &OutputOptions::ascii())?;
    target.define_simple_parameter("Zone", None, SddsType::String)?;
    let (x, y) = match axis {
        Axis::X => (profile.positions.sdds_type(), SddsType::Double),
        Axis::Y => (SddsType::Double, profile.positions.sdds_type()),
    };
    target.define_simple_column("x", None, x)?;
    target.define_simple_column("y", None, y)?;
    target.write_layout()?;
    target.start_page(profile.values.len())?;
    target.set_parameter("Zone", &Value::String(profile.zone))?;
    let values = ColumnValues::from(profile.values);
    let (x, y) = match axis {
        Axis::X => (&profile.positions, &values),
        Axis::Y => (&values, &profile.positions),
    };
    target.set_column("x", x)?;
    target.set_column("y", y)?;
    target.write_page()?;
    target.terminate()
}

/// Reduce an image stored one line per column to an `x` or `y` profile.
pub fn exec_imageprofiles(args: &[String]) -> SddsResult<()> {
    let flags = parse(args)?;
    let Some(prefix) = flags.prefix.as_deref() else {
        sdds_bail!("-columnPrefix is required");
    };
    let filenames = process_filenames(&flags.positionals, flags.pipe)?;
    let result = image_profile(&flags, prefix, &filenames.input, &filenames.output);
    finish_filter(filenames, result)
}

fn image_profile(
    flags: &Flags,
    prefix: &str,
    input: &Location,
    output: &Location,
) -> SddsResult<()> {
    let mut image = Image::read(input, prefix)?;
    if let Some(background) = &flags.background {
        let background = Image::read(&Location::from(background.as_str()), prefix)?;
        image
            .subtract(&background)
            .map_err(|e| e.with_context("subtracting the background"))?;
    }
    let (rows, lines) = image.bounds(&flags.area)?;
    log::debug!(
        "profiling rows {:?} of lines {:?} from {} line(s) of {} row(s)",
        rows,
        lines,
        image.lines.len(),
        image.rows
    );
    let profile = profile(&image, flags.axis, flags.method, rows, lines);
    write_profile(output, flags.axis, profile)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    /// Three lines numbered 1, 2 and 5 of four rows each.
    fn image() -> Image {
        Image {
            coordinates: vec![1.0, 2.0, 5.0],
            types: vec![SddsType::Double; 3],
            lines: vec![
                vec![1.0, 2.0, 3.0, 4.0],
                vec![0.0, 9.0, 0.0, 0.0],
                vec![4.0, 4.0, 4.0, 4.0],
            ],
            rows: 4,
        }
    }

    fn names(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case(Method::Highest, vec![4.0, 9.0, 4.0, 4.0])]
    #[case(Method::Integrated, vec![5.0, 15.0, 7.0, 8.0])]
    #[case(Method::Averaged, vec![5.0 / 3.0, 5.0, 7.0 / 3.0, 8.0 / 3.0])]
    #[case(Method::CenterLine, vec![4.0, 4.0, 4.0, 4.0])]
    #[case(Method::Peak, vec![0.0, 9.0, 0.0, 0.0])]
    fn x_profiles(#[case] method: Method, #[case] expected: Vec<f64>) {
        let p = profile(&image(), Axis::X, method, 0..4, 0..3);
        assert_eq!(p.positions, ColumnValues::from(vec![1i64, 2, 3, 4]));
        assert_eq!(p.values, expected);
        assert_eq!(p.zone, "(1,1) x (4,3)");
    }

    #[rstest]
    #[case(Method::Highest, vec![4.0, 9.0, 4.0])]
    #[case(Method::Integrated, vec![10.0, 9.0, 16.0])]
    #[case(Method::Averaged, vec![2.5, 2.25, 4.0])]
    #[case(Method::CenterLine, vec![2.0, 9.0, 4.0])]
    #[case(Method::Peak, vec![2.0, 9.0, 4.0])]
    fn y_profiles(#[case] method: Method, #[case] expected: Vec<f64>) {
        let p = profile(&image(), Axis::Y, method, 0..4, 0..3);
        assert_eq!(p.positions, ColumnValues::from(vec![1.0, 2.0, 5.0]));
        assert_eq!(p.values, expected);
    }

    #[test]
    fn area_limits_the_profile() {
        let p = profile(&image(), Axis::X, Method::Integrated, 2..4, 1..3);
        assert_eq!(p.positions, ColumnValues::from(vec![3i64, 4]));
        assert_eq!(p.values, vec![4.0, 4.0]);
        assert_eq!(p.zone, "(3,2) x (4,3)");
    }

    #[rstest]
    #[case(Area::default(), 0..4, 0..3)]
    #[case(Area { row_start: 2, row_end: Some(3), line_start: 2, line_end: Some(9) }, 1..3, 1..3)]
    #[case(Area { row_start: 3, row_end: Some(1), line_start: 1, line_end: Some(1) }, 2..4, 0..1)]
    fn bounds(
        #[case] area: Area,
        #[case] rows: Range<usize>,
        #[case] lines: Range<usize>,
    ) {
        assert_eq!(image().bounds(&area).unwrap(), (rows, lines));
    }

    #[test]
    fn area_past_the_image_fails() {
        let area = Area {
            row_start: 5,
            ..Area::default()
        };
        assert_eq!(
            image().bounds(&area).unwrap_err().kind(),
            ErrorKind::ValueOutOfRange
        );
    }

    #[test]
    fn background_is_subtracted() {
        let mut img = image();
        let mut background = image();
        background.lines = vec![vec![1.0; 4]; 3];
        img.subtract(&background).unwrap();
        assert_eq!(img.lines[2], vec![3.0; 4]);

        background.coordinates[2] = 6.0;
        assert!(img.subtract(&background).is_err());
        background.rows = 3;
        assert!(img.subtract(&background).is_err());
    }

    #[rstest]
    #[case("12", 12.0)]
    #[case("3.5mm", 3.5)]
    #[case("-2", -2.0)]
    #[case("x", 0.0)]
    #[case("", 0.0)]
    fn line_numbers(#[case] suffix: &str, #[case] expected: f64) {
        assert_eq!(leading_number(suffix), expected);
    }

    #[test]
    fn options() {
        let flags = parse(&names(&[
            "in",
            "-columnPrefix=Line",
            "-profile=y",
            "-method=central",
            "-area=1,2,3,4",
        ]))
        .unwrap();
        assert_eq!(flags.prefix.as_deref(), Some("Line"));
        assert_eq!(flags.axis, Axis::Y);
        assert_eq!(flags.method, Method::CenterLine);
        assert_eq!(flags.area.line_end, Some(4));
        assert!(parse(&names(&["-area=0,2,3,4"])).is_err());
        assert!(parse(&names(&["-method=median"])).is_err());
    }
}
