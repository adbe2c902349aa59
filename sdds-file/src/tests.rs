use std::fs;
use std::path::Path;
use std::process::Command;

use proptest::prelude::*;
use rstest::rstest;
use sdds_dtype::SddsType;
use sdds_layout::{ArrayDefinition, Encoding, Endianness, Layout, MajorOrder};
use sdds_scalar::{ColumnValues, Value};

use crate::*;

type Row = (f64, i32, String, u8);

fn write_dataset(path: &Path, options: &OutputOptions, pages: &[Vec<Row>]) -> Vec<Page> {
    let mut ds = SddsDataset::new();
    ds.initialize_output(path, options).unwrap();
    ds.define_simple_parameter("title", None, SddsType::String)
        .unwrap();
    ds.define_simple_parameter("step", Some("s"), SddsType::Long)
        .unwrap();
    ds.define_array(ArrayDefinition::new("a", SddsType::Double, 1))
        .unwrap();
    ds.define_simple_column("x", Some("m"), SddsType::Double)
        .unwrap();
    ds.define_simple_column("n", None, SddsType::Long).unwrap();
    ds.define_simple_column("s", None, SddsType::String).unwrap();
    ds.define_simple_column("c", None, SddsType::Character)
        .unwrap();
    ds.write_layout().unwrap();

    let mut written = Vec::new();
    for (i, rows) in pages.iter().enumerate() {
        ds.start_page(rows.len()).unwrap();
        ds.set_parameter("title", &Value::from(format!("page {i}").as_str()))
            .unwrap();
        ds.set_parameter("step", &Value::Long(i as i32)).unwrap();
        ds.set_array("a", vec![2], &ColumnValues::from(vec![0.5, i as f64]))
            .unwrap();
        for (row, (x, n, s, c)) in rows.iter().enumerate() {
            ds.set_row(
                row,
                &[
                    ("x", Value::Double(*x)),
                    ("n", Value::Long(*n)),
                    ("s", Value::from(s.as_str())),
                    ("c", Value::Character(*c)),
                ],
            )
            .unwrap();
        }
        written.push(ds.page().unwrap().clone());
        ds.write_page().unwrap();
    }
    ds.terminate().unwrap();
    written
}

fn read_all(path: &Path, options: &InputOptions) -> (Layout, Vec<Page>) {
    let mut ds = SddsDataset::new();
    ds.initialize_input(path, options).unwrap();
    let mut pages = Vec::new();
    while let Some(number) = ds.read_page().unwrap() {
        assert_eq!(number, pages.len() + 1);
        pages.push(ds.page().unwrap().clone());
    }
    let layout = ds.layout().clone();
    ds.terminate().unwrap();
    (layout, pages)
}

fn sample_rows() -> Vec<Vec<Row>> {
    vec![
        vec![
            (1.0, 1, "alpha".to_string(), b'a'),
            (-2.5e-7, -3, "two words".to_string(), b'!'),
            (0.1, i32::MAX, String::new(), 0xe9),
        ],
        vec![],
        vec![(f64::MAX, 7, "\"quoted\" \\ slash".to_string(), b'"')],
    ]
}

#[test]
fn ascii_to_little_endian_binary() {
    let dir = tempfile::tempdir().unwrap();
    let ascii = dir.path().join("in.sdds");
    fs::write(
        &ascii,
        "SDDS1\n\
         &parameter name=p, type=string, &end\n\
         &column name=x, type=double, &end\n\
         &data mode=ascii, &end\n\
         hello\n\
         3\n\
         1.0\n\
         2.0\n\
         3.0\n",
    )
    .unwrap();
    let binary = dir.path().join("out.sdds");

    let mut input = SddsDataset::new();
    input
        .initialize_input(ascii.as_path(), &InputOptions::default())
        .unwrap();
    let mut output = SddsDataset::new();
    output
        .initialize_copy(&input, Some(Location::from(binary.as_path())), CopyMode::FreshWrite)
        .unwrap();
    let mut mode = output.layout().data_mode.clone();
    mode.encoding = Encoding::Binary;
    mode.endianness = Some(Endianness::Little);
    output.set_data_mode(mode).unwrap();
    output.write_layout().unwrap();
    assert_eq!(input.read_page().unwrap(), Some(1));
    output.copy_page(&input).unwrap();
    output.write_page().unwrap();
    assert_eq!(input.read_page().unwrap(), None);
    let original = input.layout().clone();
    input.terminate().unwrap();
    output.terminate().unwrap();

    let (layout, pages) = read_all(&binary, &InputOptions::default());
    assert_eq!(layout.data_mode.endianness, Some(Endianness::Little));
    assert_eq!(layout.parameters(), original.parameters());
    assert_eq!(layout.columns(), original.columns());
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].parameter(0).unwrap(), &Value::from("hello"));
    assert_eq!(pages[0].column(0).unwrap(), &ColumnValues::from(vec![1.0, 2.0, 3.0]));
}

#[rstest]
#[case(OutputOptions::ascii())]
#[case(OutputOptions::ascii().with_major_order(MajorOrder::Column).with_line_limit(16))]
#[case(OutputOptions::ascii().with_no_row_counts(true))]
#[case(OutputOptions::ascii().with_lines_per_row(2))]
#[case(OutputOptions::binary())]
#[case(OutputOptions::binary().with_endianness(Endianness::Big))]
#[case(OutputOptions::binary().with_major_order(MajorOrder::Column))]
fn encodings_round_trip(#[case] options: OutputOptions) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sdds");
    let written = write_dataset(&path, &options, &sample_rows());
    let (layout, pages) = read_all(&path, &InputOptions::default());
    assert_eq!(&layout.data_mode.major_order, &options.data_mode().major_order);
    assert_eq!(pages, written);
}

#[test]
fn byte_orders_read_alike() {
    let dir = tempfile::tempdir().unwrap();
    let big = dir.path().join("big.sdds");
    let little = dir.path().join("little.sdds");
    write_dataset(
        &big,
        &OutputOptions::binary().with_endianness(Endianness::Big),
        &sample_rows(),
    );
    write_dataset(
        &little,
        &OutputOptions::binary().with_endianness(Endianness::Little),
        &sample_rows(),
    );
    assert_ne!(fs::read(&big).unwrap(), fs::read(&little).unwrap());
    assert_eq!(
        read_all(&big, &InputOptions::default()).1,
        read_all(&little, &InputOptions::default()).1
    );
}

#[rstest]
#[case(OutputOptions::ascii())]
#[case(OutputOptions::ascii().with_major_order(MajorOrder::Column))]
#[case(OutputOptions::ascii().with_lines_per_row(2))]
#[case(OutputOptions::binary())]
#[case(OutputOptions::binary().with_major_order(MajorOrder::Column))]
fn comment_markers_in_data_survive(#[case] options: OutputOptions) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("marks.sdds");
    let mut ds = SddsDataset::new();
    ds.initialize_output(path.as_path(), &options).unwrap();
    ds.define_simple_parameter("note", None, SddsType::String)
        .unwrap();
    ds.define_simple_column("c", None, SddsType::Character)
        .unwrap();
    ds.define_simple_column("s", None, SddsType::String).unwrap();
    ds.define_simple_column("n", None, SddsType::Long).unwrap();
    ds.write_layout().unwrap();
    ds.start_page(3).unwrap();
    ds.set_parameter("note", &Value::from("! not a comment"))
        .unwrap();
    let rows = [
        (b'!', "!bang", 1),
        (b'a', "\"lead", 2),
        (0xe9, "caf\u{e9}", 3),
    ];
    for (row, (c, s, n)) in rows.iter().enumerate() {
        ds.set_row(
            row,
            &[
                ("c", Value::Character(*c)),
                ("s", Value::from(*s)),
                ("n", Value::Long(*n)),
            ],
        )
        .unwrap();
    }
    let written = ds.page().unwrap().clone();
    ds.write_page().unwrap();
    ds.terminate().unwrap();

    let (_, pages) = read_all(&path, &InputOptions::default());
    assert_eq!(pages, vec![written]);
}

#[test]
fn invalid_utf8_strings_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bytes.sdds");
    let mut ds = SddsDataset::new();
    ds.initialize_output(path.as_path(), &OutputOptions::binary())
        .unwrap();
    ds.define_simple_parameter("p", None, SddsType::String)
        .unwrap();
    ds.write_layout().unwrap();
    ds.start_page(0).unwrap();
    ds.set_parameter("p", &Value::from("\u{e9}")).unwrap();
    ds.write_page().unwrap();
    ds.terminate().unwrap();

    // Replace the UTF-8 encoding of the value with two lone Latin-1 bytes.
    let mut bytes = fs::read(&path).unwrap();
    let at = bytes
        .windows(2)
        .rposition(|w| w == [0xc3, 0xa9])
        .unwrap();
    bytes[at..at + 2].copy_from_slice(&[0xe9, 0xe9]);
    fs::write(&path, bytes).unwrap();

    let mut input = SddsDataset::new();
    input
        .initialize_input(path.as_path(), &InputOptions::default())
        .unwrap();
    let err = input.read_page().unwrap_err();
    assert_eq!(err.kind(), sdds_error::ErrorKind::TypeMismatch);
}

fn gzip_available() -> bool {
    Command::new("gzip")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

#[rstest]
#[case(false)]
#[case(true)]
fn compressed_input_copies_into_memory(#[case] subprocess: bool) {
    if subprocess && !gzip_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sdds.gz");
    let written = write_dataset(&path, &OutputOptions::binary(), &sample_rows());

    let mut input = SddsDataset::new();
    input
        .initialize_input(
            path.as_path(),
            &InputOptions::default().with_force_subprocess(subprocess),
        )
        .unwrap();
    assert_eq!(input.popen_used(), subprocess);

    let mut memory = SddsDataset::new();
    memory
        .initialize_copy(&input, None, CopyMode::InMemory)
        .unwrap();
    memory.write_layout().unwrap();
    while input.read_page().unwrap().is_some() {
        memory.copy_page(&input).unwrap();
        memory.write_page().unwrap();
    }
    input.terminate().unwrap();
    assert_eq!(memory.memory_pages(), written.as_slice());

    memory.select_page(2).unwrap();
    assert_eq!(
        memory.get_column("s").unwrap(),
        &ColumnValues::from(vec!["\"quoted\" \\ slash"])
    );
}

#[test]
fn split_pages_are_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.sdds");
    let rows = sample_rows();
    write_dataset(&path, &OutputOptions::binary(), &rows[..2]);

    let split = |source: &Path, stem: &str| -> Vec<std::path::PathBuf> {
        let mut input = SddsDataset::new();
        input.initialize_input(source, &InputOptions::default()).unwrap();
        let mut outputs = Vec::new();
        while let Some(number) = input.read_page().unwrap() {
            let target = dir.path().join(format!("{stem}{number:03}.sdds"));
            let mut output = SddsDataset::new();
            output
                .initialize_copy(&input, Some(Location::from(target.as_path())), CopyMode::FreshWrite)
                .unwrap();
            output.write_layout().unwrap();
            output.copy_page(&input).unwrap();
            output.write_page().unwrap();
            output.terminate().unwrap();
            outputs.push(target);
        }
        input.terminate().unwrap();
        outputs
    };

    let first = split(&path, "a");
    assert_eq!(first.len(), 2);
    for (i, single) in first.iter().enumerate() {
        let again = split(single, &format!("b{i}_"));
        assert_eq!(again.len(), 1);
        assert_eq!(fs::read(single).unwrap(), fs::read(&again[0]).unwrap());
    }
}

#[test]
fn append_continues_page_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grow.sdds");
    let rows = sample_rows();
    let first = write_dataset(&path, &OutputOptions::ascii(), &rows[..1]);

    let other = dir.path().join("other.sdds");
    let second = write_dataset(&other, &OutputOptions::binary(), &rows[2..]);

    let mut source = SddsDataset::new();
    source
        .initialize_input(other.as_path(), &InputOptions::default())
        .unwrap();
    let mut target = SddsDataset::new();
    target
        .initialize_copy(&source, Some(Location::from(path.as_path())), CopyMode::AppendWrite)
        .unwrap();
    assert_eq!(target.layout().data_mode.encoding, Encoding::Ascii);
    target.write_layout().unwrap();
    source.read_page().unwrap();
    target.copy_page(&source).unwrap();
    assert_eq!(target.write_page().unwrap(), 2);
    target.terminate().unwrap();
    source.terminate().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("! page number 2\n"));
    assert_eq!(text.matches("SDDS").count(), 1);

    let (_, pages) = read_all(&path, &InputOptions::default());
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0], first[0]);
    assert_eq!(pages[1].parameters(), second[0].parameters());
    assert_eq!(pages[1].columns(), second[0].columns());
}

#[test]
fn append_rejects_different_definitions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grow.sdds");
    write_dataset(&path, &OutputOptions::binary(), &sample_rows()[..1]);

    let mut source = SddsDataset::new();
    source
        .initialize_output(Location::from(dir.path().join("src.sdds")), &OutputOptions::binary())
        .unwrap();
    source
        .define_simple_column("x", None, SddsType::Double)
        .unwrap();
    source.write_layout().unwrap();

    let mut target = SddsDataset::new();
    assert!(
        target
            .initialize_copy(&source, Some(Location::from(path.as_path())), CopyMode::AppendWrite)
            .is_err()
    );
    source.terminate().unwrap();
}

fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::collection::vec(any::<char>(), 0..12).prop_map(String::from_iter),
        "[!\"][ -~]{0,6}",
    ]
}

fn rows_strategy() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(
        (
            prop::num::f64::NORMAL | prop::num::f64::ZERO | prop::num::f64::SUBNORMAL,
            any::<i32>(),
            text_strategy(),
            any::<u8>(),
        ),
        0..8,
    )
}

fn major_order(column: bool) -> MajorOrder {
    if column { MajorOrder::Column } else { MajorOrder::Row }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ascii_preserves_values(
        pages in prop::collection::vec(rows_strategy(), 1..4),
        column in any::<bool>(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.sdds");
        let options = OutputOptions::ascii().with_major_order(major_order(column));
        let written = write_dataset(&path, &options, &pages);
        let (_, read) = read_all(&path, &InputOptions::default());
        prop_assert_eq!(read, written);
    }

    #[test]
    fn binary_preserves_values(
        pages in prop::collection::vec(rows_strategy(), 1..4),
        big in any::<bool>(),
        column in any::<bool>(),
    ) {
        let order = if big { Endianness::Big } else { Endianness::Little };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.sdds");
        let options = OutputOptions::binary()
            .with_endianness(order)
            .with_major_order(major_order(column));
        let written = write_dataset(&path, &options, &pages);
        let (_, read) = read_all(&path, &InputOptions::default());
        prop_assert_eq!(read, written);
    }
}
