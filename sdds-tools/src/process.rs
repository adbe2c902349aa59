//! RPN-driven creation of columns and parameters, and row or page filtering.
//!
//! Operations run in command-line order on every page. Before an expression is evaluated the
//! values it may refer to are stored in RPN memories named after them: every parameter once per
//! page, and for column operations every column once per row. A later operation sees the
//! results of the earlier ones.

use sdds_dtype::SddsType;
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_file::{CopyMode, Location, SddsDataset};
use sdds_layout::{ColumnDefinition, DefinitionKind, InfoField, ParameterDefinition};
use sdds_mask::FlagOp;
use sdds_rpn::{MemoryValue, Program, RpnContext, infix_to_postfix};
use sdds_scalar::{ColumnValues, Value};

use crate::common::{ModeArgs, finish_filter, open_input, unknown_option};
use crate::filenames::process_filenames;
use crate::scan::{PipeFlags, ScannedArg, key_value, match_option, require_option, scan_args};

const OPTIONS: &[&str] = &["define", "redefine", "test", "majorOrder", "pipe"];

/// Where an expression comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Equation {
    Text(String),
    /// The equation is the value of this string parameter, read on every page.
    Parameter(String),
}

/// Attributes given as `key=value` items of `-define` and `-redefine`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Entries {
    sdds_type: Option<SddsType>,
    units: Option<String>,
    symbol: Option<String>,
    description: Option<String>,
    format_string: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    Define {
        kind: DefinitionKind,
        name: String,
        equation: Equation,
        entries: Entries,
        algebraic: bool,
        redefine: bool,
    },
    Test {
        kind: DefinitionKind,
        equation: String,
        autostop: bool,
        algebraic: bool,
    },
}

#[derive(Debug, Default)]
struct Flags {
    operations: Vec<Operation>,
    mode: ModeArgs,
    pipe: PipeFlags,
    positionals: Vec<String>,
}

fn column_or_parameter(word: &str) -> SddsResult<DefinitionKind> {
    Ok(
        match require_option(word, &["column", "parameter"], "definition kind")? {
            0 => DefinitionKind::Column,
            _ => DefinitionKind::Parameter,
        },
    )
}

fn parse_define(items: &[String], redefine: bool) -> SddsResult<Operation> {
    let [kind, name, equation, rest @ ..] = items else {
        sdds_bail!("-define needs a kind, a name and an equation");
    };
    let equation = match equation.strip_prefix('@') {
        Some(parameter) => Equation::Parameter(parameter.to_string()),
        None => Equation::Text(equation.clone()),
    };
    let mut entries = Entries::default();
    let mut algebraic = false;
    for item in rest {
        match key_value(item) {
            ("algebraic", None) => algebraic = true,
            ("type", Some(value)) => entries.sdds_type = Some(SddsType::parse_name(value)?),
            ("units", Some(value)) => entries.units = Some(value.to_string()),
            ("symbol", Some(value)) => entries.symbol = Some(value.to_string()),
            ("description", Some(value)) => entries.description = Some(value.to_string()),
            ("format_string", Some(value)) => entries.format_string = Some(value.to_string()),
            _ => sdds_bail!("unknown definition entry \"{}\"", item),
        }
    }
    Ok(Operation::Define {
        kind: column_or_parameter(kind)?,
        name: name.clone(),
        equation,
        entries,
        algebraic,
        redefine,
    })
}

fn parse_test(items: &[String]) -> SddsResult<Operation> {
    let [kind, equation, rest @ ..] = items else {
        sdds_bail!("-test needs a kind and an equation");
    };
    let (mut autostop, mut algebraic) = (false, false);
    for item in rest {
        match require_option(item, &["autostop", "algebraic"], "-test qualifier")? {
            0 => autostop = true,
            _ => algebraic = true,
        }
    }
    Ok(Operation::Test {
        kind: column_or_parameter(kind)?,
        equation: equation.clone(),
        autostop,
        algebraic,
    })
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
            Some(0) => flags.operations.push(parse_define(items, false)?),
            Some(1) => flags.operations.push(parse_define(items, true)?),
            Some(2) => flags.operations.push(parse_test(items)?),
            Some(3) => flags.mode.set_major_order(items)?,
            Some(4) => flags.pipe = PipeFlags::from_items(items)?,
            _ => return Err(unknown_option(&arg)),
        }
    }
    if flags.operations.is_empty() {
        log::warn!("no -define, -redefine or -test given; the data is copied unchanged");
    }
    Ok(flags)
}

/// RPN text of an equation, converting from infix when asked.
fn rpn_text(text: &str, algebraic: bool) -> SddsResult<String> {
    if algebraic {
        infix_to_postfix(text).map_err(|e| e.with_context(format!("converting \"{text}\"")))
    } else {
        Ok(text.to_string())
    }
}

fn memory_value(value: &Value) -> MemoryValue {
    match (value.as_str(), value.as_f64()) {
        (Some(text), _) => MemoryValue::Text(text.to_string()),
        (None, Some(x)) => MemoryValue::Number(x),
        (None, None) => MemoryValue::Number(f64::NAN),
    }
}

/// An operation ready to run: its program is compiled once unless it is read from a parameter.
struct Prepared<'a> {
    operation: &'a Operation,
    program: Option<Program>,
}

/// Runs operations against pages, keeping one memory per column and parameter.
struct Processor {
    ctx: RpnContext,
    columns: Vec<(String, usize)>,
    parameters: Vec<(String, usize)>,
}

impl Processor {
    fn new(target: &SddsDataset) -> SddsResult<Self> {
        let mut ctx = RpnContext::new();
        ctx.load_env_definitions()?;
        let layout = target.layout();
        let mut slots = |names: Vec<String>| -> SddsResult<Vec<(String, usize)>> {
            names
                .into_iter()
                .map(|name| {
                    let slot = ctx.create_memory(&name, MemoryValue::Number(0.0))?;
                    Ok((name, slot))
                })
                .collect()
        };
        let parameters = slots(layout.parameters().names())?;
        let columns = slots(layout.columns().names())?;
        Ok(Self {
            ctx,
            columns,
            parameters,
        })
    }

    fn compile(&mut self, text: &str, algebraic: bool) -> SddsResult<Program> {
        let text = rpn_text(text, algebraic)?;
        self.ctx
            .compile(&text)
            .map_err(|e| e.with_context(format!("compiling \"{text}\"")))
    }

    fn store_parameters(&mut self, page: &SddsDataset) -> SddsResult<()> {
        for (name, slot) in &self.parameters {
            let value = page.get_parameter(name)?;
            self.ctx.store_slot(*slot, memory_value(value));
        }
        Ok(())
    }

    fn store_row(&mut self, columns: &[(usize, &ColumnValues)], row: usize) {
        for (slot, values) in columns {
            let value = values
                .get(row)
                .map_or(MemoryValue::Number(f64::NAN), |v| memory_value(&v));
            self.ctx.store_slot(*slot, value);
        }
    }

    /// Evaluate a program for its result as a value of type `ty`.
    fn value(&mut self, program: &Program, ty: SddsType) -> SddsResult<Value> {
        self.ctx.clear();
        if ty == SddsType::String {
            self.ctx.run(program)?;
            return Ok(Value::String(self.ctx.pop_string()?));
        }
        let x = self.ctx.evaluate_program(program)?;
        if let Some(kind) = self.ctx.take_error() {
            log::debug!("evaluation raised {kind:?}; storing {x}");
        }
        Value::from_f64(ty, x)
    }

    /// Evaluate a test: the logical result, or a nonzero number when no logical is left.
    fn truth(&mut self, program: &Program) -> SddsResult<bool> {
        self.ctx.clear();
        self.ctx.run(program)?;
        self.ctx.take_error();
        match self.ctx.pop_logical() {
            Ok(b) => Ok(b),
            Err(_) => Ok(self.ctx.pop_number()? != 0.0),
        }
    }

    fn column_slots<'p>(
        &self,
        page: &'p SddsDataset,
    ) -> SddsResult<Vec<(usize, &'p ColumnValues)>> {
        self.columns
            .iter()
            .map(|(name, slot)| Ok((*slot, page.get_column(name)?)))
            .collect()
    }

    /// Evaluate `eval` once per row with that row's values in memory.
    fn per_row<T>(
        &mut self,
        page: &SddsDataset,
        program: &Program,
        mut eval: impl FnMut(&mut Self, &Program) -> SddsResult<T>,
    ) -> SddsResult<Vec<T>> {
        let columns = self.column_slots(page)?;
        let rows = page.row_count()?;
        let mut results = Vec::with_capacity(rows);
        for row in 0..rows {
            self.store_row(&columns, row);
            results.push(eval(self, program)?);
        }
        Ok(results)
    }

    /// The program of a step, compiling an equation held in a parameter of this page.
    fn program(&mut self, step: &Prepared<'_>, page: &SddsDataset) -> SddsResult<Program> {
        if let Some(program) = &step.program {
            return Ok(program.clone());
        }
        let Operation::Define {
            equation: Equation::Parameter(parameter),
            algebraic,
            ..
        } = step.operation
        else {
            sdds_bail!("operation has no program");
        };
        let text = page.get_parameter(parameter)?.as_str().ok_or_else(|| {
            sdds_err!(TypeMismatch: "equation parameter {} is not a string", parameter)
        })?;
        self.compile(text, *algebraic)
    }

    /// Apply every operation to the current page.
    fn apply(
        &mut self,
        prepared: &[Prepared<'_>],
        page: &mut SddsDataset,
    ) -> SddsResult<PageOutcome> {
        for step in prepared {
            self.store_parameters(page)?;
            let program = self.program(step, page)?;
            match step.operation {
                Operation::Define {
                    kind: DefinitionKind::Parameter,
                    name,
                    ..
                } => {
                    let ty = page.layout().parameters().get_by_name(name)?.sdds_type;
                    let value = self.value(&program, ty)?;
                    page.set_parameter(name, &value)?;
                }
                Operation::Define { name, .. } => {
                    let ty = page.layout().columns().get_by_name(name)?.sdds_type;
                    let values = self.per_row(page, &program, |p, program| p.value(program, ty))?;
                    page.set_column(name, &ColumnValues::from_values(ty, &values)?)?;
                }
                Operation::Test {
                    kind: DefinitionKind::Parameter,
                    autostop,
                    ..
                } => {
                    if !self.truth(&program)? {
                        return Ok(if *autostop {
                            PageOutcome::Stop
                        } else {
                            PageOutcome::Skip
                        });
                    }
                }
                Operation::Test { autostop, .. } => {
                    let selected = self.per_row(page, &program, Self::truth)?;
                    let kept = page.flag_rows_of_interest(&selected, FlagOp::And)?;
                    if kept == 0 && *autostop {
                        return Ok(PageOutcome::Stop);
                    }
                }
            }
        }
        Ok(PageOutcome::Write)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    Write,
    Skip,
    Stop,
}

/// Add or change definitions on the output before its layout is written.
fn define(target: &mut SddsDataset, operation: &Operation) -> SddsResult<()> {
    let Operation::Define {
        kind,
        name,
        entries,
        redefine,
        ..
    } = operation
    else {
        return Ok(());
    };
    let exists = match kind {
        DefinitionKind::Parameter => target.layout().parameters().index_of(name).is_some(),
        _ => target.layout().columns().index_of(name).is_some(),
    };
    if *redefine && exists {
        let changes = [
            (InfoField::Units, entries.units.clone()),
            (InfoField::Symbol, entries.symbol.clone()),
            (InfoField::Description, entries.description.clone()),
            (InfoField::FormatString, entries.format_string.clone()),
            (InfoField::Type, entries.sdds_type.map(|t| t.name().to_string())),
        ];
        for (field, value) in changes {
            if let Some(value) = value {
                target.change_information(*kind, name, field, &value)?;
            }
        }
        return Ok(());
    }
    let ty = entries.sdds_type.unwrap_or(SddsType::Double);
    macro_rules! with_entries {
        ($definition:expr) => {{
            let mut definition = $definition;
            definition.units = entries.units.clone();
            definition.symbol = entries.symbol.clone();
            definition.description = entries.description.clone();
            definition.format_string = entries.format_string.clone();
            definition
        }};
    }
    match kind {
        DefinitionKind::Parameter => {
            target.define_parameter(with_entries!(ParameterDefinition::new(name.as_str(), ty)))?;
        }
        _ => {
            target.define_column(with_entries!(ColumnDefinition::new(name.as_str(), ty)))?;
        }
    }
    Ok(())
}

/// Create and filter columns and parameters with RPN expressions.
pub fn exec_process(args: &[String]) -> SddsResult<()> {
    let flags = parse(args)?;
    let filenames = process_filenames(&flags.positionals, flags.pipe)?;
    let result = process(&flags, &filenames.input, &filenames.output);
    finish_filter(filenames, result)
}

fn process(flags: &Flags, input: &Location, output: &Location) -> SddsResult<()> {
    let mut source = open_input(input)?;
    let mut target = SddsDataset::new();
    target.initialize_copy(&source, Some(output.clone()), CopyMode::FreshWrite)?;
    flags.mode.apply(&mut target)?;
    for operation in &flags.operations {
        define(&mut target, operation)?;
    }
    target.write_layout()?;

    let mut processor = Processor::new(&target)?;
    let prepared = flags
        .operations
        .iter()
        .map(|operation| {
            let program = match operation {
                Operation::Define {
                    equation: Equation::Text(text),
                    algebraic,
                    ..
                } => Some(processor.compile(text, *algebraic)?),
                Operation::Define { .. } => None,
                Operation::Test {
                    equation,
                    algebraic,
                    ..
                } => Some(processor.compile(equation, *algebraic)?),
            };
            Ok(Prepared { operation, program })
        })
        .collect::<SddsResult<Vec<_>>>()?;

    while let Some(number) = source.read_page()? {
        target.copy_page(&source)?;
        match processor
            .apply(&prepared, &mut target)
            .map_err(|e| e.with_context(format!("processing page {number}")))?
        {
            PageOutcome::Write => {
                target.write_page()?;
            }
            PageOutcome::Skip => log::debug!("page {number} rejected by a parameter test"),
            PageOutcome::Stop => {
                log::debug!("stopping at page {number}");
                break;
            }
        }
    }
    target.terminate()?;
    source.terminate()
}
