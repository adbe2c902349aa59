use std::ops::Range;

use rand::SeedableRng;
use rand::rngs::StdRng;
use sdds_error::{ErrorKind, SddsResult, sdds_bail, sdds_err};

use crate::builtins::{builtin, find_builtin, store_top, store_top_string};
use crate::compile::{Opcode, Program};
use crate::memory::{Memories, MemoryValue};
use crate::stack::{BoundedStack, STACK_DEPTH};
use crate::udf::UdfRegistry;

/// Default bound on opcodes executed by one call.
pub const DEFAULT_CYCLE_LIMIT: usize = 10_000;

/// Names that can never be a UDF.
const RESERVED: &[&str] = &["?", ":", "$", "sto", "ssto", "udf"];

/// The state of an RPN evaluator: stacks, memories, user-defined functions and flags.
///
/// Evaluation failures are returned as errors and also latched in the context's error flag,
/// which stays set until [`RpnContext::take_error`] clears it.
#[derive(Debug)]
pub struct RpnContext {
    pub(crate) numbers: BoundedStack<f64>,
    pub(crate) strings: BoundedStack<String>,
    pub(crate) logicals: BoundedStack<bool>,
    pub(crate) arrays: BoundedStack<Vec<f64>>,
    pub(crate) memories: Memories,
    pub(crate) udfs: UdfRegistry,
    error: Option<ErrorKind>,
    cycle_limit: usize,
    trace: bool,
    numeric_high: bool,
    relink: bool,
    pub(crate) input_depth: usize,
    running: usize,
    rng: Option<StdRng>,
}

impl Default for RpnContext {
    fn default() -> Self {
        Self {
            numbers: BoundedStack::new("numeric"),
            strings: BoundedStack::new("string"),
            logicals: BoundedStack::new("logical"),
            arrays: BoundedStack::new("array"),
            memories: Memories::default(),
            udfs: UdfRegistry::default(),
            error: None,
            cycle_limit: DEFAULT_CYCLE_LIMIT,
            trace: false,
            numeric_high: false,
            relink: false,
            input_depth: 0,
            running: 0,
            rng: None,
        }
    }
}

struct Frame {
    in_udf: bool,
    base: usize,
    pc: usize,
    end: usize,
}

impl RpnContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the opcodes executed by one call of [`RpnContext::run`].
    pub fn with_cycle_limit(mut self, limit: usize) -> Self {
        self.cycle_limit = limit.max(1);
        self
    }

    pub fn with_numeric_high(mut self, numeric_high: bool) -> Self {
        self.numeric_high = numeric_high;
        self
    }

    /// Seed the random number generator for reproducible `rnd`/`grnd` sequences.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    pub fn cycle_limit(&self) -> usize {
        self.cycle_limit
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn set_numeric_high(&mut self, numeric_high: bool) {
        self.numeric_high = numeric_high;
    }

    /// Whether string comparisons order digit runs by value.
    pub fn numeric_high(&self) -> bool {
        self.numeric_high
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        self.rng.get_or_insert_with(StdRng::from_os_rng)
    }

    pub(crate) fn seed_rng(&mut self, rng: StdRng) {
        self.rng = Some(rng);
    }

    /// Raise the error flag.
    pub fn set_error(&mut self, kind: ErrorKind) {
        self.error = Some(kind);
    }

    /// Whether the error flag is raised.
    pub fn check_error(&self) -> bool {
        self.error.is_some()
    }

    /// Clear the error flag, returning the kind that raised it.
    pub fn take_error(&mut self) -> Option<ErrorKind> {
        self.error.take()
    }

    /// Empty the numeric, string and logical stacks. Memories and functions are kept.
    pub fn clear(&mut self) {
        self.numbers.clear();
        self.strings.clear();
        self.logicals.clear();
    }

    pub fn push_number(&mut self, x: f64) -> SddsResult<()> {
        self.numbers.push(x)
    }

    pub fn pop_number(&mut self) -> SddsResult<f64> {
        self.numbers.pop()
    }

    pub fn push_string(&mut self, s: impl Into<String>) -> SddsResult<()> {
        self.strings.push(s.into())
    }

    pub fn pop_string(&mut self) -> SddsResult<String> {
        self.strings.pop()
    }

    pub fn push_logical(&mut self, b: bool) -> SddsResult<()> {
        self.logicals.push(b)
    }

    pub fn pop_logical(&mut self) -> SddsResult<bool> {
        self.logicals.pop()
    }

    /// The numeric stack, bottom first.
    pub fn numbers(&self) -> impl Iterator<Item = f64> + '_ {
        self.numbers.iter().copied()
    }

    pub fn memories(&self) -> &Memories {
        &self.memories
    }

    /// The slot of memory `name`, creating it holding `initial` when absent.
    ///
    /// A new memory may not take the name of a built-in, a function, or a reserved word.
    pub fn create_memory(&mut self, name: &str, initial: MemoryValue) -> SddsResult<usize> {
        if self.memories.find(name).is_none() {
            if RESERVED.contains(&name) || find_builtin(name).is_some() {
                sdds_bail!(DuplicateName: "can't create memory {}: it is a keyword", name);
            }
            if self.udfs.find(name).is_some() {
                sdds_bail!(DuplicateName: "can't create memory {}: it is a function", name);
            }
        }
        let (slot, created) = self.memories.create(name, initial);
        if created {
            self.relink = true;
        }
        Ok(slot)
    }

    /// Store a number in memory `name`, creating it when absent.
    pub fn store(&mut self, name: &str, x: f64) -> SddsResult<usize> {
        let slot = self.create_memory(name, MemoryValue::Number(x))?;
        self.memories.set(slot, MemoryValue::Number(x));
        Ok(slot)
    }

    /// Store a string in memory `name`, creating it when absent.
    pub fn store_string(&mut self, name: &str, s: &str) -> SddsResult<usize> {
        let value = MemoryValue::Text(s.to_string());
        let slot = self.create_memory(name, value.clone())?;
        self.memories.set(slot, value);
        Ok(slot)
    }

    /// Overwrite a memory by slot, as returned by [`RpnContext::create_memory`].
    pub fn store_slot(&mut self, slot: usize, value: MemoryValue) {
        self.memories.set(slot, value);
    }

    pub fn recall(&self, name: &str) -> Option<&MemoryValue> {
        self.memories.find(name).and_then(|slot| self.memories.get(slot))
    }

    pub fn udfs(&self) -> &UdfRegistry {
        &self.udfs
    }

    /// Define or redefine a function, returning its body number.
    ///
    /// The name may not be a built-in, a memory, or a reserved word. Unknown names in the body,
    /// and in earlier bodies that referred to this function before it existed, are relinked.
    pub fn create_udf(&mut self, name: &str, body: &str) -> SddsResult<usize> {
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            sdds_bail!("invalid function name \"{}\"", name);
        }
        if RESERVED.contains(&name) || find_builtin(name).is_some() {
            sdds_bail!(DuplicateName: "can't create function {}: it is a keyword", name);
        }
        if self.memories.find(name).is_some() {
            sdds_bail!(DuplicateName: "can't create function {}: it is a memory", name);
        }
        let program = self.compile(body)?;
        let number = self.udfs.insert(name, body.trim(), program.ops);
        log::debug!("defined function {name} as body {number}");
        if self.running == 0 {
            self.udfs.compact();
        }
        self.link_udfs();
        Ok(number)
    }

    /// Resolve unknown names in function bodies against the current functions and memories.
    pub fn link_udfs(&mut self) -> usize {
        let resolved = self.udfs.link(&self.memories);
        self.relink = false;
        if resolved > 0 {
            log::debug!("relinked {resolved} function reference(s)");
        }
        resolved
    }

    /// Compile and run `text`, leaving its results on the stacks.
    pub fn execute(&mut self, text: &str) -> SddsResult<()> {
        let program = self.compile(text).inspect_err(|e| self.error = Some(e.kind()))?;
        self.run(&program)
    }

    /// Compile and run `text`, returning the number it leaves on top of the numeric stack.
    ///
    /// The result is popped. An expression that leaves no number fails with `StackUnderflow`.
    pub fn evaluate(&mut self, text: &str) -> SddsResult<f64> {
        self.execute(text)?;
        self.numbers.pop().inspect_err(|e| self.error = Some(e.kind()))
    }

    /// Run a compiled program and pop its numeric result.
    pub fn evaluate_program(&mut self, program: &Program) -> SddsResult<f64> {
        self.run(program)?;
        self.numbers.pop().inspect_err(|e| self.error = Some(e.kind()))
    }

    /// Run a compiled program.
    pub fn run(&mut self, program: &Program) -> SddsResult<()> {
        if self.relink {
            self.link_udfs();
        }
        // Frames hold arena offsets, so functions redefined mid-run are reclaimed afterwards.
        if self.running == 0 {
            self.udfs.compact();
        }
        self.running += 1;
        let result = self.run_ops(program);
        self.running -= 1;
        result.inspect_err(|e| self.error = Some(e.kind()))
    }

    fn udf_code(&self, number: usize) -> SddsResult<Range<usize>> {
        self.udfs
            .get(number)
            .map(|udf| udf.code())
            .ok_or_else(|| sdds_err!(NotFound: "no function with body number {}", number))
    }

    fn run_ops(&mut self, program: &Program) -> SddsResult<()> {
        let mut frames = vec![Frame {
            in_udf: false,
            base: 0,
            pc: 0,
            end: program.ops.len(),
        }];
        let mut cycles = 0usize;
        while let Some(frame) = frames.last_mut() {
            if frame.pc >= frame.end {
                frames.pop();
                continue;
            }
            let (at, base, in_udf) = (frame.pc, frame.base, frame.in_udf);
            frame.pc += 1;

            cycles += 1;
            if cycles > self.cycle_limit {
                sdds_bail!(
                    CycleLimitExceeded: "more than {} opcodes executed", self.cycle_limit
                );
            }
            let op = if in_udf {
                self.udfs.code().get(at)
            } else {
                program.ops.get(at)
            }
            .cloned()
            .ok_or_else(|| sdds_err!(ValueOutOfRange: "opcode {} is out of range", at))?;
            if self.trace {
                log::trace!("{op:?} numbers={:?}", self.numbers.iter().collect::<Vec<_>>());
            }

            let call = match op {
                Opcode::Number(x) => {
                    self.numbers.push(x)?;
                    None
                }
                Opcode::Str(s) => {
                    self.strings.push(s)?;
                    None
                }
                Opcode::Builtin(index) => {
                    self.call_builtin(index)?;
                    None
                }
                Opcode::Call(number) => Some(number),
                Opcode::Recall(slot) => {
                    self.recall_slot(slot)?;
                    None
                }
                Opcode::Store(slot) => {
                    store_top(self, slot)?;
                    None
                }
                Opcode::StoreString(slot) => {
                    store_top_string(self, slot)?;
                    None
                }
                Opcode::If { target } => {
                    if !self.logicals.pop()? {
                        if let Some(frame) = frames.last_mut() {
                            frame.pc = base + target;
                        }
                    }
                    None
                }
                Opcode::Else { target } => {
                    if let Some(frame) = frames.last_mut() {
                        frame.pc = base + target;
                    }
                    None
                }
                Opcode::EndIf => None,
                Opcode::Unknown(name) => match self.resolve_late(&name) {
                    Some(Opcode::Call(number)) => Some(number),
                    Some(Opcode::Recall(slot)) => {
                        self.recall_slot(slot)?;
                        None
                    }
                    _ => sdds_bail!(UnknownToken: "unknown token {}", name),
                },
            };

            if let Some(number) = call {
                if frames.len() >= STACK_DEPTH {
                    sdds_bail!(StackOverflow: "function calls nested more than {} deep", STACK_DEPTH);
                }
                let code = self.udf_code(number)?;
                frames.push(Frame {
                    in_udf: true,
                    base: code.start,
                    pc: code.start,
                    end: code.end,
                });
            }
        }
        Ok(())
    }

    fn call_builtin(&mut self, index: usize) -> SddsResult<()> {
        let f = builtin(index)
            .ok_or_else(|| sdds_err!(NotFound: "no built-in at index {}", index))?;
        self.numbers.require(f.arity, f.name)?;
        (f.op)(self)
    }

    fn recall_slot(&mut self, slot: usize) -> SddsResult<()> {
        match self.memories.get(slot) {
            Some(MemoryValue::Number(x)) => self.numbers.push(*x),
            Some(MemoryValue::Text(s)) => {
                let s = s.clone();
                self.strings.push(s)
            }
            None => sdds_bail!(NotFound: "no memory in slot {}", slot),
        }
    }
}
