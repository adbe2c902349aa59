use std::ops::Range;

use crate::compile::Opcode;
use crate::memory::Memories;

/// A user-defined function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Udf {
    name: String,
    source: String,
    number: usize,
    code: Range<usize>,
}

impl Udf {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The RPN text the function was defined with.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The body number, stable across redefinitions.
    pub fn number(&self) -> usize {
        self.number
    }

    /// The function's opcodes within [`UdfRegistry::code`].
    pub fn code(&self) -> Range<usize> {
        self.code.clone()
    }
}

/// User-defined functions, sorted by name, with their compiled code in one arena.
///
/// Callers refer to a function by body number. `index` maps a body number to the function's
/// position in the sorted list, so numbers stay valid as functions are added.
#[derive(Debug, Clone, Default)]
pub struct UdfRegistry {
    udfs: Vec<Udf>,
    index: Vec<usize>,
    code: Vec<Opcode>,
    unresolved: Vec<usize>,
    stale: usize,
}

impl UdfRegistry {
    /// The body number of `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.position(name).ok().map(|i| self.udfs[i].number)
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.udfs.binary_search_by(|u| u.name.as_str().cmp(name))
    }

    /// The function with body number `number`.
    pub fn get(&self, number: usize) -> Option<&Udf> {
        self.index.get(number).and_then(|&i| self.udfs.get(i))
    }

    /// Add or replace a function with already compiled code, returning its body number.
    ///
    /// A redefinition keeps the body number and points it at the new code. The old code stays
    /// in the arena, counted by [`UdfRegistry::stale`], until [`UdfRegistry::compact`] runs.
    pub fn insert(&mut self, name: &str, source: &str, ops: Vec<Opcode>) -> usize {
        let start = self.code.len();
        let code = start..start + ops.len();
        self.unresolved.extend(
            ops.iter()
                .enumerate()
                .filter(|(_, op)| matches!(op, Opcode::Unknown(_)))
                .map(|(i, _)| start + i),
        );
        self.code.extend(ops);

        match self.position(name) {
            Ok(i) => {
                let old = std::mem::replace(&mut self.udfs[i].code, code);
                self.unresolved.retain(|at| !old.contains(at));
                self.stale += old.len();
                self.udfs[i].source = source.to_string();
                self.udfs[i].number
            }
            Err(i) => {
                let number = self.udfs.len();
                self.udfs.insert(
                    i,
                    Udf {
                        name: name.to_string(),
                        source: source.to_string(),
                        number,
                        code,
                    },
                );
                self.index.push(0);
                for (position, udf) in self.udfs.iter().enumerate() {
                    self.index[udf.number] = position;
                }
                number
            }
        }
    }

    /// Rewrite unknown opcodes that now name a function or a memory. Returns how many were
    /// resolved.
    pub fn link(&mut self, memories: &Memories) -> usize {
        let resolved = self
            .unresolved
            .iter()
            .filter_map(|&at| match self.code.get(at) {
                Some(Opcode::Unknown(name)) => self
                    .find(name)
                    .map(Opcode::Call)
                    .or_else(|| memories.find(name).map(Opcode::Recall))
                    .map(|op| (at, op)),
                _ => None,
            })
            .collect::<Vec<_>>();
        let count = resolved.len();
        for (at, op) in resolved {
            self.code[at] = op;
        }
        let code = &self.code;
        self.unresolved
            .retain(|&at| matches!(code.get(at), Some(Opcode::Unknown(_))));
        count
    }

    /// Opcodes in the arena that no function refers to any more.
    pub fn stale(&self) -> usize {
        self.stale
    }

    /// Drop stale code from the arena, moving every function's code to its new place.
    ///
    /// Code ranges held elsewhere are invalidated, so this must not run while a function body is
    /// executing.
    pub fn compact(&mut self) {
        if self.stale == 0 {
            return;
        }
        let mut moved = vec![None; self.code.len()];
        let mut code = Vec::with_capacity(self.code.len() - self.stale);
        for udf in self.udfs.iter_mut() {
            let start = code.len();
            for at in udf.code.clone() {
                moved[at] = Some(code.len());
                code.push(self.code[at].clone());
            }
            udf.code = start..code.len();
        }
        self.unresolved = self
            .unresolved
            .iter()
            .filter_map(|&at| moved.get(at).copied().flatten())
            .collect();
        self.unresolved.sort_unstable();
        self.code = code;
        self.stale = 0;
    }

    /// The opcode arena.
    pub fn code(&self) -> &[Opcode] {
        &self.code
    }

    /// Functions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Udf> {
        self.udfs.iter()
    }

    pub fn len(&self) -> usize {
        self.udfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.udfs.is_empty()
    }

    /// Names still awaiting resolution.
    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.unresolved.iter().filter_map(|&at| match self.code.get(at) {
            Some(Opcode::Unknown(name)) => Some(name.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryValue;

    #[test]
    fn numbers_survive_insertion_order() {
        let mut udfs = UdfRegistry::default();
        let zeta = udfs.insert("zeta", "1", vec![Opcode::Number(1.0)]);
        let alpha = udfs.insert("alpha", "2", vec![Opcode::Number(2.0)]);
        assert_eq!(udfs.get(zeta).map(Udf::name), Some("zeta"));
        assert_eq!(udfs.get(alpha).map(Udf::name), Some("alpha"));
        assert_eq!(udfs.iter().map(Udf::name).collect::<Vec<_>>(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn redefinition_keeps_number() {
        let mut udfs = UdfRegistry::default();
        let first = udfs.insert("f", "later", vec![Opcode::Unknown("later".into())]);
        let second = udfs.insert("f", "2", vec![Opcode::Number(2.0)]);
        assert_eq!(first, second);
        let f = udfs.get(first).unwrap();
        assert_eq!(f.source(), "2");
        assert_eq!(&udfs.code()[f.code()], &[Opcode::Number(2.0)]);
        assert_eq!(udfs.unresolved().count(), 0);
    }

    #[test]
    fn compaction_reclaims_redefined_code() {
        let mut udfs = UdfRegistry::default();
        let f = udfs.insert(
            "f",
            "x y",
            vec![Opcode::Unknown("x".into()), Opcode::Unknown("y".into())],
        );
        let g = udfs.insert("g", "h 3", vec![Opcode::Unknown("h".into()), Opcode::Number(3.0)]);
        for round in 0..10 {
            udfs.insert("f", "1", vec![Opcode::Number(f64::from(round))]);
        }
        assert_eq!(udfs.stale(), 11);
        assert_eq!(udfs.code().len(), 14);

        udfs.compact();
        assert_eq!(udfs.stale(), 0);
        assert_eq!(udfs.code().len(), 3);
        let f = udfs.get(f).unwrap();
        assert_eq!(&udfs.code()[f.code()], &[Opcode::Number(9.0)]);
        let g = udfs.get(g).unwrap();
        assert_eq!(
            &udfs.code()[g.code()],
            &[Opcode::Unknown("h".into()), Opcode::Number(3.0)]
        );
        assert_eq!(udfs.unresolved().collect::<Vec<_>>(), vec!["h"]);
    }

    #[test]
    fn link_resolves_late_names() {
        let mut udfs = UdfRegistry::default();
        udfs.insert("f", "g h", vec![Opcode::Unknown("g".into()), Opcode::Unknown("h".into())]);
        let mut memories = Memories::default();
        let (slot, _) = memories.create("g", MemoryValue::Number(1.0));
        assert_eq!(udfs.link(&memories), 1);
        assert_eq!(udfs.code()[0], Opcode::Recall(slot));
        assert_eq!(udfs.unresolved().collect::<Vec<_>>(), vec!["h"]);
    }
}
