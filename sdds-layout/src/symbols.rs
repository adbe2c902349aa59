use std::cmp::Ordering;

use sdds_error::{SddsResult, sdds_bail, sdds_err};

use crate::{Definition, InfoField, MatchOptions, WildcardPattern};

/// Definitions of one kind, in insertion order, with a name index searched by bisection.
///
/// Insertion order is the order definitions appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTable<D> {
    definitions: Vec<D>,
    // Positions into `definitions`, sorted by name.
    sorted: Vec<usize>,
}

impl<D> Default for SymbolTable<D> {
    fn default() -> Self {
        Self {
            definitions: Vec::new(),
            sorted: Vec::new(),
        }
    }
}

impl<D: Definition> SymbolTable<D> {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True when the table holds no definitions.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn search(&self, name: &str) -> Result<usize, usize> {
        self.sorted
            .binary_search_by(|&i| self.definitions[i].name().cmp(name))
    }

    /// Add a definition, returning its index. Fails with `DuplicateName` if the name is taken.
    pub fn define(&mut self, definition: D) -> SddsResult<usize> {
        definition.validate()?;
        match self.search(definition.name()) {
            Ok(_) => sdds_bail!(
                DuplicateName: "{} {} already exists",
                D::KIND,
                definition.name()
            ),
            Err(pos) => {
                let index = self.definitions.len();
                self.definitions.push(definition);
                self.sorted.insert(pos, index);
                Ok(index)
            }
        }
    }

    /// The index of a name, if defined.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.search(name).ok().map(|p| self.sorted[p])
    }

    /// The index of a name, failing with `NotFound`.
    pub fn lookup(&self, name: &str) -> SddsResult<usize> {
        self.index_of(name)
            .ok_or_else(|| sdds_err!(NotFound: "{} {} does not exist", D::KIND, name))
    }

    /// The name of the definition at `index`.
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.definitions.get(index).map(|d| d.name())
    }

    /// The definition at `index`.
    pub fn get(&self, index: usize) -> Option<&D> {
        self.definitions.get(index)
    }

    /// The definition with the given name, failing with `NotFound`.
    pub fn get_by_name(&self, name: &str) -> SddsResult<&D> {
        self.lookup(name).map(|i| &self.definitions[i])
    }

    /// All definitions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.definitions.iter()
    }

    /// All names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.definitions
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    /// Indices of definitions whose names match a wildcard pattern, in insertion order.
    pub fn match_names(&self, pattern: &str, options: MatchOptions) -> SddsResult<Vec<usize>> {
        let pattern = WildcardPattern::new(pattern, options)?;
        Ok(self
            .definitions
            .iter()
            .enumerate()
            .filter(|(_, d)| pattern.is_match(d.name()))
            .map(|(i, _)| i)
            .collect())
    }

    /// Change one attribute of a definition. Renames keep the name index consistent and fail
    /// with `DuplicateName` if the new name is taken.
    pub fn set_info(&mut self, index: usize, field: InfoField, value: &str) -> SddsResult<()> {
        let len = self.len();
        let def = self
            .definitions
            .get(index)
            .ok_or_else(|| sdds_err!(NotFound: "{} index {} out of range {}", D::KIND, index, len))?;
        if field == InfoField::Name {
            if def.name() == value {
                return Ok(());
            }
            if self.index_of(value).is_some() {
                sdds_bail!(DuplicateName: "{} {} already exists", D::KIND, value);
            }
        }
        let mut updated = def.clone();
        updated.set_info(field, value)?;
        updated.validate()?;
        self.definitions[index] = updated;
        if field == InfoField::Name {
            self.reindex();
        }
        Ok(())
    }

    /// Rename a definition.
    pub fn rename(&mut self, index: usize, name: &str) -> SddsResult<()> {
        self.set_info(index, InfoField::Name, name)
    }

    /// Replace the definition at `index` wholesale, keeping its position.
    pub fn replace(&mut self, index: usize, definition: D) -> SddsResult<()> {
        definition.validate()?;
        if let Some(existing) = self.index_of(definition.name()) {
            if existing != index {
                sdds_bail!(DuplicateName: "{} {} already exists", D::KIND, definition.name());
            }
        }
        match self.definitions.get_mut(index) {
            Some(slot) => *slot = definition,
            None => sdds_bail!(NotFound: "{} index {} out of range", D::KIND, index),
        }
        self.reindex();
        Ok(())
    }

    /// Remove the definitions at `indices`, keeping the rest in order.
    pub fn retain_indices(&mut self, keep: &[bool]) {
        let mut i = 0;
        self.definitions.retain(|_| {
            let k = keep.get(i).copied().unwrap_or(true);
            i += 1;
            k
        });
        self.reindex();
    }

    fn reindex(&mut self) {
        let defs = &self.definitions;
        let mut sorted: Vec<usize> = (0..defs.len()).collect();
        sorted.sort_by(|&a, &b| match defs[a].name().cmp(defs[b].name()) {
            Ordering::Equal => a.cmp(&b),
            o => o,
        });
        self.sorted = sorted;
    }
}
