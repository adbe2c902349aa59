use std::fmt::{Display, Formatter};

/// The content of a named memory.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryValue {
    Number(f64),
    Text(String),
}

impl MemoryValue {
    pub fn is_text(&self) -> bool {
        matches!(self, MemoryValue::Text(_))
    }

    /// The numeric content, or `None` for a string memory.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MemoryValue::Number(v) => Some(*v),
            MemoryValue::Text(_) => None,
        }
    }
}

impl Display for MemoryValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryValue::Number(v) => write!(f, "{v}"),
            MemoryValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Named memories addressed by stable slot numbers.
///
/// Names are kept sorted for lookup; slots never move once created, so compiled code can refer
/// to a memory by slot.
#[derive(Debug, Clone, Default)]
pub struct Memories {
    names: Vec<(String, usize)>,
    values: Vec<MemoryValue>,
}

impl Memories {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.names
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| self.names[i].1)
    }

    /// The slot of `name`, creating it holding `initial` when absent.
    ///
    /// The flag is true when the memory was created.
    pub fn create(&mut self, name: &str, initial: MemoryValue) -> (usize, bool) {
        match self.names.binary_search_by(|(n, _)| n.as_str().cmp(name)) {
            Ok(i) => (self.names[i].1, false),
            Err(i) => {
                let slot = self.values.len();
                self.values.push(initial);
                self.names.insert(i, (name.to_string(), slot));
                (slot, true)
            }
        }
    }

    pub fn get(&self, slot: usize) -> Option<&MemoryValue> {
        self.values.get(slot)
    }

    /// Overwrite a slot. Unknown slots are ignored.
    pub fn set(&mut self, slot: usize, value: MemoryValue) {
        if let Some(v) = self.values.get_mut(slot) {
            *v = value;
        }
    }

    /// Memories in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MemoryValue)> {
        self.names
            .iter()
            .filter_map(|(name, slot)| Some((name.as_str(), self.values.get(*slot)?)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_stable() {
        let mut mem = Memories::default();
        let (b, created) = mem.create("b", MemoryValue::Number(0.0));
        assert!(created);
        let (a, _) = mem.create("a", MemoryValue::Text("x".into()));
        assert_eq!(mem.create("b", MemoryValue::Number(9.0)), (b, false));
        mem.set(b, MemoryValue::Number(2.5));
        assert_eq!(mem.find("b"), Some(b));
        assert_eq!(mem.find("a"), Some(a));
        assert_eq!(mem.find("c"), None);
        assert_eq!(
            mem.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(mem.get(b).and_then(MemoryValue::as_f64), Some(2.5));
    }
}
