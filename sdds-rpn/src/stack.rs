use sdds_error::{SddsResult, sdds_bail};

/// Depth of every evaluation stack.
pub const STACK_DEPTH: usize = 500;

/// A stack with a fixed maximum depth.
///
/// Pushing past the depth fails with `StackOverflow`, popping an empty stack with
/// `StackUnderflow`. The `what` label names the stack in error messages.
#[derive(Debug, Clone)]
pub struct BoundedStack<T> {
    items: Vec<T>,
    depth: usize,
    what: &'static str,
}

impl<T> BoundedStack<T> {
    pub fn new(what: &'static str) -> Self {
        Self::with_depth(what, STACK_DEPTH)
    }

    pub fn with_depth(what: &'static str, depth: usize) -> Self {
        Self {
            items: Vec::new(),
            depth,
            what,
        }
    }

    pub fn push(&mut self, item: T) -> SddsResult<()> {
        if self.items.len() >= self.depth {
            sdds_bail!(StackOverflow: "{} stack overflow ({} items)", self.what, self.depth);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn pop(&mut self) -> SddsResult<T> {
        match self.items.pop() {
            Some(item) => Ok(item),
            None => sdds_bail!(StackUnderflow: "{} stack is empty", self.what),
        }
    }

    /// The top item.
    pub fn peek(&self) -> SddsResult<&T> {
        match self.items.last() {
            Some(item) => Ok(item),
            None => sdds_bail!(StackUnderflow: "{} stack is empty", self.what),
        }
    }

    /// Fail unless at least `n` items are present.
    pub fn require(&self, n: usize, op: &str) -> SddsResult<()> {
        if self.items.len() < n {
            sdds_bail!(
                StackUnderflow: "{} needs {} item(s) on the {} stack, found {}",
                op, n, self.what, self.items.len()
            );
        }
        Ok(())
    }

    /// Exchange the top two items.
    pub fn swap(&mut self) -> SddsResult<()> {
        self.require(2, "swap")?;
        let n = self.items.len();
        self.items.swap(n - 1, n - 2);
        Ok(())
    }

    /// Rotate the top `n` items so the top moves to the bottom of the group.
    pub fn roll_down(&mut self, n: usize) -> SddsResult<()> {
        self.require(n, "roll")?;
        let len = self.items.len();
        self.items[len - n..].rotate_right(1);
        Ok(())
    }

    /// Rotate the top `n` items so the bottom of the group moves to the top.
    pub fn roll_up(&mut self, n: usize) -> SddsResult<()> {
        self.require(n, "roll")?;
        let len = self.items.len();
        self.items[len - n..].rotate_left(1);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// Items from bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> BoundedStack<T> {
    /// Push a copy of the top item.
    pub fn dup(&mut self) -> SddsResult<()> {
        let top = self.peek()?.clone();
        self.push(top)
    }
}
