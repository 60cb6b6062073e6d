// Index-addressed pool with an embedded free list.

#[derive(Debug)]
enum Entry<T> {
    /// Free slot holding the index of the next free slot, 0 terminates.
    Vacant(usize),
    Occupied(T),
}

/// Growable pool handing out `usize` handles.
///
/// Index 0 is never issued: it terminates the free list and doubles as the
/// "no payload" handle in ring records.
#[derive(Debug)]
pub struct Slab<T> {
    entries: Vec<Entry<T>>,
    next: usize,
    len: usize,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slab<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity + 1);
        entries.push(Entry::Vacant(0)); // reserved
        Self {
            entries,
            next: 0,
            len: 0,
        }
    }

    /// Store `value`, reusing the most recently freed slot if any.
    pub fn push(&mut self, value: T) -> usize {
        self.len += 1;
        if self.next == 0 {
            self.entries.push(Entry::Occupied(value));
            return self.entries.len() - 1;
        }

        let index = self.next;
        let old = std::mem::replace(&mut self.entries[index], Entry::Occupied(value));
        if let Entry::Vacant(next) = old {
            self.next = next;
        }
        index
    }

    /// Remove and return the value at `index`. `None` for the reserved index,
    /// out-of-range indices and slots that are already free.
    pub fn pop(&mut self, index: usize) -> Option<T> {
        if index == 0 {
            return None;
        }
        let entry = self.entries.get_mut(index)?;
        if let Entry::Vacant(_) = entry {
            return None;
        }
        match std::mem::replace(entry, Entry::Vacant(self.next)) {
            Entry::Occupied(value) => {
                self.next = index;
                self.len -= 1;
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        match self.entries.get(index)? {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant(_) => None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_start_at_one() {
        let mut slab = Slab::new();
        assert_eq!(slab.push('a'), 1);
        assert_eq!(slab.push('b'), 2);
        assert_eq!(slab.pop(0), None);
    }

    #[test]
    fn freed_slots_are_reused_lifo() {
        let mut slab = Slab::new();
        let a = slab.push(10);
        let b = slab.push(20);
        let c = slab.push(30);
        assert_eq!(slab.pop(a), Some(10));
        assert_eq!(slab.pop(c), Some(30));
        assert_eq!(slab.push(40), c);
        assert_eq!(slab.push(50), a);
        assert_eq!(slab.push(60), 4);
        assert_eq!(slab.get(b), Some(&20));
        assert_eq!(slab.len(), 4);
    }

    #[test]
    fn double_pop_is_rejected() {
        let mut slab = Slab::new();
        let h = slab.push("x");
        assert_eq!(slab.pop(h), Some("x"));
        assert_eq!(slab.pop(h), None);
        assert_eq!(slab.pop(99), None);
        assert!(slab.is_empty());
    }
}
