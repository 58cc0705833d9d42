//! Current-record cache.

/// Raw fields of the current record.
///
/// Field strings are reused across records, so advancing does not
/// reallocate once the widest record has been seen.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<String>,
    len: usize,
    index: i64,
    declared_width: usize,
    end_position: usize,
}

impl Record {
    pub(crate) fn new() -> Self {
        Self {
            index: -1,
            ..Self::default()
        }
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
        self.end_position = 0;
    }

    pub(crate) fn push(&mut self, value: &str) {
        if let Some(slot) = self.fields.get_mut(self.len) {
            slot.clear();
            slot.push_str(value);
        } else {
            self.fields.push(value.to_string());
        }
        self.len += 1;
    }

    pub(crate) fn set_index(&mut self, index: i64) {
        self.index = index;
    }

    pub(crate) fn set_declared_width(&mut self, width: usize) {
        self.declared_width = width;
    }

    pub(crate) fn set_end_position(&mut self, position: usize) {
        self.end_position = position;
    }

    /// Field at `index` if the record actually has it.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields[..self.len].get(index).map(String::as_str)
    }

    /// Number of fields actually present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record index (-1 before the first record).
    #[must_use]
    pub fn index(&self) -> i64 {
        self.index
    }

    /// Width fixed by the header or the first record.
    #[must_use]
    pub fn declared_width(&self) -> usize {
        self.declared_width
    }

    /// Whether the record has fewer fields than declared.
    #[must_use]
    pub fn is_short(&self) -> bool {
        self.len < self.declared_width
    }

    /// Buffer offset just after the record terminator.
    #[must_use]
    pub fn end_position(&self) -> usize {
        self.end_position
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields[..self.len].iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_slots() {
        let mut record = Record::new();
        record.push("alpha");
        record.push("beta");
        record.clear();
        record.push("x");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get(0), Some("x"));
        assert_eq!(record.get(1), None);
        assert_eq!(record.iter().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn test_short_record() {
        let mut record = Record::new();
        assert_eq!(record.index(), -1);
        record.set_declared_width(3);
        record.push("a");
        assert!(record.is_short());
        record.push("b");
        record.push("c");
        assert!(!record.is_short());
    }
}
