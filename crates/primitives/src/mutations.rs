//! Bulk mutation batches: parallel row keys and cell writes submitted to the
//! column store as one call.

/// A single cell write: column family, qualifier and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Column family
    pub family: &'static str,
    /// Column qualifier
    pub qualifier: String,
    /// Cell value
    pub value: String,
}

/// An ordered set of cell writes applied to one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    cells: Vec<Cell>,
}

impl Mutation {
    /// New empty mutation.
    pub const fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// Append a cell write, builder style.
    #[must_use]
    pub fn set_cell(
        mut self,
        family: &'static str,
        qualifier: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.cells.push(Cell { family, qualifier: qualifier.into(), value: value.into() });
        self
    }

    /// Cells in insertion order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

/// Parallel sequences of row keys and mutations. The two sides always have
/// equal length; pushing through [`BulkMutations::push`] is the only way to
/// grow a batch, so the invariant holds by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkMutations {
    keys: Vec<String>,
    muts: Vec<Mutation>,
}

impl BulkMutations {
    /// New empty batch.
    pub const fn new() -> Self {
        Self { keys: Vec::new(), muts: Vec::new() }
    }

    /// Append one row key with its mutation.
    pub fn push(&mut self, key: impl Into<String>, mutation: Mutation) {
        self.keys.push(key.into());
        self.muts.push(mutation);
    }

    /// Move all entries of `other` into this batch.
    pub fn extend(&mut self, other: Self) {
        self.keys.extend(other.keys);
        self.muts.extend(other.muts);
    }

    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the batch holds no rows.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Row keys in insertion order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Iterate over `(row key, mutation)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Mutation)> {
        self.keys.iter().map(String::as_str).zip(self.muts.iter())
    }
}
