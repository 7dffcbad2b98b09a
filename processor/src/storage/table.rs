//! Append-only row tables

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use tracery_shared::types::ids::RowId;

/// Rows addressed by dense ids in insertion order
#[derive(Debug, Clone)]
pub struct Table<I, R> {
    rows: Vec<R>,
    _id: PhantomData<I>,
}

impl<I: RowId, R> Table<I, R> {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            _id: PhantomData,
        }
    }

    pub fn insert(&mut self, row: R) -> I {
        let id = I::from_index(self.rows.len());
        self.rows.push(row);
        id
    }

    pub fn get(&self, id: I) -> Option<&R> {
        self.rows.get(id.index())
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut R> {
        self.rows.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &R)> {
        self.rows.iter().enumerate().map(|(i, r)| (I::from_index(i), r))
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<I: RowId, R> Default for Table<I, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: RowId, R> Index<I> for Table<I, R> {
    type Output = R;

    fn index(&self, id: I) -> &R {
        &self.rows[id.index()]
    }
}

impl<I: RowId, R> IndexMut<I> for Table<I, R> {
    fn index_mut(&mut self, id: I) -> &mut R {
        &mut self.rows[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracery_shared::types::ids::MappingId;

    #[test]
    fn test_ids_are_dense_in_insertion_order() {
        let mut table: Table<MappingId, &str> = Table::new();
        assert_eq!(table.insert("a"), MappingId(0));
        assert_eq!(table.insert("b"), MappingId(1));
        assert_eq!(table[MappingId(1)], "b");
        assert_eq!(table.get(MappingId(2)), None);

        table[MappingId(0)] = "c";
        let rows: Vec<_> = table.iter().collect();
        assert_eq!(rows, vec![(MappingId(0), &"c"), (MappingId(1), &"b")]);
    }
}
