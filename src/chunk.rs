// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Columnar chunk storage
//!
//! A chunk is a capacity-bounded Structure-of-Arrays block: one entities
//! array plus one typed column per component type of the owning archetype.
//! Row `r` of every column belongs to `entities[r]`. Rows `[0, count)` are
//! populated; the tail holds `Entity::INVALID` and default cells.

use std::any::Any;

use crate::component::Component;
use crate::entity::Entity;
use crate::error::{EcsError, Result};

/// Type-erased component column
///
/// Implementations are contiguous typed arrays of fixed capacity. Element
/// copies across columns require both sides to be the same concrete type.
pub trait ComponentColumn: Send + Sync {
    /// Copy the element at `src` over the element at `dst` (same column)
    fn move_element(&mut self, src: usize, dst: usize);

    /// Copy the element at `src_row` into `dst` at `dst_row`
    fn copy_element_to(
        &self,
        src_row: usize,
        dst: &mut dyn ComponentColumn,
        dst_row: usize,
    ) -> Result<()>;

    /// Reset `row` to the default value
    fn set_default(&mut self, row: usize);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Typed contiguous column of `capacity` elements
pub struct TypedColumn<T: Component> {
    data: Box<[T]>,
}

impl<T: Component> TypedColumn<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn get(&self, row: usize) -> &T {
        &self.data[row]
    }

    #[inline]
    pub fn get_mut(&mut self, row: usize) -> &mut T {
        &mut self.data[row]
    }

    #[inline]
    pub fn write(&mut self, row: usize, value: T) {
        self.data[row] = value;
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl<T: Component> ComponentColumn for TypedColumn<T> {
    fn move_element(&mut self, src: usize, dst: usize) {
        self.data[dst] = self.data[src];
    }

    fn copy_element_to(
        &self,
        src_row: usize,
        dst: &mut dyn ComponentColumn,
        dst_row: usize,
    ) -> Result<()> {
        let dst = dst
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .ok_or(EcsError::ColumnTypeMismatch)?;
        dst.data[dst_row] = self.data[src_row];
        Ok(())
    }

    fn set_default(&mut self, row: usize) {
        self.data[row] = T::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Downcast a column to its concrete typed form
#[inline]
pub(crate) fn typed_column<T: Component>(column: &dyn ComponentColumn) -> Result<&TypedColumn<T>> {
    column
        .as_any()
        .downcast_ref::<TypedColumn<T>>()
        .ok_or(EcsError::ColumnTypeMismatch)
}

/// Downcast a column to its concrete typed form, mutably
#[inline]
pub(crate) fn typed_column_mut<T: Component>(
    column: &mut dyn ComponentColumn,
) -> Result<&mut TypedColumn<T>> {
    column
        .as_any_mut()
        .downcast_mut::<TypedColumn<T>>()
        .ok_or(EcsError::ColumnTypeMismatch)
}

/// Packed SoA table holding a prefix of an archetype's rows
pub struct Chunk {
    id: u32,
    capacity: u32,
    count: u32,
    entities: Box<[Entity]>,
    columns: Box<[Box<dyn ComponentColumn>]>,
}

impl Chunk {
    pub fn new(id: u32, capacity: u32, columns: Box<[Box<dyn ComponentColumn>]>) -> Self {
        Self {
            id,
            capacity,
            count: 0,
            entities: vec![Entity::INVALID; capacity as usize].into_boxed_slice(),
            columns,
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn has_space(&self) -> bool {
        self.count < self.capacity
    }

    /// Populated rows
    pub fn entities(&self) -> &[Entity] {
        &self.entities[..self.count as usize]
    }

    #[inline]
    pub fn entity_at(&self, row: u32) -> Entity {
        self.entities[row as usize]
    }

    #[inline]
    pub fn column(&self, index: usize) -> &dyn ComponentColumn {
        &*self.columns[index]
    }

    #[inline]
    pub fn column_mut(&mut self, index: usize) -> &mut dyn ComponentColumn {
        &mut *self.columns[index]
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Append `entity` at the next row; requires free space
    pub fn add_entity(&mut self, entity: Entity) -> u32 {
        debug_assert!(self.has_space());
        let row = self.count;
        self.entities[row as usize] = entity;
        self.count += 1;
        row
    }

    /// Remove `row` by swapping the last row into it
    ///
    /// Returns the entity that now occupies `row` and whether a swap
    /// happened (`false` iff `row` was the last row). The vacated tail is
    /// cleared to `Entity::INVALID` and default cells.
    pub fn remove_at_swap_back(&mut self, row: u32) -> (Entity, bool) {
        debug_assert!(row < self.count);
        let row = row as usize;
        let last = (self.count - 1) as usize;
        let did_swap = row != last;
        if did_swap {
            self.entities[row] = self.entities[last];
            for column in self.columns.iter_mut() {
                column.move_element(last, row);
            }
        }
        self.entities[last] = Entity::INVALID;
        for column in self.columns.iter_mut() {
            column.set_default(last);
        }
        self.count -= 1;
        let swapped = if did_swap {
            self.entities[row]
        } else {
            Entity::INVALID
        };
        (swapped, did_swap)
    }

    /// Remove `row` preserving the order of the remaining rows
    ///
    /// Shifts rows `row+1 .. count` down by one across the entities array
    /// and every column, then clears the vacated tail. The caller updates
    /// the locations of the shifted entities.
    pub fn remove_at_stable(&mut self, row: u32) {
        debug_assert!(row < self.count);
        let row = row as usize;
        let last = (self.count - 1) as usize;
        for r in row..last {
            self.entities[r] = self.entities[r + 1];
        }
        for column in self.columns.iter_mut() {
            for r in row..last {
                column.move_element(r + 1, r);
            }
        }
        self.entities[last] = Entity::INVALID;
        for column in self.columns.iter_mut() {
            column.set_default(last);
        }
        self.count -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(index: u32) -> Entity {
        Entity::Real { index, version: 0 }
    }

    fn chunk_with_u32_column(capacity: u32) -> Chunk {
        let columns: Box<[Box<dyn ComponentColumn>]> =
            vec![Box::new(TypedColumn::<u32>::new(capacity as usize)) as Box<dyn ComponentColumn>]
                .into_boxed_slice();
        Chunk::new(0, capacity, columns)
    }

    fn write_u32(chunk: &mut Chunk, row: u32, value: u32) {
        typed_column_mut::<u32>(chunk.column_mut(0))
            .unwrap()
            .write(row as usize, value);
    }

    fn read_u32(chunk: &Chunk, row: u32) -> u32 {
        *typed_column::<u32>(chunk.column(0)).unwrap().get(row as usize)
    }

    #[test]
    fn test_add_entity_appends() {
        let mut chunk = chunk_with_u32_column(4);
        assert_eq!(chunk.add_entity(entity(7)), 0);
        assert_eq!(chunk.add_entity(entity(8)), 1);
        assert_eq!(chunk.count(), 2);
        assert_eq!(chunk.entities(), &[entity(7), entity(8)]);
    }

    #[test]
    fn test_swap_back_moves_last_row() {
        let mut chunk = chunk_with_u32_column(4);
        for i in 0..4 {
            chunk.add_entity(entity(i));
            write_u32(&mut chunk, i, i * 10);
        }
        let (swapped, did_swap) = chunk.remove_at_swap_back(1);
        assert!(did_swap);
        assert_eq!(swapped, entity(3));
        assert_eq!(chunk.count(), 3);
        assert_eq!(read_u32(&chunk, 1), 30);
        // Tail cleared
        assert!(chunk.entity_at(3).is_invalid());
        assert_eq!(read_u32(&chunk, 3), 0);
    }

    #[test]
    fn test_swap_back_last_row_does_not_swap() {
        let mut chunk = chunk_with_u32_column(4);
        chunk.add_entity(entity(0));
        chunk.add_entity(entity(1));
        let (swapped, did_swap) = chunk.remove_at_swap_back(1);
        assert!(!did_swap);
        assert!(swapped.is_invalid());
        assert_eq!(chunk.count(), 1);
    }

    #[test]
    fn test_stable_remove_shifts_rows() {
        let mut chunk = chunk_with_u32_column(4);
        for i in 0..4 {
            chunk.add_entity(entity(i));
            write_u32(&mut chunk, i, i * 10);
        }
        chunk.remove_at_stable(1);
        assert_eq!(chunk.count(), 3);
        assert_eq!(chunk.entities(), &[entity(0), entity(2), entity(3)]);
        assert_eq!(read_u32(&chunk, 0), 0);
        assert_eq!(read_u32(&chunk, 1), 20);
        assert_eq!(read_u32(&chunk, 2), 30);
        assert_eq!(read_u32(&chunk, 3), 0);
    }

    #[test]
    fn test_removing_only_row_leaves_empty_chunk() {
        let mut chunk = chunk_with_u32_column(4);
        chunk.add_entity(entity(0));
        let (_, did_swap) = chunk.remove_at_swap_back(0);
        assert!(!did_swap);
        assert_eq!(chunk.count(), 0);
        assert!(chunk.has_space());
    }

    #[test]
    fn test_copy_element_to_rejects_type_mismatch() {
        let src = TypedColumn::<u32>::new(2);
        let mut dst = TypedColumn::<f32>::new(2);
        let err = src.copy_element_to(0, &mut dst, 0);
        assert!(matches!(err, Err(EcsError::ColumnTypeMismatch)));
    }

    #[test]
    fn test_copy_element_to_same_type() {
        let mut src = TypedColumn::<u32>::new(2);
        src.write(0, 42);
        let mut dst = TypedColumn::<u32>::new(2);
        src.copy_element_to(0, &mut dst, 1).unwrap();
        assert_eq!(*dst.get(1), 42);
    }
}
