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

//! Hot-path per-entity component access
//!
//! Handle validation, strict type resolution, then the archetype's cached
//! type-id -> column-index map and a typed row reference. No per-call
//! allocation. `has_component` never fails.

use crate::chunk::{typed_column, typed_column_mut};
use crate::component::Component;
use crate::entity::{Entity, EntityLocation};
use crate::error::{EcsError, Result};
use crate::world::World;

impl World {
    /// Validate a handle and return its storage location
    ///
    /// Fails with `InvalidEntity` for temp, out-of-range, dead, stale, or
    /// unlocated handles.
    pub(crate) fn locate(&self, entity: Entity) -> Result<EntityLocation> {
        let state = self.state();
        if !state.entities.is_alive(entity) {
            return Err(EcsError::InvalidEntity);
        }
        let index = entity.real_index().ok_or(EcsError::InvalidEntity)?;
        let location = state.entities.location(index);
        if !location.is_valid() {
            return Err(EcsError::InvalidEntity);
        }
        Ok(location)
    }

    /// Read-only reference to `entity`'s `T`
    ///
    /// `InvalidEntity` covers both bad handles and entities that do not
    /// carry the component; probe with `has_component` first when absence
    /// is an expected case.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T> {
        let location = self.locate(entity)?;
        let type_id = self.components().type_id_strict::<T>()?;
        let state = self.state();
        let archetype = state.archetypes.get_by_id(location.archetype)?;
        let column = archetype
            .column_index(type_id)
            .ok_or(EcsError::InvalidEntity)?;
        let chunk = archetype.chunk(location.chunk);
        Ok(typed_column::<T>(chunk.column(column))?.get(location.row as usize))
    }

    /// Mutable reference to `entity`'s `T`
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T> {
        let location = self.locate(entity)?;
        let type_id = self.components().type_id_strict::<T>()?;
        let state = self.state_mut();
        let archetype_index = state.archetypes.index_of(location.archetype)?;
        let archetype = state.archetypes.archetype_mut(archetype_index);
        let column = archetype
            .column_index(type_id)
            .ok_or(EcsError::InvalidEntity)?;
        let chunk = archetype.chunk_mut(location.chunk);
        Ok(typed_column_mut::<T>(chunk.column_mut(column))?.get_mut(location.row as usize))
    }

    /// True iff `entity` is valid and carries `T`; never fails
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        let Ok(location) = self.locate(entity) else {
            return false;
        };
        let Ok(type_id) = self.components().type_id_strict::<T>() else {
            return false;
        };
        self.state()
            .archetypes
            .get_by_id(location.archetype)
            .map(|archetype| archetype.has_component(type_id))
            .unwrap_or(false)
    }
}
