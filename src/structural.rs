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

//! Structural changes
//!
//! The type-erased internals shared by the immediate API and command-buffer
//! playback: create, destroy, add-component, remove-component. Add and
//! remove take the new value through an erased column writer so playback
//! can apply commands without knowing the concrete component type.
//!
//! Ordering invariant: on a move, the destination row is fully populated
//! and the moved entity's location updated before the source row is
//! removed, so a swap-back in the source can never invalidate the
//! destination.

use crate::chunk::ComponentColumn;
use crate::component::{ComponentTypeId, ComponentTypeStore};
use crate::entity::{Entity, EntityLocation};
use crate::error::{EcsError, Result};
use crate::state::WorldState;
use crate::storage;

/// Erased writer that stores a component value into a column cell
pub(crate) type ColumnWriter<'a> = &'a mut dyn FnMut(&mut dyn ComponentColumn, usize) -> Result<()>;

/// Allocate a live entity and place it in the empty archetype
pub(crate) fn create_internal(
    state: &mut WorldState,
    components: &ComponentTypeStore,
) -> Result<Entity> {
    let entity = state.entities.create();
    storage::place_in_empty_archetype(state, components, entity)?;
    Ok(entity)
}

/// Remove `entity` from storage and retire its slot
pub(crate) fn destroy_internal(state: &mut WorldState, entity: Entity) -> Result<()> {
    if !state.entities.is_alive(entity) {
        return Err(EcsError::StaleEntity);
    }
    storage::remove_from_storage(state, entity)?;
    state.entities.finalize_destroy(entity);
    state.increment_structural_version();
    Ok(())
}

/// Add (or overwrite) the component `type_id` on `entity`
///
/// If the entity's archetype already has the type, the cell is overwritten
/// in place with no structural version bump. Otherwise the entity moves to
/// the successor archetype: destination slot, overlapping copy, new value,
/// location update, source removal, one version bump for the move.
pub(crate) fn add_erased(
    state: &mut WorldState,
    components: &ComponentTypeStore,
    entity: Entity,
    type_id: ComponentTypeId,
    write: ColumnWriter<'_>,
) -> Result<()> {
    if !state.entities.is_alive(entity) {
        return Err(EcsError::StaleEntity);
    }
    let index = entity.real_index().ok_or(EcsError::StaleEntity)?;
    let src_location = state.entities.location(index);
    if !src_location.is_valid() {
        return Err(EcsError::InvalidEntity);
    }
    let src = state.archetypes.index_of(src_location.archetype)?;

    // Overwrite in place when the type is already present
    if let Some(column) = state.archetypes.archetype(src).column_index(type_id) {
        let arch = state.archetypes.archetype_mut(src);
        let chunk = arch.chunk_mut(src_location.chunk);
        return write(chunk.column_mut(column), src_location.row as usize);
    }

    let dst = state.archetype_with_added(src, type_id)?;
    debug_assert!(dst != src);
    let (dst_chunk, dst_row) = storage::allocate_destination_slot(state, components, dst, entity)?;
    storage::copy_overlapping_components(
        state,
        (src, src_location.chunk, src_location.row),
        (dst, dst_chunk, dst_row),
    )?;
    {
        let arch = state.archetypes.archetype_mut(dst);
        let column = arch
            .column_index(type_id)
            .ok_or(EcsError::NoColumnFactory(type_id))?;
        let chunk = arch.chunk_mut(dst_chunk);
        write(chunk.column_mut(column), dst_row as usize)?;
    }
    let dst_id = state.archetypes.archetype(dst).id();
    state.entities.set_location(
        index,
        EntityLocation {
            archetype: dst_id,
            chunk: dst_chunk,
            row: dst_row,
        },
    );
    storage::remove_from_source_and_fix_swap(state, src, src_location.chunk, src_location.row)?;
    state.increment_structural_version();
    Ok(())
}

/// Remove the component `type_id` from `entity`; a no-op if absent
pub(crate) fn remove_erased(
    state: &mut WorldState,
    components: &ComponentTypeStore,
    entity: Entity,
    type_id: ComponentTypeId,
) -> Result<()> {
    if !state.entities.is_alive(entity) {
        return Err(EcsError::StaleEntity);
    }
    let index = entity.real_index().ok_or(EcsError::StaleEntity)?;
    let src_location = state.entities.location(index);
    if !src_location.is_valid() {
        return Err(EcsError::InvalidEntity);
    }
    let src = state.archetypes.index_of(src_location.archetype)?;
    if !state.archetypes.archetype(src).has_component(type_id) {
        return Ok(());
    }

    let dst = state.archetype_with_removed(src, type_id)?;
    debug_assert!(dst != src);
    let (dst_chunk, dst_row) = storage::allocate_destination_slot(state, components, dst, entity)?;
    storage::copy_overlapping_components(
        state,
        (src, src_location.chunk, src_location.row),
        (dst, dst_chunk, dst_row),
    )?;
    let dst_id = state.archetypes.archetype(dst).id();
    state.entities.set_location(
        index,
        EntityLocation {
            archetype: dst_id,
            chunk: dst_chunk,
            row: dst_row,
        },
    );
    storage::remove_from_source_and_fix_swap(state, src, src_location.chunk, src_location.row)?;
    state.increment_structural_version();
    Ok(())
}
