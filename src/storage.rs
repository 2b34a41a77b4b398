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

//! Row-level storage operations
//!
//! The five operations that mutate chunk storage and keep the location
//! table coherent: placing a row, allocating a destination slot, copying
//! overlapping components across archetypes, policy-driven source removal
//! with location fix-up, and destination-less removal. Version accounting:
//! chunk creation bumps the structural version here; a logical move bumps
//! exactly once, in the structural layer that drives these primitives.

use crate::component::ComponentTypeStore;
use crate::config::RemovalPolicy;
use crate::entity::{Entity, EntityLocation};
use crate::error::{EcsError, Result};
use crate::state::WorldState;

/// (archetype dense index, chunk index, row)
pub(crate) type RowAddress = (u32, u32, u32);

/// Add a row for `entity` in the empty archetype and set its location
///
/// Used by entity creation; bumps the structural version for the placement.
pub(crate) fn place_in_empty_archetype(
    state: &mut WorldState,
    components: &ComponentTypeStore,
    entity: Entity,
) -> Result<EntityLocation> {
    let empty = state.archetypes.empty_index();
    let (chunk, row) = allocate_destination_slot(state, components, empty, entity)?;
    let index = entity.real_index().ok_or(EcsError::StaleEntity)?;
    let location = EntityLocation {
        archetype: state.archetypes.archetype(empty).id(),
        chunk,
        row,
    };
    state.entities.set_location(index, location);
    state.increment_structural_version();
    Ok(location)
}

/// Append a row for `entity` in `archetype`, creating a chunk if needed
///
/// Returns `(chunk index, row)`. Does not touch the location table and does
/// not bump for the append itself; chunk creation bumps the structural
/// version (a new chunk can affect queries).
pub(crate) fn allocate_destination_slot(
    state: &mut WorldState,
    components: &ComponentTypeStore,
    archetype: u32,
    entity: Entity,
) -> Result<(u32, u32)> {
    let capacity = state.config.chunk_capacity;
    let policy = state.config.allocation_policy;
    let arch = state.archetypes.archetype_mut(archetype);
    let (chunk_index, created) = arch.get_or_create_chunk_with_space(capacity, policy, |ids| {
        components.create_columns_for_signature(capacity as usize, ids)
    })?;
    let row = arch.chunk_mut(chunk_index).add_entity(entity);
    if created {
        state.increment_structural_version();
    }
    Ok((chunk_index, row))
}

/// Copy every component present in both signatures from `src` to `dst`
///
/// Iterates the source signature positionally and resolves destination
/// columns through the destination's type-id map. Both rows must already be
/// allocated; the source row stays intact.
pub(crate) fn copy_overlapping_components(
    state: &mut WorldState,
    src: RowAddress,
    dst: RowAddress,
) -> Result<()> {
    debug_assert!(src.0 != dst.0);
    let (src_arch, dst_arch) = state.archetypes.pair_mut(src.0, dst.0);
    let column_count = src_arch.signature().len();
    for i in 0..column_count {
        let type_id = src_arch.signature().type_ids()[i];
        let Some(dst_column) = dst_arch.column_index(type_id) else {
            continue;
        };
        let src_chunk = src_arch.chunk(src.1);
        let dst_chunk = dst_arch.chunk_mut(dst.1);
        src_chunk.column(i).copy_element_to(
            src.2 as usize,
            dst_chunk.column_mut(dst_column),
            dst.2 as usize,
        )?;
    }
    Ok(())
}

/// Remove a row under the configured removal policy, fixing the locations
/// of every row the removal displaced
///
/// SwapBack moves the last row into the hole and updates that one entity's
/// location. StableRemove shifts all trailing rows down one and rewrites
/// each of their locations.
pub(crate) fn remove_from_source_and_fix_swap(
    state: &mut WorldState,
    archetype: u32,
    chunk_index: u32,
    row: u32,
) -> Result<()> {
    match state.config.removal_policy {
        RemovalPolicy::SwapBack => {
            let arch = state.archetypes.archetype_mut(archetype);
            let (swapped, did_swap) = arch.chunk_mut(chunk_index).remove_at_swap_back(row);
            if did_swap {
                let swapped_index = swapped.real_index().ok_or(EcsError::InvalidEntity)?;
                let mut location = state.entities.location(swapped_index);
                location.row = row;
                state.entities.set_location(swapped_index, location);
            }
        }
        RemovalPolicy::StableRemove => {
            let arch = state.archetypes.archetype_mut(archetype);
            let chunk = arch.chunk_mut(chunk_index);
            chunk.remove_at_stable(row);
            let count = chunk.count();
            for r in row..count {
                let shifted_index = chunk
                    .entity_at(r)
                    .real_index()
                    .ok_or(EcsError::InvalidEntity)?;
                let mut location = state.entities.location(shifted_index);
                location.row = r;
                state.entities.set_location(shifted_index, location);
            }
        }
    }
    Ok(())
}

/// Remove `entity`'s row with no destination (destroy path)
///
/// A no-op for entities that were never placed. Leaves the slot's location
/// invalid; the caller owns the structural-version bump for the removal.
pub(crate) fn remove_from_storage(state: &mut WorldState, entity: Entity) -> Result<()> {
    let index = entity.real_index().ok_or(EcsError::StaleEntity)?;
    let location = state.entities.location(index);
    if !location.is_valid() {
        return Ok(());
    }
    let archetype = state.archetypes.index_of(location.archetype)?;
    remove_from_source_and_fix_swap(state, archetype, location.chunk, location.row)?;
    state.entities.set_location(index, EntityLocation::INVALID);
    Ok(())
}
