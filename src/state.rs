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

//! Central mutable world state
//!
//! Single owner of the entity slot arrays, the archetype registry, the
//! version counters, the iteration/update flags, and the configuration.
//! Structural mutation happens on one driver thread; the iteration depth is
//! atomic so read-only scopes can be opened through a shared reference from
//! worker threads.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::archetype::ArchetypeStore;
use crate::component::ComponentTypeId;
use crate::config::WorldConfig;
use crate::entity::EntityManager;
use crate::error::{EcsError, Result};

pub struct WorldState {
    pub(crate) entities: EntityManager,
    pub(crate) archetypes: ArchetypeStore,
    pub(crate) config: WorldConfig,
    pub(crate) archetype_version: u32,
    pub(crate) structural_version: u32,
    pub(crate) iteration_depth: AtomicU32,
    pub(crate) is_updating: bool,
    pub(crate) current_tick: u32,
    pub(crate) current_system_order: u32,
}

impl WorldState {
    pub fn new(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        let mut state = Self {
            entities: EntityManager::new(),
            archetypes: ArchetypeStore::new(),
            config,
            archetype_version: 0,
            structural_version: 0,
            iteration_depth: AtomicU32::new(0),
            is_updating: false,
            current_tick: 0,
            current_system_order: 0,
        };
        let (_, created) = state.archetypes.initialize_empty_archetype()?;
        if created {
            state.note_archetype_created();
        }
        Ok(state)
    }

    /// Bump the structural version; wraps on overflow
    #[inline]
    pub fn increment_structural_version(&mut self) {
        self.structural_version = self.structural_version.wrapping_add(1);
    }

    /// Record an archetype creation: both counters move
    #[inline]
    pub(crate) fn note_archetype_created(&mut self) {
        self.archetype_version = self.archetype_version.wrapping_add(1);
        self.increment_structural_version();
    }

    /// Lookup-or-create with version accounting
    pub(crate) fn get_or_create_archetype(&mut self, ids: &[ComponentTypeId]) -> Result<u32> {
        let (index, created) = self.archetypes.get_or_create_from_sorted(ids)?;
        if created {
            self.note_archetype_created();
        }
        Ok(index)
    }

    /// `with_added` edge with version accounting
    pub(crate) fn archetype_with_added(
        &mut self,
        src: u32,
        type_id: ComponentTypeId,
    ) -> Result<u32> {
        let (index, created) = self.archetypes.with_added(src, type_id)?;
        if created {
            self.note_archetype_created();
        }
        Ok(index)
    }

    /// `with_removed` edge with version accounting
    pub(crate) fn archetype_with_removed(
        &mut self,
        src: u32,
        type_id: ComponentTypeId,
    ) -> Result<u32> {
        let (index, created) = self.archetypes.with_removed(src, type_id)?;
        if created {
            self.note_archetype_created();
        }
        Ok(index)
    }

    #[inline]
    pub fn iteration_depth(&self) -> u32 {
        self.iteration_depth.load(Ordering::Acquire)
    }

    /// Fail unless no iteration scope is open
    #[inline]
    pub fn assert_structural_allowed(&self) -> Result<()> {
        if self.iteration_depth() > 0 {
            return Err(EcsError::StructuralDuringIteration);
        }
        Ok(())
    }

    pub(crate) fn enter_iteration(&self) {
        self.iteration_depth.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn exit_iteration(&self) {
        let prev = self.iteration_depth.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0);
    }
}

/// RAII guard for a read-only iteration scope
///
/// While any scope is open, immediate structural changes fail with
/// `StructuralDuringIteration`.
pub struct IterationScope<'w> {
    state: &'w WorldState,
}

impl<'w> IterationScope<'w> {
    pub(crate) fn enter(state: &'w WorldState) -> Self {
        state.enter_iteration();
        Self { state }
    }
}

impl Drop for IterationScope<'_> {
    fn drop(&mut self) {
        self.state.exit_iteration();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_has_empty_archetype() {
        let state = WorldState::new(WorldConfig::default()).unwrap();
        assert_eq!(state.archetypes.len(), 1);
        assert!(state
            .archetypes
            .archetype(state.archetypes.empty_index())
            .signature()
            .is_empty());
        // Bootstrap creation is itself a structural change
        assert_eq!(state.archetype_version, 1);
        assert_eq!(state.structural_version, 1);
    }

    #[test]
    fn test_structural_version_wraps() {
        let mut state = WorldState::new(WorldConfig::default()).unwrap();
        state.structural_version = u32::MAX;
        state.increment_structural_version();
        assert_eq!(state.structural_version, 0);
    }

    #[test]
    fn test_iteration_scope_guard() {
        let state = WorldState::new(WorldConfig::default()).unwrap();
        assert!(state.assert_structural_allowed().is_ok());
        {
            let _outer = IterationScope::enter(&state);
            let _inner = IterationScope::enter(&state);
            assert_eq!(state.iteration_depth(), 2);
            assert!(matches!(
                state.assert_structural_allowed(),
                Err(EcsError::StructuralDuringIteration)
            ));
        }
        assert_eq!(state.iteration_depth(), 0);
        assert!(state.assert_structural_allowed().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = WorldConfig::default();
        config.chunk_capacity = 0;
        assert!(WorldState::new(config).is_err());
    }
}
