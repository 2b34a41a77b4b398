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

//! World: the public façade over state, storage, and commands
//!
//! Binds the entity allocator, the archetype registry, the component
//! registry, and the structural layer behind one API. Outside an update
//! scope the immediate structural API may be used directly; inside one,
//! structural changes are routed through an `EntityCommandBuffer` and
//! applied at the playback barrier.

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Archetype, ArchetypeId};
use crate::chunk::{typed_column_mut, ComponentColumn};
use crate::command::EntityCommandBuffer;
use crate::component::{Component, ComponentTypeId, ComponentTypeStore, ManifestEntry};
use crate::config::WorldConfig;
use crate::entity::{Entity, EntityLocation};
use crate::error::Result;
use crate::state::{IterationScope, WorldState};
use crate::structural;

/// Temp handles per worker when the caller does not size them explicitly
const DEFAULT_TEMPS_PER_WORKER: u32 = 256;

/// Central ECS world
pub struct World {
    state: WorldState,
    components: ComponentTypeStore,
}

impl World {
    /// Create a world with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(WorldConfig::default())
    }

    /// Create a world with an explicit configuration
    pub fn with_config(config: WorldConfig) -> Result<Self> {
        Ok(Self {
            state: WorldState::new(config)?,
            components: ComponentTypeStore::new(),
        })
    }

    #[inline]
    pub(crate) fn state(&self) -> &WorldState {
        &self.state
    }

    #[inline]
    pub(crate) fn state_mut(&mut self) -> &mut WorldState {
        &mut self.state
    }

    #[inline]
    pub(crate) fn components(&self) -> &ComponentTypeStore {
        &self.components
    }

    /// Split borrows for playback: mutable state, shared registry
    #[inline]
    pub(crate) fn split_mut(&mut self) -> (&mut WorldState, &ComponentTypeStore) {
        (&mut self.state, &self.components)
    }

    // ========== Registration ==========

    /// Register a component type; idempotent
    ///
    /// In deterministic mode every peer must register the same types in the
    /// same canonical order at bootstrap (sort registrations by name before
    /// calling). Registration closes at the first `begin_update`.
    pub fn register_component<T: Component>(&mut self) -> Result<ComponentTypeId> {
        self.components.register::<T>()
    }

    /// Strict type-id lookup
    pub fn component_type_id<T: Component>(&self) -> Result<ComponentTypeId> {
        self.components.type_id_strict::<T>()
    }

    /// Close registration explicitly (otherwise `begin_update` does it)
    pub fn seal_components(&mut self) {
        self.components.seal();
    }

    // ========== Entity lifecycle ==========

    /// Create a live entity placed in the empty archetype
    pub fn create_entity(&mut self) -> Result<Entity> {
        self.state.assert_structural_allowed()?;

        #[cfg(feature = "profiling")]
        let span = info_span!(
            "world.create_entity",
            archetype_count = self.state.archetypes.len()
        );
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        structural::create_internal(&mut self.state, &self.components)
    }

    /// Create `count` entities in the empty archetype with one reservation
    pub fn create_entities(&mut self, count: usize) -> Result<Vec<Entity>> {
        self.state.assert_structural_allowed()?;
        self.state
            .entities
            .ensure_capacity(self.state.entities.live_count() + count);
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            created.push(structural::create_internal(
                &mut self.state,
                &self.components,
            )?);
        }
        Ok(created)
    }

    /// Destroy a live entity: remove its row, retire its slot
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<()> {
        self.state.assert_structural_allowed()?;
        structural::destroy_internal(&mut self.state, entity)
    }

    /// True iff the handle is current
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.state.entities.is_alive(entity)
    }

    /// Storage location of a live entity
    pub fn entity_location(&self, entity: Entity) -> Option<EntityLocation> {
        self.locate(entity).ok()
    }

    // ========== Immediate structural changes ==========

    /// Add (or overwrite in place) a component on an entity
    ///
    /// Forbidden while an iteration scope is open. While updating, route
    /// through a command buffer instead.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        self.state.assert_structural_allowed()?;
        let type_id = if self.state.config.deterministic {
            self.components.type_id_strict::<T>()?
        } else {
            self.components.type_id_or_register::<T>()?
        };
        let mut write = |column: &mut dyn ComponentColumn, row: usize| -> Result<()> {
            typed_column_mut::<T>(column)?.write(row, value);
            Ok(())
        };
        structural::add_erased(&mut self.state, &self.components, entity, type_id, &mut write)
    }

    /// Remove a component from an entity; a no-op if absent
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<()> {
        self.state.assert_structural_allowed()?;
        let type_id = if self.state.config.deterministic {
            self.components.type_id_strict::<T>()?
        } else {
            self.components.type_id_or_register::<T>()?
        };
        structural::remove_erased(&mut self.state, &self.components, entity, type_id)
    }

    /// Remove by raw type id (playback and tooling path)
    pub fn remove_component_by_id(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<()> {
        self.state.assert_structural_allowed()?;
        structural::remove_erased(&mut self.state, &self.components, entity, type_id)
    }

    // ========== Iteration and update scopes ==========

    /// Open a read-only iteration scope
    ///
    /// While any scope is open, immediate structural changes fail with
    /// `StructuralDuringIteration`. Scopes nest.
    pub fn iteration_scope(&self) -> IterationScope<'_> {
        IterationScope::enter(&self.state)
    }

    /// Manual iteration entry, for callers that cannot hold the RAII scope
    /// (external query drivers pairing entry/exit around raw chunk walks).
    /// Must be balanced by `end_iteration`.
    pub fn begin_iteration(&self) {
        self.state.enter_iteration();
    }

    /// Manual iteration exit
    pub fn end_iteration(&self) {
        self.state.exit_iteration();
    }

    pub fn iteration_depth(&self) -> u32 {
        self.state.iteration_depth()
    }

    /// Enter the update scope: seal registration, advance the tick
    pub fn begin_update(&mut self) {
        self.components.seal();
        self.state.is_updating = true;
        self.state.current_tick = self.state.current_tick.wrapping_add(1);
        self.state.current_system_order = 0;
    }

    /// Leave the update scope
    pub fn end_update(&mut self) {
        self.state.is_updating = false;
    }

    pub fn is_updating(&self) -> bool {
        self.state.is_updating
    }

    pub fn current_tick(&self) -> u32 {
        self.state.current_tick
    }

    /// Order index of the system currently running (an ECB sort key)
    pub fn set_system_order(&mut self, order: u32) {
        self.state.current_system_order = order;
    }

    pub fn current_system_order(&self) -> u32 {
        self.state.current_system_order
    }

    /// Seconds per simulation tick, from the configured rate
    pub fn tick_delta(&self) -> f32 {
        self.state.config.tick_delta()
    }

    // ========== Command buffers ==========

    /// Create a command buffer with one recorder per worker
    pub fn create_command_buffer(&self, workers: usize) -> EntityCommandBuffer {
        self.create_command_buffer_with(workers, DEFAULT_TEMPS_PER_WORKER)
    }

    /// Create a command buffer with an explicit temp-handle stride
    pub fn create_command_buffer_with(
        &self,
        workers: usize,
        temps_per_worker: u32,
    ) -> EntityCommandBuffer {
        EntityCommandBuffer::new(
            workers,
            temps_per_worker,
            self.state.config.deterministic,
            self.state.current_tick,
            self.components.snapshot(),
        )
    }

    // ========== Component manifest ==========

    /// The component manifest, sorted by type id
    pub fn component_manifest(&self) -> Vec<ManifestEntry> {
        self.components.manifest()
    }

    /// Canonical manifest bytes; peers compare these before a session
    pub fn manifest_bytes(&self) -> Result<Vec<u8>> {
        self.components.manifest_bytes()
    }

    /// Manifest as JSON, for tooling
    pub fn manifest_json(&self) -> Result<String> {
        self.components.manifest_json()
    }

    /// 64-bit manifest digest
    pub fn manifest_hash(&self) -> u64 {
        self.components.manifest_hash()
    }

    // ========== Versions and enumeration ==========

    /// Monotonic counter; anything that can affect queries bumps it.
    /// External query caches rebuild against this.
    pub fn structural_version(&self) -> u32 {
        self.state.structural_version
    }

    /// Bumped on archetype creation only
    pub fn archetype_version(&self) -> u32 {
        self.state.archetype_version
    }

    /// Archetypes in canonical cross-peer order
    pub fn archetypes_stable(&self) -> impl Iterator<Item = &Archetype> + '_ {
        self.state.archetypes.iter_stable()
    }

    /// Exact archetype lookup by id
    pub fn archetype_by_id(&self, id: ArchetypeId) -> Result<&Archetype> {
        self.state.archetypes.get_by_id(id)
    }

    // ========== Diagnostics ==========

    pub fn entity_count(&self) -> usize {
        self.state.entities.live_count()
    }

    pub fn recycled_entity_count(&self) -> usize {
        self.state.entities.recycled_count()
    }

    pub fn archetype_count(&self) -> usize {
        self.state.archetypes.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.state
            .archetypes
            .iter_stable()
            .map(Archetype::chunk_count)
            .sum()
    }

    pub fn config(&self) -> &WorldConfig {
        &self.state.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EcsError;

    #[derive(Clone, Copy, Default, PartialEq, Debug)]
    struct Position {
        x: f32,
        y: f32,
        z: f32,
    }

    #[derive(Clone, Copy, Default, PartialEq, Debug)]
    struct Velocity {
        dx: f32,
        dy: f32,
        dz: f32,
    }

    #[test]
    fn test_create_destroy_lifecycle() {
        let mut world = World::new().unwrap();
        let e = world.create_entity().unwrap();
        assert!(world.is_alive(e));
        assert!(world.entity_location(e).is_some());
        assert_eq!(world.entity_count(), 1);

        world.destroy_entity(e).unwrap();
        assert!(!world.is_alive(e));
        assert!(world.entity_location(e).is_none());
        assert_eq!(world.entity_count(), 0);
        assert!(matches!(
            world.destroy_entity(e),
            Err(EcsError::StaleEntity)
        ));
    }

    #[test]
    fn test_structural_guard_blocks_immediate_changes() {
        let mut world = World::new().unwrap();
        world.register_component::<Position>().unwrap();
        let e = world.create_entity().unwrap();
        {
            let _scope = world.iteration_scope();
            // Reads still work inside the scope
            assert!(world.is_alive(e));
        }
        // Guard released, mutate through &mut again
        world.add_component(e, Position::default()).unwrap();

        // Manual entry/exit hits the runtime guard on every structural op
        world.begin_iteration();
        assert_eq!(world.iteration_depth(), 1);
        assert!(matches!(
            world.create_entity(),
            Err(EcsError::StructuralDuringIteration)
        ));
        assert!(matches!(
            world.add_component(e, Position::default()),
            Err(EcsError::StructuralDuringIteration)
        ));
        assert!(matches!(
            world.destroy_entity(e),
            Err(EcsError::StructuralDuringIteration)
        ));
        world.end_iteration();
        assert_eq!(world.iteration_depth(), 0);
    }

    #[test]
    fn test_add_and_remove_move_between_archetypes() {
        let mut world = World::new().unwrap();
        world.register_component::<Position>().unwrap();
        world.register_component::<Velocity>().unwrap();
        let e = world.create_entity().unwrap();

        world
            .add_component(e, Position { x: 1.0, y: 2.0, z: 3.0 })
            .unwrap();
        world
            .add_component(e, Velocity { dx: 0.1, dy: 0.2, dz: 0.3 })
            .unwrap();
        assert!(world.has_component::<Position>(e));
        assert!(world.has_component::<Velocity>(e));
        // Empty + [Position] + [Position, Velocity]
        assert_eq!(world.archetype_count(), 3);

        world.remove_component::<Velocity>(e).unwrap();
        assert!(!world.has_component::<Velocity>(e));
        assert_eq!(
            *world.get_component::<Position>(e).unwrap(),
            Position { x: 1.0, y: 2.0, z: 3.0 }
        );
    }

    #[test]
    fn test_update_scope_advances_tick_and_seals() {
        let mut world = World::new().unwrap();
        world.register_component::<Position>().unwrap();
        assert_eq!(world.current_tick(), 0);

        world.begin_update();
        assert!(world.is_updating());
        assert_eq!(world.current_tick(), 1);
        world.end_update();
        assert!(!world.is_updating());

        // Registration is closed after the first update
        assert!(world.register_component::<Velocity>().is_err());
    }

    #[test]
    fn test_batch_create_places_all() {
        let mut world = World::new().unwrap();
        let created = world.create_entities(300).unwrap();
        assert_eq!(created.len(), 300);
        assert_eq!(world.entity_count(), 300);
        // Default capacity 128: three chunks
        assert_eq!(world.chunk_count(), 3);
        for e in created {
            assert!(world.entity_location(e).is_some());
        }
    }

    #[test]
    fn test_deterministic_mode_is_strict() {
        let mut world = World::with_config(WorldConfig::deterministic()).unwrap();
        let e = world.create_entity().unwrap();
        assert!(matches!(
            world.add_component(e, Position::default()),
            Err(EcsError::TypeNotRegistered(_))
        ));
    }

    #[test]
    fn test_tick_delta_follows_hz() {
        let mut config = WorldConfig::default();
        config.simulation_hz = 100;
        let world = World::with_config(config).unwrap();
        assert!((world.tick_delta() - 0.01).abs() < 1e-6);
    }
}
