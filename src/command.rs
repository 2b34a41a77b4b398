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

//! Entity command buffer
//!
//! The cross-peer deterministic write log. Each worker records structural
//! commands into its own recorder (thread-local, lock-free); playback
//! concatenates all workers, stable-sorts by the command comparator, and
//! applies the result through the immediate structural paths. Given
//! identical inputs the applied order is a pure function of the recorded
//! commands, never of thread scheduling.
//!
//! Comparator order: `(tick, system order, phase, sort key, entity index
//! key, type ordinal, component type id, worker, sequence)`, with phases
//! Create -> Remove -> Add -> Destroy. Worker and sequence are last-resort
//! tie-breakers only; with well-formed sort keys they never observably
//! affect state.

use std::any::Any;

use ahash::AHashMap;

#[cfg(feature = "parallel")]
use rayon::slice::ParallelSliceMut;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::chunk::{typed_column_mut, ComponentColumn};
use crate::component::{Component, ComponentTypeId, TypeRegistrySnapshot};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::pool::BufferPool;
use crate::structural;
use crate::world::World;

/// Effective sort key recorded when the caller expressed no preference
pub const NO_SORT_KEY: i32 = i32::MIN;

static MERGE_SCRATCH: BufferPool<CommandRecord> = BufferPool::new();
static TEMP_SCRATCH: BufferPool<Entity> = BufferPool::new();

/// Structural command discriminant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandKind {
    CreateEntity = 0,
    DestroyEntity = 1,
    AddComponent = 2,
    RemoveComponent = 3,
}

impl CommandKind {
    /// Application phase within one `(tick, system order, sort key)` bucket
    ///
    /// Creates first so temps resolve, removes before adds so a
    /// remove-then-add of one type observes the remove, destroys last so no
    /// command targets an already-dead entity.
    #[inline]
    pub fn phase(self) -> u8 {
        match self {
            CommandKind::CreateEntity => 0,
            CommandKind::RemoveComponent => 1,
            CommandKind::AddComponent => 2,
            CommandKind::DestroyEntity => 3,
        }
    }
}

impl TryFrom<u8> for CommandKind {
    type Error = EcsError;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(CommandKind::CreateEntity),
            1 => Ok(CommandKind::DestroyEntity),
            2 => Ok(CommandKind::AddComponent),
            3 => Ok(CommandKind::RemoveComponent),
            other => Err(EcsError::UnknownCommand(other)),
        }
    }
}

/// Fixed-layout command record
#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandRecord {
    pub kind: CommandKind,
    pub tick: u32,
    pub system_order: u32,
    /// Effective sort key (user key, or `NO_SORT_KEY`)
    pub sort_key: i32,
    /// Real entity index if the target is real, else the effective sort key
    pub entity_index_key: i64,
    pub component: ComponentTypeId,
    pub worker: u32,
    pub sequence: u32,
    pub entity: Entity,
    /// Index into the recording worker's typed value store, or -1
    pub value_index: i32,
}

impl CommandRecord {
    /// Total-order key; stable sort on this is the merge contract
    #[inline]
    pub fn order_key(&self) -> (u32, u32, u8, i32, i64, u8, u32, u32, u32) {
        (
            self.tick,
            self.system_order,
            self.kind.phase(),
            self.sort_key,
            self.entity_index_key,
            self.kind as u8,
            self.component.0,
            self.worker,
            self.sequence,
        )
    }
}

/// Typed value parking for recorded `add` payloads
trait ValueStore: Send + Sync {
    /// Copy the parked value at `value_index` into a column cell
    fn write_into(
        &self,
        value_index: usize,
        column: &mut dyn ComponentColumn,
        row: usize,
    ) -> Result<()>;

    fn len(&self) -> usize;

    fn clear(&mut self);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedValueStore<T: Component> {
    values: Vec<T>,
    warmed: usize,
}

impl<T: Component> TypedValueStore<T> {
    fn new(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            warmed: capacity,
        }
    }
}

impl<T: Component> ValueStore for TypedValueStore<T> {
    fn write_into(
        &self,
        value_index: usize,
        column: &mut dyn ComponentColumn,
        row: usize,
    ) -> Result<()> {
        typed_column_mut::<T>(column)?.write(row, self.values[value_index]);
        Ok(())
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Per-worker command recorder
///
/// Strictly thread-local during the record phase; commands record in
/// program order, reflected by the monotonic sequence counter. In
/// deterministic mode all capacities must be warmed beforehand and every
/// recorded `add` type pre-registered with `warmup_values`.
pub struct CommandRecorder {
    worker: u32,
    tick: u32,
    system_order: u32,
    deterministic: bool,
    command_capacity: usize,
    temp_stride: u32,
    next_temp: u32,
    sequence: u32,
    commands: Vec<CommandRecord>,
    values: AHashMap<ComponentTypeId, Box<dyn ValueStore>>,
    types: TypeRegistrySnapshot,
}

impl CommandRecorder {
    fn new(worker: u32, temp_stride: u32, deterministic: bool, tick: u32, types: TypeRegistrySnapshot) -> Self {
        Self {
            worker,
            tick,
            system_order: 0,
            deterministic,
            command_capacity: 0,
            temp_stride,
            next_temp: 0,
            sequence: 0,
            commands: Vec::new(),
            values: AHashMap::new(),
            types,
        }
    }

    #[inline]
    pub fn worker(&self) -> u32 {
        self.worker
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Order index of the system currently recording through this worker
    pub fn set_system_order(&mut self, order: u32) {
        self.system_order = order;
    }

    /// Reserve command capacity; in deterministic mode recording past it
    /// fails with `EcbCapacityExceeded`
    pub fn warmup_commands(&mut self, capacity: usize) {
        if self.commands.capacity() < capacity {
            self.commands.reserve_exact(capacity - self.commands.capacity());
        }
        self.command_capacity = capacity;
    }

    /// Pre-register the typed value store for `T` with `capacity` slots
    pub fn warmup_values<T: Component>(&mut self, capacity: usize) -> Result<()> {
        let type_id = self.types.type_id_of::<T>()?;
        self.values
            .entry(type_id)
            .or_insert_with(|| Box::new(TypedValueStore::<T>::new(capacity)));
        Ok(())
    }

    /// Record an entity creation; returns the temp handle
    ///
    /// Deterministic mode rejects a zero sort key: a create carries no real
    /// entity index to break ties with.
    pub fn create_entity(&mut self, sort_key: i32) -> Result<Entity> {
        if self.deterministic && sort_key == 0 {
            return Err(EcsError::EcbSortKeyRequired);
        }
        if self.next_temp >= self.temp_stride {
            return Err(EcsError::EcbCapacityExceeded);
        }
        let slot = self.worker * self.temp_stride + self.next_temp;
        self.next_temp += 1;
        let entity = Entity::Temp { slot };
        let effective = effective_key(sort_key);
        self.push(
            CommandKind::CreateEntity,
            entity,
            effective,
            i64::from(effective),
            ComponentTypeId::NONE,
            -1,
        )?;
        Ok(entity)
    }

    /// Record an entity destruction
    pub fn destroy_entity(&mut self, entity: Entity, sort_key: i32) -> Result<()> {
        let effective = self.check_key(entity, sort_key)?;
        self.push(
            CommandKind::DestroyEntity,
            entity,
            effective,
            entity_index_key(entity, effective),
            ComponentTypeId::NONE,
            -1,
        )
    }

    /// Record an add; the value is parked in this worker's typed store
    pub fn add_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
        sort_key: i32,
    ) -> Result<()> {
        let type_id = self.types.type_id_of::<T>()?;
        let effective = self.check_key(entity, sort_key)?;
        let value_index = self.push_value(type_id, value)?;
        self.push(
            CommandKind::AddComponent,
            entity,
            effective,
            entity_index_key(entity, effective),
            type_id,
            value_index,
        )
    }

    /// Record a remove by component type
    pub fn remove_component<T: Component>(&mut self, entity: Entity, sort_key: i32) -> Result<()> {
        let type_id = self.types.type_id_of::<T>()?;
        self.remove_component_by_id(entity, type_id, sort_key)
    }

    /// Record a remove by raw type id
    pub fn remove_component_by_id(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
        sort_key: i32,
    ) -> Result<()> {
        let effective = self.check_key(entity, sort_key)?;
        self.push(
            CommandKind::RemoveComponent,
            entity,
            effective,
            entity_index_key(entity, effective),
            type_id,
            -1,
        )
    }

    /// Commands targeting temps need a real sort key in deterministic mode
    fn check_key(&self, entity: Entity, sort_key: i32) -> Result<i32> {
        if self.deterministic && entity.is_temp() && sort_key == 0 {
            return Err(EcsError::EcbSortKeyRequired);
        }
        Ok(effective_key(sort_key))
    }

    fn push_value<T: Component>(&mut self, type_id: ComponentTypeId, value: T) -> Result<i32> {
        let deterministic = self.deterministic;
        if !self.values.contains_key(&type_id) {
            if deterministic {
                return Err(EcsError::EcbValueNotWarmed(type_id));
            }
            self.values
                .insert(type_id, Box::new(TypedValueStore::<T>::new(0)));
        }
        let store = self
            .values
            .get_mut(&type_id)
            .ok_or(EcsError::EcbValueNotWarmed(type_id))?;
        let typed = store
            .as_any_mut()
            .downcast_mut::<TypedValueStore<T>>()
            .ok_or(EcsError::ColumnTypeMismatch)?;
        if deterministic && typed.values.len() >= typed.warmed {
            return Err(EcsError::EcbCapacityExceeded);
        }
        let index = typed.values.len() as i32;
        typed.values.push(value);
        Ok(index)
    }

    /// Append a record; no-grow in deterministic mode
    fn push(
        &mut self,
        kind: CommandKind,
        entity: Entity,
        sort_key: i32,
        entity_index_key: i64,
        component: ComponentTypeId,
        value_index: i32,
    ) -> Result<()> {
        if self.deterministic && self.commands.len() >= self.command_capacity {
            return Err(EcsError::EcbCapacityExceeded);
        }
        let sequence = self.sequence;
        self.sequence += 1;
        self.commands.push(CommandRecord {
            kind,
            tick: self.tick,
            system_order: self.system_order,
            sort_key,
            entity_index_key,
            component,
            worker: self.worker,
            sequence,
            entity,
            value_index,
        });
        Ok(())
    }

    /// Drop recorded state, keeping warmed capacity
    fn clear_retaining(&mut self) {
        self.commands.clear();
        for store in self.values.values_mut() {
            store.clear();
        }
        self.sequence = 0;
        self.next_temp = 0;
    }
}

#[inline]
fn effective_key(sort_key: i32) -> i32 {
    if sort_key == 0 {
        NO_SORT_KEY
    } else {
        sort_key
    }
}

#[inline]
fn entity_index_key(entity: Entity, effective: i32) -> i64 {
    match entity.real_index() {
        Some(index) => i64::from(index),
        None => i64::from(effective),
    }
}

fn resolve_handle(temp_map: &[Entity], entity: Entity) -> Result<Entity> {
    match entity {
        Entity::Real { .. } => Ok(entity),
        Entity::Temp { slot } => {
            let real = temp_map
                .get(slot as usize)
                .copied()
                .ok_or(EcsError::EcbInvalidTempHandle)?;
            if real.is_invalid() {
                return Err(EcsError::EcbInvalidTempHandle);
            }
            Ok(real)
        }
    }
}

/// Deferred, sort-merged structural command queue
///
/// One recorder per worker. Recording may run on parallel workers (hand
/// each thread a disjoint `&mut` recorder via `recorders_mut`); playback is
/// serial and happens at the barrier the caller arranges.
pub struct EntityCommandBuffer {
    recorders: Vec<CommandRecorder>,
    temp_stride: u32,
}

impl EntityCommandBuffer {
    pub(crate) fn new(
        workers: usize,
        temp_stride: u32,
        deterministic: bool,
        tick: u32,
        types: TypeRegistrySnapshot,
    ) -> Self {
        let recorders = (0..workers)
            .map(|w| CommandRecorder::new(w as u32, temp_stride, deterministic, tick, types.clone()))
            .collect();
        Self {
            recorders,
            temp_stride,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.recorders.len()
    }

    /// Temp handles available to each worker per playback
    pub fn temp_stride(&self) -> u32 {
        self.temp_stride
    }

    /// Recorder for one worker
    pub fn recorder(&mut self, worker: usize) -> &mut CommandRecorder {
        &mut self.recorders[worker]
    }

    /// All recorders, for handing out disjointly to recording threads
    pub fn recorders_mut(&mut self) -> &mut [CommandRecorder] {
        &mut self.recorders
    }

    /// Total recorded commands across workers
    pub fn total_commands(&self) -> usize {
        self.recorders.iter().map(|r| r.commands.len()).sum()
    }

    /// Warm every recorder to fixed capacities
    ///
    /// Required before recording in deterministic mode; growth past these
    /// limits fails with `EcbCapacityExceeded`.
    pub fn warmup(&mut self, commands_per_worker: usize) {
        for recorder in &mut self.recorders {
            recorder.warmup_commands(commands_per_worker);
        }
    }

    /// Pre-register the value store for `T` on every recorder
    pub fn warmup_values<T: Component>(&mut self, capacity: usize) -> Result<()> {
        for recorder in &mut self.recorders {
            recorder.warmup_values::<T>(capacity)?;
        }
        Ok(())
    }

    /// System order for all workers
    pub fn set_system_order(&mut self, order: u32) {
        for recorder in &mut self.recorders {
            recorder.set_system_order(order);
        }
    }

    /// Drop all recorded state and stamp the next tick
    pub fn reset(&mut self, tick: u32) {
        for recorder in &mut self.recorders {
            recorder.clear_retaining();
            recorder.tick = tick;
        }
    }

    /// Merge, sort, and apply all recorded commands
    ///
    /// Concatenates worker buffers into a pooled array, stable-sorts by the
    /// comparator, resolves temp handles as creates execute, and applies
    /// each command through the immediate structural paths. Stops on the
    /// first error, leaving the recorded commands in place so the caller
    /// can inspect and `reset`. On success the recorders are cleared with
    /// their warmed capacity retained.
    pub fn playback(&mut self, world: &mut World) -> Result<()> {
        let total = self.total_commands();
        if total == 0 {
            return Ok(());
        }

        #[cfg(feature = "profiling")]
        let span = info_span!("ecb.playback", queued = total, workers = self.recorders.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let (state, components) = world.split_mut();
        state.assert_structural_allowed()?;

        let mut merged = MERGE_SCRATCH.rent(total);
        for recorder in &self.recorders {
            merged.extend_from_slice(&recorder.commands);
        }
        #[cfg(feature = "parallel")]
        merged.par_sort_by_key(CommandRecord::order_key);
        #[cfg(not(feature = "parallel"))]
        merged.sort_by_key(CommandRecord::order_key);

        let temp_count = self.recorders.len() * self.temp_stride as usize;
        let mut temp_map = TEMP_SCRATCH.rent(temp_count);
        temp_map.resize(temp_count, Entity::INVALID);

        for record in merged.iter() {
            match record.kind {
                CommandKind::CreateEntity => {
                    let Entity::Temp { slot } = record.entity else {
                        return Err(EcsError::EcbInvalidTempHandle);
                    };
                    let real = structural::create_internal(state, components)?;
                    temp_map[slot as usize] = real;
                }
                CommandKind::DestroyEntity => {
                    let target = resolve_handle(&temp_map, record.entity)?;
                    structural::destroy_internal(state, target)?;
                }
                CommandKind::AddComponent => {
                    let target = resolve_handle(&temp_map, record.entity)?;
                    let store = self.recorders[record.worker as usize]
                        .values
                        .get(&record.component)
                        .ok_or(EcsError::EcbValueNotWarmed(record.component))?;
                    if record.value_index < 0 || record.value_index as usize >= store.len() {
                        return Err(EcsError::EcbValueNotWarmed(record.component));
                    }
                    let value_index = record.value_index as usize;
                    let mut write = |column: &mut dyn ComponentColumn, row: usize| {
                        store.write_into(value_index, column, row)
                    };
                    structural::add_erased(state, components, target, record.component, &mut write)?;
                }
                CommandKind::RemoveComponent => {
                    let target = resolve_handle(&temp_map, record.entity)?;
                    structural::remove_erased(state, components, target, record.component)?;
                }
            }
        }

        for recorder in &mut self.recorders {
            recorder.clear_retaining();
        }
        Ok(())
    }
}
