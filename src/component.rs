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

//! Component types, the registration store, and the component manifest
//!
//! Components are fixed-size value records attached to entities. Each
//! registered type gets a stable small integer id (assigned in registration
//! order) and a monomorphized column factory. In deterministic mode peers
//! must register in the same canonical order, which makes ids, signature
//! hashes, and archetype ids line up across the session.

use std::any::TypeId;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use speedy::{Readable, Writable};

use crate::chunk::{ComponentColumn, TypedColumn};
use crate::error::{EcsError, Result};
use crate::utils::{fnv1a64, FNV64_OFFSET};

/// Marker trait for components
///
/// Components are plain value records: no destructors, no borrowed data.
pub trait Component: Copy + Default + Send + Sync + 'static {}

/// Automatically implement Component for all valid types
impl<T: Copy + Default + Send + Sync + 'static> Component for T {}

/// Stable small integer identity of a registered component type
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ComponentTypeId(pub u32);

impl ComponentTypeId {
    /// Sentinel for command records that carry no component
    pub const NONE: ComponentTypeId = ComponentTypeId(u32::MAX);
}

/// Per-type registration record
pub struct ComponentInfo {
    pub name: &'static str,
    pub type_id: ComponentTypeId,
    pub size: u32,
    pub layout_hash: u64,
    factory: fn(usize) -> Box<dyn ComponentColumn>,
}

/// One entry of the wire manifest peers exchange before a lockstep session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Readable, Writable)]
pub struct ManifestEntry {
    pub name: String,
    pub type_id: u32,
    pub size: u32,
    pub layout_hash: u64,
}

fn make_column<T: Component>(capacity: usize) -> Box<dyn ComponentColumn> {
    Box::new(TypedColumn::<T>::new(capacity))
}

fn layout_hash_of<T: Component>() -> u64 {
    let mut h = fnv1a64(FNV64_OFFSET, std::any::type_name::<T>().as_bytes());
    h = fnv1a64(h, &(std::mem::size_of::<T>() as u32).to_be_bytes());
    fnv1a64(h, &(std::mem::align_of::<T>() as u32).to_be_bytes())
}

/// Registry of component types
///
/// Idempotent typed registration, strict lookups, and column factories.
/// Sealed after bootstrap: lookups then only succeed for registered types.
pub struct ComponentTypeStore {
    by_type: FxHashMap<TypeId, ComponentTypeId>,
    infos: Vec<ComponentInfo>,
    sealed: bool,
}

impl ComponentTypeStore {
    pub fn new() -> Self {
        Self {
            by_type: FxHashMap::default(),
            infos: Vec::new(),
            sealed: false,
        }
    }

    /// Register `T`, returning its id; idempotent
    ///
    /// Fails once the store is sealed: the set of component type shapes is
    /// fixed at bootstrap.
    pub fn register<T: Component>(&mut self) -> Result<ComponentTypeId> {
        let key = TypeId::of::<T>();
        if let Some(&id) = self.by_type.get(&key) {
            return Ok(id);
        }
        if self.sealed {
            return Err(EcsError::TypeNotRegistered(std::any::type_name::<T>()));
        }
        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            name: std::any::type_name::<T>(),
            type_id: id,
            size: std::mem::size_of::<T>() as u32,
            layout_hash: layout_hash_of::<T>(),
            factory: make_column::<T>,
        });
        self.by_type.insert(key, id);
        Ok(id)
    }

    /// Strict lookup: fails if `T` was never registered
    pub fn type_id_strict<T: Component>(&self) -> Result<ComponentTypeId> {
        self.by_type
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or_else(|| EcsError::TypeNotRegistered(std::any::type_name::<T>()))
    }

    /// Non-strict lookup: auto-registers unknown types (testing/tooling only)
    ///
    /// Falls back to strict behavior once the store is sealed.
    pub fn type_id_or_register<T: Component>(&mut self) -> Result<ComponentTypeId> {
        if self.sealed {
            self.type_id_strict::<T>()
        } else {
            self.register::<T>()
        }
    }

    /// Close registration; lookups become registered-only
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn info(&self, type_id: ComponentTypeId) -> Result<&ComponentInfo> {
        self.infos
            .get(type_id.0 as usize)
            .ok_or(EcsError::NoColumnFactory(type_id))
    }

    /// Build one typed column of `capacity` rows for `type_id`
    pub fn create_column(
        &self,
        type_id: ComponentTypeId,
        capacity: usize,
    ) -> Result<Box<dyn ComponentColumn>> {
        let info = self.info(type_id)?;
        Ok((info.factory)(capacity))
    }

    /// Build the column set for a signature, one column per type id in order
    pub fn create_columns_for_signature(
        &self,
        capacity: usize,
        type_ids: &[ComponentTypeId],
    ) -> Result<Box<[Box<dyn ComponentColumn>]>> {
        let mut columns = Vec::with_capacity(type_ids.len());
        for &type_id in type_ids {
            columns.push(self.create_column(type_id, capacity)?);
        }
        Ok(columns.into_boxed_slice())
    }

    /// The component manifest, sorted by type id ascending
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.infos
            .iter()
            .map(|info| ManifestEntry {
                name: info.name.to_string(),
                type_id: info.type_id.0,
                size: info.size,
                layout_hash: info.layout_hash,
            })
            .collect()
    }

    /// Canonical binary manifest encoding for the byte-for-byte handshake
    pub fn manifest_bytes(&self) -> Result<Vec<u8>> {
        self.manifest()
            .write_to_vec()
            .map_err(|e| EcsError::Serialization(e.to_string()))
    }

    /// JSON manifest for tooling and logs
    pub fn manifest_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.manifest())
            .map_err(|e| EcsError::Serialization(e.to_string()))
    }

    /// 64-bit digest of the manifest; peers with equal digests have
    /// byte-identical manifests
    pub fn manifest_hash(&self) -> u64 {
        let mut h = FNV64_OFFSET;
        for info in &self.infos {
            h = fnv1a64(h, info.name.as_bytes());
            h = fnv1a64(h, &[0]);
            h = fnv1a64(h, &info.type_id.0.to_be_bytes());
            h = fnv1a64(h, &info.size.to_be_bytes());
            h = fnv1a64(h, &info.layout_hash.to_be_bytes());
        }
        h
    }

    /// Immutable type table snapshot for command recorders
    ///
    /// Recording runs on worker threads with no world access; the snapshot
    /// carries the TypeId -> ComponentTypeId mapping they resolve against.
    pub fn snapshot(&self) -> TypeRegistrySnapshot {
        let mut map = FxHashMap::default();
        for (key, &id) in &self.by_type {
            map.insert(*key, id);
        }
        TypeRegistrySnapshot { map }
    }
}

impl Default for ComponentTypeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the registered type table
#[derive(Clone)]
pub struct TypeRegistrySnapshot {
    map: FxHashMap<TypeId, ComponentTypeId>,
}

impl TypeRegistrySnapshot {
    /// Strict lookup against the snapshot
    pub fn type_id_of<T: Component>(&self) -> Result<ComponentTypeId> {
        self.map
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or_else(|| EcsError::TypeNotRegistered(std::any::type_name::<T>()))
    }
}
