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

//! Lockstep ECS - deterministic archetype ECS core
//!
//! Columnar archetype storage with generational entity handles and a
//! sort-merged entity command buffer, built for lockstep simulations where
//! every peer must replay structural changes bit-identically.

pub mod archetype;
pub mod chunk;
pub mod command;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod pool;
pub mod state;
pub mod utils;
pub mod world;

mod accessor;
mod storage;
mod structural;

// Re-exports for convenience
pub use archetype::{Archetype, ArchetypeId, ArchetypeSignature};
pub use chunk::{Chunk, ComponentColumn, TypedColumn};
pub use command::{CommandKind, CommandRecorder, EntityCommandBuffer, NO_SORT_KEY};
pub use component::{Component, ComponentTypeId, ComponentTypeStore, ManifestEntry};
pub use config::{AllocationPolicy, RemovalPolicy, WorldConfig};
pub use entity::{Entity, EntityLocation, EntityManager};
pub use error::{EcsError, Result};
pub use state::IterationScope;
pub use world::World;
