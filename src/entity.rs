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

//! Entity handles, locations, and the generational slot allocator

use crate::archetype::ArchetypeId;

/// Entity handle
///
/// A real handle is a `(index, version)` pair into the world's slot table;
/// the version increments on destroy so stale handles compare unequal. A
/// temp handle is emitted by a command buffer `create` and is only
/// resolvable within the playback that maps it to a real entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    Real { index: u32, version: u32 },
    Temp { slot: u32 },
}

impl Entity {
    /// Sentinel stored in unoccupied chunk rows
    pub const INVALID: Entity = Entity::Real {
        index: u32::MAX,
        version: u32::MAX,
    };

    /// Slot index for a real handle
    #[inline]
    pub fn real_index(self) -> Option<u32> {
        match self {
            Entity::Real { index, .. } if index != u32::MAX => Some(index),
            _ => None,
        }
    }

    #[inline]
    pub fn is_temp(self) -> bool {
        matches!(self, Entity::Temp { .. })
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self == Entity::INVALID
    }
}

/// Entity location: (archetype id, chunk index, row)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype: ArchetypeId,
    pub chunk: u32,
    pub row: u32,
}

impl EntityLocation {
    /// Sentinel for "not stored anywhere"
    pub const INVALID: EntityLocation = EntityLocation {
        archetype: ArchetypeId::INVALID,
        chunk: u32::MAX,
        row: u32::MAX,
    };

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.archetype != ArchetypeId::INVALID
    }
}

/// Generational entity slot allocator
///
/// Owns the per-slot `versions`, `alive`, and `locations` arrays plus the
/// LIFO free list. Performs no storage work: placing and removing rows is
/// the storage layer's job, which keeps the two composable.
pub struct EntityManager {
    versions: Vec<u32>,
    alive: Vec<bool>,
    locations: Vec<EntityLocation>,
    free: Vec<u32>,
    next_index: u32,
    recycled: usize,
}

impl EntityManager {
    pub fn new() -> Self {
        Self {
            versions: Vec::new(),
            alive: Vec::new(),
            locations: Vec::new(),
            free: Vec::new(),
            next_index: 0,
            recycled: 0,
        }
    }

    /// Grow the slot arrays so indices `< needed` are addressable
    ///
    /// Amortized growth: doubling up to 1024 slots, then 1.5x. New slots are
    /// version 0, dead, and unlocated.
    pub fn ensure_capacity(&mut self, needed: usize) {
        let mut cap = self.locations.len();
        if cap >= needed {
            return;
        }
        while cap < needed {
            cap = if cap < 1024 {
                (cap * 2).max(64)
            } else {
                cap + cap / 2
            };
        }
        self.versions.resize(cap, 0);
        self.alive.resize(cap, false);
        self.locations.resize(cap, EntityLocation::INVALID);
    }

    /// Push a slot index onto the free list (LIFO)
    pub fn push_free_index(&mut self, index: u32) {
        self.free.push(index);
    }

    /// Pop the most recently freed slot index, if any
    pub fn try_pop_free_index(&mut self) -> Option<u32> {
        self.free.pop()
    }

    /// Allocate a handle from a recycled slot or a fresh index
    ///
    /// Marks the slot alive and returns `(index, current version)`. The
    /// entity has no storage row yet; its location stays invalid until the
    /// storage layer places it.
    pub fn create(&mut self) -> Entity {
        let index = match self.try_pop_free_index() {
            Some(index) => {
                self.recycled += 1;
                index
            }
            None => {
                let index = self.next_index;
                self.next_index += 1;
                self.ensure_capacity(self.next_index as usize);
                index
            }
        };
        self.alive[index as usize] = true;
        Entity::Real {
            index,
            version: self.versions[index as usize],
        }
    }

    /// True iff the handle is real, in range, alive, and version-current
    pub fn is_alive(&self, entity: Entity) -> bool {
        match entity {
            Entity::Real { index, version } => {
                let i = index as usize;
                i < self.alive.len() && self.alive[i] && self.versions[i] == version
            }
            Entity::Temp { .. } => false,
        }
    }

    /// Retire a slot: invalidate its location, bump the version (wrapping),
    /// and push the index onto the free list
    ///
    /// The caller must already have removed the entity's storage row.
    pub fn finalize_destroy(&mut self, entity: Entity) {
        if let Entity::Real { index, .. } = entity {
            let i = index as usize;
            self.locations[i] = EntityLocation::INVALID;
            self.alive[i] = false;
            self.versions[i] = self.versions[i].wrapping_add(1);
            self.push_free_index(index);
        }
    }

    #[inline]
    pub fn location(&self, index: u32) -> EntityLocation {
        self.locations[index as usize]
    }

    #[inline]
    pub fn set_location(&mut self, index: u32, location: EntityLocation) {
        self.locations[index as usize] = location;
    }

    /// Number of live slots
    pub fn live_count(&self) -> usize {
        self.next_index as usize - self.free.len()
    }

    /// Number of create calls served from the free list
    pub fn recycled_count(&self) -> usize {
        self.recycled
    }

    /// Addressable slot count (for range checks)
    pub fn slot_count(&self) -> usize {
        self.locations.len()
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}
