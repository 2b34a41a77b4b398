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

//! Archetypes and the content-addressed archetype registry
//!
//! An archetype owns the chunks and column layout for one exact component
//! set. The registry keys archetypes by a deterministic 64-bit signature
//! hash (the bucket) plus a 32-bit disambiguator minted on creation, and
//! enumerates them in ascending `(bucket, id, signature)` order so peers
//! that created the same archetypes walk them identically regardless of
//! creation order.

use std::collections::BTreeMap;
use std::fmt;

use ahash::AHashMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::chunk::{Chunk, ComponentColumn};
use crate::component::ComponentTypeId;
use crate::config::AllocationPolicy;
use crate::error::{EcsError, Result};
use crate::pool::BufferPool;
use crate::utils::{fnv1a32, fnv1a64, FNV32_OFFSET, FNV64_OFFSET, PHI32};

/// Scratch buffers for successor-signature construction
static SIGNATURE_SCRATCH: BufferPool<ComponentTypeId> = BufferPool::new();

/// Maximum components a signature holds inline before spilling to the heap
pub const SIGNATURE_INLINE: usize = 8;

/// Sorted, deduplicated sequence of component type ids
///
/// Two signatures are equal iff they are identical element-wise. Signatures
/// own their id arrays; they are never pooled.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeSignature {
    ids: SmallVec<[ComponentTypeId; SIGNATURE_INLINE]>,
}

impl ArchetypeSignature {
    /// The empty signature (entities with no components)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from arbitrary ids; sorts and deduplicates
    pub fn new(ids: &[ComponentTypeId]) -> Self {
        let mut ids: SmallVec<[ComponentTypeId; SIGNATURE_INLINE]> = SmallVec::from_slice(ids);
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    /// Build from ids that are already sorted and deduplicated
    pub fn from_sorted(ids: &[ComponentTypeId]) -> Self {
        debug_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        Self {
            ids: SmallVec::from_slice(ids),
        }
    }

    #[inline]
    pub fn type_ids(&self) -> &[ComponentTypeId] {
        &self.ids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn contains(&self, type_id: ComponentTypeId) -> bool {
        self.ids.binary_search(&type_id).is_ok()
    }
}

/// 64-bit signature bucket hash
///
/// FNV-1a over the big-endian byte sequence of the 32-bit type ids, with
/// the signature length folded in at the end. Part of the wire contract.
pub fn signature_hash64(ids: &[ComponentTypeId]) -> u64 {
    let mut h = FNV64_OFFSET;
    for id in ids {
        h = fnv1a64(h, &id.0.to_be_bytes());
    }
    (h ^ ids.len() as u64).wrapping_mul(crate::utils::FNV64_PRIME)
}

/// 32-bit disambiguator hash with an explicit seed
pub fn signature_hash32(ids: &[ComponentTypeId], seed: u32) -> u32 {
    let mut h = seed;
    for id in ids {
        h = fnv1a32(h, &id.0.to_be_bytes());
    }
    h
}

/// Unique archetype identity: `(bucket hash, disambiguator)`
///
/// The derived lexicographic order on `(bucket, disambiguator)` is the
/// canonical enumeration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId {
    pub bucket: u64,
    pub disambiguator: u32,
}

impl ArchetypeId {
    pub const INVALID: ArchetypeId = ArchetypeId {
        bucket: u64::MAX,
        disambiguator: u32::MAX,
    };
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}:{:08x}", self.bucket, self.disambiguator)
    }
}

/// Storage tables for one exact component set
///
/// Owns its chunks and the column layout. Column `i` of every chunk stores
/// data for `signature.type_ids()[i]`; the `column_index` map gives the
/// accessor its O(1) type-id lookup.
pub struct Archetype {
    signature: ArchetypeSignature,
    id: ArchetypeId,
    chunks: Vec<Chunk>,
    column_index: FxHashMap<ComponentTypeId, usize>,
}

impl Archetype {
    pub fn new(signature: ArchetypeSignature, id: ArchetypeId) -> Self {
        let mut column_index = FxHashMap::default();
        for (i, &type_id) in signature.type_ids().iter().enumerate() {
            column_index.insert(type_id, i);
        }
        Self {
            signature,
            id,
            chunks: Vec::new(),
            column_index,
        }
    }

    #[inline]
    pub fn signature(&self) -> &ArchetypeSignature {
        &self.signature
    }

    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Column index for a component type, if present
    #[inline]
    pub fn column_index(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.column_index.get(&type_id).copied()
    }

    #[inline]
    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.column_index.contains_key(&type_id)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[inline]
    pub fn chunk(&self, index: u32) -> &Chunk {
        &self.chunks[index as usize]
    }

    #[inline]
    pub fn chunk_mut(&mut self, index: u32) -> &mut Chunk {
        &mut self.chunks[index as usize]
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total populated rows across all chunks
    pub fn entity_count(&self) -> usize {
        self.chunks.iter().map(|c| c.count() as usize).sum()
    }

    /// Index of the first chunk with free space under `policy`, if any
    pub fn find_chunk_with_space(&self, policy: AllocationPolicy) -> Option<u32> {
        let found = match policy {
            AllocationPolicy::FirstFit => self.chunks.iter().position(Chunk::has_space),
            AllocationPolicy::LastFit => self.chunks.iter().rposition(Chunk::has_space),
        };
        found.map(|i| i as u32)
    }

    /// Return a chunk with free space, creating one if every chunk is full
    ///
    /// `make_columns` builds the column set for a fresh chunk from this
    /// archetype's signature. The second return value reports whether a
    /// chunk was created (the caller bumps the structural version).
    pub fn get_or_create_chunk_with_space<F>(
        &mut self,
        capacity: u32,
        policy: AllocationPolicy,
        make_columns: F,
    ) -> Result<(u32, bool)>
    where
        F: FnOnce(&[ComponentTypeId]) -> Result<Box<[Box<dyn ComponentColumn>]>>,
    {
        if let Some(index) = self.find_chunk_with_space(policy) {
            return Ok((index, false));
        }
        let columns = make_columns(self.signature.type_ids())?;
        let index = self.chunks.len() as u32;
        self.chunks.push(Chunk::new(index, capacity, columns));
        Ok((index, true))
    }
}

/// Content-addressed archetype registry
///
/// Buckets are keyed by the 64-bit signature hash and traversed in
/// ascending order; within a bucket, entries stay sorted by
/// `(archetype id, signature)`. Archetypes are created lazily and never
/// destroyed.
pub struct ArchetypeStore {
    archetypes: Vec<Archetype>,
    buckets: BTreeMap<u64, SmallVec<[u32; 2]>>,
    by_id: AHashMap<ArchetypeId, u32>,
    empty_index: u32,
}

impl ArchetypeStore {
    pub fn new() -> Self {
        Self {
            archetypes: Vec::new(),
            buckets: BTreeMap::new(),
            by_id: AHashMap::new(),
            empty_index: u32::MAX,
        }
    }

    /// Idempotently create the archetype with the empty signature
    pub fn initialize_empty_archetype(&mut self) -> Result<(u32, bool)> {
        let (index, created) = self.get_or_create_from_sorted(&[])?;
        self.empty_index = index;
        Ok((index, created))
    }

    /// Dense index of the empty archetype
    #[inline]
    pub fn empty_index(&self) -> u32 {
        debug_assert!(self.empty_index != u32::MAX);
        self.empty_index
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    #[inline]
    pub fn archetype(&self, index: u32) -> &Archetype {
        &self.archetypes[index as usize]
    }

    #[inline]
    pub fn archetype_mut(&mut self, index: u32) -> &mut Archetype {
        &mut self.archetypes[index as usize]
    }

    /// Dense index for an archetype id; exact lookup
    pub fn index_of(&self, id: ArchetypeId) -> Result<u32> {
        self.by_id
            .get(&id)
            .copied()
            .ok_or(EcsError::ArchetypeNotFound(id))
    }

    /// Archetype for an id; exact lookup
    pub fn get_by_id(&self, id: ArchetypeId) -> Result<&Archetype> {
        self.index_of(id).map(|i| self.archetype(i))
    }

    /// Mutable access to two distinct archetypes at once
    ///
    /// Needed by row migration, which reads the source while writing the
    /// destination.
    pub fn pair_mut(&mut self, a: u32, b: u32) -> (&mut Archetype, &mut Archetype) {
        debug_assert!(a != b);
        let (a, b) = (a as usize, b as usize);
        if a < b {
            let (left, right) = self.archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Canonical lookup-or-create for a sorted, deduplicated id slice
    ///
    /// Returns the dense index and whether the archetype was created (the
    /// caller bumps the version counters on creation).
    pub fn get_or_create_from_sorted(&mut self, ids: &[ComponentTypeId]) -> Result<(u32, bool)> {
        debug_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        let bucket = signature_hash64(ids);
        if let Some(list) = self.buckets.get(&bucket) {
            for &index in list.iter() {
                if self.archetypes[index as usize].signature().type_ids() == ids {
                    return Ok((index, false));
                }
            }
        }

        let disambiguator = self.mint_disambiguator(bucket, ids)?;
        let id = ArchetypeId {
            bucket,
            disambiguator,
        };
        let signature = ArchetypeSignature::from_sorted(ids);
        let index = self.archetypes.len() as u32;
        self.archetypes.push(Archetype::new(signature, id));
        self.by_id.insert(id, index);

        let archetypes = &self.archetypes;
        let list = self.buckets.entry(bucket).or_default();
        let probe = list.binary_search_by(|&existing| {
            let e = &archetypes[existing as usize];
            (e.id(), e.signature()).cmp(&(id, archetypes[index as usize].signature()))
        });
        let pos = match probe {
            Ok(pos) | Err(pos) => pos,
        };
        list.insert(pos, index);

        Ok((index, true))
    }

    /// Lookup-or-create by signature
    pub fn get_or_create(&mut self, signature: &ArchetypeSignature) -> Result<(u32, bool)> {
        self.get_or_create_from_sorted(signature.type_ids())
    }

    /// Successor archetype with `type_id` added; returns the source when it
    /// already contains the type
    pub fn with_added(&mut self, src: u32, type_id: ComponentTypeId) -> Result<(u32, bool)> {
        let src_ids = self.archetypes[src as usize].signature().type_ids();
        if src_ids.binary_search(&type_id).is_ok() {
            return Ok((src, false));
        }
        let mut scratch = SIGNATURE_SCRATCH.rent(src_ids.len() + 1);
        let insert_at = src_ids.partition_point(|&id| id < type_id);
        scratch.extend_from_slice(&src_ids[..insert_at]);
        scratch.push(type_id);
        scratch.extend_from_slice(&src_ids[insert_at..]);
        self.get_or_create_from_sorted(&scratch)
    }

    /// Successor archetype with `type_id` removed; returns the source when
    /// it lacks the type, and the empty archetype when removal empties the
    /// signature
    pub fn with_removed(&mut self, src: u32, type_id: ComponentTypeId) -> Result<(u32, bool)> {
        let src_ids = self.archetypes[src as usize].signature().type_ids();
        if src_ids.binary_search(&type_id).is_err() {
            return Ok((src, false));
        }
        let mut scratch = SIGNATURE_SCRATCH.rent(src_ids.len().saturating_sub(1));
        scratch.extend(src_ids.iter().copied().filter(|&id| id != type_id));
        self.get_or_create_from_sorted(&scratch)
    }

    /// Archetypes in canonical order: ascending bucket hash, then ascending
    /// `(id, signature)` within the bucket
    ///
    /// Lazy and allocation-free; restarting is always safe.
    pub fn iter_stable(&self) -> impl Iterator<Item = &Archetype> + '_ {
        self.buckets
            .values()
            .flat_map(move |list| list.iter().map(move |&i| &self.archetypes[i as usize]))
    }

    fn bucket_has_disambiguator(&self, bucket: u64, candidate: u32) -> bool {
        self.buckets
            .get(&bucket)
            .map(|list| {
                list.iter()
                    .any(|&i| self.archetypes[i as usize].id().disambiguator == candidate)
            })
            .unwrap_or(false)
    }

    /// Deterministic disambiguator minting
    ///
    /// Primary content hash first, then up to 32 golden-ratio re-seeded
    /// probes, then a linear scan. Deterministic given the signature and the
    /// prior bucket contents.
    fn mint_disambiguator(&self, bucket: u64, ids: &[ComponentTypeId]) -> Result<u32> {
        let mut candidate = signature_hash32(ids, FNV32_OFFSET);
        if !self.bucket_has_disambiguator(bucket, candidate) {
            return Ok(candidate);
        }
        for attempt in 1..=32u32 {
            let seed = FNV32_OFFSET ^ attempt.wrapping_mul(PHI32);
            candidate = signature_hash32(ids, seed);
            if !self.bucket_has_disambiguator(bucket, candidate) {
                return Ok(candidate);
            }
        }
        let mut steps: u64 = 0;
        while steps <= u64::from(u32::MAX) {
            candidate = candidate.wrapping_add(1);
            if !self.bucket_has_disambiguator(bucket, candidate) {
                return Ok(candidate);
            }
            steps += 1;
        }
        Err(EcsError::ArchetypeIdExhausted)
    }

    /// Plant an archetype with a chosen id, bypassing minting
    #[cfg(test)]
    pub(crate) fn insert_raw_for_test(
        &mut self,
        signature: ArchetypeSignature,
        id: ArchetypeId,
    ) -> u32 {
        let index = self.archetypes.len() as u32;
        self.archetypes.push(Archetype::new(signature, id));
        self.by_id.insert(id, index);
        let archetypes = &self.archetypes;
        let list = self.buckets.entry(id.bucket).or_default();
        let pos = list
            .binary_search_by(|&existing| {
                let e = &archetypes[existing as usize];
                (e.id(), e.signature()).cmp(&(id, archetypes[index as usize].signature()))
            })
            .unwrap_or_else(|p| p);
        list.insert(pos, index);
        index
    }
}

impl Default for ArchetypeStore {
    fn default() -> Self {
        Self::new()
    }
}
