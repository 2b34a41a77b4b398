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

//! Process-wide buffer pools
//!
//! Hot paths rent scratch vectors instead of allocating: archetype
//! transitions build candidate signatures in a rented id buffer, and ECB
//! playback rents the merged command array and the temp resolution table.
//! Pools hold no domain state; a rental is single-owner for its lifetime and
//! returns its buffer (cleared, capacity kept) on drop.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// A shelf of reusable vectors of `T`
pub struct BufferPool<T: 'static> {
    shelves: Mutex<Vec<Vec<T>>>,
}

impl<T: 'static> BufferPool<T> {
    /// Create an empty pool. `const` so pools can live in statics.
    pub const fn new() -> Self {
        Self {
            shelves: Mutex::new(Vec::new()),
        }
    }

    /// Rent a buffer with at least `capacity` free slots
    pub fn rent(&'static self, capacity: usize) -> PooledVec<T> {
        let mut inner = self.shelves.lock().pop().unwrap_or_default();
        if inner.capacity() < capacity {
            inner.reserve(capacity - inner.capacity());
        }
        PooledVec { inner, home: self }
    }

    fn give_back(&self, mut buf: Vec<T>) {
        buf.clear();
        let mut shelves = self.shelves.lock();
        // Unbounded shelf growth would pin memory; a small shelf is plenty
        // since rentals are short-lived and scoped.
        if shelves.len() < 16 {
            shelves.push(buf);
        }
    }

    /// Number of idle buffers currently shelved
    pub fn idle(&self) -> usize {
        self.shelves.lock().len()
    }
}

/// A rented buffer; derefs to `Vec<T>` and returns home on drop
pub struct PooledVec<T: 'static> {
    inner: Vec<T>,
    home: &'static BufferPool<T>,
}

impl<T: 'static> PooledVec<T> {
    /// Detach the inner vector, consuming the rental
    pub fn into_inner(mut self) -> Vec<T> {
        std::mem::take(&mut self.inner)
    }
}

impl<T: 'static> Deref for PooledVec<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.inner
    }
}

impl<T: 'static> DerefMut for PooledVec<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.inner
    }
}

impl<T: 'static> Drop for PooledVec<T> {
    fn drop(&mut self) {
        self.home.give_back(std::mem::take(&mut self.inner));
    }
}
