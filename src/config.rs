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

//! World configuration and storage policies

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};

/// Order in which an archetype's chunks are probed for free space
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationPolicy {
    /// Probe chunks front to back
    #[default]
    FirstFit,
    /// Probe chunks back to front
    LastFit,
}

/// Row removal algorithm
///
/// `SwapBack` is O(1) and reorders rows; `StableRemove` preserves row order
/// by shifting every trailing row down, O(n - row) per removal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    #[default]
    SwapBack,
    StableRemove,
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationPolicy::FirstFit => write!(f, "FirstFit"),
            AllocationPolicy::LastFit => write!(f, "LastFit"),
        }
    }
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalPolicy::SwapBack => write!(f, "SwapBack"),
            RemovalPolicy::StableRemove => write!(f, "StableRemove"),
        }
    }
}

impl FromStr for AllocationPolicy {
    type Err = EcsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FirstFit" => Ok(AllocationPolicy::FirstFit),
            "LastFit" => Ok(AllocationPolicy::LastFit),
            other => Err(EcsError::UnknownPolicy(other.to_string())),
        }
    }
}

impl FromStr for RemovalPolicy {
    type Err = EcsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SwapBack" => Ok(RemovalPolicy::SwapBack),
            "StableRemove" => Ok(RemovalPolicy::StableRemove),
            other => Err(EcsError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Fixed per-world configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Rows per chunk (>= 1)
    pub chunk_capacity: u32,
    /// Chunk probing order
    pub allocation_policy: AllocationPolicy,
    /// Row removal algorithm
    pub removal_policy: RemovalPolicy,
    /// Enforce strict registration, required sort keys, and no-grow buffers
    pub deterministic: bool,
    /// Simulation rate (>= 1); derives the tick delta
    pub simulation_hz: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: 128,
            allocation_policy: AllocationPolicy::FirstFit,
            removal_policy: RemovalPolicy::SwapBack,
            deterministic: false,
            simulation_hz: 60,
        }
    }
}

impl WorldConfig {
    /// A default configuration with determinism enforcement switched on
    pub fn deterministic() -> Self {
        Self {
            deterministic: true,
            ..Self::default()
        }
    }

    /// Seconds per simulation tick
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.simulation_hz as f32
    }

    /// Reject configurations a world cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_capacity == 0 {
            return Err(EcsError::UnknownPolicy("chunk_capacity = 0".to_string()));
        }
        if self.simulation_hz == 0 {
            return Err(EcsError::UnknownPolicy("simulation_hz = 0".to_string()));
        }
        Ok(())
    }
}
