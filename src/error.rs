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

//! Error types

use std::fmt;

use crate::archetype::ArchetypeId;
use crate::component::ComponentTypeId;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Strict lookup of a component type that was never registered
    TypeNotRegistered(&'static str),

    /// An archetype references a type id with no registered column factory
    NoColumnFactory(ComponentTypeId),

    /// Lookup of an archetype id that does not exist
    ArchetypeNotFound(ArchetypeId),

    /// Immediate operation on a dead or version-mismatched entity
    StaleEntity,

    /// Accessor on an out-of-range or unlocated entity
    InvalidEntity,

    /// Immediate structural change while an iteration scope is open
    StructuralDuringIteration,

    /// Deterministic mode requires a non-zero sort key for this command
    EcbSortKeyRequired,

    /// A no-grow command buffer or value store is full
    EcbCapacityExceeded,

    /// `add` recorded for a type without a prior value-store warmup
    EcbValueNotWarmed(ComponentTypeId),

    /// Resolving a temp handle that was not created in the same playback
    EcbInvalidTempHandle,

    /// Disambiguator space exhausted for a signature bucket
    ArchetypeIdExhausted,

    /// Defensive default: unrecognized command discriminant
    UnknownCommand(u8),

    /// Defensive default: unrecognized policy name
    UnknownPolicy(String),

    /// Defensive default: element copy across different concrete column types
    ColumnTypeMismatch,

    /// Manifest encode/decode error
    Serialization(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::TypeNotRegistered(name) => {
                write!(f, "Component type not registered: {name}")
            }
            EcsError::NoColumnFactory(type_id) => {
                write!(f, "No column factory for component type id {}", type_id.0)
            }
            EcsError::ArchetypeNotFound(id) => write!(f, "Archetype not found: {id}"),
            EcsError::StaleEntity => write!(f, "Stale entity handle"),
            EcsError::InvalidEntity => write!(f, "Invalid entity"),
            EcsError::StructuralDuringIteration => {
                write!(f, "Structural change while iteration is in progress")
            }
            EcsError::EcbSortKeyRequired => {
                write!(f, "Deterministic mode requires a non-zero sort key")
            }
            EcsError::EcbCapacityExceeded => write!(f, "Command buffer capacity exceeded"),
            EcsError::EcbValueNotWarmed(type_id) => {
                write!(
                    f,
                    "Value store for component type id {} was not warmed up",
                    type_id.0
                )
            }
            EcsError::EcbInvalidTempHandle => write!(f, "Invalid temp entity handle"),
            EcsError::ArchetypeIdExhausted => {
                write!(f, "Archetype id space exhausted for bucket")
            }
            EcsError::UnknownCommand(raw) => write!(f, "Unknown command discriminant: {raw}"),
            EcsError::UnknownPolicy(name) => write!(f, "Unknown policy: {name}"),
            EcsError::ColumnTypeMismatch => {
                write!(f, "Column element copy across mismatched concrete types")
            }
            EcsError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
