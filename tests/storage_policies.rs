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

//! Removal/allocation policy behavior at the storage layer

use lockstep_ecs::{Entity, RemovalPolicy, Result, World, WorldConfig};

#[derive(Clone, Copy, Default, PartialEq, Debug)]
struct Velocity {
    dx: f32,
    dy: f32,
}

fn world_with(removal: RemovalPolicy, chunk_capacity: u32) -> Result<World> {
    let config = WorldConfig {
        chunk_capacity,
        removal_policy: removal,
        ..WorldConfig::default()
    };
    let mut world = World::with_config(config)?;
    world.register_component::<Velocity>()?;
    Ok(world)
}

/// Four entities, each moved into the [Velocity] archetype in order
fn velocity_block(world: &mut World) -> Result<Vec<Entity>> {
    let entities = world.create_entities(4)?;
    for (i, &e) in entities.iter().enumerate() {
        world.add_component(e, Velocity { dx: i as f32, dy: 0.0 })?;
    }
    Ok(entities)
}

#[test]
fn test_swap_back_removal() -> Result<()> {
    let mut world = world_with(RemovalPolicy::SwapBack, 8)?;
    let entities = velocity_block(&mut world)?;
    let velocity_archetype = world.entity_location(entities[0]).unwrap().archetype;

    let version = world.structural_version();
    world.remove_component::<Velocity>(entities[1])?;

    // The last row swapped into the vacated row 1
    let e3 = world.entity_location(entities[3]).unwrap();
    assert_eq!(e3.archetype, velocity_archetype);
    assert_eq!(e3.row, 1);

    // The removed entity landed in the empty archetype at row 0
    let e1 = world.entity_location(entities[1]).unwrap();
    assert_ne!(e1.archetype, velocity_archetype);
    assert!(world
        .archetype_by_id(e1.archetype)?
        .signature()
        .is_empty());
    assert_eq!(e1.row, 0);

    // One logical move: exactly one version bump
    assert_eq!(world.structural_version(), version + 1);

    // Values followed the swap
    assert_eq!(world.get_component::<Velocity>(entities[3])?.dx, 3.0);
    assert_eq!(world.get_component::<Velocity>(entities[0])?.dx, 0.0);
    Ok(())
}

#[test]
fn test_stable_removal() -> Result<()> {
    let mut world = world_with(RemovalPolicy::StableRemove, 8)?;
    let entities = velocity_block(&mut world)?;
    let velocity_archetype = world.entity_location(entities[0]).unwrap().archetype;

    world.remove_component::<Velocity>(entities[1])?;

    // Trailing rows shifted down, preserving order
    let e2 = world.entity_location(entities[2]).unwrap();
    let e3 = world.entity_location(entities[3]).unwrap();
    assert_eq!((e2.archetype, e2.row), (velocity_archetype, 1));
    assert_eq!((e3.archetype, e3.row), (velocity_archetype, 2));
    assert_eq!(world.entity_location(entities[0]).unwrap().row, 0);

    assert_eq!(world.get_component::<Velocity>(entities[2])?.dx, 2.0);
    assert_eq!(world.get_component::<Velocity>(entities[3])?.dx, 3.0);
    Ok(())
}

#[test]
fn test_swap_back_touches_at_most_one_location() -> Result<()> {
    // B4, swap-back side: removing row 0 of N rows relocates one entity
    let mut world = world_with(RemovalPolicy::SwapBack, 8)?;
    let entities = velocity_block(&mut world)?;
    let before: Vec<_> = entities
        .iter()
        .map(|&e| world.entity_location(e).unwrap())
        .collect();

    world.remove_component::<Velocity>(entities[0])?;

    let moved: Vec<usize> = entities
        .iter()
        .enumerate()
        .skip(1)
        .filter(|&(i, &e)| world.entity_location(e).unwrap() != before[i])
        .map(|(i, _)| i)
        .collect();
    assert_eq!(moved, vec![3]);
    Ok(())
}

#[test]
fn test_stable_remove_touches_all_trailing_locations() -> Result<()> {
    // B4, stable side: removing row 0 of N rows relocates the other N-1
    let mut world = world_with(RemovalPolicy::StableRemove, 8)?;
    let entities = velocity_block(&mut world)?;
    let before: Vec<_> = entities
        .iter()
        .map(|&e| world.entity_location(e).unwrap())
        .collect();

    world.remove_component::<Velocity>(entities[0])?;

    let moved = entities
        .iter()
        .enumerate()
        .skip(1)
        .filter(|&(i, &e)| world.entity_location(e).unwrap() != before[i])
        .count();
    assert_eq!(moved, 3);
    Ok(())
}

#[test]
fn test_capacity_boundary_allocates_exactly_two_chunks() -> Result<()> {
    // B1: capacity + 1 entities in the empty archetype
    let capacity = 16;
    let mut world = world_with(RemovalPolicy::SwapBack, capacity)?;
    world.create_entities(capacity as usize + 1)?;
    assert_eq!(world.chunk_count(), 2);
    Ok(())
}

#[test]
fn test_emptied_chunk_is_retained_and_reused() -> Result<()> {
    // B2: removing the only row keeps the chunk at count 0
    let mut world = world_with(RemovalPolicy::SwapBack, 4)?;
    let e = world.create_entity()?;
    world.destroy_entity(e)?;

    let empty = world
        .archetypes_stable()
        .find(|a| a.signature().is_empty())
        .unwrap();
    assert_eq!(empty.chunk_count(), 1);
    assert_eq!(empty.chunk(0).count(), 0);

    // The retained chunk is reused by the next placement
    let e2 = world.create_entity()?;
    let location = world.entity_location(e2).unwrap();
    assert_eq!(location.chunk, 0);
    assert_eq!(location.row, 0);
    assert_eq!(world.chunk_count(), 1);
    Ok(())
}

#[test]
fn test_last_fit_prefers_later_chunks() -> Result<()> {
    let config = WorldConfig {
        chunk_capacity: 2,
        allocation_policy: lockstep_ecs::AllocationPolicy::LastFit,
        ..WorldConfig::default()
    };
    let mut world = World::with_config(config)?;
    let entities = world.create_entities(4)?;
    assert_eq!(world.chunk_count(), 2);

    // Free a slot in each chunk; LastFit places into the later one
    world.destroy_entity(entities[0])?;
    world.destroy_entity(entities[2])?;
    let e = world.create_entity()?;
    assert_eq!(world.entity_location(e).unwrap().chunk, 1);
    Ok(())
}
