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

//! Cross-peer replay determinism
//!
//! The final `(archetype, chunk, row) -> entity` layout after a tick must
//! be a pure function of the initial state and the recorded command set,
//! independent of worker count, worker assignment, and recording order.

use lockstep_ecs::{ArchetypeId, Entity, Result, World, WorldConfig};

#[derive(Clone, Copy, Default, PartialEq, Debug)]
struct A(u32);

#[derive(Clone, Copy, Default, PartialEq, Debug)]
struct B(u32);

/// Full storage layout, walked in canonical enumeration order, with the
/// component payloads rendered to bytes
fn fingerprint(world: &World) -> Vec<(ArchetypeId, u32, u32, Entity, Vec<u8>)> {
    let mut out = Vec::new();
    for archetype in world.archetypes_stable() {
        for chunk in archetype.chunks() {
            for (row, &entity) in chunk.entities().iter().enumerate() {
                let mut bytes = Vec::new();
                if let Ok(a) = world.get_component::<A>(entity) {
                    bytes.extend_from_slice(&a.0.to_le_bytes());
                }
                if let Ok(b) = world.get_component::<B>(entity) {
                    bytes.extend_from_slice(&b.0.to_le_bytes());
                }
                out.push((archetype.id(), chunk.id(), row as u32, entity, bytes));
            }
        }
    }
    out
}

/// A fixed logical command set, every command with a unique sort key
#[derive(Clone, Copy)]
enum Cmd {
    Create { key: i32, with_a: u32 },
    AddA { target: usize, key: i32, value: u32 },
    RemoveB { target: usize, key: i32 },
    Destroy { target: usize, key: i32 },
}

const SCRIPT: &[Cmd] = &[
    Cmd::AddA { target: 2, key: 10, value: 22 },
    Cmd::Create { key: 20, with_a: 91 },
    Cmd::RemoveB { target: 0, key: 30 },
    Cmd::AddA { target: 1, key: 40, value: 11 },
    Cmd::Create { key: 50, with_a: 92 },
    Cmd::Destroy { target: 3, key: 60 },
    Cmd::AddA { target: 0, key: 70, value: 33 },
];

fn build_world() -> Result<(World, Vec<Entity>)> {
    let mut world = World::with_config(WorldConfig::deterministic())?;
    world.register_component::<A>()?;
    world.register_component::<B>()?;
    let entities = world.create_entities(4)?;
    world.add_component(entities[0], B(100))?;
    world.add_component(entities[3], B(101))?;
    world.begin_update();
    Ok((world, entities))
}

/// Run the script through an ECB with `workers` recorders; command `i`
/// lands on the worker `assign(i)` picks, in the order `order` yields
fn run(
    workers: usize,
    assign: impl Fn(usize) -> usize,
    order: impl Iterator<Item = usize>,
) -> Result<Vec<(ArchetypeId, u32, u32, Entity, Vec<u8>)>> {
    let (mut world, entities) = build_world()?;
    let mut ecb = world.create_command_buffer(workers);
    ecb.warmup(16);
    ecb.warmup_values::<A>(16)?;
    ecb.set_system_order(1);

    for i in order {
        let recorder = ecb.recorder(assign(i));
        match SCRIPT[i] {
            Cmd::Create { key, with_a } => {
                // The temp handle is worker-striped, but the realized
                // entity depends only on the create's position in sorted
                // order
                let temp = recorder.create_entity(key)?;
                recorder.add_component(temp, A(with_a), key)?;
            }
            Cmd::AddA { target, key, value } => {
                recorder.add_component(entities[target], A(value), key)?;
            }
            Cmd::RemoveB { target, key } => {
                recorder.remove_component::<B>(entities[target], key)?;
            }
            Cmd::Destroy { target, key } => {
                recorder.destroy_entity(entities[target], key)?;
            }
        }
    }

    ecb.playback(&mut world)?;
    world.end_update();
    Ok(fingerprint(&world))
}

#[test]
fn test_layout_is_independent_of_worker_count() -> Result<()> {
    let single = run(1, |_| 0, 0..SCRIPT.len())?;
    let duo = run(2, |i| i % 2, 0..SCRIPT.len())?;
    let trio = run(3, |i| i % 3, 0..SCRIPT.len())?;
    assert_eq!(single, duo);
    assert_eq!(single, trio);
    Ok(())
}

#[test]
fn test_layout_is_independent_of_recording_order() -> Result<()> {
    let forward = run(2, |i| i % 2, 0..SCRIPT.len())?;
    let backward = run(2, |i| i % 2, (0..SCRIPT.len()).rev())?;
    let shuffled_assignment = run(2, |i| (i * 3 + 1) % 2, 0..SCRIPT.len())?;
    assert_eq!(forward, backward);
    assert_eq!(forward, shuffled_assignment);
    Ok(())
}

#[test]
fn test_two_peer_replay_is_byte_identical() -> Result<()> {
    // Two "processes" with identical manifests record the same commands;
    // the enumerated (archetype, row, bytes) sequences must match exactly
    let (peer_a, _) = build_world()?;
    let (peer_b, _) = build_world()?;
    assert_eq!(peer_a.manifest_bytes()?, peer_b.manifest_bytes()?);
    assert_eq!(peer_a.manifest_hash(), peer_b.manifest_hash());
    drop(peer_a);
    drop(peer_b);

    let replay_a = run(2, |i| i % 2, 0..SCRIPT.len())?;
    let replay_b = run(4, |i| (i + 1) % 4, (0..SCRIPT.len()).rev())?;
    assert_eq!(replay_a, replay_b);
    Ok(())
}

#[test]
fn test_enumeration_is_stable_across_creation_orders() -> Result<()> {
    // P4 at the world level: archetypes created in different orders
    // enumerate identically
    let build = |flip: bool| -> Result<Vec<ArchetypeId>> {
        let mut world = World::new()?;
        world.register_component::<A>()?;
        world.register_component::<B>()?;
        let e1 = world.create_entity()?;
        let e2 = world.create_entity()?;
        if flip {
            world.add_component(e1, A(1))?;
            world.add_component(e2, B(2))?;
        } else {
            world.add_component(e2, B(2))?;
            world.add_component(e1, A(1))?;
        }
        Ok(world.archetypes_stable().map(|a| a.id()).collect())
    };
    assert_eq!(build(false)?, build(true)?);
    Ok(())
}
