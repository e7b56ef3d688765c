// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Multi-tile protocol scenarios over the full interconnect.

use std::rc::Rc;

use tessera_engine::test_helpers::start_test;
use tessera_engine::time::clock::Clock;
use tessera_engine::types::SimResult;
use tessera_models::cache::CacheConfig;
use tessera_models::coherence::annotations::{CacheStatus, DirStatus};
use tessera_models::coherence::CoherenceConfig;
use tessera_models::core_model::{CoreConfig, CoreModel};
use tessera_models::memory_request::{MemoryRequest, MemoryRequestStatus};
use tessera_models::test_helpers::{build_system, SystemConfig};
use tessera_models::tile::Tile;

// 32-byte lines with the default words_per_line of 8, so line N starts at
// N * 0x20 and is homed on node N % num_tiles.
const LINE: u64 = 0x20;

/// Submit a request and poll it to completion, resubmitting on RETRY.
async fn complete(clock: &Clock, tile: &Rc<Tile>, req: &Rc<MemoryRequest>) -> SimResult {
    tile.request(req.clone());
    loop {
        match req.status() {
            MemoryRequestStatus::Done => return Ok(()),
            MemoryRequestStatus::Retry => {
                req.resubmit();
                tile.request(req.clone());
            }
            _ => {}
        }
        clock.wait_ticks(1).await;
    }
}

#[test]
fn two_readers_share_a_line() {
    let mut engine = start_test(file!());
    let tiles = build_system(
        &mut engine,
        &SystemConfig {
            num_tiles: 2,
            ..SystemConfig::default()
        },
    );
    let clock = engine.default_clock();

    // Line 1 is homed on tile 1; tile 0 reads it remotely.
    let addr = LINE;
    let ra = Rc::new(MemoryRequest::new_read(addr, 1));
    let rb = Rc::new(MemoryRequest::new_read(addr, 1));
    {
        let (t0, t1) = (tiles[0].clone(), tiles[1].clone());
        let (ra, rb) = (ra.clone(), rb.clone());
        let clock = clock.clone();
        engine.spawn(async move {
            complete(&clock, &t0, &ra).await?;
            complete(&clock, &t1, &rb).await?;
            clock.wait_ticks(100).await;
            Ok(())
        });
    }
    engine.run().unwrap();

    assert_eq!(*ra.data(), vec![0]);
    assert_eq!(*rb.data(), vec![0]);
    let dir = tiles[1]
        .with_engine(|e| e.directory_line(addr))
        .expect("directory line must exist on the home node");
    assert_eq!(dir.annotation.status, DirStatus::Readers);
    assert!(dir.annotation.sharers.contains(&0));
    assert!(dir.annotation.sharers.contains(&1));
    for tile in &tiles {
        assert!(tile.quiescent());
    }
}

#[test]
fn exclusive_write_invalidates_readers() {
    let mut engine = start_test(file!());
    let tiles = build_system(
        &mut engine,
        &SystemConfig {
            num_tiles: 2,
            ..SystemConfig::default()
        },
    );
    let clock = engine.default_clock();

    let addr = LINE;
    let ra = Rc::new(MemoryRequest::new_read(addr, 1));
    let rb = Rc::new(MemoryRequest::new_read(addr, 1));
    let write = Rc::new(MemoryRequest::new_write(addr, vec![0xbeef]));
    {
        let (t0, t1) = (tiles[0].clone(), tiles[1].clone());
        let (ra, rb, write) = (ra.clone(), rb.clone(), write.clone());
        let clock = clock.clone();
        engine.spawn(async move {
            // Establish two readers, then upgrade one of them.
            complete(&clock, &t0, &ra).await?;
            complete(&clock, &t1, &rb).await?;
            complete(&clock, &t0, &write).await?;
            clock.wait_ticks(100).await;
            Ok(())
        });
    }
    engine.run().unwrap();

    let writer_line = tiles[0]
        .with_engine(|e| e.l1_line(addr))
        .expect("the writer must hold the line");
    assert_eq!(writer_line.annotation.status, CacheStatus::Modified);
    assert!(writer_line.dirty);
    // The other reader's copy was invalidated.
    assert!(tiles[1].with_engine(|e| e.l1_line(addr)).is_none());

    let dir = tiles[1]
        .with_engine(|e| e.directory_line(addr))
        .expect("directory line must exist on the home node");
    assert_eq!(dir.annotation.status, DirStatus::Writer);
    assert_eq!(dir.annotation.sharers.iter().copied().collect::<Vec<_>>(), vec![0]);
}

#[test]
fn written_data_is_visible_across_nodes() {
    let mut engine = start_test(file!());
    let tiles = build_system(
        &mut engine,
        &SystemConfig {
            num_tiles: 2,
            ..SystemConfig::default()
        },
    );
    let clock = engine.default_clock();

    let addr = LINE + 4;
    let write = Rc::new(MemoryRequest::new_write(addr, vec![0xabc]));
    let read = Rc::new(MemoryRequest::new_read(addr, 1));
    {
        let (t0, t1) = (tiles[0].clone(), tiles[1].clone());
        let (write, read) = (write.clone(), read.clone());
        let clock = clock.clone();
        engine.spawn(async move {
            complete(&clock, &t0, &write).await?;
            complete(&clock, &t1, &read).await?;
            clock.wait_ticks(100).await;
            Ok(())
        });
    }
    engine.run().unwrap();

    // The home orders the writer to hand the dirty line over.
    assert_eq!(*read.data(), vec![0xabc]);
    let total_sent: u64 = tiles
        .iter()
        .map(|t| t.metrics().msgs_sent.iter().sum::<u64>())
        .sum();
    assert!(total_sent > 0);
    assert!(tiles.iter().map(|t| t.metrics().flits_sent).sum::<u64>() > 0);
}

#[test]
fn dirty_eviction_preserves_data() {
    let mut engine = start_test(file!());
    // A direct-mapped two-line L1 so a second write evicts the first.
    let tiles = build_system(
        &mut engine,
        &SystemConfig {
            num_tiles: 1,
            engine: CoherenceConfig {
                l1: CacheConfig {
                    words_per_line: 8,
                    num_lines: 2,
                    associativity: 1,
                    ..CacheConfig::default()
                },
                ..CoherenceConfig::default()
            },
            ..SystemConfig::default()
        },
    );
    let clock = engine.default_clock();

    // Both map to L1 set 0 (two sets, 32-byte lines).
    let a = 0x00;
    let b = 2 * LINE;
    let wa = Rc::new(MemoryRequest::new_write(a, vec![5]));
    let wb = Rc::new(MemoryRequest::new_write(b, vec![6]));
    let read_back = Rc::new(MemoryRequest::new_read(a, 1));
    {
        let tile = tiles[0].clone();
        let (wa, wb, read_back) = (wa.clone(), wb.clone(), read_back.clone());
        let clock = clock.clone();
        engine.spawn(async move {
            complete(&clock, &tile, &wa).await?;
            complete(&clock, &tile, &wb).await?;
            complete(&clock, &tile, &read_back).await?;
            clock.wait_ticks(100).await;
            Ok(())
        });
    }
    engine.run().unwrap();

    // The dirty victim was flushed home and served back from there.
    assert_eq!(*read_back.data(), vec![5]);
    assert!(tiles[0].quiescent());
}

#[test]
fn directory_eviction_flushes_remote_writer() {
    let mut engine = start_test(file!());
    // A one-line directory on each home, so a second line homed on the
    // same node evicts the first while a remote tile still owns it dirty.
    let tiles = build_system(
        &mut engine,
        &SystemConfig {
            num_tiles: 2,
            engine: CoherenceConfig {
                l2: CacheConfig {
                    words_per_line: 8,
                    num_lines: 1,
                    associativity: 1,
                    ..CacheConfig::default()
                },
                ..CoherenceConfig::default()
            },
            ..SystemConfig::default()
        },
    );
    let clock = engine.default_clock();

    // Lines 1 and 3 are both homed on tile 1 and collide in its L2.
    let dirty_addr = LINE;
    let evictor_addr = 3 * LINE;
    let write = Rc::new(MemoryRequest::new_write(dirty_addr, vec![0x77]));
    let evictor = Rc::new(MemoryRequest::new_read(evictor_addr, 1));
    let read_back = Rc::new(MemoryRequest::new_read(dirty_addr, 1));
    {
        let (t0, t1) = (tiles[0].clone(), tiles[1].clone());
        let (write, evictor, read_back) = (write.clone(), evictor.clone(), read_back.clone());
        let clock = clock.clone();
        engine.spawn(async move {
            complete(&clock, &t0, &write).await?;
            complete(&clock, &t0, &evictor).await?;
            // Let the eviction's flush round and writeback finish.
            clock.wait_ticks(100).await;
            complete(&clock, &t1, &read_back).await?;
            clock.wait_ticks(100).await;
            Ok(())
        });
    }
    engine.run().unwrap();

    // The home pulled the dirty line back before dropping the directory
    // entry, so the data survives and the writer's copy is gone.
    assert_eq!(*read_back.data(), vec![0x77]);
    assert!(tiles[0].with_engine(|e| e.l1_line(dirty_addr)).is_none());
    for tile in &tiles {
        assert!(tile.quiescent());
    }
}

#[test]
fn cores_drain_their_quota() {
    let mut engine = start_test(file!());
    let tiles = build_system(&mut engine, &SystemConfig::default());
    let clock = engine.default_clock();

    // Every core hammers the same eight lines to force sharing, upgrades
    // and invalidations between all four tiles.
    let mut cores = Vec::new();
    for (i, tile) in tiles.iter().enumerate() {
        let cfg = CoreConfig {
            num_requests: 40,
            max_outstanding: 2,
            base: 0,
            num_lines: 8,
            words_per_line: 8,
            write_percent: 40,
            drain_ticks: 300,
            seed: 0xc0de + i as u64,
        };
        let top = engine.top().clone();
        cores.push(CoreModel::new_and_register(
            &engine,
            &top,
            &format!("core{i}"),
            clock.clone(),
            tile.clone(),
            cfg,
        ));
    }
    engine.run().unwrap();

    for core in &cores {
        let stats = core.stats();
        assert_eq!(stats.issued, 40);
        assert_eq!(stats.completed, 40);
    }
    for tile in &tiles {
        assert!(tile.quiescent());
        let metrics = tile.metrics();
        assert_eq!(metrics.served(), 40);
    }
}
