// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Coherence annotations and the line guards built on them.
//!
//! The same [cache model](crate::cache) serves two roles per tile. The
//! private L1 annotates lines with their MSI status plus the directory
//! home; the shared L2 slice annotates lines with the directory view of
//! who holds them. Each role installs its own [`LineGuard`].

use std::collections::BTreeSet;

use crate::cache::{CacheLine, CacheRequest, CacheRequestKind, LineGuard};

/// MSI status of a privately cached line. An absent line is invalid.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CacheStatus {
    /// Reserved, fill in flight.
    #[default]
    Pending,
    Shared,
    Modified,
    /// Present but unusable. Lines are normally removed outright when
    /// invalidated; this state only appears transiently.
    Invalid,
}

/// Cache-side annotation: status plus the node owning the directory entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheAnnotation {
    pub status: CacheStatus,
    pub home: u32,
}

/// Directory view of a line's holders.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DirStatus {
    /// Zero or more nodes hold a readable copy.
    #[default]
    Readers,
    /// Exactly one node holds the writable copy.
    Writer,
}

/// Directory-side annotation: status plus the sharer node-id set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirAnnotation {
    pub status: DirStatus,
    pub sharers: BTreeSet<u32>,
}

/// Hit/eviction rules for the private L1.
pub struct CacheSideGuard;

impl LineGuard<CacheAnnotation> for CacheSideGuard {
    fn is_hit(&self, req: &CacheRequest<CacheAnnotation>, line: &CacheLine<CacheAnnotation>) -> bool {
        if !line.ready {
            return false;
        }
        match req.kind() {
            CacheRequestKind::Read => matches!(
                line.annotation.status,
                CacheStatus::Shared | CacheStatus::Modified
            ),
            // A write needs exclusive ownership; writing a SHARED line is a
            // coherence miss that the engine resolves with a self-invalidate
            // and an exclusive request.
            CacheRequestKind::Write => line.annotation.status == CacheStatus::Modified,
            _ => true,
        }
    }

    fn can_evict(&self, line: &CacheLine<CacheAnnotation>) -> bool {
        line.ready && line.annotation.status != CacheStatus::Pending
    }
}

/// Hit/eviction rules for the directory (L2) slice.
pub struct DirSideGuard;

impl LineGuard<DirAnnotation> for DirSideGuard {
    fn is_hit(&self, _req: &CacheRequest<DirAnnotation>, line: &CacheLine<DirAnnotation>) -> bool {
        line.ready
    }

    fn can_evict(&self, line: &CacheLine<DirAnnotation>) -> bool {
        line.ready
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use tessera_track::entity::toplevel;
    use tessera_track::tracker::dev_null_tracker;

    use super::*;
    use crate::cache::{Cache, CacheConfig, CacheRequestStatus};

    fn cache_side() -> Cache<CacheAnnotation> {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "test");
        let cfg = CacheConfig {
            words_per_line: 4,
            num_lines: 4,
            associativity: 2,
            ..CacheConfig::default()
        };
        Cache::new(&top, "l1", cfg, Box::new(CacheSideGuard)).unwrap()
    }

    fn settle(cache: &mut Cache<CacheAnnotation>, req: &Rc<CacheRequest<CacheAnnotation>>) {
        cache.request(req.clone());
        while req.status() == CacheRequestStatus::Wait {
            cache.tick_positive_edge();
            cache.tick_negative_edge();
        }
    }

    #[test]
    fn write_misses_shared_line() {
        let mut cache = cache_side();

        let fill = Rc::new(CacheRequest::new_read(0x40, 1).allocating());
        settle(&mut cache, &fill);
        let feed = Rc::new(CacheRequest::new_update(
            0x40,
            Some(vec![0; 4]),
            Some(CacheAnnotation {
                status: CacheStatus::Shared,
                home: 2,
            }),
            None,
        ));
        settle(&mut cache, &feed);

        let read = Rc::new(CacheRequest::new_read(0x40, 1));
        settle(&mut cache, &read);
        assert_eq!(read.status(), CacheRequestStatus::Hit);

        let write = Rc::new(CacheRequest::new_write(0x40, vec![1]));
        settle(&mut cache, &write);
        assert_eq!(write.status(), CacheRequestStatus::Miss);
        // The shared line is reported so the engine can find its home.
        let line = write.line_copy().clone().unwrap();
        assert_eq!(line.annotation.status, CacheStatus::Shared);
        assert_eq!(line.annotation.home, 2);
    }

    #[test]
    fn pending_lines_are_not_victims() {
        let mut cache = cache_side();

        // Reserve both ways of the set; neither fill arrives.
        let fill = Rc::new(CacheRequest::new_read(0x00, 1).allocating());
        settle(&mut cache, &fill);
        let pending = Rc::new(CacheRequest::new_read(0x20, 1).allocating());
        settle(&mut cache, &pending);

        // A third line has no free way and no evictable victim.
        let stuck = Rc::new(CacheRequest::new_read(0x40, 1).allocating());
        settle(&mut cache, &stuck);
        assert_eq!(stuck.status(), CacheRequestStatus::Miss);
        assert!(stuck.line_copy().is_none());
        assert!(stuck.victim_copy().is_none());
    }
}
