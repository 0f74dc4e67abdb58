use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Generation-checked handle into a [`GpuArena`]. A handle whose object
    /// has been destroyed never aliases a newer object in the same pool.
    pub struct GpuHandle;
}

/// Anything the arena tracks knows how to give back its GPU-side memory.
pub trait GpuObject {
    fn release(&mut self);
}

/// Ownership registry for GPU objects.
///
/// Creation goes through `insert`, teardown through `destroy`; the arena is
/// the only place that calls `release`. Destroying through a stale handle is
/// a visible no-op, which makes bulk teardown paths (swapchain recreation,
/// shutdown) safe to run over handle lists that may already be dead.
pub struct GpuArena<T: GpuObject> {
    pool: SlotMap<GpuHandle, T>,
}

impl<T: GpuObject> Default for GpuArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: GpuObject> GpuArena<T> {
    pub fn new() -> Self {
        Self {
            pool: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, object: T) -> GpuHandle {
        self.pool.insert(object)
    }

    #[inline]
    pub fn get(&self, handle: GpuHandle) -> Option<&T> {
        self.pool.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: GpuHandle) -> Option<&mut T> {
        self.pool.get_mut(handle)
    }

    #[inline]
    pub fn is_valid(&self, handle: GpuHandle) -> bool {
        self.pool.contains_key(handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Release and remove. Returns whether the handle was still live.
    pub fn destroy(&mut self, handle: GpuHandle) -> bool {
        match self.pool.remove(handle) {
            Some(mut object) => {
                object.release();
                true
            }
            None => false,
        }
    }

    /// Tear down every remaining object. Used at shutdown after the device
    /// has gone idle.
    pub fn destroy_all(&mut self) {
        for (_, mut object) in self.pool.drain() {
            object.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    struct Tracked {
        releases: Rc<Cell<u32>>,
    }

    impl GpuObject for Tracked {
        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    fn tracked() -> (Tracked, Rc<Cell<u32>>) {
        let releases = Rc::new(Cell::new(0));
        (
            Tracked {
                releases: releases.clone(),
            },
            releases,
        )
    }

    #[test]
    fn destroy_releases_exactly_once() {
        let mut arena = GpuArena::new();
        let (object, releases) = tracked();
        let handle = arena.insert(object);

        assert!(arena.is_valid(handle));
        assert!(arena.destroy(handle));
        assert_eq!(releases.get(), 1);

        // second destroy through the same handle is a no-op
        assert!(!arena.destroy(handle));
        assert_eq!(releases.get(), 1);
        assert!(!arena.is_valid(handle));
    }

    #[test]
    fn stale_handle_never_aliases_a_new_object() {
        let mut arena = GpuArena::new();
        let (first, _) = tracked();
        let old = arena.insert(first);
        arena.destroy(old);

        let (second, _) = tracked();
        let new = arena.insert(second);

        assert_ne!(old, new);
        assert!(arena.get(old).is_none());
        assert!(arena.get(new).is_some());
    }

    #[test]
    fn destroy_all_sweeps_everything() {
        let mut arena = GpuArena::new();
        let (a, releases_a) = tracked();
        let (b, releases_b) = tracked();
        arena.insert(a);
        let handle_b = arena.insert(b);

        arena.destroy_all();
        assert_eq!(releases_a.get(), 1);
        assert_eq!(releases_b.get(), 1);
        assert!(arena.is_empty());
        assert!(!arena.is_valid(handle_b));
    }
}
