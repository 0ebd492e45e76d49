//! Node arena and the allocator capability backing it.
//!
//! Nodes live in a single slot vector and refer to each other by
//! [`NodeRef`] index, so parent back-links carry no ownership. Vacant
//! slots are chained into a free list and reused before the vector grows.
//! Every slot carries a generation, bumped when its node is destroyed, so a
//! handle to a destroyed node never reads the slot's next occupant.

use log::{debug, trace};

use std::{
    fmt, mem,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crate::error::{Error, Result};

const MIN_SLOTS: usize = 16;

/// Allocator capability, consulted before any backing storage grows
/// and told when it shrinks. Storage itself comes from the global heap
/// and is reserved fallibly, so either refusal surfaces as
/// [`Error::OutOfMemory`].
pub trait Allocator: Clone {
    /// Request `bytes` more of backing storage.
    fn grow(&self, bytes: usize) -> Result<()>;

    /// Give back `bytes` previously granted by [`Allocator::grow`].
    fn release(&self, bytes: usize);
}

/// Unbounded allocator, limited only by the host.
#[derive(Clone, Copy, Default, Debug)]
pub struct Heap;

impl Allocator for Heap {
    #[inline]
    fn grow(&self, _bytes: usize) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn release(&self, _bytes: usize) {}
}

/// Allocator with a fixed byte budget. Clones share the same budget, so
/// one instance can back several containers and cursors.
#[derive(Clone, Debug)]
pub struct Bounded {
    limit: usize,
    used: Arc<AtomicUsize>,
}

impl Bounded {
    pub fn new(limit: usize) -> Bounded {
        Bounded {
            limit,
            used: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Return bytes currently granted out of this budget.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }
}

impl Allocator for Bounded {
    fn grow(&self, bytes: usize) -> Result<()> {
        let res = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                match used.checked_add(bytes) {
                    Some(n) if n <= self.limit => Some(n),
                    _ => None,
                }
            });
        match res {
            Ok(_) => Ok(()),
            Err(used) => {
                let msg = format!("{} bytes over budget {}/{}", bytes, used, self.limit);
                Err(Error::OutOfMemory(msg))
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Grow capacity of `items` by `additional` slots, accounted against
/// `allocator`. Return the number of bytes granted.
pub(crate) fn try_grow<T, A>(
    allocator: &A,
    items: &mut Vec<T>,
    additional: usize,
    what: &str,
) -> Result<usize>
where
    A: Allocator,
{
    let bytes = additional * mem::size_of::<T>();
    allocator.grow(bytes)?;
    let spare = items.capacity() - items.len();
    match items.try_reserve_exact(spare + additional) {
        Ok(()) => Ok(bytes),
        Err(err) => {
            allocator.release(bytes);
            Err(Error::OutOfMemory(format!("{}: {}", what, err)))
        }
    }
}

/// Stable handle to a node cell in [`Arena`]. Valid until the node is
/// destroyed, after which lookups through it find nothing, even once the
/// slot is handed out again.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    index: u32,
    gen: u32,
}

impl NodeRef {
    #[inline]
    fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.gen)
    }
}

// generation is the first component of either variant.
enum Slot<N> {
    Occupied(u32, N),
    Vacant(u32, Option<NodeRef>), // next vacant slot
}

/// Bulk allocator for node cells of type `N`.
pub struct Arena<N, A>
where
    A: Allocator,
{
    slots: Vec<Slot<N>>,
    free: Option<NodeRef>,
    n_live: usize,
    granted: usize, // bytes granted by allocator
    allocator: A,
}

impl<N, A> Arena<N, A>
where
    A: Allocator,
{
    pub fn new(allocator: A) -> Arena<N, A> {
        Arena {
            slots: Vec::new(),
            free: None,
            n_live: 0,
            granted: 0,
            allocator,
        }
    }

    /// Return number of live nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.n_live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_live == 0
    }

    /// Return the size of a single node cell, including slot overhead.
    #[inline]
    pub fn cell_size(&self) -> usize {
        mem::size_of::<Slot<N>>()
    }

    /// Store `node` in a fresh cell, reusing a vacant slot if any.
    pub fn allocate(&mut self, node: N) -> Result<NodeRef> {
        if let Some(nref) = self.free {
            let slot = &mut self.slots[nref.index()];
            let (gen, next) = match slot {
                Slot::Vacant(gen, next) => (*gen, *next),
                Slot::Occupied(..) => panic!("allocate(): free list corrupt {:?}", nref),
            };
            self.free = next;
            *slot = Slot::Occupied(gen, node);
            self.n_live += 1;
            return Ok(NodeRef {
                index: nref.index,
                gen,
            });
        }

        if self.slots.len() == self.slots.capacity() {
            let additional = self.slots.capacity().max(MIN_SLOTS);
            if self.slots.len() + additional > (u32::MAX as usize) {
                let msg = format!("arena full at {} cells", self.slots.len());
                return Err(Error::OutOfMemory(msg));
            }
            let bytes = try_grow(&self.allocator, &mut self.slots, additional, "arena")?;
            self.granted += bytes;
            trace!(
                target: "arena",
                "grow by {} cells to {}, {} bytes granted",
                additional,
                self.slots.capacity(),
                self.granted
            );
        }

        let nref = NodeRef {
            index: self.slots.len() as u32,
            gen: 0,
        };
        self.slots.push(Slot::Occupied(0, node));
        self.n_live += 1;
        Ok(nref)
    }

    /// Return the cell to the pool and hand back its content.
    pub fn destroy(&mut self, nref: NodeRef) -> N {
        let slot = &mut self.slots[nref.index()];
        match slot {
            Slot::Occupied(gen, _) if *gen == nref.gen => (),
            _ => panic!("destroy(): double free {:?}, call the programmer", nref),
        }
        let vacant = Slot::Vacant(nref.gen.wrapping_add(1), self.free);
        match mem::replace(slot, vacant) {
            Slot::Occupied(_, node) => {
                self.free = Some(nref);
                self.n_live -= 1;
                node
            }
            Slot::Vacant(..) => unreachable!(),
        }
    }

    /// Return the node at `nref`, None if the node was destroyed or
    /// never allocated.
    #[inline]
    pub fn try_get(&self, nref: NodeRef) -> Option<&N> {
        match self.slots.get(nref.index()) {
            Some(Slot::Occupied(gen, node)) if *gen == nref.gen => Some(node),
            _ => None,
        }
    }

    #[inline]
    pub fn get(&self, nref: NodeRef) -> &N {
        match &self.slots[nref.index()] {
            Slot::Occupied(gen, node) if *gen == nref.gen => node,
            _ => panic!("get(): stale node {:?}, call the programmer", nref),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, nref: NodeRef) -> &mut N {
        match &mut self.slots[nref.index()] {
            Slot::Occupied(gen, node) if *gen == nref.gen => node,
            _ => panic!("get_mut(): stale node {:?}, call the programmer", nref),
        }
    }

    /// Release every cell in one go. Outstanding [`NodeRef`]s become
    /// invalid.
    pub fn clear(&mut self) {
        let (n, cap) = (self.n_live, self.slots.capacity());
        self.slots = Vec::new();
        self.free = None;
        self.n_live = 0;
        self.allocator.release(self.granted);
        debug!(
            target: "arena",
            "released {} live nodes, {} cells, {} bytes", n, cap, self.granted
        );
        self.granted = 0;
    }
}

impl<N, A> Drop for Arena<N, A>
where
    A: Allocator,
{
    fn drop(&mut self) {
        if self.granted > 0 {
            self.allocator.release(self.granted);
        }
    }
}
