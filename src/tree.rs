use log::debug;
use rand::Rng;

use std::{cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomData};

use crate::{
    arena::{Allocator, Arena, Heap, NodeRef},
    cursor::Cursor,
    depth::Depth,
    error::{Error, Result},
    lock::{NoLock, RawLock, ReadGuard, WriteGuard},
    rb::RedBlack,
};

/// Three-way comparator supplied by the caller. Any
/// `Fn(&T, &T) -> Ordering` qualifies.
pub trait Compare<T: ?Sized> {
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

/// Compare using the type's own [`Ord`] implementation.
#[derive(Clone, Copy, Default, Debug)]
pub struct Natural;

impl<T> Compare<T> for Natural
where
    T: Ord + ?Sized,
{
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

impl<T, F> Compare<T> for F
where
    T: ?Sized,
    F: Fn(&T, &T) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

/// Lift a key comparator to (key, value) entries, value is ignored.
#[derive(Clone, Copy, Default, Debug)]
pub struct ByKey<C>(pub(crate) C);

impl<K, V, C> Compare<(K, V)> for ByKey<C>
where
    C: Compare<K>,
{
    #[inline]
    fn compare(&self, a: &(K, V), b: &(K, V)) -> Ordering {
        self.0.compare(&a.0, &b.0)
    }
}

/// Balancing strategy plugged into [`Tree`]. Implemented by
/// [`RedBlack`] and [`crate::Avl`].
pub trait Strategy: 'static {
    /// Per node book-keeping, color and parent link or subtree height.
    type Meta: Send + Sync;

    /// Human readable name, used in logs.
    const NAME: &'static str;

    /// Insert `value`, overwriting an equal value in place.
    fn insert<T, A, F>(core: &mut Core<T, Self::Meta, A>, value: T, cmp: &F) -> Result<()>
    where
        A: Allocator,
        F: Fn(&T, &T) -> Ordering;

    /// Remove the value for which `seek` returns Equal. `seek` orders
    /// the target relative to the value passed in.
    fn remove<T, A, F>(core: &mut Core<T, Self::Meta, A>, seek: &F) -> Option<T>
    where
        A: Allocator,
        F: Fn(&T) -> Ordering;

    /// Check strategy specific invariants, record black-height or tree
    /// height into `stats`.
    fn validate<T, A>(core: &Core<T, Self::Meta, A>, stats: &mut Stats) -> Result<()>
    where
        A: Allocator;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Side {
    Left,
    Right,
}

impl Side {
    #[inline]
    pub(crate) fn flip(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Node corresponds to a single entry in the tree.
pub struct Node<T, M> {
    pub(crate) value: T,
    pub(crate) left: Option<NodeRef>,
    pub(crate) right: Option<NodeRef>,
    pub(crate) meta: M,
}

impl<T, M> Node<T, M> {
    pub(crate) fn new(value: T, meta: M) -> Node<T, M> {
        Node {
            value,
            left: None,
            right: None,
            meta,
        }
    }
}

/// Root slot and node arena, the part of a [`Tree`] guarded by its lock.
pub struct Core<T, M, A>
where
    A: Allocator,
{
    pub(crate) arena: Arena<Node<T, M>, A>,
    pub(crate) root: Option<NodeRef>,
}

impl<T, M, A> Core<T, M, A>
where
    A: Allocator,
{
    fn new(allocator: A) -> Core<T, M, A> {
        Core {
            arena: Arena::new(allocator),
            root: None,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    pub(crate) fn node(&self, n: NodeRef) -> &Node<T, M> {
        self.arena.get(n)
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, n: NodeRef) -> &mut Node<T, M> {
        self.arena.get_mut(n)
    }

    #[inline]
    pub(crate) fn left(&self, n: NodeRef) -> Option<NodeRef> {
        self.node(n).left
    }

    #[inline]
    pub(crate) fn right(&self, n: NodeRef) -> Option<NodeRef> {
        self.node(n).right
    }

    #[inline]
    pub(crate) fn child(&self, n: NodeRef, side: Side) -> Option<NodeRef> {
        match side {
            Side::Left => self.left(n),
            Side::Right => self.right(n),
        }
    }

    #[inline]
    pub(crate) fn set_child(&mut self, n: NodeRef, side: Side, child: Option<NodeRef>) {
        let node = self.node_mut(n);
        match side {
            Side::Left => node.left = child,
            Side::Right => node.right = child,
        }
    }

    pub(crate) fn find_by<F>(&self, seek: &F) -> Option<NodeRef>
    where
        F: Fn(&T) -> Ordering,
    {
        let mut cur = self.root;
        while let Some(n) = cur {
            let node = self.node(n);
            cur = match seek(&node.value) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(n),
            };
        }
        None
    }

    /// Follow `side` links from `n` till the end, leftmost node for
    /// Side::Left.
    pub(crate) fn outermost(&self, mut n: NodeRef, side: Side) -> NodeRef {
        while let Some(next) = self.child(n, side) {
            n = next;
        }
        n
    }

    /// In-order walk, ascending by comparator.
    pub(crate) fn walk<F>(&self, n: Option<NodeRef>, f: &mut F)
    where
        F: FnMut(&T),
    {
        if let Some(n) = n {
            let node = self.node(n);
            self.walk(node.left, f);
            f(&node.value);
            self.walk(node.right, f);
        }
    }

    // Every value under `n` must fall strictly between `low` and `high`.
    // Return the number of nodes under `n`.
    fn validate_order<F>(
        &self,
        n: Option<NodeRef>,
        (low, high): (Option<&T>, Option<&T>),
        depth: usize,
        cmp: &F,
        depths: &mut Depth,
    ) -> Result<usize>
    where
        F: Fn(&T, &T) -> Ordering,
    {
        let node = match n {
            Some(n) => self.node(n),
            None => {
                depths.sample(depth);
                return Ok(0);
            }
        };
        let value = &node.value;
        if let Some(low) = low {
            if cmp(low, value) != Ordering::Less {
                let msg = format!("{:?} not above its lower bound at depth {}", n, depth);
                return Err(Error::SortError(msg));
            }
        }
        if let Some(high) = high {
            if cmp(value, high) != Ordering::Less {
                let msg = format!("{:?} not below its upper bound at depth {}", n, depth);
                return Err(Error::SortError(msg));
            }
        }
        let l = self.validate_order(node.left, (low, Some(value)), depth + 1, cmp, depths)?;
        let r = self.validate_order(node.right, (Some(value), high), depth + 1, cmp, depths)?;
        Ok(l + r + 1)
    }
}

/// Tree manage a single instance of in-memory ordered index, balanced
/// either as [red-black][rb] or [AVL][avl] tree, guarded by a
/// shared/exclusive lock.
///
/// Reads acquire shared access, writes acquire exclusive access. With
/// [`NoLock`] the instance is not `Sync`, and a write while a cursor, walk
/// or entry handle is alive panics.
///
/// [rb]: https://en.wikipedia.org/wiki/Red%E2%80%93black_tree
/// [avl]: https://en.wikipedia.org/wiki/AVL_tree
pub struct Tree<T, C = Natural, S = RedBlack, L = NoLock, A = Heap>
where
    S: Strategy,
    A: Allocator,
{
    name: String,
    cmp: C,
    lock: L,
    core: UnsafeCell<Core<T, S::Meta, A>>,
    _strategy: PhantomData<fn() -> S>,
}

// SAFETY: all access to `core` goes through `lock`, which is Sync only
// for lock strategies that provide mutual exclusion.
unsafe impl<T, C, S, L, A> Sync for Tree<T, C, S, L, A>
where
    T: Send + Sync,
    C: Sync,
    S: Strategy,
    L: RawLock + Sync,
    A: Allocator + Send + Sync,
{
}

/// Different ways to construct a new Tree instance.
impl<T, C, S, L, A> Tree<T, C, S, L, A>
where
    C: Compare<T>,
    S: Strategy,
    L: RawLock,
    A: Allocator,
{
    /// Create an empty instance identified by `name`, with default
    /// allocator and comparator.
    pub fn new<N>(name: N) -> Tree<T, C, S, L, A>
    where
        N: AsRef<str>,
        C: Default,
        A: Default,
    {
        Tree::with_compare(name, A::default(), C::default())
    }

    /// Create an empty instance whose nodes are accounted against
    /// `allocator`.
    pub fn init<N>(name: N, allocator: A) -> Tree<T, C, S, L, A>
    where
        N: AsRef<str>,
        C: Default,
    {
        Tree::with_compare(name, allocator, C::default())
    }

    /// Create an empty instance ordered by `cmp`.
    pub fn with_compare<N>(name: N, allocator: A, cmp: C) -> Tree<T, C, S, L, A>
    where
        N: AsRef<str>,
    {
        Tree {
            name: name.as_ref().to_string(),
            cmp,
            lock: L::default(),
            core: UnsafeCell::new(Core::new(allocator)),
            _strategy: PhantomData,
        }
    }

    /// Release every node in one go. Consuming the instance guarantees
    /// no cursor is still holding its lock.
    pub fn deinit(self) {
        let mut core = self.core.into_inner();
        debug!(
            target: "tree",
            "{}: deinit {} tree with {} entries", self.name, S::NAME, core.len()
        );
        core.root = None;
        core.arena.clear();
    }
}

/// Maintenance API.
impl<T, C, S, L, A> Tree<T, C, S, L, A>
where
    C: Compare<T>,
    S: Strategy,
    L: RawLock,
    A: Allocator,
{
    /// Identify this instance. Applications can choose unique names while
    /// creating Tree instances.
    #[inline]
    pub fn id(&self) -> String {
        self.name.clone()
    }

    /// Return number of entries in this instance.
    pub fn len(&self) -> usize {
        self.read_with(|core| core.len())
    }

    /// Check whether this index is empty.
    pub fn is_empty(&self) -> bool {
        self.read_with(|core| core.arena.is_empty())
    }

    /// Return quickly with basic statisics, only entries() and
    /// node_size() are valid with this statisics.
    pub fn stats(&self) -> Stats {
        self.read_with(|core| Stats::new(core.len(), core.arena.cell_size()))
    }

    /// Validate the tree with following rules:
    ///
    /// * Every left descendant sorts before its ancestor, every right
    ///   descendant after it.
    /// * Number of reachable nodes match number of entries.
    /// * Strategy rules, refer to [`RedBlack`] and [`crate::Avl`].
    ///
    /// Additionally return full statistics on the tree.
    pub fn validate(&self) -> Result<Stats> {
        let cmp = |a: &T, b: &T| self.cmp.compare(a, b);
        self.read_with(|core| {
            let mut stats = Stats::new(core.len(), core.arena.cell_size());
            let mut depths = Depth::new();
            let n = core.validate_order(core.root, (None, None), 0, &cmp, &mut depths)?;
            if n != core.len() {
                return Err(Error::CountMismatch(n, core.len()));
            }
            S::validate(core, &mut stats)?;
            stats.set_depths(depths);
            Ok(stats)
        })
    }
}

/// Write operations on Tree instance.
impl<T, C, S, L, A> Tree<T, C, S, L, A>
where
    C: Compare<T>,
    S: Strategy,
    L: RawLock,
    A: Allocator,
{
    /// Insert `value` into the index. An equal value already present is
    /// overwritten in place.
    pub fn insert(&self, value: T) -> Result<()> {
        let cmp = |a: &T, b: &T| self.cmp.compare(a, b);
        self.write_with(|core| S::insert(core, value, &cmp))
    }

    /// Remove the entry equal to `value`. Return false if there is none.
    pub fn remove(&self, value: &T) -> bool {
        let seek = |v: &T| self.cmp.compare(value, v);
        self.write_with(|core| S::remove(core, &seek)).is_some()
    }
}

/// Read operations on Tree instance.
impl<T, C, S, L, A> Tree<T, C, S, L, A>
where
    C: Compare<T>,
    S: Strategy,
    L: RawLock,
    A: Allocator,
{
    /// Locate the node holding `value`. The reference stays valid until
    /// the value is removed, read it back using [`Tree::get`].
    pub fn find(&self, value: &T) -> Option<NodeRef> {
        let seek = |v: &T| self.cmp.compare(value, v);
        self.read_with(|core| core.find_by(&seek))
    }

    /// Return a copy of the value held by `node`, None if the node has
    /// been removed.
    pub fn get(&self, node: NodeRef) -> Option<T>
    where
        T: Clone,
    {
        self.read_with(|core| core.arena.try_get(node).map(|n| n.value.clone()))
    }

    /// Return whether a value equal to `value` is present.
    pub fn contains(&self, value: &T) -> bool {
        self.find(value).is_some()
    }

    /// Return the smallest value in this index.
    pub fn min(&self) -> Option<T>
    where
        T: Clone,
    {
        self.edge(Side::Left)
    }

    /// Return the largest value in this index.
    pub fn max(&self) -> Option<T>
    where
        T: Clone,
    {
        self.edge(Side::Right)
    }

    /// Visit every value in ascending order, holding shared access for
    /// the whole walk.
    pub fn walk<F>(&self, mut f: F)
    where
        F: FnMut(&T),
    {
        self.read_with(|core| core.walk(core.root, &mut f))
    }

    /// Return a random entry from this index.
    pub fn random<R: Rng>(&self, rng: &mut R) -> Option<T>
    where
        T: Clone,
    {
        self.read_with(|core| {
            let mut n = core.root?;
            let mut at_depth = rng.gen::<u8>() % 40;
            loop {
                let next = match rng.gen::<bool>() {
                    true => core.left(n),
                    false => core.right(n),
                };
                match next {
                    Some(next) if at_depth > 0 => {
                        at_depth -= 1;
                        n = next;
                    }
                    _ => break Some(core.node(n).value.clone()),
                }
            }
        })
    }

    /// Return a cursor over all entries, in stack order rather than sort
    /// order. The cursor's stack is accounted against `allocator`.
    pub fn iterator<B>(&self, allocator: B) -> Cursor<'_, T, C, S, L, A, B>
    where
        B: Allocator,
    {
        Cursor::new(self, allocator)
    }

    fn edge(&self, side: Side) -> Option<T>
    where
        T: Clone,
    {
        self.read_with(|core| {
            let n = core.outermost(core.root?, side);
            Some(core.node(n).value.clone())
        })
    }
}

/// Lock-scoped access to the guarded core.
impl<T, C, S, L, A> Tree<T, C, S, L, A>
where
    S: Strategy,
    L: RawLock,
    A: Allocator,
{
    #[inline]
    pub(crate) fn compare(&self) -> &C {
        &self.cmp
    }

    #[inline]
    pub(crate) fn lock(&self) -> &L {
        &self.lock
    }

    pub(crate) fn read_with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Core<T, S::Meta, A>) -> R,
    {
        let _guard = ReadGuard::new(&self.lock);
        // SAFETY: shared access held.
        f(unsafe { self.core() })
    }

    pub(crate) fn write_with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut Core<T, S::Meta, A>) -> R,
    {
        let _guard = WriteGuard::new(&self.lock);
        // SAFETY: exclusive access held.
        f(unsafe { self.core_mut() })
    }

    /// # Safety
    ///
    /// Caller must hold at least shared access on `self.lock()` for the
    /// lifetime of the returned reference.
    #[inline]
    pub(crate) unsafe fn core(&self) -> &Core<T, S::Meta, A> {
        unsafe { &*self.core.get() }
    }

    /// # Safety
    ///
    /// Caller must hold exclusive access on `self.lock()` for the
    /// lifetime of the returned reference.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub(crate) unsafe fn core_mut(&self) -> &mut Core<T, S::Meta, A> {
        unsafe { &mut *self.core.get() }
    }
}

/// Statistics on [`Tree`]. Serves two purpose:
///
/// * To get partial but quick statistics via [`Tree::stats`] method.
/// * To get full statisics via [`Tree::validate`] method.
#[derive(Default, Debug, Clone)]
pub struct Stats {
    entries: usize, // number of entries in the tree.
    node_size: usize,
    blacks: Option<usize>,
    height: Option<usize>,
    depths: Option<Depth>,
}

impl Stats {
    pub(crate) fn new(entries: usize, node_size: usize) -> Stats {
        Stats {
            entries,
            node_size,
            blacks: Default::default(),
            height: Default::default(),
            depths: Default::default(),
        }
    }

    #[inline]
    pub(crate) fn set_blacks(&mut self, blacks: usize) {
        self.blacks = Some(blacks)
    }

    #[inline]
    pub(crate) fn set_height(&mut self, height: usize) {
        self.height = Some(height)
    }

    #[inline]
    fn set_depths(&mut self, depths: Depth) {
        self.depths = Some(depths)
    }

    /// Return number entries in [`Tree`] instance.
    #[inline]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Return size of a node cell in the arena, including strategy
    /// book-keeping and slot overhead.
    #[inline]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Return number of black nodes from root to leaf, red-black only.
    #[inline]
    pub fn blacks(&self) -> Option<usize> {
        self.blacks
    }

    /// Return height of the tree, AVL only.
    #[inline]
    pub fn height(&self) -> Option<usize> {
        self.height
    }

    /// Return [`Depth`] statistics.
    pub fn depths(&self) -> Option<Depth> {
        match &self.depths {
            Some(depths) if depths.samples() > 0 => Some(depths.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "entries: {}, node_size: {}", self.entries, self.node_size)?;
        if let Some(blacks) = self.blacks {
            write!(f, ", blacks: {}", blacks)?;
        }
        if let Some(height) = self.height {
            write!(f, ", height: {}", height)?;
        }
        if let Some(depths) = self.depths() {
            write!(f, ", depths: {}", depths)?;
        }
        Ok(())
    }
}
