use rand::Rng;

use crate::{
    arena::{Allocator, Heap},
    cursor::Cursor,
    error::Result,
    lock::{NoLock, RawLock, WriteGuard},
    rb::RedBlack,
    tree::{ByKey, Compare, Natural, Stats, Strategy, Tree},
};

/// Map manage a single instance of in-memory {key, value} index, on top
/// of [`Tree`]. Entries are ordered by key alone, updating the value of
/// an existing key never changes the tree's shape.
pub struct Map<K, V, C = Natural, S = RedBlack, L = NoLock, A = Heap>
where
    S: Strategy,
    A: Allocator,
{
    tree: Tree<(K, V), ByKey<C>, S, L, A>,
}

/// Different ways to construct a new Map instance.
impl<K, V, C, S, L, A> Map<K, V, C, S, L, A>
where
    C: Compare<K>,
    S: Strategy,
    L: RawLock,
    A: Allocator,
{
    /// Create an empty instance identified by `name`, with default
    /// allocator and comparator.
    pub fn new<N>(name: N) -> Map<K, V, C, S, L, A>
    where
        N: AsRef<str>,
        C: Default,
        A: Default,
    {
        Map::with_compare(name, A::default(), C::default())
    }

    /// Create an empty instance whose nodes are accounted against
    /// `allocator`.
    pub fn init<N>(name: N, allocator: A) -> Map<K, V, C, S, L, A>
    where
        N: AsRef<str>,
        C: Default,
    {
        Map::with_compare(name, allocator, C::default())
    }

    /// Create an empty instance ordered by key comparator `cmp`.
    pub fn with_compare<N>(name: N, allocator: A, cmp: C) -> Map<K, V, C, S, L, A>
    where
        N: AsRef<str>,
    {
        Map {
            tree: Tree::with_compare(name, allocator, ByKey(cmp)),
        }
    }

    /// Release every entry in one go.
    pub fn deinit(self) {
        self.tree.deinit()
    }
}

/// Maintenance API.
impl<K, V, C, S, L, A> Map<K, V, C, S, L, A>
where
    C: Compare<K>,
    S: Strategy,
    L: RawLock,
    A: Allocator,
{
    /// Identify this instance.
    #[inline]
    pub fn id(&self) -> String {
        self.tree.id()
    }

    /// Return number of entries in this instance.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Return whether this instance has no entries.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Return quick statistics, refer to [`Tree::stats`].
    pub fn stats(&self) -> Stats {
        self.tree.stats()
    }

    /// Refer to [`Tree::validate`].
    pub fn validate(&self) -> Result<Stats> {
        self.tree.validate()
    }
}

/// Write operations on Map instance.
impl<K, V, C, S, L, A> Map<K, V, C, S, L, A>
where
    C: Compare<K>,
    S: Strategy,
    L: RawLock,
    A: Allocator,
{
    /// Set value for key. If there is an existing entry for key,
    /// overwrite the old value with new value.
    pub fn put(&self, key: K, value: V) -> Result<()> {
        self.tree.insert((key, value))
    }

    /// Remove key from this instance. Return false if key is not present.
    pub fn remove(&self, key: &K) -> bool {
        let cmp = &self.tree.compare().0;
        let seek = |entry: &(K, V)| cmp.compare(key, &entry.0);
        self.tree
            .write_with(|core| S::remove(core, &seek))
            .is_some()
    }

    /// Return a handle to the entry for `key`, holding exclusive access
    /// on this instance till the handle is dropped. Value can be read and
    /// replaced in place, the key is read only.
    ///
    /// Concurrent readers block too while the handle lives, so do writers.
    /// With [`NoLock`] either of them panics.
    pub fn get_entry(&self, key: &K) -> Option<EntryMut<'_, K, V, L>> {
        let cmp = &self.tree.compare().0;
        let guard = WriteGuard::new(self.tree.lock());
        // SAFETY: exclusive access held by guard, which lives as long as
        // the returned reference.
        let core = unsafe { self.tree.core_mut() };
        let n = core.find_by(&|entry: &(K, V)| cmp.compare(key, &entry.0))?;
        Some(EntryMut {
            entry: &mut core.node_mut(n).value,
            _guard: guard,
        })
    }
}

/// Read operations on Map instance.
impl<K, V, C, S, L, A> Map<K, V, C, S, L, A>
where
    C: Compare<K>,
    S: Strategy,
    L: RawLock,
    A: Allocator,
{
    /// Get the value for key.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let cmp = &self.tree.compare().0;
        let seek = |entry: &(K, V)| cmp.compare(key, &entry.0);
        self.tree.read_with(|core| {
            let n = core.find_by(&seek)?;
            Some(core.node(n).value.1.clone())
        })
    }

    /// Return whether an entry for key is present.
    pub fn contains(&self, key: &K) -> bool {
        let cmp = &self.tree.compare().0;
        let seek = |entry: &(K, V)| cmp.compare(key, &entry.0);
        self.tree.read_with(|core| core.find_by(&seek).is_some())
    }

    /// Return the entry with smallest key.
    pub fn min(&self) -> Option<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.tree.min()
    }

    /// Return the entry with largest key.
    pub fn max(&self) -> Option<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.tree.max()
    }

    /// Visit every entry in ascending key order, holding shared access for
    /// the whole walk.
    pub fn walk<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        self.tree.walk(|(key, value)| f(key, value))
    }

    /// Return a random entry from this index.
    pub fn random<R: Rng>(&self, rng: &mut R) -> Option<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.tree.random(rng)
    }

    /// Return a cursor over all entries, refer to [`Cursor`] for the
    /// order and locking behaviour.
    pub fn iterator<B>(&self, allocator: B) -> Cursor<'_, (K, V), ByKey<C>, S, L, A, B>
    where
        B: Allocator,
    {
        self.tree.iterator(allocator)
    }
}

/// Mutable handle to a single entry of [`Map`], returned by
/// [`Map::get_entry`]. Holds exclusive access on the map while alive.
pub struct EntryMut<'a, K, V, L>
where
    L: RawLock,
{
    entry: &'a mut (K, V),
    _guard: WriteGuard<'a, L>,
}

impl<'a, K, V, L> EntryMut<'a, K, V, L>
where
    L: RawLock,
{
    #[inline]
    pub fn key(&self) -> &K {
        &self.entry.0
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.entry.1
    }

    #[inline]
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.entry.1
    }

    /// Replace the value in place and return the old one.
    pub fn set(&mut self, value: V) -> V {
        std::mem::replace(&mut self.entry.1, value)
    }
}
