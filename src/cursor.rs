use log::trace;

use crate::{
    arena::{self, Allocator, NodeRef},
    error::Result,
    lock::{RawLock, ReadGuard},
    tree::{Compare, Strategy, Tree},
};

const MIN_STACK: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Fresh,
    Active,
    Exhausted,
}

/// Depth-first cursor over a [`Tree`], driven by an explicit stack of
/// pending nodes.
///
/// The first call to [`Cursor::next`] acquires shared access on the tree
/// and the cursor keeps holding it across calls, till the traversal is
/// exhausted, [`Cursor::reset`] is called, or the cursor is dropped.
/// Writers on the same tree block meanwhile, so keep cursors short lived.
///
/// Children are pushed left then right, hence the right subtree is visited
/// first and values do not come out in sort order. Use [`Tree::walk`] for
/// an ascending walk.
pub struct Cursor<'a, T, C, S, L, A, B>
where
    S: Strategy,
    L: RawLock,
    A: Allocator,
    B: Allocator,
{
    tree: &'a Tree<T, C, S, L, A>,
    allocator: B,
    stack: Vec<NodeRef>,
    granted: usize, // bytes granted by allocator for stack
    guard: Option<ReadGuard<'a, L>>,
    state: State,
}

impl<'a, T, C, S, L, A, B> Cursor<'a, T, C, S, L, A, B>
where
    C: Compare<T>,
    S: Strategy,
    L: RawLock,
    A: Allocator,
    B: Allocator,
{
    pub(crate) fn new(tree: &'a Tree<T, C, S, L, A>, allocator: B) -> Self {
        Cursor {
            tree,
            allocator,
            stack: Vec::new(),
            granted: 0,
            guard: None,
            state: State::Fresh,
        }
    }

    /// Return the next value, None once every node has been visited.
    /// Fail only if the stack cannot grow, in which case the cursor stays
    /// where it was and the call can be retried.
    pub fn next(&mut self) -> Result<Option<T>>
    where
        T: Clone,
    {
        match self.state {
            State::Exhausted => return Ok(None),
            State::Active => (),
            State::Fresh => {
                self.reserve(2)?;
                self.guard = Some(ReadGuard::new(self.tree.lock()));
                self.state = State::Active;
                trace!(target: "cursor", "{}: shared lock acquired", self.tree.id());
                // SAFETY: shared access held by self.guard.
                let core = unsafe { self.tree.core() };
                if let Some(root) = core.root {
                    self.stack.push(root);
                }
            }
        }

        // room for both children before anything is popped.
        self.reserve(2)?;
        let tree = self.tree;
        // SAFETY: shared access held by self.guard while Active.
        let core = unsafe { tree.core() };
        if let Some(n) = self.stack.pop() {
            let node = core.node(n);
            if let Some(left) = node.left {
                self.stack.push(left);
            }
            if let Some(right) = node.right {
                self.stack.push(right);
            }
            let value = node.value.clone();
            if self.stack.is_empty() {
                self.finish();
            }
            return Ok(Some(value));
        }

        self.finish();
        Ok(None)
    }

    /// Drop the lock if held and rewind to the start. Stack capacity is
    /// kept for the next traversal.
    pub fn reset(&mut self) {
        if self.guard.take().is_some() {
            trace!(target: "cursor", "{}: reset, shared lock released", self.tree.id());
        }
        self.stack.clear();
        self.state = State::Fresh;
    }

    /// Check whether every node has been visited.
    pub fn is_exhausted(&self) -> bool {
        self.state == State::Exhausted
    }

    /// Check whether this cursor currently holds the tree's lock.
    pub fn is_locked(&self) -> bool {
        self.guard.is_some()
    }

    fn finish(&mut self) {
        self.stack.clear();
        self.state = State::Exhausted;
        if self.guard.take().is_some() {
            trace!(target: "cursor", "{}: exhausted, shared lock released", self.tree.id());
        }
    }

    fn reserve(&mut self, n: usize) -> Result<()> {
        if self.stack.capacity() - self.stack.len() >= n {
            return Ok(());
        }
        let additional = self.stack.capacity().max(MIN_STACK);
        self.granted += arena::try_grow(&self.allocator, &mut self.stack, additional, "cursor")?;
        Ok(())
    }
}

impl<'a, T, C, S, L, A, B> Drop for Cursor<'a, T, C, S, L, A, B>
where
    S: Strategy,
    L: RawLock,
    A: Allocator,
    B: Allocator,
{
    fn drop(&mut self) {
        // lock goes with the guard.
        self.allocator.release(self.granted);
    }
}
