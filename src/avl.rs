//! AVL balancing.
//!
//! Every node stores the height of its subtree, a null slot has height 0.
//! Insert and remove recurse down to the target, apply the local change
//! and rebalance each node on the way back up, returning the possibly new
//! subtree root to the caller.

use std::{cmp::Ordering, mem};

use crate::{
    arena::{Allocator, NodeRef},
    error::{Error, Result},
    tree::{Core, Node, Side, Stats, Strategy},
};

/// AVL strategy for [`crate::Tree`] and [`crate::Map`].
#[derive(Clone, Copy, Default, Debug)]
pub struct Avl;

/// Subtree height of an AVL node.
#[derive(Clone, Copy, Default, Debug)]
pub struct AvlMeta {
    height: u32,
}

type AvlCore<T, A> = Core<T, AvlMeta, A>;

impl Strategy for Avl {
    type Meta = AvlMeta;

    const NAME: &'static str = "avl";

    fn insert<T, A, F>(core: &mut AvlCore<T, A>, value: T, cmp: &F) -> Result<()>
    where
        A: Allocator,
        F: Fn(&T, &T) -> Ordering,
    {
        let root = core.root;
        core.root = Some(core.insert_at(root, value, cmp)?);
        Ok(())
    }

    fn remove<T, A, F>(core: &mut AvlCore<T, A>, seek: &F) -> Option<T>
    where
        A: Allocator,
        F: Fn(&T) -> Ordering,
    {
        let root = core.root;
        let (root, value) = core.remove_at(root, seek);
        core.root = root;
        value
    }

    fn validate<T, A>(core: &AvlCore<T, A>, stats: &mut Stats) -> Result<()>
    where
        A: Allocator,
    {
        let height = core.validate_tree(core.root)?;
        stats.set_height(height as usize);
        Ok(())
    }
}

impl<T, A> Core<T, AvlMeta, A>
where
    A: Allocator,
{
    #[inline]
    fn height(&self, n: Option<NodeRef>) -> u32 {
        n.map_or(0, |n| self.node(n).meta.height)
    }

    fn update_height(&mut self, n: NodeRef) {
        let (l, r) = (self.left(n), self.right(n));
        let height = 1 + self.height(l).max(self.height(r));
        self.node_mut(n).meta.height = height;
    }

    // height(left) - height(right)
    #[inline]
    fn balance(&self, n: Option<NodeRef>) -> i64 {
        match n {
            Some(n) => {
                let (l, r) = (self.left(n), self.right(n));
                i64::from(self.height(l)) - i64::from(self.height(r))
            }
            None => 0,
        }
    }

    //              (i)                       (i)
    //               |                         |
    //               n                         x
    //              / \                       / \
    //             /   \                     /   \
    //            a     x       ==>         n     c
    //                 / \                 / \
    //                b   c               a   b
    //
    // rotate towards `side`, drawn above for Side::Left. Return the new
    // subtree root.
    fn rotate(&mut self, n: NodeRef, side: Side) -> NodeRef {
        let x = match self.child(n, side.flip()) {
            Some(x) => x,
            None => panic!("rotate(): {:?} has no pivot, call the programmer", n),
        };
        let b = self.child(x, side);
        self.set_child(n, side.flip(), b);
        self.set_child(x, side, Some(n));
        self.update_height(n);
        self.update_height(x);
        x
    }

    fn rebalance(&mut self, n: NodeRef) -> NodeRef {
        self.update_height(n);
        let (heavy, bf) = match self.balance(Some(n)) {
            bf if bf > 1 => (Side::Left, 1),
            bf if bf < -1 => (Side::Right, -1),
            _ => return n,
        };
        // child leaning the other way needs a double rotation.
        let child = self.child(n, heavy);
        if self.balance(child) * bf < 0 {
            let child = match child {
                Some(child) => self.rotate(child, heavy),
                None => panic!("rebalance(): {:?} heavy on null, call the programmer", n),
            };
            self.set_child(n, heavy, Some(child));
        }
        self.rotate(n, heavy.flip())
    }

    fn insert_at<F>(&mut self, n: Option<NodeRef>, value: T, cmp: &F) -> Result<NodeRef>
    where
        F: Fn(&T, &T) -> Ordering,
    {
        let n = match n {
            Some(n) => n,
            None => {
                let node = Node::new(value, AvlMeta { height: 1 });
                return self.arena.allocate(node);
            }
        };

        let side = match cmp(&value, &self.node(n).value) {
            Ordering::Less => Side::Left,
            Ordering::Greater => Side::Right,
            Ordering::Equal => {
                self.node_mut(n).value = value;
                return Ok(n);
            }
        };
        let child = self.child(n, side);
        let child = self.insert_at(child, value, cmp)?;
        self.set_child(n, side, Some(child));
        Ok(self.rebalance(n))
    }

    fn remove_at<F>(&mut self, n: Option<NodeRef>, seek: &F) -> (Option<NodeRef>, Option<T>)
    where
        F: Fn(&T) -> Ordering,
    {
        let n = match n {
            Some(n) => n,
            None => return (None, None),
        };

        let side = match seek(&self.node(n).value) {
            Ordering::Less => Side::Left,
            Ordering::Greater => Side::Right,
            Ordering::Equal => match (self.left(n), self.right(n)) {
                (Some(_), Some(r)) => {
                    let (r, mut value) = self.remove_min(r);
                    self.node_mut(n).right = r;
                    mem::swap(&mut self.node_mut(n).value, &mut value);
                    return (Some(self.rebalance(n)), Some(value));
                }
                (l, r) => {
                    let node = self.arena.destroy(n);
                    return (l.or(r), Some(node.value));
                }
            },
        };

        let child = self.child(n, side);
        match self.remove_at(child, seek) {
            (_, None) => (Some(n), None),
            (child, value) => {
                self.set_child(n, side, child);
                (Some(self.rebalance(n)), value)
            }
        }
    }

    // Detach the leftmost node under `n`, return the new subtree root and
    // the detached value.
    fn remove_min(&mut self, n: NodeRef) -> (Option<NodeRef>, T) {
        match self.left(n) {
            None => {
                let right = self.right(n);
                let node = self.arena.destroy(n);
                (right, node.value)
            }
            Some(l) => {
                let (l, value) = self.remove_min(l);
                self.node_mut(n).left = l;
                (Some(self.rebalance(n)), value)
            }
        }
    }

    // Return height of subtree under `n`.
    fn validate_tree(&self, n: Option<NodeRef>) -> Result<u32> {
        let n = match n {
            Some(n) => n,
            None => return Ok(0),
        };
        let lheight = self.validate_tree(self.left(n))?;
        let rheight = self.validate_tree(self.right(n))?;
        let bf = i64::from(lheight) - i64::from(rheight);
        if bf < -1 || bf > 1 {
            let err = format!("left: {} right: {} at {:?}", lheight, rheight, n);
            return Err(Error::Unbalanced(err));
        }
        let height = 1 + lheight.max(rheight);
        if self.height(Some(n)) != height {
            let err = format!("{:?} stores {} computed {}", n, self.height(Some(n)), height);
            return Err(Error::BadHeight(err));
        }
        Ok(height)
    }
}
