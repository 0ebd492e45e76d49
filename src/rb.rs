//! Red-black balancing.
//!
//! Rules maintained after every insert and remove:
//!
//! * Root is black.
//! * A red node has only black children.
//! * Every path from a node down to a null slot crosses the same number
//!   of black nodes.
//!
//! Nodes keep a back-link to their parent for the fixup walks. The link is
//! a plain [`NodeRef`], ownership stays with the arena.

use std::cmp::Ordering;

use crate::{
    arena::{Allocator, NodeRef},
    error::{Error, Result},
    tree::{Core, Node, Side, Stats, Strategy},
};

/// Red-black strategy for [`crate::Tree`] and [`crate::Map`].
#[derive(Clone, Copy, Default, Debug)]
pub struct RedBlack;

/// Color and parent link of a red-black node. New nodes are red.
#[derive(Clone, Copy, Default, Debug)]
pub struct RbMeta {
    black: bool,
    parent: Option<NodeRef>,
}

type RbCore<T, A> = Core<T, RbMeta, A>;

impl Strategy for RedBlack {
    type Meta = RbMeta;

    const NAME: &'static str = "red-black";

    fn insert<T, A, F>(core: &mut RbCore<T, A>, value: T, cmp: &F) -> Result<()>
    where
        A: Allocator,
        F: Fn(&T, &T) -> Ordering,
    {
        let (mut parent, mut side) = (None, Side::Left);
        let mut cur = core.root;
        while let Some(n) = cur {
            side = match cmp(&value, &core.node(n).value) {
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
                Ordering::Equal => {
                    core.node_mut(n).value = value;
                    return Ok(());
                }
            };
            parent = Some(n);
            cur = core.child(n, side);
        }

        let meta = RbMeta {
            black: false,
            parent,
        };
        let z = core.arena.allocate(Node::new(value, meta))?;
        match parent {
            Some(p) => core.set_child(p, side, Some(z)),
            None => core.root = Some(z),
        }
        core.insert_fixup(z);
        Ok(())
    }

    fn remove<T, A, F>(core: &mut RbCore<T, A>, seek: &F) -> Option<T>
    where
        A: Allocator,
        F: Fn(&T) -> Ordering,
    {
        let z = core.find_by(seek)?;

        // node to splice out has at most one child, with two children that
        // is the in-order successor whose value moves into z.
        let y = match (core.left(z), core.right(z)) {
            (Some(_), Some(r)) => core.outermost(r, Side::Left),
            _ => z,
        };
        let x = core.left(y).or_else(|| core.right(y));
        let xp = core.parent(y);
        if let Some(x) = x {
            core.set_parent(x, xp);
        }
        core.replace_child(xp, y, x);

        let spliced_black = core.is_black(Some(y));
        let mut node = core.arena.destroy(y);
        if y != z {
            std::mem::swap(&mut core.node_mut(z).value, &mut node.value);
        }
        if spliced_black {
            core.remove_fixup(x, xp);
        }
        Some(node.value)
    }

    fn validate<T, A>(core: &RbCore<T, A>, stats: &mut Stats) -> Result<()>
    where
        A: Allocator,
    {
        if let Some(root) = core.root {
            if !core.is_black(Some(root)) {
                return Err(Error::RedRoot);
            }
            if let Some(p) = core.parent(root) {
                let msg = format!("root {:?} has parent {:?}", root, p);
                return Err(Error::BrokenParent(msg));
            }
        }
        let blacks = core.validate_tree(core.root, false, 0)?;
        stats.set_blacks(blacks);
        Ok(())
    }
}

impl<T, A> Core<T, RbMeta, A>
where
    A: Allocator,
{
    #[inline]
    fn parent(&self, n: NodeRef) -> Option<NodeRef> {
        self.node(n).meta.parent
    }

    #[inline]
    fn set_parent(&mut self, n: NodeRef, parent: Option<NodeRef>) {
        self.node_mut(n).meta.parent = parent
    }

    // null slots count as black.
    #[inline]
    fn is_black(&self, n: Option<NodeRef>) -> bool {
        n.map_or(true, |n| self.node(n).meta.black)
    }

    #[inline]
    fn is_red(&self, n: Option<NodeRef>) -> bool {
        !self.is_black(n)
    }

    #[inline]
    fn set_color(&mut self, n: Option<NodeRef>, black: bool) {
        if let Some(n) = n {
            self.node_mut(n).meta.black = black
        }
    }

    #[inline]
    fn set_black(&mut self, n: Option<NodeRef>) {
        self.set_color(n, true)
    }

    #[inline]
    fn set_red(&mut self, n: Option<NodeRef>) {
        self.set_color(n, false)
    }

    fn expect_parent(&self, n: NodeRef) -> NodeRef {
        match self.parent(n) {
            Some(p) => p,
            None => panic!("expect_parent(): {:?} is root, call the programmer", n),
        }
    }

    fn expect_child(&self, n: NodeRef, side: Side) -> NodeRef {
        match self.child(n, side) {
            Some(c) => c,
            None => panic!("expect_child(): {:?} no {:?} child, call the programmer", n, side),
        }
    }

    // Point the link that used to reach `old` at `new`, root slot when
    // `parent` is None.
    fn replace_child(&mut self, parent: Option<NodeRef>, old: NodeRef, new: Option<NodeRef>) {
        match parent {
            None => self.root = new,
            Some(p) if self.left(p) == Some(old) => self.set_child(p, Side::Left, new),
            Some(p) => self.set_child(p, Side::Right, new),
        }
    }

    //              (i)                       (i)
    //               |                         |
    //               x                         y
    //              / \                       / \
    //             /   \                     /   \
    //            a     y       ==>         x     c
    //                 / \                 / \
    //                b   c               a   b
    //
    // rotate towards `side`, drawn above for Side::Left.
    fn rotate(&mut self, x: NodeRef, side: Side) {
        let y = self.expect_child(x, side.flip());
        let b = self.child(y, side);
        self.set_child(x, side.flip(), b);
        if let Some(b) = b {
            self.set_parent(b, Some(x));
        }
        let xp = self.parent(x);
        self.set_parent(y, xp);
        self.replace_child(xp, x, Some(y));
        self.set_child(y, side, Some(x));
        self.set_parent(x, Some(y));
    }

    fn insert_fixup(&mut self, mut z: NodeRef) {
        while let Some(p) = self.parent(z) {
            if self.is_black(Some(p)) {
                break;
            }
            // red parent is never root.
            let g = self.expect_parent(p);
            let side = if self.left(g) == Some(p) {
                Side::Left
            } else {
                Side::Right
            };
            let uncle = self.child(g, side.flip());
            if self.is_red(uncle) {
                self.set_black(Some(p));
                self.set_black(uncle);
                self.set_red(Some(g));
                z = g;
                continue;
            }
            if self.child(p, side.flip()) == Some(z) {
                z = p;
                self.rotate(z, side);
            }
            let p = self.expect_parent(z);
            let g = self.expect_parent(p);
            self.set_black(Some(p));
            self.set_red(Some(g));
            self.rotate(g, side.flip());
            break;
        }
        let root = self.root;
        self.set_black(root);
    }

    // `x` took the place of a spliced black node and carries an extra
    // black, `xp` is its parent since `x` may be a null slot.
    fn remove_fixup(&mut self, mut x: Option<NodeRef>, mut xp: Option<NodeRef>) {
        while x != self.root && self.is_black(x) {
            let p = match xp {
                Some(p) => p,
                None => break,
            };
            let side = if self.left(p) == x {
                Side::Left
            } else {
                Side::Right
            };
            // sibling exists, its side carries at least one black.
            let mut w = self.expect_child(p, side.flip());
            if self.is_red(Some(w)) {
                self.set_black(Some(w));
                self.set_red(Some(p));
                self.rotate(p, side);
                w = self.expect_child(p, side.flip());
            }

            let (near, far) = (self.child(w, side), self.child(w, side.flip()));
            if self.is_black(near) && self.is_black(far) {
                self.set_red(Some(w));
                x = Some(p);
                xp = self.parent(p);
                continue;
            }
            if self.is_black(far) {
                self.set_black(near);
                self.set_red(Some(w));
                self.rotate(w, side.flip());
                w = self.expect_child(p, side.flip());
            }
            let p_black = self.is_black(Some(p));
            self.set_color(Some(w), p_black);
            self.set_black(Some(p));
            let far = self.child(w, side.flip());
            self.set_black(far);
            self.rotate(p, side);
            x = self.root;
            break;
        }
        self.set_black(x);
    }

    // Return number of blacks from `n` down to any null slot.
    fn validate_tree(&self, n: Option<NodeRef>, fromred: bool, nb: usize) -> Result<usize> {
        let n = match n {
            Some(n) => n,
            None => return Ok(nb),
        };

        let red = self.is_red(Some(n));
        if fromred && red {
            return Err(Error::ConsecutiveReds);
        }
        let nb = if red { nb } else { nb + 1 };

        let (left, right) = (self.left(n), self.right(n));
        for child in [left, right].iter().filter_map(|c| *c) {
            if self.parent(child) != Some(n) {
                let msg = format!("{:?} under {:?} points to {:?}", child, n, self.parent(child));
                return Err(Error::BrokenParent(msg));
            }
        }
        let lblacks = self.validate_tree(left, red, nb)?;
        let rblacks = self.validate_tree(right, red, nb)?;
        if lblacks != rblacks {
            let err = format!("left: {} right: {} at {:?}", lblacks, rblacks, n);
            return Err(Error::UnbalancedBlacks(err));
        }
        Ok(lblacks)
    }
}
