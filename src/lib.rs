//! Ordered index over balanced binary search trees.
//!
//! [`Tree`] stores values, [`Map`] stores {key, value} entries ordered by
//! key. Both are parameterized, at compile time, over:
//!
//! * a three-way comparator, [`Compare`],
//! * a balancing strategy, [`RedBlack`] or [`Avl`],
//! * a lock strategy, [`NoLock`], [`SpinLock`] or [`BlockingLock`],
//! * an [`Allocator`] capability that accounts for node storage.
//!
//! ```
//! use balanced_index::{Avl, BlockingLock, Heap, Map, Natural};
//!
//! let map: Map<u64, String, Natural, Avl, BlockingLock> = Map::new("users");
//! map.put(10, "ten".to_string()).unwrap();
//! assert_eq!(map.get(&10), Some("ten".to_string()));
//!
//! let mut cursor = map.iterator(Heap);
//! assert_eq!(cursor.next().unwrap(), Some((10, "ten".to_string())));
//! assert_eq!(cursor.next().unwrap(), None);
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

mod arena;
mod avl;
mod cursor;
mod depth;
mod error;
mod lock;
mod map;
mod rb;
mod tree;

pub use crate::arena::{Allocator, Bounded, Heap, NodeRef};
pub use crate::avl::Avl;
pub use crate::cursor::Cursor;
pub use crate::depth::Depth;
pub use crate::error::{Error, Result};
pub use crate::lock::{BlockingLock, NoLock, RawLock, ReadGuard, SpinLock, WriteGuard};
pub use crate::map::{EntryMut, Map};
pub use crate::rb::RedBlack;
pub use crate::tree::{ByKey, Compare, Natural, Stats, Strategy, Tree};

#[cfg(test)]
mod tree_test;
#[cfg(test)]
mod cursor_test;
