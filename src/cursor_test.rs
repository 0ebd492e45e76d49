use log::LevelFilter;
use rand::prelude::random;
use simplelog::{Config, TestLogger};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::arena::{Bounded, Heap};
use crate::avl::Avl;
use crate::error::Error;
use crate::lock::{NoLock, RawLock, SpinLock};
use crate::map::Map;
use crate::rb::RedBlack;
use crate::tree::{Natural, Strategy, Tree};

fn init_logging() {
    // only the first test to get here installs the logger.
    TestLogger::init(LevelFilter::Trace, Config::default()).ok();
}

// Expected visiting order, pop a node and push its left then right child.
fn stack_order<S, L>(tree: &Tree<i64, Natural, S, L>) -> Vec<i64>
where
    S: Strategy,
    L: RawLock,
{
    tree.read_with(|core| {
        let (mut stack, mut acc) = (vec![], vec![]);
        stack.extend(core.root);
        while let Some(n) = stack.pop() {
            let node = core.node(n);
            stack.extend(node.left);
            stack.extend(node.right);
            acc.push(node.value);
        }
        acc
    })
}

fn drain<S, L>(tree: &Tree<i64, Natural, S, L>) -> Vec<i64>
where
    S: Strategy,
    L: RawLock,
{
    let mut cursor = tree.iterator(Heap);
    let mut acc = vec![];
    while let Some(value) = cursor.next().unwrap() {
        acc.push(value);
    }
    assert!(cursor.is_exhausted());
    assert!(!cursor.is_locked());
    acc
}

fn do_order<S: Strategy>() {
    init_logging();

    let tree: Tree<i64, Natural, S> = Tree::new("test-cursor");
    for _ in 0..1000 {
        tree.insert((random::<i64>() % 10_000).abs()).unwrap();
    }

    let values = drain(&tree);
    assert_eq!(values.len(), tree.len());
    assert_eq!(values, stack_order(&tree));
    // root comes first and right subtree before left.
    let (root, has_right) = tree.read_with(|core| {
        let n = core.root.unwrap();
        (core.node(n).value, core.right(n).is_some())
    });
    assert_eq!(values[0], root);
    if has_right {
        assert!(values[1] > root);
    }

    let mut sorted = values.clone();
    sorted.sort();
    let mut walked = vec![];
    tree.walk(|value| walked.push(*value));
    assert_eq!(sorted, walked);
}

#[test]
fn test_order_rb() {
    do_order::<RedBlack>();
}

#[test]
fn test_order_avl() {
    do_order::<Avl>();
}

#[test]
fn test_empty() {
    let tree: Tree<i64, Natural, Avl, SpinLock> = Tree::new("test-cursor");
    let mut cursor = tree.iterator(Heap);
    assert!(!cursor.is_exhausted());
    assert_eq!(cursor.next().unwrap(), None);
    assert!(cursor.is_exhausted());
    assert!(!cursor.is_locked());
    assert_eq!(cursor.next().unwrap(), None);

    // lock is free, writers go through.
    tree.insert(1).unwrap();
}

#[test]
fn test_eager_release() {
    let tree: Tree<i64, Natural, RedBlack, SpinLock> = Tree::new("test-cursor");
    for key in 0..10 {
        tree.insert(key).unwrap();
    }

    let mut cursor = tree.iterator(Heap);
    for i in 0..10 {
        assert!(cursor.next().unwrap().is_some());
        assert_eq!(cursor.is_locked(), i < 9, "at {}", i);
    }
    // last value already released the lock.
    assert!(cursor.is_exhausted());
    tree.insert(10).unwrap();
    assert_eq!(cursor.next().unwrap(), None);
}

#[test]
fn test_reset() {
    let tree: Tree<i64, Natural, Avl, SpinLock> = Tree::new("test-cursor");
    for key in 0..100 {
        tree.insert(key).unwrap();
    }
    let expected = stack_order(&tree);

    let mut cursor = tree.iterator(Heap);
    assert_eq!(cursor.next().unwrap(), Some(expected[0]));
    assert_eq!(cursor.next().unwrap(), Some(expected[1]));
    cursor.reset();
    assert!(!cursor.is_locked());
    assert!(!cursor.is_exhausted());

    // writers go through between traversals.
    tree.insert(100).unwrap();
    let expected = stack_order(&tree);

    let mut values = vec![];
    while let Some(value) = cursor.next().unwrap() {
        values.push(value);
    }
    assert_eq!(values, expected);

    cursor.reset();
    assert_eq!(cursor.next().unwrap(), Some(expected[0]));
}

#[test]
fn test_lock_held() {
    let tree: Arc<Tree<i64, Natural, RedBlack, SpinLock>> = Arc::new(Tree::new("test-cursor"));
    for key in 0..100 {
        tree.insert(key).unwrap();
    }
    let expected = stack_order(&tree);
    let done = Arc::new(AtomicBool::new(false));

    let mut cursor = tree.iterator(Heap);
    let mut values = vec![cursor.next().unwrap().unwrap()];
    assert!(cursor.is_locked());

    let handle = {
        let (tree, done) = (Arc::clone(&tree), Arc::clone(&done));
        thread::spawn(move || {
            tree.insert(100).unwrap();
            done.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!done.load(Ordering::SeqCst));
    // tree cannot change under an active cursor.
    while let Some(value) = cursor.next().unwrap() {
        values.push(value);
    }
    assert_eq!(values, expected);

    handle.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(tree.len(), 101);
}

#[test]
fn test_drop_releases() {
    let budget = Bounded::new(1024);
    let tree: Tree<i64, Natural, RedBlack, SpinLock> = Tree::new("test-cursor");
    for key in 0..100 {
        tree.insert(key).unwrap();
    }

    let mut cursor = tree.iterator(budget.clone());
    cursor.next().unwrap();
    assert!(cursor.is_locked());
    assert!(budget.used() > 0);

    drop(cursor);
    assert_eq!(budget.used(), 0);
    tree.insert(100).unwrap();
}

#[test]
fn test_out_of_memory() {
    let tree: Tree<i64, Natural, Avl, SpinLock> = Tree::new("test-cursor");
    for key in 0..10 {
        tree.insert(key).unwrap();
    }

    let budget = Bounded::new(0);
    let mut cursor = tree.iterator(budget.clone());
    match cursor.next() {
        Err(Error::OutOfMemory(_)) => (),
        res => panic!("expected out of memory {:?}", res),
    }
    assert!(!cursor.is_locked());
    assert!(!cursor.is_exhausted());
    assert_eq!(budget.used(), 0);

    // tree stays usable.
    tree.insert(10).unwrap();
    assert!(tree.remove(&0));
    assert!(tree.validate().is_ok());
}

#[test]
#[should_panic(expected = "held by 1 readers")]
fn test_insert_under_cursor() {
    let tree: Tree<i64> = Tree::new("test-cursor");
    for key in 0..10 {
        tree.insert(key).unwrap();
    }
    let mut cursor = tree.iterator(Heap);
    cursor.next().unwrap();
    tree.insert(10).unwrap();
}

#[test]
fn test_map_cursor() {
    let map: Map<i64, i64, Natural, RedBlack, NoLock> = Map::new("test-cursor");
    for key in 0..100 {
        map.put(key, -key).unwrap();
    }

    let mut cursor = map.iterator(Heap);
    let mut entries = vec![];
    while let Some(entry) = cursor.next().unwrap() {
        entries.push(entry);
    }
    assert_eq!(entries.len(), 100);
    assert!(entries.iter().all(|(key, value)| *key == -*value));

    entries.sort();
    let expected: Vec<(i64, i64)> = (0..100).map(|key| (key, -key)).collect();
    assert_eq!(entries, expected);
}
