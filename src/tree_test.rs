use rand::prelude::random;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use std::cmp::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::arena::{Bounded, Heap};
use crate::avl::Avl;
use crate::error::Error;
use crate::lock::{BlockingLock, NoLock, RawLock, SpinLock};
use crate::rb::RedBlack;
use crate::tree::{ByKey, Natural, Strategy, Tree};

type Entries<S, L = NoLock, A = Heap> = Tree<(i64, i64), ByKey<Natural>, S, L, A>;

const KEYS: [i64; 10] = [2, 1, 3, 6, 5, 4, 8, 0, 9, 7];

fn sorted<T, S, L>(tree: &Tree<T, Natural, S, L>) -> Vec<T>
where
    T: Ord + Clone,
    S: Strategy,
    L: RawLock,
{
    let mut acc = vec![];
    tree.walk(|value| acc.push(value.clone()));
    acc
}

#[test]
fn test_id() {
    let tree: Tree<i64> = Tree::new("test-tree");
    assert_eq!(tree.id(), "test-tree".to_string());
}

#[test]
fn test_len() {
    let tree: Tree<i64, Natural, Avl> = Tree::new("test-tree");
    assert_eq!(tree.len(), 0);
    assert!(tree.is_empty());
    assert!(tree.min().is_none());
    assert!(tree.max().is_none());
    assert!(tree.validate().is_ok());
}

fn do_insert<S: Strategy>() {
    let tree: Tree<i64, Natural, S> = Tree::new("test-tree");
    for key in KEYS.iter() {
        assert!(tree.insert(*key).is_ok());
        assert!(tree.validate().is_ok());
    }

    assert_eq!(tree.len(), 10);
    assert_eq!(sorted(&tree), (0..10).collect::<Vec<i64>>());
    assert_eq!(tree.min(), Some(0));
    assert_eq!(tree.max(), Some(9));
    for key in 0..10 {
        assert!(tree.contains(&key));
        let node = tree.find(&key).unwrap();
        assert_eq!(tree.get(node), Some(key));
    }
    assert!(tree.find(&10).is_none());
    assert!(!tree.contains(&-1));
}

#[test]
fn test_insert_rb() {
    do_insert::<RedBlack>();
}

#[test]
fn test_insert_avl() {
    do_insert::<Avl>();
}

fn do_overwrite<S: Strategy>() {
    let tree: Entries<S> = Tree::new("test-tree");
    for key in KEYS.iter() {
        tree.insert((*key, 10)).unwrap();
    }
    let node = tree.find(&(7, 0)).unwrap();

    tree.insert((7, 20)).unwrap();
    assert_eq!(tree.len(), 10);
    assert!(tree.validate().is_ok());
    // overwrite happens in place.
    assert_eq!(tree.get(node), Some((7, 20)));

    let mut values = vec![];
    tree.walk(|(key, value)| values.push((*key, *value)));
    let refvals: Vec<(i64, i64)> = (0..10)
        .map(|key| (key, if key == 7 { 20 } else { 10 }))
        .collect();
    assert_eq!(values, refvals);
}

#[test]
fn test_overwrite_rb() {
    do_overwrite::<RedBlack>();
}

#[test]
fn test_overwrite_avl() {
    do_overwrite::<Avl>();
}

fn do_remove<S: Strategy>() {
    let tree: Tree<i64, Natural, S> = Tree::new("test-tree");
    for key in 0..10 {
        tree.insert(key).unwrap();
    }

    // delete a missing node.
    assert!(!tree.remove(&10));
    assert_eq!(tree.len(), 10);
    assert!(tree.validate().is_ok());

    assert!(tree.remove(&5));
    assert!(tree.validate().is_ok());
    assert_eq!(sorted(&tree), vec![0, 1, 2, 3, 4, 6, 7, 8, 9]);
    assert!(!tree.contains(&5));
    assert!(!tree.remove(&5));

    for key in 0..10 {
        assert_eq!(tree.remove(&key), key != 5);
        assert!(tree.validate().is_ok());
    }
    assert_eq!(tree.len(), 0);
    assert!(sorted(&tree).is_empty());
}

#[test]
fn test_remove_rb() {
    do_remove::<RedBlack>();
}

#[test]
fn test_remove_avl() {
    do_remove::<Avl>();
}

fn do_sequential<S: Strategy>() {
    let n = 2000;
    let tree: Tree<i64, Natural, S> = Tree::new("test-tree");
    for key in 0..n {
        tree.insert(key).unwrap();
    }
    assert!(tree.validate().is_ok());
    for key in (0..n).rev().filter(|k| k % 3 == 0) {
        assert!(tree.remove(&key));
        assert!(tree.validate().is_ok());
    }
    for key in (0..n).filter(|k| k % 3 != 0) {
        assert!(tree.remove(&key));
        assert!(tree.validate().is_ok());
    }
    assert!(tree.is_empty());

    // freed cells are reused.
    for key in (0..n).rev() {
        tree.insert(key).unwrap();
    }
    assert_eq!(tree.len(), n as usize);
    assert!(tree.validate().is_ok());
}

#[test]
fn test_sequential_rb() {
    do_sequential::<RedBlack>();
}

#[test]
fn test_sequential_avl() {
    do_sequential::<Avl>();
}

fn do_crud<S: Strategy>() {
    let size = 1000;
    let tree: Entries<S> = Tree::new("test-tree");
    let mut refns = RefNodes::new(size);

    for _ in 0..20_000 {
        let key: i64 = (random::<i64>() % (size as i64)).abs();
        let value: i64 = random();
        let op: i64 = (random::<i64>() % 3).abs();
        match op {
            0 => {
                tree.insert((key, value)).unwrap();
                refns.set(key, value);
            }
            1 => {
                let ok = tree.remove(&(key, 0));
                assert_eq!(ok, refns.delete(key).is_some());
            }
            2 => {
                let val = tree.find(&(key, 0)).and_then(|n| tree.get(n));
                assert_eq!(val.map(|e| e.1), refns.get(key));
            }
            op => panic!("unreachable {}", op),
        };

        assert!(tree.validate().is_ok());
    }

    assert_eq!(tree.len(), refns.len());
    let mut iter_ref = refns.iter();
    tree.walk(|item| assert_eq!(Some(*item), iter_ref.next()));
    assert!(iter_ref.next().is_none());
}

#[test]
fn test_crud_rb() {
    do_crud::<RedBlack>();
}

#[test]
fn test_crud_avl() {
    do_crud::<Avl>();
}

fn do_stats<S: Strategy>(rb: bool) {
    let tree: Tree<i64, Natural, S> = Tree::new("test-tree");
    for key in 0..1000 {
        tree.insert(key).unwrap();
    }

    let stats = tree.stats();
    assert_eq!(stats.entries(), 1000);
    assert!(stats.node_size() > 0);
    assert!(stats.depths().is_none());

    let stats = tree.validate().unwrap();
    assert_eq!(stats.entries(), 1000);
    assert_eq!(stats.blacks().is_some(), rb);
    assert_eq!(stats.height().is_some(), !rb);
    let depths = stats.depths().unwrap();
    assert_eq!(depths.samples(), 1001);
    // log2(1000) ~ 10, both strategies keep leaves within [h/2, 2h].
    assert!(depths.min() >= 5, "{}", depths);
    assert!(depths.max() <= 20, "{}", depths);
    if let Some(height) = stats.height() {
        assert_eq!(height, depths.max());
    }
}

#[test]
fn test_stats_rb() {
    do_stats::<RedBlack>(true);
}

#[test]
fn test_stats_avl() {
    do_stats::<Avl>(false);
}

#[test]
fn test_stale_node() {
    let tree: Tree<i64> = Tree::new("test-tree");
    tree.insert(1).unwrap();
    tree.insert(2).unwrap();
    let node = tree.find(&1).unwrap();

    assert!(tree.remove(&1));
    assert_eq!(tree.get(node), None);
    // the freed slot goes to the next insert, old handle stays dead.
    tree.insert(3).unwrap();
    assert_eq!(tree.get(node), None);
    let fresh = tree.find(&3).unwrap();
    assert_ne!(fresh, node);
    assert_eq!(tree.get(fresh), Some(3));
}

#[test]
#[should_panic(expected = "held by 1 readers")]
fn test_insert_under_walk() {
    let tree: Tree<i64> = Tree::new("test-tree");
    for key in 0..16 {
        tree.insert(key).unwrap();
    }
    tree.walk(|value| tree.insert(*value + 100).unwrap());
}

#[test]
fn test_compare_fn() {
    let desc: fn(&i64, &i64) -> Ordering = |a, b| b.cmp(a);
    let tree: Tree<i64, fn(&i64, &i64) -> Ordering> = Tree::with_compare("desc", Heap, desc);
    for key in KEYS.iter() {
        tree.insert(*key).unwrap();
    }
    assert!(tree.validate().is_ok());
    assert_eq!(tree.min(), Some(9));
    assert_eq!(tree.max(), Some(0));

    let mut values = vec![];
    tree.walk(|value| values.push(*value));
    assert_eq!(values, (0..10).rev().collect::<Vec<i64>>());
}

#[test]
fn test_random() {
    let tree: Tree<i64, Natural, Avl> = Tree::new("test-tree");
    let mut rng = SmallRng::from_seed(make_seed().to_le_bytes());

    assert_eq!(tree.random(&mut rng), None);

    tree.insert(0).unwrap();
    assert_eq!(tree.random(&mut rng), Some(0));

    for key in 1..10_000 {
        tree.insert(key).unwrap();
    }
    for _i in 0..20_000 {
        let key = tree.random(&mut rng).unwrap();
        assert!(key >= 0 && key < 10_000);
    }
}

fn do_out_of_memory<S: Strategy>() {
    let budget = Bounded::new(4096);
    let tree: Entries<S, NoLock, Bounded> = Tree::init("test-tree", budget.clone());

    let mut n = 0;
    let err = loop {
        match tree.insert((n, n)) {
            Ok(()) => n += 1,
            Err(err) => break err,
        }
    };
    match err {
        Error::OutOfMemory(_) => (),
        err => panic!("unexpected {:?}", err),
    }
    assert!(n > 0);
    assert_eq!(tree.len(), n as usize);
    assert!(tree.validate().is_ok());
    assert!(!tree.contains(&(n, 0)));
    assert!(budget.used() <= budget.limit());

    // overwrite needs no allocation.
    tree.insert((0, 100)).unwrap();
    let node = tree.find(&(0, 0)).unwrap();
    assert_eq!(tree.get(node), Some((0, 100)));

    // a freed cell makes room for exactly one more.
    assert!(tree.remove(&(1, 0)));
    tree.insert((n, n)).unwrap();
    assert!(tree.insert((n + 1, n)).is_err());
    assert!(tree.validate().is_ok());

    tree.deinit();
    assert_eq!(budget.used(), 0);
}

#[test]
fn test_out_of_memory_rb() {
    do_out_of_memory::<RedBlack>();
}

#[test]
fn test_out_of_memory_avl() {
    do_out_of_memory::<Avl>();
}

fn do_concurrent<S, L>()
where
    S: Strategy,
    L: RawLock + Sync + 'static,
{
    const WRITERS: i64 = 4;
    const READERS: usize = 4;
    const N: i64 = 2000;

    let tree: Arc<Tree<i64, Natural, S, L>> = Arc::new(Tree::new("test-tree"));

    let mut handles = vec![];
    for w in 0..WRITERS {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            for key in (0..N).filter(|k| k % WRITERS == w) {
                tree.insert(key).unwrap();
            }
            for key in (0..N).filter(|k| k % WRITERS == w && k % 2 == 1) {
                assert!(tree.remove(&key));
            }
        }));
    }
    for _ in 0..READERS {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            let mut rng = SmallRng::from_seed(make_seed().to_le_bytes());
            for _ in 0..5000 {
                let key = rng.gen_range(0, N);
                if let Some(node) = tree.find(&key) {
                    // node may be gone by now, that is not an error.
                    tree.get(node);
                }
                if let (Some(lo), Some(hi)) = (tree.min(), tree.max()) {
                    assert!(lo <= hi);
                }
                assert!(tree.len() <= N as usize);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(tree.len(), (N / 2) as usize);
    assert!(tree.validate().is_ok());
    let tree = Arc::try_unwrap(tree).ok().unwrap();
    assert_eq!(sorted(&tree), (0..N).filter(|k| k % 2 == 0).collect::<Vec<i64>>());
}

#[test]
fn test_concurrent_rb_blocking() {
    do_concurrent::<RedBlack, BlockingLock>();
}

#[test]
fn test_concurrent_avl_spin() {
    do_concurrent::<Avl, SpinLock>();
}

include!("./ref_test.rs");
