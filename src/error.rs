use std::{error, fmt, result};

/// Error enumerates over all possible errors that this package
/// shall return.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Allocator refused to grow backing storage, either node arena or
    /// cursor stack. The String component names the failed request.
    OutOfMemory(String),
    /// Fatal case, root of a red-black tree is red.
    RedRoot,
    /// Fatal case, red node with a red child.
    ConsecutiveReds,
    /// Fatal case, number of blacks differ between left and right child.
    /// The String component of this variant can be used for debugging.
    UnbalancedBlacks(String),
    /// Fatal case, child's parent link does not point back to its parent.
    BrokenParent(String),
    /// Fatal case, AVL balance factor outside [-1, 1].
    Unbalanced(String),
    /// Fatal case, AVL node's stored height is stale.
    BadHeight(String),
    /// Fatal case, index entries are not in sort-order.
    SortError(String),
    /// Fatal case, (counted, expected) number of entries do not match.
    CountMismatch(usize, usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;

        match self {
            OutOfMemory(msg) => write!(f, "out of memory: {}", msg),
            RedRoot => write!(f, "root node is red"),
            ConsecutiveReds => write!(f, "consecutive red nodes"),
            UnbalancedBlacks(msg) => write!(f, "unbalanced blacks, {}", msg),
            BrokenParent(msg) => write!(f, "broken parent link, {}", msg),
            Unbalanced(msg) => write!(f, "unbalanced subtree, {}", msg),
            BadHeight(msg) => write!(f, "stale height, {}", msg),
            SortError(msg) => write!(f, "entries out of order, {}", msg),
            CountMismatch(n, m) => write!(f, "counted {} entries, expected {}", n, m),
        }
    }
}

impl error::Error for Error {}

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;
