//! Disk-backed B+-tree and hash-tree lookups.
//!
//! Nodes start with a flag word. Inner nodes (high bit set) hold a count
//! of `(key, child page)` entries; the child contains keys up to and
//! including its entry key. Leaves (high bit clear) flag the first and
//! last leaf of the chain in their low bits. Page 0 never holds a node,
//! so it doubles as the "not found" result.

use castor_common::Triple;

use super::page::{Cursor, PageReader};

/// Flag word of a B+-tree node.
#[derive(Clone, Copy)]
pub struct NodeFlags(pub u32);

impl NodeFlags {
    /// Bit marking an inner node.
    pub const INNER: u32 = 1 << 31;
    /// Bit marking the first leaf of a chain.
    pub const FIRST_LEAF: u32 = 1 << 0;
    /// Bit marking the last leaf of a chain.
    pub const LAST_LEAF: u32 = 1 << 1;

    /// Whether the node is an inner node.
    pub fn is_inner(self) -> bool {
        self.0 & Self::INNER != 0
    }

    /// Whether the leaf is the first of its chain.
    pub fn is_first_leaf(self) -> bool {
        self.0 & Self::FIRST_LEAF != 0
    }

    /// Whether the leaf is the last of its chain.
    pub fn is_last_leaf(self) -> bool {
        self.0 & Self::LAST_LEAF != 0
    }

    /// Child count of an inner node.
    pub fn count(self) -> u32 {
        self.0 & !Self::INNER
    }
}

/// Keys stored in B+-tree inner nodes.
pub trait IndexKey: Copy {
    /// Serialized size of the key in bytes.
    const SIZE: usize;

    /// Read a key at the cursor.
    fn read(cur: &mut Cursor<'_>) -> Self;

    /// Strict order between keys.
    fn less(&self, o: &Self) -> bool;
}

/// Full triple key: all three components.
#[derive(Clone, Copy)]
pub struct TripleKey(pub Triple);

impl IndexKey for TripleKey {
    const SIZE: usize = 12;

    fn read(cur: &mut Cursor<'_>) -> Self {
        Self(Triple::new(cur.read_u32(), cur.read_u32(), cur.read_u32()))
    }

    fn less(&self, o: &Self) -> bool {
        self.0 < o.0
    }
}

/// Aggregated triple key: the first two components (the third slot holds
/// a count and is ignored by the order).
#[derive(Clone, Copy)]
pub struct AggregatedKey(pub Triple);

impl IndexKey for AggregatedKey {
    const SIZE: usize = 8;

    fn read(cur: &mut Cursor<'_>) -> Self {
        Self(Triple::new(cur.read_u32(), cur.read_u32(), 0))
    }

    fn less(&self, o: &Self) -> bool {
        self.0.cmp_prefix2(&o.0) == std::cmp::Ordering::Less
    }
}

/// Fully-aggregated triple key: the first component only.
#[derive(Clone, Copy)]
pub struct FullyAggregatedKey(pub Triple);

impl IndexKey for FullyAggregatedKey {
    const SIZE: usize = 4;

    fn read(cur: &mut Cursor<'_>) -> Self {
        Self(Triple::new(cur.read_u32(), 0, 0))
    }

    fn less(&self, o: &Self) -> bool {
        self.0.cmp_prefix1(&o.0) == std::cmp::Ordering::Less
    }
}

/// 32-bit hash key for the dictionary hash trees.
#[derive(Clone, Copy)]
pub struct HashKey(pub u32);

impl IndexKey for HashKey {
    const SIZE: usize = 4;

    fn read(cur: &mut Cursor<'_>) -> Self {
        Self(cur.read_u32())
    }

    fn less(&self, o: &Self) -> bool {
        self.0 < o.0
    }
}

/// A B+-tree rooted at a fixed page.
pub struct BTree<K> {
    root: u32,
    _key: std::marker::PhantomData<K>,
}

impl<K: IndexKey> BTree<K> {
    /// A tree rooted at `root`.
    pub fn new(root: u32) -> Self {
        Self {
            root,
            _key: std::marker::PhantomData,
        }
    }

    /// Page of the first leaf containing keys `>= key`, or 0 if every
    /// key in the tree is smaller.
    pub fn lookup_leaf(&self, db: &PageReader, key: &K) -> u32 {
        let mut page = self.root;
        loop {
            let mut cur = db.page(page);
            let flags = NodeFlags(cur.read_u32());
            if !flags.is_inner() {
                return page;
            }
            let entry_size = K::SIZE + 4;
            let entries = cur;
            let mut left = 0u32;
            let mut right = flags.count();
            let mut next = 0u32;
            while left != right {
                let middle = (left + right) / 2;
                let mut mid_cur = entries;
                mid_cur.skip(middle as usize * entry_size);
                let mid_key = K::read(&mut mid_cur);
                if mid_key.less(key) {
                    left = middle + 1;
                } else {
                    let prev_less = middle == 0 || {
                        let mut prev_cur = entries;
                        prev_cur.skip((middle - 1) as usize * entry_size);
                        K::read(&mut prev_cur).less(key)
                    };
                    if prev_less {
                        next = mid_cur.read_u32();
                        break;
                    }
                    right = middle;
                }
            }
            if left == right {
                return 0;
            }
            page = next;
        }
    }
}

/// A hash tree: B+-tree over hash keys whose leaves hold sorted
/// `(hash, value)` records behind a count word.
pub struct HashTree {
    tree: BTree<HashKey>,
    /// Byte width of the value part of each record.
    value_size: usize,
}

impl HashTree {
    /// A hash tree rooted at `root` with the given record value width.
    pub fn new(root: u32, value_size: usize) -> Self {
        Self {
            tree: BTree::new(root),
            value_size,
        }
    }

    /// All values recorded under `hash` (the collision list).
    pub fn lookup(&self, db: &PageReader, hash: u32) -> Vec<u64> {
        let page = self.tree.lookup_leaf(db, &HashKey(hash));
        if page == 0 {
            return Vec::new();
        }
        let mut cur = db.page(page);
        cur.read_u32(); // flags
        let count = cur.read_u32() as usize;
        let record = 4 + self.value_size;
        let base = cur;

        // binary search for any entry with this hash
        let mut left = 0usize;
        let mut right = count;
        let mut found = None;
        while left != right {
            let middle = (left + right) / 2;
            let h = base.peek_u32(middle * record);
            if h < hash {
                left = middle + 1;
            } else if h > hash {
                right = middle;
            } else {
                found = Some(middle);
                break;
            }
        }
        let Some(mut at) = found else {
            return Vec::new();
        };
        while at > 0 && base.peek_u32((at - 1) * record) == hash {
            at -= 1;
        }

        let mut out = Vec::new();
        while at < count && base.peek_u32(at * record) == hash {
            let mut entry = base;
            entry.skip(at * record + 4);
            let value = match self.value_size {
                8 => entry.read_u64(),
                _ => u64::from(entry.read_u32()),
            };
            out.push(value);
            at += 1;
        }
        out
    }
}
