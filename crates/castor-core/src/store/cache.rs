//! Cache of decompressed triple leaf pages.
//!
//! Leaf pages hold delta-compressed triples. Decoding is front-loaded:
//! a fetched page is decoded once into a cache line and then served from
//! an LRU of fixed capacity. Lines are pinned by handing out `Arc`
//! clones; an evicted line stays alive as long as an iterator holds it.
//!
//! ## Delta stream
//!
//! The first record of a page is stored raw. Every following record
//! starts with one header byte:
//!
//! - `0` terminates the page.
//! - `1..=127` is a small delta applied to the trailing component(s).
//! - `128..=252` selects, arithmetically, which component receives an
//!   explicit delta, the delta's byte width in `{1,2,3,4}`, and the byte
//!   widths of the lower components being restarted (width `0` meaning
//!   "reset to 1" or "no payload").

use std::sync::Arc;

use castor_common::Triple;
use parking_lot::Mutex;

use super::btree::NodeFlags;
use super::page::{Cursor, PageReader};

/// Payload layout of a triple leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// Full triples in one of the three orderings.
    Full,
    /// `(a, b, count)` records; count of triples sharing the 2-prefix.
    Aggregated,
    /// `(a, count)` records; count of triples sharing the 1-prefix.
    FullyAggregated,
}

/// A decoded leaf page.
#[derive(Debug)]
pub struct DecodedLeaf {
    /// Page number of this line.
    pub page: u32,
    /// Whether this is the first leaf of its chain.
    pub first: bool,
    /// Whether this is the last leaf of its chain.
    pub last: bool,
    /// Decoded records. Aggregated kinds carry their count in the
    /// trailing used component.
    pub triples: Vec<Triple>,
}

impl DecodedLeaf {
    /// Index of the first record that is not less than `key` under
    /// `cmp`, or `triples.len()`.
    pub fn lower_bound(&self, key: &Triple, cmp: impl Fn(&Triple, &Triple) -> std::cmp::Ordering) -> usize {
        self.triples.partition_point(|t| cmp(t, key) == std::cmp::Ordering::Less)
    }

    /// Index of the first record strictly greater than `key` under
    /// `cmp`, or `triples.len()`.
    pub fn upper_bound(&self, key: &Triple, cmp: impl Fn(&Triple, &Triple) -> std::cmp::Ordering) -> usize {
        self.triples.partition_point(|t| cmp(t, key) != std::cmp::Ordering::Greater)
    }
}

/// Default number of cache lines.
pub const DEFAULT_CAPACITY: usize = 100;

struct CacheInner {
    /// Decoded lines keyed by page number.
    map: hashbrown::HashMap<u32, Arc<DecodedLeaf>>,
    /// Pages in most-recently-used-first order.
    lru: Vec<u32>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

/// LRU cache of decoded triple leaf pages.
pub struct TripleCache {
    inner: Mutex<CacheInner>,
}

impl TripleCache {
    /// A cache holding up to `capacity` decoded pages.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: hashbrown::HashMap::with_capacity(capacity),
                lru: Vec::with_capacity(capacity),
                capacity: capacity.max(1),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Fetch and pin the decoded form of `page`.
    pub fn fetch(&self, db: &PageReader, page: u32, kind: LeafKind) -> Arc<DecodedLeaf> {
        debug_assert!(page > 0);
        let mut inner = self.inner.lock();
        if let Some(line) = inner.map.get(&page).cloned() {
            inner.hits += 1;
            if inner.lru.first() != Some(&page) {
                inner.lru.retain(|&p| p != page);
                inner.lru.insert(0, page);
            }
            return line;
        }
        inner.misses += 1;

        let line = Arc::new(decode_page(db, page, kind));
        if inner.lru.len() >= inner.capacity {
            if let Some(evicted) = inner.lru.pop() {
                inner.map.remove(&evicted);
            }
        }
        inner.map.insert(page, line.clone());
        inner.lru.insert(0, page);
        line
    }

    /// Read the chain flags and first key of a leaf without decoding it.
    pub fn peek(&self, db: &PageReader, page: u32) -> (bool, bool, Triple) {
        let mut cur = db.page(page);
        let flags = NodeFlags(cur.read_u32());
        debug_assert!(!flags.is_inner());
        let key = Triple::new(cur.read_u32(), cur.read_u32(), cur.read_u32());
        (flags.is_first_leaf(), flags.is_last_leaf(), key)
    }

    /// Number of cache hits so far.
    pub fn hits(&self) -> u64 {
        self.inner.lock().hits
    }

    /// Number of cache misses so far.
    pub fn misses(&self) -> u64 {
        self.inner.lock().misses
    }
}

fn decode_page(db: &PageReader, page: u32, kind: LeafKind) -> DecodedLeaf {
    let mut cur = db.page(page);
    let end = db.page_end(&cur);
    let flags = NodeFlags(cur.read_u32());
    debug_assert!(!flags.is_inner());
    let triples = match kind {
        LeafKind::Full => decode_full(&mut cur, end),
        LeafKind::Aggregated => decode_aggregated(&mut cur, end),
        LeafKind::FullyAggregated => decode_fully_aggregated(&mut cur, end),
    };
    DecodedLeaf {
        page,
        first: flags.is_first_leaf(),
        last: flags.is_last_leaf(),
        triples,
    }
}

fn decode_full(cur: &mut Cursor<'_>, end: usize) -> Vec<Triple> {
    let mut out = Vec::new();
    let mut t = Triple::new(cur.read_u32(), cur.read_u32(), cur.read_u32());
    out.push(t);
    while cur.offset() < end {
        let header = cur.read_u8() as u32;
        if header == 0 {
            break;
        }
        if header < 0x80 {
            // small gap in the last component
            t[2] += header;
        } else {
            let h = header - 0x80;
            if h <= 4 {
                t[2] += cur.read_delta(h as usize) + 128;
            } else if h <= 24 {
                let j = h - 5;
                let w1 = (j / 5 + 1) as usize;
                let w2 = (j % 5) as usize;
                t[1] += cur.read_delta(w1);
                t[2] = cur.read_delta(w2) + 1;
            } else {
                let j = h - 25;
                let w0 = (j / 25 + 1) as usize;
                let w1 = (j % 25 / 5) as usize;
                let w2 = (j % 5) as usize;
                t[0] += cur.read_delta(w0);
                t[1] = cur.read_delta(w1) + 1;
                t[2] = cur.read_delta(w2) + 1;
            }
        }
        out.push(t);
    }
    out
}

fn decode_aggregated(cur: &mut Cursor<'_>, end: usize) -> Vec<Triple> {
    let mut out = Vec::new();
    let mut t = Triple::new(cur.read_u32(), cur.read_u32(), cur.read_u32());
    out.push(t);
    while cur.offset() < end {
        let header = cur.read_u8() as u32;
        if header == 0 {
            break;
        }
        if header < 0x80 {
            // small gap on the second component, count packed on top
            t[1] += header & 31;
            t[2] = (header >> 5) + 1;
        } else {
            let h = header - 0x80;
            if h <= 24 {
                let w1 = (h / 5) as usize;
                let w2 = (h % 5) as usize;
                t[1] += cur.read_delta(w1) + 1;
                t[2] = cur.read_delta(w2) + 1;
            } else {
                let j = h - 25;
                let w0 = (j / 25 + 1) as usize;
                let w1 = (j % 25 / 5) as usize;
                let w2 = (j % 5) as usize;
                t[0] += cur.read_delta(w0);
                t[1] = cur.read_delta(w1) + 1;
                t[2] = cur.read_delta(w2) + 1;
            }
        }
        out.push(t);
    }
    out
}

fn decode_fully_aggregated(cur: &mut Cursor<'_>, end: usize) -> Vec<Triple> {
    let mut out = Vec::new();
    let mut t = Triple::new(cur.read_u32(), cur.read_u32(), 0);
    out.push(t);
    while cur.offset() < end {
        let header = cur.read_u8() as u32;
        if header == 0 {
            break;
        }
        if header < 0x80 {
            // small gap on the first component, count packed on top
            t[0] += header & 15;
            t[1] = (header >> 4) + 1;
        } else {
            let h = header - 0x80;
            let w0 = (h / 5) as usize;
            let w1 = (h % 5) as usize;
            t[0] += cur.read_delta(w0) + 1;
            t[1] = cur.read_delta(w1) + 1;
        }
        out.push(t);
    }
    out
}
