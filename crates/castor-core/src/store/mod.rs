//! Read path of the on-disk triple store.
//!
//! A store file holds, in fixed 16 KiB pages: the raw triple table,
//! delta-compressed triple leaves in three orderings (SPO, POS, OSP) with
//! B+-tree indexes, aggregated and fully-aggregated count indexes, the
//! string and value dictionaries with hash indexes, and the
//! equivalence-class bitmap.
//!
//! The triple encoding is modeled after RDF-3x.

pub mod btree;
pub mod builder;
pub mod cache;
pub mod page;

use std::path::Path;
use std::sync::Arc;

use castor_common::term::{valid_id, UNKNOWN_ID};
use castor_common::{
    Category, Error, NumCategory, Result, Str, StringId, Triple, TripleOrder, Value, ValueId,
    ValueRange,
};
use tracing::debug;

use btree::{AggregatedKey, BTree, FullyAggregatedKey, HashTree, TripleKey};
use cache::{DecodedLeaf, LeafKind, TripleCache};
use page::{PageReader, PAGE_SIZE};

/// Magic number at the start of every store file.
pub const MAGIC: [u8; 10] = [0xd0, 0xd4, 0xc5, 0xd8, b'C', b'a', b's', b't', b'o', b'r'];

/// Store format version understood by this build.
pub const FORMAT_VERSION: u32 = 11;

/// Size of one serialized value record.
pub const VALUE_RECORD_SIZE: usize = 20;

/// Tuning knobs for opening a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Number of decoded leaf pages kept in the triple cache.
    pub cache_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            cache_capacity: cache::DEFAULT_CAPACITY,
        }
    }
}

struct OrderingInfo {
    index: BTree<TripleKey>,
    aggregated: BTree<AggregatedKey>,
}

struct StringsInfo {
    count: u32,
    table: usize,
    map: usize,
    index: HashTree,
}

struct ValuesInfo {
    count: u32,
    table: usize,
    index: HashTree,
    eq_classes: usize,
    /// First id of each category, closed by a sentinel past the last.
    categories: [ValueId; Category::COUNT + 1],
}

/// Read-only triple and dictionary store.
pub struct Store {
    db: PageReader,
    triples_total: u32,
    triples_table: usize,
    orderings: [OrderingInfo; 3],
    fully_aggregated: [BTree<FullyAggregatedKey>; 3],
    strings: StringsInfo,
    values: ValuesInfo,
    cache: TripleCache,
}

impl Store {
    /// Open the store at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Self::open_with(path, &StoreOptions::default())
    }

    /// Open the store at `path`.
    pub fn open_with(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let db = PageReader::open(path)?;
        let mut cur = db.page(0);

        if cur.read_bytes(MAGIC.len()) != MAGIC {
            return Err(Error::BadMagic);
        }
        let version = cur.read_u32();
        if version != FORMAT_VERSION {
            return Err(Error::BadVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }

        let triples_total = cur.read_u32();
        let triples_table = cur.read_u32() as usize * PAGE_SIZE;

        let orderings = read_orderings(&mut cur);
        let fully_aggregated =
            [0, 1, 2].map(|_| BTree::<FullyAggregatedKey>::new(cur.read_u32()));

        let strings_count = cur.read_u32();
        let strings_table = cur.read_u32() as usize * PAGE_SIZE;
        let strings_map = cur.read_u32() as usize * PAGE_SIZE;
        let strings_index = HashTree::new(cur.read_u32(), 8);

        let values_table = cur.read_u32() as usize * PAGE_SIZE;
        let values_index = HashTree::new(cur.read_u32(), 4);
        let eq_classes = cur.read_u32() as usize * PAGE_SIZE;
        let mut categories = [0u32; Category::COUNT + 1];
        for c in &mut categories {
            *c = cur.read_u32();
        }
        let values_count = categories[Category::COUNT] - 1;

        debug!(
            triples = triples_total,
            values = values_count,
            strings = strings_count,
            "opened store"
        );

        Ok(Arc::new(Self {
            db,
            triples_total,
            triples_table,
            orderings,
            fully_aggregated,
            strings: StringsInfo {
                count: strings_count,
                table: strings_table,
                map: strings_map,
                index: strings_index,
            },
            values: ValuesInfo {
                count: values_count,
                table: values_table,
                index: values_index,
                eq_classes,
                categories,
            },
            cache: TripleCache::new(options.cache_capacity),
        }))
    }

    /// Number of strings in the store; ids run `1..=strings_count`.
    pub fn strings_count(&self) -> u32 {
        self.strings.count
    }

    /// Number of values in the store; ids run `1..=values_count`.
    pub fn values_count(&self) -> u32 {
        self.values.count
    }

    /// Total number of triples in the store.
    pub fn triples_total(&self) -> u32 {
        self.triples_total
    }

    /// Triple cache hit counter.
    pub fn cache_hits(&self) -> u64 {
        self.cache.hits()
    }

    /// Triple cache miss counter.
    pub fn cache_misses(&self) -> u64 {
        self.cache.misses()
    }

    /// Range of ids of one category.
    pub fn range(&self, cat: Category) -> ValueRange {
        let i = cat.as_u16() as usize;
        ValueRange::new(self.values.categories[i], self.values.categories[i + 1] - 1)
    }

    /// Range of ids spanning the categories `from..=to`.
    pub fn range_between(&self, from: Category, to: Category) -> ValueRange {
        ValueRange::new(
            self.values.categories[from.as_u16() as usize],
            self.values.categories[to.as_u16() as usize + 1] - 1,
        )
    }

    /// Category of a value id.
    pub fn category(&self, id: ValueId) -> Category {
        debug_assert!(id >= 1 && id <= self.values.count);
        let cats = &self.values.categories;
        let at = cats.partition_point(|&first| first <= id);
        Category::ALL[at - 1]
    }

    /// Read the value record for `id`.
    pub fn lookup_value(&self, id: ValueId) -> Value {
        debug_assert!(id >= 1 && id <= self.values.count);
        let mut cur = self
            .db
            .at(self.values.table + (id as usize - 1) * VALUE_RECORD_SIZE);
        let rec_id = cur.read_u32();
        debug_assert_eq!(rec_id, id);
        let category = Category::from_u16(cur.read_u16());
        let num_raw = cur.read_u16();
        let datatype_id = cur.read_u32();
        let tag_id = cur.read_u32();
        let lexical_id = cur.read_u32();
        let num_category = if category == Some(Category::Numeric) {
            NumCategory::from_u16(num_raw)
        } else {
            None
        };
        Value {
            id: rec_id,
            category,
            num_category,
            lexical: Str::from_id(lexical_id),
            datatype_id,
            tag: if tag_id == 0 {
                Str::null()
            } else {
                Str::from_id(tag_id)
            },
            interpreted: None,
            numapprox: castor_common::NumRange::empty(),
        }
    }

    /// Read the string with the given id through the id→offset map.
    pub fn lookup_string(&self, id: StringId) -> Str {
        debug_assert!(id >= 1 && id <= self.strings.count);
        let mut map_cur = self.db.at(self.strings.map + (id as usize - 1) * 8);
        let offset = map_cur.read_u64() as usize;
        self.read_string_at(offset)
    }

    fn read_string_at(&self, offset: usize) -> Str {
        let mut cur = self.db.at(self.strings.table + offset);
        let id = cur.read_u32();
        cur.read_u32(); // hash
        let len = cur.read_u32() as usize;
        let bytes = cur.read_bytes(len);
        Str::resolved(id, String::from_utf8_lossy(bytes).into_owned())
    }

    /// Make an indirect string direct by reading its bytes.
    pub fn ensure_direct(&self, s: &mut Str) {
        if !s.is_direct() && valid_id(s.id()) {
            *s = self.lookup_string(s.id());
        }
    }

    /// Make the lexical and tag strings of a value direct.
    pub fn ensure_direct_strings(&self, val: &mut Value) {
        self.ensure_direct(&mut val.lexical);
        self.ensure_direct(&mut val.tag);
    }

    /// Interpret a typed literal, reading its lexical if needed.
    pub fn ensure_interpreted(&self, val: &mut Value) {
        if val.interpreted.is_some() {
            return;
        }
        self.ensure_direct(&mut val.lexical);
        val.interpret();
    }

    /// Resolve the id of a direct string, setting it to `0` if absent.
    pub fn resolve_str(&self, s: &mut Str) {
        if s.is_resolved() {
            return;
        }
        let hash = s.hash();
        for offset in self.strings.index.lookup(&self.db, hash) {
            let cand = self.read_string_at(offset as usize);
            if cand.text() == s.text() {
                s.set_id(cand.id());
                return;
            }
        }
        s.set_id(0);
    }

    /// Resolve the id of a value, setting it to `0` if no such term is
    /// in the store.
    pub fn resolve(&self, val: &mut Value) {
        if val.id != UNKNOWN_ID {
            return;
        }
        val.ensure_lexical();
        if val.is_typed() && val.tag.is_null() && valid_id(val.datatype_id) {
            let dt = self.lookup_value(val.datatype_id);
            let mut tag = dt.lexical;
            self.ensure_direct(&mut tag);
            val.tag = tag;
        }
        self.ensure_direct_strings(val);

        let hash = val.hash();
        for id in self.values.index.lookup(&self.db, hash) {
            let mut cand = self.lookup_value(id as ValueId);
            self.ensure_direct_strings(&mut cand);
            if cand.same_term(val) {
                val.id = cand.id;
                return;
            }
        }
        val.id = 0;
    }

    /// Equivalence class of a value id.
    ///
    /// Outside the `[Boolean, Other)` id window values compare on their
    /// lexical form only, so the class is always the singleton `{id}`.
    pub fn eq_class(&self, id: ValueId) -> ValueRange {
        debug_assert!(id <= self.values.count);
        let window_lo = self.values.categories[Category::Boolean.as_u16() as usize];
        let window_hi = self.values.categories[Category::Other.as_u16() as usize];
        if id < window_lo || id >= window_hi {
            return ValueRange::new(id, id);
        }

        let word = |i: usize| -> u32 {
            let mut cur = self.db.at(self.values.eq_classes + i * 4);
            cur.read_u32()
        };

        // the bit for id sits at 0-based index id-1; a set bit marks the
        // start of a class
        let b = id - 1;
        let from = {
            let mut wi = (b / 32) as usize;
            let bit = b % 32;
            let w = word(wi);
            if w & (1 << bit) != 0 {
                id
            } else {
                let mut w = w & ((1u32 << bit) - 1);
                while w == 0 {
                    wi -= 1;
                    w = word(wi);
                }
                let p = 31 - w.leading_zeros();
                wi as u32 * 32 + p + 1
            }
        };
        let to = {
            let nb = id; // 0-based index of id+1
            let mut wi = (nb / 32) as usize;
            let bit = nb % 32;
            let mut w = word(wi) & (u32::MAX << bit);
            while w == 0 {
                wi += 1;
                w = word(wi);
            }
            let p = w.trailing_zeros();
            wi as u32 * 32 + p
        };
        ValueRange::new(from, to)
    }

    /// Equivalence class of an arbitrary value.
    ///
    /// For a value without a store id this binary-searches the whole
    /// values table; if no equivalent value exists the returned range is
    /// empty but still brackets the insertion point, so that
    /// `x.id < from ⇔ x < val` and `x.id > to ⇔ x > val` under SPARQL
    /// compare.
    pub fn eq_class_of(&self, val: &Value) -> ValueRange {
        if valid_id(val.id) {
            return self.eq_class(val.id);
        }
        let mut left: ValueId = 1;
        let mut right: ValueId = self.values.count + 1;
        while left != right {
            let middle = left + (right - left) / 2;
            let mut mval = self.lookup_value(middle);
            self.ensure_direct_strings(&mut mval);
            self.ensure_interpreted(&mut mval);
            if mval.xpath_compare(val) == Some(std::cmp::Ordering::Equal) {
                return self.eq_class(middle);
            }
            if mval.total_lt(val) {
                left = middle + 1;
            } else {
                right = middle;
            }
        }
        ValueRange::new(left, left - 1)
    }

    /// Number of triples matching a pattern whose zero components are
    /// wildcards.
    pub fn triples_count(&self, pattern: Triple) -> u32 {
        let wildcards =
            (pattern[0] == 0) as u8 + (pattern[1] == 0) as u8 + (pattern[2] == 0) as u8;
        match wildcards {
            0 => {
                let mut q = self.triple_range(pattern, pattern, None);
                u32::from(q.next().is_some())
            }
            1 => {
                let order = if pattern[0] == 0 {
                    TripleOrder::Pos
                } else if pattern[1] == 0 {
                    TripleOrder::Osp
                } else {
                    TripleOrder::Spo
                };
                let key = pattern.to_ordered(order);
                let page = self.orderings[order.index()]
                    .aggregated
                    .lookup_leaf(&self.db, &AggregatedKey(key));
                if page == 0 {
                    return 0;
                }
                let line = self.cache.fetch(&self.db, page, LeafKind::Aggregated);
                let at = line.lower_bound(&key, Triple::cmp_prefix2);
                match line.triples.get(at) {
                    Some(t) if t.cmp_prefix2(&key) == std::cmp::Ordering::Equal => t[2],
                    _ => 0,
                }
            }
            2 => {
                let (component, order) = if pattern[0] != 0 {
                    (0, TripleOrder::Spo)
                } else if pattern[1] != 0 {
                    (1, TripleOrder::Pos)
                } else {
                    (2, TripleOrder::Osp)
                };
                let key = pattern.to_ordered(order);
                let page = self.fully_aggregated[component]
                    .lookup_leaf(&self.db, &FullyAggregatedKey(key));
                if page == 0 {
                    return 0;
                }
                let line = self.cache.fetch(&self.db, page, LeafKind::FullyAggregated);
                let at = line.lower_bound(&key, Triple::cmp_prefix1);
                match line.triples.get(at) {
                    Some(t) if t[0] == key[0] => t[1],
                    _ => 0,
                }
            }
            _ => self.triples_total,
        }
    }

    /// Triple at `index` in the raw triple table.
    pub fn triple_at(&self, index: u32) -> Triple {
        debug_assert!(index < self.triples_total);
        let mut cur = self.db.at(self.triples_table + index as usize * 12);
        Triple::new(cur.read_u32(), cur.read_u32(), cur.read_u32())
    }

    /// Stream all triples `t` with `from <= t <= to` component-wise in
    /// the chosen ordering. With `from > to` (component-wise) the range
    /// iterates backward. Without an explicit order, the ordering that
    /// puts the non-singleton components last is chosen.
    pub fn triple_range(
        &self,
        from: Triple,
        to: Triple,
        order: Option<TripleOrder>,
    ) -> TripleRange<'_> {
        TripleRange::new(self, from, to, order)
    }
}

fn read_orderings(cur: &mut page::Cursor<'_>) -> [OrderingInfo; 3] {
    let mut read_one = || {
        let _leaf_begin = cur.read_u32();
        let _leaf_end = cur.read_u32();
        let index = BTree::new(cur.read_u32());
        let aggregated = BTree::new(cur.read_u32());
        OrderingInfo { index, aggregated }
    };
    [read_one(), read_one(), read_one()]
}

/// Streaming iterator over an ordered triple range.
pub struct TripleRange<'s> {
    store: &'s Store,
    limit: Triple,
    order: TripleOrder,
    direction: i64,
    next_page: u32,
    line: Option<Arc<DecodedLeaf>>,
    idx: i64,
    end: i64,
}

impl<'s> TripleRange<'s> {
    fn new(store: &'s Store, from: Triple, to: Triple, order: Option<TripleOrder>) -> Self {
        let order = order.unwrap_or_else(|| {
            // put the non-singleton component ranges last
            let mask = u8::from(from[0] != to[0])
                | u8::from(from[1] != to[1]) << 1
                | u8::from(from[2] != to[2]) << 2;
            match mask {
                0 | 1 | 5 | 7 => TripleOrder::Pos,
                4 | 6 => TripleOrder::Spo,
                _ => TripleOrder::Osp,
            }
        });

        let key = from.to_ordered(order);
        let limit = to.to_ordered(order);
        let direction: i64 = if to < from { -1 } else { 1 };

        let mut range = Self {
            store,
            limit,
            order,
            direction,
            next_page: 0,
            line: None,
            idx: 0,
            end: 0,
        };

        let mut page = store.orderings[order.index()]
            .index
            .lookup_leaf(&store.db, &TripleKey(key));
        if page == 0 {
            return range;
        }

        if direction < 0 {
            // Searching backward: the found leaf is the first containing
            // keys >= the start point. If even its first key exceeds the
            // start point, step back one leaf and begin at its end.
            let (first, _last, leaf_key) = store.cache.peek(&store.db, page);
            if key < leaf_key {
                if first {
                    return range;
                }
                page -= 1;
                let line = store.cache.fetch(&store.db, page, LeafKind::Full);
                range.next_page = if line.first { 0 } else { page - 1 };
                range.idx = line.triples.len() as i64 - 1;
                range.end = -1;
                range.line = Some(line);
                return range;
            }
        }

        let line = store.cache.fetch(&store.db, page, LeafKind::Full);
        if direction > 0 {
            range.next_page = if line.last { 0 } else { page + 1 };
            range.idx = line.lower_bound(&key, Triple::cmp) as i64;
            range.end = line.triples.len() as i64;
        } else {
            range.next_page = if line.first { 0 } else { page - 1 };
            range.idx = line.upper_bound(&key, Triple::cmp) as i64 - 1;
            range.end = -1;
        }
        if range.idx == range.end {
            range.line = None;
            range.next_page = 0;
        } else {
            range.line = Some(line);
        }
        range
    }

    /// Next triple in the range, in SPO order, or `None` when exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Triple> {
        if self.idx == self.end {
            self.line = None;
            if self.next_page == 0 {
                return None;
            }
            let page = self.next_page;
            let line = self.store.cache.fetch(&self.store.db, page, LeafKind::Full);
            if self.direction > 0 {
                self.next_page = if line.last { 0 } else { page + 1 };
                self.idx = 0;
                self.end = line.triples.len() as i64;
            } else {
                self.next_page = if line.first { 0 } else { page - 1 };
                self.idx = line.triples.len() as i64 - 1;
                self.end = -1;
            }
            self.line = Some(line);
        }
        let line = self.line.as_ref()?;
        let t = line.triples[self.idx as usize];
        if (self.direction > 0 && self.limit < t) || (self.direction < 0 && t < self.limit) {
            return None;
        }
        self.idx += self.direction;
        Some(t.to_spo(self.order))
    }
}
