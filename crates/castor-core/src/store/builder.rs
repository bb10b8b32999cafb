//! Bulk-load writer producing a complete store file.
//!
//! The builder takes RDF term triples, assigns dictionary ids using the
//! global total order, computes the equivalence-class bitmap, and emits
//! every table and index the read path consumes: delta-compressed leaf
//! chains for the three orderings, aggregated and fully-aggregated count
//! indexes, hash indexes, and the header page.

use std::cmp::Ordering;
use std::io::Write;
use std::path::Path;

use castor_common::{
    Category, Error, Result, Triple, TripleOrder, Value, ValueId, ValueRange,
};

use super::btree::NodeFlags;
use super::page::PAGE_SIZE;
use super::{FORMAT_VERSION, MAGIC, VALUE_RECORD_SIZE};

/// Collects triples and writes them out as a store file.
#[derive(Default)]
pub struct StoreBuilder {
    triples: Vec<[Value; 3]>,
}

impl StoreBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one triple of terms.
    pub fn add(&mut self, subject: Value, predicate: Value, object: Value) {
        self.triples.push([subject, predicate, object]);
    }

    /// Write the store file at `path`.
    pub fn write(self, path: impl AsRef<Path>) -> Result<()> {
        if self.triples.is_empty() {
            return Err(Error::Build("cannot write a store without triples".into()));
        }

        // unique terms, interpreted so the total order is decidable
        let mut values: Vec<Value> = Vec::new();
        let mut seen: hashbrown::HashMap<(u16, u16, String, String), usize> =
            hashbrown::HashMap::new();
        for t in &self.triples {
            for term in t {
                let mut v = term.clone();
                v.ensure_lexical();
                v.interpret();
                let key = term_key(&v);
                seen.entry(key).or_insert_with(|| {
                    values.push(v);
                    values.len() - 1
                });
            }
        }

        values.sort_by(|a, b| {
            if a.total_lt(b) {
                Ordering::Less
            } else if b.total_lt(a) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });

        // id assignment: first id of each category, closed by a sentinel
        let mut categories = [0u32; Category::COUNT + 1];
        {
            let mut id = 1u32;
            let mut vi = 0usize;
            for (ci, cat) in Category::ALL.iter().enumerate() {
                categories[ci] = id;
                while vi < values.len() && values[vi].category == Some(*cat) {
                    id += 1;
                    vi += 1;
                }
            }
            categories[Category::COUNT] = id;
        }
        let values_count = values.len() as u32;

        // string dictionary
        let mut strings: Vec<String> = Vec::new();
        let mut string_ids: hashbrown::HashMap<String, u32> = hashbrown::HashMap::new();
        for v in &values {
            for text in [v.lexical.text_opt(), v.tag.text_opt()].into_iter().flatten() {
                string_ids.entry(text.to_string()).or_insert(0);
            }
        }
        let mut sorted: Vec<String> = string_ids.keys().cloned().collect();
        sorted.sort();
        for (i, s) in sorted.iter().enumerate() {
            string_ids.insert(s.clone(), i as u32 + 1);
            strings.push(s.clone());
        }

        // id of every term, for triple encoding and datatype references
        let mut term_ids: hashbrown::HashMap<(u16, u16, String, String), ValueId> =
            hashbrown::HashMap::new();
        let mut uri_ids: hashbrown::HashMap<String, ValueId> = hashbrown::HashMap::new();
        for (i, v) in values.iter().enumerate() {
            term_ids.insert(term_key(v), i as u32 + 1);
            if v.is_uri() {
                uri_ids.insert(v.lexical.text().to_string(), i as u32 + 1);
            }
        }

        // triples as sorted unique id tuples
        let mut triples: Vec<Triple> = self
            .triples
            .iter()
            .map(|t| {
                let id = |term: &Value| {
                    let mut v = term.clone();
                    v.ensure_lexical();
                    v.interpret();
                    term_ids[&term_key(&v)]
                };
                Triple::new(id(&t[0]), id(&t[1]), id(&t[2]))
            })
            .collect();
        triples.sort();
        triples.dedup();

        // equivalence-class bitmap: bit i-1 set iff id i starts a class,
        // plus a closing sentinel bit
        let window = ValueRange::new(
            categories[Category::Boolean.as_u16() as usize],
            categories[Category::Other.as_u16() as usize] - 1,
        );
        let mut bits = vec![false; values.len() + 1];
        for id in 1..=values_count {
            let b = (id - 1) as usize;
            if !window.contains(id) || id == window.from {
                bits[b] = true;
            } else {
                let prev = &values[b - 1];
                let cur = &values[b];
                bits[b] = prev.category != cur.category
                    || cur.xpath_compare(prev) != Some(Ordering::Equal);
            }
        }
        bits[values.len()] = true;

        // assemble pages
        let mut out = PageWriter::new();

        let mut raw = Vec::with_capacity(triples.len() * 12);
        for t in &triples {
            for c in 0..3 {
                raw.extend_from_slice(&t[c].to_le_bytes());
            }
        }
        let triples_table = out.write_region(&raw);

        let mut ordering_headers = Vec::new();
        let mut ordered_by: Vec<Vec<Triple>> = Vec::new();
        for order in TripleOrder::ALL {
            let mut ordered: Vec<Triple> = triples.iter().map(|t| t.to_ordered(order)).collect();
            ordered.sort();

            let leaves = encode_leaves(&ordered, LeafPayload::Full);
            let (leaf_begin, leaf_end, keys) = out.write_leaves(leaves);
            let index_root = out.write_inner_node(&keys, 12, |t, buf| {
                for c in 0..3 {
                    buf.extend_from_slice(&t[c].to_le_bytes());
                }
            })?;

            let mut aggregated: Vec<Triple> = Vec::new();
            for t in &ordered {
                match aggregated.last_mut() {
                    Some(a) if a[0] == t[0] && a[1] == t[1] => a[2] += 1,
                    _ => aggregated.push(Triple::new(t[0], t[1], 1)),
                }
            }
            let leaves = encode_leaves(&aggregated, LeafPayload::Aggregated);
            let (_, _, keys) = out.write_leaves(leaves);
            let aggregated_root = out.write_inner_node(&keys, 8, |t, buf| {
                buf.extend_from_slice(&t[0].to_le_bytes());
                buf.extend_from_slice(&t[1].to_le_bytes());
            })?;

            ordering_headers.push([leaf_begin, leaf_end, index_root, aggregated_root]);
            ordered_by.push(ordered);
        }

        let mut fully_roots = [0u32; 3];
        for (component, ordered) in ordered_by.iter().enumerate() {
            let mut fully: Vec<Triple> = Vec::new();
            for t in ordered {
                match fully.last_mut() {
                    Some(a) if a[0] == t[0] => a[1] += 1,
                    _ => fully.push(Triple::new(t[0], 1, 0)),
                }
            }
            let leaves = encode_leaves(&fully, LeafPayload::FullyAggregated);
            let (_, _, keys) = out.write_leaves(leaves);
            fully_roots[component] = out.write_inner_node(&keys, 4, |t, buf| {
                buf.extend_from_slice(&t[0].to_le_bytes());
            })?;
        }

        // strings table, id→offset map, hash index
        let mut strings_table = Vec::new();
        let mut offsets = Vec::with_capacity(strings.len());
        for (i, s) in strings.iter().enumerate() {
            offsets.push(strings_table.len() as u64);
            strings_table.extend_from_slice(&(i as u32 + 1).to_le_bytes());
            strings_table.extend_from_slice(&castor_common::hash::hash_bytes(s.as_bytes()).to_le_bytes());
            strings_table.extend_from_slice(&(s.len() as u32).to_le_bytes());
            strings_table.extend_from_slice(s.as_bytes());
            strings_table.push(0);
        }
        let strings_table_page = out.write_region(&strings_table);

        let mut map_bytes = Vec::with_capacity(offsets.len() * 8);
        for off in &offsets {
            map_bytes.extend_from_slice(&off.to_le_bytes());
        }
        let strings_map_page = out.write_region(&map_bytes);

        let mut string_hashes: Vec<(u32, u64)> = strings
            .iter()
            .enumerate()
            .map(|(i, s)| (castor_common::hash::hash_bytes(s.as_bytes()), offsets[i]))
            .collect();
        string_hashes.sort_unstable();
        let strings_hash_root = out.write_hash_tree(&string_hashes, 8)?;

        // values table and hash index
        let mut values_table = Vec::with_capacity(values.len() * VALUE_RECORD_SIZE);
        let mut value_hashes: Vec<(u32, u64)> = Vec::with_capacity(values.len());
        for (i, v) in values.iter().enumerate() {
            let id = i as u32 + 1;
            let datatype_id = if v.is_typed() {
                uri_ids.get(v.tag.text()).copied().unwrap_or(0)
            } else {
                0
            };
            let tag_id = v.tag.text_opt().map_or(0, |t| string_ids[t]);
            let lex_id = string_ids[v.lexical.text()];
            values_table.extend_from_slice(&id.to_le_bytes());
            values_table.extend_from_slice(&v.category.map_or(0, Category::as_u16).to_le_bytes());
            values_table
                .extend_from_slice(&v.num_category.map_or(0u16, |n| n as u16).to_le_bytes());
            values_table.extend_from_slice(&datatype_id.to_le_bytes());
            values_table.extend_from_slice(&tag_id.to_le_bytes());
            values_table.extend_from_slice(&lex_id.to_le_bytes());
            value_hashes.push((v.hash(), u64::from(id)));
        }
        let values_table_page = out.write_region(&values_table);
        value_hashes.sort_unstable();
        let values_hash_root = out.write_hash_tree(&value_hashes, 4)?;

        // equivalence-class bitmap
        let mut bitmap = vec![0u8; (bits.len() + 31) / 32 * 4];
        for (i, &b) in bits.iter().enumerate() {
            if b {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        let eq_page = out.write_region(&bitmap);

        // header
        let header = out.page_mut(0);
        let mut w = ByteWriter::new(header);
        w.bytes(&MAGIC);
        w.u32(FORMAT_VERSION);
        w.u32(triples.len() as u32);
        w.u32(triples_table);
        for h in &ordering_headers {
            for v in h {
                w.u32(*v);
            }
        }
        for r in &fully_roots {
            w.u32(*r);
        }
        w.u32(strings.len() as u32);
        w.u32(strings_table_page);
        w.u32(strings_map_page);
        w.u32(strings_hash_root);
        w.u32(values_table_page);
        w.u32(values_hash_root);
        w.u32(eq_page);
        for c in &categories {
            w.u32(*c);
        }

        let mut file = std::fs::File::create(path)?;
        for p in &out.pages {
            file.write_all(p)?;
        }
        file.flush()?;
        Ok(())
    }
}

fn term_key(v: &Value) -> (u16, u16, String, String) {
    (
        v.category.map_or(u16::MAX, Category::as_u16),
        v.num_category.map_or(u16::MAX, |n| n as u16),
        v.tag.text_opt().unwrap_or("").to_string(),
        v.lexical.text_opt().unwrap_or("").to_string(),
    )
}

/// Sequential little-endian writer over a page buffer.
struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }
}

/// Accumulates fixed-size pages.
struct PageWriter {
    pages: Vec<Vec<u8>>,
}

impl PageWriter {
    fn new() -> Self {
        // page 0 is the header, filled last
        Self {
            pages: vec![vec![0u8; PAGE_SIZE]],
        }
    }

    fn page_mut(&mut self, page: u32) -> &mut [u8] {
        &mut self.pages[page as usize]
    }

    fn push_page(&mut self, data: Vec<u8>) -> u32 {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        self.pages.push(data);
        self.pages.len() as u32 - 1
    }

    /// Write a contiguous byte region across as many pages as needed and
    /// return its first page.
    fn write_region(&mut self, bytes: &[u8]) -> u32 {
        let first = self.pages.len() as u32;
        for chunk in bytes.chunks(PAGE_SIZE) {
            let mut page = chunk.to_vec();
            page.resize(PAGE_SIZE, 0);
            self.pages.push(page);
        }
        if bytes.is_empty() {
            self.pages.push(vec![0u8; PAGE_SIZE]);
        }
        first
    }

    /// Write a leaf chain, patching the first/last flags, and return
    /// `(first page, last page, per-leaf (page, last key))`.
    fn write_leaves(&mut self, leaves: Vec<(Vec<u8>, Triple)>) -> (u32, u32, Vec<(u32, Triple)>) {
        let n = leaves.len();
        let mut keys = Vec::with_capacity(n);
        let mut first_page = 0;
        for (i, (mut data, last_key)) in leaves.into_iter().enumerate() {
            let mut flags = 0u32;
            if i == 0 {
                flags |= NodeFlags::FIRST_LEAF;
            }
            if i == n - 1 {
                flags |= NodeFlags::LAST_LEAF;
            }
            data[0..4].copy_from_slice(&flags.to_le_bytes());
            let page = self.push_page(data);
            if i == 0 {
                first_page = page;
            }
            keys.push((page, last_key));
        }
        let last_page = self.pages.len() as u32 - 1;
        (first_page, last_page, keys)
    }

    /// Write a one-level inner node over the given children.
    fn write_inner_node(
        &mut self,
        children: &[(u32, Triple)],
        key_size: usize,
        write_key: impl Fn(&Triple, &mut Vec<u8>),
    ) -> Result<u32> {
        let entry = key_size + 4;
        if 4 + children.len() * entry > PAGE_SIZE {
            return Err(Error::Build(format!(
                "index with {} leaves exceeds one inner node",
                children.len()
            )));
        }
        let mut data = Vec::with_capacity(PAGE_SIZE);
        data.extend_from_slice(&(NodeFlags::INNER | children.len() as u32).to_le_bytes());
        for (page, key) in children {
            write_key(key, &mut data);
            data.extend_from_slice(&page.to_le_bytes());
        }
        data.resize(PAGE_SIZE, 0);
        Ok(self.push_page(data))
    }

    /// Write hash-tree leaves over sorted `(hash, value)` records and a
    /// root node above them. Collision lists never straddle leaves.
    fn write_hash_tree(&mut self, records: &[(u32, u64)], value_size: usize) -> Result<u32> {
        let record = 4 + value_size;
        let capacity = (PAGE_SIZE - 8) / record;
        let mut leaves: Vec<(Vec<u8>, Triple)> = Vec::new();
        let mut i = 0;
        while i < records.len() {
            let mut end = (i + capacity).min(records.len());
            // do not split a collision list
            while end < records.len() && end > i + 1 && records[end].0 == records[end - 1].0 {
                end -= 1;
            }
            let chunk = &records[i..end];
            let mut data = vec![0u8; 4];
            data.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
            for (hash, value) in chunk {
                data.extend_from_slice(&hash.to_le_bytes());
                match value_size {
                    8 => data.extend_from_slice(&value.to_le_bytes()),
                    _ => data.extend_from_slice(&(*value as u32).to_le_bytes()),
                }
            }
            data.resize(PAGE_SIZE, 0);
            let last_hash = chunk.last().map_or(0, |r| r.0);
            leaves.push((data, Triple::new(last_hash, 0, 0)));
            i = end;
        }
        if leaves.is_empty() {
            let mut data = vec![0u8; 8];
            data.resize(PAGE_SIZE, 0);
            leaves.push((data, Triple::new(0, 0, 0)));
        }
        let (_, _, keys) = self.write_leaves(leaves);
        self.write_inner_node(&keys, 4, |t, buf| {
            buf.extend_from_slice(&t[0].to_le_bytes());
        })
    }
}

/// Which delta encoding a leaf chain uses.
#[derive(Clone, Copy, PartialEq, Eq)]
enum LeafPayload {
    Full,
    Aggregated,
    FullyAggregated,
}

/// Split records into pages, delta-encoding each page after its raw
/// first record. Returns `(page bytes with flag placeholder, last key)`.
fn encode_leaves(records: &[Triple], payload: LeafPayload) -> Vec<(Vec<u8>, Triple)> {
    let mut leaves = Vec::new();
    let mut i = 0;
    while i < records.len() {
        let mut data = vec![0u8; 4]; // flags placeholder
        let first = records[i];
        let head_components = if payload == LeafPayload::FullyAggregated { 2 } else { 3 };
        for c in 0..head_components {
            data.extend_from_slice(&first[c].to_le_bytes());
        }
        let mut prev = first;
        let mut last = first;
        i += 1;
        while i < records.len() {
            let enc = match payload {
                LeafPayload::Full => encode_full(prev, records[i]),
                LeafPayload::Aggregated => encode_aggregated(prev, records[i]),
                LeafPayload::FullyAggregated => encode_fully(prev, records[i]),
            };
            if data.len() + enc.len() + 1 > PAGE_SIZE {
                break;
            }
            data.extend_from_slice(&enc);
            prev = records[i];
            last = records[i];
            i += 1;
        }
        data.push(0); // terminator
        data.resize(PAGE_SIZE, 0);
        leaves.push((data, last));
    }
    leaves
}

/// Byte width needed for a non-zero value.
fn width_nonzero(v: u32) -> u32 {
    match v {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xff_ffff => 3,
        _ => 4,
    }
}

/// Byte width needed for a value, zero taking no payload.
fn width(v: u32) -> u32 {
    if v == 0 {
        0
    } else {
        width_nonzero(v)
    }
}

fn push_delta(buf: &mut Vec<u8>, v: u32, w: u32) {
    buf.extend_from_slice(&v.to_le_bytes()[..w as usize]);
}

fn encode_full(prev: Triple, cur: Triple) -> Vec<u8> {
    let mut buf = Vec::with_capacity(13);
    if cur[0] == prev[0] && cur[1] == prev[1] {
        let gap = cur[2] - prev[2];
        if gap < 128 {
            buf.push(gap as u8);
        } else {
            let g = gap - 128;
            let w2 = width(g);
            buf.push((0x80 + w2) as u8);
            push_delta(&mut buf, g, w2);
        }
    } else if cur[0] == prev[0] {
        let d1 = cur[1] - prev[1];
        let v2 = cur[2] - 1;
        let (w1, w2) = (width_nonzero(d1), width(v2));
        buf.push((0x80 + 5 + (w1 - 1) * 5 + w2) as u8);
        push_delta(&mut buf, d1, w1);
        push_delta(&mut buf, v2, w2);
    } else {
        let d0 = cur[0] - prev[0];
        let v1 = cur[1] - 1;
        let v2 = cur[2] - 1;
        let (w0, w1, w2) = (width_nonzero(d0), width(v1), width(v2));
        buf.push((0x80 + 25 + (w0 - 1) * 25 + w1 * 5 + w2) as u8);
        push_delta(&mut buf, d0, w0);
        push_delta(&mut buf, v1, w1);
        push_delta(&mut buf, v2, w2);
    }
    buf
}

fn encode_aggregated(prev: Triple, cur: Triple) -> Vec<u8> {
    let mut buf = Vec::with_capacity(13);
    if cur[0] == prev[0] {
        let d1 = cur[1] - prev[1];
        let count = cur[2];
        if d1 <= 31 && count <= 4 {
            buf.push((d1 | (count - 1) << 5) as u8);
        } else {
            let (w1, w2) = (width(d1 - 1), width(count - 1));
            buf.push((0x80 + w1 * 5 + w2) as u8);
            push_delta(&mut buf, d1 - 1, w1);
            push_delta(&mut buf, count - 1, w2);
        }
    } else {
        let d0 = cur[0] - prev[0];
        let v1 = cur[1] - 1;
        let v2 = cur[2] - 1;
        let (w0, w1, w2) = (width_nonzero(d0), width(v1), width(v2));
        buf.push((0x80 + 25 + (w0 - 1) * 25 + w1 * 5 + w2) as u8);
        push_delta(&mut buf, d0, w0);
        push_delta(&mut buf, v1, w1);
        push_delta(&mut buf, v2, w2);
    }
    buf
}

fn encode_fully(prev: Triple, cur: Triple) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    let d0 = cur[0] - prev[0];
    let count = cur[1];
    if d0 <= 15 && count <= 8 {
        buf.push((d0 | (count - 1) << 4) as u8);
    } else {
        let (w0, w1) = (width(d0 - 1), width(count - 1));
        buf.push((0x80 + w0 * 5 + w1) as u8);
        push_delta(&mut buf, d0 - 1, w0);
        push_delta(&mut buf, count - 1, w1);
    }
    buf
}
