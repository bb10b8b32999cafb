//! RDF term model: dictionary strings, values, categories, and the
//! comparison laws the whole engine is built on.
//!
//! Value identifiers are assigned so that the id order is category-major
//! and, within the numeric and dateTime categories, agrees with the XPath
//! value order. Range-based pruning in the solver depends on this.

use std::cmp::Ordering;
use std::fmt;

use crate::datetime::XsdDateTime;
use crate::decimal::XsdDecimal;
use crate::hash::{hash_bytes, hash_bytes_with};
use crate::numrange::NumRange;

/// Identifier of a value in a store. `1..=values_count` are valid,
/// `0` means "not in the store", [`UNKNOWN_ID`] means "not yet resolved".
pub type ValueId = u32;

/// Identifier of a string in a store, with the same sentinel conventions
/// as [`ValueId`].
pub type StringId = u32;

/// Sentinel for an id that has not been resolved against a store yet.
pub const UNKNOWN_ID: u32 = u32::MAX;

/// Whether `id` is a valid identifier coming from a store.
#[inline]
pub fn valid_id(id: u32) -> bool {
    id > 0 && id != UNKNOWN_ID
}

const XSD_PREFIX: &str = "http://www.w3.org/2001/XMLSchema#";

/// `xsd:string` datatype URI.
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
/// `xsd:boolean` datatype URI.
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
/// `xsd:integer` datatype URI.
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
/// `xsd:double` datatype URI.
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
/// `xsd:decimal` datatype URI.
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
/// `xsd:dateTime` datatype URI.
pub const XSD_DATETIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// Value category. The declaration order is the total order used for id
/// assignment: every category occupies a contiguous id interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum Category {
    /// Blank nodes.
    Blank,
    /// URI references.
    Uri,
    /// Simple literals (no language tag, no datatype).
    SimpleLiteral,
    /// `xsd:string` typed literals.
    TypedString,
    /// `xsd:boolean` literals.
    Boolean,
    /// Numeric literals (integer, floating, decimal).
    Numeric,
    /// `xsd:dateTime` literals.
    DateTime,
    /// Plain literals with a language tag.
    PlainLang,
    /// Literals with an unrecognized datatype.
    Other,
}

impl Category {
    /// Number of categories.
    pub const COUNT: usize = 9;

    /// All categories in id-assignment order.
    pub const ALL: [Category; Self::COUNT] = [
        Category::Blank,
        Category::Uri,
        Category::SimpleLiteral,
        Category::TypedString,
        Category::Boolean,
        Category::Numeric,
        Category::DateTime,
        Category::PlainLang,
        Category::Other,
    ];

    /// Decode a category from its on-disk representation.
    pub fn from_u16(v: u16) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    /// On-disk representation.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Numerical subcategory of [`Category::Numeric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NumCategory {
    /// Integer types (`xsd:integer` and its derived types).
    Integer,
    /// Floating-point types (`xsd:float`, `xsd:double`).
    Floating,
    /// `xsd:decimal`.
    Decimal,
}

impl NumCategory {
    /// Decode from the on-disk representation.
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(NumCategory::Integer),
            1 => Some(NumCategory::Floating),
            2 => Some(NumCategory::Decimal),
            _ => None,
        }
    }
}

/// SPARQL ternary truth value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TriState {
    /// Effective boolean value true.
    True = 0,
    /// Effective boolean value false.
    False = 1,
    /// Type error.
    Error = 2,
}

impl TriState {
    /// Encode as a CP domain value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decode from a CP domain value.
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => TriState::True,
            1 => TriState::False,
            _ => TriState::Error,
        }
    }
}

/// Contiguous range of value identifiers, inclusive on both ends.
///
/// An empty range is encoded as `to = from - 1`; it still carries the
/// greatest-lower/least-upper bounds of a store-absent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    /// First id in the range.
    pub from: ValueId,
    /// Last id in the range.
    pub to: ValueId,
}

impl ValueRange {
    /// Construct a range.
    pub fn new(from: ValueId, to: ValueId) -> Self {
        Self { from, to }
    }

    /// Whether the range holds no id.
    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }

    /// Whether `id` lies in the range.
    pub fn contains(&self, id: ValueId) -> bool {
        id >= self.from && id <= self.to
    }

    /// Iterate over the ids in the range.
    pub fn iter(&self) -> impl Iterator<Item = ValueId> {
        self.from..=self.to
    }
}

/// A dictionary string that may live in a store.
///
/// A string is *resolved* when its id is known (possibly `0` for "not in
/// the store") and *direct* when its bytes are held locally. Strings read
/// back from a store are both.
#[derive(Debug, Clone, Default)]
pub struct Str {
    id: StringId,
    text: Option<Box<str>>,
}

impl Str {
    /// The null string.
    pub fn null() -> Self {
        Self { id: 0, text: None }
    }

    /// An unresolved direct string.
    pub fn direct(text: impl Into<Box<str>>) -> Self {
        Self {
            id: UNKNOWN_ID,
            text: Some(text.into()),
        }
    }

    /// A resolved indirect string.
    pub fn from_id(id: StringId) -> Self {
        Self { id, text: None }
    }

    /// A string that is both resolved and direct.
    pub fn resolved(id: StringId, text: impl Into<Box<str>>) -> Self {
        Self {
            id,
            text: Some(text.into()),
        }
    }

    /// Whether this is the null string.
    pub fn is_null(&self) -> bool {
        self.id == 0 && self.text.is_none()
    }

    /// Whether the id of this string is known.
    pub fn is_resolved(&self) -> bool {
        self.id != UNKNOWN_ID
    }

    /// Whether the bytes of this string are held locally.
    pub fn is_direct(&self) -> bool {
        self.text.is_some()
    }

    /// Store id, `0` for "not in the store", [`UNKNOWN_ID`] if unresolved.
    pub fn id(&self) -> StringId {
        self.id
    }

    /// Set the store id.
    pub fn set_id(&mut self, id: StringId) {
        self.id = id;
    }

    /// The text. Panics if the string is indirect.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// The text, if direct.
    pub fn text_opt(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Byte length of the text.
    pub fn len(&self) -> usize {
        self.text.as_deref().map_or(0, str::len)
    }

    /// Whether the text is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hash of the text bytes, as stored in the strings hash index.
    pub fn hash(&self) -> u32 {
        hash_bytes(self.text().as_bytes())
    }

    /// Byte-wise comparison, using ids as a shortcut when both sides are
    /// resolved against the same store.
    pub fn compare(&self, o: &Str) -> Ordering {
        if self.is_null() || o.is_null() {
            return self.is_null().cmp(&o.is_null()).reverse();
        }
        if self.is_resolved() && o.is_resolved() && (valid_id(self.id) || valid_id(o.id)) {
            return self.id.cmp(&o.id);
        }
        debug_assert!(self.is_direct() && o.is_direct());
        self.text().as_bytes().cmp(o.text().as_bytes())
    }

    /// String equality under the same shortcut rules as [`Str::compare`].
    pub fn same(&self, o: &Str) -> bool {
        if self.is_null() || o.is_null() {
            return self.is_null() && o.is_null();
        }
        if self.is_resolved() && o.is_resolved() && (valid_id(self.id) || valid_id(o.id)) {
            return self.id == o.id;
        }
        self.text() == o.text()
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Interpreted payload of a typed literal.
#[derive(Debug, Clone)]
pub enum Interpreted {
    /// `xsd:boolean`.
    Boolean(bool),
    /// Integer types.
    Integer(i64),
    /// Floating-point types.
    Floating(f64),
    /// `xsd:decimal`.
    Decimal(XsdDecimal),
    /// `xsd:dateTime`.
    DateTime(XsdDateTime),
}

/// An RDF value.
///
/// The 20-byte on-disk record holds ids only; the lexical and tag strings
/// are dictionary references and the interpreted payload is recomputed on
/// demand.
#[derive(Debug, Clone, Default)]
pub struct Value {
    /// Store id: valid, `0` (absent) or [`UNKNOWN_ID`] (unresolved).
    pub id: ValueId,
    /// Category of the value.
    pub category: Option<Category>,
    /// Numerical subcategory, only for [`Category::Numeric`].
    pub num_category: Option<NumCategory>,
    /// Lexical form. May be indirect (id only) or generated on demand.
    pub lexical: Str,
    /// Datatype as a value id, `0` if none, [`UNKNOWN_ID`] if only the
    /// tag string is known.
    pub datatype_id: ValueId,
    /// Datatype URI lexical (typed literals) or language tag (plain-lang).
    pub tag: Str,
    /// Interpreted payload, filled by `ensure_interpreted`.
    pub interpreted: Option<Interpreted>,
    /// Integer approximation of a numeric value; empty otherwise.
    pub numapprox: NumRange,
}

impl Value {
    /// An uninitialized value (unresolved, no category).
    pub fn unknown() -> Self {
        Self {
            id: UNKNOWN_ID,
            ..Self::default()
        }
    }

    /// A blank node with the given label.
    pub fn blank(label: impl Into<Box<str>>) -> Self {
        Self {
            id: UNKNOWN_ID,
            category: Some(Category::Blank),
            lexical: Str::direct(label),
            ..Self::default()
        }
    }

    /// A URI reference.
    pub fn uri(iri: impl Into<Box<str>>) -> Self {
        Self {
            id: UNKNOWN_ID,
            category: Some(Category::Uri),
            lexical: Str::direct(iri),
            ..Self::default()
        }
    }

    /// A simple literal.
    pub fn simple_literal(lex: impl Into<Box<str>>) -> Self {
        Self {
            id: UNKNOWN_ID,
            category: Some(Category::SimpleLiteral),
            lexical: Str::direct(lex),
            ..Self::default()
        }
    }

    /// A plain literal with a language tag.
    pub fn plain_lang(lex: impl Into<Box<str>>, lang: impl Into<Box<str>>) -> Self {
        Self {
            id: UNKNOWN_ID,
            category: Some(Category::PlainLang),
            lexical: Str::direct(lex),
            tag: Str::direct(lang),
            ..Self::default()
        }
    }

    /// A typed literal. The category is derived from the datatype URI:
    /// recognized XSD types map onto their dedicated categories, anything
    /// else lands in [`Category::Other`].
    pub fn typed(lex: impl Into<Box<str>>, datatype: impl Into<Box<str>>) -> Self {
        let datatype = datatype.into();
        let (category, num_category) = categorize_datatype(&datatype);
        Self {
            id: UNKNOWN_ID,
            category: Some(category),
            num_category,
            lexical: Str::direct(lex),
            datatype_id: UNKNOWN_ID,
            tag: Str::direct(datatype),
            ..Self::default()
        }
    }

    /// Replace the contents with an `xsd:boolean`.
    pub fn fill_boolean(&mut self, value: bool) {
        *self = Self {
            id: UNKNOWN_ID,
            category: Some(Category::Boolean),
            datatype_id: UNKNOWN_ID,
            tag: Str::direct(XSD_BOOLEAN),
            interpreted: Some(Interpreted::Boolean(value)),
            ..Self::default()
        };
    }

    /// Replace the contents with an `xsd:integer`.
    pub fn fill_integer(&mut self, value: i64) {
        *self = Self {
            id: UNKNOWN_ID,
            category: Some(Category::Numeric),
            num_category: Some(NumCategory::Integer),
            datatype_id: UNKNOWN_ID,
            tag: Str::direct(XSD_INTEGER),
            interpreted: Some(Interpreted::Integer(value)),
            numapprox: NumRange::from_i64(value),
            ..Self::default()
        };
    }

    /// Replace the contents with an `xsd:double`.
    pub fn fill_floating(&mut self, value: f64) {
        *self = Self {
            id: UNKNOWN_ID,
            category: Some(Category::Numeric),
            num_category: Some(NumCategory::Floating),
            datatype_id: UNKNOWN_ID,
            tag: Str::direct(XSD_DOUBLE),
            interpreted: Some(Interpreted::Floating(value)),
            numapprox: NumRange::from_f64(value),
            ..Self::default()
        };
    }

    /// Replace the contents with an `xsd:decimal`.
    pub fn fill_decimal(&mut self, value: XsdDecimal) {
        let approx = NumRange::from_decimal(&value);
        *self = Self {
            id: UNKNOWN_ID,
            category: Some(Category::Numeric),
            num_category: Some(NumCategory::Decimal),
            datatype_id: UNKNOWN_ID,
            tag: Str::direct(XSD_DECIMAL),
            interpreted: Some(Interpreted::Decimal(value)),
            numapprox: approx,
            ..Self::default()
        };
    }

    /// Replace the contents with a simple literal.
    pub fn fill_simple_literal(&mut self, lex: Str) {
        *self = Self {
            id: UNKNOWN_ID,
            category: Some(Category::SimpleLiteral),
            lexical: lex,
            ..Self::default()
        };
    }

    /// Replace the contents with a URI.
    pub fn fill_uri(&mut self, lex: Str) {
        *self = Self {
            id: UNKNOWN_ID,
            category: Some(Category::Uri),
            lexical: lex,
            ..Self::default()
        };
    }

    /// Whether this value has a valid store id.
    pub fn has_valid_id(&self) -> bool {
        valid_id(self.id)
    }

    /// Whether this value is a blank node.
    pub fn is_blank(&self) -> bool {
        self.category == Some(Category::Blank)
    }

    /// Whether this value is a URI.
    pub fn is_uri(&self) -> bool {
        self.category == Some(Category::Uri)
    }

    /// Whether this value is a literal of any kind.
    pub fn is_literal(&self) -> bool {
        self.category.is_some_and(|c| c > Category::Uri)
    }

    /// Whether this value is a plain literal (with or without tag).
    pub fn is_plain(&self) -> bool {
        matches!(
            self.category,
            Some(Category::SimpleLiteral | Category::PlainLang)
        )
    }

    /// Whether this value is a simple literal.
    pub fn is_simple(&self) -> bool {
        self.category == Some(Category::SimpleLiteral)
    }

    /// Whether this value is a plain literal with a language tag.
    pub fn is_plain_lang(&self) -> bool {
        self.category == Some(Category::PlainLang)
    }

    /// Whether this value is an `xsd:string`.
    pub fn is_xsd_string(&self) -> bool {
        self.category == Some(Category::TypedString)
    }

    /// Whether this value is a typed literal.
    pub fn is_typed(&self) -> bool {
        self.category
            .is_some_and(|c| c > Category::SimpleLiteral && c != Category::PlainLang)
    }

    /// Whether this value is a boolean literal.
    pub fn is_boolean(&self) -> bool {
        self.category == Some(Category::Boolean)
    }

    /// Whether this value is a numeric literal.
    pub fn is_numeric(&self) -> bool {
        self.category == Some(Category::Numeric)
    }

    /// Whether this value is an integer literal.
    pub fn is_integer(&self) -> bool {
        self.is_numeric() && self.num_category == Some(NumCategory::Integer)
    }

    /// Whether this value is a floating-point literal.
    pub fn is_floating(&self) -> bool {
        self.is_numeric() && self.num_category == Some(NumCategory::Floating)
    }

    /// Whether this value is a decimal literal.
    pub fn is_decimal(&self) -> bool {
        self.is_numeric() && self.num_category == Some(NumCategory::Decimal)
    }

    /// Whether this value is a dateTime literal.
    pub fn is_datetime(&self) -> bool {
        self.category == Some(Category::DateTime)
    }

    /// Whether this value can appear in a SPARQL order comparison.
    pub fn is_comparable(&self) -> bool {
        matches!(
            self.category,
            Some(
                Category::SimpleLiteral
                    | Category::TypedString
                    | Category::Boolean
                    | Category::Numeric
                    | Category::DateTime
            )
        )
    }

    /// Interpreted boolean payload. Panics unless interpreted as boolean.
    pub fn boolean(&self) -> bool {
        match &self.interpreted {
            Some(Interpreted::Boolean(b)) => *b,
            _ => panic!("value is not an interpreted boolean"),
        }
    }

    /// Interpreted integer payload.
    pub fn integer(&self) -> i64 {
        match &self.interpreted {
            Some(Interpreted::Integer(i)) => *i,
            _ => panic!("value is not an interpreted integer"),
        }
    }

    /// Interpreted floating-point payload.
    pub fn floating(&self) -> f64 {
        match &self.interpreted {
            Some(Interpreted::Floating(f)) => *f,
            _ => panic!("value is not an interpreted floating"),
        }
    }

    /// Interpreted decimal payload.
    pub fn decimal(&self) -> &XsdDecimal {
        match &self.interpreted {
            Some(Interpreted::Decimal(d)) => d,
            _ => panic!("value is not an interpreted decimal"),
        }
    }

    /// Interpreted dateTime payload.
    pub fn datetime(&self) -> &XsdDateTime {
        match &self.interpreted {
            Some(Interpreted::DateTime(d)) => d,
            _ => panic!("value is not an interpreted dateTime"),
        }
    }

    /// Generate a lexical form from the interpreted payload if none is
    /// present.
    pub fn ensure_lexical(&mut self) {
        if !self.lexical.is_null() {
            return;
        }
        let text: String = match &self.interpreted {
            Some(Interpreted::Boolean(b)) => if *b { "true" } else { "false" }.to_string(),
            Some(Interpreted::Integer(i)) => i.to_string(),
            Some(Interpreted::Floating(f)) => format_double(*f),
            Some(Interpreted::Decimal(d)) => d.to_string(),
            Some(Interpreted::DateTime(d)) => d.to_string(),
            None => String::new(),
        };
        self.lexical = Str::direct(text);
    }

    /// Interpret the lexical form of a typed literal. The lexical must be
    /// direct. Malformed lexicals yield neutral payloads (0, NaN-free),
    /// matching the permissive reading of the original store contents.
    pub fn interpret(&mut self) {
        if self.interpreted.is_some() {
            return;
        }
        let lex = self.lexical.text().trim().to_string();
        if self.is_boolean() {
            self.interpreted = Some(Interpreted::Boolean(lex == "true" || lex == "1"));
        } else if self.is_integer() {
            let i = lex.parse::<i64>().unwrap_or(0);
            self.interpreted = Some(Interpreted::Integer(i));
            if self.numapprox.is_empty() {
                self.numapprox = NumRange::from_i64(i);
            }
        } else if self.is_floating() {
            let f = lex.parse::<f64>().unwrap_or(0.0);
            self.interpreted = Some(Interpreted::Floating(f));
            if self.numapprox.is_empty() {
                self.numapprox = NumRange::from_f64(f);
            }
        } else if self.is_decimal() {
            let d = XsdDecimal::parse(&lex).unwrap_or_default();
            if self.numapprox.is_empty() {
                self.numapprox = NumRange::from_decimal(&d);
            }
            self.interpreted = Some(Interpreted::Decimal(d));
        } else if self.is_datetime() {
            if let Some(d) = XsdDateTime::parse(&lex) {
                self.interpreted = Some(Interpreted::DateTime(d));
            }
        }
    }

    /// XPath comparison per pair of categories.
    ///
    /// Returns `None` on a type error. Numeric and dateTime operands must
    /// be interpreted; string operands must have direct lexicals.
    pub fn xpath_compare(&self, o: &Value) -> Option<Ordering> {
        if self.is_numeric() && o.is_numeric() {
            if !self.numapprox.is_empty() && !o.numapprox.is_empty() {
                // fast path on the integer approximations
                if self.numapprox.lt(&o.numapprox) {
                    return Some(Ordering::Less);
                }
                if self.numapprox.gt(&o.numapprox) {
                    return Some(Ordering::Greater);
                }
            }
            if self.is_integer() && o.is_integer() {
                Some(self.integer().cmp(&o.integer()))
            } else if self.is_decimal() && o.is_decimal() {
                Some(self.decimal().compare(o.decimal()))
            } else {
                let d1 = self.as_f64();
                let d2 = o.as_f64();
                d1.partial_cmp(&d2).or(Some(Ordering::Equal))
            }
        } else if (self.is_simple() && o.is_simple())
            || (self.is_xsd_string() && o.is_xsd_string())
        {
            Some(self.lexical.text().as_bytes().cmp(o.lexical.text().as_bytes()))
        } else if self.is_boolean() && o.is_boolean() {
            Some(self.boolean().cmp(&o.boolean()))
        } else if self.is_datetime() && o.is_datetime() {
            // a dateTime whose lexical failed to parse cannot be compared
            match (&self.interpreted, &o.interpreted) {
                (Some(Interpreted::DateTime(a)), Some(Interpreted::DateTime(b))) => {
                    Some(a.compare(b))
                }
                _ => None,
            }
        } else {
            None
        }
    }

    fn as_f64(&self) -> f64 {
        match &self.interpreted {
            Some(Interpreted::Floating(f)) => *f,
            Some(Interpreted::Decimal(d)) => d.to_f64(),
            Some(Interpreted::Integer(i)) => *i as f64,
            _ => f64::NAN,
        }
    }

    /// SPARQL `=` between two values: XPath equality where defined, plain
    /// term identity for non-literals, type error otherwise.
    ///
    /// Two language-tagged literals are equal iff both tag and lexical
    /// match; any other tagged pair is a type error, never "unequal".
    pub fn equals(&self, o: &Value) -> TriState {
        if self.is_numeric() && o.is_numeric() {
            if self.has_valid_id() && o.has_valid_id() {
                // same store: equivalence is decided by compare below only
                // when ids differ
                if self.id == o.id {
                    return TriState::True;
                }
            }
            if !self.numapprox.is_empty()
                && !o.numapprox.is_empty()
                && (self.numapprox.lt(&o.numapprox) || self.numapprox.gt(&o.numapprox))
            {
                return TriState::False;
            }
            match self.xpath_compare(o) {
                Some(Ordering::Equal) => TriState::True,
                Some(_) => TriState::False,
                None => TriState::Error,
            }
        } else if (self.is_simple() && o.is_simple())
            || (self.is_xsd_string() && o.is_xsd_string())
            || (self.is_boolean() && o.is_boolean())
            || (self.is_datetime() && o.is_datetime())
        {
            if self.has_valid_id() && o.has_valid_id() {
                return if self.id == o.id {
                    TriState::True
                } else {
                    match self.xpath_compare(o) {
                        Some(Ordering::Equal) => TriState::True,
                        _ => TriState::False,
                    }
                };
            }
            match self.xpath_compare(o) {
                Some(Ordering::Equal) => TriState::True,
                Some(_) => TriState::False,
                None => TriState::Error,
            }
        } else if self.is_plain_lang() && o.is_plain_lang() {
            if eq_ignore_ascii_case(self.tag.text(), o.tag.text())
                && self.lexical.same(&o.lexical)
            {
                TriState::True
            } else {
                TriState::Error
            }
        } else {
            // RDF-term equality fallback
            if self.same_term(o) {
                TriState::True
            } else if self.is_literal() && o.is_literal() {
                TriState::Error
            } else {
                TriState::False
            }
        }
    }

    /// `sameTerm` as defined in SPARQL 1.0 §11.4.11.
    pub fn same_term(&self, o: &Value) -> bool {
        if self.has_valid_id() && o.has_valid_id() {
            return self.id == o.id;
        }
        if self.category != o.category {
            return false;
        }
        if self.is_numeric() && self.num_category != o.num_category {
            return false;
        }
        if self.category == Some(Category::Other) || self.is_integer() || self.is_floating() {
            if valid_id(self.datatype_id) && valid_id(o.datatype_id) {
                if self.datatype_id != o.datatype_id {
                    return false;
                }
            } else if !self.tag.same(&o.tag) {
                return false;
            }
        }
        if self.is_plain_lang() && !eq_ignore_ascii_case(self.tag.text(), o.tag.text()) {
            return false;
        }
        self.lexical.same(&o.lexical)
    }

    /// Total order used to assign value identifiers: category first, then
    /// the category comparator, ties broken by tag then lexical.
    pub fn total_lt(&self, o: &Value) -> bool {
        if self.has_valid_id() && o.has_valid_id() {
            return self.id < o.id;
        }
        let (c1, c2) = (self.category, o.category);
        if c1 != c2 {
            return c1 < c2;
        }
        match c1 {
            Some(
                Category::Blank | Category::Uri | Category::SimpleLiteral | Category::TypedString,
            ) => self.lexical.compare(&o.lexical) == Ordering::Less,
            Some(Category::Boolean) => {
                if self.boolean() == o.boolean() {
                    self.lexical.compare(&o.lexical) == Ordering::Less
                } else {
                    !self.boolean() && o.boolean()
                }
            }
            Some(Category::Numeric) => match self.xpath_compare(o) {
                Some(Ordering::Less) => true,
                Some(Ordering::Greater) => false,
                _ => match self.tag.compare(&o.tag) {
                    Ordering::Equal => self.lexical.compare(&o.lexical) == Ordering::Less,
                    ord => ord == Ordering::Less,
                },
            },
            Some(Category::DateTime) => match self.xpath_compare(o) {
                Some(Ordering::Less) => true,
                Some(Ordering::Greater) => false,
                _ => self.lexical.compare(&o.lexical) == Ordering::Less,
            },
            Some(Category::PlainLang | Category::Other) => match self.tag.compare(&o.tag) {
                Ordering::Equal => self.lexical.compare(&o.lexical) == Ordering::Less,
                ord => ord == Ordering::Less,
            },
            None => false,
        }
    }

    /// Effective boolean value per SPARQL 1.0 §11.2.2.
    ///
    /// Requires the value to be interpreted (for typed literals) and the
    /// lexical to be direct (for strings).
    pub fn ebv(&self) -> TriState {
        match &self.interpreted {
            Some(Interpreted::Boolean(b)) => {
                if *b {
                    TriState::True
                } else {
                    TriState::False
                }
            }
            Some(Interpreted::Integer(i)) => {
                if *i != 0 {
                    TriState::True
                } else {
                    TriState::False
                }
            }
            Some(Interpreted::Floating(f)) => {
                if f.is_nan() || *f == 0.0 {
                    TriState::False
                } else {
                    TriState::True
                }
            }
            Some(Interpreted::Decimal(d)) => {
                if d.is_zero() {
                    TriState::False
                } else {
                    TriState::True
                }
            }
            _ => {
                if self.is_plain() || self.is_xsd_string() {
                    if self.lexical.is_empty() {
                        TriState::False
                    } else {
                        TriState::True
                    }
                } else {
                    TriState::Error
                }
            }
        }
    }

    /// Hash of the value, as stored in the values hash index. Requires
    /// direct lexical and tag strings.
    pub fn hash(&self) -> u32 {
        let cat = self.category.map_or(0, Category::as_u16);
        let num = self.num_category.map_or(0, |n| n as u16);
        let mut h = hash_bytes(&cat.to_le_bytes());
        h = hash_bytes_with(h, &num.to_le_bytes());
        if self.is_plain_lang() || self.is_typed() {
            h = hash_bytes_with(h, self.tag.text().as_bytes());
        }
        hash_bytes_with(h, self.lexical.text().as_bytes())
    }

    /// Apply the numeric promotion rules (integer → decimal → double) so
    /// both values share a numerical subcategory.
    pub fn promote_numeric(v1: &mut Value, v2: &mut Value) {
        if v1.is_decimal() && v2.is_integer() {
            let d = XsdDecimal::from_i64(v2.integer());
            v2.fill_decimal(d);
        } else if v2.is_decimal() && v1.is_integer() {
            let d = XsdDecimal::from_i64(v1.integer());
            v1.fill_decimal(d);
        } else if v1.is_floating() && v2.is_integer() {
            let f = v2.integer() as f64;
            v2.fill_floating(f);
        } else if v1.is_floating() && v2.is_decimal() {
            let f = v2.decimal().to_f64();
            v2.fill_floating(f);
        } else if v2.is_floating() && v1.is_integer() {
            let f = v1.integer() as f64;
            v1.fill_floating(f);
        } else if v2.is_floating() && v1.is_decimal() {
            let f = v1.decimal().to_f64();
            v1.fill_floating(f);
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            Some(Category::Blank) => write!(f, "_:{}", self.lexical),
            Some(Category::Uri) => write!(f, "<{}>", self.lexical),
            Some(Category::SimpleLiteral) => write!(f, "\"{}\"", self.lexical),
            Some(Category::PlainLang) => write!(f, "\"{}\"@{}", self.lexical, self.tag),
            Some(_) => write!(f, "\"{}\"^^<{}>", self.lexical, self.tag),
            None => f.write_str("?"),
        }
    }
}

/// Map a datatype URI onto its category.
fn categorize_datatype(uri: &str) -> (Category, Option<NumCategory>) {
    let Some(fragment) = uri.strip_prefix(XSD_PREFIX) else {
        return (Category::Other, None);
    };
    match fragment {
        "string" => (Category::TypedString, None),
        "boolean" => (Category::Boolean, None),
        "integer" | "positiveInteger" | "nonPositiveInteger" | "negativeInteger"
        | "nonNegativeInteger" | "byte" | "short" | "int" | "long" | "unsignedByte"
        | "unsignedShort" | "unsignedInt" | "unsignedLong" => {
            (Category::Numeric, Some(NumCategory::Integer))
        }
        "float" | "double" => (Category::Numeric, Some(NumCategory::Floating)),
        "decimal" => (Category::Numeric, Some(NumCategory::Decimal)),
        "dateTime" => (Category::DateTime, None),
        _ => (Category::Other, None),
    }
}

fn eq_ignore_ascii_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Format a double the way xsd canonicalizes simple cases.
fn format_double(f: f64) -> String {
    if f == f.trunc() && f.is_finite() && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreted(mut v: Value) -> Value {
        v.interpret();
        v
    }

    #[test]
    fn test_category_order_matches_spec() {
        assert!(Category::Blank < Category::Uri);
        assert!(Category::Uri < Category::SimpleLiteral);
        assert!(Category::Numeric < Category::DateTime);
        assert!(Category::PlainLang < Category::Other);
    }

    #[test]
    fn test_numeric_compare_with_promotion() {
        let a = interpreted(Value::typed("5", XSD_INTEGER));
        let b = interpreted(Value::typed("5.0", XSD_DECIMAL));
        let c = interpreted(Value::typed("5.5", XSD_DOUBLE));
        assert_eq!(a.xpath_compare(&b), Some(Ordering::Equal));
        assert_eq!(a.xpath_compare(&c), Some(Ordering::Less));
        assert_eq!(c.xpath_compare(&b), Some(Ordering::Greater));
    }

    #[test]
    fn test_string_compare_is_bytewise() {
        let a = Value::simple_literal("abc");
        let b = Value::simple_literal("abd");
        assert_eq!(a.xpath_compare(&b), Some(Ordering::Less));
        // different string kinds do not compare
        let c = Value::typed("abc", XSD_STRING);
        assert_eq!(a.xpath_compare(&c), None);
    }

    #[test]
    fn test_boolean_order() {
        let f = interpreted(Value::typed("false", XSD_BOOLEAN));
        let t = interpreted(Value::typed("true", XSD_BOOLEAN));
        assert_eq!(f.xpath_compare(&t), Some(Ordering::Less));
    }

    #[test]
    fn test_equals_plain_lang_strict() {
        let a = Value::plain_lang("chat", "fr");
        let b = Value::plain_lang("chat", "FR");
        let c = Value::plain_lang("chat", "en");
        assert_eq!(a.equals(&b), TriState::True);
        assert_eq!(a.equals(&c), TriState::Error);
        assert!(!a.same_term(&c));
    }

    #[test]
    fn test_equals_incomparable_typed_pair() {
        let a = Value::typed("x", "http://example.org/dt");
        let b = Value::typed("y", "http://example.org/dt");
        assert_eq!(a.equals(&b), TriState::Error);
        let c = Value::typed("x", "http://example.org/dt");
        assert_eq!(a.equals(&c), TriState::True);
    }

    #[test]
    fn test_equals_non_literals_fall_back_to_term_identity() {
        let a = Value::uri("http://example.org/a");
        let b = Value::uri("http://example.org/b");
        assert_eq!(a.equals(&b), TriState::False);
        assert_eq!(a.equals(&a.clone()), TriState::True);
    }

    #[test]
    fn test_total_order_category_major() {
        let blank = Value::blank("b");
        let uri = Value::uri("http://a");
        let lit = Value::simple_literal("a");
        assert!(blank.total_lt(&uri));
        assert!(uri.total_lt(&lit));
        assert!(!lit.total_lt(&uri));
    }

    #[test]
    fn test_total_order_numeric_tie_break_on_tag() {
        let a = interpreted(Value::typed("5", XSD_INTEGER));
        let b = interpreted(Value::typed("5.0", XSD_DECIMAL));
        // equal as numbers, so tag decides (xsd:decimal < xsd:integer)
        assert!(b.total_lt(&a));
        assert!(!a.total_lt(&b));
    }

    #[test]
    fn test_ebv() {
        assert_eq!(interpreted(Value::typed("true", XSD_BOOLEAN)).ebv(), TriState::True);
        assert_eq!(interpreted(Value::typed("0", XSD_INTEGER)).ebv(), TriState::False);
        assert_eq!(interpreted(Value::typed("NaN", XSD_DOUBLE)).ebv(), TriState::False);
        assert_eq!(Value::simple_literal("").ebv(), TriState::False);
        assert_eq!(Value::simple_literal("x").ebv(), TriState::True);
        assert_eq!(Value::uri("http://a").ebv(), TriState::Error);
    }

    #[test]
    fn test_datatype_categorization() {
        assert!(Value::typed("1", XSD_INTEGER).is_integer());
        assert!(Value::typed("1", "http://www.w3.org/2001/XMLSchema#unsignedShort").is_integer());
        assert!(Value::typed("1.5", XSD_DOUBLE).is_floating());
        assert!(Value::typed("x", "http://example.org/custom").category == Some(Category::Other));
    }

    #[test]
    fn test_promote_numeric() {
        let mut a = interpreted(Value::typed("2", XSD_INTEGER));
        let mut b = interpreted(Value::typed("2.5", XSD_DOUBLE));
        Value::promote_numeric(&mut a, &mut b);
        assert!(a.is_floating() && b.is_floating());
    }

    #[test]
    fn test_value_hash_distinguishes_category() {
        let a = Value::simple_literal("abc");
        let b = Value::typed("abc", XSD_STRING);
        assert_ne!(a.hash(), b.hash());
    }
}
