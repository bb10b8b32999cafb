//! Backtrackable finite-domain variable.
//!
//! The domain is a sparse set: `dom[0..n]` lists the live values and
//! `pos[v - min_val]` gives each value's slot, so membership tests,
//! removal and binding are O(1). `min`/`max` are auxiliary bounds that
//! are deliberately loose after removals; they are only guaranteed tight
//! when the variable is bound. A mark prefix `dom[0..marked]` supports
//! set-intersection style restriction.

use smallvec::SmallVec;

use super::constraint::ConstraintId;

/// Domain events a constraint can listen to.
pub mod event {
    /// The variable became bound.
    pub const BIND: u8 = 1;
    /// The domain changed in any way.
    pub const CHANGE: u8 = 2;
    /// The lower bound moved.
    pub const MIN: u8 = 4;
    /// The upper bound moved.
    pub const MAX: u8 = 8;
}

/// Trailed state of one variable: exactly what a backtrack restores.
#[derive(Debug, Clone, Copy)]
pub struct VarFrame {
    n: usize,
    min: u32,
    max: u32,
}

/// A finite-domain integer variable.
pub struct FdVar {
    min_val: u32,
    n: usize,
    dom: Vec<u32>,
    pos: Vec<usize>,
    min: u32,
    max: u32,
    marked: usize,
    marked_min: u32,
    marked_max: u32,
    pub(super) on_bind: SmallVec<[ConstraintId; 4]>,
    pub(super) on_change: SmallVec<[ConstraintId; 4]>,
    pub(super) on_min: SmallVec<[ConstraintId; 4]>,
    pub(super) on_max: SmallVec<[ConstraintId; 4]>,
}

impl FdVar {
    /// A variable with initial domain `min_val..=max_val`.
    pub fn new(min_val: u32, max_val: u32) -> Self {
        debug_assert!(min_val <= max_val);
        let size = (max_val - min_val + 1) as usize;
        Self {
            min_val,
            n: size,
            dom: (min_val..=max_val).collect(),
            pos: (0..size).collect(),
            min: min_val,
            max: max_val,
            marked: 0,
            marked_min: 0,
            marked_max: 0,
            on_bind: SmallVec::new(),
            on_change: SmallVec::new(),
            on_min: SmallVec::new(),
            on_max: SmallVec::new(),
        }
    }

    /// Number of values left in the domain.
    pub fn size(&self) -> usize {
        self.n
    }

    /// Whether exactly one value is left.
    pub fn is_bound(&self) -> bool {
        self.n == 1
    }

    /// The bound value. Only meaningful when `is_bound()`.
    pub fn value(&self) -> u32 {
        self.dom[0]
    }

    /// Loose lower bound.
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Loose upper bound.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// The live prefix of the domain array.
    pub fn domain(&self) -> &[u32] {
        &self.dom[..self.n]
    }

    /// Value at slot `i` of the domain array.
    pub fn dom_at(&self, i: usize) -> u32 {
        self.dom[i]
    }

    /// Number of currently marked values.
    pub fn marked(&self) -> usize {
        self.marked
    }

    /// Whether `v` is in the domain.
    pub fn contains(&self, v: u32) -> bool {
        v >= self.min && v <= self.max && self.pos[(v - self.min_val) as usize] < self.n
    }

    /// Snapshot for the trail.
    pub fn frame(&self) -> VarFrame {
        VarFrame {
            n: self.n,
            min: self.min,
            max: self.max,
        }
    }

    /// Restore a trail snapshot. The dom/pos permutation needs no undo:
    /// removed values sit past `n` and come back by growing it.
    pub fn restore(&mut self, frame: &VarFrame) {
        self.n = frame.n;
        self.min = frame.min;
        self.max = frame.max;
        self.marked = 0;
    }

    fn swap_slots(&mut self, i: usize, j: usize) {
        if i != j {
            let (vi, vj) = (self.dom[i], self.dom[j]);
            self.dom.swap(i, j);
            self.pos[(vi - self.min_val) as usize] = j;
            self.pos[(vj - self.min_val) as usize] = i;
        }
    }

    /// Collapse the domain to `{v}`. Returns `(alive, fired events)`.
    pub fn bind(&mut self, v: u32) -> (bool, u8) {
        self.marked = 0;
        if v < self.min || v > self.max {
            return (false, 0);
        }
        let i = self.pos[(v - self.min_val) as usize];
        if i >= self.n {
            return (false, 0);
        }
        if self.n == 1 {
            return (true, 0);
        }
        self.swap_slots(i, 0);
        self.n = 1;
        let mut events = event::CHANGE | event::BIND;
        if self.min != v {
            self.min = v;
            events |= event::MIN;
        }
        if self.max != v {
            self.max = v;
            events |= event::MAX;
        }
        (true, events)
    }

    /// Remove `v` from the domain. Returns `(alive, fired events)`.
    pub fn remove(&mut self, v: u32) -> (bool, u8) {
        self.marked = 0;
        if v < self.min_val || (v - self.min_val) as usize >= self.pos.len() {
            return (true, 0);
        }
        let i = self.pos[(v - self.min_val) as usize];
        if i >= self.n {
            return (true, 0);
        }
        if self.n <= 1 {
            return (false, 0);
        }
        self.n -= 1;
        self.swap_slots(i, self.n);
        let mut events = event::CHANGE;
        if self.n == 1 {
            let head = self.dom[0];
            // the bounds and the sparse set may disagree after loose
            // updates; an inconsistent collapse is a wipeout
            if head < self.min || head > self.max {
                return (false, events);
            }
            events |= event::BIND;
            if self.min != head {
                self.min = head;
                events |= event::MIN;
            }
            if self.max != head {
                self.max = head;
                events |= event::MAX;
            }
        } else {
            if v == self.min {
                self.min += 1; // weak bound
                events |= event::MIN;
            }
            if v == self.max {
                self.max -= 1; // weak bound
                events |= event::MAX;
            }
        }
        (true, events)
    }

    /// Remove all values `< v`. Returns `(alive, fired events)`.
    pub fn update_min(&mut self, v: u32) -> (bool, u8) {
        self.marked = 0;
        if v <= self.min {
            return (true, 0);
        }
        if v > self.max {
            return (false, 0);
        }
        if v == self.max {
            return self.bind(v);
        }
        self.min = v;
        (true, event::CHANGE | event::MIN)
    }

    /// Remove all values `> v`. Returns `(alive, fired events)`.
    pub fn update_max(&mut self, v: u32) -> (bool, u8) {
        self.marked = 0;
        if v >= self.max {
            return (true, 0);
        }
        if v < self.min {
            return (false, 0);
        }
        if v == self.min {
            return self.bind(v);
        }
        self.max = v;
        (true, event::CHANGE | event::MAX)
    }

    /// Mark `v` for a later [`FdVar::restrict_to_marks`]. No-op if the
    /// value is absent or already marked.
    pub fn mark(&mut self, v: u32) {
        if v < self.min || v > self.max {
            return;
        }
        let i = self.pos[(v - self.min_val) as usize];
        if i >= self.n || i < self.marked {
            return;
        }
        self.swap_slots(i, self.marked);
        if self.marked == 0 || v < self.marked_min {
            self.marked_min = v;
        }
        if self.marked == 0 || v > self.marked_max {
            self.marked_max = v;
        }
        self.marked += 1;
    }

    /// Forget all marks.
    pub fn clear_marks(&mut self) {
        self.marked = 0;
    }

    /// Restrict the domain to the marked values, clearing the marks.
    /// Returns `(alive, fired events)`.
    pub fn restrict_to_marks(&mut self) -> (bool, u8) {
        let m = self.marked;
        let (mmin, mmax) = (self.marked_min, self.marked_max);
        self.marked = 0;
        if m == self.n {
            return (true, 0);
        }
        self.n = m;
        if m == 0 {
            return (false, 0);
        }
        let mut events = event::CHANGE;
        if self.min != mmin {
            self.min = mmin;
            events |= event::MIN;
        }
        if self.max != mmax {
            self.max = mmax;
            events |= event::MAX;
        }
        if m == 1 {
            events |= event::BIND;
        }
        (true, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn check_invariants(x: &FdVar) {
        // pos[dom[i] - min_val] == i for live slots, membership agrees
        for i in 0..x.size() {
            let v = x.dom_at(i);
            assert_eq!(x.pos[(v - x.min_val) as usize], i);
        }
        if x.is_bound() {
            assert_eq!(x.min(), x.value());
            assert_eq!(x.max(), x.value());
        }
    }

    #[test]
    fn test_bind_collapses_domain() {
        let mut x = FdVar::new(0, 9);
        let (ok, ev) = x.bind(4);
        assert!(ok);
        assert!(ev & event::BIND != 0);
        assert!(x.is_bound());
        assert_eq!(x.value(), 4);
        check_invariants(&x);
        // binding an absent value fails
        let mut y = FdVar::new(0, 9);
        y.remove(3);
        assert!(!y.bind(3).0);
    }

    #[test]
    fn test_remove_keeps_sparse_set_consistent() {
        let mut x = FdVar::new(1, 5);
        assert!(x.remove(3).0);
        assert!(!x.contains(3));
        assert_eq!(x.size(), 4);
        check_invariants(&x);
        // removing an already-absent value is harmless
        assert!(x.remove(3).0);
        assert_eq!(x.size(), 4);
    }

    #[test]
    fn test_remove_to_single_fires_bind() {
        let mut x = FdVar::new(1, 2);
        let (ok, ev) = x.remove(1);
        assert!(ok);
        assert!(ev & event::BIND != 0);
        assert_eq!(x.value(), 2);
        check_invariants(&x);
        // removing the last value wipes out
        assert!(!x.remove(2).0);
    }

    #[test]
    fn test_bounds_are_loose_after_interior_remove() {
        let mut x = FdVar::new(0, 9);
        x.remove(9);
        assert_eq!(x.max(), 8);
        x.remove(7);
        // 8 is still in the domain; max stays a valid loose bound
        assert!(x.contains(8));
        assert!(x.max() >= 8);
        check_invariants(&x);
    }

    #[test]
    fn test_update_min_reduces_to_bind_on_max() {
        let mut x = FdVar::new(0, 5);
        let (ok, ev) = x.update_min(5);
        assert!(ok);
        assert!(ev & event::BIND != 0);
        assert_eq!(x.value(), 5);
    }

    #[test]
    fn test_update_bounds_wipeout() {
        let mut x = FdVar::new(0, 5);
        assert!(!x.update_min(6).0);
        let mut y = FdVar::new(2, 5);
        assert!(!y.update_max(1).0);
    }

    #[test]
    fn test_mark_and_restrict() {
        let mut x = FdVar::new(0, 9);
        x.mark(2);
        x.mark(5);
        x.mark(5); // duplicate marks are no-ops
        x.mark(42); // out of range
        let (ok, _) = x.restrict_to_marks();
        assert!(ok);
        assert_eq!(x.size(), 2);
        assert!(x.contains(2) && x.contains(5));
        assert_eq!(x.min(), 2);
        assert_eq!(x.max(), 5);
        check_invariants(&x);
    }

    #[test]
    fn test_restrict_without_marks_wipes_out() {
        let mut x = FdVar::new(0, 3);
        assert!(!x.restrict_to_marks().0);
    }

    #[test]
    fn test_frame_round_trip() {
        let mut x = FdVar::new(0, 9);
        x.remove(4);
        let frame = x.frame();
        let (size, min, max) = (x.size(), x.min(), x.max());
        x.bind(7);
        x.restore(&frame);
        assert_eq!(x.size(), size);
        assert_eq!(x.min(), min);
        assert_eq!(x.max(), max);
        assert!(x.contains(7) && x.contains(0) && !x.contains(4));
        check_invariants(&x);
    }

    proptest! {
        #[test]
        fn prop_domain_consistency_under_random_ops(ops in prop::collection::vec((0u8..5, 0u32..16), 0..40)) {
            let mut x = FdVar::new(0, 15);
            let frame = x.frame();
            for (op, v) in ops {
                if x.size() == 0 {
                    break;
                }
                let alive = match op {
                    0 => x.remove(v).0,
                    1 => x.update_min(v).0,
                    2 => x.update_max(v).0,
                    3 => {
                        x.mark(v);
                        true
                    }
                    _ => {
                        x.clear_marks();
                        true
                    }
                };
                if !alive {
                    break;
                }
                check_invariants(&x);
                // membership must agree between representations
                for w in 0..=15u32 {
                    let live = x.domain().contains(&w);
                    prop_assert_eq!(x.contains(w), live && w >= x.min() && w <= x.max());
                }
            }
            // the frame always restores the initial state
            x.restore(&frame);
            prop_assert_eq!(x.size(), 16);
            prop_assert_eq!((x.min(), x.max()), (0, 15));
            check_invariants(&x);
        }
    }
}
