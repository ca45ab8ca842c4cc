//! Set algebra over rectangle lists.
//!
//! A `Region` is an order-irrelevant set of non-overlapping [`Rect`]s.
//! Every mutating operation maintains two invariants: no two stored
//! rects overlap, and no stored rect is degenerate (zero area).

use crate::region::rect::Rect;

/// A set of non-overlapping rectangles.
#[derive(Debug, Clone, Default)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self { rects: Vec::new() }
    }

    /// Region consisting of a single rect (empty rects are dropped).
    pub fn from_rect(rect: &Rect) -> Self {
        let mut region = Self::new();
        region.add_rect(rect);
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// The stored non-overlapping rects.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn count(&self) -> usize {
        self.rects.len()
    }

    /// Total covered area. Exact because stored rects never overlap.
    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Smallest rect containing the whole region.
    pub fn bounding_rect(&self) -> Rect {
        let mut it = self.rects.iter();
        let Some(first) = it.next() else {
            return Rect::EMPTY;
        };
        let mut bound = *first;
        for r in it {
            bound.left = bound.left.min(r.left);
            bound.top = bound.top.min(r.top);
            bound.right = bound.right.max(r.right);
            bound.bottom = bound.bottom.max(r.bottom);
        }
        bound
    }

    /// Union a rect into the region.
    pub fn add_rect(&mut self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        // Only the parts not already covered are inserted, which keeps
        // the stored rects disjoint.
        let mut fragments = vec![*rect];
        for existing in &self.rects {
            let mut next = Vec::new();
            for frag in &fragments {
                subtract_rect(frag, existing, &mut next);
            }
            fragments = next;
            if fragments.is_empty() {
                return;
            }
        }
        self.rects.extend(fragments);
    }

    /// Union another region into this one.
    pub fn add(&mut self, other: &Region) {
        for r in &other.rects {
            self.add_rect(r);
        }
    }

    /// Remove a rect from the region.
    pub fn subtract_rect(&mut self, rect: &Rect) {
        if rect.is_empty() || self.rects.is_empty() {
            return;
        }
        let mut result = Vec::with_capacity(self.rects.len());
        for existing in &self.rects {
            subtract_rect(existing, rect, &mut result);
        }
        self.rects = result;
    }

    /// Remove another region from this one.
    pub fn subtract(&mut self, other: &Region) {
        for r in &other.rects {
            self.subtract_rect(r);
        }
    }

    /// Keep only the parts overlapping `rect` (crop-to-bound).
    pub fn crop(&mut self, rect: &Rect) {
        let mut result = Vec::with_capacity(self.rects.len());
        for existing in &self.rects {
            let cut = existing.intersection(rect);
            if !cut.is_empty() {
                result.push(cut);
            }
        }
        self.rects = result;
    }

    /// Keep only the parts overlapping `other`.
    pub fn intersect(&mut self, other: &Region) {
        // Pairwise intersections of two disjoint sets stay disjoint.
        let mut result = Vec::new();
        for a in &self.rects {
            for b in &other.rects {
                let cut = a.intersection(b);
                if !cut.is_empty() {
                    result.push(cut);
                }
            }
        }
        self.rects = result;
    }

    /// Shift the whole region by the given deltas.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        for r in &mut self.rects {
            r.translate(dx, dy);
        }
    }

    /// True when both regions cover exactly the same pixels, regardless
    /// of how they are fragmented.
    pub fn covers_same_area(&self, other: &Region) -> bool {
        let mut a = self.clone();
        a.subtract(other);
        if !a.is_empty() {
            return false;
        }
        let mut b = other.clone();
        b.subtract(self);
        b.is_empty()
    }

    /// True when `rect` lies entirely inside the region.
    pub fn contains_rect(&self, rect: &Rect) -> bool {
        let mut probe = Region::from_rect(rect);
        probe.subtract(self);
        probe.is_empty()
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.covers_same_area(other)
    }
}

/// Append `a \ b` to `out` as at most four disjoint fragments.
fn subtract_rect(a: &Rect, b: &Rect, out: &mut Vec<Rect>) {
    let cut = a.intersection(b);
    if cut.is_empty() {
        out.push(*a);
        return;
    }
    // Band above the cut.
    if cut.top > a.top {
        out.push(Rect::new(a.left, a.top, a.right, cut.top));
    }
    // Band below the cut.
    if cut.bottom < a.bottom {
        out.push(Rect::new(a.left, cut.bottom, a.right, a.bottom));
    }
    // Left of the cut, limited to the cut's vertical span.
    if cut.left > a.left {
        out.push(Rect::new(a.left, cut.top, cut.left, cut.bottom));
    }
    // Right of the cut.
    if cut.right < a.right {
        out.push(Rect::new(cut.right, cut.top, a.right, cut.bottom));
    }
}
