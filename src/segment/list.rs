//! Segment list: an arena-backed doubly linked list of segments.
//!
//! Nodes live in a `Vec` and link to each other by index; removed slots are
//! recycled through a free slot list. The concatenated segment lengths always
//! equal the document size, and every position in `[0, size)` falls into
//! exactly one segment.
//!
//! Position lookups start from whichever of the head, the tail or the last
//! resolved node is closest, so runs of edits around the same spot only walk
//! a few nodes.

use crate::error::{Result, StorageError};
use crate::segment::Segment;
use parking_lot::Mutex;

/// A node resolved to its document position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    node: usize,
    start: u64,
}

struct SegmentNode {
    segment: Option<Segment>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered, gapless sequence of segments
pub struct SegmentList {
    nodes: Vec<SegmentNode>,
    head: Option<usize>,
    tail: Option<usize>,
    free_slots: Vec<usize>,
    count: usize,
    size: u64,
    /// Last resolved node; cleared by every structural change
    cursor: Mutex<Option<Cursor>>,
}

impl SegmentList {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            head: None,
            tail: None,
            free_slots: Vec::new(),
            count: 0,
            size: 0,
            cursor: Mutex::new(None),
        }
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if the list holds no segments
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Sum of all segment lengths
    pub fn data_size(&self) -> u64 {
        self.size
    }

    /// First node
    pub fn first(&self) -> Option<usize> {
        self.head
    }

    /// Last node
    pub fn last(&self) -> Option<usize> {
        self.tail
    }

    /// Node following `node`
    pub fn next(&self, node: usize) -> Option<usize> {
        self.nodes[node].next
    }

    /// Node preceding `node`
    pub fn prev(&self, node: usize) -> Option<usize> {
        self.nodes[node].prev
    }

    /// Segment stored at `node`
    pub fn segment(&self, node: usize) -> &Segment {
        match &self.nodes[node].segment {
            Some(segment) => segment,
            None => panic!("segment list node {} is vacant", node),
        }
    }

    /// Iterate over segments in document order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            node: self.head,
        }
    }

    fn set_cursor(&mut self, cursor: Option<Cursor>) {
        *self.cursor.get_mut() = cursor;
    }

    fn alloc_node(&mut self, segment: Segment, prev: Option<usize>, next: Option<usize>) -> usize {
        let node = SegmentNode {
            segment: Some(segment),
            prev,
            next,
        };
        if let Some(slot) = self.free_slots.pop() {
            self.nodes[slot] = node;
            slot
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    /// Link `segment` right after `anchor`, or at the front for `None`
    fn link_after(&mut self, anchor: Option<usize>, segment: Segment) -> usize {
        let length = segment.len();
        let next = match anchor {
            Some(a) => self.nodes[a].next,
            None => self.head,
        };
        let node = self.alloc_node(segment, anchor, next);
        match anchor {
            Some(a) => self.nodes[a].next = Some(node),
            None => self.head = Some(node),
        }
        match next {
            Some(n) => self.nodes[n].prev = Some(node),
            None => self.tail = Some(node),
        }
        self.count += 1;
        self.size += length;
        self.set_cursor(None);
        node
    }

    /// Unlink `node` and hand back its segment
    fn unlink(&mut self, node: usize) -> Segment {
        let (prev, next) = (self.nodes[node].prev, self.nodes[node].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        let segment = match self.nodes[node].segment.take() {
            Some(segment) => segment,
            None => panic!("segment list node {} unlinked twice", node),
        };
        self.nodes[node].prev = None;
        self.nodes[node].next = None;
        self.free_slots.push(node);
        self.count -= 1;
        self.size -= segment.len();
        self.set_cursor(None);
        segment
    }

    /// Append a segment at the end
    pub fn push_back(&mut self, segment: Segment) -> usize {
        let tail = self.tail;
        self.link_after(tail, segment)
    }

    /// Find the node containing `position` and the node's start position.
    ///
    /// Returns `None` when `position` is at or past the end.
    pub fn locate(&self, position: u64) -> Option<(usize, u64)> {
        if position >= self.size {
            return None;
        }
        let head = self.head?;
        let tail = self.tail?;

        let mut from = Cursor {
            node: head,
            start: 0,
        };
        let tail_start = self.size - self.segment(tail).len();
        if tail_start.abs_diff(position) < position {
            from = Cursor {
                node: tail,
                start: tail_start,
            };
        }

        let mut cached = self.cursor.lock();
        if let Some(c) = *cached {
            if c.start.abs_diff(position) < from.start.abs_diff(position) {
                from = c;
            }
        }

        let found = self.walk(from, position);
        *cached = Some(found);
        Some((found.node, found.start))
    }

    fn walk(&self, from: Cursor, position: u64) -> Cursor {
        let mut c = from;
        loop {
            let length = self.segment(c.node).len();
            if position < c.start {
                let prev = match self.nodes[c.node].prev {
                    Some(prev) => prev,
                    None => panic!("segment list walk ran off the front at {}", position),
                };
                c = Cursor {
                    node: prev,
                    start: c.start - self.segment(prev).len(),
                };
            } else if position >= c.start + length {
                let next = match self.nodes[c.node].next {
                    Some(next) => next,
                    None => panic!("segment list walk ran off the end at {}", position),
                };
                c = Cursor {
                    node: next,
                    start: c.start + length,
                };
            } else {
                return c;
            }
        }
    }

    /// Make sure a segment boundary falls at `position`.
    ///
    /// Returns the node starting at `position`, or `None` when `position` is
    /// the end of the list.
    pub fn split_at(&mut self, position: u64) -> Option<usize> {
        assert!(
            position <= self.size,
            "split position {} past end {}",
            position,
            self.size
        );
        let (node, start) = self.locate(position)?;
        if start == position {
            return Some(node);
        }

        let (left, right) = self.segment(node).split(position - start);
        let right_length = right.len();
        self.nodes[node].segment = Some(left);
        self.size -= right_length;
        let right_node = self.link_after(Some(node), right);
        self.set_cursor(Some(Cursor {
            node: right_node,
            start: position,
        }));
        Some(right_node)
    }

    /// Insert `segment` so that it starts at `position`
    pub fn insert_at(&mut self, position: u64, segment: Segment) -> usize {
        let anchor = match self.split_at(position) {
            Some(node) => self.nodes[node].prev,
            None => self.tail,
        };
        let node = self.link_after(anchor, segment);
        self.set_cursor(Some(Cursor {
            node,
            start: position,
        }));
        node
    }

    /// Cut `[position, position + length)` out of the list.
    ///
    /// The removed segments are returned in document order, trimmed to the
    /// exact range.
    pub fn remove_range(&mut self, position: u64, length: u64) -> Vec<Segment> {
        assert!(
            position
                .checked_add(length)
                .is_some_and(|end| end <= self.size),
            "remove range {}+{} past end {}",
            position,
            length,
            self.size
        );
        if length == 0 {
            return Vec::new();
        }

        let first = match self.split_at(position) {
            Some(node) => node,
            None => panic!("no segment at {} inside list of size {}", position, self.size),
        };
        self.split_at(position + length);

        let mut removed = Vec::new();
        let mut node = Some(first);
        let mut remaining = length;
        while remaining > 0 {
            let current = match node {
                Some(current) => current,
                None => panic!("segment list ended with {} bytes left to remove", remaining),
            };
            node = self.nodes[current].next;
            let segment = self.unlink(current);
            remaining -= segment.len();
            removed.push(segment);
        }

        self.set_cursor(node.map(|node| Cursor {
            node,
            start: position,
        }));
        removed
    }

    /// Merge the node after `node` into it if the two are contiguous
    fn absorb_next(&mut self, node: usize) -> bool {
        let Some(next) = self.nodes[node].next else {
            return false;
        };
        if !self.segment(node).can_merge(self.segment(next)) {
            return false;
        }
        let absorbed = self.unlink(next);
        if let Some(segment) = self.nodes[node].segment.as_mut() {
            segment.extend(absorbed.len());
        }
        self.size += absorbed.len();
        true
    }

    /// Merge contiguous neighbours across every boundary in `[from, to]`.
    ///
    /// Returns the number of merges performed.
    pub fn normalize_span(&mut self, from: u64, to: u64) -> usize {
        if self.size == 0 {
            return 0;
        }
        let anchor = from.saturating_sub(1).min(self.size - 1);
        let Some((mut node, mut start)) = self.locate(anchor) else {
            return 0;
        };

        let mut merged = 0;
        loop {
            while self.absorb_next(node) {
                merged += 1;
            }
            let length = self.segment(node).len();
            if start + length > to {
                break;
            }
            match self.nodes[node].next {
                Some(next) => {
                    start += length;
                    node = next;
                }
                None => break,
            }
        }

        self.set_cursor(Some(Cursor { node, start }));
        merged
    }

    /// Merge every pair of contiguous neighbours
    pub fn normalize(&mut self) -> usize {
        let size = self.size;
        self.normalize_span(0, size)
    }

    /// Copy `target.len()` bytes starting at `position` out of the segments
    pub fn read(&self, position: u64, target: &mut [u8]) -> Result<()> {
        if target.is_empty() {
            return Ok(());
        }
        let (mut node, start) = self.locate(position).ok_or_else(|| {
            StorageError::out_of_bounds(position, target.len() as u64, self.size)
        })?;

        let mut local = position - start;
        let mut done = 0;
        loop {
            let segment = self.segment(node);
            let take = (segment.len() - local).min((target.len() - done) as u64) as usize;
            segment.read(local, &mut target[done..done + take])?;
            done += take;
            if done == target.len() {
                return Ok(());
            }
            local = 0;
            node = self.nodes[node].next.ok_or_else(|| {
                StorageError::out_of_bounds(position, target.len() as u64, self.size)
            })?;
        }
    }

    /// Segments covering `[position, position + length)`, trimmed to the range
    pub fn slice(&self, position: u64, length: u64) -> Vec<Segment> {
        let mut parts = Vec::new();
        if length == 0 {
            return parts;
        }
        let Some((mut node, start)) = self.locate(position) else {
            return parts;
        };

        let mut local = position - start;
        let mut remaining = length;
        loop {
            let segment = self.segment(node);
            let take = (segment.len() - local).min(remaining);
            parts.push(segment.slice(local, take));
            remaining -= take;
            local = 0;
            match self.nodes[node].next {
                Some(next) if remaining > 0 => node = next,
                _ => break,
            }
        }
        parts
    }

    /// Drop every segment
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_slots.clear();
        self.head = None;
        self.tail = None;
        self.count = 0;
        self.size = 0;
        self.set_cursor(None);
    }

    /// Check the structural invariants, describing the first violation found.
    ///
    /// Checks link symmetry, segment count, that lengths add up to the size,
    /// that every segment stays within its source and that no two neighbours
    /// are left unmerged.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut count = 0;
        let mut total = 0u64;
        let mut prev: Option<usize> = None;
        let mut node = self.head;

        while let Some(current) = node {
            let entry = &self.nodes[current];
            let Some(segment) = entry.segment.as_ref() else {
                return Err(format!("node {} is linked but vacant", current));
            };
            if entry.prev != prev {
                return Err(format!(
                    "node {} has prev link {:?}, expected {:?}",
                    current, entry.prev, prev
                ));
            }
            if segment.end_position() > segment.source().len() {
                return Err(format!(
                    "segment {:?} at {} exceeds its source length {}",
                    segment,
                    total,
                    segment.source().len()
                ));
            }
            if let Some(p) = prev {
                if self.segment(p).can_merge(segment) {
                    return Err(format!(
                        "segments {:?} and {:?} at {} were left unmerged",
                        self.segment(p),
                        segment,
                        total
                    ));
                }
            }
            count += 1;
            total += segment.len();
            prev = Some(current);
            node = entry.next;
        }

        if self.tail != prev {
            return Err(format!("tail is {:?}, last linked node is {:?}", self.tail, prev));
        }
        if count != self.count {
            return Err(format!("{} nodes linked, count says {}", count, self.count));
        }
        if total != self.size {
            return Err(format!("segments cover {} bytes, size says {}", total, self.size));
        }
        Ok(())
    }
}

impl Default for SegmentList {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the segments of a list
pub struct Iter<'a> {
    list: &'a SegmentList,
    node: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Segment;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = self.list.nodes[node].next;
        Some(self.list.segment(node))
    }
}
