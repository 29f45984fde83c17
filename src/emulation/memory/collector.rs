//! Mark-sweep collection over the [`ReferenceTable`].
//!
//! Roots are the values of every thread's evaluation stack, the arguments of every frame and
//! every local held in a managed slot. Marking is breadth first through array elements and
//! struct fields; each object is marked once, so cycles terminate. Unmarked objects are
//! removed; those flagged finalizable are handed back to the caller instead of being dropped.

use std::collections::VecDeque;

use log::{trace, warn};

use crate::{
    emulation::{memory::references::ReferenceTable, EmValue, Reference},
    Result,
};

/// Outcome of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Objects found reachable
    pub marked: usize,
    /// Objects removed
    pub swept: usize,
    /// Removed objects that were queued for finalization
    pub finalizable: usize,
}

/// Run a full collection.
///
/// Unreachable finalizable objects are appended to `finalization_queue`.
///
/// # Errors
/// Returns [`crate::emulation::EmulationError::InvalidHeapReference`] if a root or a payload
/// holds a stale handle.
pub fn collect<'a>(
    table: &mut ReferenceTable,
    roots: impl IntoIterator<Item = &'a EmValue>,
    finalization_queue: &mut Vec<Reference>,
) -> Result<CollectionStats> {
    let mut stats = CollectionStats::default();
    table.reset_marks(false);

    let mut queue = VecDeque::new();
    for reference in roots.into_iter().filter_map(EmValue::as_heap_ref) {
        if table.mark(reference)? {
            stats.marked += 1;
            queue.push_back(reference);
        }
    }

    while let Some(reference) = queue.pop_front() {
        let children: Vec<_> = table
            .get(reference)?
            .payload
            .values()
            .iter()
            .filter_map(EmValue::as_heap_ref)
            .collect();

        for child in children {
            if table.mark(child)? {
                stats.marked += 1;
                queue.push_back(child);
            }
        }
    }

    let mut finalizable = 0;
    stats.swept = table.sweep(|condemned| {
        if condemned.finalizable {
            finalizable += 1;
            finalization_queue.push(condemned);
        }
    });
    stats.finalizable = finalizable;
    table.reset_marks(false);

    if stats.finalizable > 0 {
        warn!(
            "{} finalizable objects queued, finalizers are not executed",
            stats.finalizable
        );
    }
    trace!(
        "Collection: {} marked, {} swept",
        stats.marked,
        stats.swept
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::{HeapRef, Payload};

    fn link(table: &mut ReferenceTable, from: HeapRef, to: HeapRef) {
        match &mut table.get_mut(from).unwrap().payload {
            Payload::Array(values) | Payload::Struct(values) => values.push(EmValue::Object(to)),
            Payload::Uninit => panic!("cannot link from an uninitialized object"),
        }
    }

    #[test]
    fn test_unreachable_objects_are_swept() {
        let mut table = ReferenceTable::new();
        let root = table.alloc_array(0, EmValue::Null).unwrap();
        let child = table.alloc_struct(0).unwrap();
        let garbage = table.alloc_struct(0).unwrap();
        link(&mut table, root, child);

        let mut queue = Vec::new();
        let roots = [EmValue::Object(root), EmValue::Int32(7)];
        let stats = collect(&mut table, &roots, &mut queue).unwrap();

        assert_eq!(
            stats,
            CollectionStats {
                marked: 2,
                swept: 1,
                finalizable: 0
            }
        );
        assert!(table.contains(root));
        assert!(table.contains(child));
        assert!(!table.contains(garbage));
        assert!(queue.is_empty());
        assert!(table.iter().all(|(_, entry)| !entry.used));
    }

    #[test]
    fn test_cycles_are_marked_once() {
        let mut table = ReferenceTable::new();
        let a = table.alloc_struct(0).unwrap();
        let b = table.alloc_struct(0).unwrap();
        let c = table.alloc_struct(0).unwrap();
        link(&mut table, a, b);
        link(&mut table, b, c);
        link(&mut table, c, a);
        link(&mut table, c, c);

        let island_x = table.alloc_struct(0).unwrap();
        let island_y = table.alloc_struct(0).unwrap();
        link(&mut table, island_x, island_y);
        link(&mut table, island_y, island_x);

        let mut queue = Vec::new();
        let roots = [EmValue::Object(b), EmValue::Object(b)];
        let stats = collect(&mut table, &roots, &mut queue).unwrap();

        assert_eq!(stats.marked, 3);
        assert_eq!(stats.swept, 2);
        assert_eq!(table.len(), 3);
        assert!(!table.contains(island_x));
    }

    #[test]
    fn test_finalizable_objects_are_queued() {
        let mut table = ReferenceTable::new();
        let doomed = table.alloc_struct(1).unwrap();
        table.set_finalizable(doomed, true).unwrap();
        let id = table.get(doomed).unwrap().id;

        let mut queue = Vec::new();
        let stats = collect(&mut table, std::iter::empty(), &mut queue).unwrap();

        assert_eq!(stats.finalizable, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, id);
        assert!(table.is_empty());
    }

    #[test]
    fn test_stale_root_is_fatal() {
        let mut table = ReferenceTable::new();
        let stale = table.alloc_uninit().unwrap();
        collect(&mut table, std::iter::empty(), &mut Vec::new()).unwrap();

        let roots = [EmValue::Object(stale)];
        assert!(collect(&mut table, &roots, &mut Vec::new()).is_err());
    }
}
