//! Recursive invariant checker.
//!
//! Not part of the allocation fast path: this walks the whole tree and is
//! meant to be called by tests after every mutating operation, the way the
//! reference implementation's test driver does.
use crate::buffer::Buffer;
use crate::entry::Entry;
use crate::topology;

/// Walk the tree from the root, panicking on the first invariant violation.
pub fn verify(buffer: &Buffer<'_>, max_level: u8) {
    verify_node(buffer, 0, max_level);
}

fn verify_node(buffer: &Buffer<'_>, i: u64, max_level: u8) {
    let level = topology::level(i);
    let entry = buffer[i];

    if level == max_level {
        assert!(
            entry.is_unusable() || entry.is_allocated() || entry == Entry::free_at_level(max_level),
            "node {i}: leaf holds invalid byte {:?}",
            entry
        );
        return;
    }

    if entry.is_unusable() || entry.is_allocated() {
        return;
    }

    let left = topology::left_child(i);
    let right = topology::right_child(i);

    if entry.is_filled() {
        assert!(
            buffer[left].raw() > Entry::MAX_VALID_LEVEL && buffer[right].raw() > Entry::MAX_VALID_LEVEL,
            "node {i}: claims FILLED but a child still has free space"
        );
        verify_node(buffer, left, max_level);
        verify_node(buffer, right, max_level);
        return;
    }

    let stored_level = entry
        .level()
        .unwrap_or_else(|| panic!("node {i}: unreachable sentinel after FILLED/ALLOCATED/UNUSABLE checks"));
    assert!(
        stored_level >= level,
        "node {i}: smallest free level {stored_level} is below the node's own depth {level}"
    );

    if stored_level == level {
        // Wholly free subtree; nothing further to check below it (collapsed
        // per invariant 5, so its children are not meaningful reference
        // points - but they still physically exist and downstream code
        // never reads them, so we stop here instead of recursing into
        // stale bytes).
        return;
    }

    assert_eq!(
        Entry::parent_of(buffer[left], buffer[right]),
        entry,
        "node {i}: smallest free level does not match min(children)"
    );
    assert!(
        !(buffer[left] == Entry::free_at_level(level + 1) && buffer[right] == Entry::free_at_level(level + 1)),
        "node {i}: both children are wholly free at level {} - should have coalesced",
        level + 1
    );

    verify_node(buffer, left, max_level);
    verify_node(buffer, right, max_level);
}
