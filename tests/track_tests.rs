use dirodm::{ChangeStrategy, TrackedList, TrackedSet};

#[test]
fn test_set_deltas_never_overlap() {
    for strategy in [ChangeStrategy::Incremental, ChangeStrategy::SnapshotDiff] {
        let mut set =
            TrackedSet::with_strategy(["a".to_string(), "b".to_string()], strategy);
        set.remove(&"a".to_string());
        set.insert("a".into());
        set.insert("c".into());
        set.remove(&"b".to_string());
        set.insert("d".into());
        set.remove(&"d".to_string());

        let added = set.added_elements();
        let removed = set.removed_elements();
        assert_eq!(added, vec!["c".to_string()]);
        assert_eq!(removed, vec!["b".to_string()]);
        assert!(added.iter().all(|e| !removed.contains(e)));
    }
}

#[test]
fn test_checkpoint_is_idempotent() {
    let mut set = TrackedSet::tracked(["a".to_string()]);
    set.insert("b".into());
    set.clear_changes();
    set.clear_changes();
    assert!(set.added_elements().is_empty());
    assert!(set.removed_elements().is_empty());
    assert_eq!(set.elements(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_clone_is_a_handle_to_the_same_collection() {
    // an entity field and the session exchange the same container
    let mut field: TrackedSet<String> = TrackedSet::tracked(["a".to_string()]);
    let mut session_side = field.clone();

    field.insert("b".into());
    assert_eq!(session_side.added_elements(), vec!["b".to_string()]);

    session_side.clear_changes();
    assert!(field.added_elements().is_empty());
    assert_eq!(field.elements(), session_side.elements());
}

#[test]
fn test_plain_set_becomes_tracked() {
    let mut set: TrackedSet<String> =
        ["a".to_string(), "b".to_string()].into_iter().collect();
    assert!(!set.is_tracking());
    set.remove(&"a".to_string());
    assert!(set.removed_elements().is_empty());

    set.enable_tracking();
    set.remove(&"b".to_string());
    assert_eq!(set.removed_elements(), vec!["b".to_string()]);
}

#[test]
fn test_list_keeps_duplicate_occurrences() {
    let mut list: TrackedList<String> = TrackedList::tracked(["x".to_string()]);
    list.push("x".into());
    list.push("x".into());
    assert_eq!(list.len(), 3);
    assert_eq!(list.added_elements().len(), 2);

    list.remove(&"x".to_string());
    assert_eq!(list.added_elements().len(), 1);
    assert!(list.removed_elements().is_empty());
}

#[test]
fn test_list_strategy_equivalence_under_interleaving() {
    let mut incremental: TrackedList<u32> =
        TrackedList::with_strategy([1, 1, 2], ChangeStrategy::Incremental);
    let mut snapshot: TrackedList<u32> =
        TrackedList::with_strategy([1, 1, 2], ChangeStrategy::SnapshotDiff);

    for list in [&mut incremental, &mut snapshot] {
        list.push(3);
        list.remove(&1);
        list.push(2);
        list.remove(&3);
        list.push(4);
    }

    assert_eq!(incremental.elements(), snapshot.elements());
    let sorted = |mut v: Vec<u32>| {
        v.sort();
        v
    };
    assert_eq!(
        sorted(incremental.added_elements()),
        sorted(snapshot.added_elements())
    );
    assert_eq!(
        sorted(incremental.removed_elements()),
        sorted(snapshot.removed_elements())
    );
}
