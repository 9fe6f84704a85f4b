use crate::nodes::{expand_nodelist, local_node, AllocationError, NodeHandle};
use std::collections::HashSet;

fn names(list: &str) -> Vec<String> {
    expand_nodelist(list)
        .unwrap()
        .into_iter()
        .map(|node| node.to_string())
        .collect()
}

#[test]
pub fn plain_names() {
    assert_eq!(names("alpha,beta"), ["alpha", "beta"]);
}

#[test]
pub fn padded_range() {
    assert_eq!(names("n[01-03]"), ["n01", "n02", "n03"]);
}

#[test]
pub fn range_without_padding() {
    assert_eq!(names("n[8-10]"), ["n8", "n9", "n10"]);
}

#[test]
pub fn mixed_group() {
    assert_eq!(names("n[1-2,5]"), ["n1", "n2", "n5"]);
}

#[test]
pub fn cartesian_groups() {
    assert_eq!(names("r[1-2]n[1-2]"), ["r1n1", "r1n2", "r2n1", "r2n2"]);
}

#[test]
pub fn suffix_after_group() {
    assert_eq!(names("n[1-2]-ib"), ["n1-ib", "n2-ib"]);
}

#[test]
pub fn groups_next_to_plain_names() {
    assert_eq!(names("login0,n[01-02]"), ["login0", "n01", "n02"]);
}

#[test]
pub fn duplicates_are_dropped() {
    assert_eq!(names("a,a,b"), ["a", "b"]);
}

#[test]
pub fn rejects_unclosed_bracket() {
    assert!(matches!(
        expand_nodelist("n[01-"),
        Err(AllocationError::Nodelist(_))
    ));
}

#[test]
pub fn rejects_stray_bracket() {
    assert!(matches!(
        expand_nodelist("n]1"),
        Err(AllocationError::Nodelist(_))
    ));
}

#[test]
pub fn rejects_reversed_range() {
    assert!(matches!(
        expand_nodelist("n[3-1]"),
        Err(AllocationError::Nodelist(_))
    ));
}

#[test]
pub fn rejects_non_numeric_range() {
    assert!(matches!(
        expand_nodelist("n[a-b]"),
        Err(AllocationError::Nodelist(_))
    ));
}

#[test]
pub fn rejects_empty_entries() {
    assert!(matches!(
        expand_nodelist("a,,b"),
        Err(AllocationError::Nodelist(_))
    ));
}

#[test]
pub fn local_node_resolves() {
    let node = local_node().unwrap();

    assert!(!node.as_str().is_empty());
}

#[test]
pub fn handles_order_by_name() {
    assert!(NodeHandle::from("a") < NodeHandle::from("b"));
    assert_eq!(NodeHandle::from(String::from("a")), NodeHandle::from("a"));
}

#[test]
pub fn handles_hash_by_name() {
    let set: HashSet<NodeHandle> = expand_nodelist("n[1-2],n1").unwrap().into_iter().collect();

    assert_eq!(set.len(), 2);
    assert!(set.contains(&NodeHandle::from("n2")));
}
