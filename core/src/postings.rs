//! Sorted-merge set operations over postings lists.
//!
//! Every input is expected to be strictly ascending; every output is.

use crate::DocId;
use std::cmp::Ordering;

/// Documents present in both lists.
pub fn intersect(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Documents present in either list.
pub fn union(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Documents of `[0, total_docs)` absent from `a`.
pub fn complement(a: &[DocId], total_docs: u32) -> Vec<DocId> {
    let mut out = Vec::with_capacity((total_docs as usize).saturating_sub(a.len()));
    let mut i = 0;
    for doc_id in 0..total_docs {
        // ids at or past the universe bound never match and are dropped
        while i < a.len() && a[i] < doc_id {
            i += 1;
        }
        if i < a.len() && a[i] == doc_id {
            i += 1;
        } else {
            out.push(doc_id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_basic() {
        assert_eq!(intersect(&[0, 2, 4, 6], &[1, 2, 3, 6, 9]), vec![2, 6]);
        assert!(intersect(&[], &[1, 2]).is_empty());
    }

    #[test]
    fn union_basic() {
        assert_eq!(union(&[0, 2, 4], &[1, 2, 9]), vec![0, 1, 2, 4, 9]);
        assert_eq!(union(&[], &[3]), vec![3]);
    }

    #[test]
    fn complement_basic() {
        assert_eq!(complement(&[0, 2], 5), vec![1, 3, 4]);
        assert_eq!(complement(&[], 3), vec![0, 1, 2]);
        assert!(complement(&[0, 1, 2], 3).is_empty());
        assert!(complement(&[], 0).is_empty());
    }
}
