//! Union-find over index sets, used by the batch clusterer.

/// Find root of element `i` with path halving for amortized near-O(1).
pub fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Merge the sets containing `a` and `b`.
pub fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra] = rb;
    }
}

/// Collect the sets containing `members` into sorted groups of indices.
///
/// Groups are ordered by their smallest index for deterministic output.
pub fn collect_groups(parent: &mut [usize], members: &[usize]) -> Vec<Vec<usize>> {
    let mut groups: std::collections::HashMap<usize, Vec<usize>> =
        std::collections::HashMap::new();
    for &idx in members {
        let root = find(parent, idx);
        groups.entry(root).or_default().push(idx);
    }

    let mut result: Vec<Vec<usize>> = groups.into_values().collect();
    for g in &mut result {
        g.sort();
    }
    result.sort_by_key(|g| g[0]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_find_transitive() {
        let mut parent = vec![0, 1, 2];
        union(&mut parent, 0, 1);
        union(&mut parent, 1, 2);
        assert_eq!(find(&mut parent, 0), find(&mut parent, 2));
    }

    #[test]
    fn test_union_find_separate() {
        let mut parent = vec![0, 1, 2, 3];
        union(&mut parent, 0, 1);
        union(&mut parent, 2, 3);
        assert_ne!(find(&mut parent, 0), find(&mut parent, 2));
    }

    #[test]
    fn test_collect_groups_ordered_by_smallest_member() {
        let mut parent = vec![0, 1, 2, 3, 4];
        union(&mut parent, 3, 1);
        union(&mut parent, 0, 4);
        let groups = collect_groups(&mut parent, &[0, 1, 3, 4]);
        assert_eq!(groups, vec![vec![0, 4], vec![1, 3]]);
    }

    #[test]
    fn test_collect_groups_only_requested_members() {
        let mut parent = vec![0, 1, 2];
        union(&mut parent, 0, 1);
        let groups = collect_groups(&mut parent, &[2]);
        assert_eq!(groups, vec![vec![2]]);
    }
}
