use std::collections::BTreeSet;

use thiserror::Error;

/// Dependency cycle found while ordering nodes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle through nodes {cycle:?}")]
pub struct CycleError {
    /// Node indices along one cycle, in edge order.
    pub cycle: Vec<usize>,
    /// Every node that could not be ordered.
    pub unresolved: Vec<usize>,
}

/// Kahn-style topological sort over `keys.len()` nodes.
///
/// `edges` are `(parent, child)` pairs. Among nodes that become ready at the
/// same time, the one with the smallest `(key, index)` is emitted first, so
/// the result is deterministic for a given input.
pub fn toposort<K: Ord + Copy>(keys: &[K], edges: &[(usize, usize)]) -> Result<Vec<usize>, CycleError> {
    let count = keys.len();
    let mut indegree = vec![0_usize; count];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];

    for &(parent, child) in edges {
        if parent >= count || child >= count {
            continue;
        }
        children[parent].push(child);
        indegree[child] += 1;
    }

    let mut ready: BTreeSet<(K, usize)> = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| (keys[node], node))
        .collect();

    let mut order = Vec::with_capacity(count);
    while let Some(entry) = ready.pop_first() {
        let node = entry.1;
        order.push(node);
        for &child in &children[node] {
            indegree[child] = indegree[child].saturating_sub(1);
            if indegree[child] == 0 {
                ready.insert((keys[child], child));
            }
        }
    }

    if order.len() == count {
        return Ok(order);
    }

    let unresolved: Vec<usize> = (0..count).filter(|node| indegree[*node] > 0).collect();
    let cycle = find_cycle(&children, &unresolved).unwrap_or_else(|| unresolved.clone());
    Err(CycleError { cycle, unresolved })
}

/// Walk parent links inside the unresolved set until a node repeats.
fn find_cycle(children: &[Vec<usize>], unresolved: &[usize]) -> Option<Vec<usize>> {
    let members: BTreeSet<usize> = unresolved.iter().copied().collect();
    let mut parents: Vec<Vec<usize>> = vec![Vec::new(); children.len()];
    for (parent, targets) in children.iter().enumerate() {
        for &child in targets {
            if members.contains(&parent) && members.contains(&child) {
                parents[child].push(parent);
            }
        }
    }

    // Every unresolved node keeps an unresolved parent, so the walk must loop.
    let start = *unresolved.first()?;
    let mut path = vec![start];
    let mut current = start;
    loop {
        let parent = *parents[current].iter().min()?;
        if let Some(position) = path.iter().position(|node| *node == parent) {
            let mut cycle: Vec<usize> = path[position..].to_vec();
            cycle.reverse();
            return Some(cycle);
        }
        path.push(parent);
        current = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_parents_before_children() {
        let keys = [3, 1, 2];
        let order = toposort(&keys, &[(2, 0)]).unwrap();
        let parent = order.iter().position(|node| *node == 2).unwrap();
        let child = order.iter().position(|node| *node == 0).unwrap();
        assert!(parent < child);
    }

    #[test]
    fn breaks_ties_by_key_then_index() {
        let keys = [2, 1, 1, 0];
        assert_eq!(toposort(&keys, &[]).unwrap(), vec![3, 1, 2, 0]);
    }

    #[test]
    fn child_waits_even_with_smaller_key() {
        let keys = [10, 0];
        assert_eq!(toposort(&keys, &[(0, 1)]).unwrap(), vec![0, 1]);
    }

    #[test]
    fn reports_cycle_members_in_edge_order() {
        let keys = [0, 1, 2, 3];
        let err = toposort(&keys, &[(0, 1), (1, 2), (2, 1), (2, 3)]).unwrap_err();
        assert_eq!(err.unresolved, vec![1, 2, 3]);
        let mut cycle = err.cycle.clone();
        cycle.sort();
        assert_eq!(cycle, vec![1, 2]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let err = toposort(&[0], &[(0, 0)]).unwrap_err();
        assert_eq!(err.cycle, vec![0]);
    }
}
