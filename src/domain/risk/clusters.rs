use std::collections::HashMap;

/// Single-linkage union-find over pairs whose correlation is at or above a
/// threshold. Chosen for O(n^2) simplicity over the few dozen symbols a
/// universe typically holds.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Builds cluster ids for a cycle's candidate symbols from their pairwise
/// return correlation. `corr(a, b)` must be symmetric and defined for `a != b`.
pub fn build_clusters(
    symbols: &[String],
    corr: impl Fn(&str, &str) -> f64,
    threshold: f64,
) -> HashMap<String, usize> {
    let n = symbols.len();
    let mut uf = UnionFind::new(n);

    for i in 0..n {
        for j in (i + 1)..n {
            if corr(&symbols[i], &symbols[j]) >= threshold {
                uf.union(i, j);
            }
        }
    }

    symbols
        .iter()
        .enumerate()
        .map(|(i, s)| (s.clone(), uf.find(i)))
        .collect()
}

/// True iff opening `symbol` would push its cluster's open-position count to
/// or past `max_per_cluster`.
pub fn cluster_cap_blocks(
    symbol: &str,
    clusters: &HashMap<String, usize>,
    open_symbols: &[String],
    max_per_cluster: usize,
) -> bool {
    let Some(&cluster_id) = clusters.get(symbol) else {
        return false;
    };
    let open_in_cluster = open_symbols
        .iter()
        .filter(|s| clusters.get(*s).copied() == Some(cluster_id))
        .count();
    open_in_cluster >= max_per_cluster
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_merges_correlated_pair_but_not_third() {
        let symbols = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let clusters = build_clusters(
            &symbols,
            |a, b| match (a, b) {
                ("A", "B") | ("B", "A") => 0.9,
                _ => 0.0,
            },
            0.7,
        );
        assert_eq!(clusters["A"], clusters["B"]);
        assert_ne!(clusters["A"], clusters["C"]);
    }

    #[test]
    fn cluster_cap_blocks_when_at_limit() {
        let mut clusters = HashMap::new();
        clusters.insert("A".to_string(), 0);
        clusters.insert("B".to_string(), 0);
        clusters.insert("C".to_string(), 1);

        let open = vec!["B".to_string()];
        assert!(cluster_cap_blocks("A", &clusters, &open, 1));
        assert!(!cluster_cap_blocks("C", &clusters, &open, 1));
    }
}
