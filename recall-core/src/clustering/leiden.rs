//! In-process Leiden community detection.
//!
//! Constant Potts Model (CPM) objective with resolution `gamma`:
//! `Q = Σ_c [ W_c − γ · n_c(n_c−1)/2 ]` where `W_c` is the summed internal
//! edge weight and `n_c` the member count of community `c`. Each level runs
//! local moving until the quality gain drops below `tolerance`, refines the
//! partition into well-connected subcommunities, then aggregates and
//! repeats, up to `max_levels`.
//!
//! Determinism: nodes are processed in sorted-uuid order and ties break
//! toward the lowest community index, so the same graph always yields the
//! same partition.

use std::collections::HashMap;
use uuid::Uuid;

/// Leiden run parameters
#[derive(Debug, Clone, Copy)]
pub struct LeidenParams {
    /// CPM resolution; higher values favour smaller communities
    pub gamma: f64,
    /// Maximum aggregation levels
    pub max_levels: usize,
    /// Minimum quality gain to keep iterating a level
    pub tolerance: f64,
}

impl Default for LeidenParams {
    fn default() -> Self {
        Self {
            gamma: crate::constants::LEIDEN_GAMMA,
            max_levels: crate::constants::LEIDEN_MAX_LEVELS,
            tolerance: crate::constants::LEIDEN_TOLERANCE,
        }
    }
}

/// Weighted undirected graph over dense node indices
struct WorkGraph {
    /// adjacency\[v\] = (neighbor, weight); no self loops at level 0
    adjacency: Vec<Vec<(usize, f64)>>,
    /// How many original nodes each work node represents
    node_sizes: Vec<usize>,
}

impl WorkGraph {
    fn len(&self) -> usize {
        self.adjacency.len()
    }
}

/// Partition state during local moving
struct Partition {
    /// node → community id (dense after `compact`)
    membership: Vec<usize>,
    /// community → summed node sizes
    community_sizes: Vec<usize>,
}

impl Partition {
    fn singletons(graph: &WorkGraph) -> Self {
        Self {
            membership: (0..graph.len()).collect(),
            community_sizes: graph.node_sizes.clone(),
        }
    }

    /// Renumber communities densely, preserving first-appearance order
    fn compact(&mut self) -> usize {
        let mut remap: HashMap<usize, usize> = HashMap::new();
        for community in &mut self.membership {
            let next = remap.len();
            let dense = *remap.entry(*community).or_insert(next);
            *community = dense;
        }
        let count = remap.len();
        self.community_sizes = vec![0; count];
        count
    }
}

/// Run Leiden over the given nodes and undirected weighted edges.
///
/// Returns a dense community index per node. Isolated nodes end up in
/// singleton communities.
#[must_use]
pub fn leiden(
    nodes: &[Uuid],
    edges: &[(Uuid, Uuid, f64)],
    params: &LeidenParams,
) -> HashMap<Uuid, usize> {
    if nodes.is_empty() {
        return HashMap::new();
    }

    // Sorted order fixes the iteration sequence
    let mut sorted: Vec<Uuid> = nodes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let index: HashMap<Uuid, usize> = sorted
        .iter()
        .enumerate()
        .map(|(i, uuid)| (*uuid, i))
        .collect();

    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); sorted.len()];
    for (a, b, weight) in edges {
        let (Some(&ia), Some(&ib)) = (index.get(a), index.get(b)) else {
            continue;
        };
        if ia == ib || *weight <= 0.0 {
            continue;
        }
        adjacency[ia].push((ib, *weight));
        adjacency[ib].push((ia, *weight));
    }
    for list in &mut adjacency {
        list.sort_unstable_by(|x, y| x.0.cmp(&y.0));
    }

    let mut graph = WorkGraph {
        node_sizes: vec![1; sorted.len()],
        adjacency,
    };

    // membership of ORIGINAL nodes, refined across levels
    let mut assignment: Vec<usize> = (0..sorted.len()).collect();

    for _level in 0..params.max_levels {
        let mut partition = Partition::singletons(&graph);
        let improved = local_moving(&graph, &mut partition, params);
        let community_count = partition.compact();

        if !improved || community_count == graph.len() {
            // Converged: nothing merged at this level
            project(&mut assignment, &partition.membership);
            break;
        }

        // Refinement: split each community into well-connected parts before
        // aggregating, so a badly merged community cannot lock in
        let refined = refine(&graph, &partition, params);
        let refined_count = refined.iter().copied().max().map_or(0, |m| m + 1);

        // Communities of refined nodes, for the next level's starting point
        project(&mut assignment, &refined);

        if refined_count == graph.len() {
            break;
        }
        graph = aggregate(&graph, &refined, refined_count);
    }

    // Dense final communities over original nodes
    let mut remap: HashMap<usize, usize> = HashMap::new();
    let mut result = HashMap::with_capacity(sorted.len());
    for (node, uuid) in sorted.iter().enumerate() {
        let next = remap.len();
        let dense = *remap.entry(assignment[node]).or_insert(next);
        result.insert(*uuid, dense);
    }
    result
}

/// One round of CPM local moving. Returns whether anything moved with a
/// total gain above tolerance.
fn local_moving(graph: &WorkGraph, partition: &mut Partition, params: &LeidenParams) -> bool {
    let mut improved = false;
    loop {
        let mut round_gain = 0.0;
        let mut moved = false;

        for v in 0..graph.len() {
            let current = partition.membership[v];
            let v_size = graph.node_sizes[v] as f64;

            // Edge weight from v into each neighboring community
            let mut weights_to: HashMap<usize, f64> = HashMap::new();
            for &(u, w) in &graph.adjacency[v] {
                *weights_to.entry(partition.membership[u]).or_insert(0.0) += w;
            }

            let current_size = partition.community_sizes[current] as f64;
            let w_current = weights_to.get(&current).copied().unwrap_or(0.0);
            // Cost of leaving the current community
            let removal = -w_current + params.gamma * v_size * (current_size - v_size);

            // Best destination, deterministic tie-break on community id
            let mut best_community = current;
            let mut best_gain = 0.0;
            let mut candidates: Vec<(usize, f64)> = weights_to.into_iter().collect();
            candidates.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            for (community, w_to) in candidates {
                if community == current {
                    continue;
                }
                let target_size = partition.community_sizes[community] as f64;
                let gain = removal + w_to - params.gamma * v_size * target_size;
                if gain > best_gain {
                    best_gain = gain;
                    best_community = community;
                }
            }

            if best_community != current && best_gain > 0.0 {
                partition.community_sizes[current] -= graph.node_sizes[v];
                partition.community_sizes[best_community] += graph.node_sizes[v];
                partition.membership[v] = best_community;
                round_gain += best_gain;
                moved = true;
            }
        }

        if moved {
            improved = true;
        }
        if !moved || round_gain < params.tolerance {
            break;
        }
    }
    improved
}

/// Split each community into connected, well-attached subcommunities by
/// re-running constrained local moving from singletons.
fn refine(graph: &WorkGraph, partition: &Partition, params: &LeidenParams) -> Vec<usize> {
    let mut refined: Vec<usize> = (0..graph.len()).collect();
    let mut refined_sizes: Vec<usize> = graph.node_sizes.clone();

    loop {
        let mut moved = false;
        for v in 0..graph.len() {
            let home = partition.membership[v];
            let current = refined[v];
            // Only merge within the community local moving produced
            let mut weights_to: HashMap<usize, f64> = HashMap::new();
            for &(u, w) in &graph.adjacency[v] {
                if partition.membership[u] == home {
                    *weights_to.entry(refined[u]).or_insert(0.0) += w;
                }
            }

            let v_size = graph.node_sizes[v] as f64;
            let current_size = refined_sizes[current] as f64;
            let w_current = weights_to.get(&current).copied().unwrap_or(0.0);
            let removal = -w_current + params.gamma * v_size * (current_size - v_size);

            let mut best_community = current;
            let mut best_gain = 0.0;
            let mut candidates: Vec<(usize, f64)> = weights_to.into_iter().collect();
            candidates.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            for (community, w_to) in candidates {
                if community == current {
                    continue;
                }
                let target_size = refined_sizes[community] as f64;
                let gain = removal + w_to - params.gamma * v_size * target_size;
                if gain > best_gain {
                    best_gain = gain;
                    best_community = community;
                }
            }

            if best_community != current && best_gain > 0.0 {
                refined_sizes[current] -= graph.node_sizes[v];
                refined_sizes[best_community] += graph.node_sizes[v];
                refined[v] = best_community;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    // Dense renumbering
    let mut remap: HashMap<usize, usize> = HashMap::new();
    for community in &mut refined {
        let next = remap.len();
        *community = *remap.entry(*community).or_insert(next);
    }
    refined
}

/// Replace each original node's assignment with its work node's community
fn project(assignment: &mut [usize], membership: &[usize]) {
    for slot in assignment.iter_mut() {
        *slot = membership[*slot];
    }
}

/// Collapse communities into single nodes, summing parallel edge weights
fn aggregate(graph: &WorkGraph, membership: &[usize], community_count: usize) -> WorkGraph {
    let mut node_sizes = vec![0usize; community_count];
    for v in 0..graph.len() {
        node_sizes[membership[v]] += graph.node_sizes[v];
    }

    let mut edge_weights: HashMap<(usize, usize), f64> = HashMap::new();
    for v in 0..graph.len() {
        for &(u, w) in &graph.adjacency[v] {
            if u <= v {
                continue; // each undirected edge once
            }
            let (a, b) = {
                let (ca, cb) = (membership[v], membership[u]);
                if ca == cb {
                    continue; // internal edges vanish into the supernode
                }
                (ca.min(cb), ca.max(cb))
            };
            *edge_weights.entry((a, b)).or_insert(0.0) += w;
        }
    }

    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); community_count];
    let mut sorted_edges: Vec<((usize, usize), f64)> = edge_weights.into_iter().collect();
    sorted_edges.sort_unstable_by(|x, y| x.0.cmp(&y.0));
    for ((a, b), w) in sorted_edges {
        adjacency[a].push((b, w));
        adjacency[b].push((a, w));
    }

    WorkGraph {
        adjacency,
        node_sizes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    /// Fully connect a slice of nodes with the given weight
    fn clique(nodes: &[Uuid], weight: f64) -> Vec<(Uuid, Uuid, f64)> {
        let mut edges = Vec::new();
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                edges.push((nodes[i], nodes[j], weight));
            }
        }
        edges
    }

    #[test]
    fn two_cliques_become_two_communities() {
        let a = uuids(8);
        let b = uuids(8);
        let mut edges = clique(&a, 2.0);
        edges.extend(clique(&b, 2.0));
        // one weak bridge
        edges.push((a[0], b[0], 0.5));

        let all: Vec<Uuid> = a.iter().chain(b.iter()).copied().collect();
        let communities = leiden(&all, &edges, &LeidenParams::default());

        let community_a = communities[&a[0]];
        let community_b = communities[&b[0]];
        assert_ne!(community_a, community_b);
        for node in &a {
            assert_eq!(communities[node], community_a);
        }
        for node in &b {
            assert_eq!(communities[node], community_b);
        }
    }

    #[test]
    fn isolated_nodes_stay_singletons() {
        let nodes = uuids(4);
        let communities = leiden(&nodes, &[], &LeidenParams::default());
        let distinct: std::collections::HashSet<usize> = communities.values().copied().collect();
        assert_eq!(distinct.len(), 4);
    }

    #[test]
    fn result_is_deterministic() {
        let a = uuids(10);
        let b = uuids(10);
        let mut edges = clique(&a, 2.0);
        edges.extend(clique(&b, 2.0));
        edges.push((a[1], b[3], 0.5));
        let all: Vec<Uuid> = a.iter().chain(b.iter()).copied().collect();

        let first = leiden(&all, &edges, &LeidenParams::default());
        let second = leiden(&all, &edges, &LeidenParams::default());
        assert_eq!(first, second);
    }

    #[test]
    fn single_clique_is_one_community() {
        let nodes = uuids(12);
        let edges = clique(&nodes, 2.0);
        let communities = leiden(&nodes, &edges, &LeidenParams::default());
        let distinct: std::collections::HashSet<usize> = communities.values().copied().collect();
        assert_eq!(distinct.len(), 1);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(leiden(&[], &[], &LeidenParams::default()).is_empty());
    }

    #[test]
    fn edges_to_unknown_nodes_are_ignored() {
        let nodes = uuids(3);
        let stranger = Uuid::new_v4();
        let edges = vec![(nodes[0], stranger, 5.0), (nodes[0], nodes[1], 2.0)];
        let communities = leiden(&nodes, &edges, &LeidenParams::default());
        assert_eq!(communities.len(), 3);
        assert!(!communities.contains_key(&stranger));
    }
}
