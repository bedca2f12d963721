//! TF-IDF cluster naming support.
//!
//! IDF is cluster-based: a term's document frequency is the number of
//! clusters whose statements mention it. TF is the term's occurrence count
//! within the target cluster normalised by cluster size. The top distinctive
//! terms per slot (subjects, predicates, objects) feed the naming prompt.

use std::collections::HashMap;

/// Per-cluster term occurrence counts, split by slot
#[derive(Debug, Clone, Default)]
pub struct ClusterTerms {
    pub subjects: HashMap<String, usize>,
    pub predicates: HashMap<String, usize>,
    pub objects: HashMap<String, usize>,
    /// Member statement count
    pub size: usize,
}

/// Top distinctive terms for one cluster, per slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistinctiveTerms {
    pub subjects: Vec<String>,
    pub predicates: Vec<String>,
    pub objects: Vec<String>,
}

/// Score the target cluster's terms against all clusters and keep the
/// `top_n` per slot.
#[must_use]
pub fn distinctive_terms(
    target: &ClusterTerms,
    all_clusters: &[&ClusterTerms],
    top_n: usize,
) -> DistinctiveTerms {
    DistinctiveTerms {
        subjects: top_terms(&target.subjects, target.size, all_clusters, |c| &c.subjects, top_n),
        predicates: top_terms(
            &target.predicates,
            target.size,
            all_clusters,
            |c| &c.predicates,
            top_n,
        ),
        objects: top_terms(&target.objects, target.size, all_clusters, |c| &c.objects, top_n),
    }
}

fn top_terms(
    counts: &HashMap<String, usize>,
    cluster_size: usize,
    all_clusters: &[&ClusterTerms],
    slot: impl Fn(&ClusterTerms) -> &HashMap<String, usize>,
    top_n: usize,
) -> Vec<String> {
    if counts.is_empty() || cluster_size == 0 {
        return Vec::new();
    }
    let total_clusters = all_clusters.len().max(1) as f64;

    let mut scored: Vec<(String, f64)> = counts
        .iter()
        .map(|(term, &count)| {
            // DF = clusters containing the term (the target is among them)
            let document_frequency = all_clusters
                .iter()
                .filter(|cluster| slot(cluster).contains_key(term))
                .count()
                .max(1) as f64;
            let tf = count as f64 / cluster_size as f64;
            let idf = (total_clusters / document_frequency).ln();
            (term.clone(), tf * idf)
        })
        .collect();

    // Score descending, term ascending for determinism
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.into_iter().take(top_n).map(|(term, _)| term).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(entries: &[(&str, usize)], size: usize) -> ClusterTerms {
        ClusterTerms {
            subjects: entries
                .iter()
                .map(|(t, c)| ((*t).to_string(), *c))
                .collect(),
            predicates: HashMap::new(),
            objects: HashMap::new(),
            size,
        }
    }

    #[test]
    fn ubiquitous_terms_score_zero() {
        let a = terms(&[("coffee", 5), ("user", 5)], 10);
        let b = terms(&[("git", 4), ("user", 4)], 8);
        let all = vec![&a, &b];

        let distinctive = distinctive_terms(&a, &all, 10);
        // "user" appears in every cluster → IDF ln(1) = 0, sorts last
        assert_eq!(distinctive.subjects[0], "coffee");
    }

    #[test]
    fn unique_terms_beat_shared_ones() {
        let a = terms(&[("espresso", 2), ("shared", 8)], 10);
        let b = terms(&[("shared", 3)], 10);
        let c = terms(&[("shared", 1)], 10);
        let all = vec![&a, &b, &c];

        let distinctive = distinctive_terms(&a, &all, 2);
        assert_eq!(distinctive.subjects[0], "espresso");
    }

    #[test]
    fn top_n_is_respected() {
        let entries: Vec<(String, usize)> =
            (0..20).map(|i| (format!("term{i:02}"), 1)).collect();
        let cluster = ClusterTerms {
            subjects: entries.into_iter().collect(),
            predicates: HashMap::new(),
            objects: HashMap::new(),
            size: 20,
        };
        let all = vec![&cluster];
        let distinctive = distinctive_terms(&cluster, &all, 10);
        assert_eq!(distinctive.subjects.len(), 10);
    }

    #[test]
    fn empty_cluster_yields_no_terms() {
        let cluster = ClusterTerms::default();
        let all = vec![&cluster];
        assert_eq!(distinctive_terms(&cluster, &all, 10), DistinctiveTerms::default());
    }
}
