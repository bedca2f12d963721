//! Vector similarity helpers shared by search, resolution, and clustering.

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched dimensions or zero-magnitude inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 { dot / denom } else { 0.0 }
}

/// Mean of a set of equal-dimension vectors.
///
/// Used for cluster centroids. Returns `None` for an empty set; vectors with
/// mismatched dimensions are skipped.
#[must_use]
pub fn centroid(vectors: &[&[f32]]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dimension = first.len();

    let mut sum = vec![0.0f32; dimension];
    let mut count = 0usize;
    for vector in vectors {
        if vector.len() != dimension {
            continue;
        }
        for (acc, value) in sum.iter_mut().zip(vector.iter()) {
            *acc += value;
        }
        count += 1;
    }

    if count == 0 {
        return None;
    }
    for value in &mut sum {
        *value /= count as f32;
    }
    Some(sum)
}

/// Normalize a vector to unit length
#[must_use]
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let magnitude = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in &mut vector {
            *x /= magnitude;
        }
    }
    vector
}
