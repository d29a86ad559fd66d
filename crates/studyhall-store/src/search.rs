use tracing::warn;

use studyhall_core::config::RETRIEVAL_TOPK_CAP;

use crate::error::{Result, StoreError};
use crate::types::{SearchCandidate, SearchHit};

/// Character budget for a result excerpt, trimmed at whitespace.
const EXCERPT_CHAR_BUDGET: usize = 400;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Rank a course's candidates against a query vector.
///
/// The query vector must have length `dim` — anything else is a caller
/// bug and fails loudly. Stored rows with a mismatched dimension are
/// skipped with a warning (a deployment defect, but one that must not
/// corrupt the ranking of healthy rows).
///
/// Results are sorted by similarity descending, ties broken by
/// creation time ascending. `k` is capped at the deployment-wide limit.
pub fn rank(
    candidates: Vec<SearchCandidate>,
    query: &[f32],
    k: usize,
    dim: usize,
) -> Result<Vec<SearchHit>> {
    if query.len() != dim {
        return Err(StoreError::DimensionMismatch {
            expected: dim,
            got: query.len(),
        });
    }
    let k = k.min(RETRIEVAL_TOPK_CAP);
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut scored: Vec<(f32, SearchCandidate)> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if c.embedding.len() != dim {
            warn!(
                material_id = %c.material_id,
                stored = c.embedding.len(),
                expected = dim,
                "skipping material with mismatched vector dimension"
            );
            continue;
        }
        let sim = cosine_similarity(query, &c.embedding);
        scored.push((sim, c));
    }

    scored.sort_by(|(sa, ca), (sb, cb)| {
        sb.total_cmp(sa)
            .then_with(|| ca.created_at.cmp(&cb.created_at))
            .then_with(|| ca.material_id.cmp(&cb.material_id))
    });

    Ok(scored
        .into_iter()
        .take(k)
        .map(|(similarity, c)| SearchHit {
            material_id: c.material_id,
            name: c.name,
            excerpt: excerpt(&c.extracted_text),
            similarity,
            media_type: c.media_type,
        })
        .collect())
}

/// Deterministic excerpt: a prefix of the extracted text within the
/// character budget, cut back to the last whitespace so words stay whole.
pub fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= EXCERPT_CHAR_BUDGET {
        return trimmed.to_string();
    }
    let prefix: String = trimmed.chars().take(EXCERPT_CHAR_BUDGET).collect();
    match prefix.rfind(char::is_whitespace) {
        Some(cut) if cut > 0 => prefix[..cut].trim_end().to_string(),
        _ => prefix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, created_at: &str, embedding: Vec<f32>, text: &str) -> SearchCandidate {
        SearchCandidate {
            material_id: id.to_string(),
            name: format!("{id}.pdf"),
            media_type: "application/pdf".to_string(),
            created_at: created_at.to_string(),
            embedding,
            extracted_text: text.to_string(),
        }
    }

    #[test]
    fn identical_vector_scores_one() {
        let v = vec![0.3f32, -0.5, 0.8];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn zero_vector_scores_zero_not_nan() {
        let sim = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn ranking_is_descending() {
        let candidates = vec![
            candidate("far", "2026-01-01T00:00:00Z", vec![0.0, 1.0], "far text"),
            candidate("near", "2026-01-02T00:00:00Z", vec![1.0, 0.05], "near text"),
            candidate("mid", "2026-01-03T00:00:00Z", vec![0.7, 0.7], "mid text"),
        ];
        let hits = rank(candidates, &[1.0, 0.0], 3, 2).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.material_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn ties_break_by_creation_time_ascending() {
        let candidates = vec![
            candidate("younger", "2026-02-01T00:00:00Z", vec![1.0, 0.0], "b"),
            candidate("older", "2026-01-01T00:00:00Z", vec![1.0, 0.0], "a"),
        ];
        let hits = rank(candidates, &[1.0, 0.0], 2, 2).unwrap();
        assert_eq!(hits[0].material_id, "older");
        assert_eq!(hits[1].material_id, "younger");
    }

    #[test]
    fn k_is_capped() {
        let candidates: Vec<_> = (0..20)
            .map(|i| {
                candidate(
                    &format!("m{i:02}"),
                    "2026-01-01T00:00:00Z",
                    vec![1.0, i as f32 * 0.01],
                    "text",
                )
            })
            .collect();
        let hits = rank(candidates, &[1.0, 0.0], 50, 2).unwrap();
        assert_eq!(hits.len(), RETRIEVAL_TOPK_CAP);
    }

    #[test]
    fn query_dimension_mismatch_fails_loudly() {
        let candidates = vec![candidate("a", "2026-01-01T00:00:00Z", vec![1.0, 0.0], "t")];
        match rank(candidates, &[1.0, 0.0, 0.0], 3, 2) {
            Err(StoreError::DimensionMismatch { expected, got }) => {
                assert_eq!(expected, 2);
                assert_eq!(got, 3);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn stored_dimension_mismatch_is_skipped() {
        let candidates = vec![
            candidate("bad", "2026-01-01T00:00:00Z", vec![1.0, 0.0, 0.0], "bad"),
            candidate("good", "2026-01-02T00:00:00Z", vec![1.0, 0.0], "good"),
        ];
        let hits = rank(candidates, &[1.0, 0.0], 3, 2).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].material_id, "good");
    }

    #[test]
    fn empty_course_returns_empty_not_error() {
        let hits = rank(Vec::new(), &[1.0, 0.0], 3, 2).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn excerpt_trims_at_whitespace() {
        let text = "word ".repeat(200);
        let e = excerpt(&text);
        assert!(e.chars().count() <= EXCERPT_CHAR_BUDGET);
        assert!(e.ends_with("word"));

        let short = "short text";
        assert_eq!(excerpt(short), "short text");
    }
}
