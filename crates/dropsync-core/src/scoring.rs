//! Deterministic confidence scoring for category auto-mapping.
//!
//! The supplier reports category paths like `"Men > Leather Wallets"`; we
//! score them against internal category names with a normalized token
//! overlap (Jaccard). The formula is intentionally simple so that the same
//! inputs always produce the same confidence, which makes low-confidence
//! review listings stable across runs.

use std::collections::BTreeSet;

/// Bonus applied when every internal-category token also appears somewhere
/// in the full external path (not just the last segment).
const FULL_PATH_BONUS: f64 = 0.1;

/// Splits a string into its lowercased alphanumeric tokens.
///
/// Everything that is not alphanumeric acts as a separator, so
/// `"Leather-Wallets & Belts"` tokenizes to `{leather, wallets, belts}`.
fn tokenize(s: &str) -> BTreeSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Returns the last `>`-separated segment of a category path.
///
/// `"Men > Accessories > Wallets"` yields `"Wallets"`; a path without `>`
/// is returned unchanged.
fn leaf_segment(path: &str) -> &str {
    path.rsplit('>').next().unwrap_or(path).trim()
}

/// Computes the confidence that `external_category` maps onto the internal
/// category named `internal_name`.
///
/// Score = Jaccard(tokens(leaf segment), tokens(internal name)), plus
/// [`FULL_PATH_BONUS`] when the leaf overlaps at all and every internal
/// token appears in the full path. The result is clamped to [0, 1] and
/// rounded to three decimals so it fits the stored `NUMERIC(4,3)` exactly.
#[must_use]
pub fn confidence(external_category: &str, internal_name: &str) -> f64 {
    let leaf = tokenize(leaf_segment(external_category));
    let internal = tokenize(internal_name);
    if leaf.is_empty() || internal.is_empty() {
        return 0.0;
    }

    let intersection = leaf.intersection(&internal).count();
    let union = leaf.union(&internal).count();
    #[allow(clippy::cast_precision_loss)]
    let mut score = intersection as f64 / union as f64;

    if score > 0.0 {
        let full_path = tokenize(external_category);
        if internal.iter().all(|t| full_path.contains(t)) {
            score += FULL_PATH_BONUS;
        }
    }

    (score.min(1.0) * 1000.0).round() / 1000.0
}

/// Picks the best-scoring internal category for an external category path.
///
/// Candidates are `(category_id, category_name)` pairs. Ties are broken by
/// the lower id so repeated runs are deterministic. Returns `None` only for
/// an empty candidate list.
#[must_use]
pub fn best_match(external_category: &str, candidates: &[(i64, String)]) -> Option<(i64, f64)> {
    candidates
        .iter()
        .map(|(id, name)| (*id, confidence(external_category, name)))
        .max_by(|(id_a, score_a), (id_b, score_b)| {
            score_a
                .partial_cmp(score_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(id_b.cmp(id_a))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_name_match_scores_above_threshold() {
        let score = confidence("Men > Wallets", "Wallets");
        assert!(score >= 0.9, "exact leaf match should be high, got {score}");
    }

    #[test]
    fn full_path_bonus_applies_when_internal_tokens_in_path() {
        let with_bonus = confidence("Accessories > Leather Wallets", "Leather Wallets");
        // Leaf Jaccard is 1.0 already; bonus must not push past 1.0.
        assert!((with_bonus - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unrelated_categories_score_zero() {
        assert!((confidence("Home > Kitchen Knives", "Phone Cases")).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_overlap_lands_between_zero_and_one() {
        let score = confidence("Men > Leather Wallets", "Wallets & Belts");
        assert!(score > 0.0 && score < 1.0, "partial overlap: {score}");
    }

    #[test]
    fn scoring_is_deterministic() {
        let a = confidence("Men > Leather Wallets", "Wallets");
        let b = confidence("Men > Leather Wallets", "Wallets");
        assert!((a - b).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert!((confidence("", "Wallets")).abs() < f64::EPSILON);
        assert!((confidence("Men > Wallets", "")).abs() < f64::EPSILON);
    }

    #[test]
    fn best_match_prefers_highest_score() {
        let candidates = vec![
            (1, "Phone Cases".to_string()),
            (2, "Wallets".to_string()),
            (3, "Kitchen".to_string()),
        ];
        let (id, score) = best_match("Men > Leather Wallets", &candidates).expect("some match");
        assert_eq!(id, 2);
        assert!(score > 0.0);
    }

    #[test]
    fn best_match_breaks_ties_on_lower_id() {
        let candidates = vec![(7, "Gadgets".to_string()), (3, "Widgets".to_string())];
        // Both score 0.0; the lower id must win for determinism.
        let (id, score) = best_match("Men > Wallets", &candidates).expect("some match");
        assert_eq!(id, 3);
        assert!(score.abs() < f64::EPSILON);
    }

    #[test]
    fn best_match_none_for_empty_candidates() {
        assert!(best_match("Men > Wallets", &[]).is_none());
    }
}
