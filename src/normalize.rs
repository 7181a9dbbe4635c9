//! Maps noisy field labels onto the master schema.

use crate::schema::Field;
use crate::MATCH_CUTOFF;

/// Fuzzy label lookup with a fixed confidence cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelMatcher {
    cutoff: f64,
}

impl Default for LabelMatcher {
    fn default() -> Self {
        Self::new(MATCH_CUTOFF)
    }
}

impl LabelMatcher {
    pub fn new(cutoff: f64) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Returns the schema field closest to `raw_label`, or `None` if nothing
    /// reaches the cutoff.
    pub fn normalize(&self, raw_label: &str, schema: &[Field]) -> Option<Field> {
        let label = collapse_whitespace(raw_label);
        best_match(&label, schema.iter().map(|&f| (f, f.label())), self.cutoff)
    }
}

/// Trims and folds every run of whitespace (newlines included) into one space.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Picks the candidate with the highest [`similarity`] to `label`, provided it is
/// at least `cutoff`.
///
/// Ties on similarity go to the smaller edit distance, then to the earlier candidate.
pub fn best_match<'a, T>(
    label: &str,
    candidates: impl IntoIterator<Item = (T, &'a str)>,
    cutoff: f64,
) -> Option<T> {
    let mut best: Option<(T, f64, usize)> = None;

    for (candidate, text) in candidates {
        let score = similarity(text, label);
        if score < cutoff {
            continue;
        }
        let distance = strsim::levenshtein(label, text);
        let better = match &best {
            None => true,
            Some((_, best_score, best_distance)) => {
                score > *best_score || (score == *best_score && distance < *best_distance)
            }
        };
        if better {
            best = Some((candidate, score, distance));
        }
    }

    best.map(|(candidate, _, _)| candidate)
}

/// `2 * M / T` where `T` is the combined length and `M` the chars covered by the
/// matching blocks of `a` and `b`: the longest common run, then recursively the
/// longest runs left and right of it. `1.0` for identical strings, `0.0` for disjoint ones.
///
/// Shared letters scattered between blocks don't count, so this is stricter than a
/// common-subsequence ratio. `a` is the candidate and `b` the label looked up; the
/// order only matters for which of several equally long runs is taken.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_len(&a, &b) as f64 / total as f64
}

fn matched_len(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_run(a, b, (alo, ahi), (blo, bhi));
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]` as `(start in a, start in b, len)`.
/// The earliest one in `a`, then in `b`, wins a tie.
fn longest_run(
    a: &[char],
    b: &[char],
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best) = (alo, blo, 0);
    let width = bhi - blo;
    // Length of the run ending at the current `a` char and `b[blo + k]`, at index `k + 1`.
    let mut prev = vec![0usize; width + 1];
    let mut curr = vec![0usize; width + 1];

    for i in alo..ahi {
        for k in 0..width {
            curr[k + 1] = if a[i] == b[blo + k] { prev[k] + 1 } else { 0 };
            if curr[k + 1] > best {
                best = curr[k + 1];
                best_i = i + 1 - best;
                best_j = blo + k + 1 - best;
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    (best_i, best_j, best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_newlines_before_matching() {
        let matcher = LabelMatcher::default();
        assert_eq!(
            matcher.normalize("Year/Date\nof Composition", &Field::ALL),
            Some(Field::CompositionDate)
        );
        assert_eq!(collapse_whitespace("  Piece \n\t Style "), "Piece Style");
    }

    #[test]
    fn exact_and_abbreviated_labels() {
        let matcher = LabelMatcher::default();
        assert_eq!(matcher.normalize("Key", &Field::ALL), Some(Field::Key));
        assert_eq!(matcher.normalize("Composer", &Field::ALL), Some(Field::Composer));
        assert_eq!(
            matcher.normalize("Average Duration", &Field::ALL),
            Some(Field::AverageDuration)
        );
        assert_eq!(
            matcher.normalize("Movements/Sections", &Field::ALL),
            Some(Field::Movements)
        );
        assert_eq!(
            matcher.normalize("Opus/Catalogue NumberOp./Cat. No.", &Field::ALL),
            Some(Field::CatalogueNumber)
        );
    }

    #[test]
    fn unrelated_labels_are_dropped() {
        let matcher = LabelMatcher::default();
        for label in ["Librettist", "Misc. Comments", "First Publication", ""] {
            assert_eq!(matcher.normalize(label, &Field::ALL), None, "{label}");
        }
    }

    #[test]
    fn cutoff_is_inclusive() {
        // "abcd" vs "ab": 2 * 2 / 6
        let score = similarity("abcd", "ab");
        assert_eq!(best_match("ab", [((), "abcd")], score), Some(()));
        assert_eq!(best_match("ab", [((), "abcd")], score + 1e-9), None);
    }

    #[test]
    fn scattered_letters_do_not_add_up_to_a_match() {
        // Plenty of letters in common with "Composer Time PeriodComp. Period",
        // but only "Compos" and " Period" as runs.
        let matcher = LabelMatcher::default();
        assert_eq!(matcher.normalize("Compositional Period", &Field::ALL), None);
        assert!(similarity(Field::ComposerPeriod.label(), "Compositional Period") < 0.6);
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        // The first run "a" leaves nothing to its right in "bca", so the common
        // subsequence "ba" only scores one char.
        assert!((similarity("aba", "bca") - 2.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn highest_similarity_wins() {
        let picked = best_match("Instrument", [(0, "Instrumentation"), (1, "Instrument")], 0.6);
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn ties_break_on_edit_distance_then_order() {
        // Both score 0.75; "abcx" is one substitution away, "abdc" two.
        assert_eq!(best_match("abcd", [(0, "abdc"), (1, "abcx")], 0.6), Some(1));
        // Same score and distance: first declared wins.
        assert_eq!(best_match("abc", [(0, "abcd"), (1, "abce")], 0.6), Some(0));
    }

    #[test]
    fn restricted_schema() {
        let matcher = LabelMatcher::default();
        assert_eq!(matcher.normalize("Key", &[Field::Composer]), None);
    }
}
