//! Fuzzy name matching used for "did you mean" hints

use strsim::levenshtein;

/// A fuzzy match suggestion with candidate name and edit distance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub candidate: String,
    pub distance: usize,
}

/// Suggest similar symbol names from a list of qualified candidates.
///
/// An unqualified `name` is compared with the last segment of each
/// candidate, so `Statoin` finds `org.common.Station`; a dotted name is
/// compared with the whole candidate. Returns candidates sorted by edit
/// distance (closest first), ties by name. Exact matches are excluded.
/// Case-insensitive matches get distance 0, substring matches distance 1.
pub fn suggest_similar(name: &str, candidates: &[&str], max_distance: usize) -> Vec<Suggestion> {
    let qualified = name.contains('.');
    let name_lower = name.to_lowercase();
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .filter_map(|&candidate| {
            let compared = if qualified {
                candidate
            } else {
                candidate.rsplit('.').next().unwrap_or(candidate)
            };
            if compared == name {
                // Unqualified references may still name this symbol; only
                // the identical qualified name is no suggestion.
                return (!qualified && candidate != name).then(|| Suggestion {
                    candidate: candidate.to_string(),
                    distance: 0,
                });
            }
            let compared_lower = compared.to_lowercase();
            let distance = if compared_lower == name_lower {
                0
            } else if compared_lower.contains(&name_lower) || name_lower.contains(&compared_lower) {
                1
            } else {
                levenshtein(name, compared)
            };
            (distance <= max_distance).then(|| Suggestion {
                candidate: candidate.to_string(),
                distance,
            })
        })
        .collect();
    suggestions.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.candidate.cmp(&b.candidate))
    });
    suggestions
}

/// Format the closest suggestion as a hint suffix, or an empty string.
pub fn did_you_mean(suggestions: &[Suggestion]) -> String {
    suggestions
        .first()
        .map(|s| format!(" (did you mean '{}'?)", s.candidate))
        .unwrap_or_default()
}
