/// The four canonical personality states. Values of this enum are only ever
/// produced by [`Category::resolve`] or [`Category::from_letter`]; free-form
/// descriptive input never reaches the rest of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Concealed,
    Triggered,
    Regulated,
    Lead,
}

impl Category {
    /// Fixed priority order. Every tie-break and fallback in the engine uses
    /// this order and no other.
    pub const ALL: [Category; 4] = [
        Category::Concealed,
        Category::Triggered,
        Category::Regulated,
        Category::Lead,
    ];

    pub fn letter(self) -> char {
        match self {
            Category::Concealed => 'C',
            Category::Triggered => 'T',
            Category::Regulated => 'R',
            Category::Lead => 'L',
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Category::Concealed => "Concealed",
            Category::Triggered => "Triggered",
            Category::Regulated => "Regulated",
            Category::Lead => "Lead",
        }
    }

    fn canonical_name(self) -> &'static str {
        match self {
            Category::Concealed => "CONCEALED",
            Category::Triggered => "TRIGGERED",
            Category::Regulated => "REGULATED",
            Category::Lead => "LEAD",
        }
    }

    pub fn from_letter(letter: char) -> Option<Category> {
        match letter.to_ascii_uppercase() {
            'C' => Some(Category::Concealed),
            'T' => Some(Category::Triggered),
            'R' => Some(Category::Regulated),
            'L' => Some(Category::Lead),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Category::Concealed => 0,
            Category::Triggered => 1,
            Category::Regulated => 2,
            Category::Lead => 3,
        }
    }

    /// Normalizes arbitrary descriptive input into a category. Ordered steps,
    /// first match wins:
    ///
    /// 1. trimmed input whose first character is a canonical letter;
    /// 2. exact match against a canonical state name;
    /// 3. exact match after stripping every non-letter character;
    /// 4. substring containment of a canonical name, tested in the fixed
    ///    C, T, R, L order;
    /// 5. no match.
    pub fn resolve(raw: &str) -> Option<Category> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let upper = trimmed.to_uppercase();

        if let Some(first) = upper.chars().next() {
            if let Some(category) = Category::from_letter(first) {
                return Some(category);
            }
        }

        for category in Category::ALL {
            if upper == category.canonical_name() {
                return Some(category);
            }
        }

        let cleaned: String = upper.chars().filter(|c| c.is_ascii_alphabetic()).collect();
        for category in Category::ALL {
            if cleaned == category.canonical_name() {
                return Some(category);
            }
        }

        for category in Category::ALL {
            if cleaned.contains(category.canonical_name()) {
                return Some(category);
            }
        }

        None
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Per-category numeric scores, summed across whatever totals or band data
/// the payload supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryScores {
    values: [f64; 4],
}

impl CategoryScores {
    pub fn add(&mut self, category: Category, amount: f64) {
        if amount.is_finite() {
            self.values[category.index()] += amount;
        }
    }

    pub fn get(&self, category: Category) -> f64 {
        self.values[category.index()]
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }
}

/// Picks the second category when the payload does not name one: the
/// highest-scoring category other than the dominant. Ties at the maximum,
/// and the all-zero case, fall back to the fixed C, T, R, L order. Scanning
/// in that order and replacing only on a strictly greater score implements
/// exactly that rule.
pub fn second_category(dominant: Category, scores: &CategoryScores) -> Category {
    let mut best = None;
    for category in Category::ALL {
        if category == dominant {
            continue;
        }
        let score = scores.get(category);
        match best {
            None => best = Some((category, score)),
            Some((_, top)) if score > top => best = Some((category, score)),
            _ => {}
        }
    }
    match best {
        Some((category, _)) => category,
        // Unreachable: three candidates always remain.
        None => Category::Concealed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_accepts_explicit_letters() {
        assert_eq!(Category::resolve("T"), Some(Category::Triggered));
        assert_eq!(Category::resolve(" r "), Some(Category::Regulated));
        assert_eq!(Category::resolve("l"), Some(Category::Lead));
    }

    #[test]
    fn resolve_variants_of_one_name_agree() {
        let expected = Some(Category::Triggered);
        assert_eq!(Category::resolve("triggered"), expected);
        assert_eq!(Category::resolve("T"), expected);
        assert_eq!(Category::resolve("  trig!!gered  "), expected);
    }

    #[test]
    fn resolve_matches_cleaned_full_names() {
        assert_eq!(Category::resolve("(regulated)"), Some(Category::Regulated));
        assert_eq!(Category::resolve("*lead*"), Some(Category::Lead));
    }

    #[test]
    fn resolve_matches_substring_containment() {
        assert_eq!(
            Category::resolve("(mostly concealed today)"),
            Some(Category::Concealed)
        );
    }

    #[test]
    fn resolve_leading_letter_wins_over_contained_name() {
        // "largely triggered" starts with an L: step 1 decides before the
        // containment step ever runs.
        assert_eq!(Category::resolve("largely triggered"), Some(Category::Lead));
    }

    #[test]
    fn resolve_rejects_unrelated_input() {
        assert_eq!(Category::resolve(""), None);
        assert_eq!(Category::resolve("   "), None);
        assert_eq!(Category::resolve("(unknown)"), None);
    }

    #[test]
    fn second_category_picks_highest_non_dominant_score() {
        let mut scores = CategoryScores::default();
        scores.add(Category::Concealed, 1.0);
        scores.add(Category::Triggered, 3.0);
        scores.add(Category::Lead, 2.0);
        assert_eq!(
            second_category(Category::Regulated, &scores),
            Category::Triggered
        );
    }

    #[test]
    fn second_category_never_returns_the_dominant() {
        let mut scores = CategoryScores::default();
        scores.add(Category::Triggered, 99.0);
        assert_eq!(
            second_category(Category::Triggered, &scores),
            Category::Concealed
        );
    }

    #[test]
    fn second_category_breaks_ties_in_priority_order() {
        let mut scores = CategoryScores::default();
        scores.add(Category::Regulated, 5.0);
        scores.add(Category::Lead, 5.0);
        assert_eq!(
            second_category(Category::Concealed, &scores),
            Category::Regulated
        );
    }

    #[test]
    fn second_category_all_zero_falls_back_to_priority_order() {
        let scores = CategoryScores::default();
        assert_eq!(
            second_category(Category::Concealed, &scores),
            Category::Triggered
        );
        assert_eq!(
            second_category(Category::Triggered, &scores),
            Category::Concealed
        );
    }
}
