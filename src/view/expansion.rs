use crate::catalog::MovieSummary;
use std::collections::HashSet;

/// Items shown for a collapsed category.
pub const PREVIEW_LIMIT: usize = 10;

/// Expand/collapse state per category label.
///
/// Purely local: categories start collapsed, and nothing here touches the
/// network or the store.
#[derive(Debug, Clone)]
pub struct ExpansionView {
    expanded: HashSet<String>,
    preview_limit: usize,
}

impl Default for ExpansionView {
    fn default() -> Self {
        Self::with_limit(PREVIEW_LIMIT)
    }
}

impl ExpansionView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(preview_limit: usize) -> Self {
        Self {
            expanded: HashSet::new(),
            preview_limit,
        }
    }

    pub fn preview_limit(&self) -> usize {
        self.preview_limit
    }

    pub fn is_expanded(&self, label: &str) -> bool {
        self.expanded.contains(label)
    }

    /// Flips the category and returns its new state.
    pub fn toggle(&mut self, label: &str) -> bool {
        if self.expanded.remove(label) {
            false
        } else {
            self.expanded.insert(label.to_string());
            true
        }
    }

    pub fn set_expanded(&mut self, label: &str, expanded: bool) {
        if expanded {
            self.expanded.insert(label.to_string());
        } else {
            self.expanded.remove(label);
        }
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    /// The slice of `items` to render for `label`.
    pub fn visible_items<'a>(&self, label: &str, items: &'a [MovieSummary]) -> &'a [MovieSummary] {
        if self.is_expanded(label) {
            items
        } else {
            &items[..items.len().min(self.preview_limit)]
        }
    }

    /// Items past the preview, for the "show all (n)" control. Zero when
    /// expanded or when everything already fits.
    pub fn hidden_count(&self, label: &str, items: &[MovieSummary]) -> usize {
        items.len() - self.visible_items(label, items).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<MovieSummary> {
        (0..n)
            .map(|i| MovieSummary {
                id: format!("tt{i}"),
                title: format!("Movie {i}"),
                year: "2000".into(),
                poster_url: "N/A".into(),
                kind: "movie".into(),
            })
            .collect()
    }

    #[test]
    fn test_collapsed_by_default() {
        let view = ExpansionView::new();
        let movies = items(25);
        assert!(!view.is_expanded("Action"));
        assert_eq!(view.visible_items("Action", &movies).len(), PREVIEW_LIMIT);
        assert_eq!(view.hidden_count("Action", &movies), 15);
    }

    #[test]
    fn test_toggle_twice_restores_preview() {
        let mut view = ExpansionView::new();
        let movies = items(25);

        assert!(view.toggle("Action"));
        assert_eq!(view.visible_items("Action", &movies).len(), 25);
        assert_eq!(view.hidden_count("Action", &movies), 0);

        assert!(!view.toggle("Action"));
        assert_eq!(view.visible_items("Action", &movies).len(), PREVIEW_LIMIT);
    }

    #[test]
    fn test_categories_independent() {
        let mut view = ExpansionView::new();
        view.toggle("Action");
        assert!(view.is_expanded("Action"));
        assert!(!view.is_expanded("Drama"));

        view.collapse_all();
        assert!(!view.is_expanded("Action"));
    }

    #[test]
    fn test_short_category_has_nothing_hidden() {
        let view = ExpansionView::with_limit(10);
        let movies = items(4);
        assert_eq!(view.visible_items("Kids", &movies).len(), 4);
        assert_eq!(view.hidden_count("Kids", &movies), 0);
    }
}
