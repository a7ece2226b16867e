//! Rules that collapse a run of recorded steps into one replay operation.

use crate::replay::ops::{ActionKind, Operation};
use crate::selector::derive_selector;
use crate::types::Step;

/// Result of a rule firing on a look-ahead window.
#[derive(Debug, Clone, PartialEq)]
pub struct Collapse {
    pub operation: Operation,
    /// Steps consumed, the current one included. The engine bounds it to
    /// between 1 and the window length.
    pub consumed: usize,
}

/// A collapsing rule. `collapse` sees the current step followed by at most
/// `lookahead()` upcoming steps.
pub trait StepPattern: Send + Sync {
    fn name(&self) -> &'static str;

    fn lookahead(&self) -> usize;

    fn collapse(&self, window: &[Step]) -> Option<Collapse>;
}

pub fn default_patterns() -> Vec<Box<dyn StepPattern>> {
    vec![Box::new(SearchSubmit::default())]
}

/// Typing into a search field becomes fill, Enter, wait for load. Agents
/// usually record a submit click and a suggestion click right after the
/// search input; up to `trailing_clicks` directly following click steps are
/// absorbed, anything else stops the absorption.
#[derive(Debug, Clone)]
pub struct SearchSubmit {
    pub trailing_clicks: usize,
}

impl Default for SearchSubmit {
    fn default() -> Self {
        Self { trailing_clicks: 2 }
    }
}

impl StepPattern for SearchSubmit {
    fn name(&self) -> &'static str {
        "search_submit"
    }

    fn lookahead(&self) -> usize {
        self.trailing_clicks
    }

    fn collapse(&self, window: &[Step]) -> Option<Collapse> {
        let (first, rest) = window.split_first()?;
        if ActionKind::of(&first.name) != ActionKind::InputText {
            return None;
        }
        let meta = first.element();
        let selector = derive_selector(meta.as_ref())?;
        let text = first.param("text")?.as_str()?.to_string();

        let by_selector = selector.to_lowercase().contains("search");
        let by_attributes = meta.as_ref().is_some_and(|m| {
            m.attribute("type").is_some_and(|t| t.eq_ignore_ascii_case("search"))
                || m.attribute("name").is_some_and(|n| n.to_lowercase().contains("search"))
        });
        if !by_selector && !by_attributes {
            return None;
        }

        let absorbed = rest
            .iter()
            .take(self.trailing_clicks)
            .take_while(|s| ActionKind::of(&s.name) == ActionKind::ClickElement)
            .count();

        Some(Collapse {
            operation: Operation::SearchSubmit { selector, text },
            consumed: 1 + absorbed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(attributes: serde_json::Value) -> Step {
        Step::from_value(&json!({"name": "input_text", "params": {
            "input_text": {"text": "rust"},
            "interacted_element": {"attributes": attributes}
        }}))
    }

    fn click() -> Step {
        Step::from_value(&json!({"name": "click_element_by_index", "params": {"index": 9}}))
    }

    fn nav() -> Step {
        Step::from_value(&json!({"name": "go_to_url", "params": {"url": "https://a"}}))
    }

    #[test]
    fn search_fields_are_detected_three_ways() {
        let rule = SearchSubmit::default();
        for attrs in [
            json!({"id": "site-search"}),
            json!({"id": "q", "type": "SEARCH"}),
            json!({"name": "searchTerm"}),
        ] {
            let collapse = rule.collapse(&[input(attrs)]).unwrap();
            assert_eq!(collapse.consumed, 1);
            assert!(matches!(collapse.operation, Operation::SearchSubmit { ref text, .. } if text == "rust"));
        }
        assert!(rule.collapse(&[input(json!({"id": "username"}))]).is_none());
    }

    #[test]
    fn absorbs_only_directly_following_clicks() {
        let rule = SearchSubmit::default();
        let search = input(json!({"id": "search"}));

        let window = [search.clone(), click(), click()];
        assert_eq!(rule.collapse(&window).unwrap().consumed, 3);

        let window = [search.clone(), click(), nav()];
        assert_eq!(rule.collapse(&window).unwrap().consumed, 2);

        let window = [search, nav(), click()];
        assert_eq!(rule.collapse(&window).unwrap().consumed, 1);
    }

    #[test]
    fn needs_a_selector_and_text() {
        let rule = SearchSubmit::default();
        let no_meta = Step::from_value(&json!({"name": "input_text", "params": {"text": "x", "index": 1}}));
        assert!(rule.collapse(&[no_meta]).is_none());
        assert!(rule.collapse(&[click(), click()]).is_none());
        assert!(rule.collapse(&[]).is_none());
    }
}
