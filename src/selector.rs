//! Picks one DOM selector for a recorded element.
//!
//! Ids and test attributes survive re-renders best, so they come first; the
//! recorded xpath is the last resort.

use crate::types::ElementMetadata;

const XPATH_PREFIX: &str = "xpath=";

pub fn derive_selector(meta: Option<&ElementMetadata>) -> Option<String> {
    let meta = meta?;
    if let Some(id) = meta.attribute("id") {
        return Some(format!("#{id}"));
    }
    if let Some(test_id) = meta.attribute("data-test") {
        return Some(format!("[data-test=\"{test_id}\"]"));
    }
    if let Some(name) = meta.attribute("name") {
        return Some(format!("[name=\"{name}\"]"));
    }
    if let Some(css) = meta.css_selector.as_deref().filter(|s| !s.is_empty()) {
        return Some(css.to_string());
    }
    meta.xpath
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|xpath| {
            if xpath.starts_with('/') {
                format!("{XPATH_PREFIX}{xpath}")
            } else {
                format!("{XPATH_PREFIX}/{xpath}")
            }
        })
}

/// Splits a derived selector into the form the page capability locates by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator<'a> {
    Css(&'a str),
    XPath(&'a str),
}

impl<'a> Locator<'a> {
    pub fn parse(selector: &'a str) -> Self {
        match selector.strip_prefix(XPATH_PREFIX) {
            Some(xpath) => Locator::XPath(xpath),
            None => Locator::Css(selector),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: serde_json::Value) -> ElementMetadata {
        ElementMetadata::from_value(&value).unwrap()
    }

    #[test]
    fn id_beats_everything() {
        let m = meta(json!({
            "attributes": {"id": "go-btn", "data-test": "go", "name": "go"},
            "css_selector": "button.go",
            "xpath": "/html/body/button"
        }));
        assert_eq!(derive_selector(Some(&m)).as_deref(), Some("#go-btn"));
    }

    #[test]
    fn attribute_priority_holds() {
        let m = meta(json!({"attributes": {"data-test": "login", "name": "user"}}));
        assert_eq!(derive_selector(Some(&m)).as_deref(), Some("[data-test=\"login\"]"));

        let m = meta(json!({"attributes": {"name": "user"}, "css_selector": "#x"}));
        assert_eq!(derive_selector(Some(&m)).as_deref(), Some("[name=\"user\"]"));
    }

    #[test]
    fn css_beats_xpath() {
        let m = meta(json!({
            "attributes": {},
            "css_selector": ".foo > .bar",
            "xpath": "/html/body/div"
        }));
        assert_eq!(derive_selector(Some(&m)).as_deref(), Some(".foo > .bar"));
    }

    #[test]
    fn xpath_gets_exactly_one_leading_slash() {
        let m = meta(json!({"xpath": "html/body"}));
        assert_eq!(derive_selector(Some(&m)).as_deref(), Some("xpath=/html/body"));

        let m = meta(json!({"xpath": "/html/body"}));
        assert_eq!(derive_selector(Some(&m)).as_deref(), Some("xpath=/html/body"));
    }

    #[test]
    fn nothing_usable_yields_none() {
        assert_eq!(derive_selector(None), None);
        assert_eq!(derive_selector(Some(&meta(json!({"attributes": {"class": "a"}})))), None);
    }

    #[test]
    fn locator_splits_xpath_prefix() {
        assert_eq!(Locator::parse("xpath=/html/body"), Locator::XPath("/html/body"));
        assert_eq!(Locator::parse("#q"), Locator::Css("#q"));
    }
}
