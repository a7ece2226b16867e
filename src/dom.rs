use anyhow::{Context, Result};
use headless_chrome::Tab;
use std::sync::Arc;

use crate::types::ElementMetadata;

pub const DOM_SNAPSHOT_MAX_CHARS: usize = 4000;
pub const PAGE_TEXT_MAX_CHARS: usize = 2000;

/// Attribute the snapshot stamps on interactive elements.
const INDEX_ATTR: &str = "data-arpa-index";

/// JavaScript injected into the page to produce a simplified DOM representation.
/// Reads the DOM without touching styles or layout.
///
/// The script:
///   1. Skips script, style, noscript, svg and link elements.
///   2. Walks the visible DOM tree (max depth 15).
///   3. Numbers interactive elements (a, button, input, textarea, select and
///      anything with a button/link role) through `data-arpa-index`.
///   4. Emits one `[N] ...` line per interactive element and quotes short
///      visible text leaves.
const SNAPSHOT_JS: &str = r#"
(() => {
  const SKIP = new Set(['SCRIPT','STYLE','NOSCRIPT','SVG','LINK']);
  const INTERACTIVE = new Set(['a','button','input','textarea','select']);
  let index = 0;
  const lines = [];
  const seen = new Set();

  document.querySelectorAll('[data-arpa-index]').forEach(el => el.removeAttribute('data-arpa-index'));

  function isVisible(el) {
    if (el.offsetParent === null && el.tagName !== 'BODY' && el.tagName !== 'HTML') return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
  }

  function label(el) {
    return (el.innerText || el.value || el.getAttribute('aria-label') || '').trim().slice(0, 60);
  }

  function walk(node, depth) {
    if (depth > 15) return;
    for (const child of node.children) {
      if (SKIP.has(child.tagName)) continue;
      if (!isVisible(child)) continue;
      const tag = child.tagName.toLowerCase();
      const role = child.getAttribute('role');
      if (INTERACTIVE.has(tag) || role === 'button' || role === 'link') {
        const i = index++;
        child.setAttribute('data-arpa-index', String(i));
        let desc = '[' + i + '] ' + tag;
        if (tag === 'input' || tag === 'textarea') {
          desc += ' type=' + (child.type || 'text');
          if (child.name) desc += ' name=' + child.name;
          if (child.placeholder) desc += ' placeholder="' + child.placeholder + '"';
          if (child.value) desc += ' value="' + child.value.slice(0, 30) + '"';
        } else if (tag === 'select') {
          desc += ' [' + [...child.options].map(o => o.text.trim().slice(0, 20)).join('|') + ']';
        } else {
          desc += ' "' + label(child) + '"';
        }
        lines.push(desc);
      } else if (child.children.length === 0) {
        const text = (child.textContent || '').trim();
        if (text.length > 2 && text.length < 200 && !seen.has(text)) {
          seen.add(text);
          lines.push('  "' + text.slice(0, 100) + '"');
        }
      }
      walk(child, depth + 1);
    }
  }

  walk(document.body, 0);
  return lines.join('\n');
})()
"#;

/// Describes the element stamped with index `__INDEX__` the way recorded
/// traces store it: attributes, a css path and an xpath without the leading
/// slash. Returns a JSON string, or null when the index is gone.
const DESCRIBE_JS: &str = r#"
(() => {
  const el = document.querySelector('[data-arpa-index="__INDEX__"]');
  if (!el) return null;

  const attributes = {};
  for (const a of el.attributes) {
    if (a.name !== 'data-arpa-index') attributes[a.name] = a.value;
  }

  function cssPath(node) {
    const parts = [];
    while (node && node.nodeType === 1 && node !== document.documentElement) {
      if (node.id) { parts.unshift('#' + CSS.escape(node.id)); break; }
      let part = node.tagName.toLowerCase();
      const same = [...(node.parentElement ? node.parentElement.children : [])]
        .filter(s => s.tagName === node.tagName);
      if (same.length > 1) part += ':nth-of-type(' + (same.indexOf(node) + 1) + ')';
      parts.unshift(part);
      node = node.parentElement;
    }
    return parts.join(' > ');
  }

  function xpath(node) {
    const parts = [];
    while (node && node.nodeType === 1) {
      const same = [...(node.parentElement ? node.parentElement.children : [])]
        .filter(s => s.tagName === node.tagName);
      const tag = node.tagName.toLowerCase();
      parts.unshift(same.length > 1 ? tag + '[' + (same.indexOf(node) + 1) + ']' : tag);
      node = node.parentElement;
    }
    return parts.join('/');
  }

  return JSON.stringify({
    tag_name: el.tagName.toLowerCase(),
    attributes,
    css_selector: cssPath(el),
    xpath: xpath(el),
  });
})()
"#;

/// CSS selector for the element the last snapshot numbered `index`.
pub fn index_selector(index: u64) -> String {
    format!("[{INDEX_ATTR}=\"{index}\"]")
}

/// Capture a simplified DOM snapshot from the current page.
pub fn capture_dom_snapshot(tab: &Arc<Tab>) -> Result<String> {
    let raw = evaluate_string(tab, SNAPSHOT_JS)?.unwrap_or_default();
    Ok(truncate(&raw, DOM_SNAPSHOT_MAX_CHARS))
}

/// Metadata of the element the last snapshot numbered `index`.
pub fn describe_element(tab: &Arc<Tab>, index: u64) -> Result<Option<ElementMetadata>> {
    let script = DESCRIBE_JS.replace("__INDEX__", &index.to_string());
    match evaluate_string(tab, &script)? {
        Some(json) => {
            let value: serde_json::Value =
                serde_json::from_str(&json).context("element description is not JSON")?;
            Ok(ElementMetadata::from_value(&value))
        }
        None => Ok(None),
    }
}

/// Visible text of the page body, truncated.
pub fn page_text(tab: &Arc<Tab>) -> Result<String> {
    let raw = evaluate_string(tab, "document.body ? document.body.innerText : ''")?.unwrap_or_default();
    Ok(truncate(&raw, PAGE_TEXT_MAX_CHARS))
}

/// Get the current page URL.
pub fn get_current_url(tab: &Arc<Tab>) -> Result<String> {
    Ok(evaluate_string(tab, "window.location.href")?.unwrap_or_else(|| "unknown".to_string()))
}

/// Get the current page title.
pub fn get_page_title(tab: &Arc<Tab>) -> Result<String> {
    Ok(evaluate_string(tab, "document.title")?.unwrap_or_else(|| "untitled".to_string()))
}

fn evaluate_string(tab: &Arc<Tab>, script: &str) -> Result<Option<String>> {
    let result = tab.evaluate(script, false)?;
    Ok(result.value.and_then(|v| v.as_str().map(String::from)))
}

fn truncate(raw: &str, max_chars: usize) -> String {
    let total = raw.chars().count();
    if total <= max_chars {
        return raw.to_string();
    }
    let head: String = raw.chars().take(max_chars).collect();
    format!("{head}\n... [truncated, {total} total chars]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 2), "hé\n... [truncated, 5 total chars]");
    }

    #[test]
    fn index_selector_matches_snapshot_attribute() {
        assert_eq!(index_selector(4), "[data-arpa-index=\"4\"]");
        assert!(SNAPSHOT_JS.contains(INDEX_ATTR));
        assert!(DESCRIBE_JS.contains(INDEX_ATTR));
    }
}
