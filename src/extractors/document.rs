// src/extractors/document.rs

//! Minimal capability interface between the extraction core and an HTML library.
//!
//! The core only needs to find nodes by CSS selector, walk to a parent or the next
//! sibling element, and read visible text and attributes. `HtmlPage` implements this
//! on top of `scraper`; any other DOM library can plug in by implementing the two traits.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::utils::error::ExtractError;

/// A node in a rendered page. Copies are cheap handles into the owning document.
pub trait PageNode<'a>: Copy + PartialEq + Sized {
    /// Text fragments of this node and its descendants, in document order.
    fn text_fragments(&self) -> Vec<&'a str>;

    fn attribute(&self, name: &str) -> Option<&'a str>;

    /// Descendants matching `css`, in document order. An invalid selector matches nothing.
    fn select_all(&self, css: &str) -> Vec<Self>;

    fn matches_css(&self, css: &str) -> bool;

    fn parent_element(&self) -> Option<Self>;

    fn next_element(&self) -> Option<Self>;

    /// Concatenated visible text, markup stripped.
    fn visible_text(&self) -> String {
        self.text_fragments().concat()
    }
}

/// A queryable rendered document.
pub trait PageDocument {
    type Node<'a>: PageNode<'a>
    where
        Self: 'a;

    fn root(&self) -> Self::Node<'_>;
}

// Selectors come from rule literals and are reused for every page, so compile each once.
static SELECTOR_CACHE: Lazy<Mutex<HashMap<String, Option<Selector>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn compiled(css: &str) -> Option<Selector> {
    let mut cache = match SELECTOR_CACHE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    cache
        .entry(css.to_string())
        .or_insert_with(|| match Selector::parse(css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::warn!("Ignoring invalid selector '{}': {}", css, e);
                None
            }
        })
        .clone()
}

/// Checks that `css` is a selector the page backend can evaluate.
pub fn check_selector(css: &str) -> Result<(), ExtractError> {
    Selector::parse(css)
        .map(|_| ())
        .map_err(|e| ExtractError::InvalidSelector(format!("'{}': {}", css, e)))
}

/// A page parsed with `scraper`.
pub struct HtmlPage {
    document: Html,
}

impl HtmlPage {
    pub fn parse(source: &str) -> Self {
        Self { document: Html::parse_document(source) }
    }
}

impl PageDocument for HtmlPage {
    type Node<'a> = ElementRef<'a>
    where
        Self: 'a;

    fn root(&self) -> ElementRef<'_> {
        self.document.root_element()
    }
}

impl<'a> PageNode<'a> for ElementRef<'a> {
    fn text_fragments(&self) -> Vec<&'a str> {
        ElementRef::text(self).collect()
    }

    fn attribute(&self, name: &str) -> Option<&'a str> {
        self.value().attr(name)
    }

    fn select_all(&self, css: &str) -> Vec<Self> {
        match compiled(css) {
            Some(selector) => self.select(&selector).collect(),
            None => Vec::new(),
        }
    }

    fn matches_css(&self, css: &str) -> bool {
        compiled(css).map(|selector| selector.matches(self)).unwrap_or(false)
    }

    fn parent_element(&self) -> Option<Self> {
        self.parent().and_then(ElementRef::wrap)
    }

    fn next_element(&self) -> Option<Self> {
        self.next_siblings().find_map(ElementRef::wrap)
    }
}
