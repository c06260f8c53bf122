//! Browsing-context capability interface
//!
//! The pipeline never touches a concrete UI framework. Everything it needs
//! from the page (where it is, how far it has scrolled, what an element says,
//! how to reset a form) goes through [`Page`].
//!
//! [`SimulatedPage`] is an in-memory document used to replay recorded
//! sessions and in tests.

use std::collections::BTreeMap;

use crate::types::{Location, ScrollMetrics};

/// What the pipeline can observe and do on the current page.
pub trait Page {
    /// Current URL and path
    fn location(&self) -> Location;

    /// Referrer of the current page, if any
    fn referrer(&self) -> Option<String>;

    /// Current scroll position and document geometry
    fn scroll_metrics(&self) -> ScrollMetrics;

    /// Identifiers of the interactive elements currently on the page
    fn interactive_elements(&self) -> Vec<String>;

    /// Visible text of an element right now
    fn element_text(&self, element_id: &str) -> Option<String>;

    /// Reset every field of a form. Returns false if the form does not exist.
    fn clear_form(&mut self, form_id: &str) -> bool;
}

/// In-memory page.
#[derive(Debug, Clone)]
pub struct SimulatedPage {
    origin: String,
    path: String,
    referrer: Option<String>,
    metrics: ScrollMetrics,
    elements: BTreeMap<String, String>,
    forms: BTreeMap<String, BTreeMap<String, String>>,
}

impl SimulatedPage {
    /// A page at `origin` + `path`, 800px viewport, nothing to scroll.
    pub fn new(origin: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            path: normalize_path(&path.into()),
            referrer: None,
            metrics: ScrollMetrics::new(0.0, 800.0, 800.0),
            elements: BTreeMap::new(),
            forms: BTreeMap::new(),
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_geometry(mut self, document_height: f64, viewport_height: f64) -> Self {
        self.metrics.document_height = document_height;
        self.metrics.viewport_height = viewport_height;
        self
    }

    /// Move to `path`. The old URL becomes the referrer and scroll resets to the top.
    pub fn navigate(&mut self, path: &str) {
        self.referrer = Some(self.href());
        self.path = normalize_path(path);
        self.metrics.scroll_top = 0.0;
    }

    pub fn set_geometry(&mut self, document_height: f64, viewport_height: f64) {
        self.metrics.document_height = document_height;
        self.metrics.viewport_height = viewport_height;
    }

    pub fn scroll_to(&mut self, scroll_top: f64) {
        self.metrics.scroll_top = scroll_top;
    }

    /// Scroll to a percentage of the scrollable height
    pub fn scroll_to_percent(&mut self, percent: f64) {
        let scrollable = (self.metrics.document_height - self.metrics.viewport_height).max(0.0);
        self.metrics.scroll_top = scrollable * percent / 100.0;
    }

    /// Add or relabel an interactive element
    pub fn set_element(&mut self, element_id: impl Into<String>, text: impl Into<String>) {
        self.elements.insert(element_id.into(), text.into());
    }

    pub fn remove_element(&mut self, element_id: &str) {
        self.elements.remove(element_id);
    }

    /// Type values into a form's fields
    pub fn fill_form<I, K, V>(&mut self, form_id: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let form = self.forms.entry(form_id.into()).or_default();
        for (k, v) in fields {
            form.insert(k.into(), v.into());
        }
    }

    /// Current field values of a form
    pub fn form(&self, form_id: &str) -> Option<&BTreeMap<String, String>> {
        self.forms.get(form_id)
    }

    fn href(&self) -> String {
        format!("{}{}", self.origin, self.path)
    }
}

impl Page for SimulatedPage {
    fn location(&self) -> Location {
        let path = self
            .path
            .split(['?', '#'])
            .next()
            .unwrap_or("/")
            .to_string();
        Location::new(self.href(), path)
    }

    fn referrer(&self) -> Option<String> {
        self.referrer.clone()
    }

    fn scroll_metrics(&self) -> ScrollMetrics {
        self.metrics
    }

    fn interactive_elements(&self) -> Vec<String> {
        self.elements.keys().cloned().collect()
    }

    fn element_text(&self, element_id: &str) -> Option<String> {
        self.elements.get(element_id).cloned()
    }

    fn clear_form(&mut self, form_id: &str) -> bool {
        match self.forms.get_mut(form_id) {
            Some(form) => {
                form.values_mut().for_each(String::clear);
                true
            }
            None => false,
        }
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
