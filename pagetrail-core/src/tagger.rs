//! Interaction tagging
//!
//! A static table maps element ids to `(section, action)`. When a page is set
//! up, [`InteractionTagger::attach`] binds every matching element once; an
//! activation of a bound element becomes a `"Button Clicked"` event that says
//! what the click meant, not just that it happened.
//!
//! Element text is read when the element is activated, so relabelled
//! buttons report their current text.

use std::collections::BTreeMap;

use crate::config::TagEntry;
use crate::facade::Analytics;
use crate::page::Page;
use crate::props;
use crate::types::{InteractionTag, BUTTON_CLICKED};

const UNKNOWN_BUTTON: &str = "Unknown Button";
const UNKNOWN_SECTION: &str = "Unknown Section";
const DEFAULT_ACTION: &str = "click";

/// Declarative element → tag table plus the bindings for the current page.
#[derive(Debug, Clone, Default)]
pub struct InteractionTagger {
    table: BTreeMap<String, InteractionTag>,
    autocapture: bool,
    bound: BTreeMap<String, InteractionTag>,
    attached: bool,
}

impl InteractionTagger {
    /// Build from `(element_id, tag)` pairs.
    ///
    /// With `autocapture`, elements missing from the table are bound too,
    /// under a generic tag.
    pub fn new<I>(table: I, autocapture: bool) -> Self
    where
        I: IntoIterator<Item = (String, InteractionTag)>,
    {
        Self {
            table: table.into_iter().collect(),
            autocapture,
            bound: BTreeMap::new(),
            attached: false,
        }
    }

    /// Build from configuration rows
    pub fn from_entries(entries: &[TagEntry], autocapture: bool) -> Self {
        Self::new(
            entries.iter().map(|e| (e.element.clone(), e.tag())),
            autocapture,
        )
    }

    /// Bind to the page's interactive elements. Only the first call per
    /// page view does anything; returns the number of bound elements.
    pub fn attach(&mut self, page: &dyn Page) -> usize {
        if self.attached {
            return self.bound.len();
        }
        self.attached = true;

        for element in page.interactive_elements() {
            let tag = match self.table.get(&element) {
                Some(tag) => tag.clone(),
                None if self.autocapture => InteractionTag::new(UNKNOWN_SECTION, DEFAULT_ACTION),
                None => continue,
            };
            self.bound.insert(element, tag);
        }

        tracing::debug!(
            bound = self.bound.len(),
            path = %page.location().path,
            "Interaction listeners attached"
        );
        self.bound.len()
    }

    /// Drop all bindings; the next [`attach`](Self::attach) rebinds.
    pub fn detach(&mut self) {
        self.bound.clear();
        self.attached = false;
    }

    pub fn is_bound(&self, element_id: &str) -> bool {
        self.bound.contains_key(element_id)
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    /// Handle activation of `element_id`. Returns false if the element is not bound.
    pub fn activate(&self, element_id: &str, page: &dyn Page, analytics: &mut Analytics) -> bool {
        let Some(tag) = self.bound.get(element_id) else {
            tracing::debug!(element = element_id, "Activation on unbound element ignored");
            return false;
        };

        let button_text = page
            .element_text(element_id)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNKNOWN_BUTTON.to_string());

        analytics.track(
            BUTTON_CLICKED,
            props! {
                "button_text" => button_text,
                "section" => tag.section.as_str(),
                "action" => tag.action.as_str(),
                "page" => page.location().path,
            },
        );
        true
    }
}
