//! Page-view observation
//!
//! One `"Page Viewed"` per distinct path, starting with the initial load.
//! Re-renders that leave the path unchanged are not navigations.

use crate::facade::Analytics;
use crate::page::Page;
use crate::types::Properties;

#[derive(Debug, Clone, Default)]
pub struct PageViewObserver {
    current_path: Option<String>,
    views: u64,
}

impl PageViewObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the page's current path, emitting a page view if it changed.
    ///
    /// Returns true if this call was a navigation.
    pub fn observe(&mut self, page: &dyn Page, analytics: &mut Analytics) -> bool {
        let path = page.location().path;
        if self.current_path.as_deref() == Some(path.as_str()) {
            return false;
        }

        analytics.track_page_view(&path, Properties::new(), page);
        self.current_path = Some(path);
        self.views += 1;
        true
    }

    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    /// Page views emitted so far
    pub fn views(&self) -> u64 {
        self.views
    }
}
