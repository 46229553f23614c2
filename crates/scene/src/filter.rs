use serde::{Deserialize, Serialize};

use crate::site::Site;

/// Conjunction of per-field constraints. Empty fields are wildcards.
///
/// Evaluation is total: a site lacking an optional field (e.g. no client)
/// simply fails a non-empty constraint on that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPredicate {
    /// Case-insensitive substring of the site name.
    pub text: String,
    pub category: String,
    pub province: String,
    pub year: Option<i32>,
    pub client_id: String,
}

impl FilterPredicate {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_province(mut self, province: impl Into<String>) -> Self {
        self.province = province.into();
        self
    }

    pub fn with_year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.text.trim().is_empty()
            && self.category.is_empty()
            && self.province.is_empty()
            && self.year.is_none()
            && self.client_id.is_empty()
    }

    pub fn matches(&self, site: &Site) -> bool {
        let text = self.text.trim();
        if !text.is_empty() && !contains_ignore_case(&site.name, text) {
            return false;
        }
        if !self.category.is_empty() && site.category.as_str() != self.category {
            return false;
        }
        if !self.province.is_empty() && site.province != self.province {
            return false;
        }
        if let Some(year) = self.year {
            if site.year != year {
                return false;
            }
        }
        if !self.client_id.is_empty() {
            match &site.client_id {
                Some(c) if c.as_str() == self.client_id => {}
                _ => return false,
            }
        }
        true
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
