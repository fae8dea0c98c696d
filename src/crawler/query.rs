//! Search query construction
//!
//! Turns [`SearchCriteria`] into the query string understood by GitHub's
//! repository search, e.g. `rust language:rust stars:>=10 created:2024-01-01..2024-01-31`.

use crate::config::SearchConfig;
use chrono::NaiveDate;
use serde::Deserialize;

/// Date format used in `created:` clauses
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Sort order appended to the search query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Stars,
    Updated,
    Created,
    Forks,
    /// No sort clause
    #[default]
    #[serde(alias = "None")]
    #[value(alias = "None")]
    None,
}

impl SortKey {
    /// Field name used in the `sort:` clause, or `None` when no clause is emitted
    pub fn as_query_field(&self) -> Option<&'static str> {
        match self {
            Self::Stars => Some("stars"),
            Self::Updated => Some("updated"),
            Self::Created => Some("created"),
            Self::Forks => Some("forks"),
            Self::None => None,
        }
    }
}

/// Immutable set of filters for one search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Minimum star count, 0 means no filter
    pub min_stars: u32,
    pub language: Option<String>,
    pub keywords: Vec<String>,
    pub created_after: Option<NaiveDate>,
    pub created_before: Option<NaiveDate>,
    pub sort: SortKey,
    /// Records requested per page (1-100)
    pub page_size: u32,
}

impl SearchCriteria {
    /// Builds criteria from the search section of the configuration
    pub fn from_config(search: &SearchConfig, page_size: u32) -> Self {
        Self {
            min_stars: search.min_stars,
            language: search.language.clone(),
            keywords: search.keywords.clone(),
            created_after: search.created_after,
            created_before: search.created_before,
            sort: search.sort_by,
            page_size,
        }
    }

    /// Returns a copy of these criteria bound to a creation-date window
    pub fn with_date_range(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            created_after: Some(start),
            created_before: Some(end),
            ..self.clone()
        }
    }

    /// The search query string for these criteria
    pub fn query_string(&self) -> String {
        build_search_query(self)
    }
}

/// Builds a repository search query from the given criteria
///
/// Clauses appear in a fixed order: keywords, `language:`, `stars:>=`,
/// `created:` and `sort:`. A clause whose input is absent is omitted.
///
/// # Example
///
/// ```
/// use star_crawler::crawler::{build_search_query, SearchCriteria, SortKey};
///
/// let criteria = SearchCriteria {
///     min_stars: 100,
///     language: Some("python".to_string()),
///     keywords: vec![],
///     created_after: None,
///     created_before: None,
///     sort: SortKey::None,
///     page_size: 10,
/// };
/// assert_eq!(build_search_query(&criteria), "language:python stars:>=100");
/// ```
pub fn build_search_query(criteria: &SearchCriteria) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.extend(
        criteria
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string),
    );

    if let Some(language) = criteria.language.as_deref().filter(|l| !l.is_empty()) {
        parts.push(format!("language:{}", language));
    }

    if criteria.min_stars > 0 {
        parts.push(format!("stars:>={}", criteria.min_stars));
    }

    match (criteria.created_after, criteria.created_before) {
        (Some(after), Some(before)) => parts.push(format!(
            "created:{}..{}",
            after.format(DATE_FORMAT),
            before.format(DATE_FORMAT)
        )),
        (Some(after), None) => parts.push(format!("created:>{}", after.format(DATE_FORMAT))),
        (None, Some(before)) => parts.push(format!("created:<{}", before.format(DATE_FORMAT))),
        (None, None) => {}
    }

    if let Some(field) = criteria.sort.as_query_field() {
        parts.push(format!("sort:{}", field));
    }

    parts.join(" ")
}
