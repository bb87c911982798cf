use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::common::Citation;

/// Numbers derived from one collected response, stored next to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    pub char_count: u32,
    pub word_count: u32,
    pub citation_count: u32,
    /// Distinct hosts cited, `www.` stripped, sorted
    pub cited_domains: Vec<String>,
    pub subject_mentioned: bool,
}

impl ResponseMetrics {
    pub fn derive(response_text: &str, citations: &[Citation], subject: Option<&str>) -> Self {
        let cited_domains: BTreeSet<String> = citations
            .iter()
            .filter_map(|c| url::Url::parse(&c.url).ok())
            .filter_map(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
            .collect();

        let subject_mentioned = subject
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| response_text.to_lowercase().contains(&s.to_lowercase()))
            .unwrap_or(false);

        Self {
            char_count: u32::try_from(response_text.chars().count()).unwrap_or(u32::MAX),
            word_count: u32::try_from(response_text.split_whitespace().count()).unwrap_or(u32::MAX),
            citation_count: u32::try_from(citations.len()).unwrap_or(u32::MAX),
            cited_domains: cited_domains.into_iter().collect(),
            subject_mentioned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_counts_and_domains() {
        let citations = vec![
            Citation::new("https://www.glassdoor.com/acme"),
            Citation::new("https://glassdoor.com/acme/reviews"),
            Citation::new("https://news.example.org/story"),
            Citation::new("not a url"),
        ];
        let metrics = ResponseMetrics::derive("Acme Corp pays  well.", &citations, Some("acme corp"));

        assert_eq!(metrics.char_count, 21);
        assert_eq!(metrics.word_count, 4);
        assert_eq!(metrics.citation_count, 4);
        assert_eq!(metrics.cited_domains, vec!["glassdoor.com", "news.example.org"]);
        assert!(metrics.subject_mentioned);
    }

    #[test]
    fn missing_subject_is_not_mentioned() {
        let metrics = ResponseMetrics::derive("Some text", &[], None);
        assert!(!metrics.subject_mentioned);
        assert!(metrics.cited_domains.is_empty());
    }
}
