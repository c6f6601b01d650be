use kakeibo_core::entry::{Category, CategoryId};
use serde::{Deserialize, Serialize};

/// Optional remote suggestion service for rows the rule engine left
/// unresolved. Strictly an enrichment: it never sits on the parsing, dedup,
/// or commit path, and every failure degrades to "still unresolved".
pub struct RemoteClassifier {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct SuggestRequest<'a> {
    descriptions: &'a [String],
    categories: Vec<CatalogEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct CatalogEntry<'a> {
    id: i64,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct SuggestResponse {
    suggestions: Vec<Option<i64>>,
}

impl RemoteClassifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// One suggestion slot per input description, in order. Unknown ids in
    /// the response are dropped rather than trusted.
    pub async fn suggest(
        &self,
        descriptions: &[String],
        categories: &[Category],
    ) -> Vec<Option<CategoryId>> {
        let request = build_request(descriptions, categories);
        let fallback = vec![None; descriptions.len()];

        let response = match self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "remote classification unavailable");
                return fallback;
            }
        };

        let parsed: SuggestResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "remote classification returned malformed body");
                return fallback;
            }
        };

        align_suggestions(parsed.suggestions, descriptions.len(), categories)
    }
}

fn build_request<'a>(
    descriptions: &'a [String],
    categories: &'a [Category],
) -> SuggestRequest<'a> {
    SuggestRequest {
        descriptions,
        categories: categories
            .iter()
            .map(|c| CatalogEntry { id: c.id.0, name: &c.name })
            .collect(),
    }
}

fn align_suggestions(
    raw: Vec<Option<i64>>,
    expected: usize,
    categories: &[Category],
) -> Vec<Option<CategoryId>> {
    let mut out: Vec<Option<CategoryId>> = raw
        .into_iter()
        .map(|id| {
            id.map(CategoryId)
                .filter(|id| categories.iter().any(|c| c.id == *id))
        })
        .collect();
    out.resize(expected, None);
    out.truncate(expected);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kakeibo_core::entry::EntryKind;

    fn categories() -> Vec<Category> {
        vec![
            Category { id: CategoryId(1), name: "食費".to_string(), kind: EntryKind::Expense },
            Category { id: CategoryId(2), name: "通販".to_string(), kind: EntryKind::Expense },
        ]
    }

    #[test]
    fn request_carries_descriptions_and_catalog() {
        let descriptions = vec!["謎の店".to_string()];
        let categories = categories();
        let request = build_request(&descriptions, &categories);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["descriptions"][0], "謎の店");
        assert_eq!(json["categories"][1]["name"], "通販");
    }

    #[test]
    fn suggestions_align_to_input_length_and_known_ids() {
        let categories = categories();
        // Too short, and one id the catalog does not know.
        let out = align_suggestions(vec![Some(2), Some(99)], 3, &categories);
        assert_eq!(out, vec![Some(CategoryId(2)), None, None]);

        // Too long gets truncated.
        let out = align_suggestions(vec![Some(1), Some(2), Some(1)], 2, &categories);
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_unresolved() {
        let classifier = RemoteClassifier::new("http://127.0.0.1:1/suggest");
        let out = classifier
            .suggest(&["謎の店".to_string()], &categories())
            .await;
        assert_eq!(out, vec![None]);
    }
}
