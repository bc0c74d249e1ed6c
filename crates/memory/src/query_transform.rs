//! Query transformation: asks the LLM for alternate phrasings of a search
//! query so the hybrid search can catch different wordings of the same
//! intent. Only the `multi_query` method is implemented — HyDE and
//! decomposition add retrieval latency this system's interactive search
//! path doesn't need.

use std::sync::Arc;

use sa_domain::error::Result;
use sa_domain::tool::Message;
use sa_providers::{ChatRequest, LlmProvider};

pub struct QueryTransformer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
}

impl QueryTransformer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Option<String>) -> Self {
        Self { provider, model }
    }

    /// Returns the original query plus up to `num_variations` alternate
    /// phrasings, deduplicated case-insensitively.
    pub async fn transform(&self, query: &str, num_variations: usize) -> Result<Vec<String>> {
        let mut queries = vec![query.to_string()];

        let prompt = format!(
            "Given this query: \"{query}\"\n\n\
             Generate {num_variations} alternative ways to phrase this query that preserve \
             the same intent but use different words or perspectives.\n\n\
             Return ONLY the alternative queries, one per line, nothing else."
        );

        let response = self
            .provider
            .chat(ChatRequest {
                messages: vec![Message::user(prompt)],
                temperature: Some(0.5),
                max_tokens: Some(150),
                model: self.model.clone(),
                ..Default::default()
            })
            .await;

        if let Ok(response) = response {
            let variations: Vec<String> = response
                .content
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .take(num_variations)
                .collect();
            queries.extend(variations);
        }

        let mut seen = std::collections::HashSet::new();
        queries.retain(|q| seen.insert(q.to_lowercase()));
        Ok(queries)
    }
}
