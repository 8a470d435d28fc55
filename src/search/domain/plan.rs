//! Search plans handed to the pipeline.

use crate::service::domain::ServiceKind;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Search parameters for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceQuery {
    /// Target service.
    pub service: ServiceKind,
    /// Opaque parameters for the service adapter's request builder.
    pub params: Value,
}

/// What to search, per service, plus fallbacks to show on an empty run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPlan {
    /// Per-service queries; the first query for a service wins.
    pub queries: Vec<ServiceQuery>,
    /// Alternative phrasings surfaced when nothing is found.
    #[serde(default)]
    pub alternatives: Vec<String>,
}

impl SearchPlan {
    /// Builds a plan sending the same free-text query to every service.
    #[must_use]
    pub fn uniform(
        query: &str,
        services: impl IntoIterator<Item = ServiceKind>,
        max_results: usize,
    ) -> Self {
        Self {
            queries: services
                .into_iter()
                .map(|service| ServiceQuery {
                    service,
                    params: json!({ "query": query, "max_results": max_results }),
                })
                .collect(),
            alternatives: Vec::new(),
        }
    }

    /// Adds alternative phrasings.
    #[must_use]
    pub fn with_alternatives(mut self, alternatives: impl IntoIterator<Item = String>) -> Self {
        self.alternatives = alternatives.into_iter().collect();
        self
    }

    /// Returns the parameters for `service`, if planned.
    #[must_use]
    pub fn params_for(&self, service: ServiceKind) -> Option<&Value> {
        self.queries
            .iter()
            .find(|query| query.service == service)
            .map(|query| &query.params)
    }

    /// Returns the planned services in order, without duplicates.
    #[must_use]
    pub fn services(&self) -> Vec<ServiceKind> {
        let mut services = Vec::new();
        for query in &self.queries {
            if !services.contains(&query.service) {
                services.push(query.service);
            }
        }
        services
    }
}
