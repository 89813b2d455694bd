// ABOUTME: Usage analytics aggregated from per-conversation exchange counters
// ABOUTME: Totals, average latency (0 when nothing processed), and distinct owner count
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::database::ConversationStore;
use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Aggregated usage numbers across all conversations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    /// Completed user/AI exchanges across every conversation
    pub total_processed_responses: i64,
    /// Mean AI response latency in milliseconds, 0 when nothing processed
    pub average_response_time: f64,
    /// Distinct conversation owners
    pub total_unique_users: usize,
}

/// Computes usage analytics over the conversation store
#[derive(Debug, Clone)]
pub struct AnalyticsService {
    store: ConversationStore,
}

impl AnalyticsService {
    #[must_use]
    pub fn new(store: ConversationStore) -> Self {
        Self { store }
    }

    /// Record one completed exchange and its response latency
    ///
    /// # Errors
    ///
    /// Returns a database error on write failure.
    pub async fn record_exchange(&self, conversation_id: Uuid, response_time_ms: i64) -> AppResult<()> {
        self.store.record_exchange(conversation_id, response_time_ms).await
    }

    /// Aggregate counters across every conversation
    ///
    /// Computed in Rust over the counter rows so the same code path
    /// serves plaintext and encrypted deployments, where owner names
    /// are not comparable in SQL.
    ///
    /// # Errors
    ///
    /// Returns database or `CorruptedRecord` errors.
    pub async fn overall(&self) -> AppResult<AnalyticsSummary> {
        let counters = self.store.exchange_counters().await?;

        let total_processed: i64 = counters.iter().map(|c| c.processed_exchanges).sum();
        let total_time: i64 = counters.iter().map(|c| c.total_response_time_ms).sum();
        let unique_users: HashSet<&str> =
            counters.iter().map(|c| c.username.as_str()).collect();

        let average = if total_processed > 0 {
            total_time as f64 / total_processed as f64
        } else {
            0.0
        };

        Ok(AnalyticsSummary {
            total_processed_responses: total_processed,
            average_response_time: average,
            total_unique_users: unique_users.len(),
        })
    }
}
