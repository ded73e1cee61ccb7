//! The feedback loop: admission, deduplication, verification, persistence.
//!
//! Findings flow one way:
//!
//! ```text
//! add_finding ──▶ admission ──▶ pending (unverified) ──▶ pending (verified)
//!                    │                                         │
//!                    ▼                                         ▼ process_pending
//!                 rejected                                 knowledge graph
//! ```
//!
//! The pending map and every counter live behind a single mutex that is held
//! only for synchronous bookkeeping, never across a call into the graph.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tessera_config::{DEFAULT_DATASET_NAME, FeedbackConfig};
use tessera_graph::KnowledgeGraph;
use tracing::{debug, info, warn};

use crate::error::MemoryError;
use crate::finding::{Finding, generate_id};
use crate::fragment::ScoredFragment;

/// Tunables for a [`FeedbackLoop`].
///
/// Out-of-range values are clamped by [`FeedbackLoop::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackSettings {
    /// Minimum confidence for a submission to be admitted.
    pub confidence_threshold: f64,
    /// Submissions needed before a finding is verified.
    pub verification_threshold: u32,
    /// Upper bound on pending findings.
    pub max_pending: usize,
    /// Pending findings not seen for this long are evicted.
    pub pending_ttl: Option<Duration>,
    /// Budget for each `add` and for the trailing `cognify`.
    pub persist_timeout: Duration,
    /// Dataset findings are written into.
    pub dataset_name: String,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self::from(&FeedbackConfig::default())
    }
}

impl From<&FeedbackConfig> for FeedbackSettings {
    fn from(config: &FeedbackConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            verification_threshold: config.verification_threshold,
            max_pending: config.max_pending,
            pending_ttl: config.pending_ttl(),
            persist_timeout: config.persist_timeout(),
            dataset_name: config.dataset_name.clone(),
        }
    }
}

impl FeedbackSettings {
    /// Clamp every field into its valid range.
    ///
    /// Thresholds and capacity are raised to at least 1, the confidence
    /// threshold is clamped to `[0, 1]` and a blank dataset name falls back
    /// to the default.
    pub fn sanitized(mut self) -> Self {
        let original = self.clone();

        self.confidence_threshold = self.confidence_threshold.clamp(0.0, 1.0);
        self.verification_threshold = self.verification_threshold.max(1);
        self.max_pending = self.max_pending.max(1);
        if self.dataset_name.trim().is_empty() {
            self.dataset_name = DEFAULT_DATASET_NAME.to_string();
        }

        if self != original {
            warn!(
                confidence_threshold = self.confidence_threshold,
                verification_threshold = self.verification_threshold,
                max_pending = self.max_pending,
                dataset = %self.dataset_name,
                "Feedback settings out of range, clamped"
            );
        }
        self
    }
}

/// Aggregate counters reported by [`FeedbackLoop::get_statistics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub findings_received: u64,
    pub findings_persisted: u64,
    pub findings_deduplicated: u64,
    pub findings_rejected: u64,
    pub findings_evicted: u64,
    pub persist_failures: u64,
    pub pending_count: usize,
    pub verified_count: usize,
}

#[derive(Default)]
struct Ledger {
    pending: HashMap<String, Finding>,
    stats: FeedbackStats,
}

impl Ledger {
    fn evict_expired(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, finding| !is_expired(finding, now, ttl));
        let evicted = before - self.pending.len();
        self.stats.findings_evicted += evicted as u64;
        evicted
    }

    /// Free one slot: expired findings first, then the least recently seen
    /// unverified finding, then the least recently seen of any kind.
    fn make_room(&mut self, now: DateTime<Utc>, ttl: Option<Duration>) {
        if let Some(ttl) = ttl
            && self.evict_expired(now, ttl) > 0
        {
            return;
        }

        let victim = oldest(self.pending.values().filter(|f| !f.verified))
            .or_else(|| oldest(self.pending.values()))
            .map(|f| f.id.clone());

        if let Some(id) = victim
            && let Some(finding) = self.pending.remove(&id)
        {
            self.stats.findings_evicted += 1;
            warn!(
                finding_id = %id,
                verified = finding.verified,
                verification_count = finding.verification_count,
                "Pending set full, evicted finding"
            );
        }
    }
}

fn is_expired(finding: &Finding, now: DateTime<Utc>, ttl: Duration) -> bool {
    (now - finding.last_seen)
        .to_std()
        .map(|age| age > ttl)
        .unwrap_or(false)
}

fn oldest<'a>(findings: impl Iterator<Item = &'a Finding>) -> Option<&'a Finding> {
    findings.min_by(|a, b| a.last_seen.cmp(&b.last_seen).then_with(|| a.id.cmp(&b.id)))
}

/// Deduplicates and verifies findings, and promotes verified ones into the
/// knowledge graph.
pub struct FeedbackLoop {
    settings: FeedbackSettings,
    ledger: Mutex<Ledger>,
    sweep_lock: tokio::sync::Mutex<()>,
}

impl FeedbackLoop {
    pub fn new(settings: FeedbackSettings) -> Self {
        Self {
            settings: settings.sanitized(),
            ledger: Mutex::new(Ledger::default()),
            sweep_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(config: &FeedbackConfig) -> Self {
        Self::new(FeedbackSettings::from(config))
    }

    pub fn settings(&self) -> &FeedbackSettings {
        &self.settings
    }

    /// Submit a candidate fact.
    ///
    /// Returns the finding id when admitted, or `None` when the confidence is
    /// below the threshold (or not a number) or the content is blank.
    pub fn add_finding(
        &self,
        content: &str,
        source: &str,
        confidence: f64,
        query_context: &str,
        entity_references: &[String],
    ) -> Option<String> {
        self.add_finding_at(
            content,
            source,
            confidence,
            query_context,
            entity_references,
            Utc::now(),
        )
    }

    pub(crate) fn add_finding_at(
        &self,
        content: &str,
        source: &str,
        confidence: f64,
        query_context: &str,
        entity_references: &[String],
        now: DateTime<Utc>,
    ) -> Option<String> {
        let mut ledger = self.ledger.lock();

        if !(confidence >= self.settings.confidence_threshold) || content.trim().is_empty() {
            ledger.stats.findings_rejected += 1;
            debug!(source, confidence, "Finding rejected");
            return None;
        }
        let confidence = confidence.min(1.0);
        let threshold = self.settings.verification_threshold;

        let id = generate_id(content, entity_references);
        ledger.stats.findings_received += 1;

        if let Some(finding) = ledger.pending.get_mut(&id) {
            finding.reinforce(source, confidence, now);
            let count = finding.verification_count;
            let newly_verified = finding.apply_threshold(threshold);
            ledger.stats.findings_deduplicated += 1;

            if newly_verified {
                info!(finding_id = %id, verification_count = count, "Finding verified");
            } else {
                debug!(finding_id = %id, verification_count = count, source, "Finding reinforced");
            }
            return Some(id);
        }

        if ledger.pending.len() >= self.settings.max_pending {
            ledger.make_room(now, self.settings.pending_ttl);
        }

        let mut finding = Finding::new(
            content,
            source,
            confidence,
            query_context,
            entity_references,
            now,
        );
        if finding.apply_threshold(threshold) {
            info!(finding_id = %id, verification_count = 1, "Finding verified");
        } else {
            debug!(finding_id = %id, source, "Finding created");
        }
        ledger.pending.insert(id.clone(), finding);
        Some(id)
    }

    /// Submit every fragment of a retrieval answer as a finding.
    ///
    /// Returns the ids of the admitted fragments, in input order.
    pub fn ingest_fragments(&self, query: &str, fragments: &[ScoredFragment]) -> Vec<String> {
        fragments
            .iter()
            .filter_map(|fragment| {
                self.add_finding(
                    &fragment.text,
                    fragment.source(),
                    fragment.confidence(),
                    query,
                    &fragment.metadata.entities,
                )
            })
            .collect()
    }

    /// Persist every verified finding into the knowledge graph.
    ///
    /// Returns how many were persisted. Returns 0 without touching anything
    /// when no client is available or another sweep is already running. A
    /// finding that fails to persist stays pending and is retried on the next
    /// sweep; it never aborts the rest of the batch.
    pub async fn process_pending(&self, client: Option<&dyn KnowledgeGraph>) -> usize {
        let Some(client) = client else {
            return 0;
        };
        let Ok(_sweep) = self.sweep_lock.try_lock() else {
            debug!("Sweep already in progress");
            return 0;
        };

        let batch = self.verified_batch();
        if batch.is_empty() {
            return 0;
        }

        let timeout = self.settings.persist_timeout;
        let dataset = self.settings.dataset_name.as_str();
        debug!(count = batch.len(), dataset, "Persisting verified findings");

        let mut persisted = 0;
        for finding in batch {
            let result =
                match tokio::time::timeout(timeout, client.add(finding.to_document(), dataset))
                    .await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(source)) => Err(MemoryError::Persistence {
                        finding_id: finding.id.clone(),
                        source,
                    }),
                    Err(_) => Err(MemoryError::Timeout {
                        operation: "persist",
                        after: timeout,
                    }),
                };

            if self.record_outcome(&finding, result) {
                persisted += 1;
            }
        }

        if persisted > 0 {
            match tokio::time::timeout(timeout, client.cognify()).await {
                Ok(Ok(())) => debug!(persisted, "Graph rebuilt"),
                Ok(Err(e)) => warn!(error = %e, "cognify failed after persisting findings"),
                Err(_) => warn!(timeout_ms = timeout.as_millis() as u64, "cognify timed out"),
            }
            info!(persisted, dataset, "Persisted verified findings");
        }

        persisted
    }

    /// Verified findings, oldest first.
    fn verified_batch(&self) -> Vec<Finding> {
        let ledger = self.ledger.lock();
        let mut batch: Vec<Finding> = ledger
            .pending
            .values()
            .filter(|f| f.verified)
            .cloned()
            .collect();
        batch.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        batch
    }

    /// Apply one persistence outcome. Returns `true` when persisted.
    ///
    /// Only the pending entry created at the same instant as `persisted` is
    /// touched. An entry evicted and resubmitted while the write was in
    /// flight is a new finding and stays pending.
    fn record_outcome(&self, persisted: &Finding, result: crate::error::Result<()>) -> bool {
        let id = persisted.id.as_str();
        let mut ledger = self.ledger.lock();
        let same_entry = ledger
            .pending
            .get(id)
            .is_some_and(|current| current.timestamp == persisted.timestamp);

        match result {
            Ok(()) => {
                if same_entry {
                    ledger.pending.remove(id);
                } else {
                    debug!(finding_id = %id, "Finding replaced while persisting, keeping new entry");
                }
                ledger.stats.findings_persisted += 1;
                debug!(finding_id = %id, "Finding persisted");
                true
            }
            Err(e) => {
                ledger.stats.persist_failures += 1;
                if same_entry && let Some(finding) = ledger.pending.get_mut(id) {
                    finding.persist_attempts = finding.persist_attempts.saturating_add(1);
                    finding.last_error = Some(e.to_string());
                }
                warn!(finding_id = %id, error = %e, "Finding stays pending");
                false
            }
        }
    }

    /// Drop pending findings not seen within the configured TTL.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.settings.pending_ttl else {
            return 0;
        };
        let evicted = self.ledger.lock().evict_expired(now, ttl);
        if evicted > 0 {
            info!(evicted, "Evicted expired findings");
        }
        evicted
    }

    pub fn get_statistics(&self) -> FeedbackStats {
        let ledger = self.ledger.lock();
        FeedbackStats {
            pending_count: ledger.pending.len(),
            verified_count: ledger.pending.values().filter(|f| f.verified).count(),
            ..ledger.stats.clone()
        }
    }

    /// A pending finding by id.
    pub fn get_finding(&self, id: &str) -> Option<Finding> {
        self.ledger.lock().pending.get(id).cloned()
    }

    /// All pending findings, oldest first.
    pub fn pending_findings(&self) -> Vec<Finding> {
        let ledger = self.ledger.lock();
        let mut findings: Vec<Finding> = ledger.pending.values().cloned().collect();
        findings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        findings
    }

    /// Whether any pending finding is ready to persist.
    pub fn has_verified(&self) -> bool {
        self.ledger.lock().pending.values().any(|f| f.verified)
    }
}

impl Default for FeedbackLoop {
    fn default() -> Self {
        Self::new(FeedbackSettings::default())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tessera_graph::MockKnowledgeGraph;

    const REFUND: &str = "Product X supports refunds";

    fn entities(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Add the same fact twice so it is verified under the default threshold.
    fn verified(feedback: &FeedbackLoop, content: &str) -> String {
        feedback.add_finding(content, "doc_1", 0.9, "q", &[]).unwrap();
        feedback.add_finding(content, "doc_2", 0.9, "q", &[]).unwrap()
    }

    #[test]
    fn test_admission_threshold() {
        let feedback = FeedbackLoop::default();

        assert!(feedback.add_finding("fact", "doc_1", 0.79, "q", &[]).is_none());
        assert!(feedback.add_finding("fact", "doc_1", 0.80, "q", &[]).is_some());

        let stats = feedback.get_statistics();
        assert_eq!(stats.findings_rejected, 1);
        assert_eq!(stats.findings_received, 1);
        assert_eq!(stats.pending_count, 1);
    }

    #[test]
    fn test_rejects_nan_and_blank_content() {
        let feedback = FeedbackLoop::default();

        assert!(feedback.add_finding("fact", "doc_1", f64::NAN, "q", &[]).is_none());
        assert!(feedback.add_finding("   ", "doc_1", 0.95, "q", &[]).is_none());

        let stats = feedback.get_statistics();
        assert_eq!(stats.findings_rejected, 2);
        assert_eq!(stats.findings_received, 0);
        assert_eq!(stats.pending_count, 0);
    }

    #[test]
    fn test_confidence_above_one_is_clamped() {
        let feedback = FeedbackLoop::default();
        let id = feedback.add_finding("fact", "doc_1", 3.0, "q", &[]).unwrap();
        assert_eq!(feedback.get_finding(&id).unwrap().confidence, 1.0);
    }

    #[test]
    fn test_refund_scenario() {
        let feedback = FeedbackLoop::default();
        let refs = entities(&["product_x"]);

        let first = feedback
            .add_finding(REFUND, "doc_1", 0.85, "refund policy?", &refs)
            .unwrap();
        let second = feedback
            .add_finding(REFUND, "doc_2", 0.9, "other query", &refs)
            .unwrap();
        assert_eq!(first, second);

        let stats = feedback.get_statistics();
        assert_eq!(stats.findings_received, 2);
        assert_eq!(stats.findings_deduplicated, 1);
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.verified_count, 1);

        let finding = feedback.get_finding(&first).unwrap();
        assert_eq!(finding.verification_count, 2);
        assert!(finding.verified);
        assert_eq!(finding.source, "doc_2");
        assert_eq!(finding.source_count(), 2);
        assert_eq!(finding.query_context, "refund policy?");
        assert_eq!(finding.max_confidence, 0.9);
    }

    #[test]
    fn test_equivalent_submissions_merge() {
        let feedback = FeedbackLoop::default();

        let a = feedback
            .add_finding("Product  X supports REFUNDS", "doc_1", 0.9, "q", &entities(&["b", "a"]))
            .unwrap();
        let b = feedback
            .add_finding("product x supports refunds", "doc_1", 0.9, "q", &entities(&["A", "b"]))
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(feedback.get_statistics().pending_count, 1);
        // Same source twice still counts as corroboration.
        assert_eq!(feedback.get_finding(&a).unwrap().verification_count, 2);
        assert_eq!(feedback.get_finding(&a).unwrap().source_count(), 1);
    }

    #[test]
    fn test_verification_at_threshold_one() {
        let feedback = FeedbackLoop::new(FeedbackSettings {
            verification_threshold: 1,
            ..Default::default()
        });

        let id = feedback.add_finding("fact", "doc_1", 0.9, "q", &[]).unwrap();
        assert!(feedback.get_finding(&id).unwrap().verified);
    }

    #[test]
    fn test_verification_threshold_three() {
        let feedback = FeedbackLoop::new(FeedbackSettings {
            verification_threshold: 3,
            ..Default::default()
        });

        let id = verified(&feedback, "fact");
        assert!(!feedback.get_finding(&id).unwrap().verified);

        feedback.add_finding("fact", "doc_3", 0.9, "q", &[]);
        assert!(feedback.get_finding(&id).unwrap().verified);

        feedback.add_finding("fact", "doc_4", 0.9, "q", &[]);
        let finding = feedback.get_finding(&id).unwrap();
        assert!(finding.verified);
        assert_eq!(finding.verification_count, 4);
    }

    #[test]
    fn test_rejected_resubmission_does_not_reinforce() {
        let feedback = FeedbackLoop::default();
        let id = feedback.add_finding("fact", "doc_1", 0.9, "q", &[]).unwrap();

        assert!(feedback.add_finding("fact", "doc_2", 0.5, "q", &[]).is_none());

        let finding = feedback.get_finding(&id).unwrap();
        assert_eq!(finding.verification_count, 1);
        assert!(!finding.verified);
    }

    #[tokio::test]
    async fn test_process_pending_without_client() {
        let feedback = FeedbackLoop::default();
        verified(&feedback, "fact");

        assert_eq!(feedback.process_pending(None).await, 0);
        assert_eq!(feedback.get_statistics().pending_count, 1);
        assert_eq!(feedback.get_statistics().findings_persisted, 0);
    }

    #[tokio::test]
    async fn test_process_pending_persists_only_verified() {
        let feedback = FeedbackLoop::default();
        let graph = MockKnowledgeGraph::new();

        let ready = verified(&feedback, REFUND);
        let waiting = feedback.add_finding("unconfirmed", "doc_1", 0.9, "q", &[]).unwrap();

        assert_eq!(feedback.process_pending(Some(&graph)).await, 1);
        assert_eq!(graph.added_ids(), vec![ready.clone()]);
        assert_eq!(graph.added()[0].0, "feedback");
        assert_eq!(graph.call_count("cognify"), 1);

        assert!(feedback.get_finding(&ready).is_none());
        assert!(feedback.get_finding(&waiting).is_some());

        let stats = feedback.get_statistics();
        assert_eq!(stats.findings_persisted, 1);
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.verified_count, 0);
    }

    #[tokio::test]
    async fn test_process_pending_isolates_failures() {
        let feedback = FeedbackLoop::default();
        let graph = MockKnowledgeGraph::new();

        let a = verified(&feedback, "fact a");
        let b = verified(&feedback, "fact b");
        let c = verified(&feedback, "fact c");
        graph.fail_on(b.clone());

        assert_eq!(feedback.process_pending(Some(&graph)).await, 2);

        assert!(feedback.get_finding(&a).is_none());
        assert!(feedback.get_finding(&c).is_none());
        let failed = feedback.get_finding(&b).unwrap();
        assert!(failed.verified);
        assert_eq!(failed.persist_attempts, 1);
        assert!(failed.last_error.unwrap().contains(&b));

        let stats = feedback.get_statistics();
        assert_eq!(stats.findings_persisted, 2);
        assert_eq!(stats.persist_failures, 1);
        assert_eq!(stats.pending_count, 1);

        // The failed finding is retried on the next sweep.
        graph.recover(&b);
        assert_eq!(feedback.process_pending(Some(&graph)).await, 1);
        assert_eq!(feedback.get_statistics().pending_count, 0);
        assert_eq!(feedback.get_statistics().findings_persisted, 3);
    }

    #[tokio::test]
    async fn test_process_pending_with_nothing_verified_skips_cognify() {
        let feedback = FeedbackLoop::default();
        let graph = MockKnowledgeGraph::new();
        feedback.add_finding("fact", "doc_1", 0.9, "q", &[]);

        assert_eq!(feedback.process_pending(Some(&graph)).await, 0);
        assert_eq!(graph.call_count("add"), 0);
        assert_eq!(graph.call_count("cognify"), 0);
    }

    #[tokio::test]
    async fn test_cognify_failure_keeps_persisted_count() {
        let feedback = FeedbackLoop::default();
        let graph = MockKnowledgeGraph::new();
        graph.set_fail_cognify(true);
        verified(&feedback, "fact");

        assert_eq!(feedback.process_pending(Some(&graph)).await, 1);
        assert_eq!(feedback.get_statistics().pending_count, 0);
    }

    #[tokio::test]
    async fn test_persist_timeout_keeps_finding_pending() {
        let feedback = FeedbackLoop::new(FeedbackSettings {
            persist_timeout: Duration::from_millis(20),
            ..Default::default()
        });
        let graph = MockKnowledgeGraph::new();
        graph.set_add_delay(Duration::from_millis(500));
        let id = verified(&feedback, "slow fact");

        assert_eq!(feedback.process_pending(Some(&graph)).await, 0);

        let finding = feedback.get_finding(&id).unwrap();
        assert_eq!(finding.persist_attempts, 1);
        assert!(finding.last_error.unwrap().contains("timed out"));
        assert_eq!(feedback.get_statistics().persist_failures, 1);
    }

    #[tokio::test]
    async fn test_process_pending_is_single_flight() {
        let feedback = FeedbackLoop::default();
        let graph = MockKnowledgeGraph::new();
        graph.set_add_delay(Duration::from_millis(50));
        verified(&feedback, "fact a");
        verified(&feedback, "fact b");

        let (first, second) = tokio::join!(
            feedback.process_pending(Some(&graph)),
            feedback.process_pending(Some(&graph)),
        );

        assert_eq!(first + second, 2);
        assert!(first == 0 || second == 0);
        assert_eq!(graph.call_count("add"), 2);
        assert_eq!(feedback.get_statistics().findings_persisted, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_merge() {
        let feedback = Arc::new(FeedbackLoop::default());

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let feedback = Arc::clone(&feedback);
                tokio::spawn(async move {
                    feedback.add_finding(REFUND, &format!("doc_{}", i % 10), 0.9, "q", &[])
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        let stats = feedback.get_statistics();
        assert_eq!(stats.findings_received, 100);
        assert_eq!(stats.findings_deduplicated, 99);
        assert_eq!(stats.pending_count, 1);

        let finding = feedback.pending_findings().pop().unwrap();
        assert_eq!(finding.verification_count, 100);
        assert_eq!(finding.source_count(), 10);
    }

    #[test]
    fn test_capacity_evicts_oldest_unverified() {
        let feedback = FeedbackLoop::new(FeedbackSettings {
            max_pending: 2,
            pending_ttl: None,
            ..Default::default()
        });
        let t0 = Utc::now();
        let at = |secs| t0 + chrono::Duration::seconds(secs);

        let a = feedback.add_finding_at("a", "s", 0.9, "q", &[], at(0)).unwrap();
        feedback.add_finding_at("a", "s", 0.9, "q", &[], at(1)).unwrap();
        let b = feedback.add_finding_at("b", "s", 0.9, "q", &[], at(2)).unwrap();
        let c = feedback.add_finding_at("c", "s", 0.9, "q", &[], at(3)).unwrap();

        // `a` is older but verified, so the unverified `b` goes.
        assert!(feedback.get_finding(&a).is_some());
        assert!(feedback.get_finding(&b).is_none());
        assert!(feedback.get_finding(&c).is_some());

        let stats = feedback.get_statistics();
        assert_eq!(stats.findings_evicted, 1);
        assert_eq!(stats.pending_count, 2);
    }

    #[test]
    fn test_capacity_prefers_expired_entries() {
        let feedback = FeedbackLoop::new(FeedbackSettings {
            max_pending: 2,
            pending_ttl: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let t0 = Utc::now();
        let at = |secs| t0 + chrono::Duration::seconds(secs);

        let stale = feedback.add_finding_at("stale", "s", 0.9, "q", &[], at(0)).unwrap();
        let fresh = feedback.add_finding_at("fresh", "s", 0.9, "q", &[], at(50)).unwrap();
        let new = feedback.add_finding_at("new", "s", 0.9, "q", &[], at(100)).unwrap();

        assert!(feedback.get_finding(&stale).is_none());
        assert!(feedback.get_finding(&fresh).is_some());
        assert!(feedback.get_finding(&new).is_some());
        assert_eq!(feedback.get_statistics().findings_evicted, 1);
    }

    #[test]
    fn test_reinforcing_at_capacity_does_not_evict() {
        let feedback = FeedbackLoop::new(FeedbackSettings {
            max_pending: 1,
            ..Default::default()
        });

        feedback.add_finding("only", "s", 0.9, "q", &[]);
        feedback.add_finding("only", "t", 0.9, "q", &[]);

        let stats = feedback.get_statistics();
        assert_eq!(stats.findings_evicted, 0);
        assert_eq!(stats.verified_count, 1);
    }

    #[test]
    fn test_evict_expired() {
        let feedback = FeedbackLoop::new(FeedbackSettings {
            pending_ttl: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let t0 = Utc::now();

        let old = feedback.add_finding_at("old", "s", 0.9, "q", &[], t0).unwrap();
        let recent = feedback
            .add_finding_at("recent", "s", 0.9, "q", &[], t0 + chrono::Duration::seconds(30))
            .unwrap();

        assert_eq!(feedback.evict_expired(t0 + chrono::Duration::seconds(61)), 1);
        assert!(feedback.get_finding(&old).is_none());
        assert!(feedback.get_finding(&recent).is_some());
        assert_eq!(feedback.get_statistics().findings_evicted, 1);
    }

    #[test]
    fn test_evict_expired_without_ttl() {
        let feedback = FeedbackLoop::new(FeedbackSettings {
            pending_ttl: None,
            ..Default::default()
        });
        feedback.add_finding("fact", "s", 0.9, "q", &[]);

        let far_future = Utc::now() + chrono::Duration::days(365);
        assert_eq!(feedback.evict_expired(far_future), 0);
        assert_eq!(feedback.get_statistics().pending_count, 1);
    }

    #[test]
    fn test_ingest_fragments() {
        let feedback = FeedbackLoop::default();
        let fragments = vec![
            ScoredFragment::new(REFUND, 0.85)
                .with_doc_id("doc_1")
                .with_entity("product_x"),
            ScoredFragment::new("weak match", 0.3).with_doc_id("doc_2"),
            ScoredFragment::new(REFUND, 1.4)
                .with_doc_id("doc_2")
                .with_entity("product_x"),
            ScoredFragment::new("no source", 0.95),
        ];

        let ids = feedback.ingest_fragments("refund policy?", &fragments);
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], ids[1]);

        let merged = feedback.get_finding(&ids[0]).unwrap();
        assert!(merged.verified);
        assert_eq!(merged.confidence, 1.0);
        assert_eq!(merged.query_context, "refund policy?");

        let orphan = feedback.get_finding(&ids[2]).unwrap();
        assert_eq!(orphan.source, "unknown");

        assert_eq!(feedback.get_statistics().findings_rejected, 1);
    }

    #[test]
    fn test_pending_findings_sorted_by_creation() {
        let feedback = FeedbackLoop::default();
        let t0 = Utc::now();
        let second = feedback
            .add_finding_at("second", "s", 0.9, "q", &[], t0 + chrono::Duration::seconds(1))
            .unwrap();
        let first = feedback.add_finding_at("first", "s", 0.9, "q", &[], t0).unwrap();

        let ids: Vec<_> = feedback.pending_findings().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_resubmitted_finding_survives_inflight_persist() {
        let feedback = Arc::new(FeedbackLoop::new(FeedbackSettings {
            pending_ttl: Some(Duration::from_secs(60)),
            ..Default::default()
        }));
        let graph = Arc::new(MockKnowledgeGraph::new());
        graph.set_add_delay(Duration::from_millis(100));

        let t0 = Utc::now() - chrono::Duration::hours(1);
        let id = feedback.add_finding_at(REFUND, "doc_1", 0.9, "q", &[], t0).unwrap();
        feedback.add_finding_at(REFUND, "doc_2", 0.9, "q", &[], t0).unwrap();

        let sweep = tokio::spawn({
            let feedback = Arc::clone(&feedback);
            let graph = Arc::clone(&graph);
            async move { feedback.process_pending(Some(&*graph)).await }
        });

        // While the write is in flight the entry expires and comes back.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(feedback.evict_expired(Utc::now()), 1);
        let again = feedback.add_finding(REFUND, "doc_3", 0.9, "q", &[]).unwrap();
        assert_eq!(again, id);

        assert_eq!(sweep.await.unwrap(), 1);

        let finding = feedback.get_finding(&id).unwrap();
        assert!(!finding.verified);
        assert_eq!(finding.verification_count, 1);
        assert_eq!(finding.persist_attempts, 0);

        let stats = feedback.get_statistics();
        assert_eq!(stats.findings_persisted, 1);
        assert_eq!(stats.pending_count, 1);
    }

    #[test]
    fn test_out_of_range_settings_are_clamped() {
        let feedback = FeedbackLoop::new(FeedbackSettings {
            confidence_threshold: 1.5,
            verification_threshold: 0,
            max_pending: 0,
            dataset_name: "  ".to_string(),
            ..Default::default()
        });

        let settings = feedback.settings();
        assert_eq!(settings.confidence_threshold, 1.0);
        assert_eq!(settings.verification_threshold, 1);
        assert_eq!(settings.max_pending, 1);
        assert_eq!(settings.dataset_name, DEFAULT_DATASET_NAME);

        // One slot, verified on first sight.
        let a = feedback.add_finding("a", "s", 1.0, "q", &[]).unwrap();
        assert!(feedback.get_finding(&a).unwrap().verified);
        let b = feedback.add_finding("b", "s", 1.0, "q", &[]).unwrap();
        assert_eq!(feedback.pending_findings().len(), 1);
        assert!(feedback.get_finding(&b).is_some());
    }

    #[test]
    fn test_valid_settings_are_kept() {
        let settings = FeedbackSettings::default();
        assert_eq!(settings.clone().sanitized(), settings);
    }

    #[test]
    fn test_settings_from_config() {
        let config = FeedbackConfig {
            confidence_threshold: 0.5,
            verification_threshold: 4,
            dataset_name: "facts".to_string(),
            ..Default::default()
        };
        let feedback = FeedbackLoop::from_config(&config);

        assert_eq!(feedback.settings().confidence_threshold, 0.5);
        assert_eq!(feedback.settings().verification_threshold, 4);
        assert_eq!(feedback.settings().dataset_name, "facts");
    }
}
