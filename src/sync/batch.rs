//! Batch reconciliation of replayed modifications

use futures::future::join_all;
use serde_json::Value;

use super::engine::Reconciler;
use super::error::{SyncError, SyncResult};
use super::types::{ModifiedRequest, ModifiedResponse};

/// One decoded item of a modification batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    Request(ModifiedRequest),
    /// The item names its `localId` but its body is unusable
    Invalid { local_id: i64, reason: String },
}

impl BatchItem {
    /// Decode the item at `index` of a raw batch
    ///
    /// Fails only when the item cannot be correlated with a response, i.e.
    /// it has no integer `localId`.
    pub fn decode(index: usize, raw: Value) -> SyncResult<Self> {
        let local_id = raw
            .get("localId")
            .and_then(Value::as_i64)
            .ok_or(SyncError::MissingLocalId { index })?;

        Ok(match serde_json::from_value::<ModifiedRequest>(raw) {
            Ok(request) => BatchItem::Request(request),
            Err(e) => BatchItem::Invalid {
                local_id,
                reason: e.to_string(),
            },
        })
    }

    pub fn local_id(&self) -> i64 {
        match self {
            BatchItem::Request(request) => request.local_id(),
            BatchItem::Invalid { local_id, .. } => *local_id,
        }
    }
}

/// Decode a raw batch, failing as a whole on the first uncorrelatable item
pub fn decode_batch(raw: Vec<Value>) -> SyncResult<Vec<BatchItem>> {
    raw.into_iter()
        .enumerate()
        .map(|(index, item)| BatchItem::decode(index, item))
        .collect()
}

impl Reconciler {
    /// Reconcile every item of a batch concurrently
    ///
    /// Returns exactly one response per item, in input order. A failing item
    /// degrades to [`ModifiedResponse::Failed`] without touching its siblings.
    pub async fn reconcile_batch(
        &self,
        user_id: &str,
        items: Vec<BatchItem>,
    ) -> Vec<ModifiedResponse> {
        tracing::debug!(user_id = %user_id, count = items.len(), "Reconciling batch");

        let tasks = items.into_iter().map(|item| async move {
            match item {
                BatchItem::Request(request) => {
                    let local_id = request.local_id();
                    match self.reconcile(user_id, &request).await {
                        Ok(response) => response,
                        Err(e) => {
                            tracing::warn!(
                                user_id = %user_id,
                                local_id,
                                action = ?request.action(),
                                "Reconciliation failed: {}",
                                e
                            );
                            ModifiedResponse::failed(local_id, e)
                        }
                    }
                }
                BatchItem::Invalid { local_id, reason } => {
                    tracing::warn!(user_id = %user_id, local_id, "Rejected item: {}", reason);
                    ModifiedResponse::failed(local_id, reason)
                }
            }
        });

        join_all(tasks).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::games::fingerprint;
    use crate::testing::{game_at, info_with, seed, FaultyStore};

    const USER: &str = "user-1";

    fn create_json(local_id: i64, created_id: &str, seconds: u64) -> Value {
        let info = serde_json::to_value(info_with(seconds, &[(0, 2)])).unwrap();
        json!({
            "type": "CREATE",
            "localId": local_id,
            "createdId": created_id,
            "lastLocalModifiedTimestamp": 1_000,
            "baseGameInfo": info,
        })
    }

    #[test]
    fn test_decode_requires_local_id() {
        let err = decode_batch(vec![
            create_json(1, "h1", 1),
            json!({"type": "DELETE", "id": "g", "lastActionId": "a"}),
        ])
        .unwrap_err();

        assert!(matches!(err, SyncError::MissingLocalId { index: 1 }));

        let err = BatchItem::decode(0, json!({"type": "DELETE", "localId": "7"})).unwrap_err();
        assert!(matches!(err, SyncError::MissingLocalId { index: 0 }));
    }

    #[test]
    fn test_decode_keeps_unusable_items() {
        let item = BatchItem::decode(0, json!({"type": "MERGE", "localId": 4})).unwrap();

        assert_eq!(item.local_id(), 4);
        assert!(matches!(item, BatchItem::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_batch_answers_every_item() {
        let store = Arc::new(FaultyStore::with_broken_ids(&["broken"]));
        let reconciler = Reconciler::new(store.clone());
        let existing = seed(&*store, USER, game_at(info_with(3, &[]), 1_000, None)).await;

        let raw = vec![
            create_json(1, "h1", 1),
            create_json(2, "broken", 2),
            json!({"type": "DELETE", "localId": 3, "id": existing.id, "lastActionId": existing.last_action_id}),
            json!({"type": "UPDATE", "localId": 4, "id": "x", "lastActionId": "a"}),
            create_json(5, "h5", 5),
        ];
        let items = decode_batch(raw).unwrap();
        let responses = reconciler.reconcile_batch(USER, items).await;

        let local_ids: Vec<i64> = responses.iter().map(ModifiedResponse::local_id).collect();
        assert_eq!(local_ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(local_ids.iter().collect::<HashSet<_>>().len(), 5);

        assert!(matches!(responses[0], ModifiedResponse::CreatedSuccess { .. }));
        assert!(matches!(responses[1], ModifiedResponse::Failed { .. }));
        assert_eq!(responses[2], ModifiedResponse::DeletedSuccess { local_id: 3 });
        assert!(matches!(responses[3], ModifiedResponse::Failed { .. }));
        assert!(matches!(responses[4], ModifiedResponse::CreatedSuccess { .. }));
    }

    #[tokio::test]
    async fn test_batch_replay_is_idempotent() {
        let store = Arc::new(FaultyStore::new());
        let reconciler = Reconciler::new(store.clone());
        let created_id = fingerprint(&info_with(1, &[(0, 2)]));

        let raw = vec![create_json(1, &created_id, 1)];
        let first = reconciler
            .reconcile_batch(USER, decode_batch(raw.clone()).unwrap())
            .await;
        let second = reconciler
            .reconcile_batch(USER, decode_batch(raw).unwrap())
            .await;

        let created_id_of = |response: &ModifiedResponse| match response {
            ModifiedResponse::CreatedSuccess { id, .. } => id.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(created_id_of(&first[0]), created_id_of(&second[0]));
        assert_eq!(store.inner.game_count(USER), 1);
    }
}
