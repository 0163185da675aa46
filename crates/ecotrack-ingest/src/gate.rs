use ecotrack_core::{ReadingDraft, ReadingKey};
use ecotrack_storage::{ReadingStore, StoreError};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateOutcome {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Point-lookup idempotency check in front of every insert.
///
/// Each draft is checked and, if new, inserted before the next one is looked
/// at, so repeats inside a single upstream batch are caught as well.
pub struct DedupGate<'a> {
    store: &'a dyn ReadingStore,
}

impl<'a> DedupGate<'a> {
    pub fn new(store: &'a dyn ReadingStore) -> Self {
        Self { store }
    }

    pub async fn exists(&self, key: &ReadingKey) -> Result<bool, StoreError> {
        self.store.reading_exists(key).await
    }

    /// Insert `draft` unless its key is already stored. Returns whether it was inserted.
    pub async fn admit(&self, draft: &ReadingDraft) -> Result<bool, StoreError> {
        if self.exists(&draft.key()).await? {
            debug!(zone_id = %draft.zone_id, indicator_type = %draft.indicator_type, timestamp = %draft.timestamp, "duplicate reading skipped");
            return Ok(false);
        }
        self.store.insert_reading(draft).await?;
        Ok(true)
    }

    pub async fn persist_all(&self, drafts: &[ReadingDraft]) -> Result<GateOutcome, StoreError> {
        let mut outcome = GateOutcome::default();
        for draft in drafts {
            if self.admit(draft).await? {
                outcome.inserted += 1;
            } else {
                outcome.duplicates += 1;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ecotrack_core::{IndicatorType, NewZone};
    use ecotrack_storage::SqliteStore;

    #[tokio::test]
    async fn repeated_batch_inserts_nothing_the_second_time() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        store.migrate().await.unwrap();
        let zone = store.get_or_create_zone(&NewZone::named("Paris")).await.unwrap().zone;
        let drafts: Vec<_> = (0..3)
            .map(|hour| {
                ReadingDraft::new(
                    IndicatorType::Temperature,
                    10.0 + f64::from(hour),
                    Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).single().unwrap(),
                    zone.id,
                )
            })
            .collect();

        let gate = DedupGate::new(&store);
        let first = gate.persist_all(&drafts).await.unwrap();
        assert_eq!(first, GateOutcome { inserted: 3, duplicates: 0 });

        let second = gate.persist_all(&drafts).await.unwrap();
        assert_eq!(second, GateOutcome { inserted: 0, duplicates: 3 });
        assert_eq!(
            store.count_readings(zone.id, IndicatorType::Temperature).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn repeat_inside_one_batch_is_caught() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        store.migrate().await.unwrap();
        let zone = store.get_or_create_zone(&NewZone::named("Paris")).await.unwrap().zone;
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().unwrap();
        let draft = ReadingDraft::new(IndicatorType::ElectricityConsumption, 9000.0, ts, zone.id);

        let outcome = DedupGate::new(&store)
            .persist_all(&[draft.clone(), draft])
            .await
            .unwrap();
        assert_eq!(outcome, GateOutcome { inserted: 1, duplicates: 1 });
    }
}
