//! In-process step store.

use super::{RunRecord, StepRecord, StepStore};
use ragstep_core::AppResult;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Step store held in memory; state is lost with the process.
#[derive(Debug, Default)]
pub struct MemoryStepStore {
    steps: RwLock<HashMap<(String, String), StepRecord>>,
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl MemoryStepStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StepStore for MemoryStepStore {
    async fn load_step(&self, instance_id: &str, step: &str) -> AppResult<Option<StepRecord>> {
        let steps = self.steps.read().await;
        Ok(steps
            .get(&(instance_id.to_string(), step.to_string()))
            .cloned())
    }

    async fn save_step(&self, record: &StepRecord) -> AppResult<()> {
        let mut steps = self.steps.write().await;
        steps
            .entry((record.instance_id.clone(), record.step.clone()))
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn list_steps(&self, instance_id: &str) -> AppResult<Vec<StepRecord>> {
        let steps = self.steps.read().await;
        let mut records: Vec<StepRecord> = steps
            .values()
            .filter(|r| r.instance_id == instance_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.recorded_at);
        Ok(records)
    }

    async fn load_run(&self, instance_id: &str) -> AppResult<Option<RunRecord>> {
        Ok(self.runs.read().await.get(instance_id).cloned())
    }

    async fn save_run(&self, record: &RunRecord) -> AppResult<()> {
        self.runs
            .write()
            .await
            .insert(record.instance_id.clone(), record.clone());
        Ok(())
    }

    async fn list_runs(&self) -> AppResult<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn record(output: serde_json::Value) -> StepRecord {
        StepRecord {
            instance_id: "inst".to_string(),
            step: "load-and-chunk".to_string(),
            output,
            input_hash: "h".to_string(),
            attempts: 1,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_first_record_wins() {
        let store = MemoryStepStore::new();
        store.save_step(&record(json!(1))).await.unwrap();
        store.save_step(&record(json!(2))).await.unwrap();

        let loaded = store
            .load_step("inst", "load-and-chunk")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.output, json!(1));
        assert_eq!(store.list_steps("inst").await.unwrap().len(), 1);
        assert!(store.load_step("other", "load-and-chunk").await.unwrap().is_none());
    }
}
