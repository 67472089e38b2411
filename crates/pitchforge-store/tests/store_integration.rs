//! Integration tests for pitchforge-store across the file-backed stores.

use pitchforge_core::{A2AMessage, AgentKind, Draft, Pitch, PitchType, Stage, Tone};
use pitchforge_store::{
    replay_stages, FilePitchStore, FileTrailStore, PersistRetry, PitchRepository, TrailRecorder,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

#[tokio::test]
async fn test_lineage_walk_matches_version_for_every_pitch() {
    let tmp = TempDir::new().unwrap();
    let store = FilePitchStore::new(tmp.path().to_path_buf()).await.unwrap();

    let mut current = Pitch::initial(
        Uuid::new_v4(),
        Draft::new("Title", "draft 1"),
        PitchType::FollowUp,
        Tone::Friendly,
    );
    let mut ids = vec![current.id];
    store.save(&current).await.unwrap();
    for i in 2..=5 {
        current = current.refine_into(Draft::new("Title", format!("draft {i}")), "Improve relevance");
        store.save(&current).await.unwrap();
        ids.push(current.id);
    }

    for id in ids {
        let pitch = store.get(id).await.unwrap();
        let lineage = store.lineage(id).await.unwrap();
        assert_eq!(lineage.len(), pitch.version as usize);
        assert!(lineage[0].parent_id.is_none());
        assert!(lineage.windows(2).all(|w| w[1].version == w[0].version + 1
            && w[1].parent_id == Some(w[0].id)));
    }
}

#[tokio::test]
async fn test_concurrent_runs_keep_independent_lineages() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FilePitchStore::new(tmp.path().to_path_buf()).await.unwrap());
    let customer = Uuid::new_v4();

    let mut handles = Vec::new();
    for run in 0..4 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut p = Pitch::initial(
                customer,
                Draft::new("T", format!("run {run} v1")),
                PitchType::Initial,
                Tone::Professional,
            );
            store.save(&p).await.unwrap();
            for v in 2..=3 {
                p = p.refine_into(Draft::new("T", format!("run {run} v{v}")), "more");
                store.save(&p).await.unwrap();
            }
            p.id
        }));
    }

    let mut roots = std::collections::HashSet::new();
    for h in handles {
        let last = h.await.unwrap();
        let lineage = store.lineage(last).await.unwrap();
        assert_eq!(lineage.len(), 3);
        roots.insert(lineage[0].id);
    }
    assert_eq!(roots.len(), 4);
    assert_eq!(store.list_for_customer(customer).await.unwrap().len(), 12);
}

#[tokio::test]
async fn test_durable_trail_replays_after_restart() {
    let tmp = TempDir::new().unwrap();
    let id = Uuid::new_v4();
    {
        let store = Arc::new(FileTrailStore::new(tmp.path().to_path_buf()).await.unwrap());
        let recorder = TrailRecorder::with_store(store, PersistRetry::default());
        let req = recorder.record(A2AMessage::request(id, json!({"customer_id": "c"})));
        for agent in [AgentKind::Research, AgentKind::Generator, AgentKind::Scorer] {
            let d = recorder.record(A2AMessage::delegate(id, agent, json!({})));
            recorder.record(d.reply(json!({})));
        }
        recorder.record(req.reply(json!({"terminal": "completed", "finalized": true})));
        recorder.flush().await;
    }

    let store = Arc::new(FileTrailStore::new(tmp.path().to_path_buf()).await.unwrap());
    let recorder = TrailRecorder::with_store(store, PersistRetry::default());
    let trail = recorder.fetch(id).await.unwrap();
    assert_eq!(trail.len(), 8);
    assert_eq!(
        replay_stages(&trail).unwrap(),
        vec![
            Stage::Created,
            Stage::Researching,
            Stage::Generating,
            Stage::Scoring,
            Stage::Finalizing,
            Stage::Completed,
        ]
    );
}
