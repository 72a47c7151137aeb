//! Workers and reassembler sharing one SQLite-backed object store on disk

mod common;

use common::{articles, layout};
use paperthread::{
    plan_chunks, ChunkPayload, ChunkWorker, MockSummarizer, OpenStore, PollConfig, Reassembler,
    RunId, SqliteObjectStore, WorkerBudget,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn concurrent_workers_then_reassembly_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("objects.db");
    let run_id = RunId::new("20250501093000123");
    let chunks = plan_chunks(articles(0..7), 3).unwrap();
    assert_eq!(chunks.len(), 3);

    {
        let store = Arc::new(SqliteObjectStore::open(&db).unwrap());
        let worker = Arc::new(
            ChunkWorker::new(Arc::new(MockSummarizer::new()), store, layout())
                .with_budget(WorkerBudget::default().without_cooldown()),
        );

        let mut handles = Vec::new();
        for chunk in chunks.into_iter().rev() {
            let worker = worker.clone();
            let payload = ChunkPayload {
                run_id: run_id.clone(),
                token: chunk.token,
                articles: chunk.articles,
            };
            handles.push(tokio::spawn(async move { worker.process(payload).await }));
        }
        for handle in handles {
            let report = handle.await.unwrap().unwrap();
            assert!(report.complete);
        }
    }

    let store = Arc::new(SqliteObjectStore::open(&db).unwrap());
    let reassembler = Reassembler::new(store, layout()).with_poll(PollConfig {
        interval: Duration::from_secs(1),
        max_wait: Duration::from_secs(5),
    });
    let report = reassembler.reassemble(&run_id, 3).await.unwrap();
    assert_eq!(report.article_count, 7);
    assert_eq!(
        report.titles,
        (0..7).map(|n| format!("Paper {}", n)).collect::<Vec<_>>()
    );
    assert_eq!(reassembler.latest_final_key().await.unwrap(), Some(report.final_key));
}
