//! End-to-end runs: scrape → dedup → fan-out → fan-in → thread posting
//!
//! Workers run in-process behind a `LocalInvoker`; the clock is paused so
//! polling and throttling cost no wall time.

mod common;

use common::{articles, layout, test_config};
use paperthread::summarize::MockSummaryResponse;
use paperthread::{
    Article, ChunkWorker, LocalInvoker, MemoryNotifier, MemoryObjectStore, MockPostingClient,
    MockSummarizer, ObjectStore, Pipeline, PipelineConfig, PipelineReport, Reassembler, RunOptions,
    RunStatus, Stage, StaticScraper, Variant, WorkerHandler,
};
use std::sync::Arc;

struct Harness {
    store: Arc<MemoryObjectStore>,
    client: Arc<MockPostingClient>,
    notifier: Arc<MemoryNotifier>,
    pipeline: Pipeline,
}

fn harness(config: PipelineConfig, scraped: Vec<Article>, summarizer: MockSummarizer) -> Harness {
    let store = Arc::new(MemoryObjectStore::new());
    let worker = ChunkWorker::new(Arc::new(summarizer), store.clone(), config.layout())
        .with_budget(config.worker_budget());
    let invoker = Arc::new(LocalInvoker::new().with_handler(
        config.dispatch.worker_function.clone(),
        Arc::new(WorkerHandler::new(Arc::new(worker))),
    ));
    let client = Arc::new(MockPostingClient::new());
    let notifier = Arc::new(MemoryNotifier::new());

    let pipeline = Pipeline::new(
        config,
        store.clone(),
        Arc::new(StaticScraper::new(scraped)),
        invoker,
    )
    .with_posting_client(client.clone())
    .with_notifier(notifier.clone());

    Harness {
        store,
        client,
        notifier,
        pipeline,
    }
}

fn stages(report: &PipelineReport) -> Vec<Stage> {
    report.stages.iter().map(|s| s.stage).collect()
}

#[tokio::test(start_paused = true)]
async fn posts_threads_in_scrape_order() {
    let h = harness(test_config(), articles(0..5), MockSummarizer::new());
    let options = RunOptions {
        limit: 2,
        ..RunOptions::default()
    };

    let report = h.pipeline.run(&options).await;

    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.error);
    assert_eq!(
        stages(&report),
        vec![
            Stage::Scrape,
            Stage::Dedup,
            Stage::Dispatch,
            Stage::Reassemble,
            Stage::Post,
            Stage::Archive,
            Stage::Notify,
        ]
    );
    assert_eq!(report.stage(Stage::Dispatch).unwrap().detail["expected_chunks"], 3);

    let posts = h.client.posts();
    assert_eq!(posts.len(), 4);
    assert_eq!(posts[0].text, "Paper 0\nSummary of Paper 0.");
    assert_eq!(posts[1].text, "https://arxiv.org/abs/2501.00000\n#AI");
    assert_eq!(posts[1].reply_to.as_ref(), Some(&posts[0].id));
    assert_eq!(posts[2].text, "Paper 1\nSummary of Paper 1.");
    assert_eq!(posts[2].reply_to, None);

    let run_id = report.run_id.clone().unwrap();
    let batch = Reassembler::new(h.store.clone(), layout())
        .load_final(&run_id)
        .await
        .unwrap();
    let titles: Vec<&str> = batch.articles.iter().map(|a| a.article.title.as_str()).collect();
    assert_eq!(titles, vec!["Paper 0", "Paper 1", "Paper 2", "Paper 3", "Paper 4"]);
    assert!(batch.is_complete());
}

#[tokio::test(start_paused = true)]
async fn archive_moves_final_and_drops_chunks() {
    let h = harness(test_config(), articles(0..3), MockSummarizer::new());
    let report = h.pipeline.run(&RunOptions::default()).await;
    let run_id = report.run_id.clone().unwrap();

    let archive = report.stage(Stage::Archive).unwrap();
    assert!(archive.ok);
    assert_eq!(archive.detail["deleted_chunks"], 2);

    let layout = layout();
    assert!(h.store.get(&layout.archive_key(&run_id)).await.is_ok());
    let chunks = paperthread::storage::list_all(h.store.as_ref(), &layout.chunk_prefix(&run_id))
        .await
        .unwrap();
    assert!(chunks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_run_finds_nothing_new() {
    let h = harness(test_config(), articles(0..3), MockSummarizer::new());

    let first = h.pipeline.run(&RunOptions::default()).await;
    assert_eq!(first.status, RunStatus::Completed);
    let posted = h.client.posts().len();

    let second = h.pipeline.run(&RunOptions::default()).await;
    assert_eq!(second.status, RunStatus::NoNewArticles);
    assert!(second.is_success());
    assert_eq!(second.run_id, None);
    assert_eq!(stages(&second), vec![Stage::Scrape, Stage::Dedup]);
    assert_eq!(second.stage(Stage::Dedup).unwrap().detail["already_seen"], 3);
    assert_eq!(h.client.posts().len(), posted);
}

#[tokio::test(start_paused = true)]
async fn dry_run_builds_threads_without_posting() {
    let h = harness(test_config(), articles(0..4), MockSummarizer::new());
    let options = RunOptions {
        dry_run: true,
        limit: 3,
        ..RunOptions::default()
    };

    let report = h.pipeline.run(&options).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(h.client.attempts(), 0);
    assert!(report.stage(Stage::Archive).is_none());

    let post = report.stage(Stage::Post).unwrap();
    assert_eq!(post.detail["dry_run"], true);
    assert_eq!(post.detail["threads"].as_array().unwrap().len(), 3);

    let notes = h.notifier.sent();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].message.contains("(dry run)"));
}

#[tokio::test(start_paused = true)]
async fn start_index_selects_the_posting_window() {
    let h = harness(test_config(), articles(0..5), MockSummarizer::new());
    let options = RunOptions {
        start_index: 3,
        limit: 5,
        ..RunOptions::default()
    };

    let report = h.pipeline.run(&options).await;
    assert_eq!(report.status, RunStatus::Completed);

    let heads: Vec<String> = h
        .client
        .posts()
        .into_iter()
        .filter(|p| p.reply_to.is_none())
        .map(|p| p.text)
        .collect();
    assert_eq!(heads, vec!["Paper 3\nSummary of Paper 3.", "Paper 4\nSummary of Paper 4."]);
}

#[tokio::test(start_paused = true)]
async fn failed_summary_falls_back_to_abstract_variant() {
    let scraped = articles(0..2);
    let summarizer = MockSummarizer::new()
        .with_response(scraped[0].url.clone(), MockSummaryResponse::Fail("boom".into()));
    let h = harness(test_config(), scraped, summarizer);

    let summary_run = RunOptions::default();
    let report = h.pipeline.run(&summary_run).await;
    assert_eq!(report.status, RunStatus::Completed);
    assert!(h.client.posts().is_empty());
    assert!(report.stage(Stage::Archive).is_none());

    let run_id = report.run_id.clone().unwrap();
    let abstract_run = RunOptions {
        variant: Variant::Abstract,
        ..RunOptions::default()
    };
    let (threads, _) = h.pipeline.post_run(&run_id, &abstract_run).await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].segments[0], "Paper 0\nAbstract of paper 0.");
    assert_eq!(h.client.posts()[0].text, "Paper 0\nAbstract of paper 0.");
}

#[tokio::test(start_paused = true)]
async fn missing_posting_client_fails_the_run() {
    let config = test_config();
    let store = Arc::new(MemoryObjectStore::new());
    let worker = ChunkWorker::new(Arc::new(MockSummarizer::new()), store.clone(), config.layout())
        .with_budget(config.worker_budget());
    let invoker = Arc::new(LocalInvoker::new().with_handler(
        config.dispatch.worker_function.clone(),
        Arc::new(WorkerHandler::new(Arc::new(worker))),
    ));
    let pipeline = Pipeline::new(
        config,
        store,
        Arc::new(StaticScraper::new(articles(0..1))),
        invoker,
    );

    let report = pipeline.run(&RunOptions::default()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(!report.is_success());
    let post = report.stage(Stage::Post).unwrap();
    assert!(!post.ok);
    assert!(report.error.as_deref().unwrap().contains("no posting client"));
}

#[tokio::test(start_paused = true)]
async fn unregistered_worker_fails_dispatch() {
    let mut config = test_config();
    config.dispatch.worker_function = "missing-function".to_string();
    let pipeline = Pipeline::new(
        config,
        Arc::new(MemoryObjectStore::new()),
        Arc::new(StaticScraper::new(articles(0..2))),
        Arc::new(LocalInvoker::new()),
    );

    let report = pipeline.run(&RunOptions::default()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(stages(&report), vec![Stage::Scrape, Stage::Dedup, Stage::Dispatch]);
    assert!(!report.stage(Stage::Dispatch).unwrap().ok);
}
