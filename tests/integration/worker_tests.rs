use super::*;
use rivalprice_monitor::config::SchedulerConfig;
use rivalprice_monitor::models::{Availability, Snapshot};
use rivalprice_monitor::queue::{JobQueue, MemoryJobQueue};
use rivalprice_monitor::scheduler::PageScheduler;
use rivalprice_monitor::scraper::{ScrapeWorker, WorkOutcome};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EURO_PAGE: &str = r#"<html>
<head><title>Widget Pro - Acme</title></head>
<body>
  <span class="price">EUR 49,00</span>
  <p>Currently OUT OF STOCK</p>
</body>
</html>"#;

#[tokio::test]
async fn test_scheduled_page_flows_into_snapshot() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/widget"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EURO_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let pool = test_pool().await?;
    let competitor_id = seed_owner(&pool).await?;
    let url = format!("{}/widget", server.uri());
    let page = seed_page(
        &pool,
        competitor_id,
        &url,
        Frequency::Daily,
        Some(Utc::now() - chrono::Duration::minutes(10)),
    )
    .await?;

    let queue = Arc::new(MemoryJobQueue::new());
    let scheduler = PageScheduler::new(pool.clone(), queue.clone(), SchedulerConfig::default());
    scheduler.tick().await?;

    let (scraper_config, queue_config) = test_scraper_config();
    let worker = ScrapeWorker::new(pool.clone(), queue.clone(), &scraper_config, &queue_config)?;

    let WorkOutcome::Stored(snapshot) = worker.run_once().await else {
        panic!("expected a stored snapshot");
    };
    assert_eq!(snapshot.monitored_page_id, page.id);
    assert_eq!(snapshot.price, "EUR 49,00");
    assert_eq!(snapshot.availability, Availability::OutOfStock);

    let diagnostics = snapshot.diagnostics()?;
    assert_eq!(diagnostics.title, "Widget Pro - Acme");
    assert_eq!(diagnostics.url, url);
    assert_eq!(diagnostics.price_found, "EUR 49,00");
    assert_eq!(diagnostics.status_code, 200);

    let latest = Snapshot::latest_for_page(page.id, &pool).await?.expect("snapshot stored");
    assert_eq!(latest.id, snapshot.id);
    assert_eq!(queue.len().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_each_job_gets_its_own_snapshot() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>$10.00 per month, in stock</p>"))
        .mount(&server)
        .await;

    let pool = test_pool().await?;
    let competitor_id = seed_owner(&pool).await?;
    let page = seed_page(&pool, competitor_id, &server.uri(), Frequency::Daily, None).await?;

    let queue = Arc::new(MemoryJobQueue::new());
    for _ in 0..2 {
        queue
            .push(&rivalprice_monitor::queue::ScrapeJob {
                page_id: page.id,
                url: server.uri(),
                page_type: "pricing".to_string(),
            })
            .await?;
    }

    let (scraper_config, queue_config) = test_scraper_config();
    let worker = ScrapeWorker::new(pool.clone(), queue.clone(), &scraper_config, &queue_config)?;
    assert!(matches!(worker.run_once().await, WorkOutcome::Stored(_)));
    assert!(matches!(worker.run_once().await, WorkOutcome::Stored(_)));
    assert_eq!(worker.run_once().await, WorkOutcome::Idle);

    let snapshots = Snapshot::list_for_page(page.id, &pool).await?;
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots.iter().all(|s| s.price == "$10.00"));
    assert!(snapshots.iter().all(|s| s.availability == Availability::InStock));

    Ok(())
}
