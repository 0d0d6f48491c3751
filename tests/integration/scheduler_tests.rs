use super::*;
use rivalprice_monitor::config::SchedulerConfig;
use rivalprice_monitor::queue::{JobQueue, MemoryJobQueue};
use rivalprice_monitor::scheduler::PageScheduler;
use std::time::Duration;

#[tokio::test]
async fn test_due_daily_page_enqueued_once_and_rescheduled() -> anyhow::Result<()> {
    let pool = test_pool().await?;
    let competitor_id = seed_owner(&pool).await?;
    let now = Utc::now();
    let page = seed_page(
        &pool,
        competitor_id,
        "https://acme.test/pricing",
        Frequency::Daily,
        Some(now - chrono::Duration::hours(2)),
    )
    .await?;

    let queue = Arc::new(MemoryJobQueue::new());
    let scheduler = PageScheduler::new(pool.clone(), queue.clone(), SchedulerConfig::default());

    let report = scheduler.tick_at(now).await?;
    assert_eq!(report.due, 1);
    assert_eq!(report.enqueued, 1);
    assert_eq!(queue.len().await?, 1);

    let job = queue.pop(Duration::from_millis(10)).await?.expect("job enqueued");
    assert_eq!(job.page_id, page.id);
    assert_eq!(job.url, "https://acme.test/pricing");
    assert_eq!(job.page_type, "pricing");

    let stored = MonitoredPage::find_by_id(page.id, &pool).await?.expect("page exists");
    assert_eq!(stored.next_run_at, Some(now + chrono::Duration::hours(24)));
    assert_eq!(stored.last_checked_at, Some(now));

    // Rescheduled page is no longer due on the next tick.
    let second = scheduler.tick_at(now + chrono::Duration::seconds(60)).await?;
    assert_eq!(second.due, 0);
    assert_eq!(queue.len().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_unknown_frequency_defaults_to_daily() -> anyhow::Result<()> {
    let pool = test_pool().await?;
    let competitor_id = seed_owner(&pool).await?;
    let now = Utc::now();
    let page = seed_page(
        &pool,
        competitor_id,
        "https://acme.test/plans",
        Frequency::Daily,
        Some(now - chrono::Duration::minutes(1)),
    )
    .await?;
    sqlx::query("UPDATE monitored_pages SET frequency = 'hourly' WHERE id = ?")
        .bind(page.id)
        .execute(&pool)
        .await?;

    let queue = Arc::new(MemoryJobQueue::new());
    let scheduler = PageScheduler::new(pool.clone(), queue.clone(), SchedulerConfig::default());
    scheduler.tick_at(now).await?;

    let stored = MonitoredPage::find_by_id(page.id, &pool).await?.expect("page exists");
    assert_eq!(stored.next_run_at, Some(now + chrono::Duration::hours(24)));
    Ok(())
}

#[tokio::test]
async fn test_future_and_unscheduled_pages_are_not_enqueued() -> anyhow::Result<()> {
    let pool = test_pool().await?;
    let competitor_id = seed_owner(&pool).await?;
    let now = Utc::now();
    seed_page(
        &pool,
        competitor_id,
        "https://acme.test/later",
        Frequency::Weekly,
        Some(now + chrono::Duration::hours(1)),
    )
    .await?;
    seed_page(&pool, competitor_id, "https://acme.test/new", Frequency::Daily, None).await?;

    let queue = Arc::new(MemoryJobQueue::new());
    let scheduler = PageScheduler::new(pool.clone(), queue.clone(), SchedulerConfig::default());

    let report = scheduler.tick_at(now).await?;
    assert_eq!(report.due, 0);
    assert_eq!(queue.len().await?, 0);
    Ok(())
}
