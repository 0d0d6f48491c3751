use super::*;
use rivalprice_monitor::alerts::{AlertEngine, AlertPoller, ProcessOutcome};
use rivalprice_monitor::config::{AlertsConfig, SummarizerConfig, WebhookConfig};
use rivalprice_monitor::models::{
    AlertLog, AlertPreferences, AlertSuppression, Severity, UserNotificationSettings,
};
use rivalprice_monitor::plugins::notifiers::WebhookNotifier;
use rivalprice_monitor::plugins::summarizers::{OpenAiSummarizer, RuleBasedSummarizer, RULE_BASED_MODEL};
use rivalprice_monitor::plugins::{NotificationDispatcher, Summarizer};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rule_based() -> Arc<dyn Summarizer> {
    Arc::new(RuleBasedSummarizer::new())
}

/// Points at a closed port so every request fails at connect time.
fn unreachable_summarizer() -> anyhow::Result<Arc<dyn Summarizer>> {
    let config = SummarizerConfig {
        api_key: Some("sk-test".to_string()),
        base_url: "http://127.0.0.1:9/v1".to_string(),
        timeout_secs: 2,
        ..SummarizerConfig::default()
    };
    Ok(Arc::new(OpenAiSummarizer::new(&config)?))
}

async fn seeded_page(pool: &SqlitePool) -> anyhow::Result<i64> {
    let competitor_id = seed_owner(pool).await?;
    let page = seed_page(pool, competitor_id, "https://acme.test/pricing", Frequency::Daily, None).await?;
    Ok(page.id)
}

#[tokio::test]
async fn test_large_price_drop_alerts_with_high_severity() -> anyhow::Result<()> {
    let pool = test_pool().await?;
    let page_id = seeded_page(&pool).await?;
    let change = price_change(&pool, page_id, "price_decrease", "$100", "$80", -20.0).await?;

    let engine = AlertEngine::new(pool.clone(), rule_based(), NotificationDispatcher::new());
    let ProcessOutcome::Alerted(alert) = engine.process_change(&change).await? else {
        panic!("expected an alert");
    };

    assert_eq!(alert.severity, Severity::High);
    assert_eq!(alert.alert_type, "price_decrease");
    assert_eq!(alert.old_price.as_deref(), Some("$100"));
    assert_eq!(alert.new_price.as_deref(), Some("$80"));
    assert!(alert.message.contains("=== FACTS ==="));
    assert!(alert.message.contains("=== RECOMMENDATION ==="));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_summarizer_falls_back_to_templates() -> anyhow::Result<()> {
    let pool = test_pool().await?;
    let page_id = seeded_page(&pool).await?;
    let change = price_change(&pool, page_id, "price_increase", "$49", "$59", 20.4).await?;

    let engine = AlertEngine::new(pool.clone(), unreachable_summarizer()?, NotificationDispatcher::new());
    let ProcessOutcome::Alerted(alert) = engine.process_change(&change).await? else {
        panic!("expected an alert");
    };

    assert!(!alert.summary.is_empty());
    assert!(alert.summary.contains("$49"));
    assert!(alert.summary.contains("$59"));
    assert_eq!(alert.model.as_deref(), Some(RULE_BASED_MODEL));
    assert_eq!(alert.severity, Severity::High);
    Ok(())
}

#[tokio::test]
async fn test_orphaned_page_uses_defaults_without_error() -> anyhow::Result<()> {
    let pool = test_pool().await?;
    let engine = AlertEngine::new(pool.clone(), rule_based(), NotificationDispatcher::new());

    // No page row at all: the ownership chain cannot be walked.
    let allowed = price_change(&pool, 404, "price_decrease", "$10", "$9", -10.0).await?;
    let messaging = DetectedChange::create(
        NewDetectedChange {
            page_id: 404,
            change_type: "messaging_change".to_string(),
            ..NewDetectedChange::default()
        },
        &pool,
    )
    .await?;
    let small = price_change(&pool, 404, "price_increase", "$10", "$10.20", 2.0).await?;

    let ProcessOutcome::Alerted(alert) = engine.process_change(&allowed).await? else {
        panic!("price change above default threshold should alert");
    };
    assert!(!alert.notified);
    assert_eq!(alert.notify_channel, "log");

    assert!(matches!(
        engine.process_change(&messaging).await?,
        ProcessOutcome::Suppressed { .. }
    ));
    assert!(matches!(
        engine.process_change(&small).await?,
        ProcessOutcome::Suppressed { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn test_disabled_price_toggle_suppresses_large_drop() -> anyhow::Result<()> {
    let pool = test_pool().await?;
    let page_id = seeded_page(&pool).await?;
    UserNotificationSettings::upsert_for_user(
        OWNER_ID,
        &AlertPreferences {
            alert_on_price_change: false,
            ..AlertPreferences::new_user()
        },
        &pool,
    )
    .await?;
    let change = price_change(&pool, page_id, "price_decrease", "$100", "$50", -50.0).await?;

    let engine = AlertEngine::new(pool.clone(), rule_based(), NotificationDispatcher::new());
    let outcome = engine.process_change(&change).await?;
    assert_eq!(
        outcome,
        ProcessOutcome::Suppressed {
            reason: "price alerts disabled by user".to_string()
        }
    );
    assert!(AlertLog::find_by_change(change.id, &pool).await?.is_none());
    assert!(AlertSuppression::find_by_change(change.id, &pool).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_email_and_webhook_delivery_is_recorded() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/rival"))
        .and(body_partial_json(serde_json::json!({ "alert_type": "feature_removed" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let pool = test_pool().await?;
    let page_id = seeded_page(&pool).await?;
    let hook_url = format!("{}/hooks/rival", server.uri());
    UserNotificationSettings::upsert_for_user(
        OWNER_ID,
        &AlertPreferences {
            notify_webhook: true,
            webhook_url: Some(hook_url.clone()),
            ..AlertPreferences::new_user()
        },
        &pool,
    )
    .await?;

    let email = RecordingNotifier::new("email", true);
    let email_sent = Arc::clone(&email.sent);
    let dispatcher = NotificationDispatcher::new();
    dispatcher.register_notifier(Arc::new(email)).await;
    dispatcher
        .register_notifier(Arc::new(WebhookNotifier::new(&WebhookConfig::default())?))
        .await;

    let change = DetectedChange::create(
        NewDetectedChange {
            page_id,
            change_type: "feature_removed".to_string(),
            features_removed: Some("SSO".to_string()),
            ..NewDetectedChange::default()
        },
        &pool,
    )
    .await?;

    let engine = AlertEngine::new(pool.clone(), rule_based(), dispatcher);
    let ProcessOutcome::Alerted(alert) = engine.process_change(&change).await? else {
        panic!("expected an alert");
    };

    assert!(alert.notified);
    assert!(alert.notified_at.is_some());
    assert_eq!(alert.notify_channel, "email,webhook");
    assert_eq!(*email_sent.lock().unwrap(), vec![OWNER_EMAIL.to_string()]);

    let stored = AlertLog::find_by_change(change.id, &pool).await?.expect("alert stored");
    assert_eq!(stored.notify_channel, "email,webhook");
    assert!(stored.notified);
    Ok(())
}

#[tokio::test]
async fn test_rejected_email_leaves_alert_unnotified() -> anyhow::Result<()> {
    let pool = test_pool().await?;
    let page_id = seeded_page(&pool).await?;
    let dispatcher = NotificationDispatcher::new();
    dispatcher
        .register_notifier(Arc::new(RecordingNotifier::new("email", false)))
        .await;

    let change = price_change(&pool, page_id, "price_increase", "$20", "$30", 50.0).await?;
    let engine = AlertEngine::new(pool.clone(), rule_based(), dispatcher);
    let ProcessOutcome::Alerted(alert) = engine.process_change(&change).await? else {
        panic!("expected an alert");
    };

    assert!(!alert.notified);
    assert_eq!(alert.notify_channel, "log");
    assert_eq!(alert.severity, Severity::Critical);
    Ok(())
}

#[tokio::test]
async fn test_poll_is_idempotent() -> anyhow::Result<()> {
    let pool = test_pool().await?;
    let page_id = seeded_page(&pool).await?;
    price_change(&pool, page_id, "price_decrease", "$100", "$80", -20.0).await?;
    price_change(&pool, page_id, "price_increase", "$80", "$81", 1.25).await?;

    let engine = Arc::new(AlertEngine::new(pool.clone(), rule_based(), NotificationDispatcher::new()));
    let poller = AlertPoller::new(pool.clone(), engine, AlertsConfig::default());

    let first = poller.run_once().await?;
    assert_eq!(first.fetched, 2);
    assert_eq!(first.alerted, 1);
    assert_eq!(first.suppressed, 1);

    let second = poller.run_once().await?;
    assert_eq!(second.fetched, 0);
    assert_eq!(AlertLog::count(&pool).await?, 1);
    assert_eq!(DetectedChange::count_unprocessed(&pool).await?, 0);
    Ok(())
}
