use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use chrono::Utc;
use freelance_feed::config::Config;
use freelance_feed::messenger::LogMessenger;
use freelance_feed::service::Services;
use freelance_feed::service::delivery_service::DeliveryOutcome;
use freelance_feed::service::delivery_service::DeliveryService;
use freelance_feed::service::ingestion_service::IngestionService;
use freelance_feed::service::taxonomy_service::TaxonomyService;
use freelance_feed::service::template_service::TemplateCache;
use freelance_feed::task::delivery_worker::DeliveryWorker;
use freelance_feed::task::ingestion_loop::IngestionLoop;

mod common;

use common::FakeSource;
use common::RecordingMessenger;
use common::create_subscriber;
use common::listing_offset;
use common::record;

#[tokio::test]
async fn test_ingestion_then_delivery_cycles() {
    let (db, db_path) = common::setup_db().await;
    let now = Utc::now();

    let ingestion = Arc::new(IngestionService::new(
        db.clone(),
        Arc::new(TaxonomyService::new(db.clone())),
        listing_offset(),
        Duration::seconds(300),
    ));
    let source = Arc::new(FakeSource::new(vec![
        record(9002, now - Duration::seconds(5)),
        record(9001, now - Duration::seconds(10)),
    ]));
    let ingestion_loop = IngestionLoop::new(ingestion, source.clone(), StdDuration::from_secs(60));

    let report = ingestion_loop.run_cycle().await.unwrap();
    assert_eq!(report.persisted, 2);

    // A failing cycle is reported, not fatal, and changes nothing.
    source.fail_after(Some(0));
    assert!(ingestion_loop.run_cycle().await.is_err());
    assert_eq!(db.listing.count().await.unwrap(), 2);

    let messenger = RecordingMessenger::new();
    create_subscriber(&db, 1).await;
    let cache = Arc::new(TemplateCache::new(db.clone()));
    cache.load().await.unwrap();
    let delivery = Arc::new(DeliveryService::new(
        db.clone(),
        cache,
        Arc::new(messenger.clone()),
        None,
    ));
    let worker = DeliveryWorker::new(delivery, StdDuration::from_secs(5));

    assert!(matches!(worker.run_once().await.unwrap(), DeliveryOutcome::Delivered { .. }));
    assert!(matches!(worker.run_once().await.unwrap(), DeliveryOutcome::Delivered { .. }));
    assert_eq!(worker.run_once().await.unwrap(), DeliveryOutcome::Idle);

    let texts: Vec<String> = messenger.sent().into_iter().map(|m| m.text).collect();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("#9001"));
    assert!(texts[1].contains("#9002"));

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_services_share_one_template_cache() {
    let (db, db_path) = common::setup_db().await;
    let config = Config::from_lookup(|key| match key {
        "FEATURE_DELIVERY" => Some("false".to_string()),
        _ => None,
    })
    .unwrap();

    let services = Services::new(db.clone(), Arc::new(LogMessenger), &config, None)
        .await
        .unwrap();
    assert!(services.template_cache.get("saved").await.is_some());

    services
        .templates
        .save("saved", freelance_feed::entity::TemplateKind::Message, "Готово")
        .await
        .unwrap();
    assert_eq!(services.template_cache.text("saved").await.unwrap(), "Готово");

    let (subscriber, _) = services
        .settings
        .get_or_create_subscriber(10, "Someone")
        .await
        .unwrap();
    assert_eq!(subscriber.chat_id, 10);
    assert!(services.taxonomy.roots().await.unwrap().is_empty());

    common::teardown_db(db_path).await;
}
