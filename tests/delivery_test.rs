use std::sync::Arc;

use chrono::Duration;
use chrono::Utc;
use freelance_feed::entity::TemplateKind;
use freelance_feed::repository::Repository;
use freelance_feed::repository::table::Table;
use freelance_feed::service::delivery_service::DeliveryOutcome;
use freelance_feed::service::delivery_service::DeliveryReport;
use freelance_feed::service::delivery_service::DeliveryService;
use freelance_feed::service::error::ServiceError;
use freelance_feed::service::template_service::LISTING_CAPTION;
use freelance_feed::service::template_service::TemplateCache;
use freelance_feed::service::template_service::TemplateService;

mod common;

use common::RecordingMessenger;
use common::create_subscriber;
use common::listing_model;

async fn setup_delivery(db: &Arc<Repository>, messenger: &RecordingMessenger) -> (DeliveryService, Arc<TemplateCache>) {
    let cache = Arc::new(TemplateCache::new(db.clone()));
    cache.load().await.unwrap();
    let service = DeliveryService::new(db.clone(), cache.clone(), Arc::new(messenger.clone()), None);
    (service, cache)
}

async fn store_listing(db: &Repository, article: i64, category_ids: &[i64]) -> i64 {
    db.listing
        .insert_with_task(&listing_model(article), category_ids)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_failed_subscriber_does_not_block_others() {
    let (db, db_path) = common::setup_db().await;
    let messenger = RecordingMessenger::new();
    messenger.fail_for(2);
    let (service, _) = setup_delivery(&db, &messenger).await;

    for chat_id in 1..=3 {
        create_subscriber(&db, chat_id).await;
    }
    let listing_id = store_listing(&db, 1001, &[]).await;

    let outcome = service.process_next(Utc::now()).await.unwrap();
    let tasks = db.delivery_task.select_by_listing_id(listing_id).await.unwrap();
    assert_eq!(
        outcome,
        DeliveryOutcome::Delivered {
            task_id: tasks[0].id,
            report: DeliveryReport {
                attempted: 3,
                delivered: 2,
                failed: 1,
            },
        }
    );
    assert!(tasks[0].done);

    let sent = messenger.sent();
    assert_eq!(sent.len(), 2);
    assert!(messenger.sent_to(2).is_empty());
    assert!(sent[0].text.contains("#1001"));
    assert!(sent[0].text.contains("Listing 1001"));

    // Nothing left to do, and the task cannot be completed twice.
    assert_eq!(service.process_next(Utc::now()).await.unwrap(), DeliveryOutcome::Idle);
    assert!(!db.delivery_task.mark_done(tasks[0].id, Utc::now()).await.unwrap());
    assert_eq!(messenger.sent().len(), 2);

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_only_matching_subscribers_receive_listing() {
    let (db, db_path) = common::setup_db().await;
    let messenger = RecordingMessenger::new();
    let (service, _) = setup_delivery(&db, &messenger).await;
    let now = Utc::now();

    let (design, _) = db.category.get_or_create_leaf("Дизайн", "Логотипы", now).await.unwrap();
    let (sites, _) = db.category.get_or_create_leaf("Сайты", "Верстка", now).await.unwrap();

    // Default filter.
    create_subscriber(&db, 1).await;

    let (_, mut filter) = create_subscriber(&db, 2).await;
    filter.notifications_enabled = false;
    db.filter.update(&filter).await.unwrap();

    let (mut subscriber, _) = create_subscriber(&db, 3).await;
    subscriber.active = false;
    db.subscriber.update(&subscriber).await.unwrap();

    let (_, mut filter) = create_subscriber(&db, 4).await;
    filter.only_safe_deal = true;
    db.filter.update(&filter).await.unwrap();

    let (_, mut filter) = create_subscriber(&db, 5).await;
    filter.budget_min = Some(100);
    filter.budget_max = Some(200);
    db.filter.update(&filter).await.unwrap();

    let (_, filter) = create_subscriber(&db, 6).await;
    db.filter.add_categories(filter.id, &[sites.id]).await.unwrap();

    let (_, filter) = create_subscriber(&db, 7).await;
    db.filter.add_categories(filter.id, &[sites.id, design.id]).await.unwrap();

    let mut listing = listing_model(2001);
    listing.budget = Some(5000);
    db.listing.insert_with_task(&listing, &[design.id]).await.unwrap().unwrap();

    let outcome = service.process_next(Utc::now()).await.unwrap();
    let DeliveryOutcome::Delivered { report, .. } = outcome else {
        panic!("Expected a delivery, got {outcome:?}");
    };
    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 2);

    let mut chats: Vec<i64> = messenger.sent().iter().map(|m| m.chat_id).collect();
    chats.sort();
    assert_eq!(chats, vec![1, 7]);

    let caption = &messenger.sent_to(7)[0].text;
    assert!(caption.contains("5000 руб."));
    assert!(caption.contains("#логотипы #дизайн"));

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_tasks_are_processed_oldest_first() {
    let (db, db_path) = common::setup_db().await;
    let messenger = RecordingMessenger::new();
    let (service, _) = setup_delivery(&db, &messenger).await;
    create_subscriber(&db, 1).await;

    let mut first = listing_model(3001);
    let mut second = listing_model(3002);
    first.created = Utc::now() - Duration::seconds(20);
    second.created = Utc::now() - Duration::seconds(10);

    // Stored in reverse so ids disagree with scheduled times.
    let second_id = db.listing.insert_with_task(&second, &[]).await.unwrap().unwrap();
    let first_id = db.listing.insert_with_task(&first, &[]).await.unwrap().unwrap();

    service.process_next(Utc::now()).await.unwrap();
    assert!(db.delivery_task.select_by_listing_id(first_id).await.unwrap()[0].done);
    assert!(!db.delivery_task.select_by_listing_id(second_id).await.unwrap()[0].done);

    service.process_next(Utc::now()).await.unwrap();
    assert!(db.delivery_task.select_by_listing_id(second_id).await.unwrap()[0].done);

    let texts: Vec<String> = messenger.sent().into_iter().map(|m| m.text).collect();
    assert!(texts[0].contains("#3001"));
    assert!(texts[1].contains("#3002"));

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_future_tasks_are_not_due() {
    let (db, db_path) = common::setup_db().await;
    let messenger = RecordingMessenger::new();
    let (service, _) = setup_delivery(&db, &messenger).await;
    create_subscriber(&db, 1).await;
    store_listing(&db, 4001, &[]).await;

    let outcome = service
        .process_next(Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(outcome, DeliveryOutcome::Idle);
    assert!(messenger.sent().is_empty());
    assert_eq!(db.delivery_task.count_pending(Utc::now()).await.unwrap(), 1);

    common::teardown_db(db_path).await;
}

#[tokio::test]
async fn test_missing_template_keeps_task_pending() {
    let (db, db_path) = common::setup_db().await;
    let messenger = RecordingMessenger::new();
    let (service, cache) = setup_delivery(&db, &messenger).await;
    create_subscriber(&db, 1).await;
    let listing_id = store_listing(&db, 5001, &[]).await;

    let caption = db
        .template
        .select_all()
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.name == LISTING_CAPTION)
        .unwrap();
    db.template.delete(&caption.id).await.unwrap();
    cache.reload().await.unwrap();

    let result = service.process_next(Utc::now()).await;
    assert!(matches!(result, Err(ServiceError::TemplateError(_))));
    assert!(messenger.sent().is_empty());
    assert!(!db.delivery_task.select_by_listing_id(listing_id).await.unwrap()[0].done);

    let templates = TemplateService::new(db.clone(), cache.clone());
    templates
        .save(LISTING_CAPTION, TemplateKind::Message, "{{ title }}")
        .await
        .unwrap();
    assert!(
        templates
            .list()
            .await
            .unwrap()
            .iter()
            .any(|t| t.name == LISTING_CAPTION && t.body == "{{ title }}")
    );

    let outcome = service.process_next(Utc::now()).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Delivered { .. }));
    assert_eq!(messenger.sent()[0].text, "Listing 5001");
    assert!(db.delivery_task.select_by_listing_id(listing_id).await.unwrap()[0].done);

    common::teardown_db(db_path).await;
}
