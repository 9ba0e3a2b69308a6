//! End-to-end tests of the scrape, match and deliver pipeline.

use std::sync::Arc;
use std::time::Duration;

use anno_relay::{
    event_queue, Annotation, FakeAnnotationSource, Fanout, MessageTemplate, ParseMode,
    RecordingTransport, RelayError, ScrapeWindow, Scraper, Supervisor, EVENT_QUEUE_CAPACITY,
};
use anno_store::{MemoryBackend, Subscription, SubscriptionKey, SubscriptionStore};
use chrono::{DateTime, TimeZone, Utc};
use test_case::test_case;
use tokio_util::sync::CancellationToken;

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn memory_store() -> SubscriptionStore {
    SubscriptionStore::new(Arc::new(MemoryBackend::new()))
}

async fn subscribe(store: &SubscriptionStore, chat_id: i64, filter: &[&str]) {
    let key = SubscriptionKey::chat(chat_id);
    store.put(&key, &Subscription::new(key, tags(filter))).await.unwrap();
}

fn fanout(store: &SubscriptionStore, transport: &Arc<RecordingTransport>) -> Fanout {
    let template = MessageTemplate::parse("{{ title }}|{{ tags }}").unwrap();
    Fanout::new(store.clone(), transport.clone(), template)
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..400 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[test_case(&["db", "prod"], &["db"], true ; "event superset of filter")]
#[test_case(&["db"], &["db", "cache"], false ; "filter not covered")]
#[test_case(&["anything"], &[], true ; "empty filter takes everything")]
#[test_case(&[], &[], true ; "untagged event and empty filter")]
#[tokio::test]
async fn delivery_follows_tag_subset(event_tags: &[&str], filter: &[&str], delivered: bool) {
    let store = memory_store();
    subscribe(&store, 10, filter).await;
    let transport = Arc::new(RecordingTransport::new());

    let report = fanout(&store, &transport)
        .dispatch(&Annotation::new("Alert", tags(event_tags), 0))
        .await
        .unwrap();

    assert_eq!(report.delivered == 1, delivered);
    assert_eq!(transport.sent_to(10).len(), usize::from(delivered));
}

#[tokio::test]
async fn no_subscriptions_means_no_attempts() {
    let store = memory_store();
    let transport = Arc::new(RecordingTransport::new());

    let report = fanout(&store, &transport)
        .dispatch(&Annotation::new("Alert", tags(&["db"]), 0))
        .await
        .unwrap();

    assert_eq!(report.recipients, 0);
    assert_eq!(report.matched, 0);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn full_queue_blocks_scraper_until_fanout_takes_one() {
    let source = Arc::new(FakeAnnotationSource::new());
    let batch: Vec<Annotation> = (0..=EVENT_QUEUE_CAPACITY as i64)
        .rev()
        .map(|i| {
            let mut a = Annotation::new(format!("event {i}"), vec![], 100_000 + i);
            a.id = i;
            a
        })
        .collect();
    source.push_batch(batch);

    let (tx, mut rx) = event_queue();
    let mut scraper = Scraper::new(source, tx, Duration::from_secs(10)).with_cursor(at(100));
    let poll = tokio::spawn(async move {
        let report = scraper.poll_once(at(200), &CancellationToken::new()).await;
        (scraper, report)
    });

    wait_for(|| rx.len() == EVENT_QUEUE_CAPACITY).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!poll.is_finished());

    assert_eq!(rx.recv().await.unwrap().id, 0);
    let (scraper, report) = tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .unwrap()
        .unwrap();
    let report = report.unwrap();

    assert_eq!(report.emitted, EVENT_QUEUE_CAPACITY + 1);
    assert_eq!(scraper.cursor(), at(200));
    assert_eq!(rx.len(), EVENT_QUEUE_CAPACITY);
}

#[tokio::test]
async fn windows_tile_without_gap_or_overlap() {
    let source = Arc::new(FakeAnnotationSource::new());
    let (tx, _rx) = event_queue();
    let mut scraper = Scraper::new(source.clone(), tx, Duration::from_secs(10)).with_cursor(at(1));
    let cancel = CancellationToken::new();

    for now in [2, 3, 5, 8] {
        scraper.poll_once(at(now), &cancel).await.unwrap();
    }

    let windows = source.windows();
    assert_eq!(windows.first(), Some(&ScrapeWindow::new(at(1), at(2))));
    for pair in windows.windows(2) {
        assert_eq!(pair[0].to, pair[1].from);
        assert!(pair[0].from < pair[0].to);
    }
    assert_eq!(windows.last().map(|w| w.to), Some(at(8)));
}

#[tokio::test]
async fn broken_recipient_does_not_starve_others() {
    let store = memory_store();
    for chat in 1..=4 {
        subscribe(&store, chat, &["db"]).await;
    }
    let transport = Arc::new(RecordingTransport::new());
    transport.fail_for(2);
    transport.fail_for(3);

    let report = fanout(&store, &transport)
        .dispatch(&Annotation::new("Alert", tags(&["db"]), 0))
        .await
        .unwrap();

    assert_eq!(report.matched, 4);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(transport.sent_to(1).len(), 1);
    assert_eq!(transport.sent_to(4).len(), 1);
}

#[tokio::test]
async fn supervised_pipeline_delivers_in_order_then_stops() {
    let store = memory_store();
    subscribe(&store, 7, &["db"]).await;
    subscribe(&store, 8, &["cache"]).await;
    let transport = Arc::new(RecordingTransport::new());

    let start = Utc::now() - chrono::Duration::minutes(5);
    let base = start.timestamp_millis();
    let source = Arc::new(FakeAnnotationSource::new());
    source.push_batch(vec![
        Annotation::new("second", tags(&["db"]), base + 2_000),
        Annotation::new("ignored", tags(&["web"]), base + 1_500),
        Annotation::new("first", tags(&["db", "prod"]), base + 1_000),
    ]);

    let (tx, rx) = event_queue();
    let scraper = Scraper::new(source.clone(), tx, Duration::from_millis(20)).with_cursor(start);
    let fanout = fanout(&store, &transport);

    let mut supervisor = Supervisor::new();
    let token = supervisor.token();
    supervisor.spawn("scraper", move |cancel| scraper.run(cancel));
    supervisor.spawn("fanout", move |cancel| fanout.run(rx, cancel));
    let running = tokio::spawn(supervisor.run());

    wait_for(|| transport.sent().len() == 2).await;
    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0].text, "first|db\nprod");
    assert_eq!(sent[1].text, "second|db");
    assert!(sent.iter().all(|m| m.mode == ParseMode::Html && m.target.chat_id == 7));
    assert!(transport.sent_to(8).is_empty());
}

#[tokio::test]
async fn fanout_failure_tears_down_scraper() {
    let source = Arc::new(FakeAnnotationSource::new());
    let (tx, rx) = event_queue();
    let scraper = Scraper::new(source, tx, Duration::from_millis(20));
    drop(rx);

    let mut supervisor = Supervisor::new();
    supervisor.spawn("scraper", move |cancel| scraper.run(cancel));
    supervisor.spawn("broken", |_| async { Err(RelayError::Config("bad template".to_string())) });

    let err = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, RelayError::Config(_)));
}
