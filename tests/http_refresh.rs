use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use doppler_toggle::{ClientConfig, WorkerConfig, WorkerEvent};
use mockito::Matcher;

#[test]
fn started_client_refreshes_rules_over_http() {
    let document = std::fs::read_to_string("tests/data/accessors.json").unwrap();
    let mut server = mockito::Server::new();
    let full_document = server
        .mock("GET", "/features.json")
        .match_header("if-none-match", Matcher::Missing)
        .with_status(200)
        .with_header("etag", "\"v1\"")
        .with_body(document)
        .expect(1)
        .create();
    let not_modified = server
        .mock("GET", "/features.json")
        .match_header("if-none-match", "\"v1\"")
        .with_status(304)
        .expect_at_least(1)
        .create();

    let (store, worker) = ClientConfig::from_url(format!("{}/features.json", server.url()))
        .timeout(Duration::from_secs(5))
        .worker(WorkerConfig::new().with_period(Duration::from_millis(200)))
        .start()
        .unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let events = Arc::clone(&events);
        worker.observe(move |event: &WorkerEvent| events.lock().unwrap().push(event.clone()));
    }

    let accessor = store
        .create_feature::<bool>("Boolean")
        .add_value("Enabled", true)
        .add_value("Disabled", false)
        .set_default_treatment("Disabled")
        .build()
        .unwrap();

    thread::sleep(Duration::from_millis(700));
    worker.shutdown().unwrap();

    let events = events.lock().unwrap();
    assert!(events.len() >= 2, "{events:?}");
    assert!(
        events.iter().all(|event| matches!(event, WorkerEvent::Ran)),
        "{events:?}"
    );

    full_document.assert();
    not_modified.assert();
    assert_eq!(store.etag().as_deref(), Some("\"v1\""));
    assert!(accessor.get("N").unwrap());
    assert!(!accessor.get("P").unwrap());
}
