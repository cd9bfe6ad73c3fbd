use std::time::Duration;

use doppler_toggle::{ClientConfig, WorkerConfig, WorkerEvent};

pub fn main() -> doppler_toggle::Result<()> {
    // Configure env_logger to see refresh logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("doppler_toggle"))
        .init();

    let url = std::env::var("FEATURES_URL")
        .unwrap_or_else(|_| "http://localhost:8080/features.json".to_owned());

    // Refresh rules every 30 seconds. Until the first refresh completes, every feature resolves
    // to its default treatment.
    let (store, worker) = ClientConfig::from_url(url)
        .timeout(Duration::from_secs(10))
        .worker(WorkerConfig::new().with_period(Duration::from_secs(30)))
        .start()?;
    worker.observe(|event: &WorkerEvent| {
        if let WorkerEvent::Failed(err) = event {
            println!("refresh failed: {err}");
        }
    });

    let new_checkout = store
        .create_feature::<bool>("NewCheckout")
        .add_value("Enabled", true)
        .add_value("Disabled", false)
        .set_default_treatment("Disabled")
        .force_treatment_if_some(std::env::var("FORCE_NEW_CHECKOUT").ok().as_deref())
        .build()?;

    for _ in 0..3 {
        std::thread::sleep(Duration::from_secs(1));
        let enabled = new_checkout.get("test-subject").unwrap_or(false);
        println!("NewCheckout for test-subject: {enabled}");
    }

    worker.shutdown()
}
