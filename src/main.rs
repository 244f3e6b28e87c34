use std::sync::Arc;
use std::time::Duration;

use drover::auth::DevAuthenticator;
use drover::config::Config;
use drover::engine::Engine;
use drover::error::Error;
use drover::events::TracingPublisher;
use drover::hub::Hub;
use drover::server::{router, serve};
use drover::{db, geo, store};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    if let Err(err) = run().await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;

    let pool = match (&config.database_url, config.needs_database()) {
        (Some(url), true) => Some(db::connect(url, config.database_max_connections).await?),
        _ => None,
    };

    let (rides, chat) = store::backend(&config.store, pool.clone()).await?;
    let geo = geo::backend(&config.geo_backend, config.geo_position_ttl_secs, pool).await?;

    tracing::info!(store = %config.store, geo = %config.geo_backend, "backends ready");

    if config.geo_position_ttl_secs > 0 {
        let geo = geo.clone();
        let period = Duration::from_secs(config.geo_position_ttl_secs);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(err) = geo.evict_stale().await {
                    tracing::error!("failed to evict stale positions: {}", err);
                }
            }
        });
    }

    let engine = Engine::new(rides, geo.clone(), Arc::new(TracingPublisher))?;
    let hub = Arc::new(Hub::new(chat, geo, config.hub));

    let app = router(Arc::new(engine), hub.clone(), Arc::new(DevAuthenticator));
    let result = serve(config.listen_addr, app).await;

    hub.shutdown().await;

    result
}
