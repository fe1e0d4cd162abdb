use paper_exchange::api::routes::{AppState, app_router};
use paper_exchange::cache::{Cache, MemoryCache};
use paper_exchange::config::Config;
use paper_exchange::logging::init_logging;
use paper_exchange::notifier::{HttpLedgerNotifier, LedgerNotifier};
use paper_exchange::oracle::{MockPriceOracle, PriceOracle};
use paper_exchange::persistence::{LedgerStore, MemoryLedgerStore, PgLedgerStore, create_pool_and_migrate};
use paper_exchange::settlement::SettlementEngine;
use paper_exchange::valuation::ValuationService;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_logging(&config);

    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool_and_migrate(url, config.db_max_connections).await?;
            tracing::info!("connected to postgres, migrations applied");
            Arc::new(PgLedgerStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory ledger (state is lost on exit)");
            Arc::new(MemoryLedgerStore::with_default_assets())
        }
    };
    if config.jwt_secret_is_default {
        tracing::warn!("JWT_SECRET not set, using development secret");
    }

    let cache: Option<Arc<dyn Cache>> = if config.cache_enabled {
        Some(Arc::new(MemoryCache::new()))
    } else {
        tracing::info!("cache disabled");
        None
    };

    let notifier: Option<Arc<dyn LedgerNotifier>> = match &config.notifier_url {
        Some(url) => match HttpLedgerNotifier::new(url.clone(), config.notifier_timeout) {
            Ok(n) => Some(Arc::new(n)),
            Err(err) => {
                tracing::warn!(error = %err, "external ledger notifier unavailable, continuing without it");
                None
            }
        },
        None => None,
    };

    let oracle: Arc<dyn PriceOracle> = Arc::new(match config.price_seed {
        Some(seed) => MockPriceOracle::seeded(seed),
        None => MockPriceOracle::new(),
    });

    let settlement = SettlementEngine::new(Arc::clone(&store))
        .with_cache(cache.clone())
        .with_notifier(notifier, config.notifier_timeout);
    let valuation = ValuationService::new(Arc::clone(&store), Arc::clone(&oracle))
        .with_cache(cache, config.cache_ttl);

    let app_state = AppState {
        store,
        settlement: Arc::new(settlement),
        valuation: Arc::new(valuation),
        oracle,
        jwt_secret: config.jwt_secret.clone(),
    };

    let app = app_router(app_state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
