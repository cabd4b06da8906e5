#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use triplestore::config::StoreConfig;
use triplestore::store::Store;
use triplestore::types::ContextSelector;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triplestore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: database_path={}, buffer_pool_pages={}, sync_on_commit={}",
        config.database_path.display(),
        config.buffer_pool_pages,
        config.sync_on_commit
    );

    // Opening rolls back an interrupted commit if the journal holds one.
    let store = match Store::open(&config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {e}");
            std::process::exit(1);
        }
    };

    let report = match store.check_consistency() {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Consistency check could not run: {e}");
            std::process::exit(1);
        }
    };
    for problem in &report.problems {
        tracing::error!("inconsistency: {problem}");
    }

    let default_context = match store.len(&ContextSelector::Default) {
        Ok(len) => len,
        Err(e) => {
            tracing::error!("Failed to count the default context: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        triples = report.triples,
        memberships = report.memberships,
        contexts = report.contexts,
        terms = report.terms,
        default_context,
        "store summary"
    );

    let pool = store.backend().file().buffer_pool().stats();
    tracing::debug!(
        capacity = pool.capacity,
        available = pool.available,
        misses = pool.misses,
        "buffer pool"
    );

    if !report.is_consistent() {
        tracing::error!("{} consistency problems found", report.problems.len());
        std::process::exit(1);
    }
}
