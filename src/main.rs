use clap::Parser;
use multipay_client::cache::{FileCache, MemoryCache, SessionCache};
use multipay_client::config::{AppConfig, CacheBackend, CacheConfig};
use multipay_client::logging::init_tracing;
use multipay_client::multipay::notification::format_currency;
use multipay_client::multipay::{ConsoleNavigator, MultipayClient, Notification};
use multipay_client::session::{PaymentSession, Stage};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "multipay", about = "Pay several bills in one checkout")]
struct CliOptions {
    /// Only show and total review rows matching this term
    #[arg(short = 's', long = "search")]
    search: Option<String>,

    /// Drop a reference from the review batch before paying
    #[arg(short = 'd', long = "delete")]
    delete: Vec<String>,

    /// Resume the last saved session instead of entering references
    #[arg(short = 'r', long = "restore")]
    restore: bool,

    /// 16-character transaction references
    references: Vec<String>,
}

fn report(notification: &Notification) -> bool {
    if notification.is_error() {
        eprintln!("{}", notification);
    } else {
        println!("{}", notification);
    }
    !notification.is_error()
}

async fn build_cache(config: &CacheConfig) -> anyhow::Result<Arc<dyn SessionCache>> {
    let cache: Arc<dyn SessionCache> = match config.backend {
        CacheBackend::File => Arc::new(FileCache::new(config.dir.clone())),
        #[cfg(feature = "cache")]
        CacheBackend::Redis => {
            use multipay_client::cache::redis_cache::{RedisCache, RedisCacheConfig};
            let redis_config = RedisCacheConfig {
                redis_url: config.redis_url.clone(),
                ttl: std::time::Duration::from_secs(config.ttl_secs),
                ..Default::default()
            };
            Arc::new(RedisCache::connect(&redis_config).await?)
        }
        #[cfg(not(feature = "cache"))]
        CacheBackend::Redis => {
            anyhow::bail!("CACHE_BACKEND=redis requires the `cache` feature")
        }
        CacheBackend::None => Arc::new(MemoryCache::new()),
    };
    Ok(cache)
}

fn print_review(session: &PaymentSession) {
    println!(
        "{:<18} {:<24} {:<32} {:>14}",
        "REFERENCE", "CUSTOMER", "EMAIL", "AMOUNT"
    );
    for row in session.visible_rows() {
        println!(
            "{:<18} {:<24} {:<32} {:>14}",
            row.reference_id,
            row.customer_name,
            row.customer_email,
            format_currency(&row.sub_total)
        );
    }
    println!("Total: {}", format_currency(&session.visible_total()));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = CliOptions::parse();

    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        api = %config.api.base_url,
        "Starting multipay client"
    );

    let cache = build_cache(&config.cache).await?;
    let api = Arc::new(MultipayClient::from_config(&config.api)?);
    let mut session = PaymentSession::new(api, cache, Arc::new(ConsoleNavigator));

    if options.restore {
        report(&session.restore().await);
    }

    if session.stage() == Stage::Review && !options.references.is_empty() {
        warn!(
            ignored = options.references.len(),
            "restored batch is awaiting payment, refusing new references"
        );
        anyhow::bail!(
            "{} reference(s) given, but the restored batch is already awaiting payment; \
             run again without --restore to start a new batch",
            options.references.len()
        );
    }

    for reference in &options.references {
        report(&session.add_reference(reference).await);
    }

    if session.stage() == Stage::References && !report(&session.confirm().await) {
        error!("batch confirmation failed");
        anyhow::bail!("no payable batch");
    }

    if let Some(term) = options.search {
        session.set_search(term);
    }

    if !options.delete.is_empty() {
        session.clear_selection();
        for reference in &options.delete {
            let row_id = session.batch().and_then(|batch| {
                batch
                    .rows()
                    .iter()
                    .find(|row| row.reference_id == *reference)
                    .map(|row| row.id.clone())
            });
            match row_id {
                Some(id) => {
                    session.select_row(&id);
                }
                None => eprintln!("{} is not in the review batch", reference),
            }
        }
        report(&session.delete_selected().await);
    }

    print_review(&session);

    if !report(&session.proceed().await) {
        anyhow::bail!("payment was not initialized");
    }

    Ok(())
}
