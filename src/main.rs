use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use digest_worker::{config::Config, observability, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    observability::tracing::init().context("failed to initialize tracing")?;

    let config = Config::from_env().context("failed to load configuration")?;
    let summary = run(Arc::new(config)).await?;

    info!(
        loaded = summary.loaded,
        accepted = summary.accepted,
        fresh = summary.fresh,
        trending = summary.trending,
        legacy = summary.legacy,
        featured_comments = summary.featured_comments,
        trusted_agents = summary.trusted_agents,
        blocked_agents = summary.blocked_agents,
        communities = summary.communities,
        report = %summary.report_path.display(),
        "digest run finished"
    );
    Ok(())
}
