//!
//! src/main.rs
//!
//! CLI entrypoint: converts one track link into its equivalents on the
//! other platforms and prints the report as JSON on stdout
//!
//!

use std::sync::Arc;

use tracing::warn;

use track_resolver::{
    config, errors::ResolverError, fetch::HttpCatalogClient, logging,
    resolver::Resolver, types::Provider,
};

fn usage() -> ResolverError {
    ResolverError::Config(
        "usage: track-resolver <spotify|youtube|apple> <track-id>".to_string(),
    )
}

#[tokio::main]
async fn main() -> Result<(), ResolverError> {
    let cfgs    = config::load_config()?;
    let _logger = logging::init_logging(&cfgs.logging)?;

    tracing::info!(
        service="track-resolver",
        version=%env!("CARGO_PKG_VERSION"),
        "starting"
    );

    let mut args = std::env::args().skip(1);
    let source   = args.next().ok_or_else(usage)?.parse::<Provider>()?;
    let id       = args.next().ok_or_else(usage)?;

    let client   = Arc::new(HttpCatalogClient::new(&cfgs)?);
    let resolver = Resolver::from_config(client, &cfgs);

    let cancel = resolver.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("convert.interrupt");
            cancel.cancel();
        }
    });

    let conversion = resolver.convert(source, &id).await?;
    println!("{}", serde_json::to_string_pretty(&conversion)?);

    Ok(())
}
