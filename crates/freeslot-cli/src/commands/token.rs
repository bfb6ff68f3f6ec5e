//! Token command.

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Prints a valid access token, refreshing or authorizing as needed.
pub async fn run(config: &ClientConfig) -> ClientResult<()> {
    let broker = super::broker(config)?;
    let token = broker.get_valid_credential().await?;
    debug!("credential state after acquisition: {}", broker.state());
    println!("{}", token);
    Ok(())
}
