use deadpool_postgres::{BuildError, Hook, HookError, Manager, Pool, Runtime};
use tokio_postgres::NoTls;

use super::ConnectionOptions;

/// Builds a pool of at most `max_pool_size` connections. Waiting for a free
/// connection, opening a new one and recycling an idle one are each bounded
/// by the server-selection timeout.
///
/// Every new connection gets the configured `synchronous_commit` before it is
/// handed out. Closed connections are logged and replaced on the next
/// checkout.
pub fn build_pool(
    config: tokio_postgres::Config,
    options: &ConnectionOptions,
) -> Result<Pool, BuildError> {
    let durability = options.write_durability.synchronous_commit();
    let wait = options.server_selection_timeout;

    Pool::builder(Manager::new(config, NoTls))
        .max_size(options.max_pool_size.max(1))
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(wait))
        .create_timeout(Some(wait))
        .recycle_timeout(Some(wait))
        .post_create(Hook::async_fn(move |client, _| {
            Box::pin(async move {
                client
                    .batch_execute(&format!("SET synchronous_commit TO {durability}"))
                    .await
                    .map_err(HookError::Backend)
            })
        }))
        .pre_recycle(Hook::sync_fn(|client, _| {
            if client.is_closed() {
                tracing::warn!("Storage connection closed, replacing it");
            }
            Ok(())
        }))
        .build()
}
