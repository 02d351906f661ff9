use anyhow::Result;
use gemma_server::cli::launch;
use gemma_server::inference::loader::LoadStrategy;
use gemma_server::server::analyze_router;

#[cfg(unix)]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    launch(
        env!("CARGO_BIN_NAME"),
        LoadStrategy::QuantizedWithFallback,
        analyze_router,
    )
    .await
}
