mod controller;
mod deferred;
mod host;
mod mqtt;
mod ports;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
