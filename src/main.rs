//! seqmint service entry point.
//!
//! Loads `.env`, then hands over to [`seqmint::run`], which initializes configuration,
//! storage and services and starts the HTTP server.

use seqmint::run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error.
    dotenvy::dotenv().ok();

    run().await
}
