//! Authenticate a user and print their directory entry.
//!
//! ```text
//! DAPPY_HOST=ldap.forumsys.com:389 \
//! DAPPY_BASE_DN=dc=example,dc=com \
//! DAPPY_FILTER=uid \
//! DAPPY_SERVICE_USER=cn=read-only-admin,dc=example,dc=com \
//! DAPPY_SERVICE_PASSWORD=password \
//! RUST_LOG=dappy_ldap=debug \
//! cargo run -p dappy-ldap --example authenticate -- tesla password
//! ```

use std::env;

use anyhow::{bail, Context};
use dappy_ldap::{DirectoryClient, DirectoryConfig, ServiceAccount};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    let mut args = env::args().skip(1);
    let (Some(username), Some(password)) = (args.next(), args.next()) else {
        bail!("usage: authenticate <username> <password>");
    };

    let config = DirectoryConfig::new(
        var("DAPPY_HOST")?,
        var("DAPPY_BASE_DN")?,
        ServiceAccount::new(var("DAPPY_SERVICE_USER")?, var("DAPPY_SERVICE_PASSWORD")?),
    )
    .with_filter(env::var("DAPPY_FILTER").unwrap_or_default())
    .with_attributes(["cn", "mail"]);

    let client = DirectoryClient::connect(config)
        .await
        .context("directory is not usable")?;

    match client.authenticate(&username, &password).await {
        Ok(()) => tracing::info!(%username, "user successfully authenticated"),
        Err(err) => tracing::warn!(%username, code = err.error_code(), "{err}"),
    }

    let entry = client.get_entry(&username).await?;
    println!("{entry}");
    Ok(())
}

fn var(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("{name} is not set"))
}
