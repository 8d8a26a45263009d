//! Coordinator catalog access.
//!
//! The catalog is authoritative for dbids: segments are registered before
//! they exist on disk and the assigned ids are read back from
//! `gp_segment_configuration`.

use crate::error::{HubError, Result};
use async_trait::async_trait;
use gpctl_core::Segment;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

/// Where and how to reach the coordinator instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Connect with maintenance-only utility mode
    pub utility: bool,
}

#[async_trait]
pub trait CatalogConnector: Send + Sync {
    async fn connect(&self, target: &CatalogTarget) -> Result<Box<dyn Catalog>>;
}

/// Catalog operations the orchestrator performs on the coordinator.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn register_coordinator(&self, coordinator: &Segment) -> Result<()>;

    /// Registers every primary; the catalog assigns their dbids.
    async fn register_primaries(&self, primaries: &[Segment]) -> Result<()>;

    /// All registered segments, coordinator included.
    async fn segment_configuration(&self) -> Result<Vec<Segment>>;

    async fn create_toolkit_extension(&self) -> Result<()>;

    /// Imports operating-system collations into every template database.
    async fn import_collations(&self) -> Result<()>;

    async fn create_database(&self, name: &str) -> Result<()>;

    /// Sets the password of the database superuser.
    async fn set_password(&self, password: &str) -> Result<()>;
}

const TEMPLATE_DB: &str = "template1";
const MAINTENANCE_DBS: [&str; 2] = ["template1", "postgres"];
const COLLATION_DBS: [&str; 3] = ["template1", "postgres", "template0"];

/// [`CatalogConnector`] using tokio-postgres.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

#[async_trait]
impl CatalogConnector for PostgresConnector {
    async fn connect(&self, target: &CatalogTarget) -> Result<Box<dyn Catalog>> {
        let client = open(target, TEMPLATE_DB).await?;
        Ok(Box::new(PostgresCatalog {
            target: target.clone(),
            client,
        }))
    }
}

async fn open(target: &CatalogTarget, dbname: &str) -> Result<Client> {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&target.host)
        .port(target.port)
        .user(&target.user)
        .dbname(dbname);
    if target.utility {
        config.options(crate::segment::UTILITY_MODE_OPTIONS);
    }

    debug!(
        "Connecting to {} on {}:{} (utility: {})",
        dbname, target.host, target.port, target.utility
    );
    let (client, connection) = config.connect(NoTls).await.map_err(|e| {
        HubError::Catalog(format!(
            "cannot connect to {} on {}:{}: {}",
            dbname, target.host, target.port, e
        ))
    })?;

    // The connection object performs the actual communication with the
    // database, so spawn it off to run on its own.
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("catalog connection error: {}", e);
        }
    });

    Ok(client)
}

fn sql_err(context: &str) -> impl FnOnce(tokio_postgres::Error) -> HubError + '_ {
    move |e| HubError::Catalog(format!("{}: {}", context, e))
}

/// Quotes an SQL identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quotes an SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub struct PostgresCatalog {
    target: CatalogTarget,
    client: Client,
}

#[async_trait]
impl Catalog for PostgresCatalog {
    async fn register_coordinator(&self, coordinator: &Segment) -> Result<()> {
        self.client
            .execute(
                "SELECT pg_catalog.gp_add_segment($1::int2, $2::int2, 'p', 'p', 'n', 'u', $3, $4, $5, $6)",
                &[
                    &(coordinator.dbid as i16),
                    &(coordinator.content_id as i16),
                    &i32::from(coordinator.port),
                    &coordinator.host_name,
                    &coordinator.host_address,
                    &coordinator.data_directory,
                ],
            )
            .await
            .map_err(sql_err("registering coordinator"))?;
        Ok(())
    }

    async fn register_primaries(&self, primaries: &[Segment]) -> Result<()> {
        for primary in primaries {
            self.client
                .execute(
                    "SELECT pg_catalog.gp_add_segment_primary($1, $2, $3, $4)",
                    &[
                        &primary.host_name,
                        &primary.host_address,
                        &i32::from(primary.port),
                        &primary.data_directory,
                    ],
                )
                .await
                .map_err(|e| {
                    HubError::Catalog(format!(
                        "registering primary {}:{}: {}",
                        primary.host_name, primary.data_directory, e
                    ))
                })?;
        }
        Ok(())
    }

    async fn segment_configuration(&self) -> Result<Vec<Segment>> {
        let rows = self
            .client
            .query(
                "SELECT dbid, content, port, hostname, address, datadir \
                 FROM pg_catalog.gp_segment_configuration ORDER BY content, dbid",
                &[],
            )
            .await
            .map_err(sql_err("reading gp_segment_configuration"))?;

        rows.iter()
            .map(|row| {
                let port: i32 = row.get("port");
                Ok(Segment {
                    dbid: i32::from(row.get::<_, i16>("dbid")),
                    content_id: i32::from(row.get::<_, i16>("content")),
                    port: u16::try_from(port).map_err(|_| {
                        HubError::Catalog(format!("catalog holds invalid port {}", port))
                    })?,
                    host_name: row.get("hostname"),
                    host_address: row.get("address"),
                    data_directory: row.get("datadir"),
                })
            })
            .collect()
    }

    async fn create_toolkit_extension(&self) -> Result<()> {
        for dbname in MAINTENANCE_DBS {
            let client = open(&self.target, dbname).await?;
            client
                .batch_execute("CREATE EXTENSION IF NOT EXISTS gp_toolkit")
                .await
                .map_err(|e| HubError::Catalog(format!("creating gp_toolkit in {}: {}", dbname, e)))?;
        }
        Ok(())
    }

    async fn import_collations(&self) -> Result<()> {
        self.client
            .batch_execute("UPDATE pg_database SET datallowconn = true WHERE datname = 'template0'")
            .await
            .map_err(sql_err("allowing connections to template0"))?;

        let imported = async {
            for dbname in COLLATION_DBS {
                let client = open(&self.target, dbname).await?;
                // Separate statements: VACUUM refuses to run in the implicit
                // transaction of a multi-statement query.
                for statement in [
                    "SELECT pg_import_system_collations('pg_catalog')",
                    "VACUUM FREEZE",
                ] {
                    client.batch_execute(statement).await.map_err(|e| {
                        HubError::Catalog(format!("importing collations into {}: {}", dbname, e))
                    })?;
                }
            }
            Ok::<(), HubError>(())
        }
        .await;

        // template0 must be locked again even when the import failed
        let relocked = self
            .client
            .batch_execute("UPDATE pg_database SET datallowconn = false WHERE datname = 'template0'")
            .await
            .map_err(sql_err("disallowing connections to template0"));

        imported.and(relocked)
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        self.client
            .batch_execute(&format!("CREATE DATABASE {}", quote_ident(name)))
            .await
            .map_err(|e| HubError::Catalog(format!("creating database {}: {}", name, e)))
    }

    async fn set_password(&self, password: &str) -> Result<()> {
        self.client
            .batch_execute(&format!(
                "ALTER USER {} WITH PASSWORD {}",
                quote_ident(&self.target.user),
                quote_literal(password)
            ))
            .await
            .map_err(sql_err("setting superuser password"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("sales"), "\"sales\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("pa'ss"), "'pa''ss'");
    }
}
