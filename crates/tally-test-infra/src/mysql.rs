use crate::Result;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

/// DDL of the `short_links` table, run by the image on first start.
pub const SHORT_LINKS_SCHEMA: &str = include_str!("../../tally-storage/ddl/mysql/short_links.sql");

const INIT_SCRIPT: &str = "/docker-entrypoint-initdb.d/short_links.sql";

// The entrypoint runs init scripts on a temporary server listening on port 0,
// so this line only appears once the real server is up.
const READY_MESSAGE: &str = "port: 3306  MySQL Community Server";

#[derive(Debug, Clone, TypedBuilder)]
pub struct MysqlConfig {
    #[builder(default = "tally".to_string())]
    database: String,
    #[builder(default = "tally".to_string())]
    username: String,
    #[builder(default = "tally".to_string())]
    password: String,
    /// Create the `short_links` table before the server accepts clients.
    #[builder(default = true)]
    with_schema: bool,
}

/// A disposable MySQL server holding the tally schema.
pub struct MySqlServer {
    container: ContainerAsync<GenericImage>,
    config: MysqlConfig,
}

impl MySqlServer {
    pub async fn new(config: MysqlConfig) -> Result<Self> {
        let request = GenericImage::new("mysql", "8.4")
            .with_exposed_port(3306_u16.tcp())
            .with_wait_for(WaitFor::message_on_stderr(READY_MESSAGE))
            .with_env_var("MYSQL_DATABASE", config.database.as_str())
            .with_env_var("MYSQL_USER", config.username.as_str())
            .with_env_var("MYSQL_PASSWORD", config.password.as_str())
            .with_env_var("MYSQL_ROOT_PASSWORD", "root");

        let request = if config.with_schema {
            request.with_copy_to(INIT_SCRIPT, SHORT_LINKS_SCHEMA.as_bytes().to_vec())
        } else {
            request
        };

        let container = request.start().await?;
        Ok(Self { container, config })
    }

    /// Starts a server with the default credentials and the schema applied.
    pub async fn with_schema() -> Result<Self> {
        Self::new(MysqlConfig::builder().build()).await
    }

    pub async fn host(&self) -> Result<String> {
        let host = self.container.get_host().await?.to_string();

        match host.as_str() {
            "localhost" => Ok(String::from("127.0.0.1")),
            _ => Ok(host),
        }
    }

    pub async fn port(&self) -> Result<u16> {
        Ok(self.container.get_host_port_ipv4(3306).await?)
    }

    pub async fn database_url(&self) -> Result<String> {
        let host = self.host().await?;
        let port = self.port().await?;
        Ok(format!(
            "mysql://{}:{}@{}:{}/{}",
            self.config.username, self.config.password, host, port, self.config.database
        ))
    }

    pub fn config(&self) -> &MysqlConfig {
        &self.config
    }
}

impl MysqlConfig {
    pub fn database(&self) -> &str {
        &self.database
    }
}
