//! Port pre-checks
//!
//! Checking before binding is racy; another process can take the port in
//! between. The bind in [`HttpServer::run`](crate::HttpServer) is what counts,
//! this only gives earlier feedback at startup.

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

/// Fail early if the configured HTTP port cannot be bound
pub async fn validate_ports_available(config: &ServerConfig) -> Result<()> {
    if config.http_port == 0 {
        debug!("Ephemeral HTTP port requested, skipping availability check");
        return Ok(());
    }

    validate_port_range(config.http_port)?;
    validate_single_port(&config.host, config.http_port).await
}

async fn validate_single_port(host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    debug!("Checking HTTP port {}", port);

    match TcpListener::bind(&addr).await {
        Ok(listener) => {
            let local_addr = listener
                .local_addr()
                .map_err(|e| ServerError::bind(addr.clone(), e))?;
            drop(listener);

            info!("HTTP port {} is available ({})", port, local_addr);
            Ok(())
        }
        Err(e) => {
            error!("HTTP port {} is NOT available: {}", port, e);
            Err(ServerError::port_in_use(port, e.to_string()))
        }
    }
}

pub async fn is_port_in_use(host: &str, port: u16) -> bool {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr).await.is_err()
}

/// Rejects 0 and warns on privileged ports
pub fn validate_port_range(port: u16) -> Result<()> {
    if port == 0 {
        Err(ServerError::ConfigError(
            "Port cannot be 0 for an explicit binding".to_string(),
        ))
    } else {
        if port < 1024 {
            warn!("Port {} is a privileged port (requires root/admin privileges)", port);
        }
        Ok(())
    }
}
