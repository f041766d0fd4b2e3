use url::Url;

use crate::error::IngestError;

/// Where rows are written: connection parameters plus the destination table
#[derive(Debug, Clone)]
pub struct DatabaseTarget {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub table: String,
}

impl DatabaseTarget {
    /// `postgresql://{user}:{password}@{host}:{port}/{database}`
    ///
    /// User and password are percent-encoded, so reserved characters in
    /// credentials cannot change the meaning of the URI.
    pub fn connection_uri(&self) -> Result<Url, IngestError> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        let mut url = Url::parse(&format!("postgresql://{}:{}/", host, self.port))
            .map_err(|e| IngestError::connection(format!("invalid host '{}'", self.host), e))?;
        url.set_path(&self.database);

        url.set_username(&self.user)
            .map_err(|_| IngestError::InvalidConfig(format!("invalid user '{}'", self.user)))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| IngestError::InvalidConfig("invalid password".to_string()))?;
        }

        Ok(url)
    }

    /// Connection URI with the password masked, for log lines
    pub fn redacted_uri(&self) -> String {
        match self.connection_uri() {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => format!(
                "postgresql://{}:***@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }
}
