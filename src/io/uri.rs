use std::fmt;
use url::Url;

use crate::error::IngestError;

/// A validated download location
#[derive(Debug, Clone)]
pub struct SourceUrl(Url);

impl SourceUrl {
    /// Parse a URL string, accepting only http and https
    pub fn parse(uri: &str) -> Result<Self, IngestError> {
        let url = Url::parse(uri.trim())
            .map_err(|e| IngestError::download(format!("invalid URL '{}'", uri), e))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(IngestError::Download {
                    context: format!("unsupported URL scheme '{}' in '{}'", scheme, uri),
                    source: None,
                });
            }
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(IngestError::Download {
                context: format!("URL missing host: {}", uri),
                source: None,
            });
        }

        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
