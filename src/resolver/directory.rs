//! Live directory search.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::ldap::DirectoryClient;
use crate::resolver::DnSource;

/// Bind and search one directory for the identifier.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    name: String,
    client: DirectoryClient,
}

impl DirectorySource {
    /// Create a new [`DirectorySource`].
    pub fn new(client: DirectoryClient) -> Self {
        Self {
            name: format!("directory:{}", client.name()),
            client,
        }
    }
}

#[async_trait]
impl DnSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, identifier: &str) -> Result<Option<String>> {
        self.client.find_dn(identifier).await
    }

    fn deadline(&self) -> Option<Duration> {
        Some(self.client.deadline())
    }
}
