//! LDAP support.

use std::time::Duration;

use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, ldap_escape};
use url::Url;

use crate::config::Directory;
use crate::error::{Error, Result};

/// Slack granted on top of [`DirectoryClient::deadline`].
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

/// Attributes compared against the identifier when searching a user.
pub const IDENTIFIER_ATTRIBUTES: &[&str] =
    &["uid", "sAMAccountName", "cn", "mail", "userPrincipalName"];

/// Client for one configured directory.
///
/// Every lookup opens its own connection and closes it before returning.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    name: String,
    url: Url,
    base_dn: String,
    bind_dn: Option<String>,
    bind_password: Option<String>,
    timeout: Duration,
}

impl DirectoryClient {
    /// Create a new [`DirectoryClient`].
    pub fn new(config: &Directory, timeout: Duration) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            url: config.url()?,
            base_dn: config.base_dn.clone(),
            bind_dn: config.bind_dn.clone(),
            bind_password: config.bind_password.clone(),
            timeout,
        })
    }

    /// Configured directory name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Longest time [`DirectoryClient::find_dn`] can take: connect, the
    /// bind and search exchange, then unbind, each bounded by the timeout.
    pub fn deadline(&self) -> Duration {
        self.timeout * 3 + DEADLINE_GRACE
    }

    /// Find the DN of the entry matching `identifier`.
    ///
    /// `Ok(None)` means the directory answered but nothing matched.
    /// Once connected, the connection is closed on every path.
    pub async fn find_dn(&self, identifier: &str) -> Result<Option<String>> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, mut ldap) = tokio::time::timeout(
            self.timeout,
            LdapConnAsync::with_settings(settings, self.url.as_str()),
        )
        .await
        .map_err(|_| Error::Timeout(self.timeout))??;
        ldap3::drive!(conn);

        let found = tokio::time::timeout(self.timeout, self.search(&mut ldap, identifier))
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(self.timeout)));

        match tokio::time::timeout(self.timeout, ldap.unbind()).await {
            Ok(Ok(())) => {},
            Ok(Err(err)) => {
                tracing::debug!(directory = %self.name, error = %err, "unbind failed")
            },
            Err(_) => tracing::debug!(directory = %self.name, "unbind timed out"),
        }

        found
    }

    async fn search(
        &self,
        ldap: &mut Ldap,
        identifier: &str,
    ) -> Result<Option<String>> {
        if let (Some(dn), Some(password)) = (&self.bind_dn, &self.bind_password) {
            ldap.with_timeout(self.timeout)
                .simple_bind(dn, password)
                .await?
                .success()?;
        }

        let filter = identifier_filter(identifier);
        tracing::debug!(directory = %self.name, %filter, base = %self.base_dn, "searching user DN");

        let (entries, _) = ldap
            .with_timeout(self.timeout)
            .search(&self.base_dn, Scope::Subtree, &filter, vec!["dn"])
            .await?
            .success()?;

        if entries.len() > 1 {
            tracing::warn!(
                directory = %self.name,
                %identifier,
                matches = entries.len(),
                "identifier is ambiguous, using first entry"
            );
        }

        Ok(entries
            .into_iter()
            .next()
            .map(|entry| SearchEntry::construct(entry).dn)
            .filter(|dn| !dn.is_empty()))
    }
}

/// Build the OR filter matching `identifier` on every identifier attribute.
pub fn identifier_filter(identifier: &str) -> String {
    let value = ldap_escape(identifier);
    let terms = IDENTIFIER_ATTRIBUTES
        .iter()
        .map(|attribute| format!("({attribute}={value})"))
        .collect::<String>();

    format!("(|{terms})")
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    /// Directory pointing at `port` on localhost.
    fn local(port: u16) -> Directory {
        Directory {
            name: "local".into(),
            host: "127.0.0.1".into(),
            port: Some(port),
            base_dn: "DC=example,DC=com".into(),
            active: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_deadline_covers_every_step() {
        let client = DirectoryClient::new(&local(389), Duration::from_secs(10)).unwrap();
        assert_eq!(client.deadline(), Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_silent_server_connection_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accept, never answer, and report when the client hangs up.
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {},
                }
            }
        });

        let client = DirectoryClient::new(&local(port), Duration::from_millis(300)).unwrap();
        let found = tokio::time::timeout(client.deadline(), client.find_dn("alice"))
            .await
            .unwrap();
        assert!(found.is_err());

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_identifier_filter() {
        assert_eq!(
            identifier_filter("hunter1"),
            "(|(uid=hunter1)(sAMAccountName=hunter1)(cn=hunter1)(mail=hunter1)(userPrincipalName=hunter1))"
        );
    }

    #[test]
    fn test_filter_injection() {
        let filter = identifier_filter("*)(uid=*");

        assert!(!filter.contains("*)(uid=*"));
        assert!(
            filter
                .to_lowercase()
                .starts_with(r"(|(uid=\2a\29\28uid=\2a)")
        );
    }

    #[test]
    fn test_client_from_config() {
        let config = Directory {
            name: "s01".into(),
            host: "ldap.example.com".into(),
            base_dn: "DC=example,DC=com".into(),
            ..Default::default()
        };
        let client = DirectoryClient::new(&config, Duration::from_secs(10)).unwrap();

        assert_eq!(client.name(), "s01");
        assert_eq!(client.url.as_str(), "ldap://ldap.example.com:389");
    }
}
