//! LDAP implementation on `ldap3`.

use std::time::Duration;

use adc_common::{AdcError, Result, UserRecord};
use adc_config::DirectoryConfig;
use adc_secrets::BindCredentials;
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, ResultEntry, Scope, SearchEntry, SearchResult};
use tracing::{debug, info, warn};

use crate::{user_from_attrs, Directory, DirectorySession};

const LDAP_SIZE_LIMIT_EXCEEDED: u32 = 4;
const LDAP_INVALID_CREDENTIALS: u32 = 49;

/// Binds with the down-level logon name (`DOMAIN\user`) over a simple bind.
#[derive(Debug, Default)]
pub struct LdapDirectory;

impl LdapDirectory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn bind(
        &self,
        config: &DirectoryConfig,
        credentials: &BindCredentials,
    ) -> Result<Box<dyn DirectorySession>> {
        // An empty password turns a simple bind into an unauthenticated one.
        if credentials.password.is_empty() {
            return Err(AdcError::Credential("bind password is empty".to_string()));
        }

        let url = config.url();
        debug!(url = %url, "Connecting to directory");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(config.connect_timeout_secs))
            .set_no_tls_verify(!config.tls_verify);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| AdcError::Directory(format!("Failed to connect to {}: {}", url, e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_user = credentials.qualified_username(&config.domain_name);
        let result = ldap
            .simple_bind(&bind_user, &credentials.password)
            .await
            .map_err(|e| AdcError::Directory(format!("Bind failed for {}: {}", bind_user, e)))?;

        if result.rc == LDAP_INVALID_CREDENTIALS {
            return Err(AdcError::Directory(format!("Invalid credentials for {}", bind_user)));
        }
        if result.rc != 0 {
            return Err(AdcError::Directory(format!(
                "Bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %config.host, user = %bind_user, "Directory bind successful");
        Ok(Box::new(LdapSession { ldap }))
    }
}

/// Entries of a complete search. A truncated result is an error, never a
/// partial user set.
fn search_entries(base: &str, result: SearchResult) -> Result<Vec<ResultEntry>> {
    let SearchResult(entries, res) = result;
    match res.rc {
        0 => Ok(entries),
        LDAP_SIZE_LIMIT_EXCEEDED => Err(AdcError::Directory(format!(
            "Search under {} exceeded the server size limit after {} entries",
            base,
            entries.len()
        ))),
        rc => Err(AdcError::Directory(format!(
            "Search under {} failed with code {}: {}",
            base, rc, res.text
        ))),
    }
}

pub struct LdapSession {
    ldap: Ldap,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<UserRecord>> {
        let result = self
            .ldap
            .search(base, Scope::Subtree, filter, attributes.to_vec())
            .await
            .map_err(|e| AdcError::Directory(format!("Search under {} failed: {}", base, e)))?;
        let entries = search_entries(base, result)?;

        let mut users = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = SearchEntry::construct(entry);
            match user_from_attrs(&entry.attrs) {
                Some(user) => users.push(user),
                None => warn!(dn = %entry.dn, "Skipping entry without sAMAccountName"),
            }
        }

        debug!(base = %base, count = users.len(), "Directory search complete");
        Ok(users)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| AdcError::Directory(format!("Unbind failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldap3::LdapResult;

    fn result(rc: u32, entries: usize) -> SearchResult {
        let res = LdapResult {
            rc,
            matched: String::new(),
            text: String::new(),
            refs: vec![],
            ctrls: vec![],
        };
        let entries = (0..entries)
            .map(|_| ResultEntry::new(ldap3::asn1::StructureTag {
                class: ldap3::asn1::TagClass::Application,
                id: 4,
                payload: ldap3::asn1::PL::C(vec![]),
            }))
            .collect();
        SearchResult(entries, res)
    }

    #[test]
    fn test_complete_search_returns_entries() {
        let entries = search_entries("DC=corp", result(0, 2)).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_size_limit_fails_instead_of_truncating() {
        let err = search_entries("DC=corp", result(LDAP_SIZE_LIMIT_EXCEEDED, 1000)).unwrap_err();
        assert_eq!(err.kind(), "directory");
        assert!(err.to_string().contains("size limit after 1000 entries"));
    }

    #[test]
    fn test_other_result_codes_fail() {
        let err = search_entries("DC=corp", result(32, 0)).unwrap_err();
        assert!(err.to_string().contains("code 32"));
    }
}
