//! Directory access
//!
//! `Directory` opens an authenticated session; `DirectorySession` enumerates
//! person entries as `UserRecord`s. Sessions are scoped to one sync cycle.

use std::collections::HashMap;

use adc_common::{Result, UserRecord};
use adc_config::DirectoryConfig;
use adc_secrets::BindCredentials;
use async_trait::async_trait;

pub mod ldap;
pub mod memory;

pub use ldap::LdapDirectory;
pub use memory::StaticDirectory;

/// Every entry the sync reads
pub const PERSON_FILTER: &str = "(objectclass=person)";

/// All user attributes plus all operational attributes
pub const ALL_ATTRIBUTES: &[&str] = &["*", "+"];

pub const ATTR_ACCOUNT_ID: &str = "sAMAccountName";
pub const ATTR_DISPLAY_NAME: &str = "name";
pub const ATTR_PASSWORD_LAST_SET: &str = "pwdLastSet";
pub const ATTR_ACCOUNT_CONTROL: &str = "userAccountControl";

#[async_trait]
pub trait Directory: Send + Sync {
    /// Connect and bind. Fails with a directory error on connection or
    /// authentication failure.
    async fn bind(
        &self,
        config: &DirectoryConfig,
        credentials: &BindCredentials,
    ) -> Result<Box<dyn DirectorySession>>;
}

#[async_trait]
pub trait DirectorySession: Send {
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<UserRecord>>;

    async fn unbind(&mut self) -> Result<()>;
}

/// Map a directory entry to a user.
///
/// Attribute names are matched case-insensitively and the first value wins.
/// Entries without an account name (contacts also match the person filter)
/// yield `None`. Other missing attributes become empty strings.
pub fn user_from_attrs(attrs: &HashMap<String, Vec<String>>) -> Option<UserRecord> {
    let first = |name: &str| -> Option<String> {
        attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first().cloned())
    };

    let account_id = first(ATTR_ACCOUNT_ID).filter(|id| !id.is_empty())?;
    Some(UserRecord {
        account_id,
        display_name: first(ATTR_DISPLAY_NAME).unwrap_or_default(),
        password_last_set: first(ATTR_PASSWORD_LAST_SET).unwrap_or_default(),
        account_control_flags: first(ATTR_ACCOUNT_CONTROL).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
            .collect()
    }

    #[test]
    fn test_user_from_attrs() {
        let entry = attrs(&[
            ("sAMAccountName", "jdoe"),
            ("name", "John Doe"),
            ("pwdLastSet", "132514560000000000"),
            ("userAccountControl", "66048"),
            ("objectClass", "person"),
        ]);
        let user = user_from_attrs(&entry).unwrap();
        assert_eq!(user, UserRecord::new("jdoe", "John Doe", "132514560000000000", "66048"));
    }

    #[test]
    fn test_attribute_names_are_case_insensitive() {
        let entry = attrs(&[("samaccountname", "jdoe"), ("USERACCOUNTCONTROL", "512")]);
        let user = user_from_attrs(&entry).unwrap();
        assert_eq!(user.account_id, "jdoe");
        assert_eq!(user.account_control_flags, "512");
        assert_eq!(user.display_name, "");
    }

    #[test]
    fn test_entry_without_account_name_is_skipped() {
        let entry = attrs(&[("name", "Vendor Contact"), ("mail", "vendor@example.com")]);
        assert!(user_from_attrs(&entry).is_none());
    }
}
