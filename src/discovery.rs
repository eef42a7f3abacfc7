// KeyProbe - Weak Password Auditor
// Account discovery from the host shell and account registries

use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Process exit status when the shell registry cannot be read
pub const EXIT_SHELLS_UNREADABLE: i32 = 1;
/// Process exit status when the account registry cannot be read
pub const EXIT_ACCOUNTS_UNREADABLE: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Could not read shell registry {path:?}: {source}")]
    Shells {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not read account registry {path:?}: {source}")]
    Accounts {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DiscoveryError {
    /// Distinct exit status per registry so the two causes can be told apart
    pub fn exit_code(&self) -> i32 {
        match self {
            DiscoveryError::Shells { .. } => EXIT_SHELLS_UNREADABLE,
            DiscoveryError::Accounts { .. } => EXIT_ACCOUNTS_UNREADABLE,
        }
    }
}

/// A host account as described by one account registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub shell: String,
    pub has_interactive_shell: bool,
}

impl Account {
    /// Parse an opaque colon-delimited entry: first field is the username,
    /// last field is the configured shell.
    pub fn from_entry(entry: &str, shells: &[String]) -> Account {
        let username = entry.split(':').next().unwrap_or_default().to_string();
        let shell = entry.rsplit(':').next().unwrap_or_default().to_string();
        let has_interactive_shell = shells.iter().any(|s| *s == shell);

        Account {
            username,
            shell,
            has_interactive_shell,
        }
    }
}

/// Read the shell registry and return every absolute shell path in it
pub fn list_shells(path: &Path) -> Result<Vec<String>, DiscoveryError> {
    let bytes = fs::read(path).map_err(|source| DiscoveryError::Shells {
        path: path.to_path_buf(),
        source,
    })?;

    let shells = parse_shells(&String::from_utf8_lossy(&bytes));
    debug!("Read {} shells from {path:?}", shells.len());
    Ok(shells)
}

/// Read the account registry and return each trimmed line verbatim
pub fn list_accounts(path: &Path) -> Result<Vec<String>, DiscoveryError> {
    let bytes = fs::read(path).map_err(|source| DiscoveryError::Accounts {
        path: path.to_path_buf(),
        source,
    })?;

    // Comment fields are not always UTF-8; only the username and shell matter
    let entries = parse_accounts(&String::from_utf8_lossy(&bytes));
    debug!("Read {} account entries from {path:?}", entries.len());
    Ok(entries)
}

pub fn parse_shells(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('/'))
        .map(str::to_string)
        .collect()
}

pub fn parse_accounts(content: &str) -> Vec<String> {
    content.lines().map(|line| line.trim().to_string()).collect()
}

/// Classify every account entry against the shell list, preserving order
pub fn discover_accounts(entries: &[String], shells: &[String]) -> Vec<Account> {
    entries
        .iter()
        .map(|entry| Account::from_entry(entry, shells))
        .collect()
}

/// Usernames whose configured shell is one of `shells`, in registry order.
/// Duplicate entries are kept as found.
pub fn users_with_shell(entries: &[String], shells: &[String]) -> Vec<String> {
    discover_accounts(entries, shells)
        .into_iter()
        .filter(|account| account.has_interactive_shell)
        .map(|account| account.username)
        .collect()
}
