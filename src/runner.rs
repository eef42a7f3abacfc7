use crate::candidates::generate_with_rules;
use crate::checker::AccountChecker;
use crate::config::{resolve_config, AuditConfig, ConfigError, Overrides};
use crate::discovery::{discover_accounts, list_accounts, list_shells, users_with_shell, DiscoveryError};
use crate::prober::{ProbeOutcome, ProbeSettings, Prober};
use crate::report;
use crate::safety;
use crate::session::{PtySpawner, Spawner};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Exit status for fatal errors other than unreadable registries
pub const EXIT_FAILURE: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Refused(String),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Discovery(e) => e.exit_code(),
            RunError::Config(_) | RunError::Refused(_) => EXIT_FAILURE,
        }
    }
}

pub struct AuditOptions {
    pub config_path: Option<PathBuf>,
    pub overrides: Overrides,
    pub users: Vec<String>,
    pub allow_root: bool,
}

/// Discover accounts, probe each one and print the report
pub async fn run_audit(options: AuditOptions) -> Result<Vec<ProbeOutcome>, RunError> {
    let config = resolve_config(options.config_path.as_deref(), &options.overrides)?;
    apply_log_level(&config);

    report::print_banner();
    safety::check_environment(&config.probe.su_binary, options.allow_root).map_err(RunError::Refused)?;

    let shells = list_shells(&config.global.shells_file)?;
    let entries = list_accounts(&config.global.accounts_file)?;
    let usernames = select_users(users_with_shell(&entries, &shells), &options.users);
    report::print_discovery(shells.len(), &usernames);

    let outcomes = audit_accounts(&config, Arc::new(PtySpawner), &usernames).await?;
    report::print_summary(&outcomes);
    Ok(outcomes)
}

/// Probe the given accounts with sessions from `spawner`, printing each
/// result as it arrives
pub async fn audit_accounts(
    config: &AuditConfig,
    spawner: Arc<dyn Spawner>,
    usernames: &[String],
) -> Result<Vec<ProbeOutcome>, RunError> {
    let settings = ProbeSettings::from_config(&config.probe)?;
    let workers = config.global.worker_count();
    info!(
        "Auditing {} accounts with up to {workers} concurrent sessions",
        usernames.len()
    );

    let checker = AccountChecker::new(
        Prober::new(spawner, settings),
        workers,
        config.candidates.rules.clone(),
    );
    Ok(check_accounts(&checker, usernames, report::print_outcome).await)
}

/// Run one account check per username concurrently and wait for all of them.
///
/// `on_outcome` sees each result in completion order; the returned list is
/// in the same order.
pub async fn check_accounts(
    checker: &AccountChecker,
    usernames: &[String],
    mut on_outcome: impl FnMut(&ProbeOutcome),
) -> Vec<ProbeOutcome> {
    let (tx, mut rx) = mpsc::channel::<ProbeOutcome>(usernames.len().max(1));

    for username in usernames {
        let tx = tx.clone();
        let checker = checker.clone();
        let username = username.clone();
        tokio::spawn(async move {
            let outcome = checker.check_account(&username).await;
            let _ = tx.send(outcome).await;
        });
    }
    drop(tx);

    let mut outcomes = Vec::with_capacity(usernames.len());
    while let Some(outcome) = rx.recv().await {
        on_outcome(&outcome);
        outcomes.push(outcome);
    }

    if outcomes.len() < usernames.len() {
        warn!(
            "{} account checks ended without reporting",
            usernames.len() - outcomes.len()
        );
    }
    outcomes
}

/// Restrict discovered users to those named on the command line
fn select_users(discovered: Vec<String>, requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        return discovered;
    }

    for name in requested {
        if !discovered.contains(name) {
            warn!("Requested user {name} has no login shell or does not exist, skipping");
        }
    }
    discovered
        .into_iter()
        .filter(|name| requested.contains(name))
        .collect()
}

fn apply_log_level(config: &AuditConfig) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    if let Some(level) = &config.global.log_level {
        crate::logger::set_log_level(level);
    }
}

/// Print discovered shells and accounts without probing
pub fn list_accounts_command(config_path: Option<PathBuf>, overrides: Overrides) -> Result<(), RunError> {
    let config = resolve_config(config_path.as_deref(), &overrides)?;

    let shells = list_shells(&config.global.shells_file)?;
    let entries = list_accounts(&config.global.accounts_file)?;
    let accounts = discover_accounts(&entries, &shells);

    report::print_accounts(&shells, &accounts);
    Ok(())
}

/// Print the candidate sequence for a username
pub fn list_candidates_command(username: &str, config_path: Option<PathBuf>) -> Result<(), RunError> {
    let config = resolve_config(config_path.as_deref(), &Overrides::default())?;
    let candidates = generate_with_rules(username, &config.candidates.rules);

    report::print_candidates(username, &config.candidates.rules, &candidates);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::generate;
    use crate::discovery::{parse_accounts, parse_shells};
    use crate::session::testing::{Reply, ScriptedSpawner};
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fast_config() -> AuditConfig {
        let mut config = AuditConfig::default();
        config.global.max_concurrent_probes = Some(64);
        config
    }

    #[tokio::test]
    async fn test_only_discovered_users_are_probed() {
        let shells = parse_shells("/bin/bash\n");
        let entries = parse_accounts(
            "alice:x:1000:1000::/home/alice:/bin/bash\nbob:x:1001:1001::/home/bob:/bin/false\n",
        );
        let usernames = users_with_shell(&entries, &shells);
        assert_eq!(usernames, vec!["alice".to_string()]);

        let spawner = Arc::new(ScriptedSpawner::with_passwords(&[("alice", "alice7"), ("bob", "bob")]));
        let outcomes = audit_accounts(&fast_config(), spawner, &usernames).await.unwrap();

        assert_eq!(outcomes, vec![ProbeOutcome::found("alice", "alice7")]);
    }

    #[tokio::test]
    async fn test_every_account_reports() {
        let spawner = Arc::new(ScriptedSpawner::with_passwords(&[("alice", "alice"), ("carol", "carol99")]));
        let config = fast_config();
        let checker = AccountChecker::new(
            Prober::new(spawner, ProbeSettings::from_config(&config.probe).unwrap()),
            32,
            config.candidates.rules.clone(),
        );
        let usernames: Vec<String> = ["alice", "bob", "carol"].iter().map(|s| s.to_string()).collect();

        let mut seen = 0;
        let outcomes = check_accounts(&checker, &usernames, |_| seen += 1).await;
        assert_eq!(seen, 3);

        let by_user: HashMap<_, _> = outcomes
            .iter()
            .map(|o| (o.username.as_str(), o.password.as_deref()))
            .collect();
        assert_eq!(by_user.len(), 3);
        assert_eq!(by_user["alice"], Some("alice"));
        assert_eq!(by_user["bob"], None);
        assert_eq!(by_user["carol"], Some("carol99"));

        for outcome in outcomes.iter().filter(|o| o.succeeded) {
            assert!(generate(&outcome.username).contains(outcome.password.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_empty_account_list_is_a_clean_empty_report() {
        let spawner = Arc::new(ScriptedSpawner::new(|_, _| Reply::Silence));
        let counters = Arc::clone(&spawner.counters);

        let outcomes = audit_accounts(&fast_config(), spawner, &[]).await.unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(counters.spawned(), 0);
    }

    #[test]
    fn test_select_users() {
        let discovered: Vec<String> = ["root", "alice", "carol"].iter().map(|s| s.to_string()).collect();
        assert_eq!(select_users(discovered.clone(), &[]), discovered);

        let requested = vec!["carol".to_string(), "mallory".to_string()];
        assert_eq!(select_users(discovered, &requested), vec!["carol".to_string()]);
    }

    #[test]
    fn test_unreadable_registries_map_to_distinct_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let mut shells = NamedTempFile::new().unwrap();
        writeln!(shells, "/bin/sh").unwrap();

        let missing_shells = Overrides {
            shells_file: Some(dir.path().join("shells")),
            ..Default::default()
        };
        let err = list_accounts_command(None, missing_shells).unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let missing_accounts = Overrides {
            shells_file: Some(shells.path().to_path_buf()),
            accounts_file: Some(dir.path().join("passwd")),
            ..Default::default()
        };
        let err = list_accounts_command(None, missing_accounts).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_missing_su_and_no_shells_is_a_clean_empty_report() {
        let mut shells = NamedTempFile::new().unwrap();
        writeln!(shells, "# no shells").unwrap();
        let mut passwd = NamedTempFile::new().unwrap();
        writeln!(passwd, "alice:x:1000:1000::/home/alice:/bin/bash").unwrap();
        let mut config = NamedTempFile::new().unwrap();
        write!(config, r#"{{"probe": {{"su_binary": "/nonexistent/su"}}}}"#).unwrap();

        let options = AuditOptions {
            config_path: Some(config.path().to_path_buf()),
            overrides: Overrides {
                shells_file: Some(shells.path().to_path_buf()),
                accounts_file: Some(passwd.path().to_path_buf()),
                ..Default::default()
            },
            users: Vec::new(),
            allow_root: true,
        };

        let outcomes = run_audit(options).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_missing_su_reports_not_found() {
        let mut shells = NamedTempFile::new().unwrap();
        writeln!(shells, "/bin/bash").unwrap();
        let mut passwd = NamedTempFile::new().unwrap();
        writeln!(passwd, "alice:x:1000:1000::/home/alice:/bin/bash").unwrap();
        let mut config = NamedTempFile::new().unwrap();
        write!(config, r#"{{"probe": {{"su_binary": "/nonexistent/su"}}}}"#).unwrap();

        let options = AuditOptions {
            config_path: Some(config.path().to_path_buf()),
            overrides: Overrides {
                shells_file: Some(shells.path().to_path_buf()),
                accounts_file: Some(passwd.path().to_path_buf()),
                workers: Some(8),
                ..Default::default()
            },
            users: Vec::new(),
            allow_root: true,
        };

        let outcomes = run_audit(options).await.unwrap();
        assert_eq!(outcomes, vec![ProbeOutcome::not_found("alice")]);
    }

    #[test]
    fn test_bad_config_is_a_generic_failure() {
        let err = list_candidates_command("alice", Some(PathBuf::from("/nonexistent/keyprobe.json"))).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }
}
