// KeyProbe - Weak Password Auditor
// Per-account concurrent candidate checking

use crate::candidates::{generate_with_rules, CandidateRule};
use crate::prober::{cancel_pair, CancelSignal, ProbeOutcome, Prober};
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

/// Checks every candidate of an account through a shared worker pool.
///
/// The pool is a semaphore shared by all clones of the checker, so the
/// number of live `su` sessions stays bounded across accounts as well as
/// within one.
#[derive(Clone)]
pub struct AccountChecker {
    prober: Prober,
    pool: Arc<Semaphore>,
    rules: Arc<Vec<CandidateRule>>,
}

impl AccountChecker {
    pub fn new(prober: Prober, workers: usize, rules: Vec<CandidateRule>) -> Self {
        AccountChecker {
            prober,
            pool: Arc::new(Semaphore::new(workers.max(1))),
            rules: Arc::new(rules),
        }
    }

    /// Probe all candidates for `username`, returning on the first success.
    ///
    /// Remaining probes are cancelled once a password is found. Which
    /// candidate wins is not defined if several would be accepted.
    pub async fn check_account(&self, username: &str) -> ProbeOutcome {
        let candidates = generate_with_rules(username, &self.rules);
        let total = candidates.len();
        if total == 0 {
            return ProbeOutcome::not_found(username);
        }

        // One slot per candidate so no probe ever waits on a full channel
        let (tx, mut rx) = mpsc::channel::<ProbeOutcome>(total);
        let (cancel_handle, cancel) = cancel_pair();

        debug!("Checking {total} candidates for {username}");
        for password in candidates {
            let tx = tx.clone();
            let prober = self.prober.clone();
            let pool = Arc::clone(&self.pool);
            let cancel = cancel.clone();
            let username = username.to_string();

            tokio::spawn(async move {
                let outcome = match acquire_slot(pool, &cancel).await {
                    Some(_permit) => prober.probe_with_cancel(&username, &password, &cancel).await,
                    None => ProbeOutcome::not_found(&username),
                };
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        let mut completed = 0usize;
        while let Some(outcome) = rx.recv().await {
            completed += 1;
            if outcome.succeeded {
                cancel_handle.cancel();
                info!("Password found for {username} after {completed}/{total} probes");
                return outcome;
            }
        }

        debug!("No password found for {username} ({completed}/{total} probes completed)");
        ProbeOutcome::not_found(username)
    }
}

/// Wait for a worker slot unless the account check has already finished
async fn acquire_slot(pool: Arc<Semaphore>, cancel: &CancelSignal) -> Option<OwnedSemaphorePermit> {
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = pool.acquire_owned() => permit.ok(),
    }
}
