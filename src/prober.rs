// KeyProbe - Weak Password Auditor
// Single-candidate credential probe over an su session

use crate::config::{ConfigError, ProbeConfig};
use crate::session::{Session, SessionError, Spawner, SwitchCommand};
use log::{debug, warn};
use regex::bytes::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Result of one probe, or the terminal result of an account check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub username: String,
    pub succeeded: bool,
    /// Present only when `succeeded`
    pub password: Option<String>,
}

impl ProbeOutcome {
    pub fn found(username: &str, password: &str) -> Self {
        ProbeOutcome {
            username: username.to_string(),
            succeeded: true,
            password: Some(password.to_string()),
        }
    }

    pub fn not_found(username: &str) -> Self {
        ProbeOutcome {
            username: username.to_string(),
            succeeded: false,
            password: None,
        }
    }
}

/// How the text captured after sending a password was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The known authentication-failure message
    Rejected,
    /// The check command echoed the target username
    Accepted,
    /// Anything else; counted as a failure
    Unrecognised,
}

pub fn classify(captured: &str, username: &str, failure_message: &str) -> Verdict {
    if captured == failure_message {
        Verdict::Rejected
    } else if captured == username {
        Verdict::Accepted
    } else {
        Verdict::Unrecognised
    }
}

/// Receiving side of a cooperative cancellation request.
///
/// Cancellation is requested through the paired [`CancelHandle`]; dropping
/// the handle without cancelling also counts as cancelled.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that is never raised
    pub fn never() -> Self {
        CancelSignal { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.rx {
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
            None => false,
        }
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Protocol parameters shared by every probe of a run
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub su_binary: String,
    pub check_command: String,
    pub password_prompt: Regex,
    pub prompt_marker: Regex,
    pub failure_message: String,
    pub timeout: Duration,
    pub accept_output_on_exit: bool,
}

impl ProbeSettings {
    pub fn from_config(config: &ProbeConfig) -> Result<Self, ConfigError> {
        let literal = |text: &str| {
            Regex::new(&regex::escape(text))
                .map_err(|e| ConfigError::Invalid(format!("bad prompt {text:?}: {e}")))
        };

        Ok(ProbeSettings {
            su_binary: config.su_binary.clone(),
            check_command: config.check_command.clone(),
            password_prompt: literal(&config.password_prompt)?,
            prompt_marker: literal(&config.prompt_marker)?,
            failure_message: config.failure_message.clone(),
            timeout: config.timeout(),
            accept_output_on_exit: config.accept_output_on_exit,
        })
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Drives one `su` conversation per candidate password
#[derive(Clone)]
pub struct Prober {
    spawner: Arc<dyn Spawner>,
    settings: Arc<ProbeSettings>,
}

impl Prober {
    pub fn new(spawner: Arc<dyn Spawner>, settings: ProbeSettings) -> Self {
        Prober {
            spawner,
            settings: Arc::new(settings),
        }
    }

    /// Try one password for one account
    #[allow(dead_code)]
    pub async fn probe(&self, username: &str, password: &str) -> ProbeOutcome {
        self.probe_with_cancel(username, password, &CancelSignal::never())
            .await
    }

    /// Try one password, giving up early if `cancel` is raised.
    ///
    /// Every path, including spawn failure, timeout and cancellation, ends
    /// in a [`ProbeOutcome`] and the session is closed before returning.
    pub async fn probe_with_cancel(
        &self,
        username: &str,
        password: &str,
        cancel: &CancelSignal,
    ) -> ProbeOutcome {
        if cancel.is_cancelled() {
            return ProbeOutcome::not_found(username);
        }

        let command = SwitchCommand::su(
            &self.settings.su_binary,
            username,
            &self.settings.check_command,
        );
        let mut session = match self.spawner.spawn(&command).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not spawn terminal for {username}: {e}");
                return ProbeOutcome::not_found(username);
            }
        };

        let captured = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Probe for {username} cancelled");
                None
            }
            captured = self.converse(session.as_mut(), username, password) => captured,
        };
        session.close().await;

        let Some(captured) = captured else {
            return ProbeOutcome::not_found(username);
        };

        match classify(&captured, username, &self.settings.failure_message) {
            Verdict::Accepted => ProbeOutcome::found(username, password),
            Verdict::Rejected => ProbeOutcome::not_found(username),
            Verdict::Unrecognised => {
                debug!("Unexpected output from `{command}`: {captured:?}");
                ProbeOutcome::not_found(username)
            }
        }
    }

    /// Password prompt, password, then everything up to the prompt marker
    async fn converse(
        &self,
        session: &mut dyn Session,
        username: &str,
        password: &str,
    ) -> Option<String> {
        let settings = &self.settings;

        if let Err(e) = session.expect(&settings.password_prompt, settings.timeout).await {
            debug!("No password prompt for {username}: {e}");
            return None;
        }

        if let Err(e) = session.send(&format!("{password}\n")).await {
            debug!("Could not send password for {username}: {e}");
            return None;
        }

        match session.expect(&settings.prompt_marker, settings.timeout).await {
            Ok(text) => Some(text.trim().to_string()),
            Err(SessionError::Eof { output, .. }) if settings.accept_output_on_exit => {
                Some(output.trim().to_string())
            }
            Err(e) => {
                debug!("No prompt marker for {username}: {e}");
                None
            }
        }
    }
}
