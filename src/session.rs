//! Interactive authentication sessions.
//!
//! A [`Spawner`] starts a privilege-switch command and hands back a
//! [`Session`] that can wait for text patterns and send input. The real
//! implementation runs the command inside a pseudo-terminal so `su` will
//! prompt for a password; tests use the scripted implementation in
//! [`testing`].

use async_trait::async_trait;
use log::debug;
use regex::bytes::Regex;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

/// Upper bound on unconsumed session output kept in memory
pub const MAX_BUFFERED_OUTPUT: usize = 64 * 1024;

const READ_CHUNK: usize = 1024;
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },
    #[error("Timed out after {timeout:?} waiting for {pattern:?}")]
    Timeout { timeout: Duration, pattern: String },
    #[error("Session ended before {pattern:?} was seen")]
    Eof { pattern: String, output: String },
    #[error("Session I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The command line used to switch identity and run a check command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SwitchCommand {
    /// `su <username> -c <check_command>`
    pub fn su(su_binary: &str, username: &str, check_command: &str) -> Self {
        SwitchCommand {
            program: su_binary.to_string(),
            args: vec![
                username.to_string(),
                "-c".to_string(),
                check_command.to_string(),
            ],
        }
    }
}

impl fmt::Display for SwitchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// One live interactive process, owned by exactly one probe
#[async_trait]
pub trait Session: Send {
    /// Wait until `pattern` appears in the output and return everything read
    /// before it. Output up to the end of the match is consumed.
    async fn expect(&mut self, pattern: &Regex, timeout: Duration) -> Result<String, SessionError>;

    async fn send(&mut self, text: &str) -> Result<(), SessionError>;

    /// Terminate the process and release its terminal
    async fn close(&mut self);
}

#[async_trait]
pub trait Spawner: Send + Sync {
    async fn spawn(&self, command: &SwitchCommand) -> Result<Box<dyn Session>, SessionError>;
}

/// Accumulates session output and hands out the text preceding a match
#[derive(Debug, Default)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append output, discarding the oldest bytes beyond [`MAX_BUFFERED_OUTPUT`]
    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
        if self.bytes.len() > MAX_BUFFERED_OUTPUT {
            let excess = self.bytes.len() - MAX_BUFFERED_OUTPUT;
            self.bytes.drain(..excess);
        }
    }

    /// If `pattern` matches, consume through the end of the match and return
    /// the text before it.
    pub fn take_until(&mut self, pattern: &Regex) -> Option<String> {
        let (start, end) = pattern.find(&self.bytes).map(|m| (m.start(), m.end()))?;
        let before = String::from_utf8_lossy(&self.bytes[..start]).into_owned();
        self.bytes.drain(..end);
        Some(before)
    }

    pub fn take_all(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.bytes).into_owned();
        self.bytes.clear();
        text
    }
}

/// Spawns commands attached to a fresh pseudo-terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct PtySpawner;

fn spawn_error(command: &SwitchCommand, reason: impl fmt::Display) -> SessionError {
    SessionError::Spawn {
        command: command.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl Spawner for PtySpawner {
    async fn spawn(&self, command: &SwitchCommand) -> Result<Box<dyn Session>, SessionError> {
        let pty = pty_process::Pty::new().map_err(|e| spawn_error(command, e))?;
        pty.resize(pty_process::Size::new(24, 80))
            .map_err(|e| spawn_error(command, e))?;
        let pts = pty.pts().map_err(|e| spawn_error(command, e))?;

        let mut cmd = pty_process::Command::new(&command.program);
        cmd.args(&command.args);
        // Keep su's messages in the untranslated form the classifier expects
        cmd.env("LC_ALL", "C");
        let child = cmd.spawn(&pts).map_err(|e| spawn_error(command, e))?;

        debug!("Spawned `{command}` (pid {:?})", child.id());
        Ok(Box::new(PtySession {
            pty,
            child,
            buffer: OutputBuffer::new(),
            closed: false,
        }))
    }
}

pub struct PtySession {
    pty: pty_process::Pty,
    child: tokio::process::Child,
    buffer: OutputBuffer,
    closed: bool,
}

#[async_trait]
impl Session for PtySession {
    async fn expect(&mut self, pattern: &Regex, timeout: Duration) -> Result<String, SessionError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(text) = self.buffer.take_until(pattern) {
                return Ok(text);
            }

            let read = match tokio::time::timeout_at(deadline, self.pty.read(&mut chunk)).await {
                Err(_) => {
                    return Err(SessionError::Timeout {
                        timeout,
                        pattern: pattern.as_str().to_string(),
                    })
                }
                Ok(Ok(n)) => n,
                // Linux reports EIO on the master once the child side is gone
                Ok(Err(e)) if e.raw_os_error() == Some(libc::EIO) => 0,
                Ok(Err(e)) => return Err(e.into()),
            };

            if read == 0 {
                return Err(SessionError::Eof {
                    pattern: pattern.as_str().to_string(),
                    output: self.buffer.take_all(),
                });
            }
            self.buffer.push(&chunk[..read]);
        }
    }

    async fn send(&mut self, text: &str) -> Result<(), SessionError> {
        self.pty.write_all(text.as_bytes()).await?;
        self.pty.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.child.start_kill() {
            debug!("Child already gone: {e}");
        }
        match tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Failed to reap child: {e}"),
            // Hangup on pty drop finishes it off
            Err(_) => debug!("Child did not exit within {REAP_TIMEOUT:?}"),
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.child.start_kill();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Reply, ScriptedSpawner};
    use super::*;

    fn literal(text: &str) -> Regex {
        Regex::new(&regex::escape(text)).unwrap()
    }

    #[test]
    fn test_take_until_returns_text_before_match() {
        let mut buffer = OutputBuffer::new();
        buffer.push(b"\r\nalice\r\n% trailing");
        assert_eq!(buffer.take_until(&literal("%")).as_deref(), Some("\r\nalice\r\n"));
        assert_eq!(buffer.take_all(), " trailing");
        assert_eq!(buffer.take_all(), "");
    }

    #[test]
    fn test_take_until_without_match_keeps_output() {
        let mut buffer = OutputBuffer::new();
        buffer.push(b"Passw");
        assert!(buffer.take_until(&literal("Password:")).is_none());
        buffer.push(b"ord: ");
        assert_eq!(buffer.take_until(&literal("Password:")).as_deref(), Some(""));
        assert_eq!(buffer.take_all(), " ");
    }

    #[test]
    fn test_buffer_is_capped() {
        let mut buffer = OutputBuffer::new();
        buffer.push(&vec![b'a'; MAX_BUFFERED_OUTPUT]);
        buffer.push(b"tail");
        let kept = buffer.take_all();
        assert_eq!(kept.len(), MAX_BUFFERED_OUTPUT);
        assert!(kept.ends_with("tail"));
    }

    #[test]
    fn test_su_command_line() {
        let command = SwitchCommand::su("su", "alice", "whoami");
        assert_eq!(command.to_string(), "su alice -c whoami");
        assert_eq!(command.args[0], "alice");
    }

    #[tokio::test]
    async fn test_scripted_conversation() {
        let spawner = ScriptedSpawner::with_passwords(&[("alice", "alice7")]);
        let mut session = spawner
            .spawn(&SwitchCommand::su("su", "alice", "whoami"))
            .await
            .unwrap();

        let timeout = Duration::from_millis(50);
        session.expect(&literal("Password:"), timeout).await.unwrap();
        session.send("alice7\n").await.unwrap();
        let captured = session.expect(&literal("%"), timeout).await.unwrap();
        assert_eq!(captured.trim(), "alice");

        session.close().await;
        assert_eq!(spawner.counters.closed(), 1);
    }

    #[tokio::test]
    async fn test_scripted_exit_reports_eof_with_output() {
        let spawner = ScriptedSpawner::new(|user, _| Reply::Exit(user.to_string()));
        let mut session = spawner
            .spawn(&SwitchCommand::su("su", "bob", "whoami"))
            .await
            .unwrap();

        let timeout = Duration::from_millis(50);
        session.expect(&literal("Password:"), timeout).await.unwrap();
        session.send("bob\n").await.unwrap();
        match session.expect(&literal("%"), timeout).await {
            Err(SessionError::Eof { output, .. }) => assert_eq!(output.trim(), "bob"),
            other => panic!("expected EOF, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scripted_missing_prompt_times_out() {
        let spawner = ScriptedSpawner::new(|_, _| Reply::Silence).without_password_prompt();
        let mut session = spawner
            .spawn(&SwitchCommand::su("su", "carol", "whoami"))
            .await
            .unwrap();

        let result = session
            .expect(&literal("Password:"), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(SessionError::Timeout { .. })));
    }
}
