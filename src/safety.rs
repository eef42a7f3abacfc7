use log::{debug, info, warn};
use std::env;
use std::path::Path;

/// Check that probing will produce meaningful results on this host
pub fn check_environment(su_binary: &str, allow_root: bool) -> Result<(), String> {
    debug!("Performing safety checks before probing");
    info!("Running as {}", whoami::username());

    check_privileges(is_root(), allow_root)?;
    if let Err(e) = check_su_binary(su_binary) {
        // Each probe then fails to spawn and is reported as not found
        warn!("{e}; every probe will fail");
    }

    debug!("Safety checks passed");
    Ok(())
}

pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// su never asks root for a password, so every candidate would look valid
fn check_privileges(root: bool, allow_root: bool) -> Result<(), String> {
    if !root {
        return Ok(());
    }
    if allow_root {
        warn!("Running as root: su will not prompt for passwords and results are meaningless");
        return Ok(());
    }
    Err("Refusing to audit as root (su skips authentication for uid 0). Run as an unprivileged user or pass --allow-root.".to_string())
}

fn check_su_binary(su_binary: &str) -> Result<(), String> {
    if su_binary.contains('/') {
        if Path::new(su_binary).is_file() {
            return Ok(());
        }
        return Err(format!("su binary not found: {su_binary}"));
    }

    let found = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(su_binary).is_file()))
        .unwrap_or(false);

    if found {
        Ok(())
    } else {
        Err(format!("'{su_binary}' was not found on PATH"))
    }
}
