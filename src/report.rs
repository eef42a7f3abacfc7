// KeyProbe - Weak Password Auditor
// Console report rendering

use crate::candidates::CandidateRule;
use crate::discovery::Account;
use crate::prober::ProbeOutcome;
use colored::*;

pub fn print_banner() {
    println!();
    println!("{}", "-".repeat(57).bright_blue().bold());
    println!(
        "{}",
        format!("  KEYPROBE v{} - Local Weak Password Auditor", env!("CARGO_PKG_VERSION"))
            .bold()
            .green()
    );
    println!("{}", "  Probes su with username-derived passwords".italic());
    println!("{}", "-".repeat(57).bright_blue().bold());
}

pub fn outcome_line(outcome: &ProbeOutcome) -> String {
    match (&outcome.password, outcome.succeeded) {
        (Some(password), true) => format!(
            "Checking user {}{}",
            outcome.username,
            format!(" - Valid password found. Password: {password}").green()
        ),
        _ => format!(
            "Checking user {}{}",
            outcome.username,
            " - No password found".red()
        ),
    }
}

pub fn print_outcome(outcome: &ProbeOutcome) {
    println!("{}", outcome_line(outcome));
}

pub fn print_discovery(shell_count: usize, usernames: &[String]) {
    println!("Found {shell_count} shells");
    println!(
        "Found {} users with shells: [{}]",
        usernames.len(),
        usernames.join(" ")
    );
}

pub fn print_summary(outcomes: &[ProbeOutcome]) {
    let weak = outcomes.iter().filter(|o| o.succeeded).count();

    println!("\n{}", "Audit Summary".bold().underline());
    println!("Accounts checked: {}", outcomes.len());
    println!(
        "Weak passwords: {}",
        if weak > 0 {
            weak.to_string().red().bold()
        } else {
            weak.to_string().green()
        }
    );
}

pub fn print_accounts(shells: &[String], accounts: &[Account]) {
    println!("\n{}", "Login Shells".bold().underline());
    for shell in shells {
        println!("  {shell}");
    }

    println!("\n{}", "Accounts".bold().underline());
    for account in accounts {
        let marker = if account.has_interactive_shell {
            "probe".green()
        } else {
            "skip".normal()
        };
        println!("  {:<24} {:<28} {}", account.username, account.shell, marker);
    }
}

pub fn print_candidates(username: &str, rules: &[CandidateRule], candidates: &[String]) {
    let names: Vec<String> = rules.iter().map(|r| r.to_string()).collect();
    println!(
        "{} candidates for {} (rules: {})",
        candidates.len().to_string().bold(),
        username.yellow(),
        names.join(", ")
    );
    for candidate in candidates {
        println!("{candidate}");
    }
}
