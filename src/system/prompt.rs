//! Interactive policy prompts.
//!
//! Questions are only asked when stdin is a terminal; otherwise the defaults in
//! `BuildPolicy::default()` apply so unattended runs never block.

use std::io::{self, BufRead, IsTerminal, Write};

use crate::install::launcher::validate_launcher_name;
use crate::models::BuildPolicy;

/// Ask a yes/no question. Empty input selects `default`.
pub fn ask_yes_no<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    default: bool,
) -> io::Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(output, "{} {} ", question, hint)?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(default);
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "Please answer y or n.")?,
        }
    }
}

/// Ask for a launcher name until a valid one (or the default) is entered.
pub fn ask_launcher_name<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    default: &str,
) -> io::Result<String> {
    loop {
        write!(output, "Launcher name [{}]: ", default)?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(default.to_string());
        }
        let name = match answer.trim() {
            "" => default,
            name => name,
        };
        match validate_launcher_name(name) {
            Ok(()) => return Ok(name.to_string()),
            Err(e) => writeln!(output, "{}", e)?,
        }
    }
}

/// Collect the run's policy from `input`.
///
/// `up_to_date` is whether the remote head already matches the last install;
/// the rebuild question is only asked in that case.
pub fn collect_policy<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    target_name: &str,
    up_to_date: bool,
) -> io::Result<BuildPolicy> {
    let mut policy = BuildPolicy {
        launcher_name: target_name.to_string(),
        ..BuildPolicy::default()
    };

    if up_to_date {
        policy.rebuild_if_current = ask_yes_no(
            input,
            output,
            &format!("{} is already up to date. Rebuild anyway?", target_name),
            false,
        )?;
        if !policy.rebuild_if_current {
            return Ok(policy);
        }
    }

    policy.create_launcher = ask_yes_no(input, output, "Create a command-line launcher?", false)?;
    if policy.create_launcher {
        policy.launcher_name = ask_launcher_name(input, output, target_name)?;
    }
    Ok(policy)
}

/// Prompt on the terminal, or return defaults when stdin is not interactive.
pub fn prompt_policy(target_name: &str, up_to_date: bool) -> io::Result<BuildPolicy> {
    if !io::stdin().is_terminal() {
        log::debug!("[Prompt] stdin is not a terminal, using default policy");
        return Ok(BuildPolicy {
            launcher_name: target_name.to_string(),
            ..BuildPolicy::default()
        });
    }
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stderr();
    collect_policy(&mut input, &mut output, target_name, up_to_date)
}
