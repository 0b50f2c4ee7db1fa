//! Interactive prompts for values missing from file, env and flags.

use std::io::Write;

/// Reads one trimmed line from stdin.
pub fn input(label: &str) -> anyhow::Result<String> {
    eprint!("{label}: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Prompts until a non-empty value is entered.
pub fn required(label: &str) -> anyhow::Result<String> {
    loop {
        let value = input(label)?;
        if !value.is_empty() {
            return Ok(value);
        }
        eprintln!("a value is required");
    }
}

/// Yes/no prompt; empty input takes the default.
pub fn confirm(label: &str, default_yes: bool) -> anyhow::Result<bool> {
    let hint = if default_yes { "Y/n" } else { "y/N" };
    loop {
        let value = input(&format!("{label} [{hint}]"))?;
        match value.to_lowercase().as_str() {
            "" => return Ok(default_yes),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => eprintln!("please answer y or n"),
        }
    }
}
