use crate::{MatchMode, Role};
use anyhow::{Result, anyhow};
use log::info;

pub fn parse_mode(input: &str) -> MatchMode {
    match input.to_lowercase().as_str() {
        "s" | "std" | "standard" => MatchMode::Standard,
        "p" | "pro" => MatchMode::Pro,
        other => {
            info!("Unknown mode '{}', defaulting to `standard`..!", other);
            MatchMode::Standard
        }
    }
}

pub fn parse_role(input: &str) -> Option<Role> {
    match input.to_lowercase().as_str() {
        "m" | "melody" | "lead" => Some(Role::Melody),
        "r" | "rhythm" | "drums" => Some(Role::Rhythm),
        "h" | "harmony" | "chords" => Some(Role::Harmony),
        "i" | "ignore" | "off" => Some(Role::Ignore),
        _ => None,
    }
}

/// Parse a `--role` override such as `2=melody`.
pub fn parse_role_override(input: &str) -> Result<(u32, Role)> {
    let (id, role) = input
        .split_once('=')
        .ok_or_else(|| anyhow!("Role override '{}' should look like `<track id>=<role>`..!", input))?;

    let id: u32 = id
        .trim()
        .parse()
        .map_err(|e| anyhow!("Bad track id in role override '{}': {}", input, e))?;

    let role = parse_role(role.trim()).ok_or_else(|| {
        anyhow!(
            "Unknown role '{}' (expected melody|rhythm|harmony|ignore)..!",
            role.trim()
        )
    })?;

    Ok((id, role))
}
