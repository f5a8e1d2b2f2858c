//! Scoped INI config-file reading for the Login credential provider.
//!
//! Deliberately narrow: this is not a general AWS config-file parser (that
//! stays out of scope per the crate's purpose) — it reads exactly the two
//! keys `LoginCredentialProvider` needs, `login_session` and `region`, from
//! `[default]` or `[profile NAME]` sections.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::credential::CredentialsError;
use crate::region::Region;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSettings {
    pub login_session: Option<String>,
    pub region: Option<String>,
}

/// Parses the narrow subset of INI syntax this crate cares about:
/// `[section]` headers and `key = value`/`key=value` lines. `;`/`#` at the
/// start of a trimmed line is a comment. Unrecognized keys are ignored
/// (a general service-config parser is explicitly out of scope).
pub fn parse(contents: &str) -> HashMap<String, ProfileSettings> {
    let mut sections: HashMap<String, ProfileSettings> = HashMap::new();
    let mut current = String::from("default");
    sections.insert(current.clone(), ProfileSettings::default());

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            let header = line[1..line.len() - 1].trim();
            current = header.strip_prefix("profile ").unwrap_or(header).to_owned();
            sections.entry(current.clone()).or_insert_with(ProfileSettings::default);
            continue;
        }
        let eq = match line.find('=') {
            Some(eq) => eq,
            None => continue,
        };
        let key = line[..eq].trim();
        let value = line[eq + 1..].trim().to_owned();
        let entry = sections.entry(current.clone()).or_insert_with(ProfileSettings::default);
        match key {
            "login_session" => entry.login_session = Some(value),
            "region" => entry.region = Some(value),
            _ => {}
        }
    }
    sections
}

/// Default config-file path, `$HOME/.aws/config`, matching the AWS CLI's
/// own default (the crate doesn't special-case `AWS_CONFIG_FILE` since the
/// full config surface is explicitly out of scope; only the Login
/// credential path reads this file at all).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".aws").join("config"))
}

/// Reads and parses the named profile's settings (`"default"` for the
/// default section), surfacing the closed `CredentialsError` kinds for
/// missing file / missing profile / missing `login_session`.
pub fn load_profile(path: &Path, profile: &str) -> Result<ProfileSettings, CredentialsError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        CredentialsError::ConfigFileNotFound(format!("{}: {}", path.display(), e))
    })?;
    let sections = parse(&contents);
    let settings = sections
        .get(profile)
        .cloned()
        .ok_or_else(|| CredentialsError::ProfileNotFound(profile.to_owned()))?;
    if settings.login_session.is_none() {
        return Err(CredentialsError::LoginSessionMissing);
    }
    Ok(settings)
}

/// Resolves the region to use for a profile: explicit `region` key, else
/// `AWS_REGION`, else `us-east-1` (§6's environment-variable fallback).
pub fn resolve_region(settings: &ProfileSettings) -> Region {
    settings
        .region
        .as_deref()
        .and_then(|r| Region::from_str(r).ok())
        .or_else(|| std::env::var("AWS_REGION").ok().and_then(|r| Region::from_str(&r).ok()))
        .unwrap_or(Region::UsEast1)
}

/// Cache directory for Login token files: `AWS_LOGIN_CACHE_DIRECTORY` env
/// override, else `$HOME/.aws/login/cache`.
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AWS_LOGIN_CACHE_DIRECTORY") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aws")
        .join("login")
        .join("cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_and_named_profiles() {
        let ini = "[default]\nlogin_session = abc\nregion=us-west-2\n\n[profile work]\nlogin_session=def\n";
        let sections = parse(ini);
        assert_eq!(sections["default"].login_session.as_deref(), Some("abc"));
        assert_eq!(sections["default"].region.as_deref(), Some("us-west-2"));
        assert_eq!(sections["work"].login_session.as_deref(), Some("def"));
        assert_eq!(sections["work"].region, None);
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let ini = "; a comment\n[default]\n# also a comment\nlogin_session = abc\n";
        let sections = parse(ini);
        assert_eq!(sections["default"].login_session.as_deref(), Some("abc"));
    }

    #[test]
    fn resolve_region_falls_back_to_default() {
        let settings = ProfileSettings::default();
        std::env::remove_var("AWS_REGION");
        assert_eq!(resolve_region(&settings), Region::UsEast1);
    }
}
