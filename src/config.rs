//! Environment-variable configuration.

use std::collections::HashSet;
use std::env;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub access_token: String,
    pub username: String,
    pub exclude_repos: HashSet<String>,
    pub exclude_langs: HashSet<String>,
    pub consider_forked_repos: bool,
}

impl Config {
    /// Read configuration from the environment. A personal access token is
    /// required; everything else is optional.
    pub fn from_env() -> Result<Self> {
        let access_token = env::var("ACCESS_TOKEN")
            .context("ACCESS_TOKEN environment variable not set; a personal access token is required")?;
        Ok(Self {
            access_token,
            username: env::var("GITHUB_ACTOR").unwrap_or_default(),
            exclude_repos: split_set(&env::var("EXCLUDED").unwrap_or_default()),
            exclude_langs: split_set(&env::var("EXCLUDED_LANGS").unwrap_or_default()),
            consider_forked_repos: !env::var("COUNT_STATS_FROM_FORKS")
                .unwrap_or_default()
                .is_empty(),
        })
    }
}

/// Comma-separated list to a trimmed set, dropping empties.
fn split_set(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_set_trims_and_drops_empties() {
        let set = split_set(" octocat/a , octocat/b ,, ");
        assert_eq!(set.len(), 2);
        assert!(set.contains("octocat/a"));
        assert!(set.contains("octocat/b"));
    }

    #[test]
    fn split_set_of_empty_string_is_empty() {
        assert!(split_set("").is_empty());
    }
}
