//! Aggregated GitHub statistics for one user.
//!
//! Each statistic is computed lazily on first access and cached for the rest
//! of the run. The caches are `tokio::sync::OnceCell`s, so two consumers
//! racing on the same not-yet-computed statistic converge on a single
//! computation and observe the same settled value.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use anyhow::{Context, Result};
use futures::future::try_join_all;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::api::GithubApi;
use crate::queries;

/// Immutable per-run filtering configuration.
#[derive(Debug, Default, Clone)]
pub struct Filters {
    /// Repositories (as `owner/name`) left out of every accumulation.
    pub exclude_repos: HashSet<String>,
    /// Language names left out of the language table and its denominator.
    pub exclude_langs: HashSet<String>,
    /// Whether contributed-to repositories count towards stars, forks and
    /// languages.
    pub consider_forked_repos: bool,
}

/// One language's running totals across all counted repositories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Language {
    pub size: u64,
    pub occurrences: u64,
    pub color: Option<String>,
    /// Percentage of total bytes across all non-excluded languages. Settled
    /// once the repository population is closed; zero when no language bytes
    /// survived filtering.
    pub prop: f64,
}

/// Everything the repository-overview pagination produces in one pass.
#[derive(Debug, Default)]
struct Overview {
    name: String,
    stargazers: u64,
    forks: u64,
    languages: BTreeMap<String, Language>,
    repos: HashSet<String>,
    ignored_repos: HashSet<String>,
}

pub struct Stats<C> {
    username: String,
    api: C,
    filters: Filters,
    overview: OnceCell<Overview>,
    total_contributions: OnceCell<u64>,
    lines_changed: OnceCell<(u64, u64)>,
    views: OnceCell<u64>,
}

#[derive(Deserialize, Default)]
struct CountObj {
    #[serde(default, rename = "totalCount")]
    total_count: u64,
}

#[derive(Deserialize, Default)]
struct OverviewResponse {
    #[serde(default)]
    data: OverviewData,
}

#[derive(Deserialize, Default)]
struct OverviewData {
    viewer: Option<Viewer>,
}

#[derive(Deserialize, Default)]
struct Viewer {
    login: Option<String>,
    name: Option<String>,
    #[serde(default)]
    repositories: RepoPage,
    #[serde(default, rename = "repositoriesContributedTo")]
    contributed: RepoPage,
}

#[derive(Deserialize, Default)]
struct RepoPage {
    #[serde(default, rename = "pageInfo")]
    page_info: PageInfo,
    nodes: Option<Vec<RepoNode>>,
}

#[derive(Deserialize, Default)]
struct PageInfo {
    #[serde(default, rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Deserialize, Default)]
struct RepoNode {
    #[serde(rename = "nameWithOwner")]
    name_with_owner: Option<String>,
    #[serde(default)]
    stargazers: CountObj,
    #[serde(default, rename = "forkCount")]
    fork_count: u64,
    #[serde(default)]
    languages: LanguageConnection,
}

#[derive(Deserialize, Default)]
struct LanguageConnection {
    edges: Option<Vec<LanguageEdge>>,
}

#[derive(Deserialize, Default)]
struct LanguageEdge {
    #[serde(default)]
    size: u64,
    #[serde(default)]
    node: LanguageNode,
}

#[derive(Deserialize, Default)]
struct LanguageNode {
    name: Option<String>,
    color: Option<String>,
}

impl<C: GithubApi> Stats<C> {
    pub fn new(username: impl Into<String>, api: C, filters: Filters) -> Self {
        Self {
            username: username.into(),
            api,
            filters,
            overview: OnceCell::new(),
            total_contributions: OnceCell::new(),
            lines_changed: OnceCell::new(),
            views: OnceCell::new(),
        }
    }

    async fn overview(&self) -> Result<&Overview> {
        self.overview.get_or_try_init(|| self.refresh_overview()).await
    }

    /// Paginate through owned and contributed-to repositories, merging every
    /// page into one accumulator.
    async fn refresh_overview(&self) -> Result<Overview> {
        let mut overview = Overview::default();
        let mut owned_cursor: Option<String> = None;
        let mut contrib_cursor: Option<String> = None;

        loop {
            let raw = self
                .api
                .graphql(&queries::repos_overview(
                    owned_cursor.as_deref(),
                    contrib_cursor.as_deref(),
                ))
                .await?;
            let page: OverviewResponse = serde_json::from_value(raw)
                .context("failed to deserialize repository overview page")?;
            let Viewer {
                login,
                name,
                repositories: owned,
                contributed,
            } = page.data.viewer.unwrap_or_default();

            overview.name = name.or(login).unwrap_or_else(|| "No Name".to_string());

            let mut nodes = owned.nodes.unwrap_or_default();
            let contrib_nodes = contributed.nodes.unwrap_or_default();
            if self.filters.consider_forked_repos {
                nodes.extend(contrib_nodes);
            } else {
                for repo in &contrib_nodes {
                    let Some(name) = repo.name_with_owner.as_ref() else {
                        continue;
                    };
                    if overview.ignored_repos.contains(name)
                        || self.filters.exclude_repos.contains(name)
                    {
                        continue;
                    }
                    overview.ignored_repos.insert(name.clone());
                }
            }

            for repo in nodes {
                let Some(name) = repo.name_with_owner else {
                    continue;
                };
                if overview.repos.contains(&name) || self.filters.exclude_repos.contains(&name) {
                    continue;
                }
                overview.repos.insert(name);
                overview.stargazers += repo.stargazers.total_count;
                overview.forks += repo.fork_count;

                for edge in repo.languages.edges.unwrap_or_default() {
                    let lang = edge.node.name.unwrap_or_else(|| "Other".to_string());
                    if self.filters.exclude_langs.contains(&lang) {
                        continue;
                    }
                    let entry = overview.languages.entry(lang).or_default();
                    entry.size += edge.size;
                    entry.occurrences += 1;
                    if entry.color.is_none() {
                        entry.color = edge.node.color;
                    }
                }
            }

            if !owned.page_info.has_next_page && !contributed.page_info.has_next_page {
                break;
            }
            // Advance each cursor only while its own collection still pages.
            if owned.page_info.has_next_page {
                owned_cursor = owned.page_info.end_cursor;
            }
            if contributed.page_info.has_next_page {
                contrib_cursor = contributed.page_info.end_cursor;
            }
        }

        let total: u64 = overview.languages.values().map(|l| l.size).sum();
        if total > 0 {
            for lang in overview.languages.values_mut() {
                lang.prop = 100.0 * lang.size as f64 / total as f64;
            }
        }

        info!(
            repos = overview.repos.len(),
            ignored = overview.ignored_repos.len(),
            stargazers = overview.stargazers,
            "repository overview settled"
        );
        Ok(overview)
    }

    /// The user's display name, falling back to the login.
    pub async fn name(&self) -> Result<String> {
        Ok(self.overview().await?.name.clone())
    }

    /// Total stargazers across counted repositories.
    pub async fn stargazers(&self) -> Result<u64> {
        Ok(self.overview().await?.stargazers)
    }

    /// Total forks across counted repositories.
    pub async fn forks(&self) -> Result<u64> {
        Ok(self.overview().await?.forks)
    }

    /// Language totals keyed by language name.
    pub async fn languages(&self) -> Result<&BTreeMap<String, Language>> {
        Ok(&self.overview().await?.languages)
    }

    /// Language name to percentage of total bytes, for presentation.
    pub async fn languages_proportional(&self) -> Result<BTreeMap<String, f64>> {
        Ok(self
            .languages()
            .await?
            .iter()
            .map(|(name, lang)| (name.clone(), lang.prop))
            .collect())
    }

    /// Repositories counted towards stars, forks and languages.
    pub async fn repos(&self) -> Result<&HashSet<String>> {
        Ok(&self.overview().await?.repos)
    }

    /// Counted and ignored repositories together, for the statistics that
    /// look at contributions regardless of the fork policy.
    pub async fn all_repos(&self) -> Result<HashSet<String>> {
        let overview = self.overview().await?;
        Ok(overview
            .repos
            .union(&overview.ignored_repos)
            .cloned()
            .collect())
    }

    /// All-time contribution count, summed across every contribution year.
    pub async fn total_contributions(&self) -> Result<u64> {
        self.total_contributions
            .get_or_try_init(|| async {
                #[derive(Deserialize, Default)]
                struct YearsResponse {
                    #[serde(default)]
                    data: YearsData,
                }
                #[derive(Deserialize, Default)]
                struct YearsData {
                    viewer: Option<YearsViewer>,
                }
                #[derive(Deserialize, Default)]
                struct YearsViewer {
                    #[serde(default, rename = "contributionsCollection")]
                    contributions: ContributionYears,
                }
                #[derive(Deserialize, Default)]
                struct ContributionYears {
                    #[serde(default, rename = "contributionYears")]
                    contribution_years: Vec<i32>,
                }

                #[derive(Deserialize, Default)]
                struct YearBucket {
                    #[serde(default, rename = "contributionCalendar")]
                    calendar: Calendar,
                }
                #[derive(Deserialize, Default)]
                struct Calendar {
                    #[serde(default, rename = "totalContributions")]
                    total_contributions: u64,
                }

                let raw = self.api.graphql(&queries::contrib_years()).await?;
                let parsed: YearsResponse = serde_json::from_value(raw)
                    .context("failed to deserialize contribution years response")?;
                let years = parsed
                    .data
                    .viewer
                    .unwrap_or_default()
                    .contributions
                    .contribution_years;
                debug!(?years, "contribution years");

                let raw = self.api.graphql(&queries::all_contribs(&years)).await?;
                let viewer = raw.pointer("/data/viewer").cloned().unwrap_or_default();
                let by_year: BTreeMap<String, YearBucket> =
                    serde_json::from_value(viewer).unwrap_or_default();

                Ok(by_year
                    .values()
                    .map(|bucket| bucket.calendar.total_contributions)
                    .sum())
            })
            .await
            .copied()
    }

    /// Lines added and deleted by the user across counted and ignored
    /// repositories.
    pub async fn lines_changed(&self) -> Result<(u64, u64)> {
        self.lines_changed
            .get_or_try_init(|| async {
                let repos = self.all_repos().await?;
                let per_repo =
                    try_join_all(repos.iter().map(|repo| self.repo_line_counts(repo))).await?;

                let mut additions = 0u64;
                let mut deletions = 0u64;
                for (a, d) in per_repo {
                    additions += a;
                    deletions += d;
                }
                info!(additions, deletions, "lines changed settled");
                Ok((additions, deletions))
            })
            .await
            .copied()
    }

    async fn repo_line_counts(&self, repo: &str) -> Result<(u64, u64)> {
        #[derive(Deserialize)]
        struct Entry {
            author: Author,
            #[serde(default)]
            weeks: Vec<Week>,
        }
        #[derive(Deserialize)]
        struct Author {
            #[serde(default)]
            login: String,
        }
        #[derive(Deserialize, Default)]
        struct Week {
            #[serde(default)]
            a: u64,
            #[serde(default)]
            d: u64,
        }

        let body = self
            .api
            .rest(&format!("repos/{repo}/stats/contributors"), &[])
            .await?;
        let entries = body.as_array().cloned().unwrap_or_default();

        let mut additions = 0u64;
        let mut deletions = 0u64;
        for raw in entries {
            // Entries whose author is not an object are skipped, not fatal.
            let Ok(entry) = serde_json::from_value::<Entry>(raw) else {
                warn!(repo, "skipping malformed contributor entry");
                continue;
            };
            if entry.author.login != self.username {
                continue;
            }
            for week in entry.weeks {
                additions += week.a;
                deletions += week.d;
            }
        }
        Ok((additions, deletions))
    }

    /// Page views across counted repositories. The traffic API only reports
    /// the trailing 14 days, so this is not an all-time figure.
    pub async fn views(&self) -> Result<u64> {
        self.views
            .get_or_try_init(|| async {
                let repos = self.repos().await?;
                let counts =
                    try_join_all(repos.iter().map(|repo| self.repo_views(repo))).await?;
                Ok(counts.into_iter().sum())
            })
            .await
            .copied()
    }

    async fn repo_views(&self, repo: &str) -> Result<u64> {
        #[derive(Deserialize, Default)]
        struct Traffic {
            #[serde(default)]
            views: Vec<Day>,
        }
        #[derive(Deserialize, Default)]
        struct Day {
            #[serde(default)]
            count: u64,
        }

        let body = self
            .api
            .rest(&format!("repos/{repo}/traffic/views"), &[])
            .await?;
        let traffic: Traffic = serde_json::from_value(body).unwrap_or_default();
        Ok(traffic.views.iter().map(|day| day.count).sum())
    }

    /// Multi-line dump of every statistic, for logging.
    pub async fn summary(&self) -> Result<String> {
        let (additions, deletions) = self.lines_changed().await?;
        let mut out = String::new();
        writeln!(out, "Name: {}", self.name().await?)?;
        writeln!(out, "Stargazers: {}", self.stargazers().await?)?;
        writeln!(out, "Forks: {}", self.forks().await?)?;
        writeln!(
            out,
            "All-time contributions: {}",
            self.total_contributions().await?
        )?;
        writeln!(
            out,
            "Repositories with contributions: {}",
            self.all_repos().await?.len()
        )?;
        writeln!(out, "Lines of code added: {additions}")?;
        writeln!(out, "Lines of code deleted: {deletions}")?;
        writeln!(out, "Lines of code changed: {}", additions + deletions)?;
        writeln!(out, "Project page views: {}", self.views().await?)?;
        writeln!(out, "Languages:")?;
        for (name, prop) in self.languages_proportional().await? {
            writeln!(out, "  - {name}: {prop:.4}%")?;
        }
        Ok(out)
    }
}
