//! GraphQL query text builders.
//!
//! The queries are fixed, hand-built strings; nothing here talks to the
//! network. Cursors are opaque tokens handed back by the API and are
//! interpolated as quoted strings (or `null` on the first page).

/// Render an optional pagination cursor as a GraphQL argument value.
fn cursor_arg(cursor: Option<&str>) -> String {
    cursor
        .map(|c| format!("\"{c}\""))
        .unwrap_or_else(|| "null".to_string())
}

/// Overview of the viewer's repositories, both owned (non-fork) and
/// contributed-to, one page of up to 100 each with stargazers, forks and the
/// top 10 languages by size.
pub fn repos_overview(owned_cursor: Option<&str>, contrib_cursor: Option<&str>) -> String {
    format!(
        r#"{{
  viewer {{
    login
    name
    repositories(
        first: 100,
        orderBy: {{field: UPDATED_AT, direction: DESC}},
        isFork: false,
        after: {owned}
    ) {{
      pageInfo {{
        hasNextPage
        endCursor
      }}
      nodes {{
        nameWithOwner
        stargazers {{
          totalCount
        }}
        forkCount
        languages(first: 10, orderBy: {{field: SIZE, direction: DESC}}) {{
          edges {{
            size
            node {{
              name
              color
            }}
          }}
        }}
      }}
    }}
    repositoriesContributedTo(
        first: 100,
        includeUserRepositories: false,
        orderBy: {{field: UPDATED_AT, direction: DESC}},
        contributionTypes: [COMMIT, PULL_REQUEST, REPOSITORY, PULL_REQUEST_REVIEW],
        after: {contrib}
    ) {{
      pageInfo {{
        hasNextPage
        endCursor
      }}
      nodes {{
        nameWithOwner
        stargazers {{
          totalCount
        }}
        forkCount
        languages(first: 10, orderBy: {{field: SIZE, direction: DESC}}) {{
          edges {{
            size
            node {{
              name
              color
            }}
          }}
        }}
      }}
    }}
  }}
}}
"#,
        owned = cursor_arg(owned_cursor),
        contrib = cursor_arg(contrib_cursor),
    )
}

/// Every year in which the viewer has made a contribution.
pub fn contrib_years() -> String {
    r#"query {
  viewer {
    contributionsCollection {
      contributionYears
    }
  }
}
"#
    .to_string()
}

/// Fragment requesting the viewer's total contributions within one calendar
/// year, aliased so multiple years can share a single document.
pub fn contribs_by_year(year: i32) -> String {
    format!(
        r#"    year{year}: contributionsCollection(
        from: "{year}-01-01T00:00:00Z",
        to: "{next}-01-01T00:00:00Z"
    ) {{
      contributionCalendar {{
        totalContributions
      }}
    }}
"#,
        next = year + 1,
    )
}

/// One document covering every contribution year, avoiding a round trip per
/// year.
pub fn all_contribs(years: &[i32]) -> String {
    let by_year: String = years.iter().map(|y| contribs_by_year(*y)).collect();
    format!(
        r#"query {{
  viewer {{
{by_year}  }}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overview_without_cursors_uses_null() {
        let q = repos_overview(None, None);
        assert_eq!(q.matches("after: null").count(), 2);
        assert!(q.contains("isFork: false"));
        assert!(q.contains("repositoriesContributedTo"));
    }

    #[test]
    fn overview_interpolates_cursors_quoted() {
        let q = repos_overview(Some("abc"), Some("def"));
        assert!(q.contains("after: \"abc\""));
        assert!(q.contains("after: \"def\""));
        assert!(!q.contains("after: null"));
    }

    #[test]
    fn contrib_years_requests_contribution_years() {
        assert!(contrib_years().contains("contributionYears"));
    }

    #[test]
    fn year_fragment_covers_the_calendar_year() {
        let q = contribs_by_year(2023);
        assert!(q.contains("year2023:"));
        assert!(q.contains("from: \"2023-01-01T00:00:00Z\""));
        assert!(q.contains("to: \"2024-01-01T00:00:00Z\""));
    }

    #[test]
    fn all_contribs_aliases_every_year() {
        let q = all_contribs(&[2021, 2022, 2023]);
        for year in ["year2021:", "year2022:", "year2023:"] {
            assert!(q.contains(year), "missing alias {year}");
        }
        assert!(q.starts_with("query {"));
    }
}
