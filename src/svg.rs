//! Badge rendering by template substitution.
//!
//! Two badges are produced: an overview card with the headline numbers and a
//! languages card with a stacked progress bar plus a per-language list. The
//! templates are embedded at compile time and filled in with plain string
//! replacement.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::api::GithubApi;
use crate::stats::{Language, Stats};

const OVERVIEW_TEMPLATE: &str = include_str!("../templates/overview.svg");
const LANGUAGES_TEMPLATE: &str = include_str!("../templates/languages.svg");

const OUTPUT_FOLDER: &str = "generated";
const DELAY_BETWEEN_MS: usize = 150;
const FALLBACK_COLOR: &str = "#000000";

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Thousands separators, e.g. 1234567 -> "1,234,567".
fn with_commas(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Render the overview badge.
pub async fn generate_overview<C: GithubApi>(stats: &Stats<C>) -> Result<String> {
    let (additions, deletions) = stats.lines_changed().await?;
    let output = OVERVIEW_TEMPLATE
        .replace("{{ name }}", &escape_xml(&stats.name().await?))
        .replace("{{ stars }}", &with_commas(stats.stargazers().await?))
        .replace("{{ forks }}", &with_commas(stats.forks().await?))
        .replace(
            "{{ contributions }}",
            &with_commas(stats.total_contributions().await?),
        )
        .replace("{{ lines_changed }}", &with_commas(additions + deletions))
        .replace("{{ views }}", &with_commas(stats.views().await?))
        .replace(
            "{{ repos }}",
            &with_commas(stats.all_repos().await?.len() as u64),
        );
    Ok(output)
}

/// Render the languages badge.
pub async fn generate_languages<C: GithubApi>(stats: &Stats<C>) -> Result<String> {
    let languages = stats.languages().await?;
    let mut sorted: Vec<(&String, &Language)> = languages.iter().collect();
    sorted.sort_by(|a, b| b.1.size.cmp(&a.1.size));

    let (progress, lang_list) = language_markup(&sorted);
    Ok(LANGUAGES_TEMPLATE
        .replace("{{ progress }}", &progress)
        .replace("{{ lang_list }}", &lang_list))
}

/// Build the progress-bar spans and the language list items for the
/// languages badge, in descending size order.
fn language_markup(sorted: &[(&String, &Language)]) -> (String, String) {
    let mut progress = String::new();
    let mut lang_list = String::new();

    for (i, (name, lang)) in sorted.iter().enumerate() {
        let color = lang.color.as_deref().unwrap_or(FALLBACK_COLOR);
        // A sliver of margin keeps adjacent segments readable; the last
        // segment fills to the edge.
        let (width_ratio, margin_ratio) = if i == sorted.len() - 1 {
            (1.0, 0.0)
        } else if lang.prop > 50.0 {
            (0.99, 0.01)
        } else {
            (0.98, 0.02)
        };

        progress.push_str(&format!(
            "<span style=\"background-color: {color};\
width: {:.3}%;margin-right: {:.3}%;\" class=\"progress-item\"></span>",
            width_ratio * lang.prop,
            margin_ratio * lang.prop,
        ));
        lang_list.push_str(&format!(
            r#"<li style="animation-delay: {delay}ms;">
<svg xmlns="http://www.w3.org/2000/svg" class="octicon" style="fill:{color};"
viewBox="0 0 16 16" version="1.1" width="16" height="16"><path
fill-rule="evenodd" d="M8 4a4 4 0 100 8 4 4 0 000-8z"></path></svg>
<span class="lang">{name}</span>
<span class="percent">{prop:.2}%</span>
</li>
"#,
            delay = i * DELAY_BETWEEN_MS,
            name = escape_xml(name),
            prop = lang.prop,
        ));
    }

    (progress, lang_list)
}

/// Write one badge into the output folder, creating it if needed.
pub fn write_badge(name: &str, contents: &str) -> Result<()> {
    let folder = Path::new(OUTPUT_FOLDER);
    fs::create_dir_all(folder)
        .with_context(|| format!("failed to create output folder {OUTPUT_FOLDER}"))?;
    let path = folder.join(name);
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    info!(badge = name, "badge written");
    Ok(())
}
