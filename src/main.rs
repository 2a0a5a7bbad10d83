use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use homedir::my_home;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod ids;
mod images;
mod matching;
mod reports;
mod storage;
mod store;
#[cfg(test)]
mod tests;

use cli::MatchesAction;
use config::Config;
use ids::MatchId;
use matching::{MatchCandidate, MatchingService, Persistence};
use reports::{Report, ReportKind};
use store::{CsvMatchStore, MatchStatus, MatchStore, StoredMatch};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn base_path() -> anyhow::Result<String> {
    if let Ok(base_path) = std::env::var("LOSTFOUND_BASE_PATH") {
        return Ok(base_path);
    }

    let home = my_home()
        .context("Could not determine home directory")?
        .ok_or_else(|| anyhow!("Home directory path is empty"))?;
    Ok(format!("{}/.local/share/lostfound", home.to_string_lossy()))
}

fn open_store(config: &Config) -> anyhow::Result<CsvMatchStore> {
    let storage = storage::BackendLocal::new(config.base_path())
        .context("failed to open storage directory")?;
    let store = CsvMatchStore::load(Arc::new(storage), &config.store_file)
        .with_context(|| format!("failed to load {}", config.store_file))?;
    Ok(store)
}

fn parse_match_id(id: &str) -> anyhow::Result<MatchId> {
    id.parse::<MatchId>()
        .map_err(|err| anyhow!("invalid match id '{id}': {err}"))
}

/// Load a mixed file or a pair of lost/found files.
fn load_collections(
    reports: Option<&Path>,
    lost: Option<&Path>,
    found: Option<&Path>,
) -> anyhow::Result<(Vec<Report>, Vec<Report>)> {
    match (reports, lost, found) {
        (Some(path), _, _) => Ok(reports::partition(reports::load_reports(path, None)?)),
        (None, Some(lost), Some(found)) => Ok((
            reports::load_reports(lost, Some(ReportKind::Lost))?,
            reports::load_reports(found, Some(ReportKind::Found))?,
        )),
        _ => bail!("either --reports or both --lost and --found are required"),
    }
}

fn strip_images(reports: &mut [Report]) {
    for report in reports {
        report.image_url = None;
    }
}

fn progress_bar() -> ProgressBar {
    let style = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} pairs ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    ProgressBar::new(0).with_style(style)
}

fn print_candidates(candidates: &[MatchCandidate]) {
    if candidates.is_empty() {
        println!("No matches found");
        return;
    }

    for c in candidates {
        let marker = if c.degraded { " (text only)" } else { "" };
        println!(
            "{:.3}  text {:.3}  image {:.3}  lost #{} {:?} -> found #{} {:?}{marker}",
            c.similarity.score,
            c.similarity.text_score,
            c.similarity.image_score,
            c.lost_report.id,
            c.lost_report.title,
            c.found_report.id,
            c.found_report.title,
        );
    }
}

fn print_stored(matches: &[StoredMatch]) {
    for m in matches {
        println!(
            "{}  {:<9}  {:.3}  lost #{} -> found #{}  {}",
            m.id,
            m.status,
            m.confidence,
            m.lost_item_id,
            m.found_item_id,
            m.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = cli::Args::parse();

    let base_path = base_path()?;
    let mut config = Config::load_with(&base_path).context("failed to load config")?;

    match args.command {
        cli::Command::Match {
            reports,
            lost,
            found,
            threshold,
            no_images,
            no_save,
            json,
        } => {
            let threshold = threshold.unwrap_or(config.matching.threshold);
            if !(0.0..=1.0).contains(&threshold) {
                bail!("threshold must be between 0.0 and 1.0, got {threshold}");
            }

            let (mut lost, mut found) =
                load_collections(reports.as_deref(), lost.as_deref(), found.as_deref())?;
            if no_images {
                config.classifier.enabled = false;
                strip_images(&mut lost);
                strip_images(&mut found);
            }

            let store = if no_save {
                None
            } else {
                Some(open_store(&config)?)
            };

            let _span =
                tracing::info_span!("match", lost = lost.len(), found = found.len()).entered();

            let service = MatchingService::new(config);
            let progress = if json { None } else { Some(progress_bar()) };
            let outcome = service
                .search(
                    &lost,
                    &found,
                    threshold,
                    store.as_ref().map(|s| s as &dyn MatchStore),
                    progress,
                )
                .context("image classifier is not available")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.candidates)?);
            } else {
                print_candidates(&outcome.candidates);
            }

            match outcome.persistence {
                Persistence::Stored(stored) => {
                    log::info!("{} pending match(es) saved", stored.len())
                }
                Persistence::Failed(err) => log::error!("matches were not saved: {err}"),
                Persistence::NothingToStore | Persistence::NotRequested => {}
            }

            Ok(())
        }

        cli::Command::Compare {
            reports: path,
            lost_id,
            found_id,
            no_images,
        } => {
            let (lost, found) = reports::partition(reports::load_reports(&path, None)?);
            let mut lost = lost
                .into_iter()
                .find(|r| r.id == lost_id)
                .ok_or_else(|| anyhow!("no lost report with id {lost_id}"))?;
            let mut found = found
                .into_iter()
                .find(|r| r.id == found_id)
                .ok_or_else(|| anyhow!("no found report with id {found_id}"))?;

            if no_images {
                config.classifier.enabled = false;
                lost.image_url = None;
                found.image_url = None;
            }

            let service = MatchingService::new(config);
            let outcome = service
                .compare(&lost, &found)
                .context("image classifier is not available")?;

            if let matching::PairOutcome::Degraded { cause, .. } = &outcome {
                log::warn!("scored on text only: {cause}");
            }
            println!("{}", serde_json::to_string_pretty(&outcome.similarity())?);
            Ok(())
        }

        cli::Command::Text { text1, text2 } => {
            let service = MatchingService::new(config);
            let breakdown = service.comparator().breakdown(&text1, &text2);
            println!("{}", serde_json::to_string_pretty(&breakdown)?);
            Ok(())
        }

        cli::Command::Classify { image } => {
            let service = MatchingService::new(config);
            let classifier = service
                .classifier()?
                .ok_or_else(|| anyhow!("image classification is disabled in config.yaml"))?;
            let predictions = classifier.classify(&image)?;
            println!("{}", serde_json::to_string_pretty(&predictions)?);
            Ok(())
        }

        cli::Command::Matches { action } => {
            let store = open_store(&config)?;
            match action {
                MatchesAction::List { status, json } => {
                    let matches = store.list(status)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&matches)?);
                    } else if matches.is_empty() {
                        println!("No matches");
                    } else {
                        print_stored(&matches);
                    }
                }
                MatchesAction::Confirm { id } => {
                    let updated = store.set_status(&parse_match_id(&id)?, MatchStatus::Confirmed)?;
                    print_stored(&[updated]);
                }
                MatchesAction::Reject { id } => {
                    let updated = store.set_status(&parse_match_id(&id)?, MatchStatus::Rejected)?;
                    print_stored(&[updated]);
                }
                MatchesAction::Delete { id } => {
                    let removed = store.delete(&parse_match_id(&id)?)?;
                    println!("Match {} removed", removed.id);
                }
            }
            Ok(())
        }
    }
}
