use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::CatalogStore;
use crate::error::{AppError, Result};
use crate::feed::{normalize_posts, ReleaseSource};
use crate::models::{Cover, Release, ReleaseType};
use crate::services::CoverLookup;

const FIRST_MONTH: u32 = 1;
const LAST_MONTH: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub year: i32,
    pub fetched: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub artists_created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub candidates: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub failed: usize,
}

enum SweepOutcome {
    Resolved,
    NotFound,
    Failed,
}

#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    pub years: Vec<i32>,
    pub refresh_interval: Duration,
    pub startup_delay: Duration,
    pub cover_size: u32,
}

impl From<&Config> for UpdaterSettings {
    fn from(config: &Config) -> Self {
        Self {
            years: config.years.clone(),
            refresh_interval: config.refresh_interval(),
            startup_delay: config.startup_delay(),
            cover_size: config.cover_size,
        }
    }
}

/// Periodic catalog sync: fetch every configured year, persist new releases,
/// then fill in missing covers.
pub struct Updater {
    source: Arc<dyn ReleaseSource>,
    store: Arc<dyn CatalogStore>,
    covers: Arc<dyn CoverLookup>,
    settings: UpdaterSettings,
}

impl Updater {
    pub fn new(
        source: Arc<dyn ReleaseSource>,
        store: Arc<dyn CatalogStore>,
        covers: Arc<dyn CoverLookup>,
        settings: UpdaterSettings,
    ) -> Self {
        Self {
            source,
            store,
            covers,
            settings,
        }
    }

    /// Start-up delay, one cycle, then one cycle per interval until `cancel`
    /// fires. A running cycle is never interrupted.
    pub async fn run(&self, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {
                self.source.close().await;
                return;
            }
            _ = tokio::time::sleep(self.settings.startup_delay) => {}
        }

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.refresh_interval) => {}
            }
        }

        tracing::info!("Updater stopped");
        self.source.close().await;
    }

    /// One pass over every configured year. Failed years are logged and do not
    /// stop the remaining ones.
    pub async fn run_cycle(&self) -> Vec<IngestReport> {
        tracing::info!("Catalog refresh started for {:?}", self.settings.years);
        let mut reports = Vec::with_capacity(self.settings.years.len());

        for &year in &self.settings.years {
            match self.refresh_year(year).await {
                Ok(report) => {
                    tracing::info!(
                        "Year {}: {} fetched, {} new, {} already known, {} new artists",
                        report.year,
                        report.fetched,
                        report.inserted,
                        report.skipped,
                        report.artists_created
                    );
                    reports.push(report);
                }
                Err(e) => {
                    tracing::error!("Refresh of {} aborted: {}", year, e);
                    continue;
                }
            }

            match self.sweep_covers().await {
                Ok(sweep) => tracing::info!(
                    "Cover sweep: {} candidates, {} resolved, {} not found, {} failed",
                    sweep.candidates,
                    sweep.resolved,
                    sweep.not_found,
                    sweep.failed
                ),
                Err(e) => tracing::error!("Cover sweep failed: {}", e),
            }
        }

        reports
    }

    /// Fetch and persist one year. Nothing is written unless both the album
    /// and single listings were fetched completely.
    pub async fn refresh_year(&self, year: i32) -> Result<IngestReport> {
        let releases = self.fetch_year(year).await?;
        self.store_releases(year, releases).await
    }

    async fn fetch_year(&self, year: i32) -> Result<Vec<Release>> {
        let buffer = Mutex::new(Vec::new());

        let albums = async {
            for month in FIRST_MONTH..=LAST_MONTH {
                let posts = self.source.fetch_release_posts(year, month).await?;
                buffer
                    .lock()
                    .await
                    .extend(normalize_posts(&posts, ReleaseType::Album));
            }
            Ok::<_, AppError>(())
        };

        let singles = async {
            let posts = self.source.fetch_single_posts(year).await?;
            buffer
                .lock()
                .await
                .extend(normalize_posts(&posts, ReleaseType::Single));
            Ok::<_, AppError>(())
        };

        let (albums, singles) = tokio::join!(albums, singles);
        albums?;
        singles?;

        Ok(buffer.into_inner())
    }

    async fn store_releases(&self, year: i32, releases: Vec<Release>) -> Result<IngestReport> {
        let mut report = IngestReport {
            year,
            fetched: releases.len(),
            ..Default::default()
        };

        let mut artist_ids: HashMap<String, i64> = HashMap::new();
        let mut by_artist: BTreeMap<i64, Vec<Release>> = BTreeMap::new();

        for release in releases {
            let artist_id = match artist_ids.get(&release.artist.name) {
                Some(&id) => id,
                None => {
                    let (id, created) = self.resolve_artist(&release.artist.name).await?;
                    if created {
                        report.artists_created += 1;
                    }
                    artist_ids.insert(release.artist.name.clone(), id);
                    id
                }
            };
            by_artist.entry(artist_id).or_default().push(release);
        }

        for (artist_id, releases) in by_artist {
            for release in releases {
                match self.store.add_release(&release, artist_id).await {
                    Ok(_) => report.inserted += 1,
                    Err(e) if e.is_duplicate() => {
                        tracing::debug!("Skipping {}: {}", release, e);
                        report.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(report)
    }

    /// Existing artist id, or a freshly created one. A concurrent creator
    /// winning the insert is resolved by reading the row back.
    async fn resolve_artist(&self, name: &str) -> Result<(i64, bool)> {
        if let Some(artist) = self.store.get_artist_by_name(name).await? {
            return Ok((artist.id, false));
        }

        match self.store.add_artist(name).await {
            Ok(id) => Ok((id, true)),
            Err(AppError::ArtistExists(_)) => self
                .store
                .get_artist_by_name(name)
                .await?
                .map(|artist| (artist.id, false))
                .ok_or_else(|| AppError::not_found(format!("artist {name}"))),
            Err(e) => Err(e),
        }
    }

    /// Look up a cover for every release that has none. Lookups run
    /// concurrently; a miss or a failure leaves the release for the next sweep.
    pub async fn sweep_covers(&self) -> Result<SweepReport> {
        let candidates = match self.store.releases_missing_cover().await {
            Ok(releases) => releases,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };

        let outcomes = join_all(candidates.iter().map(|release| self.resolve_cover(release))).await;

        let mut report = SweepReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                SweepOutcome::Resolved => report.resolved += 1,
                SweepOutcome::NotFound => report.not_found += 1,
                SweepOutcome::Failed => report.failed += 1,
            }
        }
        Ok(report)
    }

    async fn resolve_cover(&self, release: &Release) -> SweepOutcome {
        let query = release.cover_query();
        let cover = match self.covers.lookup_cover(&query, self.settings.cover_size).await {
            Ok(cover) => cover,
            Err(e) => {
                tracing::warn!("Cover lookup for {:?} failed: {}", query, e);
                return SweepOutcome::Failed;
            }
        };

        match cover {
            Cover::Found(url) => match self.store.update_release_cover(release.id, &url).await {
                Ok(()) => SweepOutcome::Resolved,
                Err(e) => {
                    tracing::warn!("Failed to store cover for release {}: {}", release.id, e);
                    SweepOutcome::Failed
                }
            },
            Cover::NotFound => {
                tracing::debug!("No cover for {}", release);
                SweepOutcome::NotFound
            }
        }
    }
}
