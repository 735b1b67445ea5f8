//! Cached tour catalogue with text and duration filtering.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::{
    api::{ApiError, TourApi},
    models::{RecordId, TourListing},
};

/// Duration ranges offered as a catalogue filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationBucket {
    #[default]
    All,
    UnderFive,
    FiveToTen,
    OverTen,
}

impl DurationBucket {
    pub const ALL: [DurationBucket; 4] = [
        DurationBucket::All,
        DurationBucket::UnderFive,
        DurationBucket::FiveToTen,
        DurationBucket::OverTen,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::UnderFive => "Under 5 Days",
            Self::FiveToTen => "5-10 Days",
            Self::OverTen => "10+ Days",
        }
    }

    /// Tours with an unknown or zero duration count as one-day tours.
    pub fn contains(&self, days: Option<u32>) -> bool {
        let days = days.filter(|days| *days > 0).unwrap_or(1);
        match self {
            Self::All => true,
            Self::UnderFive => days < 5,
            Self::FiveToTen => (5..=10).contains(&days),
            Self::OverTen => days > 10,
        }
    }

    /// Next filter in display order, wrapping around.
    pub fn cycle(&self) -> Self {
        let index = Self::ALL.iter().position(|bucket| bucket == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for DurationBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Thread-safe cache of the public tour listing.
#[derive(Clone, Default)]
pub struct TourCatalog {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    tours: Vec<TourListing>,
    fetched_at: Option<DateTime<Utc>>,
}

impl TourCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload the listing. On failure the previous listing is kept.
    pub async fn refresh(&self, api: &dyn TourApi) -> Result<usize, ApiError> {
        let tours = api.list_tours().await.map_err(|err| {
            warn!(%err, "failed to fetch tours");
            err
        })?;
        let count = tours.len();
        self.replace(tours);
        info!(count, "tour catalogue refreshed");
        Ok(count)
    }

    /// Install an already fetched listing.
    pub fn replace(&self, tours: Vec<TourListing>) {
        let mut inner = self.inner.write();
        inner.tours = tours;
        inner.fetched_at = Some(Utc::now());
    }

    pub fn tours(&self) -> Vec<TourListing> {
        self.inner.read().tours.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read().fetched_at.is_some()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().fetched_at
    }

    pub fn get(&self, id: &RecordId) -> Option<TourListing> {
        self.inner
            .read()
            .tours
            .iter()
            .find(|tour| &tour.id == id)
            .cloned()
    }

    /// Filter tours using a case-insensitive substring search over title,
    /// destination and description, restricted to `bucket`.
    pub fn matching(&self, query: &str, bucket: DurationBucket) -> Vec<TourListing> {
        let needle = query.trim().to_lowercase();
        let inner = self.inner.read();
        inner
            .tours
            .iter()
            .filter(|tour| bucket.contains(tour.duration_days))
            .filter(|tour| {
                needle.is_empty()
                    || tour.title.to_lowercase().contains(&needle)
                    || tour.destination().to_lowercase().contains(&needle)
                    || tour
                        .description
                        .as_ref()
                        .map(|value| value.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}
