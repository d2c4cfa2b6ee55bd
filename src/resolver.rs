//! Maps KPI ids to their owning group.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::kpi::{known_group, KpiGroup, KpiInfo};
use crate::source::DataSource;

type Listing = Arc<Vec<String>>;

/// Resolves KPI groups from caller supplied metadata, falling back to the
/// remote per-group listings.
///
/// Listings are fetched at most once per group and kept until [`forget`] is
/// called. A listing that fails to load is retried on the next lookup.
///
/// [`forget`]: KpiGroupResolver::forget
pub struct KpiGroupResolver {
    source: Arc<dyn DataSource>,
    timeout: Duration,
    listings: Mutex<HashMap<KpiGroup, Arc<OnceCell<Listing>>>>,
}

impl KpiGroupResolver {
    pub fn new(source: Arc<dyn DataSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            listings: Mutex::new(HashMap::new()),
        }
    }

    /// Never fails: a KPI that no listing claims, or whose listings cannot be
    /// loaded, resolves to [`KpiGroup::FALLBACK`].
    pub async fn resolve(&self, kpi_id: &str, known: &[KpiInfo]) -> KpiGroup {
        if let Some(group) = known_group(kpi_id, known) {
            return group;
        }

        for group in KpiGroup::CANDIDATES {
            match self.listing(group).await {
                Ok(names) if names.iter().any(|n| n == kpi_id) => {
                    debug!("resolved {kpi_id} to group {group} from remote listing");
                    return group;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("unable to load {group} kpi listing while resolving {kpi_id}: {e}");
                }
            }
        }

        warn!(
            "kpi {kpi_id} not found in any group, defaulting to {}",
            KpiGroup::FALLBACK
        );
        KpiGroup::FALLBACK
    }

    /// Metadata for every KPI in every group. Unlike [`resolve`] this reports
    /// listing failures.
    ///
    /// [`resolve`]: KpiGroupResolver::resolve
    pub async fn all_kpi_info(&self) -> Result<Vec<KpiInfo>, FetchError> {
        let (os, jobs) = tokio::try_join!(
            self.listing(KpiGroup::Os),
            self.listing(KpiGroup::Jobs)
        )?;

        Ok(os
            .iter()
            .map(|name| KpiInfo::new(name.clone(), KpiGroup::Os))
            .chain(
                jobs.iter()
                    .map(|name| KpiInfo::new(name.clone(), KpiGroup::Jobs)),
            )
            .collect())
    }

    /// Drop every memoized listing.
    pub fn forget(&self) {
        self.listings.lock().clear();
    }

    async fn listing(&self, group: KpiGroup) -> Result<Listing, FetchError> {
        let cell = self.listings.lock().entry(group).or_default().clone();

        cell.get_or_try_init(|| async {
            let names = tokio::time::timeout(self.timeout, self.source.kpi_names(group))
                .await
                .map_err(|_| FetchError::Timeout {
                    kpi: format!("{} listing", group.listing_name()),
                    timeout: self.timeout,
                })??;
            debug!("loaded {} kpis for group {group}", names.len());
            Ok::<_, FetchError>(Arc::new(names))
        })
        .await
        .cloned()
    }
}
