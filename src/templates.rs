//! Saved dashboard templates and the charts they describe.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::coordinator::FetchRequest;
use crate::error::{FetchError, TemplateError};
use crate::kpi::{KpiInfo, RequestedRange};
use crate::resolver::KpiGroupResolver;
use crate::source::{DataSource, TemplateDetail, TemplateSummary};

/// Summary figures for a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateStats {
    pub graphs: usize,
    pub systems: usize,
    pub frequency: String,
    pub resolution: String,
}

pub struct TemplateCatalog {
    source: Arc<dyn DataSource>,
    resolver: Arc<KpiGroupResolver>,
    user_id: String,
    state: RwLock<State>,
    kpi_info: OnceCell<Arc<[KpiInfo]>>,
}

#[derive(Default)]
struct State {
    templates: Vec<TemplateSummary>,
    selected: Option<String>,
    details: HashMap<String, Arc<TemplateDetail>>,
}

impl TemplateCatalog {
    pub fn new(
        source: Arc<dyn DataSource>,
        resolver: Arc<KpiGroupResolver>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            source,
            resolver,
            user_id: user_id.into(),
            state: RwLock::new(State::default()),
            kpi_info: OnceCell::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Reload the user's template list. Cached details are kept.
    pub async fn refresh_templates(&self) -> Result<Vec<TemplateSummary>, TemplateError> {
        let templates = self.source.templates(&self.user_id).await?;
        debug!(
            "loaded {} templates for user {}",
            templates.len(),
            self.user_id
        );

        let mut state = self.state.write();
        if let Some(selected) = &state.selected {
            if !templates.iter().any(|t| &t.id == selected) {
                warn!("selected template {selected} no longer exists");
                state.selected = None;
            }
        }
        state.templates = templates.clone();
        Ok(templates)
    }

    pub fn templates(&self) -> Vec<TemplateSummary> {
        self.state.read().templates.clone()
    }

    /// Select a template from the loaded list.
    pub fn select(&self, template_id: &str) -> Result<(), TemplateError> {
        let mut state = self.state.write();
        if !state.templates.iter().any(|t| t.id == template_id) {
            return Err(TemplateError::NotFound(template_id.to_string()));
        }
        state.selected = Some(template_id.to_string());
        Ok(())
    }

    /// The explicitly selected template, else the user's default, else the
    /// first one listed.
    pub fn selected(&self) -> Option<TemplateSummary> {
        let state = self.state.read();

        state
            .selected
            .as_ref()
            .and_then(|id| state.templates.iter().find(|t| &t.id == id))
            .or_else(|| state.templates.iter().find(|t| t.is_default))
            .or_else(|| state.templates.first())
            .cloned()
    }

    /// Template definition, fetched on first use.
    pub async fn detail(&self, template_id: &str) -> Result<Arc<TemplateDetail>, TemplateError> {
        if let Some(detail) = self.state.read().details.get(template_id) {
            return Ok(detail.clone());
        }

        let detail = self
            .source
            .template_detail(template_id)
            .await?
            .ok_or_else(|| TemplateError::NotFound(template_id.to_string()))?;
        let detail = Arc::new(detail);

        self.state
            .write()
            .details
            .insert(template_id.to_string(), detail.clone());
        Ok(detail)
    }

    /// Group metadata for every KPI, loaded once.
    pub async fn kpi_info(&self) -> Result<Arc<[KpiInfo]>, FetchError> {
        self.kpi_info
            .get_or_try_init(|| async {
                let info = self.resolver.all_kpi_info().await?;
                debug!("loaded group metadata for {} kpis", info.len());
                Ok::<_, FetchError>(Arc::from(info))
            })
            .await
            .cloned()
    }

    pub async fn stats(&self, template_id: &str) -> Result<TemplateStats, TemplateError> {
        let detail = self.detail(template_id).await?;
        Ok(TemplateStats {
            graphs: detail.graphs.len(),
            systems: detail.systems.len(),
            frequency: detail.frequency.clone(),
            resolution: detail.resolution.clone(),
        })
    }

    /// One fetch per graph, keyed by graph id. Graphs without KPIs are
    /// skipped.
    pub fn chart_requests(
        detail: &TemplateDetail,
        kpi_info: Arc<[KpiInfo]>,
        range: Option<RequestedRange>,
        aggregation: Option<String>,
    ) -> Vec<FetchRequest> {
        detail
            .graphs
            .iter()
            .filter_map(|graph| {
                let kpi_ids = graph.kpi_ids();
                if kpi_ids.is_empty() {
                    warn!("graph {} has no kpis", graph.graph_id);
                    return None;
                }

                Some(
                    FetchRequest::new(graph.graph_id.clone(), kpi_ids)
                        .kpi_info(kpi_info.clone())
                        .range(range.clone())
                        .aggregation(aggregation.clone()),
                )
            })
            .collect()
    }
}
