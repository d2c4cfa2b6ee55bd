//! The remote data source: templates, KPI listings and KPI time series.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::kpi::{KpiGroup, KpiRecord};

mod http;
#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpSource;

/// Parameters of a single KPI series request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesQuery {
    pub kpi_name: String,
    pub group: KpiGroup,
    pub from: String,
    pub to: String,
    pub aggregation: String,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Templates saved by a user.
    async fn templates(&self, user_id: &str) -> Result<Vec<TemplateSummary>, SourceError>;

    /// Full definition of one template, if it exists.
    async fn template_detail(
        &self,
        template_id: &str,
    ) -> Result<Option<TemplateDetail>, SourceError>;

    /// Names of every KPI in a group.
    async fn kpi_names(&self, group: KpiGroup) -> Result<Vec<String>, SourceError>;

    async fn kpi_series(&self, query: &SeriesQuery) -> Result<Vec<KpiRecord>, SourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemRef {
    pub system_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiRef {
    pub kpi_id: String,
}

/// One chart within a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub graph_id: String,
    pub graph_name: String,
    #[serde(default)]
    pub top_xy_pos: String,
    #[serde(default)]
    pub bottom_xy_pos: String,
    pub primary_kpi_id: String,
    #[serde(default)]
    pub secondary_kpis: Vec<KpiRef>,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub resolution: String,
    pub graph_type: ChartType,
}

impl Graph {
    /// The primary KPI followed by the secondary KPIs, without duplicates.
    pub fn kpi_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(1 + self.secondary_kpis.len());
        for id in std::iter::once(&self.primary_kpi_id)
            .chain(self.secondary_kpis.iter().map(|k| &k.kpi_id))
        {
            if !id.is_empty() && !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDetail {
    #[serde(default)]
    pub user_id: String,
    pub template_id: String,
    pub template_name: String,
    #[serde(default)]
    pub template_desc: String,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub systems: Vec<SystemRef>,
    #[serde(default)]
    pub graphs: Vec<Graph>,
}
