use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::*;

/// [`DataSource`] backed by the dashboard REST API.
pub struct HttpSource {
    client: Client,
    base: Url,
}

impl HttpSource {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, SourceError> {
        // a trailing slash keeps any path prefix when joining endpoints
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        let base = Url::parse(&base).map_err(|e| SourceError::Url(format!("{base}: {e}")))?;

        let client = Client::builder()
            .http1_only()
            .timeout(timeout)
            .build()
            .map_err(|source| SourceError::Transport {
                endpoint: "client",
                source,
            })?;

        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, SourceError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| SourceError::Url(format!("{path}: {e}")))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: Url,
    ) -> Result<T, SourceError> {
        debug!("GET {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SourceError::Transport { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status { endpoint, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| SourceError::Transport { endpoint, source })?;

        serde_json::from_slice(&body).map_err(|source| SourceError::Decode { endpoint, source })
    }
}

/// Template listing rows arrive column-wise, one single-element array per
/// field.
#[derive(Deserialize)]
struct TemplateRow {
    #[serde(default)]
    template_id: Vec<String>,
    #[serde(default)]
    template_name: Vec<String>,
    #[serde(default)]
    template_desc: Vec<String>,
    #[serde(default)]
    default: Vec<bool>,
    #[serde(default)]
    favorite: Vec<bool>,
}

impl TemplateRow {
    fn into_summary(self) -> Option<TemplateSummary> {
        let id = self.template_id.into_iter().next()?;
        Some(TemplateSummary {
            name: self.template_name.into_iter().next().unwrap_or_else(|| id.clone()),
            id,
            description: self.template_desc.into_iter().next().unwrap_or_default(),
            is_default: self.default.first().copied().unwrap_or(false),
            is_favorite: self.favorite.first().copied().unwrap_or(false),
        })
    }
}

#[derive(Deserialize)]
struct KpiRow {
    kpi_name: String,
}

#[async_trait]
impl DataSource for HttpSource {
    async fn templates(&self, user_id: &str) -> Result<Vec<TemplateSummary>, SourceError> {
        let url = self.url("api/utl", &[("userId", user_id)])?;
        let rows: Vec<TemplateRow> = self.get_json("templates", url).await?;

        let total = rows.len();
        let templates: Vec<TemplateSummary> =
            rows.into_iter().filter_map(TemplateRow::into_summary).collect();
        if templates.len() < total {
            warn!(
                "skipped {} template rows without an id",
                total - templates.len()
            );
        }
        Ok(templates)
    }

    async fn template_detail(
        &self,
        template_id: &str,
    ) -> Result<Option<TemplateDetail>, SourceError> {
        let url = self.url("api/ut", &[("templateId", template_id)])?;
        let details: Vec<TemplateDetail> = self.get_json("template detail", url).await?;
        Ok(details.into_iter().next())
    }

    async fn kpi_names(&self, group: KpiGroup) -> Result<Vec<String>, SourceError> {
        let url = self.url("api/kpi", &[("kpi_grp", group.listing_name())])?;
        let rows: Vec<KpiRow> = self.get_json("kpi listing", url).await?;
        Ok(rows.into_iter().map(|r| r.kpi_name).collect())
    }

    async fn kpi_series(&self, query: &SeriesQuery) -> Result<Vec<KpiRecord>, SourceError> {
        let (path, endpoint) = match query.group {
            KpiGroup::Os => ("api/os2", "os kpi data"),
            KpiGroup::Jobs => ("api/jobs", "job kpi data"),
        };

        let url = self.url(
            path,
            &[
                ("kpi_name", query.kpi_name.as_str()),
                ("from", query.from.as_str()),
                ("to", query.to.as_str()),
                ("aggregation", query.aggregation.as_str()),
            ],
        )?;

        self.get_json(endpoint, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls() {
        let source = HttpSource::new("http://example.com/dash", Duration::from_secs(1)).unwrap();
        assert_eq!(source.base().as_str(), "http://example.com/dash/");

        let url = source
            .url(
                "api/os2",
                &[("kpi_name", "cpu_usage"), ("from", "2024-01-01T00:00:00")],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://example.com/dash/api/os2?kpi_name=cpu_usage&from=2024-01-01T00%3A00%3A00"
        );
    }

    #[test]
    fn rejects_bad_base() {
        assert!(matches!(
            HttpSource::new("not a url", Duration::from_secs(1)),
            Err(SourceError::Url(_))
        ));
    }

    #[test]
    fn template_rows_flatten() {
        let rows: Vec<TemplateRow> = serde_json::from_str(
            r#"[
                {"template_id": ["t1"], "template_name": ["Ops"], "template_desc": ["ops view"],
                 "default": [true], "favorite": [false]},
                {"template_name": ["broken"]}
            ]"#,
        )
        .unwrap();

        let summaries: Vec<_> = rows.into_iter().filter_map(TemplateRow::into_summary).collect();
        assert_eq!(
            summaries,
            vec![TemplateSummary {
                id: "t1".into(),
                name: "Ops".into(),
                description: "ops view".into(),
                is_default: true,
                is_favorite: false,
            }]
        );
    }
}
