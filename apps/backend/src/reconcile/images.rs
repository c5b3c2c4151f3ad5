//! Consistency between `articles.image_path` and the files on the host.

use std::collections::BTreeSet;
use std::time::Duration;

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use tracing::{info, warn};

use crate::entities::articles;
use crate::storage::FileHost;

pub const DEFAULT_URL_PREFIX: &str = "/static/article_images/";
pub const DEFAULT_IMAGE: &str = "/static/article_images/default_article.jpg";

#[derive(Debug, Clone)]
pub struct ImagePolicy {
    /// Public path prefix of the local image namespace, with trailing slash.
    pub url_prefix: String,
    /// Always-valid fallback reference.
    pub default_image: String,
    pub list_timeout: Duration,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            default_image: DEFAULT_IMAGE.to_string(),
            list_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Empty,
    Local { file_name: String },
    /// Absolute URLs are outside the namespace no matter whether they load.
    External { url: String },
    Invalid { reason: &'static str },
}

impl ImagePolicy {
    pub fn classify(&self, raw: Option<&str>) -> ImageRef {
        let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return ImageRef::Empty;
        };

        if value.contains("://") || value.starts_with("//") {
            return ImageRef::External {
                url: value.to_string(),
            };
        }

        let Some(name) = value.strip_prefix(self.url_prefix.as_str()) else {
            return ImageRef::Invalid {
                reason: "outside the image namespace",
            };
        };

        if name.is_empty()
            || name.starts_with('.')
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return ImageRef::Invalid {
                reason: "not a plain file name",
            };
        }

        ImageRef::Local {
            file_name: name.to_string(),
        }
    }

    /// File name of the default image when it lives in the local namespace.
    fn default_file_name(&self) -> Option<String> {
        match self.classify(Some(&self.default_image)) {
            ImageRef::Local { file_name } => Some(file_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageIssue {
    pub article_id: i64,
    pub reference: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    pub scanned: usize,
    /// Local references whose file is missing on the host.
    pub dangling: Vec<ImageIssue>,
    /// References that can never resolve (external URLs, bad paths).
    pub invalid: Vec<ImageIssue>,
    /// Local references left unchecked because the host could not be listed.
    pub unresolved: Vec<ImageIssue>,
    /// Host files that no article references.
    pub orphan_files: Vec<String>,
    pub host_reachable: bool,
    pub host_error: Option<String>,
}

impl ImageReport {
    pub fn needs_repair(&self) -> bool {
        !self.dangling.is_empty() || !self.invalid.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
    pub updated: u64,
}

/// Compare every article reference against one listing of the file host.
///
/// A host that cannot be listed in time does not make references dangling;
/// they are reported as unresolved and orphan detection is skipped.
pub async fn scan<C>(conn: &C, host: &dyn FileHost, policy: &ImagePolicy) -> Result<ImageReport, DbErr>
where
    C: ConnectionTrait,
{
    let rows = articles::Entity::find()
        .order_by_asc(articles::Column::Id)
        .all(conn)
        .await?;

    let listing = match tokio::time::timeout(policy.list_timeout, host.list()).await {
        Ok(Ok(names)) => Ok(names.into_iter().collect::<BTreeSet<String>>()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!(
            "listing did not finish within {}s",
            policy.list_timeout.as_secs()
        )),
    };

    let mut report = ImageReport {
        scanned: rows.len(),
        host_reachable: listing.is_ok(),
        ..ImageReport::default()
    };
    let mut referenced = BTreeSet::new();

    for article in &rows {
        let raw = article.image_path.as_deref();
        if raw.map(str::trim) == Some(policy.default_image.as_str()) {
            continue;
        }
        let issue = |reason: &str| ImageIssue {
            article_id: article.id,
            reference: raw.unwrap_or_default().to_string(),
            reason: reason.to_string(),
        };

        match policy.classify(raw) {
            ImageRef::Empty => {}
            ImageRef::External { .. } => report.invalid.push(issue("external url")),
            ImageRef::Invalid { reason } => report.invalid.push(issue(reason)),
            ImageRef::Local { file_name } => match &listing {
                Ok(names) if names.contains(&file_name) => {
                    referenced.insert(file_name);
                }
                Ok(_) => report.dangling.push(issue("file missing on host")),
                Err(_) => report.unresolved.push(issue("host unreachable")),
            },
        }
    }

    match listing {
        Ok(names) => {
            let default_name = policy.default_file_name();
            report.orphan_files = names
                .into_iter()
                .filter(|n| !referenced.contains(n) && Some(n) != default_name.as_ref())
                .collect();
        }
        Err(e) => {
            warn!(host = %host.describe(), error = %e, "file host could not be listed");
            report.host_error = Some(e);
        }
    }

    info!(
        scanned = report.scanned,
        dangling = report.dangling.len(),
        invalid = report.invalid.len(),
        unresolved = report.unresolved.len(),
        orphans = report.orphan_files.len(),
        host_reachable = report.host_reachable,
        "image scan complete"
    );
    Ok(report)
}

/// Point every dangling or invalid reference at the default image.
///
/// Unresolved entries are untouched and rows that already hold the default
/// are not rewritten, so running it twice changes nothing the second time.
pub async fn repair<C>(conn: &C, report: &ImageReport, default_image: &str) -> Result<RepairSummary, DbErr>
where
    C: ConnectionTrait,
{
    let ids: BTreeSet<i64> = report
        .dangling
        .iter()
        .chain(report.invalid.iter())
        .map(|i| i.article_id)
        .collect();
    if ids.is_empty() {
        return Ok(RepairSummary::default());
    }

    let result = articles::Entity::update_many()
        .col_expr(articles::Column::ImagePath, Expr::value(default_image.to_string()))
        .filter(articles::Column::Id.is_in(ids))
        .filter(
            Condition::any()
                .add(articles::Column::ImagePath.ne(default_image.to_string()))
                .add(articles::Column::ImagePath.is_null()),
        )
        .exec(conn)
        .await?;

    info!(updated = result.rows_affected, "image references repaired");
    Ok(RepairSummary {
        updated: result.rows_affected,
    })
}
