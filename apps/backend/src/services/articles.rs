use sea_orm::ConnectionTrait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::entities::articles::Model as Article;
use crate::entities::members::Model as Member;
use crate::error::AppError;
use crate::errors::domain::{DomainError, ValidationKind};
use crate::errors::ErrorCode;
use crate::reconcile::images::ImageRef;
use crate::reconcile::ImagePolicy;
use crate::repos::articles::{self as articles_repo, ArticleChanges, NewArticle};
use crate::storage::{FileHost, HostError};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    pub body: String,
    pub image_path: Option<String>,
}

/// Partial edit. Absent fields stay as they are; an empty `image_path`
/// clears the image.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleEdit {
    pub title: Option<String>,
    pub body: Option<String>,
    pub image_path: Option<String>,
}

fn checked_title(raw: &str) -> Result<String, AppError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(AppError::invalid(
            ErrorCode::ValidationError,
            "Article title must not be empty",
        ));
    }
    Ok(title.to_string())
}

/// Only references inside the local image namespace (or the default image)
/// may be stored; anything else would be flagged by the image scan.
pub fn check_image_reference(
    policy: &ImagePolicy,
    raw: Option<&str>,
) -> Result<Option<String>, DomainError> {
    if raw.map(str::trim) == Some(policy.default_image.as_str()) {
        return Ok(Some(policy.default_image.clone()));
    }
    match policy.classify(raw) {
        ImageRef::Empty => Ok(None),
        ImageRef::Local { file_name } => Ok(Some(format!("{}{file_name}", policy.url_prefix))),
        ImageRef::External { url } => Err(DomainError::validation(
            ValidationKind::ImageReference,
            format!("External image URLs are not accepted: {url}"),
        )),
        ImageRef::Invalid { reason } => Err(DomainError::validation(
            ValidationKind::ImageReference,
            format!("Image reference is {reason}"),
        )),
    }
}

pub async fn list<C: ConnectionTrait + Send + Sync>(conn: &C) -> Result<Vec<Article>, AppError> {
    Ok(articles_repo::list_articles(conn).await?)
}

pub async fn get<C: ConnectionTrait + Send + Sync>(conn: &C, id: i64) -> Result<Article, AppError> {
    Ok(articles_repo::require_by_id(conn, id).await?)
}

pub async fn create<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    author: &Member,
    draft: ArticleDraft,
    policy: &ImagePolicy,
) -> Result<Article, AppError> {
    let title = checked_title(&draft.title)?;
    let image_path = check_image_reference(policy, draft.image_path.as_deref())?;

    let article = articles_repo::create_article(
        conn,
        NewArticle {
            title,
            body: draft.body,
            image_path,
            author_id: Some(author.id),
        },
    )
    .await?;
    info!(article_id = article.id, author_id = author.id, "article published");
    Ok(article)
}

pub async fn update<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: i64,
    edit: ArticleEdit,
    policy: &ImagePolicy,
) -> Result<Article, AppError> {
    let changes = ArticleChanges {
        title: edit.title.as_deref().map(checked_title).transpose()?,
        body: edit.body,
        image_path: edit
            .image_path
            .as_deref()
            .map(|raw| check_image_reference(policy, Some(raw)))
            .transpose()?,
    };

    let article = articles_repo::update_article(conn, id, changes).await?;
    info!(article_id = id, "article edited");
    Ok(article)
}

pub async fn delete<C: ConnectionTrait + Send + Sync>(conn: &C, id: i64) -> Result<(), AppError> {
    articles_repo::delete_article(conn, id).await?;
    info!(article_id = id, "article deleted");
    Ok(())
}

/// Upload `bytes` to the file host, then point the article at the new file.
///
/// The article is checked first so a missing article never leaves an
/// orphan upload behind.
pub async fn replace_image<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    host: &dyn FileHost,
    article_id: i64,
    original_name: &str,
    bytes: &[u8],
) -> Result<Article, AppError> {
    articles_repo::require_by_id(conn, article_id).await?;
    if bytes.is_empty() || bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::invalid(
            ErrorCode::InvalidImageUpload,
            format!("Image must be between 1 byte and {MAX_IMAGE_BYTES} bytes"),
        ));
    }

    let public_path = host.upload(original_name, bytes).await.map_err(|e| match e {
        HostError::InvalidName(name) => AppError::invalid(
            ErrorCode::InvalidImageUpload,
            format!("'{name}' is not an accepted image file name"),
        ),
        other => {
            warn!(host = %host.describe(), error = %other, "image upload failed");
            AppError::unavailable(ErrorCode::FileHostUnavailable, other.to_string())
        }
    })?;

    let article = articles_repo::update_article(
        conn,
        article_id,
        ArticleChanges {
            image_path: Some(Some(public_path)),
            ..ArticleChanges::default()
        },
    )
    .await?;
    info!(article_id, image = ?article.image_path, "article image replaced");
    Ok(article)
}
