use sea_orm::{
    ActiveModelTrait, ConnectionTrait, EntityTrait, NotSet, QueryOrder, Set,
};
use time::OffsetDateTime;

use crate::entities::articles::{self, Model as Article};
use crate::errors::domain::{DomainError, NotFoundKind};
use crate::infra::db_errors::map_db_err;

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub body: String,
    pub image_path: Option<String>,
    pub author_id: Option<i64>,
}

/// `None` leaves a field unchanged; `Some(None)` clears the image.
#[derive(Debug, Clone, Default)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub image_path: Option<Option<String>>,
}

pub async fn create_article<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    new: NewArticle,
) -> Result<Article, DomainError> {
    let now = OffsetDateTime::now_utc();
    let row = articles::ActiveModel {
        id: NotSet,
        title: Set(new.title),
        body: Set(new.body),
        image_path: Set(new.image_path),
        author_id: Set(new.author_id),
        published_at: Set(now),
        updated_at: Set(now),
    };
    row.insert(conn).await.map_err(map_db_err)
}

/// Newest first.
pub async fn list_articles<C: ConnectionTrait + Send + Sync>(
    conn: &C,
) -> Result<Vec<Article>, DomainError> {
    articles::Entity::find()
        .order_by_desc(articles::Column::PublishedAt)
        .order_by_desc(articles::Column::Id)
        .all(conn)
        .await
        .map_err(map_db_err)
}

pub async fn require_by_id<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: i64,
) -> Result<Article, DomainError> {
    articles::Entity::find_by_id(id)
        .one(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| DomainError::not_found(NotFoundKind::Article, format!("Article {id} not found")))
}

pub async fn update_article<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: i64,
    changes: ArticleChanges,
) -> Result<Article, DomainError> {
    let article = require_by_id(conn, id).await?;
    let mut row: articles::ActiveModel = article.into();
    if let Some(title) = changes.title {
        row.title = Set(title);
    }
    if let Some(body) = changes.body {
        row.body = Set(body);
    }
    if let Some(image_path) = changes.image_path {
        row.image_path = Set(image_path);
    }
    row.updated_at = Set(OffsetDateTime::now_utc());
    row.update(conn).await.map_err(map_db_err)
}

pub async fn delete_article<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    id: i64,
) -> Result<(), DomainError> {
    let result = articles::Entity::delete_by_id(id)
        .exec(conn)
        .await
        .map_err(map_db_err)?;
    if result.rows_affected == 0 {
        return Err(DomainError::not_found(
            NotFoundKind::Article,
            format!("Article {id} not found"),
        ));
    }
    Ok(())
}
