use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use super::text_enum;
use crate::{
    error::FieldError,
    pagination::PaginationMeta,
    validation::{Validate, Validator},
};

text_enum!(
    PostType {
        Article => "ARTICLE",
        Question => "QUESTION",
        Discussion => "DISCUSSION",
        Announcement => "ANNOUNCEMENT",
        Showcase => "SHOWCASE",
    }
);

text_enum!(
    /// Moderation state shared by posts and comments.
    ContentStatus {
        Published => "PUBLISHED",
        Hidden => "HIDDEN",
        Deleted => "DELETED",
    }
);

text_enum!(
    FollowTarget {
        Category => "CATEGORY",
        Post => "POST",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    pub slug: String,
    /// Maps SQL column "type" to a non-keyword field name.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub post_type: String,
    pub status: String,
    pub tags: Vec<String>,
    pub view_count: i32,
    pub comment_count: i32,
    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// A post joined with author and category names.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub post: Post,
    pub author_name: String,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub user_id: Uuid,
    pub content: String,
    pub status: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CommentView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub comment: Comment,
    pub author_name: String,
}

/// A top-level comment and every reply beneath it, oldest reply first.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: CommentView,
    pub replies: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostView,
    pub comments: Vec<CommentThread>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostDetailResponse {
    pub post: PostDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostListResponse {
    pub posts: Vec<PostView>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostResponse {
    pub message: String,
    pub post: Post,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentResponse {
    pub message: String,
    pub comment: Comment,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CategoryListResponse {
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FollowingResponse {
    pub categories: Vec<Category>,
    pub posts: Vec<PostView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FollowResponse {
    pub message: String,
    pub following: bool,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct PostFilter {
    /// Case-insensitive match against the category name.
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub post_type: Option<String>,
}

/// CreatePostRequest
///
/// Posts are published immediately; the slug is derived from the title.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub post_type: Option<String>,
    pub category_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
}

impl Validate for CreatePostRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Validator::new();
        v.length("title", &self.title, 1, 200)
            .length("content", &self.content, 10, usize::MAX)
            .one_of("type", self.post_type.as_deref(), PostType::ALL);
        if let Some(tags) = &self.tags {
            v.check(tags.len() <= 10, "tags", "must contain at most 10 tags")
                .check(
                    tags.iter().all(|t| !t.trim().is_empty() && t.len() <= 50),
                    "tags",
                    "each tag must be 1 to 50 characters",
                );
        }
        v.finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateCommentRequest {
    pub content: String,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
}

impl Validate for CreateCommentRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .required("content", &self.content)
            .max_length("content", Some(&self.content), 10_000)
            .finish()
    }
}

/// Insert payload for a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub post_type: PostType,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub user_id: Uuid,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_rules() {
        let ok = CreatePostRequest {
            title: "Hello".into(),
            content: "Long enough content".into(),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad = CreatePostRequest {
            title: "x".repeat(201),
            content: "short".into(),
            post_type: Some("RANT".into()),
            ..Default::default()
        };
        let fields: Vec<String> = bad.validate().unwrap_err().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["title", "content", "type"]);
    }
}
