use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    models::{
        CategoryListResponse, CommentResponse, CommentThread, CommentView, ContentStatus,
        CreateCommentRequest, CreatePostRequest, FollowResponse, FollowTarget, FollowingResponse,
        NewComment, NewPost, PostDetail, PostDetailResponse, PostFilter, PostListResponse,
        PostResponse, PostType, PostView,
    },
    pagination::PageQuery,
    sanitize::{slugify, strip_tags},
    validation::ValidatedJson,
};

const DEFAULT_PAGE_SIZE: i64 = 20;

fn post_not_found() -> ApiError {
    ApiError::not_found("POST_NOT_FOUND", "Post not found")
}

/// A post the public may read: 404 when missing, a distinct 404 when not published.
async fn published_post(state: &AppState, id: Uuid) -> ApiResult<PostView> {
    let post = state.repo.find_post(id).await?.ok_or_else(post_not_found)?;
    if post.post.status != ContentStatus::Published.as_str() {
        return Err(ApiError::not_found(
            "POST_UNAVAILABLE",
            "Post is not available",
        ));
    }
    Ok(post)
}

/// thread_comments
///
/// Groups a flat, oldest-first comment list into threads. Every reply hangs off its
/// top-level ancestor; replies whose ancestor is not in the list are dropped. Threads come
/// back newest first, replies inside a thread oldest first.
pub fn thread_comments(comments: Vec<CommentView>) -> Vec<CommentThread> {
    let parents: HashMap<Uuid, Option<Uuid>> = comments
        .iter()
        .map(|c| (c.comment.id, c.comment.parent_id))
        .collect();

    let root_of = |mut id: Uuid| -> Option<Uuid> {
        // Bounded walk so a malformed cycle cannot spin forever.
        for _ in 0..=parents.len() {
            match parents.get(&id)? {
                None => return Some(id),
                Some(parent) => id = *parent,
            }
        }
        None
    };

    let mut threads: Vec<CommentThread> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut replies: Vec<(Uuid, CommentView)> = Vec::new();

    for comment in comments {
        if comment.comment.parent_id.is_none() {
            index.insert(comment.comment.id, threads.len());
            threads.push(CommentThread {
                comment,
                replies: Vec::new(),
            });
        } else if let Some(root) = root_of(comment.comment.id) {
            replies.push((root, comment));
        }
    }

    for (root, reply) in replies {
        if let Some(&i) = index.get(&root) {
            threads[i].replies.push(reply);
        }
    }

    threads.reverse();
    threads
}

/// list_posts
///
/// Published posts, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/community/posts",
    params(PostFilter, PageQuery),
    responses((status = 200, description = "Published posts", body = PostListResponse))
)]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
    Query(paging): Query<PageQuery>,
) -> ApiResult<Json<PostListResponse>> {
    let page = paging.resolve(DEFAULT_PAGE_SIZE);
    let category = filter
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let post_type = filter
        .post_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let (posts, total) = state.repo.list_posts(category, post_type, page).await?;
    Ok(Json(PostListResponse {
        posts,
        pagination: page.meta(total),
    }))
}

/// get_post
///
/// A published post with its comment threads. Each read counts as a view.
#[utoipa::path(
    get,
    path = "/api/v1/community/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post", body = PostDetailResponse),
        (status = 404, description = "Post not found or unavailable")
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PostDetailResponse>> {
    let mut post = published_post(&state, id).await?;
    state.repo.increment_post_views(id).await?;
    post.post.view_count += 1;

    let comments = state.repo.list_post_comments(id).await?;
    Ok(Json(PostDetailResponse {
        post: PostDetail {
            post,
            comments: thread_comments(comments),
        },
    }))
}

/// Title slug plus a short random suffix, so equal titles never collide.
fn post_slug(title: &str) -> String {
    let base = slugify(title);
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    if base.is_empty() {
        format!("post-{suffix}")
    } else {
        let trimmed: String = base.chars().take(80).collect();
        format!("{}-{suffix}", trimmed.trim_end_matches('-'))
    }
}

/// create_post
///
/// Publishes immediately. Tags are cleaned and de-duplicated.
#[utoipa::path(
    post,
    path = "/api/v1/community/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Validation failed or unknown category")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_post(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<PostResponse>)> {
    user.require_active()?;

    if let Some(category_id) = req.category_id {
        let usable = state
            .repo
            .find_category(category_id)
            .await?
            .is_some_and(|c| c.is_active);
        if !usable {
            return Err(ApiError::bad_request(
                "INVALID_CATEGORY",
                "Category does not exist",
            ));
        }
    }

    let mut tags: Vec<String> = Vec::new();
    for tag in req.tags.unwrap_or_default() {
        let tag = strip_tags(&tag).to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    let title = strip_tags(&req.title);
    let post = state
        .repo
        .create_post(NewPost {
            user_id: user.id,
            category_id: req.category_id,
            slug: post_slug(&title),
            title,
            content: strip_tags(&req.content),
            post_type: req
                .post_type
                .as_deref()
                .and_then(PostType::parse)
                .unwrap_or(PostType::Article),
            tags,
        })
        .await?;

    tracing::info!(post_id = %post.id, user_id = %user.id, "post created");
    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            message: "Post created successfully".to_string(),
            post,
        }),
    ))
}

/// create_comment
///
/// Comments on a published post, optionally replying to another comment of that post.
#[utoipa::path(
    post,
    path = "/api/v1/community/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = CommentResponse),
        (status = 400, description = "Parent comment belongs to another post"),
        (status = 404, description = "Post not found or unavailable")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_comment(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentResponse>)> {
    user.require_active()?;
    published_post(&state, req.post_id).await?;

    if let Some(parent_id) = req.parent_id {
        let valid_parent = state
            .repo
            .find_comment(parent_id)
            .await?
            .is_some_and(|parent| {
                parent.post_id == req.post_id
                    && parent.status == ContentStatus::Published.as_str()
            });
        if !valid_parent {
            return Err(ApiError::bad_request(
                "INVALID_PARENT",
                "Parent comment does not belong to this post",
            ));
        }
    }

    let comment = state
        .repo
        .create_comment(NewComment {
            post_id: req.post_id,
            parent_id: req.parent_id,
            user_id: user.id,
            content: strip_tags(&req.content),
        })
        .await?;

    tracing::info!(comment_id = %comment.id, post_id = %req.post_id, "comment created");
    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            message: "Comment created successfully".to_string(),
            comment,
        }),
    ))
}

/// list_categories
#[utoipa::path(
    get,
    path = "/api/v1/community/categories",
    responses((status = 200, description = "Active categories", body = CategoryListResponse))
)]
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<CategoryListResponse>> {
    let categories = state.repo.list_categories().await?;
    Ok(Json(CategoryListResponse { categories }))
}

async fn ensure_target(state: &AppState, target: FollowTarget, id: Uuid) -> ApiResult<()> {
    match target {
        FollowTarget::Category => {
            state
                .repo
                .find_category(id)
                .await?
                .filter(|c| c.is_active)
                .ok_or_else(|| ApiError::not_found("CATEGORY_NOT_FOUND", "Category not found"))?;
        }
        FollowTarget::Post => {
            published_post(state, id).await?;
        }
    }
    Ok(())
}

async fn set_follow(
    state: &AppState,
    user: &AuthUser,
    target: FollowTarget,
    id: Uuid,
    follow: bool,
) -> ApiResult<Json<FollowResponse>> {
    let noun = match target {
        FollowTarget::Category => "category",
        FollowTarget::Post => "post",
    };
    let message = if follow {
        ensure_target(state, target, id).await?;
        if state.repo.follow(user.id, target, id).await? {
            format!("Now following {noun}")
        } else {
            format!("Already following {noun}")
        }
    } else if state.repo.unfollow(user.id, target, id).await? {
        format!("Unfollowed {noun}")
    } else {
        format!("Not following {noun}")
    };

    Ok(Json(FollowResponse {
        message,
        following: follow,
    }))
}

/// follow_category
#[utoipa::path(
    post,
    path = "/api/v1/community/categories/{id}/follow",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Following", body = FollowResponse),
        (status = 404, description = "Category not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn follow_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FollowResponse>> {
    set_follow(&state, &user, FollowTarget::Category, id, true).await
}

/// unfollow_category
#[utoipa::path(
    delete,
    path = "/api/v1/community/categories/{id}/follow",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses((status = 200, description = "Not following", body = FollowResponse)),
    security(("bearer_auth" = []))
)]
pub async fn unfollow_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FollowResponse>> {
    set_follow(&state, &user, FollowTarget::Category, id, false).await
}

/// follow_post
#[utoipa::path(
    post,
    path = "/api/v1/community/posts/{id}/follow",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Following", body = FollowResponse),
        (status = 404, description = "Post not found or unavailable")
    ),
    security(("bearer_auth" = []))
)]
pub async fn follow_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FollowResponse>> {
    set_follow(&state, &user, FollowTarget::Post, id, true).await
}

/// unfollow_post
#[utoipa::path(
    delete,
    path = "/api/v1/community/posts/{id}/follow",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses((status = 200, description = "Not following", body = FollowResponse)),
    security(("bearer_auth" = []))
)]
pub async fn unfollow_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FollowResponse>> {
    set_follow(&state, &user, FollowTarget::Post, id, false).await
}

/// following
///
/// Everything the caller follows.
#[utoipa::path(
    get,
    path = "/api/v1/community/following",
    responses((status = 200, description = "Followed categories and posts", body = FollowingResponse)),
    security(("bearer_auth" = []))
)]
pub async fn following(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<FollowingResponse>> {
    let categories = state.repo.followed_categories(id).await?;
    let posts = state.repo.followed_posts(id).await?;
    Ok(Json(FollowingResponse { categories, posts }))
}
