use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::RepoResult,
    models::{
        Category, Comment, CommentView, CreateReviewRequest, CreateVendorRequest, FollowTarget,
        MyResponseView, NewComment, NewPost, NewSession, NewSurvey, NewSurveyResponse, NewUser,
        OAuthState, PlatformSetting, Post, PostView, Profile, Question, Review, ReviewView,
        Session, StatusCount, Survey, SurveyDetail, SurveyResponse, SurveyStats, SurveySummary,
        UpdateProfileRequest, UpdateSettingRequest, User, Vendor, VendorSearch, VendorService,
    },
    pagination::Page,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// Repository Trait
///
/// The persistence contract every handler goes through. Implementations report failures
/// as `RepositoryError`; "not found" on lookups is `Ok(None)`, not an error.
///
/// **Send + Sync + async_trait** are required to make the trait object (`Arc<dyn Repository>`)
/// shareable across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Cheap round trip used by the health check.
    async fn ping(&self) -> RepoResult<()>;

    // --- Users ---
    async fn find_user_by_id(&self, id: Uuid) -> RepoResult<Option<User>>;
    // Emails are stored normalized; callers pass a normalized address.
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_google_id(&self, google_id: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_verification_token(&self, token: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_reset_token(&self, token: &str) -> RepoResult<Option<User>>;
    /// Fails with `Duplicate` when the email is taken.
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    /// Increments the failure counter and locks the account until `lock_until` once the
    /// counter reaches `max_attempts`. Returns the updated row.
    async fn record_failed_login(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> RepoResult<User>;
    /// Clears lockout state and stamps `last_login`.
    async fn record_successful_login(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<()>;
    /// Marks the email verified, activates a pending account and clears the token.
    async fn mark_email_verified(&self, id: Uuid) -> RepoResult<()>;
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> RepoResult<()>;
    /// Stores a new hash, clears the reset token and any lockout.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepoResult<()>;
    /// Attaches a Google identity to an existing account and marks its email verified.
    async fn link_google_account(
        &self,
        id: Uuid,
        google_id: &str,
        avatar_url: Option<&str>,
    ) -> RepoResult<User>;
    async fn update_user_names(
        &self,
        id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> RepoResult<User>;
    async fn list_users(
        &self,
        role: Option<&str>,
        status: Option<&str>,
        page: Page,
    ) -> RepoResult<(Vec<User>, i64)>;
    async fn set_user_status(&self, id: Uuid, status: &str) -> RepoResult<Option<User>>;
    async fn set_user_role(&self, id: Uuid, role: &str) -> RepoResult<Option<User>>;

    // --- Profiles ---
    async fn get_profile(&self, user_id: Uuid) -> RepoResult<Option<Profile>>;
    /// Creates the profile on first write; absent fields keep their stored value.
    async fn upsert_profile(&self, user_id: Uuid, update: &UpdateProfileRequest)
    -> RepoResult<Profile>;

    // --- Sessions ---
    async fn create_session(&self, session: NewSession) -> RepoResult<Session>;
    async fn find_session_by_token(&self, token: &str) -> RepoResult<Option<Session>>;
    async fn find_session_by_refresh_token(&self, refresh_token: &str)
    -> RepoResult<Option<Session>>;
    /// Replaces both tokens on an existing session.
    async fn rotate_session(
        &self,
        id: Uuid,
        token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> RepoResult<Option<Session>>;
    async fn delete_session(&self, id: Uuid) -> RepoResult<bool>;
    async fn delete_user_sessions(&self, user_id: Uuid) -> RepoResult<u64>;
    /// Drops sessions whose refresh window has closed.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> RepoResult<u64>;

    // --- OAuth state ---
    async fn create_oauth_state(&self, state: OAuthState) -> RepoResult<()>;
    /// Deletes and returns the state in one step so it can only be consumed once.
    async fn take_oauth_state(&self, state: &str) -> RepoResult<Option<OAuthState>>;
    async fn purge_expired_oauth_states(&self, now: DateTime<Utc>) -> RepoResult<u64>;

    // --- Vendors ---
    /// Active vendors only, best rated first.
    async fn list_vendors(&self, search: &VendorSearch, page: Page)
    -> RepoResult<(Vec<Vendor>, i64)>;
    async fn popular_vendors(&self, limit: i64) -> RepoResult<Vec<Vendor>>;
    async fn find_vendor(&self, id: Uuid) -> RepoResult<Option<Vendor>>;
    async fn find_vendor_by_user(&self, user_id: Uuid) -> RepoResult<Option<Vendor>>;
    async fn create_vendor(&self, user_id: Uuid, req: &CreateVendorRequest) -> RepoResult<Vendor>;
    /// Active services, featured first.
    async fn vendor_services(&self, vendor_id: Uuid) -> RepoResult<Vec<VendorService>>;
    /// Approved public reviews, newest first.
    async fn list_public_reviews(
        &self,
        vendor_id: Uuid,
        page: Page,
    ) -> RepoResult<(Vec<ReviewView>, i64)>;
    /// Fails with `Duplicate` when the user already reviewed this vendor.
    async fn create_review(
        &self,
        vendor_id: Uuid,
        user_id: Uuid,
        req: &CreateReviewRequest,
    ) -> RepoResult<Review>;
    async fn set_review_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Review>>;
    /// Recomputes `average_rating` and `total_reviews` from approved public reviews.
    async fn refresh_vendor_rating(&self, vendor_id: Uuid) -> RepoResult<Option<Vendor>>;
    async fn list_vendors_by_status(
        &self,
        status: Option<&str>,
        page: Page,
    ) -> RepoResult<(Vec<Vendor>, i64)>;
    async fn set_vendor_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Vendor>>;

    // --- Community ---
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn find_category(&self, id: Uuid) -> RepoResult<Option<Category>>;
    /// Published posts, newest first.
    async fn list_posts(
        &self,
        category: Option<&str>,
        post_type: Option<&str>,
        page: Page,
    ) -> RepoResult<(Vec<PostView>, i64)>;
    async fn find_post(&self, id: Uuid) -> RepoResult<Option<PostView>>;
    async fn increment_post_views(&self, id: Uuid) -> RepoResult<()>;
    async fn create_post(&self, post: NewPost) -> RepoResult<Post>;
    async fn set_post_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Post>>;
    /// Published comments of a post, oldest first.
    async fn list_post_comments(&self, post_id: Uuid) -> RepoResult<Vec<CommentView>>;
    async fn find_comment(&self, id: Uuid) -> RepoResult<Option<Comment>>;
    /// Inserts the comment and bumps the post's comment count atomically.
    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment>;
    /// Changes moderation state and re-derives the post's comment count.
    async fn set_comment_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Comment>>;
    /// Returns false when the follow already existed.
    async fn follow(&self, user_id: Uuid, target: FollowTarget, target_id: Uuid)
    -> RepoResult<bool>;
    /// Returns false when there was nothing to remove.
    async fn unfollow(
        &self,
        user_id: Uuid,
        target: FollowTarget,
        target_id: Uuid,
    ) -> RepoResult<bool>;
    async fn followed_categories(&self, user_id: Uuid) -> RepoResult<Vec<Category>>;
    async fn followed_posts(&self, user_id: Uuid) -> RepoResult<Vec<PostView>>;

    // --- AI readiness ---
    /// Active surveys with their question counts, newest first.
    async fn list_surveys(
        &self,
        category: Option<&str>,
        public_only: bool,
        page: Page,
    ) -> RepoResult<(Vec<SurveySummary>, i64)>;
    async fn find_survey(&self, id: Uuid) -> RepoResult<Option<Survey>>;
    /// Questions in display order.
    async fn survey_questions(&self, survey_id: Uuid) -> RepoResult<Vec<Question>>;
    async fn create_survey(&self, survey: NewSurvey) -> RepoResult<SurveyDetail>;
    async fn count_user_responses(&self, survey_id: Uuid, user_id: Uuid) -> RepoResult<i64>;
    /// Persists the response with its per-question scores and folds the percentage into
    /// the survey's running average, all in one transaction.
    async fn record_survey_response(&self, response: NewSurveyResponse)
    -> RepoResult<SurveyResponse>;
    async fn list_user_responses(&self, user_id: Uuid) -> RepoResult<Vec<MyResponseView>>;

    // --- Admin ---
    async fn count_users_by_status(&self) -> RepoResult<Vec<StatusCount>>;
    async fn count_vendors_by_status(&self) -> RepoResult<Vec<StatusCount>>;
    async fn survey_response_stats(&self) -> RepoResult<SurveyStats>;
    async fn count_published_posts(&self) -> RepoResult<i64>;
    async fn list_settings(&self, public_only: bool) -> RepoResult<Vec<PlatformSetting>>;
    async fn upsert_setting(
        &self,
        key: &str,
        update: &UpdateSettingRequest,
    ) -> RepoResult<PlatformSetting>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
