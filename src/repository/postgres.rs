use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};
use uuid::Uuid;

use super::Repository;
use crate::{
    error::RepoResult,
    models::{
        Category, Comment, CommentView, ContentStatus, CreateReviewRequest, CreateVendorRequest,
        FollowTarget, MyResponseView, NewComment, NewPost, NewSession, NewSurvey,
        NewSurveyResponse, NewUser, OAuthState, PlatformSetting, Post, PostView, Profile,
        Question, Review, ReviewStatus, ReviewView, Session, StatusCount, Survey, SurveyDetail, SurveyResponse,
        SurveyStats, SurveyStatus, SurveySummary, UpdateProfileRequest, UpdateSettingRequest,
        User, UserStatus, Vendor, VendorSearch, VendorService, VendorStatus,
    },
    pagination::Page,
};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, avatar_url, role, \
    status, email_verified, verification_token, verification_expires, reset_token, \
    reset_expires, google_id, login_attempts, locked_until, last_login, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, user_id, token, refresh_token, device_info, ip_address, \
    user_agent, expires_at, refresh_expires_at, created_at";

const VENDOR_COLUMNS: &str = "id, user_id, company_name, business_name, description, email, \
    phone, website, address, city, state, country, postal_code, business_type, \
    year_established, employee_count, status, average_rating, total_reviews, created_at, \
    updated_at";

const PROFILE_COLUMNS: &str = "user_id, bio, phone, country, state, city, address, \
    postal_code, job_title, company, industry, experience_years, website, linkedin, timezone, \
    language, email_notifications, updated_at";

const POST_COLUMNS: &str = "id, user_id, category_id, title, content, slug, type, status, tags, \
    view_count, comment_count, published_at, created_at, updated_at";

const POST_VIEW_SELECT: &str = "SELECT p.id, p.user_id, p.category_id, p.title, p.content, \
    p.slug, p.type, p.status, p.tags, p.view_count, p.comment_count, p.published_at, \
    p.created_at, p.updated_at, (u.first_name || ' ' || u.last_name) AS author_name, \
    c.name AS category_name \
    FROM posts p \
    JOIN users u ON u.id = p.user_id \
    LEFT JOIN categories c ON c.id = p.category_id";

const COMMENT_COLUMNS: &str = "id, post_id, parent_id, user_id, content, status, created_at";

const REVIEW_COLUMNS: &str =
    "id, vendor_id, user_id, rating, title, content, status, is_public, created_at";

const CATEGORY_COLUMNS: &str = "id, name, slug, description, is_active, created_at";

const SURVEY_COLUMNS: &str = "id, title, description, category, time_limit, max_attempts, \
    passing_score, is_public, status, total_responses, average_score, created_by, created_at, \
    updated_at";

const QUESTION_COLUMNS: &str =
    "id, survey_id, text, question_type, options, max_score, position, required";

const RESPONSE_COLUMNS: &str = "id, survey_id, user_id, status, total_score, max_score, \
    percentage, grade, passed, device_info, feedback, completed_at, created_at";

const SETTING_COLUMNS: &str = "key, value, description, is_public, updated_at";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Dynamic filters go through `QueryBuilder` so every user value is a bind parameter.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_user(&self, sql: &str, value: &str) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {sql}");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?)
    }
}

/// Appends `AND column = value` when a filter is present.
const LIKE_ESCAPE: &str = " ESCAPE '\\'";

/// A case-insensitive "contains" pattern with `%`, `_` and `\` taken literally.
fn contains_pattern(raw: &str) -> String {
    let mut pattern = String::with_capacity(raw.len() + 2);
    pattern.push('%');
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_eq<'a>(builder: &mut QueryBuilder<'a, Postgres>, column: &str, value: Option<&'a str>) {
    if let Some(value) = value {
        builder.push(format!(" AND {column} = "));
        builder.push_bind(value);
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // --- Users ---

    async fn find_user_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.fetch_user("email = $1", email).await
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> RepoResult<Option<User>> {
        self.fetch_user("google_id = $1", google_id).await
    }

    async fn find_user_by_verification_token(&self, token: &str) -> RepoResult<Option<User>> {
        self.fetch_user("verification_token = $1", token).await
    }

    async fn find_user_by_reset_token(&self, token: &str) -> RepoResult<Option<User>> {
        self.fetch_user("reset_token = $1", token).await
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let query = format!(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, avatar_url, \
             role, status, email_verified, verification_token, verification_expires, google_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.avatar_url)
            .bind(user.role.as_str())
            .bind(user.status.as_str())
            .bind(user.email_verified)
            .bind(&user.verification_token)
            .bind(user.verification_expires)
            .bind(&user.google_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> RepoResult<User> {
        // Reaching the threshold locks the account and restarts the counter, so the
        // next lock needs another full run of failures.
        let query = format!(
            "UPDATE users SET \
               locked_until = CASE WHEN login_attempts + 1 >= $2 THEN $3 ELSE locked_until END, \
               login_attempts = CASE WHEN login_attempts + 1 >= $2 THEN 0 ELSE login_attempts + 1 END, \
               updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(max_attempts)
            .bind(lock_until)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn record_successful_login(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query(
            "UPDATE users SET login_attempts = 0, locked_until = NULL, last_login = $2, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_email_verified(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query(
            "UPDATE users SET email_verified = TRUE, verification_token = NULL, \
             verification_expires = NULL, \
             status = CASE WHEN status = $2 THEN $3 ELSE status END, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(UserStatus::PendingVerification.as_str())
        .bind(UserStatus::Active.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> RepoResult<()> {
        sqlx::query(
            "UPDATE users SET reset_token = $2, reset_expires = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .bind(expires)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepoResult<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, reset_token = NULL, reset_expires = NULL, \
             login_attempts = 0, locked_until = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn link_google_account(
        &self,
        id: Uuid,
        google_id: &str,
        avatar_url: Option<&str>,
    ) -> RepoResult<User> {
        let query = format!(
            "UPDATE users SET google_id = $2, avatar_url = COALESCE(avatar_url, $3), \
             email_verified = TRUE, \
             status = CASE WHEN status = $4 THEN $5 ELSE status END, \
             updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(google_id)
            .bind(avatar_url)
            .bind(UserStatus::PendingVerification.as_str())
            .bind(UserStatus::Active.as_str())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_user_names(
        &self,
        id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> RepoResult<User> {
        let query = format!(
            "UPDATE users SET first_name = COALESCE($2, first_name), \
             last_name = COALESCE($3, last_name), updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(first_name)
            .bind(last_name)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_users(
        &self,
        role: Option<&str>,
        status: Option<&str>,
        page: Page,
    ) -> RepoResult<(Vec<User>, i64)> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM users WHERE TRUE");
        push_eq(&mut count, "role", role);
        push_eq(&mut count, "status", status);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));
        push_eq(&mut builder, "role", role);
        push_eq(&mut builder, "status", status);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());
        let users = builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;
        Ok((users, total))
    }

    async fn set_user_status(&self, id: Uuid, status: &str) -> RepoResult<Option<User>> {
        let query = format!(
            "UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_user_role(&self, id: Uuid, role: &str) -> RepoResult<Option<User>> {
        let query = format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- Profiles ---

    async fn get_profile(&self, user_id: Uuid) -> RepoResult<Option<Profile>> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1");
        Ok(sqlx::query_as::<_, Profile>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        u: &UpdateProfileRequest,
    ) -> RepoResult<Profile> {
        let query = format!(
            "INSERT INTO profiles (user_id, bio, phone, country, state, city, address, \
               postal_code, job_title, company, industry, experience_years, website, linkedin, \
               timezone, language, email_notifications, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
               COALESCE($17, TRUE), NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET \
               bio = COALESCE(EXCLUDED.bio, profiles.bio), \
               phone = COALESCE(EXCLUDED.phone, profiles.phone), \
               country = COALESCE(EXCLUDED.country, profiles.country), \
               state = COALESCE(EXCLUDED.state, profiles.state), \
               city = COALESCE(EXCLUDED.city, profiles.city), \
               address = COALESCE(EXCLUDED.address, profiles.address), \
               postal_code = COALESCE(EXCLUDED.postal_code, profiles.postal_code), \
               job_title = COALESCE(EXCLUDED.job_title, profiles.job_title), \
               company = COALESCE(EXCLUDED.company, profiles.company), \
               industry = COALESCE(EXCLUDED.industry, profiles.industry), \
               experience_years = COALESCE(EXCLUDED.experience_years, profiles.experience_years), \
               website = COALESCE(EXCLUDED.website, profiles.website), \
               linkedin = COALESCE(EXCLUDED.linkedin, profiles.linkedin), \
               timezone = COALESCE(EXCLUDED.timezone, profiles.timezone), \
               language = COALESCE(EXCLUDED.language, profiles.language), \
               email_notifications = COALESCE($17, profiles.email_notifications), \
               updated_at = NOW() \
             RETURNING {PROFILE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Profile>(&query)
            .bind(user_id)
            .bind(&u.bio)
            .bind(&u.phone)
            .bind(&u.country)
            .bind(&u.state)
            .bind(&u.city)
            .bind(&u.address)
            .bind(&u.postal_code)
            .bind(&u.job_title)
            .bind(&u.company)
            .bind(&u.industry)
            .bind(u.experience_years)
            .bind(&u.website)
            .bind(&u.linkedin)
            .bind(&u.timezone)
            .bind(&u.language)
            .bind(u.email_notifications)
            .fetch_one(&self.pool)
            .await?)
    }

    // --- Sessions ---

    async fn create_session(&self, s: NewSession) -> RepoResult<Session> {
        let query = format!(
            "INSERT INTO sessions (id, user_id, token, refresh_token, device_info, ip_address, \
               user_agent, expires_at, refresh_expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {SESSION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(Uuid::new_v4())
            .bind(s.user_id)
            .bind(&s.token)
            .bind(&s.refresh_token)
            .bind(&s.device_info)
            .bind(&s.ip_address)
            .bind(&s.user_agent)
            .bind(s.expires_at)
            .bind(s.refresh_expires_at)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_session_by_token(&self, token: &str) -> RepoResult<Option<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token = $1");
        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> RepoResult<Option<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_token = $1");
        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn rotate_session(
        &self,
        id: Uuid,
        token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> RepoResult<Option<Session>> {
        let query = format!(
            "UPDATE sessions SET token = $2, refresh_token = $3, expires_at = $4, \
             refresh_expires_at = $5 WHERE id = $1 RETURNING {SESSION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .bind(token)
            .bind(refresh_token)
            .bind(expires_at)
            .bind(refresh_expires_at)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_session(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // --- OAuth state ---

    async fn create_oauth_state(&self, state: OAuthState) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO oauth_states (state, redirect_url, expires_at, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&state.state)
        .bind(&state.redirect_url)
        .bind(state.expires_at)
        .bind(state.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_oauth_state(&self, state: &str) -> RepoResult<Option<OAuthState>> {
        Ok(sqlx::query_as::<_, OAuthState>(
            "DELETE FROM oauth_states WHERE state = $1 \
             RETURNING state, redirect_url, expires_at, created_at",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn purge_expired_oauth_states(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // --- Vendors ---

    async fn list_vendors(
        &self,
        search: &VendorSearch,
        page: Page,
    ) -> RepoResult<(Vec<Vendor>, i64)> {
        fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, search: &'a VendorSearch) {
            builder.push(" WHERE status = ");
            builder.push_bind(VendorStatus::Active.as_str());
            if let Some(q) = &search.query {
                let pattern = contains_pattern(q);
                builder.push(" AND (company_name ILIKE ");
                builder.push_bind(pattern.clone());
                builder.push(LIKE_ESCAPE);
                builder.push(" OR business_name ILIKE ");
                builder.push_bind(pattern.clone());
                builder.push(LIKE_ESCAPE);
                builder.push(" OR description ILIKE ");
                builder.push_bind(pattern);
                builder.push(LIKE_ESCAPE);
                builder.push(")");
            }
            if let Some(country) = &search.country {
                builder.push(" AND country ILIKE ");
                builder.push_bind(contains_pattern(country));
                builder.push(LIKE_ESCAPE);
            }
            if let Some(city) = &search.city {
                builder.push(" AND city ILIKE ");
                builder.push_bind(contains_pattern(city));
                builder.push(LIKE_ESCAPE);
            }
            if let Some(min) = search.min_rating {
                builder.push(" AND average_rating >= ");
                builder.push_bind(min);
            }
        }

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM vendors");
        push_filters(&mut count, search);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {VENDOR_COLUMNS} FROM vendors"));
        push_filters(&mut builder, search);
        builder.push(" ORDER BY average_rating DESC, total_reviews DESC, created_at DESC LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());
        let vendors = builder
            .build_query_as::<Vendor>()
            .fetch_all(&self.pool)
            .await?;
        Ok((vendors, total))
    }

    async fn popular_vendors(&self, limit: i64) -> RepoResult<Vec<Vendor>> {
        let query = format!(
            "SELECT {VENDOR_COLUMNS} FROM vendors WHERE status = $1 AND total_reviews > 0 \
             ORDER BY average_rating DESC, total_reviews DESC LIMIT $2"
        );
        Ok(sqlx::query_as::<_, Vendor>(&query)
            .bind(VendorStatus::Active.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_vendor(&self, id: Uuid) -> RepoResult<Option<Vendor>> {
        let query = format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = $1");
        Ok(sqlx::query_as::<_, Vendor>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_vendor_by_user(&self, user_id: Uuid) -> RepoResult<Option<Vendor>> {
        let query = format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE user_id = $1");
        Ok(sqlx::query_as::<_, Vendor>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_vendor(&self, user_id: Uuid, r: &CreateVendorRequest) -> RepoResult<Vendor> {
        let query = format!(
            "INSERT INTO vendors (id, user_id, company_name, business_name, description, email, \
               phone, website, address, city, state, country, postal_code, business_type, \
               year_established, employee_count, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             RETURNING {VENDOR_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Vendor>(&query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&r.company_name)
            .bind(&r.business_name)
            .bind(&r.description)
            .bind(&r.email)
            .bind(&r.phone)
            .bind(&r.website)
            .bind(&r.address)
            .bind(&r.city)
            .bind(&r.state)
            .bind(&r.country)
            .bind(&r.postal_code)
            .bind(&r.business_type)
            .bind(r.year_established)
            .bind(&r.employee_count)
            .bind(VendorStatus::PendingApproval.as_str())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn vendor_services(&self, vendor_id: Uuid) -> RepoResult<Vec<VendorService>> {
        Ok(sqlx::query_as::<_, VendorService>(
            "SELECT id, vendor_id, name, description, category, base_price, price_unit, \
             is_active, is_featured, created_at FROM vendor_services \
             WHERE vendor_id = $1 AND is_active = TRUE \
             ORDER BY is_featured DESC, created_at ASC",
        )
        .bind(vendor_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_public_reviews(
        &self,
        vendor_id: Uuid,
        page: Page,
    ) -> RepoResult<(Vec<ReviewView>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reviews WHERE vendor_id = $1 AND status = $2 AND is_public = TRUE",
        )
        .bind(vendor_id)
        .bind(ReviewStatus::Approved.as_str())
        .fetch_one(&self.pool)
        .await?;

        let reviews = sqlx::query_as::<_, ReviewView>(
            "SELECT r.id, r.vendor_id, r.user_id, r.rating, r.title, r.content, r.status, \
               r.is_public, r.created_at, (u.first_name || ' ' || u.last_name) AS author_name \
             FROM reviews r JOIN users u ON u.id = r.user_id \
             WHERE r.vendor_id = $1 AND r.status = $2 AND r.is_public = TRUE \
             ORDER BY r.created_at DESC LIMIT $3 OFFSET $4",
        )
        .bind(vendor_id)
        .bind(ReviewStatus::Approved.as_str())
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((reviews, total))
    }

    async fn create_review(
        &self,
        vendor_id: Uuid,
        user_id: Uuid,
        r: &CreateReviewRequest,
    ) -> RepoResult<Review> {
        let query = format!(
            "INSERT INTO reviews (id, vendor_id, user_id, rating, title, content, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {REVIEW_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Review>(&query)
            .bind(Uuid::new_v4())
            .bind(vendor_id)
            .bind(user_id)
            .bind(r.rating)
            .bind(&r.title)
            .bind(&r.content)
            .bind(ReviewStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn set_review_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Review>> {
        let query = format!("UPDATE reviews SET status = $2 WHERE id = $1 RETURNING {REVIEW_COLUMNS}");
        Ok(sqlx::query_as::<_, Review>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn refresh_vendor_rating(&self, vendor_id: Uuid) -> RepoResult<Option<Vendor>> {
        let query = format!(
            "UPDATE vendors SET \
               average_rating = COALESCE((SELECT AVG(rating)::DOUBLE PRECISION FROM reviews \
                 WHERE vendor_id = $1 AND status = $2 AND is_public = TRUE), 0), \
               total_reviews = (SELECT COUNT(*)::INTEGER FROM reviews \
                 WHERE vendor_id = $1 AND status = $2 AND is_public = TRUE), \
               updated_at = NOW() \
             WHERE id = $1 RETURNING {VENDOR_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Vendor>(&query)
            .bind(vendor_id)
            .bind(ReviewStatus::Approved.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_vendors_by_status(
        &self,
        status: Option<&str>,
        page: Page,
    ) -> RepoResult<(Vec<Vendor>, i64)> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM vendors WHERE TRUE");
        push_eq(&mut count, "status", status);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE TRUE"));
        push_eq(&mut builder, "status", status);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());
        let vendors = builder
            .build_query_as::<Vendor>()
            .fetch_all(&self.pool)
            .await?;
        Ok((vendors, total))
    }

    async fn set_vendor_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Vendor>> {
        let query = format!(
            "UPDATE vendors SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {VENDOR_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Vendor>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- Community ---

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let query = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE is_active = TRUE ORDER BY name ASC"
        );
        Ok(sqlx::query_as::<_, Category>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_category(&self, id: Uuid) -> RepoResult<Option<Category>> {
        let query = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1");
        Ok(sqlx::query_as::<_, Category>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_posts(
        &self,
        category: Option<&str>,
        post_type: Option<&str>,
        page: Page,
    ) -> RepoResult<(Vec<PostView>, i64)> {
        fn push_filters<'a>(
            builder: &mut QueryBuilder<'a, Postgres>,
            category: Option<&'a str>,
            post_type: Option<&'a str>,
        ) {
            builder.push(" WHERE p.status = ");
            builder.push_bind(ContentStatus::Published.as_str());
            if let Some(category) = category {
                builder.push(" AND c.name ILIKE ");
                builder.push_bind(contains_pattern(category));
                builder.push(LIKE_ESCAPE);
            }
            if let Some(post_type) = post_type {
                builder.push(" AND p.type = ");
                builder.push_bind(post_type);
            }
        }

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM posts p LEFT JOIN categories c ON c.id = p.category_id",
        );
        push_filters(&mut count, category, post_type);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(POST_VIEW_SELECT);
        push_filters(&mut builder, category, post_type);
        builder.push(" ORDER BY p.created_at DESC LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());
        let posts = builder
            .build_query_as::<PostView>()
            .fetch_all(&self.pool)
            .await?;
        Ok((posts, total))
    }

    async fn find_post(&self, id: Uuid) -> RepoResult<Option<PostView>> {
        let query = format!("{POST_VIEW_SELECT} WHERE p.id = $1");
        Ok(sqlx::query_as::<_, PostView>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn increment_post_views(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_post(&self, p: NewPost) -> RepoResult<Post> {
        let query = format!(
            "INSERT INTO posts (id, user_id, category_id, title, content, slug, type, status, \
               tags, published_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW()) RETURNING {POST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(Uuid::new_v4())
            .bind(p.user_id)
            .bind(p.category_id)
            .bind(&p.title)
            .bind(&p.content)
            .bind(&p.slug)
            .bind(p.post_type.as_str())
            .bind(ContentStatus::Published.as_str())
            .bind(&p.tags)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn set_post_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Post>> {
        let query = format!(
            "UPDATE posts SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_post_comments(&self, post_id: Uuid) -> RepoResult<Vec<CommentView>> {
        Ok(sqlx::query_as::<_, CommentView>(
            "SELECT c.id, c.post_id, c.parent_id, c.user_id, c.content, c.status, c.created_at, \
               (u.first_name || ' ' || u.last_name) AS author_name \
             FROM comments c JOIN users u ON u.id = c.user_id \
             WHERE c.post_id = $1 AND c.status = $2 ORDER BY c.created_at ASC",
        )
        .bind(post_id)
        .bind(ContentStatus::Published.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_comment(&self, id: Uuid) -> RepoResult<Option<Comment>> {
        let query = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_comment(&self, c: NewComment) -> RepoResult<Comment> {
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "INSERT INTO comments (id, post_id, parent_id, user_id, content, status) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COMMENT_COLUMNS}"
        );
        let comment = sqlx::query_as::<_, Comment>(&query)
            .bind(Uuid::new_v4())
            .bind(c.post_id)
            .bind(c.parent_id)
            .bind(c.user_id)
            .bind(&c.content)
            .bind(ContentStatus::Published.as_str())
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("UPDATE posts SET comment_count = comment_count + 1 WHERE id = $1")
            .bind(c.post_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(comment)
    }

    async fn set_comment_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Comment>> {
        let mut tx = self.pool.begin().await?;
        let query =
            format!("UPDATE comments SET status = $2 WHERE id = $1 RETURNING {COMMENT_COLUMNS}");
        let comment = sqlx::query_as::<_, Comment>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(comment) = &comment {
            sqlx::query(
                "UPDATE posts SET comment_count = \
                   (SELECT COUNT(*) FROM comments WHERE post_id = $1 AND status = $2) \
                 WHERE id = $1",
            )
            .bind(comment.post_id)
            .bind(ContentStatus::Published.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(comment)
    }

    async fn follow(
        &self,
        user_id: Uuid,
        target: FollowTarget,
        target_id: Uuid,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            "INSERT INTO follows (user_id, target_type, target_id) VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(target.as_str())
        .bind(target_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(
        &self,
        user_id: Uuid,
        target: FollowTarget,
        target_id: Uuid,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            "DELETE FROM follows WHERE user_id = $1 AND target_type = $2 AND target_id = $3",
        )
        .bind(user_id)
        .bind(target.as_str())
        .bind(target_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn followed_categories(&self, user_id: Uuid) -> RepoResult<Vec<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT c.id, c.name, c.slug, c.description, c.is_active, c.created_at \
             FROM categories c JOIN follows f ON f.target_id = c.id AND f.target_type = $2 \
             WHERE f.user_id = $1 ORDER BY c.name ASC",
        )
        .bind(user_id)
        .bind(FollowTarget::Category.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn followed_posts(&self, user_id: Uuid) -> RepoResult<Vec<PostView>> {
        let query = format!(
            "{POST_VIEW_SELECT} JOIN follows f ON f.target_id = p.id AND f.target_type = $2 \
             WHERE f.user_id = $1 AND p.status = $3 ORDER BY f.created_at DESC"
        );
        Ok(sqlx::query_as::<_, PostView>(&query)
            .bind(user_id)
            .bind(FollowTarget::Post.as_str())
            .bind(ContentStatus::Published.as_str())
            .fetch_all(&self.pool)
            .await?)
    }

    // --- AI readiness ---

    async fn list_surveys(
        &self,
        category: Option<&str>,
        public_only: bool,
        page: Page,
    ) -> RepoResult<(Vec<SurveySummary>, i64)> {
        fn push_filters<'a>(
            builder: &mut QueryBuilder<'a, Postgres>,
            category: Option<&'a str>,
            public_only: bool,
        ) {
            builder.push(" WHERE s.status = ");
            builder.push_bind(SurveyStatus::Active.as_str());
            push_eq(builder, "s.category", category);
            if public_only {
                builder.push(" AND s.is_public = TRUE");
            }
        }

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM surveys s");
        push_filters(&mut count, category, public_only);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT s.id, s.title, s.description, s.category, s.time_limit, s.max_attempts, \
               s.passing_score, s.is_public, s.status, s.total_responses, s.average_score, \
               s.created_by, s.created_at, s.updated_at, \
               (SELECT COUNT(*) FROM questions q WHERE q.survey_id = s.id) AS question_count \
             FROM surveys s",
        );
        push_filters(&mut builder, category, public_only);
        builder.push(" ORDER BY s.created_at DESC LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());
        let surveys = builder
            .build_query_as::<SurveySummary>()
            .fetch_all(&self.pool)
            .await?;
        Ok((surveys, total))
    }

    async fn find_survey(&self, id: Uuid) -> RepoResult<Option<Survey>> {
        let query = format!("SELECT {SURVEY_COLUMNS} FROM surveys WHERE id = $1");
        Ok(sqlx::query_as::<_, Survey>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn survey_questions(&self, survey_id: Uuid) -> RepoResult<Vec<Question>> {
        let query = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE survey_id = $1 ORDER BY position ASC"
        );
        Ok(sqlx::query_as::<_, Question>(&query)
            .bind(survey_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_survey(&self, s: NewSurvey) -> RepoResult<SurveyDetail> {
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "INSERT INTO surveys (id, title, description, category, time_limit, max_attempts, \
               passing_score, is_public, status, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {SURVEY_COLUMNS}"
        );
        let survey = sqlx::query_as::<_, Survey>(&query)
            .bind(Uuid::new_v4())
            .bind(&s.title)
            .bind(&s.description)
            .bind(&s.category)
            .bind(s.time_limit)
            .bind(s.max_attempts)
            .bind(s.passing_score)
            .bind(s.is_public)
            .bind(SurveyStatus::Active.as_str())
            .bind(s.created_by)
            .fetch_one(&mut *tx)
            .await?;

        let question_query = format!(
            "INSERT INTO questions (id, survey_id, text, question_type, options, max_score, \
               position, required) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {QUESTION_COLUMNS}"
        );
        let mut questions = Vec::with_capacity(s.questions.len());
        for q in &s.questions {
            let question = sqlx::query_as::<_, Question>(&question_query)
                .bind(Uuid::new_v4())
                .bind(survey.id)
                .bind(&q.text)
                .bind(q.question_type.as_str())
                .bind(Json(&q.options))
                .bind(q.max_score)
                .bind(q.position)
                .bind(q.required)
                .fetch_one(&mut *tx)
                .await?;
            questions.push(question);
        }
        tx.commit().await?;
        Ok(SurveyDetail { survey, questions })
    }

    async fn count_user_responses(&self, survey_id: Uuid, user_id: Uuid) -> RepoResult<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM survey_responses WHERE survey_id = $1 AND user_id = $2",
        )
        .bind(survey_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn record_survey_response(&self, r: NewSurveyResponse) -> RepoResult<SurveyResponse> {
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "INSERT INTO survey_responses (id, survey_id, user_id, status, total_score, \
               max_score, percentage, grade, passed, device_info, feedback, completed_at) \
             VALUES ($1, $2, $3, 'COMPLETED', $4, $5, $6, $7, $8, $9, $10, NOW()) \
             RETURNING {RESPONSE_COLUMNS}"
        );
        let response = sqlx::query_as::<_, SurveyResponse>(&query)
            .bind(Uuid::new_v4())
            .bind(r.survey_id)
            .bind(r.user_id)
            .bind(r.total_score)
            .bind(r.max_score)
            .bind(r.percentage)
            .bind(&r.grade)
            .bind(r.passed)
            .bind(&r.device_info)
            .bind(&r.feedback)
            .fetch_one(&mut *tx)
            .await?;

        for answer in &r.answers {
            sqlx::query(
                "INSERT INTO question_responses (id, response_id, question_id, answer, score, \
                   time_spent) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(response.id)
            .bind(answer.question_id)
            .bind(&answer.answer)
            .bind(answer.score)
            .bind(answer.time_spent)
            .execute(&mut *tx)
            .await?;
        }

        // Running mean: new_avg = (avg * n + pct) / (n + 1).
        sqlx::query(
            "UPDATE surveys SET \
               average_score = (average_score * total_responses + $2) / (total_responses + 1), \
               total_responses = total_responses + 1, \
               updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(r.survey_id)
        .bind(r.percentage)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(response)
    }

    async fn list_user_responses(&self, user_id: Uuid) -> RepoResult<Vec<MyResponseView>> {
        Ok(sqlx::query_as::<_, MyResponseView>(
            "SELECT r.id, r.survey_id, r.user_id, r.status, r.total_score, r.max_score, \
               r.percentage, r.grade, r.passed, r.device_info, r.feedback, r.completed_at, \
               r.created_at, s.title AS survey_title, s.category AS survey_category \
             FROM survey_responses r JOIN surveys s ON s.id = r.survey_id \
             WHERE r.user_id = $1 ORDER BY r.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // --- Admin ---

    async fn count_users_by_status(&self) -> RepoResult<Vec<StatusCount>> {
        Ok(sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM users GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count_vendors_by_status(&self) -> RepoResult<Vec<StatusCount>> {
        Ok(sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM vendors GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn survey_response_stats(&self) -> RepoResult<SurveyStats> {
        let (total_responses, average_score): (i64, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), AVG(percentage)::DOUBLE PRECISION FROM survey_responses",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(SurveyStats {
            total_responses,
            average_score: average_score.unwrap_or(0.0),
        })
    }

    async fn count_published_posts(&self) -> RepoResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE status = $1")
            .bind(ContentStatus::Published.as_str())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_settings(&self, public_only: bool) -> RepoResult<Vec<PlatformSetting>> {
        let query = format!(
            "SELECT {SETTING_COLUMNS} FROM platform_settings \
             WHERE ($1 = FALSE OR is_public = TRUE) ORDER BY key"
        );
        Ok(sqlx::query_as::<_, PlatformSetting>(&query)
            .bind(public_only)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn upsert_setting(
        &self,
        key: &str,
        update: &UpdateSettingRequest,
    ) -> RepoResult<PlatformSetting> {
        let query = format!(
            "INSERT INTO platform_settings (key, value, description, is_public, updated_at) \
             VALUES ($1, $2, $3, COALESCE($4, FALSE), NOW()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, \
               description = COALESCE($3, platform_settings.description), \
               is_public = COALESCE($4, platform_settings.is_public), \
               updated_at = NOW() \
             RETURNING {SETTING_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, PlatformSetting>(&query)
            .bind(key)
            .bind(&update.value)
            .bind(&update.description)
            .bind(update.is_public)
            .fetch_one(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("acme"), "%acme%");
        assert_eq!(contains_pattern("%"), "%\\%%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
        assert_eq!(contains_pattern("c:\\x"), "%c:\\\\x%");
    }
}
