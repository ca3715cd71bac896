use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Repository;
use crate::{
    error::{RepoResult, RepositoryError},
    models::{
        Category, Comment, CommentView, ContentStatus, CreateReviewRequest, CreateVendorRequest,
        FollowTarget, MyResponseView, NewComment, NewPost, NewSession, NewSurvey,
        NewSurveyResponse, NewUser, OAuthState, PlatformSetting, Post, PostView, Profile,
        Question, QuestionResponse, Review, ReviewStatus, ReviewView, Session, StatusCount,
        Survey, SurveyDetail, SurveyResponse, SurveyStats, SurveyStatus, SurveySummary,
        UpdateProfileRequest, UpdateSettingRequest, User, UserStatus, Vendor, VendorSearch,
        VendorService, VendorStatus,
    },
    pagination::Page,
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    profiles: HashMap<Uuid, Profile>,
    sessions: Vec<Session>,
    oauth_states: HashMap<String, OAuthState>,
    vendors: Vec<Vendor>,
    services: Vec<VendorService>,
    reviews: Vec<Review>,
    categories: Vec<Category>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    follows: HashSet<(Uuid, FollowTarget, Uuid)>,
    // Insertion order doubles as the follow timestamp ordering.
    follow_order: Vec<(Uuid, FollowTarget, Uuid)>,
    surveys: Vec<Survey>,
    questions: Vec<Question>,
    responses: Vec<SurveyResponse>,
    question_responses: Vec<QuestionResponse>,
    settings: Vec<PlatformSetting>,
}

impl State {
    fn user_mut(&mut self, id: Uuid) -> RepoResult<&mut User> {
        self.users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))
    }

    fn author_name(&self, user_id: Uuid) -> String {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| format!("{} {}", u.first_name, u.last_name))
            .unwrap_or_default()
    }

    fn post_view(&self, post: &Post) -> PostView {
        PostView {
            author_name: self.author_name(post.user_id),
            category_name: post.category_id.and_then(|id| {
                self.categories
                    .iter()
                    .find(|c| c.id == id)
                    .map(|c| c.name.clone())
            }),
            post: post.clone(),
        }
    }

    fn published_comment_count(&self, post_id: Uuid) -> i32 {
        self.comments
            .iter()
            .filter(|c| c.post_id == post_id && c.status == ContentStatus::Published.as_str())
            .count() as i32
    }
}

/// InMemoryRepository
///
/// A process-local `Repository` with the same observable semantics as the Postgres
/// implementation: unique keys report `Duplicate`, dangling references report
/// `ConstraintViolation`. Backs the router tests and `DATABASE_URL`-less experiments.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds an active category. Categories are managed out of band (migrations or SQL).
    pub fn insert_category(&self, name: &str, slug: &str) -> Category {
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            description: None,
            is_active: true,
            created_at: Utc::now(),
        };
        self.state().categories.push(category.clone());
        category
    }

    pub fn insert_vendor_service(&self, vendor_id: Uuid, name: &str, featured: bool) -> VendorService {
        let service = VendorService {
            id: Uuid::new_v4(),
            vendor_id,
            name: name.to_string(),
            description: None,
            category: None,
            base_price: None,
            price_unit: None,
            is_active: true,
            is_featured: featured,
            created_at: Utc::now(),
        };
        self.state().services.push(service.clone());
        service
    }

    /// Per-question rows recorded for a response, in submission order.
    pub fn question_responses(&self, response_id: Uuid) -> Vec<QuestionResponse> {
        self.state()
            .question_responses
            .iter()
            .filter(|q| q.response_id == response_id)
            .cloned()
            .collect()
    }
}

fn paginate<T: Clone>(items: &[T], page: Page) -> Vec<T> {
    items
        .iter()
        .skip(page.offset().max(0) as usize)
        .take(page.limit.max(0) as usize)
        .cloned()
        .collect()
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

fn rating_order(a: &Vendor, b: &Vendor) -> std::cmp::Ordering {
    b.average_rating
        .total_cmp(&a.average_rating)
        .then(b.total_reviews.cmp(&a.total_reviews))
        .then(b.created_at.cmp(&a.created_at))
}

fn count_by_status<'a>(statuses: impl Iterator<Item = &'a str>) -> Vec<StatusCount> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for status in statuses {
        *counts.entry(status).or_default() += 1;
    }
    let mut result: Vec<StatusCount> = counts
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status.to_string(),
            count,
        })
        .collect();
    result.sort_by(|a, b| a.status.cmp(&b.status));
    result
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }

    // --- Users ---

    async fn find_user_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.state().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.state().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> RepoResult<Option<User>> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn find_user_by_verification_token(&self, token: &str) -> RepoResult<Option<User>> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|u| u.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_user_by_reset_token(&self, token: &str) -> RepoResult<Option<User>> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|u| u.reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut state = self.state();
        if state.users.iter().any(|u| u.email == new.email) {
            return Err(RepositoryError::Duplicate("users.email".into()));
        }
        if new.google_id.is_some() && state.users.iter().any(|u| u.google_id == new.google_id) {
            return Err(RepositoryError::Duplicate("users.google_id".into()));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            avatar_url: new.avatar_url,
            role: new.role.as_str().to_string(),
            status: new.status.as_str().to_string(),
            email_verified: new.email_verified,
            verification_token: new.verification_token,
            verification_expires: new.verification_expires,
            reset_token: None,
            reset_expires: None,
            google_id: new.google_id,
            login_attempts: 0,
            locked_until: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> RepoResult<User> {
        let mut state = self.state();
        let user = state.user_mut(id)?;
        if user.login_attempts + 1 >= max_attempts {
            user.login_attempts = 0;
            user.locked_until = Some(lock_until);
        } else {
            user.login_attempts += 1;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn record_successful_login(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        let mut state = self.state();
        let user = state.user_mut(id)?;
        user.login_attempts = 0;
        user.locked_until = None;
        user.last_login = Some(at);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_email_verified(&self, id: Uuid) -> RepoResult<()> {
        let mut state = self.state();
        let user = state.user_mut(id)?;
        user.email_verified = true;
        user.verification_token = None;
        user.verification_expires = None;
        if user.status == UserStatus::PendingVerification.as_str() {
            user.status = UserStatus::Active.as_str().to_string();
        }
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> RepoResult<()> {
        let mut state = self.state();
        let user = state.user_mut(id)?;
        user.reset_token = Some(token.to_string());
        user.reset_expires = Some(expires);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepoResult<()> {
        let mut state = self.state();
        let user = state.user_mut(id)?;
        user.password_hash = Some(password_hash.to_string());
        user.reset_token = None;
        user.reset_expires = None;
        user.login_attempts = 0;
        user.locked_until = None;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn link_google_account(
        &self,
        id: Uuid,
        google_id: &str,
        avatar_url: Option<&str>,
    ) -> RepoResult<User> {
        let mut state = self.state();
        if state
            .users
            .iter()
            .any(|u| u.id != id && u.google_id.as_deref() == Some(google_id))
        {
            return Err(RepositoryError::Duplicate("users.google_id".into()));
        }
        let user = state.user_mut(id)?;
        user.google_id = Some(google_id.to_string());
        if user.avatar_url.is_none() {
            user.avatar_url = avatar_url.map(String::from);
        }
        user.email_verified = true;
        if user.status == UserStatus::PendingVerification.as_str() {
            user.status = UserStatus::Active.as_str().to_string();
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_user_names(
        &self,
        id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> RepoResult<User> {
        let mut state = self.state();
        let user = state.user_mut(id)?;
        if let Some(first) = first_name {
            user.first_name = first.to_string();
        }
        if let Some(last) = last_name {
            user.last_name = last.to_string();
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn list_users(
        &self,
        role: Option<&str>,
        status: Option<&str>,
        page: Page,
    ) -> RepoResult<(Vec<User>, i64)> {
        let state = self.state();
        let mut users: Vec<User> = state
            .users
            .iter()
            .filter(|u| role.is_none_or(|r| u.role == r))
            .filter(|u| status.is_none_or(|s| u.status == s))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((paginate(&users, page), users.len() as i64))
    }

    async fn set_user_status(&self, id: Uuid, status: &str) -> RepoResult<Option<User>> {
        let mut state = self.state();
        Ok(state.users.iter_mut().find(|u| u.id == id).map(|user| {
            user.status = status.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_user_role(&self, id: Uuid, role: &str) -> RepoResult<Option<User>> {
        let mut state = self.state();
        Ok(state.users.iter_mut().find(|u| u.id == id).map(|user| {
            user.role = role.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    // --- Profiles ---

    async fn get_profile(&self, user_id: Uuid) -> RepoResult<Option<Profile>> {
        Ok(self.state().profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        u: &UpdateProfileRequest,
    ) -> RepoResult<Profile> {
        let mut state = self.state();
        if !state.users.iter().any(|user| user.id == user_id) {
            return Err(RepositoryError::ConstraintViolation("profiles.user_id".into()));
        }
        let profile = state.profiles.entry(user_id).or_insert_with(|| Profile {
            user_id,
            email_notifications: true,
            ..Default::default()
        });
        macro_rules! merge {
            ($($field:ident),+) => {
                $(if u.$field.is_some() {
                    profile.$field = u.$field.clone();
                })+
            };
        }
        merge!(
            bio, phone, country, state, city, address, postal_code, job_title, company,
            industry, experience_years, website, linkedin, timezone, language
        );
        if let Some(notify) = u.email_notifications {
            profile.email_notifications = notify;
        }
        profile.updated_at = Some(Utc::now());
        Ok(profile.clone())
    }

    // --- Sessions ---

    async fn create_session(&self, new: NewSession) -> RepoResult<Session> {
        let mut state = self.state();
        if state
            .sessions
            .iter()
            .any(|s| s.token == new.token || s.refresh_token == new.refresh_token)
        {
            return Err(RepositoryError::Duplicate("sessions.token".into()));
        }
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            token: new.token,
            refresh_token: new.refresh_token,
            device_info: new.device_info,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            expires_at: new.expires_at,
            refresh_expires_at: new.refresh_expires_at,
            created_at: Utc::now(),
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_session_by_token(&self, token: &str) -> RepoResult<Option<Session>> {
        Ok(self.state().sessions.iter().find(|s| s.token == token).cloned())
    }

    async fn find_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> RepoResult<Option<Session>> {
        Ok(self
            .state()
            .sessions
            .iter()
            .find(|s| s.refresh_token == refresh_token)
            .cloned())
    }

    async fn rotate_session(
        &self,
        id: Uuid,
        token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> RepoResult<Option<Session>> {
        let mut state = self.state();
        Ok(state.sessions.iter_mut().find(|s| s.id == id).map(|session| {
            session.token = token.to_string();
            session.refresh_token = refresh_token.to_string();
            session.expires_at = expires_at;
            session.refresh_expires_at = refresh_expires_at;
            session.clone()
        }))
    }

    async fn delete_session(&self, id: Uuid) -> RepoResult<bool> {
        let mut state = self.state();
        let before = state.sessions.len();
        state.sessions.retain(|s| s.id != id);
        Ok(state.sessions.len() < before)
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> RepoResult<u64> {
        let mut state = self.state();
        let before = state.sessions.len();
        state.sessions.retain(|s| s.user_id != user_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut state = self.state();
        let before = state.sessions.len();
        state.sessions.retain(|s| s.refresh_expires_at > now);
        Ok((before - state.sessions.len()) as u64)
    }

    // --- OAuth state ---

    async fn create_oauth_state(&self, oauth_state: OAuthState) -> RepoResult<()> {
        let mut state = self.state();
        if state.oauth_states.contains_key(&oauth_state.state) {
            return Err(RepositoryError::Duplicate("oauth_states.state".into()));
        }
        state
            .oauth_states
            .insert(oauth_state.state.clone(), oauth_state);
        Ok(())
    }

    async fn take_oauth_state(&self, key: &str) -> RepoResult<Option<OAuthState>> {
        Ok(self.state().oauth_states.remove(key))
    }

    async fn purge_expired_oauth_states(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut state = self.state();
        let before = state.oauth_states.len();
        state.oauth_states.retain(|_, s| s.expires_at > now);
        Ok((before - state.oauth_states.len()) as u64)
    }

    // --- Vendors ---

    async fn list_vendors(
        &self,
        search: &VendorSearch,
        page: Page,
    ) -> RepoResult<(Vec<Vendor>, i64)> {
        let state = self.state();
        let mut vendors: Vec<Vendor> = state
            .vendors
            .iter()
            .filter(|v| v.status == VendorStatus::Active.as_str())
            .filter(|v| {
                search.query.as_deref().is_none_or(|q| {
                    contains_ci(Some(&v.company_name), q)
                        || contains_ci(Some(&v.business_name), q)
                        || contains_ci(Some(&v.description), q)
                })
            })
            .filter(|v| {
                search
                    .country
                    .as_deref()
                    .is_none_or(|c| contains_ci(v.country.as_deref(), c))
            })
            .filter(|v| {
                search
                    .city
                    .as_deref()
                    .is_none_or(|c| contains_ci(v.city.as_deref(), c))
            })
            .filter(|v| search.min_rating.is_none_or(|min| v.average_rating >= min))
            .cloned()
            .collect();
        vendors.sort_by(rating_order);
        Ok((paginate(&vendors, page), vendors.len() as i64))
    }

    async fn popular_vendors(&self, limit: i64) -> RepoResult<Vec<Vendor>> {
        let state = self.state();
        let mut vendors: Vec<Vendor> = state
            .vendors
            .iter()
            .filter(|v| v.status == VendorStatus::Active.as_str() && v.total_reviews > 0)
            .cloned()
            .collect();
        vendors.sort_by(rating_order);
        vendors.truncate(limit.max(0) as usize);
        Ok(vendors)
    }

    async fn find_vendor(&self, id: Uuid) -> RepoResult<Option<Vendor>> {
        Ok(self.state().vendors.iter().find(|v| v.id == id).cloned())
    }

    async fn find_vendor_by_user(&self, user_id: Uuid) -> RepoResult<Option<Vendor>> {
        Ok(self
            .state()
            .vendors
            .iter()
            .find(|v| v.user_id == Some(user_id))
            .cloned())
    }

    async fn create_vendor(&self, user_id: Uuid, r: &CreateVendorRequest) -> RepoResult<Vendor> {
        let mut state = self.state();
        if state.vendors.iter().any(|v| v.user_id == Some(user_id)) {
            return Err(RepositoryError::Duplicate("vendors.user_id".into()));
        }
        let now = Utc::now();
        let vendor = Vendor {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            company_name: r.company_name.clone(),
            business_name: r.business_name.clone(),
            description: r.description.clone(),
            email: r.email.clone(),
            phone: r.phone.clone(),
            website: r.website.clone(),
            address: r.address.clone(),
            city: r.city.clone(),
            state: r.state.clone(),
            country: r.country.clone(),
            postal_code: r.postal_code.clone(),
            business_type: r.business_type.clone(),
            year_established: r.year_established,
            employee_count: r.employee_count.clone(),
            status: VendorStatus::PendingApproval.as_str().to_string(),
            average_rating: 0.0,
            total_reviews: 0,
            created_at: now,
            updated_at: now,
        };
        state.vendors.push(vendor.clone());
        Ok(vendor)
    }

    async fn vendor_services(&self, vendor_id: Uuid) -> RepoResult<Vec<VendorService>> {
        let state = self.state();
        let mut services: Vec<VendorService> = state
            .services
            .iter()
            .filter(|s| s.vendor_id == vendor_id && s.is_active)
            .cloned()
            .collect();
        services.sort_by(|a, b| {
            b.is_featured
                .cmp(&a.is_featured)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(services)
    }

    async fn list_public_reviews(
        &self,
        vendor_id: Uuid,
        page: Page,
    ) -> RepoResult<(Vec<ReviewView>, i64)> {
        let state = self.state();
        let mut reviews: Vec<ReviewView> = state
            .reviews
            .iter()
            .filter(|r| {
                r.vendor_id == vendor_id
                    && r.status == ReviewStatus::Approved.as_str()
                    && r.is_public
            })
            .map(|r| ReviewView {
                author_name: state.author_name(r.user_id),
                review: r.clone(),
            })
            .collect();
        reviews.sort_by(|a, b| b.review.created_at.cmp(&a.review.created_at));
        Ok((paginate(&reviews, page), reviews.len() as i64))
    }

    async fn create_review(
        &self,
        vendor_id: Uuid,
        user_id: Uuid,
        r: &CreateReviewRequest,
    ) -> RepoResult<Review> {
        let mut state = self.state();
        if !state.vendors.iter().any(|v| v.id == vendor_id) {
            return Err(RepositoryError::ConstraintViolation("reviews.vendor_id".into()));
        }
        if state
            .reviews
            .iter()
            .any(|rev| rev.vendor_id == vendor_id && rev.user_id == user_id)
        {
            return Err(RepositoryError::Duplicate("reviews.vendor_id_user_id".into()));
        }
        let review = Review {
            id: Uuid::new_v4(),
            vendor_id,
            user_id,
            rating: r.rating,
            title: r.title.clone(),
            content: r.content.clone(),
            status: ReviewStatus::Pending.as_str().to_string(),
            is_public: true,
            created_at: Utc::now(),
        };
        state.reviews.push(review.clone());
        Ok(review)
    }

    async fn set_review_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Review>> {
        let mut state = self.state();
        Ok(state.reviews.iter_mut().find(|r| r.id == id).map(|review| {
            review.status = status.to_string();
            review.clone()
        }))
    }

    async fn refresh_vendor_rating(&self, vendor_id: Uuid) -> RepoResult<Option<Vendor>> {
        let mut state = self.state();
        let ratings: Vec<i32> = state
            .reviews
            .iter()
            .filter(|r| {
                r.vendor_id == vendor_id
                    && r.status == ReviewStatus::Approved.as_str()
                    && r.is_public
            })
            .map(|r| r.rating)
            .collect();
        let average = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().sum::<i32>() as f64 / ratings.len() as f64
        };
        Ok(state
            .vendors
            .iter_mut()
            .find(|v| v.id == vendor_id)
            .map(|vendor| {
                vendor.average_rating = average;
                vendor.total_reviews = ratings.len() as i32;
                vendor.updated_at = Utc::now();
                vendor.clone()
            }))
    }

    async fn list_vendors_by_status(
        &self,
        status: Option<&str>,
        page: Page,
    ) -> RepoResult<(Vec<Vendor>, i64)> {
        let state = self.state();
        let mut vendors: Vec<Vendor> = state
            .vendors
            .iter()
            .filter(|v| status.is_none_or(|s| v.status == s))
            .cloned()
            .collect();
        vendors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((paginate(&vendors, page), vendors.len() as i64))
    }

    async fn set_vendor_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Vendor>> {
        let mut state = self.state();
        Ok(state.vendors.iter_mut().find(|v| v.id == id).map(|vendor| {
            vendor.status = status.to_string();
            vendor.updated_at = Utc::now();
            vendor.clone()
        }))
    }

    // --- Community ---

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let mut categories: Vec<Category> = self
            .state()
            .categories
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn find_category(&self, id: Uuid) -> RepoResult<Option<Category>> {
        Ok(self.state().categories.iter().find(|c| c.id == id).cloned())
    }

    async fn list_posts(
        &self,
        category: Option<&str>,
        post_type: Option<&str>,
        page: Page,
    ) -> RepoResult<(Vec<PostView>, i64)> {
        let state = self.state();
        let mut posts: Vec<PostView> = state
            .posts
            .iter()
            .filter(|p| p.status == ContentStatus::Published.as_str())
            .filter(|p| post_type.is_none_or(|t| p.post_type == t))
            .map(|p| state.post_view(p))
            .filter(|p| category.is_none_or(|c| contains_ci(p.category_name.as_deref(), c)))
            .collect();
        posts.sort_by(|a, b| b.post.created_at.cmp(&a.post.created_at));
        Ok((paginate(&posts, page), posts.len() as i64))
    }

    async fn find_post(&self, id: Uuid) -> RepoResult<Option<PostView>> {
        let state = self.state();
        Ok(state
            .posts
            .iter()
            .find(|p| p.id == id)
            .map(|p| state.post_view(p)))
    }

    async fn increment_post_views(&self, id: Uuid) -> RepoResult<()> {
        if let Some(post) = self.state().posts.iter_mut().find(|p| p.id == id) {
            post.view_count += 1;
        }
        Ok(())
    }

    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        let mut state = self.state();
        if state.posts.iter().any(|p| p.slug == new.slug) {
            return Err(RepositoryError::Duplicate("posts.slug".into()));
        }
        if new
            .category_id
            .is_some_and(|id| !state.categories.iter().any(|c| c.id == id))
        {
            return Err(RepositoryError::ConstraintViolation("posts.category_id".into()));
        }
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            category_id: new.category_id,
            title: new.title,
            content: new.content,
            slug: new.slug,
            post_type: new.post_type.as_str().to_string(),
            status: ContentStatus::Published.as_str().to_string(),
            tags: new.tags,
            view_count: 0,
            comment_count: 0,
            published_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        state.posts.push(post.clone());
        Ok(post)
    }

    async fn set_post_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Post>> {
        let mut state = self.state();
        Ok(state.posts.iter_mut().find(|p| p.id == id).map(|post| {
            post.status = status.to_string();
            post.updated_at = Utc::now();
            post.clone()
        }))
    }

    async fn list_post_comments(&self, post_id: Uuid) -> RepoResult<Vec<CommentView>> {
        let state = self.state();
        let mut comments: Vec<CommentView> = state
            .comments
            .iter()
            .filter(|c| c.post_id == post_id && c.status == ContentStatus::Published.as_str())
            .map(|c| CommentView {
                author_name: state.author_name(c.user_id),
                comment: c.clone(),
            })
            .collect();
        comments.sort_by(|a, b| a.comment.created_at.cmp(&b.comment.created_at));
        Ok(comments)
    }

    async fn find_comment(&self, id: Uuid) -> RepoResult<Option<Comment>> {
        Ok(self.state().comments.iter().find(|c| c.id == id).cloned())
    }

    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        let mut state = self.state();
        if !state.posts.iter().any(|p| p.id == new.post_id) {
            return Err(RepositoryError::ConstraintViolation("comments.post_id".into()));
        }
        let comment = Comment {
            id: Uuid::new_v4(),
            post_id: new.post_id,
            parent_id: new.parent_id,
            user_id: new.user_id,
            content: new.content,
            status: ContentStatus::Published.as_str().to_string(),
            created_at: Utc::now(),
        };
        state.comments.push(comment.clone());
        if let Some(post) = state.posts.iter_mut().find(|p| p.id == new.post_id) {
            post.comment_count += 1;
        }
        Ok(comment)
    }

    async fn set_comment_status(&self, id: Uuid, status: &str) -> RepoResult<Option<Comment>> {
        let mut state = self.state();
        let Some(comment) = state.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        comment.status = status.to_string();
        let comment = comment.clone();
        let count = state.published_comment_count(comment.post_id);
        if let Some(post) = state.posts.iter_mut().find(|p| p.id == comment.post_id) {
            post.comment_count = count;
        }
        Ok(Some(comment))
    }

    async fn follow(
        &self,
        user_id: Uuid,
        target: FollowTarget,
        target_id: Uuid,
    ) -> RepoResult<bool> {
        let mut state = self.state();
        let key = (user_id, target, target_id);
        if !state.follows.insert(key) {
            return Ok(false);
        }
        state.follow_order.push(key);
        Ok(true)
    }

    async fn unfollow(
        &self,
        user_id: Uuid,
        target: FollowTarget,
        target_id: Uuid,
    ) -> RepoResult<bool> {
        let mut state = self.state();
        let key = (user_id, target, target_id);
        if !state.follows.remove(&key) {
            return Ok(false);
        }
        state.follow_order.retain(|k| *k != key);
        Ok(true)
    }

    async fn followed_categories(&self, user_id: Uuid) -> RepoResult<Vec<Category>> {
        let state = self.state();
        let mut categories: Vec<Category> = state
            .categories
            .iter()
            .filter(|c| state.follows.contains(&(user_id, FollowTarget::Category, c.id)))
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn followed_posts(&self, user_id: Uuid) -> RepoResult<Vec<PostView>> {
        let state = self.state();
        Ok(state
            .follow_order
            .iter()
            .rev()
            .filter(|(uid, target, _)| *uid == user_id && *target == FollowTarget::Post)
            .filter_map(|(_, _, post_id)| state.posts.iter().find(|p| p.id == *post_id))
            .filter(|p| p.status == ContentStatus::Published.as_str())
            .map(|p| state.post_view(p))
            .collect())
    }

    // --- AI readiness ---

    async fn list_surveys(
        &self,
        category: Option<&str>,
        public_only: bool,
        page: Page,
    ) -> RepoResult<(Vec<SurveySummary>, i64)> {
        let state = self.state();
        let mut surveys: Vec<SurveySummary> = state
            .surveys
            .iter()
            .filter(|s| s.status == SurveyStatus::Active.as_str())
            .filter(|s| category.is_none_or(|c| s.category.as_deref() == Some(c)))
            .filter(|s| !public_only || s.is_public)
            .map(|s| SurveySummary {
                question_count: state.questions.iter().filter(|q| q.survey_id == s.id).count()
                    as i64,
                survey: s.clone(),
            })
            .collect();
        surveys.sort_by(|a, b| b.survey.created_at.cmp(&a.survey.created_at));
        Ok((paginate(&surveys, page), surveys.len() as i64))
    }

    async fn find_survey(&self, id: Uuid) -> RepoResult<Option<Survey>> {
        Ok(self.state().surveys.iter().find(|s| s.id == id).cloned())
    }

    async fn survey_questions(&self, survey_id: Uuid) -> RepoResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .state()
            .questions
            .iter()
            .filter(|q| q.survey_id == survey_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.position);
        Ok(questions)
    }

    async fn create_survey(&self, new: NewSurvey) -> RepoResult<SurveyDetail> {
        let mut state = self.state();
        let now = Utc::now();
        let survey = Survey {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            category: new.category,
            time_limit: new.time_limit,
            max_attempts: new.max_attempts,
            passing_score: new.passing_score,
            is_public: new.is_public,
            status: SurveyStatus::Active.as_str().to_string(),
            total_responses: 0,
            average_score: 0.0,
            created_by: Some(new.created_by),
            created_at: now,
            updated_at: now,
        };
        let questions: Vec<Question> = new
            .questions
            .into_iter()
            .map(|q| Question {
                id: Uuid::new_v4(),
                survey_id: survey.id,
                text: q.text,
                question_type: q.question_type.as_str().to_string(),
                options: q.options,
                max_score: q.max_score,
                position: q.position,
                required: q.required,
            })
            .collect();
        state.surveys.push(survey.clone());
        state.questions.extend(questions.iter().cloned());
        Ok(SurveyDetail { survey, questions })
    }

    async fn count_user_responses(&self, survey_id: Uuid, user_id: Uuid) -> RepoResult<i64> {
        Ok(self
            .state()
            .responses
            .iter()
            .filter(|r| r.survey_id == survey_id && r.user_id == user_id)
            .count() as i64)
    }

    async fn record_survey_response(&self, new: NewSurveyResponse) -> RepoResult<SurveyResponse> {
        let mut state = self.state();
        let Some(survey) = state.surveys.iter_mut().find(|s| s.id == new.survey_id) else {
            return Err(RepositoryError::ConstraintViolation(
                "survey_responses.survey_id".into(),
            ));
        };
        let n = survey.total_responses as f64;
        survey.average_score = (survey.average_score * n + new.percentage) / (n + 1.0);
        survey.total_responses += 1;
        survey.updated_at = Utc::now();

        let now = Utc::now();
        let response = SurveyResponse {
            id: Uuid::new_v4(),
            survey_id: new.survey_id,
            user_id: new.user_id,
            status: "COMPLETED".to_string(),
            total_score: new.total_score,
            max_score: new.max_score,
            percentage: new.percentage,
            grade: new.grade,
            passed: new.passed,
            device_info: new.device_info,
            feedback: new.feedback,
            completed_at: Some(now),
            created_at: now,
        };
        let rows = new.answers.into_iter().map(|a| QuestionResponse {
            id: Uuid::new_v4(),
            response_id: response.id,
            question_id: a.question_id,
            answer: a.answer,
            score: a.score,
            time_spent: a.time_spent,
        });
        state.question_responses.extend(rows);
        state.responses.push(response.clone());
        Ok(response)
    }

    async fn list_user_responses(&self, user_id: Uuid) -> RepoResult<Vec<MyResponseView>> {
        let state = self.state();
        let mut responses: Vec<MyResponseView> = state
            .responses
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter_map(|r| {
                let survey = state.surveys.iter().find(|s| s.id == r.survey_id)?;
                Some(MyResponseView {
                    response: r.clone(),
                    survey_title: survey.title.clone(),
                    survey_category: survey.category.clone(),
                })
            })
            .collect();
        responses.sort_by(|a, b| b.response.created_at.cmp(&a.response.created_at));
        Ok(responses)
    }

    // --- Admin ---

    async fn count_users_by_status(&self) -> RepoResult<Vec<StatusCount>> {
        let state = self.state();
        Ok(count_by_status(state.users.iter().map(|u| u.status.as_str())))
    }

    async fn count_vendors_by_status(&self) -> RepoResult<Vec<StatusCount>> {
        let state = self.state();
        Ok(count_by_status(state.vendors.iter().map(|v| v.status.as_str())))
    }

    async fn survey_response_stats(&self) -> RepoResult<SurveyStats> {
        let state = self.state();
        let total = state.responses.len();
        let average_score = if total == 0 {
            0.0
        } else {
            state.responses.iter().map(|r| r.percentage).sum::<f64>() / total as f64
        };
        Ok(SurveyStats {
            total_responses: total as i64,
            average_score,
        })
    }

    async fn count_published_posts(&self) -> RepoResult<i64> {
        Ok(self
            .state()
            .posts
            .iter()
            .filter(|p| p.status == ContentStatus::Published.as_str())
            .count() as i64)
    }

    async fn list_settings(&self, public_only: bool) -> RepoResult<Vec<PlatformSetting>> {
        let mut settings: Vec<PlatformSetting> = self
            .state()
            .settings
            .iter()
            .filter(|s| !public_only || s.is_public)
            .cloned()
            .collect();
        settings.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(settings)
    }

    async fn upsert_setting(
        &self,
        key: &str,
        update: &UpdateSettingRequest,
    ) -> RepoResult<PlatformSetting> {
        let mut state = self.state();
        let now = Utc::now();
        if let Some(setting) = state.settings.iter_mut().find(|s| s.key == key) {
            setting.value = update.value.clone();
            if update.description.is_some() {
                setting.description = update.description.clone();
            }
            if let Some(is_public) = update.is_public {
                setting.is_public = is_public;
            }
            setting.updated_at = now;
            return Ok(setting.clone());
        }
        let setting = PlatformSetting {
            key: key.to_string(),
            value: update.value.clone(),
            description: update.description.clone(),
            is_public: update.is_public.unwrap_or(false),
            updated_at: now,
        };
        state.settings.push(setting.clone());
        Ok(setting)
    }
}
