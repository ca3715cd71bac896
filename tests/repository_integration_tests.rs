use chrono::{Duration, Utc};
use meyden_api::{
    error::RepositoryError,
    models::{
        CreateReviewRequest, CreateVendorRequest, NewSession, NewUser, NewSurvey,
        NewSurveyResponse, OAuthState, Role, User, UserStatus, VendorSearch,
    },
    pagination::Page,
    repository::{PostgresRepository, Repository},
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

/// Holds the pool for one test. Every test writes rows with unique keys, so tests can share
/// the database and run in parallel.
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    /// Connects and migrates, or returns `None` when no database is configured so the
    /// suite is skipped rather than failed on machines without Postgres.
    async fn setup() -> Option<Self> {
        dotenv::dotenv().ok();

        let Ok(db_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping Postgres repository tests");
            return None;
        };

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        Some(DbTestContext { pool })
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

fn unique(tag: &str) -> String {
    format!("{tag}-{}", Uuid::new_v4().simple())
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        password_hash: Some("hash".to_string()),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        avatar_url: None,
        role: Role::User,
        status: UserStatus::Active,
        email_verified: true,
        verification_token: None,
        verification_expires: None,
        google_id: None,
    }
}

async fn create_test_user(repo: &PostgresRepository) -> User {
    repo.create_user(new_user(&format!("{}@test.com", unique("user"))))
        .await
        .expect("Failed to create test user")
}

fn vendor_request(company: &str) -> CreateVendorRequest {
    CreateVendorRequest {
        company_name: company.to_string(),
        business_name: format!("{company} Ltd"),
        description: "Applied machine learning consultancy.".to_string(),
        email: "hello@vendor.example".to_string(),
        phone: None,
        address: None,
        city: Some("Nairobi".to_string()),
        state: None,
        country: Some("Kenya".to_string()),
        postal_code: None,
        business_type: "Consulting".to_string(),
        year_established: None,
        employee_count: None,
        website: None,
    }
}

// --- Users ---

#[tokio::test]
async fn duplicate_email_maps_to_duplicate_error() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let repo = ctx.repository();
    let email = format!("{}@test.com", unique("dup"));

    repo.create_user(new_user(&email)).await.unwrap();
    let err = repo.create_user(new_user(&email)).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Duplicate(_)), "got {err:?}");
}

#[tokio::test]
async fn failed_logins_lock_at_threshold() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;
    let until = Utc::now() + Duration::minutes(15);

    for expected in 1..=4 {
        let u = repo.record_failed_login(user.id, 5, until).await.unwrap();
        assert_eq!(u.login_attempts, expected);
        assert!(u.locked_until.is_none());
    }
    let locked = repo.record_failed_login(user.id, 5, until).await.unwrap();
    assert_eq!(locked.login_attempts, 0);
    let locked_until = locked.locked_until.expect("account locked");
    assert!((locked_until - until).num_seconds().abs() <= 1);

    repo.record_successful_login(user.id, Utc::now()).await.unwrap();
    let cleared = repo.find_user_by_id(user.id).await.unwrap().unwrap();
    assert!(cleared.locked_until.is_none());
    assert!(cleared.last_login.is_some());
}

// --- Sessions and OAuth state ---

#[tokio::test]
async fn sessions_rotate_and_purge() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;
    let now = Utc::now();

    let live = repo
        .create_session(NewSession {
            user_id: user.id,
            token: unique("access"),
            refresh_token: unique("refresh"),
            device_info: None,
            ip_address: Some("127.0.0.1".to_string()),
            user_agent: None,
            expires_at: now + Duration::minutes(15),
            refresh_expires_at: now + Duration::days(7),
        })
        .await
        .unwrap();
    let stale = repo
        .create_session(NewSession {
            user_id: user.id,
            token: unique("access"),
            refresh_token: unique("refresh"),
            device_info: None,
            ip_address: None,
            user_agent: None,
            expires_at: now - Duration::days(8),
            refresh_expires_at: now - Duration::days(1),
        })
        .await
        .unwrap();

    let new_access = unique("access");
    let new_refresh = unique("refresh");
    let rotated = repo
        .rotate_session(
            live.id,
            &new_access,
            &new_refresh,
            now + Duration::minutes(15),
            now + Duration::days(7),
        )
        .await
        .unwrap()
        .expect("session exists");
    assert_eq!(rotated.id, live.id);
    assert!(repo.find_session_by_token(&live.token).await.unwrap().is_none());
    assert!(
        repo.find_session_by_refresh_token(&new_refresh)
            .await
            .unwrap()
            .is_some()
    );

    assert!(repo.purge_expired_sessions(now).await.unwrap() >= 1);
    assert!(repo.find_session_by_token(&stale.token).await.unwrap().is_none());
    assert!(repo.find_session_by_token(&new_access).await.unwrap().is_some());

    assert_eq!(repo.delete_user_sessions(user.id).await.unwrap(), 1);
}

#[tokio::test]
async fn oauth_state_is_consumed_once() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let repo = ctx.repository();
    let now = Utc::now();
    let key = unique("state");

    repo.create_oauth_state(OAuthState {
        state: key.clone(),
        redirect_url: "/dashboard".to_string(),
        expires_at: now + Duration::minutes(10),
        created_at: now,
    })
    .await
    .unwrap();

    let taken = repo.take_oauth_state(&key).await.unwrap().expect("state stored");
    assert_eq!(taken.redirect_url, "/dashboard");
    assert!(repo.take_oauth_state(&key).await.unwrap().is_none());
}

// --- Vendors and reviews ---

#[tokio::test]
async fn approved_reviews_drive_vendor_rating() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let repo = ctx.repository();
    let owner = create_test_user(&repo).await;
    let vendor = repo
        .create_vendor(owner.id, &vendor_request(&unique("Rated")))
        .await
        .unwrap();

    let mut reviews = Vec::new();
    for rating in [5, 2] {
        let reviewer = create_test_user(&repo).await;
        let review = repo
            .create_review(
                vendor.id,
                reviewer.id,
                &CreateReviewRequest {
                    rating,
                    title: None,
                    content: "Worked with them on a pilot.".to_string(),
                },
            )
            .await
            .unwrap();
        reviews.push((reviewer, review));
    }

    // A second review from the same user hits the unique constraint.
    let err = repo
        .create_review(
            vendor.id,
            reviews[0].0.id,
            &CreateReviewRequest {
                rating: 1,
                title: None,
                content: "Again".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Duplicate(_)));

    let pending = repo.refresh_vendor_rating(vendor.id).await.unwrap().unwrap();
    assert_eq!(pending.total_reviews, 0);
    assert_eq!(pending.average_rating, 0.0);

    for (_, review) in &reviews {
        repo.set_review_status(review.id, "APPROVED").await.unwrap();
    }
    let rated = repo.refresh_vendor_rating(vendor.id).await.unwrap().unwrap();
    assert_eq!(rated.total_reviews, 2);
    assert!((rated.average_rating - 3.5).abs() < 1e-9);

    let (public, total) = repo
        .list_public_reviews(vendor.id, Page { page: 1, limit: 10 })
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(public.len(), 2);
}

#[tokio::test]
async fn vendor_search_treats_wildcards_literally() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let repo = ctx.repository();
    let owner = create_test_user(&repo).await;
    let tag = unique("Search");
    let vendor = repo
        .create_vendor(owner.id, &vendor_request(&format!("{tag} Labs")))
        .await
        .unwrap();
    repo.set_vendor_status(vendor.id, "ACTIVE").await.unwrap();

    let page = Page { page: 1, limit: 20 };
    let search = |query: String| VendorSearch {
        query: Some(query),
        ..VendorSearch::default()
    };

    let (found, total) = repo.list_vendors(&search(tag.to_lowercase()), page).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(found[0].id, vendor.id);

    let (_, total) = repo
        .list_vendors(&search(format!("{tag}%Labs")), page)
        .await
        .unwrap();
    assert_eq!(total, 0);
    let (_, total) = repo
        .list_vendors(&search(format!("{tag}_Labs")), page)
        .await
        .unwrap();
    assert_eq!(total, 0);
}

// --- Surveys ---

#[tokio::test]
async fn survey_average_is_running() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;
    let detail = repo
        .create_survey(NewSurvey {
            title: unique("Readiness"),
            description: None,
            category: None,
            time_limit: None,
            max_attempts: None,
            passing_score: None,
            is_public: true,
            created_by: user.id,
            questions: vec![],
        })
        .await
        .unwrap();

    for pct in [50.0, 100.0] {
        repo.record_survey_response(NewSurveyResponse {
            survey_id: detail.survey.id,
            user_id: user.id,
            total_score: 0,
            max_score: 0,
            percentage: pct,
            grade: "Novice".to_string(),
            passed: None,
            device_info: None,
            feedback: None,
            answers: vec![],
        })
        .await
        .unwrap();
    }

    let survey = repo.find_survey(detail.survey.id).await.unwrap().unwrap();
    assert_eq!(survey.total_responses, 2);
    assert!((survey.average_score - 75.0).abs() < 1e-9);
    assert_eq!(
        repo.count_user_responses(detail.survey.id, user.id)
            .await
            .unwrap(),
        2
    );
}
