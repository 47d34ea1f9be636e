use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use pubtrack_auth::{AuthorizationDecision, GuardState, Role, View};
use pubtrack_backend::{InMemoryBackend, Row};
use pubtrack_client::{App, AppError, AuthSnapshot, Backend, ClientConfig, Screen};
use pubtrack_core::{Clock, FixedClock, SubjectId, SystemClock};
use pubtrack_faculty::PROFILES_TABLE;

fn profile(subject: SubjectId, email: &str, role: &str) -> Row {
    json!({ "id": subject.to_string(), "email": email, "role": role })
        .as_object()
        .unwrap()
        .clone()
}

struct Harness {
    clock: Arc<FixedClock>,
    backend: Arc<InMemoryBackend>,
    app: Arc<App>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));
        let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
        let app = App::new(
            ClientConfig::default(),
            Backend::from_shared(backend.clone()),
            clock.clone(),
        )
        .unwrap();
        Self { clock, backend, app }
    }

    fn account(&self, email: &str, role: &str) -> SubjectId {
        let subject = self.backend.register_account(email, "secret1", true);
        self.backend.seed_rows(PROFILES_TABLE, [profile(subject, email, role)]);
        subject
    }

    /// Wait for background role resolution to settle the screen.
    async fn settled(&self) -> Screen {
        for _ in 0..200 {
            if let Some(screen) = self.app.screen() {
                if !screen.is_pending() {
                    return screen;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("screen still pending: {:?}", self.app.screen());
    }

    async fn role_settled(&self) {
        for _ in 0..200 {
            if self.app.use_auth().role.is_settled() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("role never settled: {:?}", self.app.use_auth().role);
    }
}

#[tokio::test]
async fn anonymous_visitor_is_sent_to_sign_in_and_returned_after_login() {
    let h = Harness::new();
    h.account("hod@uni.edu", "hod");

    let screen = h.app.start("/hod/manage-faculty").await.unwrap();
    assert_eq!(screen.location, "/login");
    assert_eq!(screen.from.as_deref(), Some("/hod/manage-faculty"));
    assert_eq!(screen.view, Some(View::SignIn));

    h.app.sign_in("hod@uni.edu", "secret1").await.unwrap();
    let screen = h.settled().await;
    assert_eq!(screen.location, "/hod/manage-faculty");
    assert_eq!(screen.view, Some(View::ManageFaculty));
    assert_eq!(h.app.use_auth().role(), Some(&Role::HOD));
}

#[tokio::test]
async fn role_gated_route_waits_for_role_then_denies_wrong_role() {
    let h = Harness::new();
    h.account("prof@uni.edu", "faculty");
    h.backend.set_fetch_delay(Some(Duration::from_millis(30)));
    h.backend.restore_session("prof@uni.edu");

    let screen = h.app.start("/hod").await.unwrap();
    assert_eq!(screen.decision, AuthorizationDecision::Pending);
    assert_eq!(screen.state, GuardState::Unknown);

    let screen = h.settled().await;
    assert_eq!(screen.location, "/dashboard");
    assert_eq!(screen.view, Some(View::Dashboard));
}

#[tokio::test]
async fn group_route_redirects_to_its_first_page() {
    let h = Harness::new();
    h.account("coord@uni.edu", "faculty-coordinator");
    h.backend.restore_session("coord@uni.edu");

    h.app.start("/faculty-coordinator").await.unwrap();
    let screen = h.settled().await;
    assert_eq!(screen.location, "/faculty-coordinator/dashboard");
    assert_eq!(screen.view, Some(View::CoordinatorDashboard));
}

#[tokio::test]
async fn unknown_paths_fall_back_by_session() {
    let h = Harness::new();
    h.account("prof@uni.edu", "faculty");

    let screen = h.app.start("/nowhere").await.unwrap();
    assert_eq!(screen.location, "/login");

    h.app.sign_in("prof@uni.edu", "secret1").await.unwrap();
    h.settled().await;
    let screen = h.app.navigate("/still/nowhere").unwrap();
    assert_eq!(screen.location, "/dashboard");
}

#[tokio::test]
async fn signed_in_user_is_bounced_off_sign_in() {
    let h = Harness::new();
    h.account("prof@uni.edu", "faculty");
    h.backend.restore_session("prof@uni.edu");

    let screen = h.app.start("/login").await.unwrap();
    assert_eq!(screen.location, "/dashboard");
}

#[tokio::test]
async fn sign_out_from_protected_page_returns_to_sign_in() {
    let h = Harness::new();
    h.account("prof@uni.edu", "faculty");
    h.backend.restore_session("prof@uni.edu");
    h.app.start("/profile").await.unwrap();
    assert_eq!(h.settled().await.view, Some(View::Profile));

    let screen = h.app.sign_out().await.unwrap();
    assert_eq!(screen.location, "/login");
    assert_eq!(screen.from.as_deref(), Some("/profile"));
    assert_eq!(h.app.use_auth().role(), None);
}

#[tokio::test]
async fn unverified_login_stays_on_sign_in() {
    let h = Harness::new();
    h.backend.register_account("new@uni.edu", "secret1", false);
    h.app.start("/login").await.unwrap();

    let err = h.app.sign_in("new@uni.edu", "secret1").await.unwrap_err();
    assert!(err.message.contains("verify"));
    assert!(!h.app.use_auth().is_authenticated());
    assert_eq!(h.app.screen().unwrap().location, "/login");
}

#[tokio::test]
async fn recovery_link_opens_reset_page_until_it_expires() {
    let h = Harness::new();
    let issued = h.clock.now().timestamp_millis();
    let link = format!("/reset-password?type=recovery&ts={issued}");

    h.clock.advance(chrono::Duration::minutes(5));
    let screen = h.app.start(&link).await.unwrap();
    assert_eq!(screen.state, GuardState::RecoveryBypass);
    assert_eq!(screen.view, Some(View::ResetPassword));

    h.clock.advance(chrono::Duration::minutes(11));
    let screen = h.app.navigate(&link).unwrap();
    assert_eq!(screen.decision, AuthorizationDecision::ExpiredRecoveryLink);
    assert!(screen.message.is_some());
    assert_eq!(screen.view, None);
}

#[tokio::test]
async fn password_update_from_recovery_link_ends_session() {
    let h = Harness::new();
    h.account("prof@uni.edu", "faculty");
    h.backend.restore_session("prof@uni.edu");
    let link = format!("/reset-password?type=recovery&ts={}", h.clock.now().timestamp_millis());
    h.app.start(&link).await.unwrap();

    let screen = h.app.update_password("brand-new").await.unwrap();
    assert_eq!(screen.location, "/login");
    assert!(!h.app.use_auth().is_authenticated());
}

#[tokio::test]
async fn menu_follows_role() {
    let h = Harness::new();
    h.account("hod@uni.edu", "hod");
    h.account("prof@uni.edu", "faculty");

    h.app.start("/login").await.unwrap();
    let anonymous: Vec<String> = h.app.navigation().into_iter().map(|e| e.key).collect();
    assert!(anonymous.contains(&"sign-in".to_string()));
    assert!(!anonymous.contains(&"dashboard".to_string()));

    h.app.sign_in("hod@uni.edu", "secret1").await.unwrap();
    h.role_settled().await;
    let hod: Vec<String> = h.app.navigation().into_iter().map(|e| e.key).collect();
    assert!(hod.contains(&"hod".to_string()));
    assert!(!hod.contains(&"faculty-coordinator".to_string()));

    h.app.sign_out().await.unwrap();
    h.app.sign_in("prof@uni.edu", "secret1").await.unwrap();
    h.role_settled().await;
    let faculty: Vec<String> = h.app.navigation().into_iter().map(|e| e.key).collect();
    assert!(faculty.contains(&"dashboard".to_string()));
    assert!(!faculty.contains(&"hod".to_string()));
}

#[tokio::test]
async fn switching_accounts_never_lends_the_previous_role() {
    let h = Harness::new();
    h.account("hod@uni.edu", "hod");
    let faculty = h.account("prof@uni.edu", "faculty");

    h.app.start("/login").await.unwrap();
    h.app.sign_in("hod@uni.edu", "secret1").await.unwrap();
    h.role_settled().await;
    let screen = h.app.navigate("/hod/dashboard").unwrap();
    assert_eq!(screen.decision, AuthorizationDecision::Allow);
    assert_eq!(screen.view, Some(View::HodDashboard));

    let rendered: Arc<Mutex<Vec<(Screen, AuthSnapshot)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = rendered.clone();
    let app = Arc::downgrade(&h.app);
    let _screens = h.app.on_screen(move |screen| {
        if let Some(app) = app.upgrade() {
            sink.lock().unwrap().push((screen.clone(), app.use_auth()));
        }
    });

    // Second account signs in over the first, with no sign-out in between.
    h.backend.set_fetch_delay(Some(Duration::from_millis(30)));
    let screen = h.app.sign_in("prof@uni.edu", "secret1").await.unwrap();
    assert_eq!(screen.location, "/hod/dashboard");
    assert_eq!(screen.decision, AuthorizationDecision::Pending);
    let auth = h.app.use_auth();
    assert_eq!(auth.subject(), Some(faculty));
    assert_ne!(auth.role(), Some(&Role::HOD));

    let screen = h.settled().await;
    assert_eq!(screen.location, "/dashboard");
    assert_eq!(screen.view, Some(View::Dashboard));
    assert_eq!(h.app.use_auth().role(), Some(&Role::FACULTY));

    let rendered = rendered.lock().unwrap();
    assert!(!rendered.is_empty());
    for (screen, auth) in rendered.iter() {
        assert!(
            !(screen.location.starts_with("/hod") && screen.decision == AuthorizationDecision::Allow),
            "hod page rendered after switching accounts: {screen:?}"
        );
        if auth.subject() == Some(faculty) {
            assert_ne!(auth.role(), Some(&Role::HOD), "{screen:?}");
        }
    }
}

fn build(config: ClientConfig) -> Result<Arc<App>, AppError> {
    let backend = Arc::new(InMemoryBackend::new());
    App::new(config, Backend::from_shared(backend), Arc::new(SystemClock))
}

#[test]
fn sign_in_path_must_be_a_public_only_route() {
    let unrouted = ClientConfig {
        sign_in_path: "/signin".to_string(),
        ..ClientConfig::default()
    };
    assert!(matches!(build(unrouted), Err(AppError::SignInNotRoutable(ref path)) if path == "/signin"));

    let protected = ClientConfig {
        sign_in_path: "/dashboard".to_string(),
        ..ClientConfig::default()
    };
    assert!(matches!(build(protected), Err(AppError::SignInNotRoutable(_))));

    assert!(build(ClientConfig::default()).is_ok());
}

#[test]
fn landing_path_must_admit_every_signed_in_role() {
    for landing in ["/hod/dashboard", "/login", "/reports"] {
        let config = ClientConfig {
            landing_path: landing.to_string(),
            ..ClientConfig::default()
        };
        assert!(
            matches!(build(config), Err(AppError::LandingNotRoutable(ref path)) if path == landing),
            "{landing}"
        );
    }

    let profile = ClientConfig {
        landing_path: "/profile".to_string(),
        ..ClientConfig::default()
    };
    assert!(build(profile).is_ok());
}

#[tokio::test]
async fn shutdown_detaches_from_provider() {
    let h = Harness::new();
    h.app.start("/login").await.unwrap();
    assert_eq!(h.backend.listener_count(), 1);

    h.app.shutdown();
    assert_eq!(h.backend.listener_count(), 0);
    assert!(h.app.use_auth().session.is_unknown());
}
