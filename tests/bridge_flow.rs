//! Full bridge: the centralized site's client provisions an account on a
//! running satellite, then the browser follows the login-redirect and logs out.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use site_auth_bridge::middleware::{BridgeConfig, satellite_routes};
use site_auth_bridge::session::MemorySessionStore;
use site_auth_bridge::store::{MemoryUserStore, UserStore};
use site_auth_bridge::{
    Error, SatelliteClient, SharedSecret, SubjectId, SystemClock, TokenIssuer, UserProfile,
};
use tokio::net::TcpListener;
use url::Url;

const SECRET: &str = "shared_secret_key";
const CENTRAL_LOGOUT: &str = "https://id.example.com/auth/logout";

struct Satellite {
    base: Url,
    users: Arc<MemoryUserStore>,
    sessions: Arc<MemorySessionStore>,
}

async fn spawn_satellite() -> Satellite {
    let users = Arc::new(MemoryUserStore::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let config = BridgeConfig::new(
        SharedSecret::new(SECRET).unwrap(),
        CENTRAL_LOGOUT.parse().unwrap(),
    )
    .with_secure_cookies(false);

    let app = satellite_routes(config, users.clone(), sessions.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Satellite {
        base: format!("http://{addr}/").parse().unwrap(),
        users,
        sessions,
    }
}

fn client_for(satellite: &Satellite, secret: &str) -> SatelliteClient {
    let issuer = TokenIssuer::new(Arc::new(SharedSecret::new(secret).unwrap()), Arc::new(SystemClock));
    SatelliteClient::new(satellite.base.clone(), issuer)
}

fn browser() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn bridged_login_then_logout() {
    let satellite = spawn_satellite().await;
    let client = client_for(&satellite, SECRET);
    let profile = UserProfile::new("a@b.com", "abuser").with_role("authenticated");

    let redirect_url = client
        .bridge_login(&SubjectId("42".into()), &profile)
        .await
        .unwrap();
    assert_eq!(redirect_url.path(), "/auth/login-redirect");

    let user = satellite
        .users
        .find_by_email("a@b.com")
        .await
        .unwrap()
        .unwrap();
    assert!(user.password_hash.is_none());

    let browser = browser();
    let response = browser.get(redirect_url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[LOCATION], "/");

    let session_cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(session_cookie.starts_with("__bridge_session="));
    assert_eq!(satellite.sessions.len().await, 1);

    let pair = session_cookie.split(';').next().unwrap().to_string();
    let response = browser
        .get(satellite.base.join("auth/logout").unwrap())
        .header(COOKIE, pair)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[LOCATION], CENTRAL_LOGOUT);

    let removal = response.headers()[SET_COOKIE].to_str().unwrap();
    assert!(removal.starts_with("__bridge_session=;"));
    assert!(removal.contains("Secure"));
    assert!(removal.contains("HttpOnly"));
    assert!(removal.contains("Path=/"));
    assert!(satellite.sessions.is_empty().await);
}

#[tokio::test]
async fn repeated_bridge_login_reuses_the_account() {
    let satellite = spawn_satellite().await;
    let client = client_for(&satellite, SECRET);
    let profile = UserProfile::new("a@b.com", "abuser");

    let first = client.provision(&SubjectId("42".into()), &profile).await.unwrap();
    let second = client.provision(&SubjectId("42".into()), &profile).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(satellite.users.len().await, 1);
}

#[tokio::test]
async fn wrong_secret_surfaces_as_peer_error() {
    let satellite = spawn_satellite().await;
    let client = client_for(&satellite, "not_the_shared_secret");

    let err = client
        .provision(&SubjectId("42".into()), &UserProfile::new("a@b.com", "abuser"))
        .await
        .unwrap_err();

    match err {
        Error::Peer { status, detail, .. } => {
            assert_eq!(status, Some(403));
            assert!(detail.contains("Invalid token"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(satellite.users.is_empty().await);
}

#[tokio::test]
async fn missing_profile_fields_surface_as_bad_request() {
    let satellite = spawn_satellite().await;
    let client = client_for(&satellite, SECRET);

    let err = client
        .provision(&SubjectId("42".into()), &UserProfile::new("a@b.com", "  "))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Peer { status: Some(400), .. }));
}
