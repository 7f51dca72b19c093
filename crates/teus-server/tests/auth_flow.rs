use serde_json::{Value, json};
use teus_auth::config::SigningConfig;
use teus_server::{AdminUserConfig, AppConfig, ServerBuilder};
use tokio::task::JoinHandle;

const ADMIN_EMAIL: &str = "super@teus.pt";
const ADMIN_PASSWORD: &str = "super-secret";

struct TestServer {
    base: String,
    client: reqwest::Client,
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let mut cfg = AppConfig::default();
        cfg.auth.signing = SigningConfig::hs256("integration-test-secret-0123456789abcdef");
        cfg.bootstrap.admin_user = Some(AdminUserConfig {
            email: ADMIN_EMAIL.into(),
            password: ADMIN_PASSWORD.into(),
            full_name: "Super Admin".into(),
        });

        let server = ServerBuilder::new()
            .with_config(cfg)
            .build()
            .await
            .expect("build server");

        // Bind to an ephemeral port
        let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind");
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let _ = server
                .serve(listener, async move {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            shutdown: tx,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }

    async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/users/register"))
            .json(&json!({ "email": email, "password": password, "fullName": "Test User" }))
            .send()
            .await
            .unwrap()
    }

    async fn login(&self, email: &str, password: &str) -> Value {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "login failed for {email}");
        resp.json().await.unwrap()
    }

    async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    async fn refresh(&self, refresh_token: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/auth/refresh-token"))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .unwrap()
    }
}

fn token(body: &Value, field: &str) -> String {
    body[field].as_str().expect(field).to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start().await;

    let resp = server.get("/healthz", None).await;
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    server.stop().await;
}

#[tokio::test]
async fn test_role_gated_endpoints() {
    let server = TestServer::start().await;

    let resp = server.register("alice@teus.pt", "alice-pw").await;
    assert_eq!(resp.status(), 201);
    let view: Value = resp.json().await.unwrap();
    assert_eq!(view["email"], "alice@teus.pt");
    assert_eq!(view["role"], "USER");
    assert!(view.get("password").is_none());

    let login = server.login("alice@teus.pt", "alice-pw").await;
    assert_eq!(login["tokenType"], "Bearer");
    assert_eq!(login["expiresIn"], 3600);
    let access = token(&login, "accessToken");

    // USER on an admin endpoint: 403
    let resp = server.get("/api/v1/users", Some(&access)).await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_role");

    // No token: 401 with a challenge
    let resp = server.get("/api/v1/users", None).await;
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().contains_key("www-authenticate"));

    // Own profile: allowed regardless of role
    let resp = server.get("/api/v1/users/alice@teus.pt", Some(&access)).await;
    assert_eq!(resp.status(), 200);

    // Someone else's profile: 403
    server.register("bob@teus.pt", "bob-pw").await;
    let resp = server.get("/api/v1/users/bob@teus.pt", Some(&access)).await;
    assert_eq!(resp.status(), 403);

    // Authenticated only
    let resp = server.get("/api/v1/users/me", Some(&access)).await;
    assert_eq!(resp.status(), 200);
    let me: Value = resp.json().await.unwrap();
    assert_eq!(me["email"], "alice@teus.pt");

    // Admin sees everything
    let admin = server.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let admin_access = token(&admin, "accessToken");
    let resp = server.get("/api/v1/users", Some(&admin_access)).await;
    assert_eq!(resp.status(), 200);
    let users: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(users.len(), 3);

    let resp = server.get("/api/v1/users/bob@teus.pt", Some(&admin_access)).await;
    assert_eq!(resp.status(), 200);

    let resp = server
        .get("/api/v1/users/ghost@teus.pt", Some(&admin_access))
        .await;
    assert_eq!(resp.status(), 404);

    server.stop().await;
}

#[tokio::test]
async fn test_logout_revokes_access_token_only() {
    let server = TestServer::start().await;
    server.register("alice@teus.pt", "alice-pw").await;
    let login = server.login("alice@teus.pt", "alice-pw").await;
    let access = token(&login, "accessToken");
    let refresh = token(&login, "refreshToken");

    let resp = server
        .client
        .post(server.url("/api/v1/auth/logout"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Successfully logged out.");

    // Revoked immediately
    let resp = server.get("/api/v1/users/me", Some(&access)).await;
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "token_revoked");

    // Logging out twice still succeeds
    let resp = server
        .client
        .post(server.url("/api/v1/auth/logout"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // The refresh token still works
    let resp = server.refresh(&refresh).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let new_access = token(&body, "accessToken");
    assert_ne!(new_access, access);

    let resp = server.get("/api/v1/users/me", Some(&new_access)).await;
    assert_eq!(resp.status(), 200);

    server.stop().await;
}

#[tokio::test]
async fn test_logout_without_bearer_header() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(server.url("/api/v1/auth/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Invalid logout request.");

    let resp = server
        .client
        .post(server.url("/api/v1/auth/logout"))
        .header("authorization", "Basic YWxpY2U6cHc=")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    server.stop().await;
}

async fn set_role(server: &TestServer, admin_access: &str, email: &str, role: &str) -> Value {
    let resp = server
        .client
        .put(server.url(&format!("/api/v1/users/{email}/role")))
        .bearer_auth(admin_access)
        .json(&json!({ "role": role }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn test_role_change_applies_to_issued_tokens() {
    let server = TestServer::start().await;
    server.register("alice@teus.pt", "alice-pw").await;
    let login = server.login("alice@teus.pt", "alice-pw").await;
    let access = token(&login, "accessToken");
    let refresh = token(&login, "refreshToken");

    let admin = server.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let admin_access = token(&admin, "accessToken");

    let resp = server.get("/api/v1/users", Some(&access)).await;
    assert_eq!(resp.status(), 403);

    let view = set_role(&server, &admin_access, "alice@teus.pt", "admin").await;
    assert_eq!(view["role"], "ADMIN");

    // The token issued as USER now acts with the current role.
    let resp = server.get("/api/v1/users", Some(&access)).await;
    assert_eq!(resp.status(), 200);

    // A rotated token carries the new role too.
    let resp = server.refresh(&refresh).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let rotated = token(&body, "accessToken");
    let resp = server.get("/api/v1/users", Some(&rotated)).await;
    assert_eq!(resp.status(), 200);

    // Demotion is just as immediate.
    set_role(&server, &admin_access, "alice@teus.pt", "USER").await;
    for t in [&access, &rotated] {
        let resp = server.get("/api/v1/users", Some(t)).await;
        assert_eq!(resp.status(), 403);
    }
    let resp = server.get("/api/v1/users/me", Some(&access)).await;
    assert_eq!(resp.status(), 200);
    let me: Value = resp.json().await.unwrap();
    assert_eq!(me["role"], "USER");

    server.stop().await;
}

#[tokio::test]
async fn test_credential_and_token_failures() {
    let server = TestServer::start().await;
    server.register("alice@teus.pt", "alice-pw").await;

    // Wrong password and unknown user look the same.
    for (email, password) in [("alice@teus.pt", "wrong"), ("nobody@teus.pt", "alice-pw")] {
        let resp = server
            .client
            .post(server.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "invalid_credentials");
    }

    // Duplicate registration
    let resp = server.register("alice@teus.pt", "other").await;
    assert_eq!(resp.status(), 409);

    // A refresh token is not an access token.
    let login = server.login("alice@teus.pt", "alice-pw").await;
    let refresh = token(&login, "refreshToken");
    let resp = server.get("/api/v1/users/me", Some(&refresh)).await;
    assert_eq!(resp.status(), 401);

    // An access token is not a refresh token.
    let resp = server.refresh(&token(&login, "accessToken")).await;
    assert_eq!(resp.status(), 401);

    // Garbage bearer on a public endpoint is ignored.
    let resp = server.get("/healthz", Some("not-a-token")).await;
    assert_eq!(resp.status(), 200);

    // Malformed body
    let resp = server
        .client
        .post(server.url("/api/v1/auth/login"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    server.stop().await;
}
