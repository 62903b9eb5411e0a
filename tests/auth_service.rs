use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use docvault::application::auth::{AuthError, AuthPolicy, UserService};
use docvault::application::repos::{TokensRepo, UsersRepo};
use docvault::domain::error::DomainError;
use docvault::domain::users::TokenRecord;
use docvault::infra::memory::InMemoryRepositories;

const ADMIN_TOKEN: &str = "admin-secret";
const PASSWORD: &str = "Secr3t!pw";
const TEST_COST: u32 = 4;

fn service() -> (UserService, Arc<InMemoryRepositories>) {
    let repos = Arc::new(InMemoryRepositories::new());
    let service = UserService::new(
        repos.clone(),
        repos.clone(),
        AuthPolicy {
            admin_token: Some(ADMIN_TOKEN.to_string()),
            token_ttl: Duration::hours(1),
            password_cost: TEST_COST,
        },
    );
    (service, repos)
}

#[tokio::test]
async fn register_authenticate_resolve_logout() {
    let (service, _) = service();

    let user = service
        .register("alice2024", PASSWORD, ADMIN_TOKEN)
        .await
        .expect("register");
    assert_eq!(user.login, "alice2024");
    assert_ne!(user.password_hash, PASSWORD);
    assert!(user.password_hash.starts_with("$2b$04$"));

    let issued = service
        .authenticate("alice2024", PASSWORD)
        .await
        .expect("authenticate");
    assert_eq!(issued.token.len(), 32);
    assert!(issued.expires_at > OffsetDateTime::now_utc());

    let caller = service.resolve(&issued.token).await.expect("resolve");
    assert_eq!(caller.login, "alice2024");
    assert_eq!(caller.user_id, user.id);

    service.logout(&issued.token).await.expect("logout");
    assert!(matches!(
        service.resolve(&issued.token).await,
        Err(AuthError::Unauthorized)
    ));
    assert!(matches!(
        service.logout(&issued.token).await,
        Err(AuthError::UnknownToken)
    ));
}

#[tokio::test]
async fn registration_requires_the_admin_token() {
    let (service, _) = service();
    assert!(matches!(
        service.register("alice2024", PASSWORD, "wrong").await,
        Err(AuthError::AdminTokenRejected)
    ));
    assert!(matches!(
        service.register("alice2024", PASSWORD, "").await,
        Err(AuthError::AdminTokenRejected)
    ));
}

#[tokio::test]
async fn registration_is_closed_without_an_admin_token() {
    let repos = Arc::new(InMemoryRepositories::new());
    let service = UserService::new(
        repos.clone(),
        repos,
        AuthPolicy {
            password_cost: TEST_COST,
            ..AuthPolicy::default()
        },
    );
    assert!(matches!(
        service.register("alice2024", PASSWORD, "").await,
        Err(AuthError::AdminTokenRejected)
    ));
}

#[tokio::test]
async fn weak_credentials_are_rejected() {
    let (service, repos) = service();
    for (login, password) in [
        ("short", PASSWORD),
        ("alice_2024", PASSWORD),
        ("alice2024", "password"),
        ("alice2024", "Sh0rt!"),
    ] {
        assert!(
            matches!(
                service.register(login, password, ADMIN_TOKEN).await,
                Err(AuthError::Domain(DomainError::Validation { .. }))
            ),
            "{login} / {password}"
        );
    }
    assert!(repos.find_by_login("alice2024").await.expect("lookup").is_none());
}

#[tokio::test]
async fn duplicate_logins_are_taken() {
    let (service, _) = service();
    service
        .register("alice2024", PASSWORD, ADMIN_TOKEN)
        .await
        .expect("register");
    assert!(matches!(
        service.register("alice2024", PASSWORD, ADMIN_TOKEN).await,
        Err(AuthError::LoginTaken(login)) if login == "alice2024"
    ));
}

#[tokio::test]
async fn wrong_password_and_unknown_login_look_the_same() {
    let (service, _) = service();
    service
        .register("alice2024", PASSWORD, ADMIN_TOKEN)
        .await
        .expect("register");

    assert!(matches!(
        service.authenticate("alice2024", "Secr3t!pW").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        service.authenticate("nobody2024", PASSWORD).await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn expired_and_unknown_tokens_do_not_resolve() {
    let (service, repos) = service();
    let user = service
        .register("alice2024", PASSWORD, ADMIN_TOKEN)
        .await
        .expect("register");

    repos
        .insert_token(&TokenRecord {
            token: "stale".into(),
            user_id: user.id,
            expires_at: OffsetDateTime::now_utc() - Duration::minutes(1),
        })
        .await
        .expect("insert token");

    for token in ["stale", "missing", ""] {
        assert!(
            matches!(service.resolve(token).await, Err(AuthError::Unauthorized)),
            "{token:?}"
        );
    }
}
