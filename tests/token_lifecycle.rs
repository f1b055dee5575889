//! End-to-end behaviour of the refresh-token lifecycle over the in-memory store.

use chrono::{DateTime, Utc};
use refrain::application_impl::{FakeAccessTokenIssuer, RealTokenLifecycleService, SessionConfig};
use refrain::application_port::{
    AccessToken, AccessTokenIssuer, AuthError, AuthTokens, TokenLifecycleService,
};
use refrain::domain_model::*;
use refrain::domain_port::{SessionFamilyStore, SessionStoreError};
use refrain::infra_memory::InMemorySessionFamilyStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const RETENTION: Duration = Duration::from_secs(60);

/// Delegates to the in-memory store, counting calls and optionally stalling reads.
struct InstrumentedStore {
    inner: InMemorySessionFamilyStore,
    calls: AtomicUsize,
    get_delay: Duration,
}

impl InstrumentedStore {
    fn new(get_delay: Duration) -> Self {
        Self {
            inner: InMemorySessionFamilyStore::new(RETENTION),
            calls: AtomicUsize::new(0),
            get_delay,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SessionFamilyStore for InstrumentedStore {
    async fn create(
        &self,
        family_id: &FamilyId,
        record: &SessionFamily,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        self.touch();
        self.inner.create(family_id, record, ttl).await
    }

    async fn get(&self, family_id: &FamilyId) -> Result<Option<SessionFamily>, SessionStoreError> {
        self.touch();
        tokio::time::sleep(self.get_delay).await;
        self.inner.get(family_id).await
    }

    async fn rotate(
        &self,
        family_id: &FamilyId,
        expected_current: &TokenHash,
        new_token_hash: &TokenHash,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, SessionStoreError> {
        self.touch();
        self.inner
            .rotate(family_id, expected_current, new_token_hash, ttl)
            .await
    }

    async fn delete(&self, family_id: &FamilyId) -> Result<(), SessionStoreError> {
        self.touch();
        self.inner.delete(family_id).await
    }

    async fn delete_all_by_user_id(&self, user_id: UserId) -> Result<(), SessionStoreError> {
        self.touch();
        self.inner.delete_all_by_user_id(user_id).await
    }

    async fn family_ids_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<FamilyId>, SessionStoreError> {
        self.touch();
        self.inner.family_ids_by_user_id(user_id).await
    }
}

/// Issuer whose signing backend is down.
struct UnavailableIssuer;

#[async_trait::async_trait]
impl AccessTokenIssuer for UnavailableIssuer {
    async fn issue(&self, _user_id: UserId) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        Err(AuthError::InternalError("signing key unavailable".to_string()))
    }

    async fn verify(&self, _token: &AccessToken) -> Result<UserId, AuthError> {
        Err(AuthError::TokenInvalid)
    }
}

fn service_with<S>(
    store: Arc<S>,
    refresh_ttl: Duration,
    store_timeout: Duration,
) -> RealTokenLifecycleService
where
    S: SessionFamilyStore + 'static,
{
    RealTokenLifecycleService::new(
        store,
        Arc::new(FakeAccessTokenIssuer::new()),
        SessionConfig {
            refresh_ttl,
            store_timeout,
        },
    )
}

fn setup() -> (Arc<InMemorySessionFamilyStore>, RealTokenLifecycleService) {
    let store = Arc::new(InMemorySessionFamilyStore::new(RETENTION));
    let service = service_with(
        store.clone(),
        Duration::from_secs(3600),
        Duration::from_secs(1),
    );
    (store, service)
}

fn user() -> UserId {
    UserId(uuid::Uuid::new_v4())
}

fn family_of(tokens: &AuthTokens) -> FamilyId {
    RefreshTokenCodec::extract_family_id(tokens.refresh_token.as_str()).unwrap()
}

#[tokio::test]
async fn issue_creates_family_holding_only_the_token_hash() {
    let (store, service) = setup();
    let user_id = user();

    let tokens = service.issue(user_id).await.unwrap();
    let record = store.get(&family_of(&tokens)).await.unwrap().unwrap();

    assert_eq!(record.user_id, user_id);
    assert_eq!(
        record.current_token_hash,
        RefreshTokenCodec::hash(tokens.refresh_token.as_str())
    );
    assert_ne!(record.current_token_hash.as_str(), tokens.refresh_token.as_str());
    assert_eq!(record.previous_token_hash, None);
    assert_eq!(record.expires_at, tokens.refresh_token_expires_at);
    assert_eq!(
        service
            .verify_access_token(&tokens.access_token.0)
            .await
            .unwrap(),
        user_id
    );
}

#[tokio::test]
async fn rotation_then_replay_revokes_the_family() {
    let (store, service) = setup();
    let first = service.issue(user()).await.unwrap();
    let family_id = family_of(&first);
    let before = store.get(&family_id).await.unwrap().unwrap();

    let second = service.refresh(first.refresh_token.as_str()).await.unwrap();

    assert_eq!(family_of(&second), family_id);
    let after = store.get(&family_id).await.unwrap().unwrap();
    assert_eq!(after.previous_token_hash, Some(before.current_token_hash.clone()));
    assert_eq!(
        after.current_token_hash,
        RefreshTokenCodec::hash(second.refresh_token.as_str())
    );
    assert_ne!(after.current_token_hash, before.current_token_hash);

    let replay = service.refresh(first.refresh_token.as_str()).await;
    assert!(matches!(replay, Err(AuthError::RefreshTokenReused)));
    assert_eq!(store.get(&family_id).await.unwrap(), None);

    let newest = service.refresh(second.refresh_token.as_str()).await;
    assert!(matches!(newest, Err(AuthError::InvalidRefreshToken)));
}

#[tokio::test]
async fn refreshed_expiry_matches_the_stored_record() {
    let (store, service) = setup();
    let first = service.issue(user()).await.unwrap();

    let second = service.refresh(first.refresh_token.as_str()).await.unwrap();

    let record = store.get(&family_of(&second)).await.unwrap().unwrap();
    assert_eq!(record.expires_at, second.refresh_token_expires_at);
}

#[tokio::test]
async fn failed_access_token_mint_leaves_presented_token_usable() {
    let store = Arc::new(InMemorySessionFamilyStore::new(RETENTION));
    let working = service_with(store.clone(), Duration::from_secs(60), Duration::from_secs(1));
    let broken = RealTokenLifecycleService::new(
        store.clone(),
        Arc::new(UnavailableIssuer),
        SessionConfig {
            refresh_ttl: Duration::from_secs(60),
            store_timeout: Duration::from_secs(1),
        },
    );
    let tokens = working.issue(user()).await.unwrap();
    let before = store.get(&family_of(&tokens)).await.unwrap();

    let result = broken.refresh(tokens.refresh_token.as_str()).await;

    assert!(matches!(result, Err(AuthError::InternalError(_))));
    assert_eq!(store.get(&family_of(&tokens)).await.unwrap(), before);
    assert!(working.refresh(tokens.refresh_token.as_str()).await.is_ok());
}

#[tokio::test]
async fn each_generation_refreshes_exactly_once() {
    let (_, service) = setup();
    let mut tokens = service.issue(user()).await.unwrap();

    for _ in 0..5 {
        tokens = service.refresh(tokens.refresh_token.as_str()).await.unwrap();
    }

    assert!(service.refresh(tokens.refresh_token.as_str()).await.is_ok());
}

#[tokio::test]
async fn expired_family_is_reported_and_deleted() {
    let store = Arc::new(InMemorySessionFamilyStore::new(RETENTION));
    let service = service_with(store.clone(), Duration::from_secs(1), Duration::from_secs(1));
    let tokens = service.issue(user()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;

    let result = service.refresh(tokens.refresh_token.as_str()).await;
    assert!(matches!(result, Err(AuthError::RefreshTokenExpired)));
    assert_eq!(store.get(&family_of(&tokens)).await.unwrap(), None);
}

#[tokio::test]
async fn malformed_token_never_reaches_the_store() {
    let store = Arc::new(InstrumentedStore::new(Duration::ZERO));
    let service = service_with(store.clone(), Duration::from_secs(60), Duration::from_secs(1));

    let result = service.refresh("xx_abc_def").await;
    service.logout("xx_abc_def").await;

    assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn unknown_family_is_invalid() {
    let (_, service) = setup();
    let (token, _) = RefreshTokenCodec::generate();

    let result = service.refresh(token.as_str()).await;

    assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
}

#[tokio::test]
async fn token_two_generations_back_is_invalid_and_leaves_family_alone() {
    let (store, service) = setup();
    let first = service.issue(user()).await.unwrap();
    let second = service.refresh(first.refresh_token.as_str()).await.unwrap();
    let third = service.refresh(second.refresh_token.as_str()).await.unwrap();
    let family_id = family_of(&first);
    let before = store.get(&family_id).await.unwrap();

    let result = service.refresh(first.refresh_token.as_str()).await;

    assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    assert_eq!(store.get(&family_id).await.unwrap(), before);
    assert!(service.refresh(third.refresh_token.as_str()).await.is_ok());
}

#[tokio::test]
async fn forged_secret_in_live_family_is_invalid() {
    let (store, service) = setup();
    let tokens = service.issue(user()).await.unwrap();
    let family_id = family_of(&tokens);
    let forged = RefreshTokenCodec::generate_with_family(&family_id);

    let result = service.refresh(forged.as_str()).await;

    assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    assert!(store.get(&family_id).await.unwrap().is_some());
}

#[tokio::test]
async fn logout_is_idempotent() {
    let (store, service) = setup();
    let tokens = service.issue(user()).await.unwrap();

    service.logout(tokens.refresh_token.as_str()).await;
    service.logout(tokens.refresh_token.as_str()).await;
    service.logout("not a token").await;

    assert_eq!(store.get(&family_of(&tokens)).await.unwrap(), None);
    assert!(matches!(
        service.refresh(tokens.refresh_token.as_str()).await,
        Err(AuthError::InvalidRefreshToken)
    ));
}

#[tokio::test]
async fn logout_all_revokes_every_family_of_one_user() {
    let (_, service) = setup();
    let (alice, bob) = (user(), user());
    let mut alice_tokens = Vec::new();
    for _ in 0..3 {
        alice_tokens.push(service.issue(alice).await.unwrap());
    }
    let rotated = service
        .refresh(alice_tokens[0].refresh_token.as_str())
        .await
        .unwrap();
    let bob_tokens = service.issue(bob).await.unwrap();

    service.logout_all(alice).await.unwrap();

    for tokens in alice_tokens.iter().skip(1).chain([&rotated]) {
        assert!(matches!(
            service.refresh(tokens.refresh_token.as_str()).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }
    assert!(service.list_sessions(alice).await.unwrap().is_empty());
    assert!(service.refresh(bob_tokens.refresh_token.as_str()).await.is_ok());
}

#[tokio::test]
async fn list_sessions_reports_live_families() {
    let (_, service) = setup();
    let user_id = user();
    let a = service.issue(user_id).await.unwrap();
    let b = service.issue(user_id).await.unwrap();
    service.logout(b.refresh_token.as_str()).await;
    let c = service.issue(user_id).await.unwrap();

    let sessions = service.list_sessions(user_id).await.unwrap();
    let mut listed: Vec<FamilyId> = sessions.into_iter().map(|s| s.family_id).collect();
    listed.sort();
    let mut expected = vec![family_of(&a), family_of(&c)];
    expected.sort();

    assert_eq!(listed, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_of_one_token_have_a_single_winner() {
    let (store, service) = setup();
    let service = Arc::new(service);
    let tokens = service.issue(user()).await.unwrap();
    let presented = tokens.refresh_token.as_str().to_string();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            let presented = presented.clone();
            tokio::spawn(async move { service.refresh(&presented).await })
        })
        .collect();

    let mut winners = 0;
    let mut reused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(AuthError::RefreshTokenReused) => reused += 1,
            Err(AuthError::InvalidRefreshToken) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert!(reused >= 1);
    assert_eq!(store.get(&family_of(&tokens)).await.unwrap(), None);
}

#[tokio::test]
async fn slow_store_fails_closed() {
    let store = Arc::new(InstrumentedStore::new(Duration::from_millis(300)));
    let service = service_with(store.clone(), Duration::from_secs(60), Duration::from_millis(50));
    let tokens = service.issue(user()).await.unwrap();

    let result = service.refresh(tokens.refresh_token.as_str()).await;

    assert!(matches!(result, Err(AuthError::Store(_))));
    let record = store.inner.get(&family_of(&tokens)).await.unwrap().unwrap();
    assert_eq!(
        record.current_token_hash,
        RefreshTokenCodec::hash(tokens.refresh_token.as_str())
    );
}
