use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{http::StatusCode, routing::get, Json, Router};
use color_eyre::Result;
use itemgate::{
    clock::{System, UnixTime},
    error::AuthorizeError,
    jwks::KeyIdRef,
    AuthorizationDecision, Authorizer, AuthorizerConfig, AuthorizerEvent, ConfigError,
    KeyDirectory, RemoteKeyDirectory,
};
use serde_json::{json, Value};

mod common;

use common::{bearer, TestIssuer};

const FETCH_TIMEOUT: Duration = Duration::from_millis(500);

async fn serve(router: Router) -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, router).await });
    Ok(addr)
}

/// Serves `body` at `/jwks.json`, counting requests
async fn serve_jwks(body: Value) -> Result<(SocketAddr, Arc<AtomicUsize>)> {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    let router = Router::new().route(
        "/jwks.json",
        get(move || {
            let counter = Arc::clone(&counter);
            let body = body.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Json(body)
            }
        }),
    );

    Ok((serve(router).await?, hits))
}

fn now() -> UnixTime {
    use itemgate::clock::Clock;
    System.now()
}

#[tokio::test]
async fn fetches_published_key_set() -> Result<()> {
    let issuer = TestIssuer::new("K1")?;
    let (addr, hits) = serve_jwks(issuer.jwks_json()?).await?;

    let directory = RemoteKeyDirectory::new(format!("http://{addr}/jwks.json"), FETCH_TIMEOUT)?;
    let keys = directory.fetch_keys().await?;

    assert_eq!(keys.len(), 1);
    let key = keys.select(KeyIdRef::from_str("K1"));
    assert_eq!(
        key.map(|k| k.certificate_chain().to_vec()),
        Some(vec![issuer.x5c()?])
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn slow_directory_times_out() -> Result<()> {
    let router = Router::new().route(
        "/jwks.json",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(json!({ "keys": [] }))
        }),
    );
    let addr = serve(router).await?;

    let directory = RemoteKeyDirectory::new(format!("http://{addr}/jwks.json"), FETCH_TIMEOUT)?;
    let err = directory.fetch_keys().await.unwrap_err();

    assert_eq!(err.to_string(), "key retrieval failed");
    Ok(())
}

#[tokio::test]
async fn slow_directory_denies_the_caller() -> Result<()> {
    let issuer = TestIssuer::new("K1")?;
    let router = Router::new().route(
        "/jwks.json",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(json!({ "keys": [] }))
        }),
    );
    let addr = serve(router).await?;

    let config = AuthorizerConfig::new(format!("http://{addr}/jwks.json"))
        .with_fetch_timeout(FETCH_TIMEOUT)
        .allow_insecure_http();
    let authorizer = Authorizer::from_config(&config)?;
    let header = bearer(&issuer.token_for("user1", now())?);

    let err = authorizer.verify(Some(header.as_str())).await.unwrap_err();
    assert!(matches!(err, AuthorizeError::KeyRetrieval(_)));
    assert_eq!(err.reason(), "key retrieval failed");

    let decision = authorizer.authorize(&AuthorizerEvent::new(header)).await;
    assert_eq!(decision, AuthorizationDecision::deny());
    Ok(())
}

#[tokio::test]
async fn error_status_is_a_retrieval_failure() -> Result<()> {
    let router = Router::new().route(
        "/jwks.json",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable") }),
    );
    let addr = serve(router).await?;

    let directory = RemoteKeyDirectory::new(format!("http://{addr}/jwks.json"), FETCH_TIMEOUT)?;
    assert!(directory.fetch_keys().await.is_err());
    Ok(())
}

#[tokio::test]
async fn unreadable_bodies_are_retrieval_failures() -> Result<()> {
    let router = Router::new()
        .route("/text", get(|| async { "not a key set" }))
        .route("/no-keys", get(|| async { Json(json!({ "items": [] })) }));
    let addr = serve(router).await?;

    for path in ["text", "no-keys"] {
        let directory = RemoteKeyDirectory::new(format!("http://{addr}/{path}"), FETCH_TIMEOUT)?;
        assert!(directory.fetch_keys().await.is_err(), "{path} was accepted");
    }
    Ok(())
}

#[tokio::test]
async fn unreachable_directory_denies() -> Result<()> {
    let issuer = TestIssuer::new("K1")?;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let config = AuthorizerConfig::new(format!("http://{addr}/jwks.json"))
        .with_fetch_timeout(FETCH_TIMEOUT)
        .allow_insecure_http();
    let authorizer = Authorizer::from_config(&config)?;

    let token = issuer.token_for("user1", now())?;
    let err = authorizer.verify(Some(bearer(&token).as_str())).await.unwrap_err();
    assert!(matches!(err, AuthorizeError::KeyRetrieval(_)));

    let decision = authorizer.authorize(&AuthorizerEvent::new(bearer(&token))).await;
    assert_eq!(decision, AuthorizationDecision::deny());
    Ok(())
}

#[tokio::test]
async fn configured_authorizer_allows_and_fetches_per_call() -> Result<()> {
    let issuer = TestIssuer::new("K1")?;
    let (addr, hits) = serve_jwks(issuer.jwks_json()?).await?;

    let config = AuthorizerConfig::new(format!("http://{addr}/jwks.json")).allow_insecure_http();
    let authorizer = Authorizer::from_config(&config)?;
    let event = AuthorizerEvent::new(bearer(&issuer.token_for("user1", now())?));

    assert_eq!(authorizer.authorize(&event).await, AuthorizationDecision::allow("user1"));
    assert_eq!(authorizer.authorize(&event).await, AuthorizationDecision::allow("user1"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn sub_second_fetch_timeout_allows_prompt_directory() -> Result<()> {
    let issuer = TestIssuer::new("K1")?;
    let (addr, hits) = serve_jwks(issuer.jwks_json()?).await?;

    let config = AuthorizerConfig::new(format!("http://{addr}/jwks.json"))
        .with_fetch_timeout(FETCH_TIMEOUT)
        .allow_insecure_http();
    let authorizer = Authorizer::from_config(&config)?;
    let event = AuthorizerEvent::new(bearer(&issuer.token_for("user1", now())?));

    for _ in 0..3 {
        assert_eq!(authorizer.authorize(&event).await, AuthorizationDecision::allow("user1"));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn configured_cache_reuses_key_set() -> Result<()> {
    let issuer = TestIssuer::new("K1")?;
    let (addr, hits) = serve_jwks(issuer.jwks_json()?).await?;

    let config = AuthorizerConfig::new(format!("http://{addr}/jwks.json"))
        .with_cache_ttl(Duration::from_secs(300))
        .allow_insecure_http();
    let authorizer = Authorizer::from_config(&config)?;
    let event = AuthorizerEvent::new(bearer(&issuer.token_for("user1", now())?));

    for _ in 0..3 {
        assert!(authorizer.authorize(&event).await.is_allowed());
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn authorizer_can_be_shared_between_tasks() -> Result<()> {
    let issuer = TestIssuer::new("K1")?;
    let (addr, _) = serve_jwks(issuer.jwks_json()?).await?;

    let config = AuthorizerConfig::new(format!("http://{addr}/jwks.json")).allow_insecure_http();
    let authorizer = Arc::new(Authorizer::from_config(&config)?);
    let token = issuer.token_for("user1", now())?;

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let authorizer = Arc::clone(&authorizer);
            let event = AuthorizerEvent::new(bearer(&token));
            tokio::spawn(async move { authorizer.authorize(&event).await })
        })
        .collect();

    for task in tasks {
        assert!(task.await?.is_allowed());
    }
    Ok(())
}

#[tokio::test]
async fn plain_http_requires_opt_in() {
    let config = AuthorizerConfig::new("http://127.0.0.1:1/jwks.json");

    assert!(matches!(
        Authorizer::from_config(&config).err(),
        Some(ConfigError::InsecureJwksUrl(_))
    ));
}
