use rotating_proxy_pool::{
    PoolError, PoolStats, ProxyPool, ProxyPoolConfig, ProxyStatus, StaticSource, TcpChecker,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

/// Accepts and immediately drops connections, like a reachable proxy port.
async fn live_proxy() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    addr
}

/// An address with nothing listening on it.
async fn dead_proxy() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().to_string()
}

fn config() -> ProxyPoolConfig {
    ProxyPoolConfig::builder()
        .refresh_interval(Duration::from_secs(3600))
        .check_timeout(Duration::from_secs(2))
        .build()
}

async fn pool_with(addresses: Vec<String>) -> Result<Arc<ProxyPool>, PoolError> {
    ProxyPool::with_parts(
        config(),
        StaticSource::new(addresses),
        TcpChecker::new(Duration::from_secs(2)),
    )
    .await
}

#[tokio::test]
async fn lends_only_live_proxies() {
    let _ = env_logger::builder().is_test(true).try_init();

    let live = live_proxy().await;
    let dead = dead_proxy().await;
    let pool = assert_ok!(pool_with(vec![live.clone(), dead.clone()]).await);

    assert_eq!(pool.status(&dead), Some(ProxyStatus::Invalid));
    assert_eq!(assert_ok!(pool.pop().await), live);

    let err = assert_err!(pool.pop().await);
    assert!(matches!(err, PoolError::EmptyPool));

    assert_ok!(pool.put(&live, true).await);
    assert_eq!(assert_ok!(pool.pop().await), live);
    pool.close().await;
}

#[tokio::test]
async fn construction_fails_when_nothing_is_reachable() {
    let err = assert_err!(pool_with(vec![dead_proxy().await, dead_proxy().await]).await);
    assert!(matches!(err, PoolError::EmptyPool));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_borrowers_get_distinct_proxies() {
    let mut addresses = Vec::new();
    for _ in 0..6 {
        addresses.push(live_proxy().await);
    }
    let pool = assert_ok!(pool_with(addresses.clone()).await);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.pop().await })
        })
        .collect();

    let mut lent = HashSet::new();
    for handle in handles {
        let addr = assert_ok!(assert_ok!(handle.await));
        assert!(lent.insert(addr));
    }
    assert_eq!(lent, addresses.into_iter().collect::<HashSet<_>>());
    assert_eq!(pool.stats(), PoolStats { total: 0, valid: 0, leased: 6 });

    for addr in &lent {
        assert_ok!(pool.put(addr, true).await);
    }
    assert_eq!(pool.stats(), PoolStats { total: 6, valid: 6, leased: 0 });
    pool.close().await;
}

#[tokio::test]
async fn close_is_final() {
    let live = live_proxy().await;
    let pool = assert_ok!(pool_with(vec![live.clone()]).await);

    pool.close().await;
    pool.close().await;
    assert!(matches!(pool.pop().await, Err(PoolError::PoolClosed)));
    assert!(matches!(pool.put(&live, true).await, Err(PoolError::PoolClosed)));
}
