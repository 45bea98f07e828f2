//! Simple example of using rotating-proxy-pool.

use reqwest_middleware::ClientBuilder;
use rotating_proxy_pool::{ProxyPool, ProxyPoolConfig, ProxyPoolMiddleware};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Initializing proxy pool...");

    let config = ProxyPoolConfig::builder()
        // plain `host:port` lists, one proxy per line
        .sources(vec![
            "https://cdn.jsdelivr.net/gh/proxifly/free-proxy-list@main/proxies/protocols/http/data.txt",
        ])
        .check_timeout(Duration::from_secs(5))
        .refresh_interval(Duration::from_secs(10 * 60))
        .retry_count(3)
        // rate limit for each proxy, lower performance but avoid banned
        .max_requests_per_second(3.0)
        .build();

    let pool = ProxyPool::new(config).await?;
    println!("Pool ready: {:?}", pool.stats());

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(ProxyPoolMiddleware::with_pool(Arc::clone(&pool)))
        .build();

    println!("Sending request...");
    let response = client.get("http://httpbin.org/ip").send().await?;

    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);

    // Borrowing by hand works too.
    let addr = pool.pop().await?;
    println!("Borrowed {}", addr);
    pool.put(&addr, true).await?;

    pool.close().await;
    Ok(())
}
