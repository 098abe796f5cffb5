//! Example demonstrating the response cache.
//!
//! This example shows how to:
//! - Wrap a caller with a file-backed cache
//! - Serve repeated reads from the cache within a retention window
//! - Force a refresh
//! - Share one fetch between concurrent readers
//!
//! Run with: `cargo run --example cached_fetch`

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use webcaller::cache::{CachedCaller, FileStore};
use webcaller::{CallSpec, Caller, Error, ReusePolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Post {
    id: u32,
    title: String,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("webcaller=debug,cached_fetch=info")
        .init();

    let directory = std::env::temp_dir().join("webcaller-demo-cache");
    let store = FileStore::new(&directory)
        .map_err(|e| Error::Configuration(format!("cannot open cache directory: {}", e)))?;
    println!("Cache directory: {}", store.root().display());

    let caller = Caller::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .reuse_policy(ReusePolicy::Reused)
        .build()?;
    let cache = CachedCaller::new(caller, Arc::new(store));

    let spec = CallSpec::get("/posts/1");
    let retention = Duration::from_secs(300);

    println!("=== First read ===");
    let started = Instant::now();
    let post: Post = cache.get(&spec, retention, false)?;
    println!("{:?} in {:?}", post, started.elapsed());

    println!("=== Second read, served from the cache ===");
    let started = Instant::now();
    let post: Post = cache.get(&spec, retention, false)?;
    println!("{:?} in {:?}", post, started.elapsed());

    println!("=== Forced refresh ===");
    let post: Post = cache.get(&spec, retention, true)?;
    println!("{:?}", post);

    println!("=== Concurrent readers of a cold entry ===");
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || cache.get::<Post>(&CallSpec::get("/posts/2"), retention, true))
        })
        .collect();
    for handle in handles {
        match handle.join() {
            Ok(result) => println!("{:?}", result?),
            Err(_) => println!("reader panicked"),
        }
    }

    Ok(())
}
