//! Basic example demonstrating simple GET and POST calls.
//!
//! This example shows how to:
//! - Create a caller with basic configuration
//! - Run GET calls and parse JSON bodies
//! - Run POST calls with form parameters
//! - Access response metadata
//!
//! Run with: `cargo run --example basic_call`

use serde::Deserialize;
use webcaller::{CallSpec, Caller, Error, ReusePolicy};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("webcaller=debug,basic_call=info")
        .init();

    // Create a caller for the JSONPlaceholder API
    let caller = Caller::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .reuse_policy(ReusePolicy::Reused)
        .accept_gzip(true)
        .debug_body_capture(256)
        .build()?;

    println!("=== GET Example ===");
    let response = caller.get("/posts/1")?;
    println!("Status code: {}", response.status);
    println!("Request latency: {:?}", response.latency);
    println!("Content-Type: {:?}", response.header("content-type"));

    let post: Post = response.json()?;
    println!("Post ID: {}", post.id);
    println!("Title: {}", post.title);
    println!();

    println!("=== POST Example ===");
    let spec = CallSpec::post("/posts")
        .with_form_param("title", "My New Post")
        .with_form_param("body", "This is the content of my new post!")
        .with_form_param("userId", "1");
    let response = caller.run(&spec)?;
    println!("Status code: {}", response.status);
    println!("Was retried: {}", response.was_retried());
    println!("Body: {}", response.text()?);
    println!();

    println!("=== HEAD Example ===");
    let response = caller.head("/posts/1")?;
    println!("Has body: {}", response.body.is_some());
    println!("Transport clients built: {}", caller.lifecycle().builds());

    Ok(())
}
