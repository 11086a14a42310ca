//! Build script to inject version and git SHA at compile time.
//!
//! - DIALBRIDGE_VERSION: release version (defaults to CARGO_PKG_VERSION)
//! - DIALBRIDGE_GIT_SHA: commit SHA (defaults to GITHUB_SHA, then `git rev-parse`)

use std::process::Command;

fn main() {
    let version = std::env::var("DIALBRIDGE_VERSION").unwrap_or_else(|_| {
        std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".into())
    });
    println!("cargo:rustc-env=DIALBRIDGE_VERSION={}", version);

    let git_sha = std::env::var("DIALBRIDGE_GIT_SHA")
        .or_else(|_| std::env::var("GITHUB_SHA").map(|s| s.chars().take(7).collect()))
        .unwrap_or_else(|_| short_sha_from_git());
    println!("cargo:rustc-env=DIALBRIDGE_GIT_SHA={}", git_sha);

    println!("cargo:rerun-if-env-changed=DIALBRIDGE_VERSION");
    println!("cargo:rerun-if-env-changed=DIALBRIDGE_GIT_SHA");
    println!("cargo:rerun-if-env-changed=GITHUB_SHA");
}

fn short_sha_from_git() -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output();
    match output {
        Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout).trim().to_string(),
        _ => "unknown".into(),
    }
}
