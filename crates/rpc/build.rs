use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=GITHUB_SHA");
    println!("cargo:rerun-if-env-changed=GIT_COMMIT_HASH");
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let from_env = ["GIT_COMMIT_HASH", "GITHUB_SHA"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|sha| sha.trim().to_string())
        .find(|sha| !sha.is_empty());

    let sha = from_env.or_else(|| {
        let output = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!sha.is_empty()).then_some(sha)
    });

    if let Some(sha) = sha {
        println!("cargo:rustc-env=GIT_COMMIT_HASH={sha}");
    }
}
