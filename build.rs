//! Stamps the binary with the commit it was built from

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=CHECKIN_GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");

    // Packaged builds have no .git; let the packager supply the hash
    let git_hash = std::env::var("CHECKIN_GIT_HASH").ok().unwrap_or_else(|| {
        Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
            .ok()
            .filter(|output| output.status.success())
            .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    });

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
}
