// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=CAMERA_EFFECTS_VERSION");

    // Packaged builds set the version explicitly
    let version = std::env::var("CAMERA_EFFECTS_VERSION").unwrap_or_else(|_| git_version());
    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `0.1.0-abcdef1` at a tag, `0.1.0-dirty-abcdef1` past one, the hash otherwise
fn git_version() -> String {
    let hash = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let Some(described) = git(&["describe", "--tags", "--match", "v*"]) else {
        return hash;
    };
    let described = described.strip_prefix('v').unwrap_or(&described);

    // describe output past a tag is "<tag>-<commits>-g<hash>"
    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    match parts.as_slice() {
        [commit, _, tag] => {
            let commit = commit.strip_prefix('g').unwrap_or(commit);
            format!("{}-dirty-{}", tag, commit)
        }
        _ => format!("{}-{}", described, hash),
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
