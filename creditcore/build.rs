// Audits lint suppressions across the workspace crates.
//
// `creditcore` sources and tests may not suppress any lint. The sibling crates
// may only carry the crate-level allowances listed in `PERMITTED`. Set
// CREDITCORE_LINT_AUDIT=0 to skip the audit.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// (crate directory, lint) pairs that may be allowed.
const PERMITTED: &[(&str, &str)] = &[("creditcore-memory", "clippy::significant_drop_tightening")];

const AUDITED_CRATES: &[&str] = &["creditcore", "creditcore-memory", "creditcore-testing"];

struct Suppression {
    file: PathBuf,
    line: usize,
    lints: Vec<String>,
}

fn main() {
    println!("cargo:rerun-if-env-changed=CREDITCORE_LINT_AUDIT");
    if env::var("CREDITCORE_LINT_AUDIT").is_ok_and(|value| value == "0") {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR"));
    let workspace = manifest_dir.parent().unwrap_or(&manifest_dir).to_path_buf();

    let mut offending = Vec::new();
    for krate in AUDITED_CRATES {
        for part in ["src", "tests"] {
            let dir = workspace.join(krate).join(part);
            if !dir.is_dir() {
                continue;
            }
            println!("cargo:rerun-if-changed={}", dir.display());
            let mut found = Vec::new();
            collect(&dir, &mut found);
            offending.extend(found.into_iter().filter(|s| !is_permitted(krate, s)));
        }
    }

    if offending.is_empty() {
        return;
    }
    for suppression in &offending {
        eprintln!(
            "  {}:{}: allow({})",
            suppression.file.display(),
            suppression.line,
            suppression.lints.join(", ")
        );
    }
    panic!("{} unapproved lint suppression(s) in the workspace", offending.len());
}

fn is_permitted(krate: &str, suppression: &Suppression) -> bool {
    suppression
        .lints
        .iter()
        .all(|lint| PERMITTED.contains(&(krate, lint.as_str())))
}

fn collect(path: &Path, found: &mut Vec<Suppression>) {
    if path.is_dir() {
        let Ok(entries) = fs::read_dir(path) else {
            return;
        };
        for entry in entries.flatten() {
            collect(&entry.path(), found);
        }
        return;
    }
    if path.extension().map_or(true, |ext| ext != "rs") {
        return;
    }
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    for (index, line) in content.lines().enumerate() {
        if let Some(lints) = allowed_lints(line) {
            found.push(Suppression {
                file: path.to_path_buf(),
                line: index + 1,
                lints,
            });
        }
    }
}

/// Lints named by an `allow` attribute on this line, if it has one.
fn allowed_lints(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim_start();
    let rest = trimmed
        .strip_prefix("#![allow(")
        .or_else(|| trimmed.strip_prefix("#[allow("))?;
    let inner = rest.split(')').next().unwrap_or_default();
    Some(
        inner
            .split(',')
            .map(str::trim)
            .filter(|lint| !lint.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
