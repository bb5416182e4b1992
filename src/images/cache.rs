//! Per-row image cache folders.
//!
//! A cache folder holds the images previously fetched for one row under
//! one mode. Lookups are read-only and tolerant: a missing folder is just
//! an empty cache.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::debug;

/// List up to `count` cached files, sorted lexicographically with numeric
/// awareness (so `2.webp` sorts before `000010.webp`).
pub async fn list_cached(folder: &Path, count: usize) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        match entry.file_type().await {
            Ok(ft) if ft.is_file() => names.push(entry.file_name().to_string_lossy().into_owned()),
            _ => {}
        }
    }

    names.sort_by(|a, b| numeric_cmp(a, b));
    names
        .into_iter()
        .take(count)
        .map(|name| folder.join(name))
        .collect()
}

/// Best-effort recursive delete. Missing paths are fine.
pub async fn clear_if_stale(folder: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(folder).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(folder = %folder.display(), error = %e, "Cache clear failed");
        }
    }
}

/// Compare strings chunk-wise, treating digit runs as numbers.
fn numeric_cmp(a: &str, b: &str) -> Ordering {
    let mut ac = a.chars().peekable();
    let mut bc = b.chars().peekable();

    loop {
        match (ac.peek().copied(), bc.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                if x.is_ascii_digit() && y.is_ascii_digit() {
                    let na = take_number(&mut ac);
                    let nb = take_number(&mut bc);
                    match na.cmp(&nb) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                } else {
                    ac.next();
                    bc.next();
                    match x.cmp(&y) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                }
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> u64 {
    let mut n: u64 = 0;
    while let Some(c) = chars.peek() {
        if let Some(d) = c.to_digit(10) {
            n = n.saturating_mul(10).saturating_add(d as u64);
            chars.next();
        } else {
            break;
        }
    }
    n
}
