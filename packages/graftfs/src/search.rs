//! Name search across the namespace.

use std::collections::VecDeque;

use graftfs_core::{Node, Result, VPath};
use tracing::debug;

use crate::manager::FsManager;

/// Breadth-first name search under `base`.
///
/// Matching is a case-insensitive substring test against each entry's name.
/// Results come back in discovery order, capped at `limit`. Listings go
/// through the manager, so subtrees grafted below `base` are searched too.
/// Directories that fail to list are skipped, not fatal.
pub(crate) async fn run(
    manager: &FsManager,
    query: &str,
    base: &VPath,
    limit: usize,
) -> Result<Vec<Node>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    let root = manager.stat_path(base).await?;
    if root.kind.is_file() {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    let mut queue = VecDeque::from([base.clone()]);
    while let Some(dir) = queue.pop_front() {
        let children = match manager.read_dir_path(&dir).await {
            Ok(children) => children,
            Err(error) => {
                debug!(path = %dir, %error, "skipping unreadable directory in search");
                continue;
            }
        };
        for child in children {
            let is_dir = child.kind.is_dir();
            let path = child.path.clone();
            if child.name.to_lowercase().contains(&needle) {
                results.push(child);
                if results.len() >= limit {
                    return Ok(results);
                }
            }
            if is_dir {
                queue.push_back(path);
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graftfs_core::AdapterOptions;

    async fn sample_tree() -> FsManager {
        let fs = FsManager::new();
        fs.write_file("/docs/Report.md", "q1").await.unwrap();
        fs.write_file("/docs/notes.txt", "n").await.unwrap();
        fs.write_file("/docs/archive/report-old.md", "q0")
            .await
            .unwrap();
        fs.write_file("/src/main.rs", "fn main() {}").await.unwrap();
        fs
    }

    #[tokio::test]
    async fn matches_are_case_insensitive() {
        let fs = sample_tree().await;
        let hits = fs.search("report", "/").await.unwrap();
        let names: Vec<_> = hits.into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["Report.md", "report-old.md"]);
    }

    #[tokio::test]
    async fn directories_match_too() {
        let fs = sample_tree().await;
        let hits = fs.search("docs", "/").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].kind.is_dir());
    }

    #[tokio::test]
    async fn scoped_to_the_base_path() {
        let fs = sample_tree().await;
        let hits = fs.search("main", "/docs").await.unwrap();
        assert!(hits.is_empty());

        let hits = fs.search("main", "/src").await.unwrap();
        assert_eq!(hits[0].path.to_string(), "/src/main.rs");
    }

    #[tokio::test]
    async fn blank_query_returns_nothing() {
        let fs = sample_tree().await;
        assert!(fs.search("", "/").await.unwrap().is_empty());
        assert!(fs.search("   ", "/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn results_are_capped() {
        let config = crate::FsConfig {
            search_limit: 3,
            ..crate::FsConfig::default()
        };
        let fs = FsManager::with_config(config);
        for i in 0..10 {
            fs.write_file(&format!("/bulk/hit-{i}.txt"), "x")
                .await
                .unwrap();
        }

        let hits = fs.search("hit", "/").await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn reaches_into_mounts() {
        let fs = sample_tree().await;
        fs.mount("/mem", "memory", AdapterOptions::new())
            .await
            .unwrap();
        fs.write_file("/mem/grafted-report.txt", "inside")
            .await
            .unwrap();

        let hits = fs.search("grafted", "/").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path.to_string(), "/mem/grafted-report.txt");
    }

    #[tokio::test]
    async fn missing_base_is_an_error() {
        let fs = sample_tree().await;
        assert!(fs.search("x", "/nope").await.is_err());
    }
}
