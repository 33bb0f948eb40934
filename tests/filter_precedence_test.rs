//! Path-filter semantics end to end: gitignore precedence, include and
//! exclude globs, and filter suppression in the indexing pipeline.

use lci::config::Settings;
use lci::filter::{GitignoreSource, PathFilter};
use lci::index::{IndexCoordinator, Requirements};
use lci::parsing::ParserRegistry;
use lci::scheduler::IndexScheduler;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_gitignore_negation_precedence() {
    let filter = PathFilter::build(
        Path::new("/repo"),
        &[],
        &[],
        &[
            GitignoreSource::Line("*.log".to_string()),
            GitignoreSource::Line("!important.log".to_string()),
        ],
    )
    .unwrap();

    assert!(!filter.should_index(Path::new("/repo/debug.log"), false));
    assert!(filter.should_index(Path::new("/repo/important.log"), false));
}

#[test]
fn test_gitignore_file_on_disk_respected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".gitignore"), "generated/\n*.tmp.rs\n").unwrap();

    let filter = PathFilter::build(
        dir.path(),
        &[],
        &[],
        &[GitignoreSource::File(dir.path().join(".gitignore"))],
    )
    .unwrap();

    assert!(!filter.should_index(&dir.path().join("generated"), true));
    assert!(!filter.should_index(&dir.path().join("scratch.tmp.rs"), false));
    assert!(filter.should_index(&dir.path().join("src.rs"), false));
}

#[test]
fn test_later_pattern_overrides_earlier() {
    let filter = PathFilter::build(
        Path::new("/repo"),
        &[],
        &[],
        &[
            GitignoreSource::Line("docs/**".to_string()),
            GitignoreSource::Line("!docs/keep.md".to_string()),
            GitignoreSource::Line("docs/keep.md".to_string()),
        ],
    )
    .unwrap();

    // The final re-ignore wins over the negation before it.
    assert!(!filter.should_index(Path::new("/repo/docs/keep.md"), false));
}

#[test]
fn test_scheduler_honors_filter_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::create_dir_all(root.join("vendor")).unwrap();
    std::fs::write(root.join("src/kept.rs"), "fn kept_symbol() {}\n").unwrap();
    std::fs::write(root.join("vendor/dropped.rs"), "fn dropped_symbol() {}\n").unwrap();
    std::fs::write(root.join(".gitignore"), "vendor/\n").unwrap();

    let settings = Arc::new(Settings::for_root(root.clone()));
    let filter = Arc::new(
        PathFilter::build(
            &root,
            &[],
            &settings.indexing.exclude,
            &[GitignoreSource::File(root.join(".gitignore"))],
        )
        .unwrap(),
    );
    let coordinator = Arc::new(IndexCoordinator::new(5));
    let scheduler = IndexScheduler::start(
        Arc::clone(&coordinator),
        Arc::clone(&settings),
        filter,
        Arc::new(ParserRegistry::new()),
    );
    scheduler.walk_project();

    let progress = scheduler.progress();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !progress.ready() {
        assert!(Instant::now() < deadline, "indexing never settled");
        std::thread::sleep(Duration::from_millis(10));
    }

    let view = coordinator
        .acquire_read(Requirements::all(), Duration::from_secs(5))
        .unwrap();
    let symbols = view.symbols().unwrap();
    assert_eq!(symbols.lookup_by_name("kept_symbol").count(), 1);
    assert_eq!(symbols.lookup_by_name("dropped_symbol").count(), 0);
}
