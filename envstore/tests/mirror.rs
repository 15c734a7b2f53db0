//! Mirror creation and remote wiring against real repositories.

use std::fs;

use envstore::StoreError;
use envstore::io::git::{GitCli, GitJournal};
use envstore::io::mirror::{ensure_mirror, mirror_path_for};
use envstore::test_support::{TestRepo, git_in};

#[test]
fn local_repo_is_keyed_by_path_and_cloned_bare() {
    let repo = TestRepo::new().expect("repo");
    let cfg = repo.config();
    let git = GitCli::new(&cfg);
    let source = repo.path();

    let mirror = ensure_mirror(&git, &cfg.mirrors_root, &source).expect("mirror");

    let expected = cfg
        .mirrors_root
        .join(source.to_string_lossy().trim_start_matches('/'));
    assert_eq!(mirror, expected);
    assert_eq!(
        git_in(&mirror, &["rev-parse", "--is-bare-repository"]).expect("bare"),
        "true"
    );
    assert_eq!(
        repo.git(&["remote", "get-url", "container-use"]).expect("remote"),
        mirror.to_string_lossy()
    );
}

#[test]
fn origin_url_determines_mirror_key() {
    let repo = TestRepo::new().expect("repo");
    repo.git(&["remote", "add", "origin", "git@github.com:org/demo.git"])
        .expect("origin");
    let cfg = repo.config();
    let git = GitCli::new(&cfg);

    let mirror = mirror_path_for(&git, &cfg.mirrors_root, &repo.path()).expect("path");
    assert_eq!(mirror, cfg.mirrors_root.join("github.com/org/demo"));
}

#[test]
fn second_call_reuses_mirror_without_cloning() {
    let repo = TestRepo::new().expect("repo");
    let cfg = repo.config();
    let journal = GitJournal::default();
    let git = GitCli::new(&cfg).with_journal(journal.clone());

    let first = ensure_mirror(&git, &cfg.mirrors_root, &repo.path()).expect("first");
    journal.lock().expect("lock").clear();
    let second = ensure_mirror(&git, &cfg.mirrors_root, &repo.path()).expect("second");

    assert_eq!(first, second);
    let calls = journal.lock().expect("lock");
    assert!(calls.iter().all(|c| !c.starts_with("clone")), "{calls:?}");
    assert!(calls.iter().all(|c| !c.starts_with("remote add")), "{calls:?}");
}

#[test]
fn stale_remote_is_repaired() {
    let repo = TestRepo::new().expect("repo");
    let cfg = repo.config();
    let git = GitCli::new(&cfg);
    let mirror = ensure_mirror(&git, &cfg.mirrors_root, &repo.path()).expect("mirror");

    repo.git(&["remote", "set-url", "container-use", "/nonexistent/mirror"])
        .expect("break remote");
    let repaired = ensure_mirror(&git, &cfg.mirrors_root, &repo.path()).expect("repair");

    assert_eq!(repaired, mirror);
    assert_eq!(
        repo.git(&["remote", "get-url", "container-use"]).expect("remote"),
        mirror.to_string_lossy()
    );
}

#[test]
fn no_staging_directories_are_left_behind() {
    let repo = TestRepo::new().expect("repo");
    let cfg = repo.config();
    let git = GitCli::new(&cfg);
    let mirror = ensure_mirror(&git, &cfg.mirrors_root, &repo.path()).expect("mirror");

    let parent = mirror.parent().expect("parent");
    let leftovers: Vec<_> = fs::read_dir(parent)
        .expect("read")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn non_repository_source_fails() {
    let repo = TestRepo::new().expect("repo");
    let cfg = repo.config();
    let git = GitCli::new(&cfg);
    let not_a_repo = tempfile::tempdir().expect("tempdir");

    let err = ensure_mirror(&git, &cfg.mirrors_root, not_a_repo.path()).unwrap_err();
    assert!(
        matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::MirrorSetup { .. }) | Some(StoreError::GitCommand { .. })
        ),
        "{err:#}"
    );
}
