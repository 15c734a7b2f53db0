//! Create, update, log and delete environments end to end.

use std::fs;
use std::time::Duration;

use envstore::core::budget::Deadline;
use envstore::core::types::EnvironmentConfig;
use envstore::io::engine::RunRequest;
use envstore::io::git::{GitCli, GitJournal};
use envstore::io::worktree;
use envstore::test_support::{FakeEngine, TestRepo, git_in};
use envstore::{Repository, StoreError};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn open(repo: &TestRepo) -> Repository {
    Repository::open(&repo.config(), &repo.path()).expect("open")
}

#[test]
fn create_publishes_branch_worktree_and_state() {
    let repo = TestRepo::new().expect("repo");
    repo.write("app.py", "print('hi')\n").expect("write");
    let store = open(&repo);
    let engine = FakeEngine::new().expect("engine");

    let env = store
        .create_with_rng(&engine, "web", "start app", &mut StdRng::seed_from_u64(7))
        .expect("create");

    assert!(env.id.starts_with("web/"));
    assert_eq!(env.worktree, store.binding().worktree_path(&env.id));
    assert!(env.worktree.join("app.py").is_file());
    assert!(env.worktree.join(".container-use/environment.json").is_file());

    let mirror = &store.binding().mirror_path;
    git_in(mirror, &["rev-parse", "--verify", &format!("refs/heads/{}", env.id)])
        .expect("mirror branch");
    repo.git(&["rev-parse", "--verify", &format!("refs/heads/{}", env.id)])
        .expect("source tracking branch");

    let tracking = format!("container-use/{}", env.id);
    let note = repo
        .git(&["notes", "--ref", "container-use-state", "show", &tracking])
        .expect("state note");
    assert_eq!(note, "[]");
    assert!(store.history_at(&tracking).expect("history").is_empty());

    assert_eq!(store.list().expect("list"), vec![env.id.clone()]);
    assert_eq!(engine.starts(), vec![env.id.clone()]);
}

#[test]
fn uncommitted_tracked_edits_are_replayed() {
    let repo = TestRepo::new().expect("repo");
    repo.write("README.md", "# demo\n\nwork in progress\n").expect("write");
    let store = open(&repo);
    let engine = FakeEngine::new().expect("engine");

    let env = store.create(&engine, "docs", "edit readme").expect("create");

    assert_eq!(
        fs::read_to_string(env.worktree.join("README.md")).expect("read"),
        "# demo\n\nwork in progress\n"
    );
    let subjects = git_in(&env.worktree, &["log", "--format=%s"]).expect("log");
    assert!(subjects.lines().any(|s| s == "Copy uncommitted changes"), "{subjects}");
    // The source's working tree is left alone.
    assert_eq!(repo.git(&["status", "--porcelain"]).expect("status"), "M README.md");
}

#[test]
fn materialize_is_idempotent() {
    let repo = TestRepo::new().expect("repo");
    let store = open(&repo);
    let engine = FakeEngine::new().expect("engine");
    let env = store.create(&engine, "web", "start").expect("create");

    let journal = GitJournal::default();
    let git = GitCli::new(&repo.config()).with_journal(journal.clone());
    let path = worktree::materialize(&git, store.binding(), &env.id).expect("materialize");

    assert_eq!(path, env.worktree);
    assert!(journal.lock().expect("lock").is_empty());
}

#[test]
fn update_records_history_and_commits_output() {
    let repo = TestRepo::new().expect("repo");
    let store = open(&repo);
    let engine = FakeEngine::new().expect("engine");
    let env = store.create(&engine, "web", "start").expect("create");

    let updated = store
        .update(&engine, &env.id, "Write greeting", "say hello", |env, engine| {
            env.run(engine, &RunRequest::shell("echo hello > out.txt"), "say hello")?;
            Ok(())
        })
        .expect("update");

    assert_eq!(updated.history.latest_version(), 1);
    let tracking = format!("container-use/{}", env.id);
    assert_eq!(
        repo.git(&["show", &format!("{tracking}:out.txt")]).expect("show"),
        "hello"
    );
    assert_eq!(
        repo.git(&["log", "-1", "--format=%s", &tracking]).expect("log"),
        "Write greeting"
    );

    let history = store.history_at(&tracking).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(
        history.latest().map(|r| r.name.as_str()),
        Some("Run echo hello > out.txt")
    );

    let reloaded = store.get(&env.id).expect("get");
    assert_eq!(reloaded.history, history);
}

#[test]
fn files_removed_in_the_container_leave_the_branch() {
    let repo = TestRepo::new().expect("repo");
    let store = open(&repo);
    let engine = FakeEngine::new().expect("engine");
    let env = store.create(&engine, "web", "start").expect("create");

    store
        .update(&engine, &env.id, "Remove readme", "cleanup", |env, engine| {
            env.run(engine, &RunRequest::shell("rm README.md"), "cleanup")?;
            Ok(())
        })
        .expect("update");

    let files = repo
        .git(&["ls-tree", "-r", "--name-only", &format!("container-use/{}", env.id)])
        .expect("ls-tree");
    assert_eq!(files, ".container-use/AGENT.md\n.container-use/environment.json");
    assert!(!env.worktree.join("README.md").exists());
}

#[test]
fn saving_unchanged_content_makes_no_commit() {
    let repo = TestRepo::new().expect("repo");
    let store = open(&repo);
    let engine = FakeEngine::new().expect("engine");
    let env = store.create(&engine, "web", "start").expect("create");
    let tracking = format!("container-use/{}", env.id);
    let before = repo.git(&["rev-parse", &tracking]).expect("before");

    store
        .update(&engine, &env.id, "Nothing", "retry", |_, _| Ok(()))
        .expect("update");

    assert_eq!(repo.git(&["rev-parse", &tracking]).expect("after"), before);
    assert_eq!(store.list().expect("list"), vec![env.id.clone()]);
}

#[test]
fn config_changes_persist_across_loads() {
    let repo = TestRepo::new().expect("repo");
    let store = open(&repo);
    let engine = FakeEngine::new().expect("engine");
    let env = store.create(&engine, "web", "start").expect("create");

    store
        .update(&engine, &env.id, "Use go", "need go", |env, engine| {
            let config = EnvironmentConfig {
                base_image: "golang:1.23".to_string(),
                instructions: "run go test ./...".to_string(),
                ..env.config().clone()
            };
            env.update_config(engine, config, "need go")
        })
        .expect("update");

    let loaded = store.get(&env.id).expect("get");
    assert_eq!(loaded.config().base_image, "golang:1.23");
    assert_eq!(loaded.config().instructions, "run go test ./...");
    assert_eq!(engine.starts().len(), 3);
}

#[test]
fn conflicting_replay_fails_with_patch_apply() {
    let repo = TestRepo::new().expect("repo");
    let store = open(&repo);
    let engine = FakeEngine::new().expect("engine");
    let env = store.create(&engine, "web", "start").expect("create");
    store
        .update(&engine, &env.id, "Rewrite readme", "rewrite", |env, engine| {
            env.run(engine, &RunRequest::shell("echo changed > README.md"), "rewrite")?;
            Ok(())
        })
        .expect("update");

    // Worktree gone, branch kept: the next load re-adds it and replays the
    // source's dirty edits on top of the environment's README.
    fs::remove_dir_all(&env.worktree).expect("remove worktree");
    repo.write("README.md", "# demo\n\nlocal edit\n").expect("write");

    let err = store.get(&env.id).unwrap_err();
    assert!(
        matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::PatchApply { .. })
        ),
        "{err:#}"
    );
}

#[test]
fn log_notes_accumulate_and_reach_source() {
    let repo = TestRepo::new().expect("repo");
    let store = open(&repo);
    let engine = FakeEngine::new().expect("engine");
    let env = store.create(&engine, "web", "start").expect("create");

    store.append_log(&env.id, "first entry").expect("note");
    store.append_log(&env.id, "second entry").expect("note");

    let notes = repo
        .git(&[
            "notes",
            "--ref",
            "container-use",
            "show",
            &format!("container-use/{}", env.id),
        ])
        .expect("log note");
    assert!(notes.contains("first entry"), "{notes}");
    assert!(notes.contains("second entry"), "{notes}");
}

#[test]
fn unknown_id_is_not_found() {
    let repo = TestRepo::new().expect("repo");
    let store = open(&repo);

    for err in [
        store.get("web/no-such-env").unwrap_err(),
        store.append_log("web/no-such-env", "x").unwrap_err(),
        store.apply_patch("web/no-such-env", b"x").unwrap_err(),
    ] {
        assert!(
            matches!(
                err.downcast_ref::<StoreError>(),
                Some(StoreError::EnvironmentNotFound(_))
            ),
            "{err:#}"
        );
    }
}

#[test]
fn delete_is_idempotent() {
    let repo = TestRepo::new().expect("repo");
    let store = open(&repo);
    let engine = FakeEngine::new().expect("engine");
    let env = store.create(&engine, "web", "start").expect("create");

    store.delete(&env.id).expect("delete");
    store.delete(&env.id).expect("delete again");

    assert!(!env.worktree.exists());
    assert!(store.list().expect("list").is_empty());
    assert!(
        git_in(
            &store.binding().mirror_path,
            &["rev-parse", "--verify", &format!("refs/heads/{}", env.id)]
        )
        .is_err()
    );
}

#[test]
fn expired_deadline_stops_before_spawning_git() {
    let repo = TestRepo::new().expect("repo");
    let store = open(&repo).with_deadline(Deadline::after(Duration::ZERO));

    let err = store.list().unwrap_err();
    assert!(
        matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::DeadlineExceeded { .. })
        ),
        "{err:#}"
    );
}
