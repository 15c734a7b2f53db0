//! Applying caller-supplied patches inside an environment.

use std::fs;

use envstore::io::engine::RunRequest;
use envstore::test_support::{FakeEngine, TestRepo, git_in};
use envstore::{Repository, StoreError};

const STALE_PATCH: &str = "\
diff --git a/README.md b/README.md
--- a/README.md
+++ b/README.md
@@ -1 +1 @@
-# a heading that was never there
+# replaced
";

fn setup() -> (TestRepo, Repository, String) {
    let repo = TestRepo::new().expect("repo");
    let store = Repository::open(&repo.config(), &repo.path()).expect("open");
    let engine = FakeEngine::new().expect("engine");
    let id = store.create(&engine, "web", "start").expect("create").id;
    (repo, store, id)
}

fn assert_patch_apply(err: anyhow::Error) {
    assert!(
        matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::PatchApply { .. })
        ),
        "{err:#}"
    );
}

#[test]
fn patch_is_applied_and_committed() {
    let (repo, store, id) = setup();
    repo.write("README.md", "# demo\n\npatched\n").expect("write");
    let patch = repo.git(&["diff"]).expect("diff") + "\n";
    repo.git(&["checkout", "--", "README.md"]).expect("revert");

    assert!(store.apply_patch(&id, patch.as_bytes()).expect("patch"));

    let worktree = store.binding().worktree_path(&id);
    assert_eq!(
        fs::read_to_string(worktree.join("README.md")).expect("read"),
        "# demo\n\npatched\n"
    );
    assert_eq!(
        git_in(&worktree, &["log", "-1", "--format=%s"]).expect("log"),
        "Apply patch"
    );
}

#[test]
fn patched_environment_keeps_history_and_stays_listed() {
    let repo = TestRepo::new().expect("repo");
    let store = Repository::open(&repo.config(), &repo.path()).expect("open");
    let engine = FakeEngine::new().expect("engine");
    let id = store.create(&engine, "web", "start").expect("create").id;
    store
        .update(&engine, &id, "List files", "look around", |env, engine| {
            env.run(engine, &RunRequest::shell("ls"), "look around")?;
            Ok(())
        })
        .expect("update");

    repo.write("README.md", "# demo\n\npatched\n").expect("write");
    let patch = repo.git(&["diff"]).expect("diff") + "\n";
    repo.git(&["checkout", "--", "README.md"]).expect("revert");
    assert!(store.apply_patch(&id, patch.as_bytes()).expect("patch"));

    assert_eq!(store.list().expect("list"), vec![id.clone()]);
    let env = store.get(&id).expect("get");
    assert_eq!(env.history.len(), 1);
    assert_eq!(env.history.latest().map(|r| r.name.as_str()), Some("Run ls"));

    // The source sees the patch commit and its state note.
    let tracking = format!("container-use/{id}");
    assert_eq!(
        repo.git(&["rev-parse", &tracking]).expect("tracking"),
        git_in(&env.worktree, &["rev-parse", "HEAD"]).expect("head")
    );
    assert_eq!(store.history_at(&tracking).expect("history").len(), 1);
}

#[test]
fn blank_patch_is_a_no_op() {
    let (_repo, store, id) = setup();
    assert!(!store.apply_patch(&id, b"\n  \n").expect("patch"));
}

#[test]
fn garbage_patch_fails_with_patch_apply() {
    let (_repo, store, id) = setup();
    assert_patch_apply(store.apply_patch(&id, b"this is not a diff\n").unwrap_err());
}

#[test]
fn patch_against_other_content_fails_and_leaves_worktree_clean() {
    let (_repo, store, id) = setup();
    assert_patch_apply(store.apply_patch(&id, STALE_PATCH.as_bytes()).unwrap_err());

    let worktree = store.binding().worktree_path(&id);
    assert_eq!(
        git_in(&worktree, &["status", "--porcelain"]).expect("status"),
        ""
    );
}
