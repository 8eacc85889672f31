//! Integration tests for the record store on the in-memory backend
//!
//! These tests validate:
//! - The class/table/record lifecycle end to end
//! - File and folder moves preserve content
//! - Partial failures of multi-step operations are reported
//! - Any operation sequence matches replaying it on a plain map

use std::collections::BTreeMap;
use std::sync::Arc;

use ghkv_core::{
    DEFAULT_BRANCH, MemoryRepository, Provision, RecordStore, RepoPath, StoreError,
};
use proptest::prelude::*;
use serde_json::{Value, json};

fn p(s: &str) -> RepoPath {
    RepoPath::new(s).unwrap()
}

fn memory_store() -> (RecordStore, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    (RecordStore::new(repo.clone(), DEFAULT_BRANCH), repo)
}

#[tokio::test]
async fn test_class_table_record_lifecycle() {
    let (store, _repo) = memory_store();

    assert_eq!(store.create_class("C").await.unwrap(), Provision::Created);
    assert_eq!(store.create_table("T", "C").await.unwrap(), Provision::Created);
    store.insert_data("T", "C", "k1", json!("v1")).await.unwrap();
    store.insert_data("T", "C", "k2", json!("v2")).await.unwrap();
    assert_eq!(
        Value::Object(store.get_data("T", "C").await.unwrap()),
        json!({"k1": "v1", "k2": "v2"})
    );

    store.remove_data("T", "C", "k1").await.unwrap();
    assert_eq!(
        Value::Object(store.get_data("T", "C").await.unwrap()),
        json!({"k2": "v2"})
    );

    store.remove_table("C", "T").await.unwrap();
    let err = store.get_data("T", "C").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    // The class survives its last table thanks to the marker
    assert_eq!(store.list_classes().await.unwrap(), vec!["C"]);
    store.remove_class("C").await.unwrap();
    assert!(store.list_classes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commit_messages_describe_changes() {
    let (store, repo) = memory_store();
    store.create_class("C").await.unwrap();
    store.create_table("T", "C").await.unwrap();
    store.insert_data("T", "C", "k", json!(1)).await.unwrap();

    let messages: Vec<String> = repo.commits().await.into_iter().map(|c| c.message).collect();
    assert_eq!(
        messages,
        vec![
            "Create folder 'C'",
            "Create table 'T' in class 'C'",
            "Insert record 'k' into C/T.json",
        ]
    );
}

#[tokio::test]
async fn test_move_file_preserves_content() {
    let (store, repo) = memory_store();
    store.create_table("f", "a").await.unwrap();
    store.insert_data("f", "a", "k", json!([1, 2, 3])).await.unwrap();
    let before = repo.blob("a/f.json", DEFAULT_BRANCH).await.unwrap();

    store.file(p("a/f.json")).move_to(&p("b/f.json")).await.unwrap();

    assert_eq!(repo.blob("b/f.json", DEFAULT_BRANCH).await.unwrap(), before);
    assert!(repo.blob("a/f.json", DEFAULT_BRANCH).await.is_none());
    assert_eq!(
        store.search_data("f", "b", "k").await.unwrap(),
        Some(json!([1, 2, 3]))
    );
}

#[tokio::test]
async fn test_move_folder_preserves_tree() {
    let (store, repo) = memory_store();
    store.file(p("a/x.json")).create(b"{\"x\": 1}\n").await.unwrap();
    store.file(p("a/sub/y.json")).create(b"{\"y\": 2}\n").await.unwrap();

    let report = store.folder(p("a")).move_to(&p("b")).await.unwrap();
    assert_eq!(report.files, vec![p("a/sub/y.json"), p("a/x.json")]);

    assert_eq!(
        repo.paths(DEFAULT_BRANCH).await,
        vec!["b/sub/y.json".to_string(), "b/x.json".to_string()]
    );
    assert_eq!(
        repo.blob("b/x.json", DEFAULT_BRANCH).await.unwrap(),
        b"{\"x\": 1}\n"
    );
    assert!(!store.folder(p("a")).exists().await.unwrap());
}

#[tokio::test]
async fn test_partial_class_removal() {
    let (store, repo) = memory_store();
    store.create_class("C").await.unwrap();
    store.create_table("A", "C").await.unwrap();
    store.create_table("B", "C").await.unwrap();
    repo.fail_writes_to("C/B.json").await.unwrap();

    let err = store.remove_class("C").await.unwrap_err();
    match &err {
        StoreError::Partial {
            operation,
            completed,
            ..
        } => {
            assert_eq!(operation, "delete 'C'");
            // .gitkeep and A.json went through
            assert_eq!(*completed, 2);
        }
        other => panic!("expected a partial failure, got {other}"),
    }
    assert_eq!(repo.paths(DEFAULT_BRANCH).await, vec!["C/B.json".to_string()]);

    // Retrying once the remote recovers finishes the job
    repo.heal("C/B.json").await.unwrap();
    store.remove_class("C").await.unwrap();
    assert!(repo.paths(DEFAULT_BRANCH).await.is_empty());
}

#[tokio::test]
async fn test_branches_are_isolated() {
    let repo = Arc::new(MemoryRepository::new().with_branch("dev").await);
    let main = RecordStore::new(repo.clone(), "main");
    let dev = RecordStore::new(repo.clone(), "dev");

    dev.create_table("T", "C").await.unwrap();
    assert!(main.get_data("T", "C").await.unwrap_err().is_not_found());
    assert!(dev.get_data("T", "C").await.unwrap().is_empty());

    let unknown = RecordStore::new(repo, "nope");
    assert!(unknown.create_table("T", "C").await.is_err());
}

#[derive(Debug, Clone)]
enum Op {
    Insert(String, i64),
    Update(String, i64),
    Remove(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let key = prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string);
    prop_oneof![
        (key.clone(), any::<i64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        (key.clone(), any::<i64>()).prop_map(|(k, v)| Op::Update(k, v)),
        key.prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_get_data_matches_replay(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (actual, expected) = rt.block_on(async {
            let store = RecordStore::in_memory();
            store.create_table("T", "C").await.unwrap();

            let mut model: BTreeMap<String, i64> = BTreeMap::new();
            for op in &ops {
                match op {
                    Op::Insert(k, v) => {
                        let res = store.insert_data("T", "C", k, json!(v)).await;
                        if model.contains_key(k) {
                            assert!(matches!(res, Err(StoreError::RecordExists { .. })));
                        } else {
                            res.unwrap();
                            model.insert(k.clone(), *v);
                        }
                    }
                    Op::Update(k, v) => {
                        let res = store.update_data("T", "C", k, json!(v)).await;
                        match model.get_mut(k) {
                            Some(slot) => {
                                res.unwrap();
                                *slot = *v;
                            }
                            None => assert!(matches!(res, Err(StoreError::RecordNotFound { .. }))),
                        }
                    }
                    Op::Remove(k) => {
                        let res = store.remove_data("T", "C", k).await;
                        match model.remove(k) {
                            Some(v) => assert_eq!(res.unwrap(), json!(v)),
                            None => assert!(matches!(res, Err(StoreError::RecordNotFound { .. }))),
                        }
                    }
                }
            }

            let actual: BTreeMap<String, Value> = store.get_data("T", "C").await.unwrap().into_iter().collect();
            let expected: BTreeMap<String, Value> = model.into_iter().map(|(k, v)| (k, json!(v))).collect();
            (actual, expected)
        });
        prop_assert_eq!(actual, expected);
    }
}
