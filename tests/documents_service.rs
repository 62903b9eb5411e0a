use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::sync::Mutex;
use uuid::Uuid;

use docvault::application::documents::{
    DocumentError, DocumentService, FilePart, ListDocumentsRequest, UploadMeta, UploadPayload,
};
use docvault::application::repos::{
    BlobError, DocumentListQuery, DocumentsRepo, RepoError,
};
use docvault::cache::{CacheConfig, DocumentCache, ManualClock, TtlDocumentCache, document_key};
use docvault::domain::documents::{DocumentContent, DocumentRecord, GrantList};
use docvault::domain::error::DomainError;
use docvault::domain::users::Caller;
use docvault::infra::memory::{InMemoryBlobStore, InMemoryRepositories};

/// Record store double that counts lookups and can be told to reject inserts.
#[derive(Default)]
struct CountingRepo {
    inner: InMemoryRepositories,
    single_lookups: AtomicUsize,
    batch_calls: Mutex<Vec<Vec<Uuid>>>,
    fail_inserts: AtomicBool,
}

#[async_trait]
impl DocumentsRepo for CountingRepo {
    async fn insert_document(&self, record: &DocumentRecord) -> Result<(), RepoError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("insert rejected"));
        }
        self.inner.insert_document(record).await
    }

    async fn find_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, RepoError> {
        self.single_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_document(id).await
    }

    async fn find_documents(&self, ids: &[Uuid]) -> Result<Vec<DocumentRecord>, RepoError> {
        self.batch_calls.lock().await.push(ids.to_vec());
        // Reverse so callers cannot rely on batch order.
        let mut found = self.inner.find_documents(ids).await?;
        found.reverse();
        Ok(found)
    }

    async fn list_document_ids(&self, query: &DocumentListQuery) -> Result<Vec<Uuid>, RepoError> {
        self.inner.list_document_ids(query).await
    }

    async fn delete_document(&self, id: Uuid) -> Result<(), RepoError> {
        self.inner.delete_document(id).await
    }
}

struct Fixture {
    service: DocumentService,
    repo: Arc<CountingRepo>,
    blobs: Arc<InMemoryBlobStore>,
    cache: Arc<TtlDocumentCache>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new() -> Self {
        let repo = Arc::new(CountingRepo::default());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(TtlDocumentCache::with_clock(
            &CacheConfig {
                ttl: Duration::from_secs(300),
                max_entries: 1_000,
            },
            clock.clone(),
        ));
        let service = DocumentService::new(repo.clone(), blobs.clone(), cache.clone());
        Self {
            service,
            repo,
            blobs,
            cache,
            clock,
        }
    }

    async fn seed(&self, record: &DocumentRecord) {
        self.repo
            .inner
            .insert_document(record)
            .await
            .expect("seed record");
    }
}

fn caller(login: &str) -> Caller {
    Caller {
        user_id: Uuid::new_v4(),
        login: login.to_string(),
    }
}

fn json_meta(name: &str, grant: &[&str]) -> UploadMeta {
    UploadMeta {
        name: name.to_string(),
        file: false,
        public: false,
        mime: String::new(),
        grant: grant.iter().map(|g| g.to_string()).collect(),
    }
}

fn file_meta(name: &str, mime: &str) -> UploadMeta {
    UploadMeta {
        name: name.to_string(),
        file: true,
        public: true,
        mime: mime.to_string(),
        grant: Vec::new(),
    }
}

fn json_payload(raw: &'static str) -> UploadPayload {
    UploadPayload {
        file: None,
        json: Some(Bytes::from_static(raw.as_bytes())),
    }
}

fn file_payload(filename: &str, bytes: &'static [u8]) -> UploadPayload {
    UploadPayload {
        file: Some(FilePart {
            filename: filename.to_string(),
            bytes: Bytes::from_static(bytes),
        }),
        json: None,
    }
}

fn seeded_record(name: &str, created_at: OffsetDateTime, grant: &[&str]) -> DocumentRecord {
    DocumentRecord {
        id: Uuid::new_v4(),
        name: name.to_string(),
        mime_type: "application/json".to_string(),
        is_public: false,
        content: DocumentContent::Json {
            data: Some(format!("{{\"name\":\"{name}\"}}")),
        },
        created_at,
        granted_to: GrantList::new(grant.iter().copied()),
    }
}

fn list_request(limit: Option<&str>) -> ListDocumentsRequest {
    ListDocumentsRequest {
        limit: limit.map(str::to_string),
        ..Default::default()
    }
}

#[tokio::test]
async fn upload_writes_through_to_the_cache() {
    let fx = Fixture::new();
    let alice = caller("alice2024");

    let record = fx
        .service
        .upload(&alice, json_meta("config", &[]), json_payload(r#"{"a":1}"#))
        .await
        .expect("upload");

    assert_eq!(
        fx.cache.get(&document_key(record.id)),
        Some(record.clone())
    );

    let fetched = fx
        .service
        .get(&alice, &record.id.to_string())
        .await
        .expect("get");
    assert_eq!(fetched.record, record);
    assert!(fetched.content.is_none());
    assert_eq!(fx.repo.single_lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upload_timestamps_match_record_store_precision() {
    let fx = Fixture::new();
    let alice = caller("alice2024");

    for i in 0..20 {
        let record = fx
            .service
            .upload(&alice, json_meta(&format!("doc-{i}"), &[]), json_payload("{}"))
            .await
            .expect("upload");
        assert_eq!(record.created_at.nanosecond() % 1_000, 0, "{}", record.created_at);
        assert_eq!(
            fx.cache.get(&document_key(record.id)).map(|cached| cached.created_at),
            Some(record.created_at)
        );
    }
}

#[tokio::test]
async fn uploader_is_always_granted_exactly_once() {
    let fx = Fixture::new();
    let alice = caller("alice2024");

    let appended = fx
        .service
        .upload(&alice, json_meta("a", &["bobby2024"]), json_payload("{}"))
        .await
        .expect("upload");
    assert_eq!(appended.granted_to.as_slice(), ["bobby2024", "alice2024"]);

    let present = fx
        .service
        .upload(
            &alice,
            json_meta("b", &["alice2024", "bobby2024"]),
            json_payload("{}"),
        )
        .await
        .expect("upload");
    assert_eq!(present.granted_to.as_slice(), ["alice2024", "bobby2024"]);
}

#[tokio::test]
async fn mixed_or_missing_mode_parts_are_rejected_before_any_write() {
    let fx = Fixture::new();
    let alice = caller("alice2024");

    let cases = [
        (file_meta("f", "text/plain"), UploadPayload::default()),
        (
            file_meta("f", "text/plain"),
            UploadPayload {
                file: Some(FilePart {
                    filename: "f.txt".into(),
                    bytes: Bytes::from_static(b"x"),
                }),
                json: Some(Bytes::from_static(b"{}")),
            },
        ),
        (json_meta("j", &[]), file_payload("f.txt", b"x")),
    ];

    for (meta, payload) in cases {
        let err = fx
            .service
            .upload(&alice, meta, payload)
            .await
            .expect_err("mode violation");
        assert!(matches!(err, DocumentError::Domain(DomainError::Mode { .. })));
    }

    assert!(fx.blobs.is_empty().await);
    assert_eq!(fx.repo.inner.document_count().await, 0);
    assert!(fx.cache.is_empty());
}

#[tokio::test]
async fn invalid_json_fails_without_persisting() {
    let fx = Fixture::new();
    let err = fx
        .service
        .upload(&caller("alice2024"), json_meta("bad", &[]), json_payload("{not json"))
        .await
        .expect_err("invalid json");

    assert!(matches!(err, DocumentError::Domain(DomainError::Validation { .. })));
    assert_eq!(fx.repo.inner.document_count().await, 0);
}

#[tokio::test]
async fn absent_json_payload_is_legal() {
    let fx = Fixture::new();
    let record = fx
        .service
        .upload(&caller("alice2024"), json_meta("empty", &[]), UploadPayload::default())
        .await
        .expect("upload");

    assert_eq!(record.json_data(), None);
    assert!(!record.is_file());
}

#[tokio::test]
async fn file_upload_stores_blob_and_serves_bytes() {
    let fx = Fixture::new();
    let alice = caller("alice2024");

    let record = fx
        .service
        .upload(&alice, file_meta("Photo", ""), file_payload("photo.png", b"\x89PNG"))
        .await
        .expect("upload");

    let path = record.blob_path().expect("file document").to_string();
    assert_eq!(path, format!("{}_photo.png", record.id));
    assert!(fx.blobs.contains(&path).await);
    assert_eq!(record.mime_type, "image/png");

    fx.cache.clear();
    let fetched = fx
        .service
        .get(&alice, &record.id.to_string())
        .await
        .expect("get");
    assert_eq!(fetched.content, Some(Bytes::from_static(b"\x89PNG")));
    assert_eq!(fetched.mime_type(), Some("image/png"));
    assert!(fx.cache.contains(&document_key(record.id)));
}

#[tokio::test]
async fn listing_orders_by_name_then_newest_first() {
    let fx = Fixture::new();
    let b1 = seeded_record("b", datetime!(2024-01-01 0:00 UTC), &["alice2024"]);
    let a2 = seeded_record("a", datetime!(2024-01-02 0:00 UTC), &["alice2024"]);
    let a3 = seeded_record("a", datetime!(2024-01-03 0:00 UTC), &["alice2024"]);
    for record in [&b1, &a2, &a3] {
        fx.seed(record).await;
    }

    let items = fx
        .service
        .list(&caller("alice2024"), &list_request(None))
        .await
        .expect("list");

    let ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![a3.id, a2.id, b1.id]);
}

#[tokio::test]
async fn listing_defaults_to_twenty_items() {
    let fx = Fixture::new();
    for i in 0..25 {
        fx.seed(&seeded_record(
            &format!("doc-{i:02}"),
            OffsetDateTime::now_utc(),
            &["alice2024"],
        ))
        .await;
    }
    let alice = caller("alice2024");

    for limit in [None, Some(""), Some("zero"), Some("0"), Some("-3")] {
        let items = fx
            .service
            .list(&alice, &list_request(limit))
            .await
            .expect("list");
        assert_eq!(items.len(), 20, "limit {limit:?}");
    }

    let items = fx
        .service
        .list(&alice, &list_request(Some("5")))
        .await
        .expect("list");
    assert_eq!(items.len(), 5);
}

#[tokio::test]
async fn partial_cache_hits_issue_one_batch_and_keep_order() {
    let fx = Fixture::new();
    let records: Vec<DocumentRecord> = (0..5)
        .map(|i| seeded_record(&format!("n{i}"), OffsetDateTime::now_utc(), &["alice2024"]))
        .collect();
    for record in &records {
        fx.seed(record).await;
    }
    fx.cache.set(document_key(records[1].id), records[1].clone());
    fx.cache.set(document_key(records[3].id), records[3].clone());

    let items = fx
        .service
        .list(&caller("alice2024"), &list_request(None))
        .await
        .expect("list");

    let ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
    let expected: Vec<Uuid> = records.iter().map(|record| record.id).collect();
    assert_eq!(ids, expected);

    let batches = fx.repo.batch_calls.lock().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], vec![records[0].id, records[2].id, records[4].id]);
    drop(batches);

    for record in &records {
        assert!(fx.cache.contains(&document_key(record.id)));
    }
}

#[tokio::test]
async fn fully_cached_listing_skips_the_batch_fetch() {
    let fx = Fixture::new();
    let alice = caller("alice2024");
    fx.service
        .upload(&alice, json_meta("only", &[]), json_payload("{}"))
        .await
        .expect("upload");

    let items = fx
        .service
        .list(&alice, &list_request(None))
        .await
        .expect("list");
    assert_eq!(items.len(), 1);
    assert!(fx.repo.batch_calls.lock().await.is_empty());
}

#[tokio::test]
async fn listing_filters_by_name_and_mime() {
    let fx = Fixture::new();
    let alice = caller("alice2024");
    fx.service
        .upload(&alice, json_meta("report", &[]), json_payload("{}"))
        .await
        .expect("upload");
    fx.service
        .upload(&alice, file_meta("image", "image/png"), file_payload("i.png", b"x"))
        .await
        .expect("upload");

    let by_name = fx
        .service
        .list(
            &alice,
            &ListDocumentsRequest {
                key: Some("name".into()),
                value: Some("report".into()),
                ..Default::default()
            },
        )
        .await
        .expect("list");
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].name, "report");

    let by_mime = fx
        .service
        .list(
            &alice,
            &ListDocumentsRequest {
                key: Some("mime".into()),
                value: Some("image/png".into()),
                ..Default::default()
            },
        )
        .await
        .expect("list");
    assert_eq!(by_mime.len(), 1);
    assert!(by_mime[0].is_file);

    let blank_value = fx
        .service
        .list(
            &alice,
            &ListDocumentsRequest {
                key: Some("name".into()),
                value: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .expect("list");
    assert_eq!(blank_value.len(), 2);
}

#[tokio::test]
async fn unsupported_filter_key_is_rejected() {
    let fx = Fixture::new();
    let err = fx
        .service
        .list(
            &caller("alice2024"),
            &ListDocumentsRequest {
                key: Some("owner".into()),
                value: Some("x".into()),
                ..Default::default()
            },
        )
        .await
        .expect_err("unsupported key");
    assert!(matches!(err, DocumentError::UnsupportedFilter(_)));
}

#[tokio::test]
async fn any_caller_may_list_another_login_scope() {
    let fx = Fixture::new();
    fx.service
        .upload(&caller("alice2024"), json_meta("private", &[]), json_payload("{}"))
        .await
        .expect("upload");

    let bob = caller("bobby2024");
    let own = fx
        .service
        .list(&bob, &list_request(None))
        .await
        .expect("list");
    assert!(own.is_empty());

    let overridden = fx
        .service
        .list(
            &bob,
            &ListDocumentsRequest {
                login: Some("alice2024".into()),
                ..Default::default()
            },
        )
        .await
        .expect("list");
    assert_eq!(overridden.len(), 1);
    assert_eq!(overridden[0].name, "private");
}

#[tokio::test]
async fn get_and_delete_require_a_grant() {
    let fx = Fixture::new();
    let record = fx
        .service
        .upload(&caller("alice2024"), json_meta("secret", &[]), json_payload("{}"))
        .await
        .expect("upload");
    let id = record.id.to_string();
    let bob = caller("bobby2024");

    assert!(matches!(
        fx.service.get(&bob, &id).await,
        Err(DocumentError::Forbidden { .. })
    ));
    fx.cache.clear();
    assert!(matches!(
        fx.service.get(&bob, &id).await,
        Err(DocumentError::Forbidden { .. })
    ));
    assert!(matches!(
        fx.service.delete(&bob, &id).await,
        Err(DocumentError::Forbidden { .. })
    ));
    assert_eq!(fx.repo.inner.document_count().await, 1);
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let fx = Fixture::new();
    let alice = caller("alice2024");
    assert!(matches!(
        fx.service.get(&alice, "nope").await,
        Err(DocumentError::InvalidId(_))
    ));
    assert!(matches!(
        fx.service.delete(&alice, "nope").await,
        Err(DocumentError::InvalidId(_))
    ));
}

#[tokio::test]
async fn get_after_delete_is_not_found() {
    let fx = Fixture::new();
    let alice = caller("alice2024");
    let record = fx
        .service
        .upload(&alice, file_meta("f", "text/plain"), file_payload("f.txt", b"bytes"))
        .await
        .expect("upload");
    let id = record.id.to_string();
    let path = record.blob_path().expect("blob path").to_string();

    fx.service.delete(&alice, &id).await.expect("delete");

    assert!(!fx.blobs.contains(&path).await);
    assert!(!fx.cache.contains(&document_key(record.id)));
    assert!(matches!(
        fx.service.get(&alice, &id).await,
        Err(DocumentError::NotFound)
    ));
    assert!(matches!(
        fx.service.delete(&alice, &id).await,
        Err(DocumentError::NotFound)
    ));
}

#[tokio::test]
async fn delete_succeeds_when_blob_is_already_gone() {
    let fx = Fixture::new();
    let alice = caller("alice2024");
    let record = fx
        .service
        .upload(&alice, file_meta("f", "text/plain"), file_payload("f.txt", b"bytes"))
        .await
        .expect("upload");
    fx.blobs
        .remove(record.blob_path().expect("blob path"))
        .await;

    fx.service
        .delete(&alice, &record.id.to_string())
        .await
        .expect("delete");
    assert_eq!(fx.repo.inner.document_count().await, 0);
}

#[tokio::test]
async fn dangling_blob_evicts_and_fails_cleanly_twice() {
    let fx = Fixture::new();
    let alice = caller("alice2024");
    let record = fx
        .service
        .upload(&alice, file_meta("f", "text/plain"), file_payload("f.txt", b"bytes"))
        .await
        .expect("upload");
    let key = document_key(record.id);
    let id = record.id.to_string();
    assert!(fx.blobs.remove(record.blob_path().expect("blob path")).await);
    assert!(fx.cache.contains(&key));

    let first = fx.service.get(&alice, &id).await;
    assert!(matches!(
        first,
        Err(DocumentError::Blob(BlobError::NotFound(_)))
    ));
    assert!(!fx.cache.contains(&key), "failed blob read must evict");
    assert_eq!(fx.repo.single_lookups.load(Ordering::SeqCst), 0);

    let second = fx.service.get(&alice, &id).await;
    assert!(matches!(
        second,
        Err(DocumentError::Blob(BlobError::NotFound(_)))
    ));
    assert_eq!(fx.repo.single_lookups.load(Ordering::SeqCst), 1);
    assert!(!fx.cache.contains(&key));
}

#[tokio::test]
async fn failed_record_insert_leaves_an_orphaned_blob() {
    let fx = Fixture::new();
    fx.repo.fail_inserts.store(true, Ordering::SeqCst);

    let err = fx
        .service
        .upload(
            &caller("alice2024"),
            file_meta("f", "text/plain"),
            file_payload("f.txt", b"bytes"),
        )
        .await
        .expect_err("insert fails");

    assert!(matches!(err, DocumentError::Repo(_)));
    assert_eq!(fx.blobs.len().await, 1);
    assert!(fx.cache.is_empty());
}

#[tokio::test]
async fn expired_cache_entries_fall_back_to_the_record_store() {
    let fx = Fixture::new();
    let alice = caller("alice2024");
    let record = fx
        .service
        .upload(&alice, json_meta("ttl", &[]), json_payload("[1,2]"))
        .await
        .expect("upload");
    let id = record.id.to_string();

    fx.clock.advance(Duration::from_secs(299));
    fx.service.get(&alice, &id).await.expect("cached get");
    assert_eq!(fx.repo.single_lookups.load(Ordering::SeqCst), 0);

    fx.clock.advance(Duration::from_secs(1));
    let fetched = fx.service.get(&alice, &id).await.expect("store get");
    assert_eq!(fetched.record.json_data(), Some("[1,2]"));
    assert_eq!(fx.repo.single_lookups.load(Ordering::SeqCst), 1);

    fx.service.get(&alice, &id).await.expect("repopulated get");
    assert_eq!(fx.repo.single_lookups.load(Ordering::SeqCst), 1);
}
