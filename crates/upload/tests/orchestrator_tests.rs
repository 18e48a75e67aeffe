//! End-to-end orchestrator tests over the filesystem backend and a SQLite
//! metadata store.

use bytes::Bytes;
use depot_core::SessionState;
use depot_core::session::ManifestEntry;
use depot_metadata::{MetadataStore, SqliteStore};
use depot_storage::{Download, FilesystemBackend, MultipartStore};
use depot_upload::{PartAck, RetrievalGateway, UploadError, UploadLimits, Uploader};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60);

async fn build() -> (tempfile::TempDir, Uploader, RetrievalGateway) {
    let temp = tempfile::tempdir().unwrap();
    let store: Arc<dyn MultipartStore> = Arc::new(
        FilesystemBackend::new(temp.path().join("storage"))
            .await
            .unwrap(),
    );
    let metadata: Arc<dyn MetadataStore> = Arc::new(
        SqliteStore::new(temp.path().join("metadata.db"))
            .await
            .unwrap(),
    );

    let limits = UploadLimits {
        max_file_size: 1024 * 1024,
        chunk_size_hint: 64,
        part_url_ttl: TTL,
    };
    let uploader = Uploader::new(store.clone(), metadata.clone(), limits);
    let gateway = RetrievalGateway::new(metadata, store);
    (temp, uploader, gateway)
}

fn manifest(parts: &[u32]) -> Vec<ManifestEntry> {
    parts
        .iter()
        .map(|&part_number| ManifestEntry {
            part_number,
            etag: None,
        })
        .collect()
}

async fn put_part(uploader: &Uploader, session: depot_core::SessionId, n: u32, data: &[u8]) {
    match uploader
        .accept_part(session, n, Some(Bytes::copy_from_slice(data)))
        .await
        .unwrap()
    {
        PartAck::Stored { part_number, size } => {
            assert_eq!(part_number, n);
            assert_eq!(size, data.len() as u64);
        }
        PartAck::Authorized { .. } => panic!("filesystem backend should store directly"),
    }
}

async fn fetch(gateway: &RetrievalGateway, file_id: depot_core::FileId) -> Vec<u8> {
    let resolution = gateway.resolve_download(file_id, TTL).await.unwrap();
    match resolution.download {
        Download::Stream { mut stream, size } => {
            let mut out = Vec::new();
            while let Some(chunk) = stream.next().await {
                out.extend_from_slice(&chunk.unwrap());
            }
            assert_eq!(out.len() as u64, size);
            assert_eq!(resolution.file_size, size);
            out
        }
        Download::Url(_) => panic!("filesystem backend should stream"),
    }
}

#[tokio::test]
async fn parts_assemble_in_ascending_order_regardless_of_arrival_and_manifest_order() {
    let (_temp, uploader, gateway) = build().await;
    let begun = uploader.begin_session("hello.txt", 5).await.unwrap();

    // Arrival order 2 then 1; manifest order also descending
    put_part(&uploader, begun.session_id, 2, b"lo").await;
    put_part(&uploader, begun.session_id, 1, b"hel").await;

    let row = uploader
        .complete_session(begun.session_id, &manifest(&[2, 1]))
        .await
        .unwrap();
    assert_eq!(row.file_size, 5);
    assert_eq!(row.file_name, "hello.txt");

    assert_eq!(fetch(&gateway, begun.file_id).await, b"hello");
}

#[tokio::test]
async fn duplicate_manifest_entries_are_deduplicated() {
    let (_temp, uploader, gateway) = build().await;
    let begun = uploader.begin_session("dup.bin", 4).await.unwrap();

    put_part(&uploader, begun.session_id, 1, b"ab").await;
    put_part(&uploader, begun.session_id, 2, b"cd").await;

    let row = uploader
        .complete_session(begun.session_id, &manifest(&[1, 2, 1, 2, 2]))
        .await
        .unwrap();
    assert_eq!(row.file_size, 4);
    assert_eq!(fetch(&gateway, begun.file_id).await, b"abcd");
}

#[tokio::test]
async fn resent_part_replaces_previous_bytes() {
    let (_temp, uploader, gateway) = build().await;
    let begun = uploader.begin_session("replace.bin", 3).await.unwrap();

    put_part(&uploader, begun.session_id, 1, b"old").await;
    put_part(&uploader, begun.session_id, 1, b"new").await;

    uploader
        .complete_session(begun.session_id, &manifest(&[1]))
        .await
        .unwrap();
    assert_eq!(fetch(&gateway, begun.file_id).await, b"new");
}

#[tokio::test]
async fn manifest_may_name_a_subset_of_staged_parts() {
    let (_temp, uploader, gateway) = build().await;
    let begun = uploader.begin_session("subset.bin", 6).await.unwrap();

    put_part(&uploader, begun.session_id, 1, b"aa").await;
    put_part(&uploader, begun.session_id, 2, b"bb").await;
    put_part(&uploader, begun.session_id, 3, b"cc").await;

    uploader
        .complete_session(begun.session_id, &manifest(&[3, 1]))
        .await
        .unwrap();
    assert_eq!(fetch(&gateway, begun.file_id).await, b"aacc");
}

#[tokio::test]
async fn begin_session_validates_inputs_and_registers_nothing() {
    let (_temp, uploader, _gateway) = build().await;

    for (name, size) in [("", 10u64), ("  ", 10), ("ok.bin", 0), ("big.bin", 2 * 1024 * 1024)] {
        let result = uploader.begin_session(name, size).await;
        match result {
            Err(UploadError::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    assert_eq!(uploader.live_sessions().await, 0);
}

#[tokio::test]
async fn part_number_zero_is_rejected() {
    let (_temp, uploader, _gateway) = build().await;
    let begun = uploader.begin_session("zero.bin", 1).await.unwrap();

    let result = uploader
        .accept_part(begun.session_id, 0, Some(Bytes::from_static(b"x")))
        .await;
    assert!(matches!(result, Err(UploadError::Validation(_))));
}

#[tokio::test]
async fn unknown_session_reports_not_found() {
    let (_temp, uploader, _gateway) = build().await;
    let ghost = depot_core::SessionId::new();

    let err = uploader
        .accept_part(ghost, 1, Some(Bytes::from_static(b"x")))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::SessionNotFound(_)));
    assert_eq!(err.code(), "not_found");

    let err = uploader.complete_session(ghost, &manifest(&[1])).await.unwrap_err();
    assert_eq!(err.code(), "not_found");

    let err = uploader.abort_session(ghost).await.unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn empty_manifest_is_incomplete() {
    let (_temp, uploader, _gateway) = build().await;
    let begun = uploader.begin_session("empty.bin", 1).await.unwrap();

    let err = uploader
        .complete_session(begun.session_id, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::IncompleteUpload { part: None }));
    assert_eq!(err.code(), "incomplete_upload");
}

#[tokio::test]
async fn missing_part_fails_then_retry_succeeds() {
    let (_temp, uploader, gateway) = build().await;
    let begun = uploader.begin_session("retry.bin", 4).await.unwrap();

    put_part(&uploader, begun.session_id, 1, b"ab").await;

    let err = uploader
        .complete_session(begun.session_id, &manifest(&[1, 2]))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::IncompleteUpload { part: Some(2) }));

    // The failed completion left the session resumable
    put_part(&uploader, begun.session_id, 2, b"cd").await;
    uploader
        .complete_session(begun.session_id, &manifest(&[1, 2]))
        .await
        .unwrap();
    assert_eq!(fetch(&gateway, begun.file_id).await, b"abcd");
}

#[tokio::test]
async fn completed_session_is_evicted() {
    let (_temp, uploader, _gateway) = build().await;
    let begun = uploader.begin_session("done.bin", 1).await.unwrap();

    put_part(&uploader, begun.session_id, 1, b"x").await;
    uploader
        .complete_session(begun.session_id, &manifest(&[1]))
        .await
        .unwrap();

    assert_eq!(uploader.live_sessions().await, 0);

    let err = uploader
        .accept_part(begun.session_id, 2, Some(Bytes::from_static(b"y")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");

    let err = uploader
        .complete_session(begun.session_id, &manifest(&[1]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn abort_discards_session_and_second_abort_is_not_found() {
    let (_temp, uploader, _gateway) = build().await;
    let begun = uploader.begin_session("gone.bin", 2).await.unwrap();

    put_part(&uploader, begun.session_id, 1, b"xy").await;
    uploader.abort_session(begun.session_id).await.unwrap();

    let err = uploader
        .accept_part(begun.session_id, 2, Some(Bytes::from_static(b"z")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");

    let err = uploader.abort_session(begun.session_id).await.unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn repeated_downloads_return_identical_bytes() {
    let (_temp, uploader, gateway) = build().await;
    let begun = uploader.begin_session("stable.bin", 6).await.unwrap();

    put_part(&uploader, begun.session_id, 1, b"stable").await;
    uploader
        .complete_session(begun.session_id, &manifest(&[1]))
        .await
        .unwrap();

    let first = fetch(&gateway, begun.file_id).await;
    let second = fetch(&gateway, begun.file_id).await;
    assert_eq!(first, second);
    assert_eq!(first, b"stable");
}

#[tokio::test]
async fn unknown_file_download_is_not_found() {
    let (_temp, _uploader, gateway) = build().await;

    let err = gateway
        .resolve_download(depot_core::FileId::new(), TTL)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::FileNotFound(_)));
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn session_state_reports_progress() {
    let (_temp, uploader, _gateway) = build().await;
    let begun = uploader.begin_session("view.bin", 4).await.unwrap();

    let view = uploader.session_state(begun.session_id).await.unwrap();
    assert_eq!(view.state, SessionState::Created);
    assert!(view.received_parts.is_empty());
    assert_eq!(view.file_id, begun.file_id);

    put_part(&uploader, begun.session_id, 3, b"c").await;
    put_part(&uploader, begun.session_id, 1, b"a").await;

    let view = uploader.session_state(begun.session_id).await.unwrap();
    assert_eq!(view.state, SessionState::Receiving);
    assert_eq!(view.received_parts, vec![1, 3]);
}

#[tokio::test]
async fn drain_aborts_all_live_sessions() {
    let (_temp, uploader, _gateway) = build().await;

    let a = uploader.begin_session("a.bin", 1).await.unwrap();
    let b = uploader.begin_session("b.bin", 1).await.unwrap();
    put_part(&uploader, a.session_id, 1, b"x").await;

    uploader.drain().await;
    assert_eq!(uploader.live_sessions().await, 0);

    for session_id in [a.session_id, b.session_id] {
        let err = uploader.session_state(session_id).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}

#[tokio::test]
async fn concurrent_parts_for_one_session_all_land() {
    let (_temp, uploader, gateway) = build().await;
    let uploader = Arc::new(uploader);
    let begun = uploader.begin_session("par.bin", 8).await.unwrap();

    let mut handles = Vec::new();
    for part_number in 1u32..=8 {
        let uploader = uploader.clone();
        let session_id = begun.session_id;
        handles.push(tokio::spawn(async move {
            let byte = [b'a' + (part_number as u8) - 1];
            uploader
                .accept_part(session_id, part_number, Some(Bytes::copy_from_slice(&byte)))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    uploader
        .complete_session(begun.session_id, &manifest(&[1, 2, 3, 4, 5, 6, 7, 8]))
        .await
        .unwrap();
    assert_eq!(fetch(&gateway, begun.file_id).await, b"abcdefgh");
}
