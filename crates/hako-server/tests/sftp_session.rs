//! End-to-end SFTP sessions over an in-memory pipe.

use std::sync::Arc;

use hako_server::{SessionAdapter, SftpSession};
use hako_vfs::{MemoryStore, ObjectFs};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn connect() -> (Arc<MemoryStore>, russh_sftp::client::SftpSession) {
    let store = Arc::new(MemoryStore::new());
    let fs = ObjectFs::new(store.clone(), "amy:integration");
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);

    russh_sftp::server::run(server_io, SftpSession::new(SessionAdapter::new(fs))).await;
    let client = russh_sftp::client::SftpSession::new(client_io).await.unwrap();
    (store, client)
}

#[tokio::test]
async fn upload_list_download() {
    let (store, sftp) = connect().await;

    let mut file = sftp.create("/reports/2024/q1.csv").await.unwrap();
    file.write_all(b"region,total\nwest,10\n").await.unwrap();
    file.shutdown().await.unwrap();

    assert_eq!(
        store.contents("reports/2024/q1.csv").unwrap().as_ref(),
        b"region,total\nwest,10\n"
    );
    assert!(store.contents("reports/").is_some());
    assert!(store.contents("reports/2024/").is_some());

    let names: Vec<String> = sftp
        .read_dir("/reports")
        .await
        .unwrap()
        .map(|e| e.file_name())
        .collect();
    assert_eq!(names, vec!["2024".to_string()]);

    let meta = sftp.metadata("/reports/2024/q1.csv").await.unwrap();
    assert_eq!(meta.size, Some(21));
    assert!(sftp.metadata("/reports/2024").await.unwrap().is_dir());

    let mut contents = String::new();
    let mut file = sftp.open("/reports/2024/q1.csv").await.unwrap();
    file.read_to_string(&mut contents).await.unwrap();
    assert_eq!(contents, "region,total\nwest,10\n");
}

#[tokio::test]
async fn mkdir_rename_remove() {
    let (store, sftp) = connect().await;

    sftp.create_dir("/inbox").await.unwrap();
    let mut file = sftp.create("/inbox/note.txt").await.unwrap();
    file.write_all(b"hi").await.unwrap();
    file.shutdown().await.unwrap();

    sftp.rename("/inbox/note.txt", "/inbox/renamed.txt")
        .await
        .unwrap();
    assert!(store.contents("inbox/note.txt").is_none());
    assert_eq!(store.contents("inbox/renamed.txt").unwrap().as_ref(), b"hi");

    sftp.remove_file("/inbox/renamed.txt").await.unwrap();
    assert_eq!(store.keys(), vec!["inbox/".to_string()]);

    assert!(sftp.metadata("/inbox/renamed.txt").await.is_err());
    assert!(sftp.remove_dir("/inbox").await.is_err());
}

#[tokio::test]
async fn canonicalize_is_rooted() {
    let (_, sftp) = connect().await;
    assert_eq!(sftp.canonicalize(".").await.unwrap(), "/");
    assert_eq!(sftp.canonicalize("a/../b").await.unwrap(), "/b");
}
