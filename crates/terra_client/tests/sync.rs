use axum::{Json, Router, routing::get};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use terra_client::{TerraClient, TerraClientError};
use terra_fs::FileSystemInstances;
use terra_server::TerraServer;

fn write(root: &Path, path: &str, content: &[u8]) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn sync_downloads_repairs_and_reports() {
    let server_dir = tempdir().unwrap();
    write(server_dir.path(), "survival/a.txt", b"hi");
    write(server_dir.path(), "survival/config/y.json", b"{}");
    write(server_dir.path(), "survival/mods/x y.jar", b"jar bytes");
    write(server_dir.path(), "creative/options.txt", b"fov:70");

    let app = TerraServer::default().build(FileSystemInstances::new(server_dir.path()));
    let client = TerraClient::new(&spawn(app).await).unwrap();

    assert_eq!(
        client.list_instances().await.unwrap(),
        ["creative", "survival"]
    );

    let manifest = client.fetch_manifest("survival").await.unwrap();
    let paths: Vec<&str> = manifest.files.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["a.txt", "config/y.json", "mods/x y.jar"]);

    let local = tempdir().unwrap();
    let target = local.path().join("survival");

    let report = client.sync_instance("survival", &target).await.unwrap();
    assert_eq!(report.downloaded, ["a.txt", "config/y.json", "mods/x y.jar"]);
    assert_eq!(report.up_to_date, 0);
    assert_eq!(fs::read(target.join("mods/x y.jar")).unwrap(), b"jar bytes");

    // Corrupt one file and add one the server does not know about.
    write(&target, "a.txt", b"hj");
    write(&target, "screenshots/1.png", b"png");

    let report = client.sync_instance("survival", &target).await.unwrap();
    assert_eq!(report.downloaded, ["a.txt"]);
    assert_eq!(report.up_to_date, 2);
    assert_eq!(report.extra, ["screenshots/1.png"]);
    assert_eq!(fs::read(target.join("a.txt")).unwrap(), b"hi");
    assert!(target.join("screenshots/1.png").exists());

    let report = client.sync_instance("survival", &target).await.unwrap();
    assert!(report.downloaded.is_empty());
    assert_eq!(report.up_to_date, 3);
}

#[tokio::test]
async fn unknown_instance_is_a_server_error() {
    let server_dir = tempdir().unwrap();
    let app = TerraServer::default().build(FileSystemInstances::new(server_dir.path()));
    let client = TerraClient::new(&spawn(app).await).unwrap();

    let err = client.fetch_manifest("missing").await.unwrap_err();
    assert!(matches!(
        err,
        TerraClientError::ServerError(status, _) if status.as_u16() == 404
    ));
}

#[tokio::test]
async fn tampered_download_is_rejected() {
    let app = Router::new()
        .route(
            "/instances/{instance}/manifest",
            get(|| async {
                Json(serde_json::json!({
                    "instance": "survival",
                    "algorithm": "sha1",
                    "files": [{ "path": "a.txt", "hash": "c22b5f9178342609428d6f51b2c5af4c0bde6a42" }]
                }))
            }),
        )
        .route("/files/{instance}/{*path}", get(|| async { "evil" }));
    let client = TerraClient::new(&spawn(app).await).unwrap();

    let local = tempdir().unwrap();
    let err = client
        .sync_instance("survival", local.path())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TerraClientError::IntegrityMismatch { ref path, .. } if path == "a.txt"
    ));
    assert!(!local.path().join("a.txt").exists());
}

#[tokio::test]
async fn escaping_manifest_paths_are_refused() {
    let app = Router::new().route(
        "/instances/{instance}/manifest",
        get(|| async {
            Json(serde_json::json!({
                "instance": "survival",
                "files": [{ "path": "../outside.txt", "hash": "00" }]
            }))
        }),
    );
    let client = TerraClient::new(&spawn(app).await).unwrap();

    let local = tempdir().unwrap();
    let err = client
        .sync_instance("survival", &local.path().join("survival"))
        .await
        .unwrap_err();
    assert!(matches!(err, TerraClientError::Validation(_)));
    assert!(!local.path().join("outside.txt").exists());
}

#[tokio::test]
async fn manifest_for_another_instance_is_refused() {
    let app = Router::new().route(
        "/instances/{instance}/manifest",
        get(|| async {
            Json(serde_json::json!({
                "instance": "creative",
                "algorithm": "sha1",
                "files": [{ "path": "a.txt", "hash": "c22b5f9178342609428d6f51b2c5af4c0bde6a42" }]
            }))
        }),
    );
    let client = TerraClient::new(&spawn(app).await).unwrap();

    let local = tempdir().unwrap();
    let err = client
        .sync_instance("survival", local.path())
        .await
        .unwrap_err();
    assert!(matches!(err, TerraClientError::Validation(_)));
    assert!(!local.path().join("a.txt").exists());
}
