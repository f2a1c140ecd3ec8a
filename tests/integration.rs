use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chv_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_chv"))
}

/// Temp dir with a config pointing the store inside it and the API at
/// `base_url`.
fn setup_test_env(base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[store]
path = "{}/data/comments.sqlite"

[api]
base_url = "{}"
key = "test-key"
timeout_secs = 5
max_results = 50

[harvest]
reply_concurrency = 2

[search]
page_size = 20
webpage_url = "/search"
"#,
        root.display(),
        base_url
    );

    let config_path = config_dir.join("chv.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

async fn run_chv(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = chv_binary();
    let output = tokio::process::Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("YOUTUBE_API_KEY")
        .output()
        .await
        .unwrap_or_else(|e| panic!("Failed to run chv binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn thread(id: &str, video_id: &str, replies: u64, text: &str) -> Value {
    json!({
        "id": id,
        "snippet": {
            "videoId": video_id,
            "totalReplyCount": replies,
            "topLevelComment": {
                "id": id,
                "snippet": {
                    "authorDisplayName": format!("author {}", id),
                    "authorProfileImageUrl": "https://img/a.jpg",
                    "authorChannelId": {"value": format!("UC-{}", id)},
                    "textDisplay": text,
                    "likeCount": 4,
                    "publishedAt": "2022-05-01T10:00:00Z",
                    "updatedAt": "2022-05-01T10:00:00Z"
                }
            }
        }
    })
}

fn reply(id: &str, parent: &str, text: &str) -> Value {
    json!({
        "id": id,
        "snippet": {
            "parentId": parent,
            "authorDisplayName": format!("author {}", id),
            "authorChannelId": {"value": format!("UC-{}", id)},
            "textDisplay": text,
            "likeCount": 1,
            "publishedAt": "2022-05-02T10:00:00Z",
            "updatedAt": "2022-05-02T10:00:00Z"
        }
    })
}

async fn mount_round_trip(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .and(query_param("videoId", "v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                thread("t1", "v1", 2, "What a launch, the rocket flew"),
                thread("t2", "v1", 0, "Boring stream")
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/comments"))
        .and(query_param("parentId", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                reply("r1", "t1", "agreed, great rocket"),
                reply("r2", "t1", "launch of the year")
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/videos"))
        .and(query_param("id", "v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "v1",
                "snippet": {
                    "title": "Rocket Launch Live",
                    "channelId": "UCspace",
                    "channelTitle": "Space Channel",
                    "thumbnails": {"default": {"url": "https://img/v1.jpg"}}
                }
            }]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_init_creates_store() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (stdout, stderr, success) = run_chv(&config_path, &["init"]).await;
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Initialized store"));
    assert!(tmp.path().join("data/comments.sqlite").exists());

    let (_, stderr, success) = run_chv(&config_path, &["init"]).await;
    assert!(success, "second init failed: {}", stderr);
}

#[tokio::test]
async fn test_harvest_round_trip_and_idempotence() {
    let server = MockServer::start().await;
    mount_round_trip(&server).await;
    let (_tmp, config_path) = setup_test_env(&server.uri());

    let (stdout, stderr, success) = run_chv(&config_path, &["harvest", "v1", "--progress", "off"]).await;
    assert!(success, "harvest failed: {}", stderr);
    assert!(stdout.contains("threads: 2"), "{}", stdout);
    assert!(stdout.contains("replies: 2"), "{}", stdout);
    assert!(stdout.contains("inserted: 4"), "{}", stdout);
    assert!(stdout.contains("status: complete"), "{}", stdout);
    assert!(stdout.trim_end().ends_with("ok"));

    let (stdout, _, success) = run_chv(&config_path, &["get", "r1", "--json"]).await;
    assert!(success);
    let doc: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(doc["comment"]["parentId"], "t1");
    assert_eq!(doc["comment"]["videoId"], "v1");
    assert_eq!(doc["comment"]["replyCount"], 0);
    assert_eq!(doc["video"]["title"], "Rocket Launch Live");

    // The video cache is per run, so the second run looks v1 up again.
    server.reset().await;
    mount_round_trip(&server).await;
    let (stdout, stderr, success) = run_chv(&config_path, &["harvest", "v1", "--progress", "off"]).await;
    assert!(success, "second harvest failed: {}", stderr);
    assert!(stdout.contains("inserted: 0"), "{}", stdout);
    assert!(stdout.contains("unchanged: 4"), "{}", stdout);

    let (stdout, _, success) = run_chv(&config_path, &["stats"]).await;
    assert!(success);
    assert!(stdout.contains("Documents:   4"), "{}", stdout);
    assert!(stdout.contains("Replies:     2"), "{}", stdout);
}

#[tokio::test]
async fn test_query_formats_and_paging() {
    let server = MockServer::start().await;
    mount_round_trip(&server).await;
    let (_tmp, config_path) = setup_test_env(&server.uri());

    let (_, stderr, success) = run_chv(&config_path, &["harvest", "v1", "--progress", "off"]).await;
    assert!(success, "harvest failed: {}", stderr);

    let (stdout, stderr, success) =
        run_chv(&config_path, &["query", "--text", "rocket", "--format", "json"]).await;
    assert!(success, "query failed: {}", stderr);
    let window: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(window["totalHits"], 2);
    assert_eq!(window["lastPage"], 1);

    let (stdout, _, success) = run_chv(
        &config_path,
        &["query", "--video-id", "v1", "--page-size", "3", "--page", "2"],
    )
    .await;
    assert!(success);
    assert!(stdout.contains("Results 4-4 of 4 (page 2 of 2)"), "{}", stdout);
    assert!(stdout.contains("4. "), "{}", stdout);

    let (stdout, _, success) =
        run_chv(&config_path, &["query", "--video-id", "v1", "--page", "9"]).await;
    assert!(success, "a page past the end is not an error");
    assert!(stdout.contains("last page is 1"), "{}", stdout);

    let (stdout, _, success) = run_chv(
        &config_path,
        &["query", "--text", "launch", "--format", "html"],
    )
    .await;
    assert!(success);
    assert!(stdout.contains("<b>launch</b>"), "{}", stdout);
    assert!(stdout.contains("watch?v=v1&amp;lc=t1"), "{}", stdout);
    assert!(stdout.contains("Displaying results 1 ~ 2 (page 1 of 1)"), "{}", stdout);

    let (stdout, _, success) = run_chv(
        &config_path,
        &["query", "--user-name", "t2", "--format", "text"],
    )
    .await;
    assert!(success);
    assert!(stdout.contains("text: \"Boring stream\""), "{}", stdout);
}

#[tokio::test]
async fn test_query_errors_exit_non_zero() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (_, stderr, success) = run_chv(&config_path, &["query", "--text", "rocket"]).await;
    assert!(!success, "query on a missing store must fail");
    assert!(stderr.contains("store not found"), "{}", stderr);

    run_chv(&config_path, &["init"]).await;

    let (_, stderr, success) = run_chv(&config_path, &["query", "--text", "(unbalanced"]).await;
    assert!(!success);
    assert!(stderr.contains("commentText"), "{}", stderr);

    let (_, stderr, success) = run_chv(&config_path, &["query", "--user-id", "a OR b"]).await;
    assert!(!success);
    assert!(stderr.contains("userId"), "{}", stderr);

    let (_, _, success) = run_chv(&config_path, &["query", "--page", "0"]).await;
    assert!(!success);

    let (_, stderr, success) = run_chv(&config_path, &["get", "nope"]).await;
    assert!(!success);
    assert!(stderr.contains("not found"), "{}", stderr);
}

#[tokio::test]
async fn test_aborted_harvest_resumes_from_cursor() {
    let server = MockServer::start().await;

    // Second page fails once, then succeeds.
    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [thread("t2", "v1", 0, "second page")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [thread("t1", "v1", 0, "first page")],
            "nextPageToken": "p2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let (_tmp, config_path) = setup_test_env(&server.uri());

    let (stdout, stderr, success) = run_chv(&config_path, &["harvest", "v1", "--progress", "off"]).await;
    assert!(!success, "aborted harvest must exit non-zero");
    assert!(stdout.contains("status: aborted"), "{}", stdout);
    assert!(stdout.contains("resume cursor: p2"), "{}", stdout);
    assert!(stderr.contains("harvest aborted"), "{}", stderr);

    let (stdout, _, _) = run_chv(&config_path, &["stats"]).await;
    assert!(stdout.contains("aborted"), "{}", stdout);

    let (stdout, stderr, success) = run_chv(
        &config_path,
        &["harvest", "v1", "--resume", "--progress", "off"],
    )
    .await;
    assert!(success, "resumed harvest failed: {}", stderr);
    assert!(stdout.contains("threads: 1"), "{}", stdout);
    assert!(stdout.contains("status: complete"), "{}", stdout);

    let (_, _, success) = run_chv(&config_path, &["get", "t2"]).await;
    assert!(success);
}

#[tokio::test]
async fn test_harvest_without_api_key_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("chv.toml");
    fs::write(
        &config_path,
        format!("[store]\npath = \"{}/s.sqlite\"\n", tmp.path().display()),
    )
    .unwrap();

    let (_, stderr, success) = run_chv(&config_path, &["harvest", "v1"]).await;
    assert!(!success);
    assert!(stderr.contains("no API key"), "{}", stderr);
}
