use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use predicates::prelude::*;

const ROOT_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Flibusta</title>
  <link rel="next" href="/opds/p/2" type="application/atom+xml"/>
  <entry>
    <title>Новинки</title>
    <link href="/opds/new" type="application/atom+xml;profile=opds-catalog"/>
  </entry>
  <entry>
    <title>Моя полка</title>
    <link href="/opds/polka" type="application/atom+xml;profile=opds-catalog"/>
  </entry>
</feed>"#;

const PAGE_TWO: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title>Солярис</title>
    <author><name>Станислав Лем</name></author>
    <link href="/b/7/epub" type="application/epub+zip"/>
  </entry>
</feed>"#;

fn spawn_proxy_stub() -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let base_url = format!("http://{}", server.server_addr());
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let response = match request.url() {
                "/opds" => tiny_http::Response::from_string(ROOT_FEED),
                "/opds/p/2" => tiny_http::Response::from_string(PAGE_TWO),
                _ => tiny_http::Response::from_string("not found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    });

    (base_url, shutdown_tx, handle)
}

#[test]
fn normalize_prints_proxy_paths() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("opdsnav");
    cmd.env_remove("OPDSNAV_ORIGIN")
        .args([
            "normalize",
            "/genre/5",
            "http://flibusta.is/opds/new",
            "http://flibusta.is/b/1/epub",
            "/b/2/fb2",
        ])
        .assert()
        .success()
        .stdout("/opds/genre/5\n/opds/new\n/b/1/epub\n/b/2/fb2\n");
}

#[test]
fn normalize_honors_origin_flag() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("opdsnav");
    cmd.args([
        "normalize",
        "--origin",
        "https://books.example/",
        "https://books.example/opds/a/1",
    ])
    .assert()
    .success()
    .stdout("/opds/a/1\n");
}

#[test]
fn normalize_rejects_invalid_origin_env() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("opdsnav");
    cmd.env("OPDSNAV_ORIGIN", "ftp://nope")
        .args(["normalize", "/x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("normalize"));
}

#[test]
fn browse_prints_visible_entries_and_follows_next() {
    let (base_url, shutdown, handle) = spawn_proxy_stub();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("opdsnav");
    cmd.args(["browse", "--proxy", base_url.as_str(), "--pages", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Главная"))
        .stdout(predicate::str::contains("## Новинки"))
        .stdout(predicate::str::contains("-> /opds/new"))
        .stdout(predicate::str::contains("## Солярис"))
        .stdout(predicate::str::contains("Автор: Станислав Лем"))
        .stdout(predicate::str::contains("[EPUB] /b/7/epub"))
        .stdout(predicate::str::contains("Моя полка").not());

    let _ = shutdown.send(());
    handle.join().unwrap();
}

#[test]
fn browse_json_reports_download_view_for_ios() {
    let (base_url, shutdown, handle) = spawn_proxy_stub();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("opdsnav");
    let output = cmd
        .args([
            "browse",
            "--proxy",
            base_url.as_str(),
            "--pages",
            "2",
            "--download",
            "2",
            "--format",
            "epub",
            "--user-agent",
            "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)",
            "--standalone",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let page: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(page["download"], "/b/7/epub");
    assert_eq!(page["location"], "/download?url=%2Fb%2F7%2Fepub");
    assert_eq!(page["breadcrumbs"].as_array().unwrap().len(), 2);

    let _ = shutdown.send(());
    handle.join().unwrap();
}

#[test]
fn browse_rejects_download_index_zero() {
    let (base_url, shutdown, handle) = spawn_proxy_stub();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("opdsnav");
    cmd.args(["browse", "--proxy", base_url.as_str(), "--download", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1-based"));

    let _ = shutdown.send(());
    handle.join().unwrap();
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("opdsnav");
    cmd.env("RUST_LOG", "debug")
        .args(["normalize", "/x"])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}
