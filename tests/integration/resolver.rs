use sideload::core::UpdateError;
use sideload::http::HttpClients;
use sideload::resolver::{LinkResolver, LinkType, ProviderHosts};
use sideload::test_utils::{MockResponse, MockServer};

fn resolver(hosts: ProviderHosts) -> LinkResolver {
    LinkResolver::new(HttpClients::new().unwrap(), hosts)
}

fn local_hosts(strategy: LinkType) -> ProviderHosts {
    let local = vec!["127.0.0.1".to_string()];
    let mut hosts = ProviderHosts::default();
    match strategy {
        LinkType::FileHost => hosts.file_host = local,
        LinkType::Vcs => hosts.vcs = local,
        LinkType::Drive => hosts.drive = local,
        _ => {}
    }
    hosts
}

/// `/r0 -> /r1 -> ... -> /r{hops} -> 200`
fn redirect_chain(server: &MockServer, hops: usize) {
    for i in 0..hops {
        server.route(&format!("/r{i}"), MockResponse::redirect(302, &format!("/r{}", i + 1)));
    }
    server.route(&format!("/r{hops}"), MockResponse::ok(b"final".to_vec()));
}

#[tokio::test]
async fn test_redirect_chain_at_limit_resolves() {
    let server = MockServer::start().await.unwrap();
    redirect_chain(&server, 10);

    let link = resolver(ProviderHosts::default()).resolve(&server.url("/r0")).await.unwrap();

    assert_eq!(link.link_type, LinkType::Unknown);
    assert_eq!(link.direct_url, server.url("/r10"));
    assert_eq!(server.hits("/r10"), 1);
}

#[tokio::test]
async fn test_redirect_chain_over_limit_fails() {
    let server = MockServer::start().await.unwrap();
    redirect_chain(&server, 11);
    let start = server.url("/r0");

    let err = resolver(ProviderHosts::default()).resolve(&start).await.unwrap_err();

    match err {
        UpdateError::ResolveFailed {
            url,
            reason,
        } => {
            assert_eq!(url, start);
            assert!(reason.contains("too many redirects"), "{reason}");
        }
        other => panic!("expected ResolveFailed, got {other:?}"),
    }
    assert_eq!(server.hits("/r11"), 0);
}

#[tokio::test]
async fn test_relative_redirect_locations() {
    let server = MockServer::start().await.unwrap();
    server.route("/short/x", MockResponse::redirect(301, "../files/app-3.1.apk"));
    server.route("/files/app-3.1.apk", MockResponse::ok(b"pkg".to_vec()));

    let link = resolver(ProviderHosts::default()).resolve(&server.url("/short/x")).await.unwrap();

    assert_eq!(link.direct_url, server.url("/files/app-3.1.apk"));
    assert_eq!(link.suggested_file_name.as_deref(), Some("app-3.1.apk"));
}

#[tokio::test]
async fn test_file_host_page_is_scraped() {
    let server = MockServer::start().await.unwrap();
    let target = server.url("/dl/abc/app-2.0.apk");
    server.route(
        "/file/abc/app.apk/file",
        MockResponse::html(&format!(
            r#"<html><body><a class="input popsok" aria-label="Download file" href="{target}" id="downloadButton">Download</a></body></html>"#
        )),
    );

    let link = resolver(local_hosts(LinkType::FileHost))
        .resolve(&server.url("/file/abc/app.apk/file"))
        .await
        .unwrap();

    assert_eq!(link.link_type, LinkType::FileHost);
    assert_eq!(link.direct_url, target);
    assert_eq!(link.suggested_file_name.as_deref(), Some("app-2.0.apk"));
    assert_eq!(server.hits("/dl/abc/app-2.0.apk"), 0, "resolution must not download the package");
}

#[tokio::test]
async fn test_file_host_page_without_link_fails() {
    let server = MockServer::start().await.unwrap();
    server.route("/file/gone", MockResponse::html("<html><body>File removed</body></html>"));
    let page = server.url("/file/gone");

    let err = resolver(local_hosts(LinkType::FileHost)).resolve(&page).await.unwrap_err();

    match err {
        UpdateError::ResolveFailed {
            url,
            reason,
        } => {
            assert_eq!(url, page);
            assert!(reason.contains("could not find download link"), "{reason}");
        }
        other => panic!("expected ResolveFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_vcs_release_page_asset_is_followed() {
    let server = MockServer::start().await.unwrap();
    server.route(
        "/org/app/releases/latest",
        MockResponse::html(
            r#"<ul><li><a href="/org/app/releases/download/v2.0/app-2.0.apk" rel="nofollow">app-2.0.apk</a></li></ul>"#,
        ),
    );
    server.route(
        "/org/app/releases/download/v2.0/app-2.0.apk",
        MockResponse::redirect(302, "/objects/release-asset/app-2.0.apk"),
    );
    server.route("/objects/release-asset/app-2.0.apk", MockResponse::ok(b"pkg".to_vec()));

    let link = resolver(local_hosts(LinkType::Vcs))
        .resolve(&server.url("/org/app/releases/latest"))
        .await
        .unwrap();

    assert_eq!(link.link_type, LinkType::Vcs);
    assert_eq!(link.direct_url, server.url("/objects/release-asset/app-2.0.apk"));
    assert_eq!(link.suggested_file_name.as_deref(), Some("app-2.0.apk"));
}

#[tokio::test]
async fn test_vcs_page_without_asset_fails() {
    let server = MockServer::start().await.unwrap();
    server.route("/org/app/releases/latest", MockResponse::html("<p>No assets</p>"));

    let err = resolver(local_hosts(LinkType::Vcs))
        .resolve(&server.url("/org/app/releases/latest"))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::ResolveFailed { .. }), "{err:?}");
}

#[tokio::test]
async fn test_drive_link_keeps_its_origin() {
    let server = MockServer::start().await.unwrap();

    let link = resolver(local_hosts(LinkType::Drive))
        .resolve(&server.url("/file/d/1xYz-_9/view?usp=sharing"))
        .await
        .unwrap();

    assert_eq!(link.link_type, LinkType::Drive);
    assert_eq!(link.direct_url, server.url("/uc?export=download&id=1xYz-_9&confirm=t"));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_direct_link_needs_no_network() {
    let server = MockServer::start().await.unwrap();

    let link = resolver(local_hosts(LinkType::FileHost))
        .resolve(&server.url("/builds/app-release.apk?token=abc"))
        .await
        .unwrap();

    assert_eq!(link.link_type, LinkType::Direct);
    assert_eq!(link.direct_url, server.url("/builds/app-release.apk?token=abc"));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_error_status_during_redirects_fails() {
    let server = MockServer::start().await.unwrap();
    server.route("/short", MockResponse::redirect(302, "/missing"));
    let start = server.url("/short");

    let err = resolver(ProviderHosts::default()).resolve(&start).await.unwrap_err();

    match err {
        UpdateError::ResolveFailed {
            url,
            reason,
        } => {
            assert_eq!(url, start);
            assert!(reason.contains("404"), "{reason}");
        }
        other => panic!("expected ResolveFailed, got {other:?}"),
    }
}
