use std::time::Duration;

use dash_proxy::{DashProxy, ProxyConfig, RepresentationAddress};
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{
    assert_files, init_test_tracing, mount_segments, requests_to, setup_mock_server, VOD_FILES,
    VOD_MANIFEST,
};

/// A live manifest with `1 + repeat` segments of 2 seconds.
fn live_manifest(repeat: u32) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="dynamic" minimumUpdatePeriod="PT1S">
  <Period id="live" start="PT0S">
    <AdaptationSet contentType="video">
      <SegmentTemplate initialization="v/init.mp4" media="v/$Time$.m4s" timescale="1">
        <SegmentTimeline>
          <S t="0" d="2" r="{repeat}"/>
        </SegmentTimeline>
      </SegmentTemplate>
      <Representation id="v" bandwidth="1000"/>
    </AdaptationSet>
  </Period>
</MPD>"#
    )
}

fn config(manifest_url: &str, output: &std::path::Path) -> anyhow::Result<ProxyConfig> {
    Ok(ProxyConfig::new(Url::parse(manifest_url)?)
        .with_output_dir(output)
        .with_download(true)
        .with_manifest_retry(3, Duration::from_millis(10)))
}

#[tokio::test]
async fn test_vod_mirror() -> anyhow::Result<()> {
    init_test_tracing();
    let (manifest_url, server) = setup_mock_server(VOD_MANIFEST).await;
    let output = tempfile::tempdir()?;

    let mut proxy = DashProxy::new(config(&manifest_url, output.path())?.with_save_mpds(true))?;
    proxy.run().await?;

    assert_files(output.path(), &VOD_FILES);
    // only the last representation of each set, trick mode sets are excluded
    assert!(!output.path().join("low").exists());
    assert!(!output.path().join("trick").exists());
    assert_eq!(requests_to(&server, "/trick").await, 0);

    assert_eq!(
        proxy.registry().addresses().await,
        vec![
            RepresentationAddress::new(0, 0, 1),
            RepresentationAddress::new(0, 2, 0)
        ]
    );

    let original = std::fs::read_to_string(output.path().join("manifest.mpd.orig"))?;
    assert_eq!(original, VOD_MANIFEST);
    let normalized = std::fs::read_to_string(output.path().join("manifest.mpd"))?;
    assert!(!normalized.contains("trickmode"));
    assert!(normalized.contains(r#"<Representation id="low""#));
    assert_eq!(
        std::fs::read_to_string(output.path().join("manifest.1.mpd"))?,
        normalized
    );
    Ok(())
}

#[tokio::test]
async fn test_dry_run_only_fetches_manifest() -> anyhow::Result<()> {
    let (manifest_url, server) = setup_mock_server(VOD_MANIFEST).await;
    let output = tempfile::tempdir()?;

    let mut proxy = DashProxy::new(config(&manifest_url, output.path())?.with_download(false))?;
    proxy.run().await?;

    assert_eq!(requests_to(&server, "/").await, 1);
    assert!(output.path().join("manifest.mpd").is_file());
    assert!(!output.path().join("high").exists());
    assert!(!output.path().join("manifest.1.mpd").exists());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_manifest_keeps_running() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manifest.mpd"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let output = tempfile::tempdir()?;

    let manifest_url = format!("{}/manifest.mpd", server.uri());
    let mut proxy = DashProxy::new(
        config(&manifest_url, output.path())?
            .with_manifest_retry(2, Duration::from_millis(5))
            .with_default_refresh_interval(Duration::from_millis(50)),
    )?;
    let cancel = proxy.cancellation_token();
    let handle = tokio::spawn(async move { proxy.run().await });

    // several cycles give up after 2 attempts each, the proxy keeps refreshing
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!handle.is_finished());
    cancel.cancel();
    handle.await??;

    let requests = requests_to(&server, "/manifest.mpd").await;
    assert!(requests >= 4, "only {requests} manifest requests");
    assert!(!output.path().join("manifest.mpd.orig").exists());
    Ok(())
}

#[tokio::test]
async fn test_unparsable_manifest_keeps_running() -> anyhow::Result<()> {
    let (manifest_url, server) = setup_mock_server(
        r#"<MPD><Period><AdaptationSet><Representation id="a" bandwidth="high"/></AdaptationSet></Period></MPD>"#,
    )
    .await;
    let output = tempfile::tempdir()?;

    let mut proxy = DashProxy::new(
        config(&manifest_url, output.path())?
            .with_default_refresh_interval(Duration::from_millis(50)),
    )?;
    let cancel = proxy.cancellation_token();
    let handle = tokio::spawn(async move { proxy.run().await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    handle.await??;

    assert!(requests_to(&server, "/manifest.mpd").await >= 2);
    // the raw manifest is kept even when it can not be parsed
    assert!(output.path().join("manifest.mpd.orig").is_file());
    assert!(!output.path().join("manifest.mpd").exists());
    Ok(())
}

#[tokio::test]
async fn test_manifest_recovers_after_failures() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manifest.mpd"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    let manifest_url = format!("{}/manifest.mpd", server.uri());
    Mock::given(method("GET"))
        .and(path("/manifest.mpd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VOD_MANIFEST))
        .mount(&server)
        .await;
    let output = tempfile::tempdir()?;

    let mut proxy = DashProxy::new(config(&manifest_url, output.path())?.with_download(false))?;
    proxy.run().await?;

    assert_eq!(requests_to(&server, "/manifest.mpd").await, 3);
    assert!(output.path().join("manifest.mpd").is_file());
    Ok(())
}

#[tokio::test]
async fn test_live_refresh_fetches_appended_segments() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manifest.mpd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(live_manifest(0)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/manifest.mpd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(live_manifest(1)))
        .mount(&server)
        .await;
    mount_segments(&server).await;
    let manifest_url = format!("{}/manifest.mpd", server.uri());
    let output = tempfile::tempdir()?;

    let mut proxy = DashProxy::new(config(&manifest_url, output.path())?.with_save_mpds(true))?;
    let cancel = proxy.cancellation_token();
    let handle = tokio::spawn(async move { proxy.run().await });

    // the second refresh happens after the 1 second minimumUpdatePeriod
    tokio::time::sleep(Duration::from_millis(1600)).await;
    cancel.cancel();
    handle.await??;

    assert!(requests_to(&server, "/manifest.mpd").await >= 2);
    assert!(output.path().join("manifest.1.mpd").is_file());
    assert!(output.path().join("manifest.2.mpd").is_file());
    assert_files(output.path(), &["v/init.mp4", "v/0.m4s", "v/2.m4s"]);

    // the appended segment is fetched, existing ones are not requested again
    assert_eq!(requests_to(&server, "/v/init.mp4").await, 1);
    assert_eq!(requests_to(&server, "/v/0.m4s").await, 1);
    assert_eq!(requests_to(&server, "/v/2.m4s").await, 1);
    Ok(())
}
