//! Parse pipeline scenarios: canned renderer → repository → media items.

mod common;

use common::{temp_pool, FakeRenderer};
use savora::core::error::ParseError;
use savora::download::MediaKind;
use savora::media::MediaRepository;
use savora::storage::db;
use std::sync::Arc;

const POST_WITH_MEDIA: &str = r#"
    <article data-testid="tweet">
      <div data-testid="Tweet-User-Avatar">
        <img src="https://pbs.example/avatar.jpg"/>
      </div>
      <div data-testid="User-Name">
        <span><span>Ada L.</span></span>
      </div>
      <div data-testid="tweetText">
        <span>Launch day </span><span>photos and clip</span>
      </div>
      <div data-testid="tweetPhoto">
        <img src="https://pbs.example/photo1.jpg"/>
      </div>
      <div data-testid="tweetPhoto">
        <div data-testid="videoComponent">
          <video poster="https://pbs.example/poster.jpg">
            <source type="video/mp4" src="https://video.example/clip.mp4"/>
          </video>
        </div>
        <img src="https://pbs.example/poster.jpg"/>
      </div>
    </article>
"#;

const POST_WITHOUT_MEDIA: &str = r#"
    <article data-testid="tweet">
      <div data-testid="tweetText"><span>words only</span></div>
    </article>
"#;

const UNRECOGNIZED_PAGE: &str = "<html><body><main>interstitial</main></body></html>";

#[tokio::test]
async fn test_parse_link_yields_media_items_and_persists_the_post() {
    let (_guard, pool) = temp_pool();
    let renderer = Arc::new(FakeRenderer::returning(POST_WITH_MEDIA));
    let repository = MediaRepository::new(Arc::clone(&renderer), Arc::clone(&pool));

    let items = repository
        .parse_link("https://x.com/ada/status/42?s=20")
        .await
        .expect("parse succeeds");

    // One video (poster excluded from images) and one image.
    assert_eq!(items.len(), 2);
    let video = items.iter().find(|i| i.kind == MediaKind::Video).expect("video item");
    assert_eq!(video.url, "https://video.example/clip.mp4");
    assert_eq!(video.thumbnail_url.as_deref(), Some("https://pbs.example/poster.jpg"));
    assert_eq!(video.file_name, "clip.mp4");
    let image = items.iter().find(|i| i.kind == MediaKind::Image).expect("image item");
    assert_eq!(image.url, "https://pbs.example/photo1.jpg");
    for item in items.iter() {
        assert_eq!(item.post_id.as_deref(), Some("https://x.com/ada/status/42"));
        assert_eq!(item.title.as_deref(), Some("Launch day photos and clip"));
    }

    let conn = db::get_connection(&pool).expect("connection");
    let post = db::get_post(&conn, "https://x.com/ada/status/42")
        .expect("get")
        .expect("post row");
    assert_eq!(post.account_name.as_deref(), Some("Ada L."));
    assert_eq!(post.avatar_url.as_deref(), Some("https://pbs.example/avatar.jpg"));
}

#[tokio::test]
async fn test_second_parse_of_the_same_link_hits_the_cache() {
    let (_guard, pool) = temp_pool();
    let renderer = Arc::new(FakeRenderer::returning(POST_WITH_MEDIA));
    let repository = MediaRepository::new(Arc::clone(&renderer), Arc::clone(&pool));

    let first = repository
        .parse_link("https://x.com/ada/status/42")
        .await
        .expect("first parse");
    // Same link with tracking noise normalizes to the same cache key.
    let second = repository
        .parse_link("https://x.com/ada/status/42?utm_source=share#media")
        .await
        .expect("second parse");

    assert_eq!(renderer.call_count(), 1);
    assert_eq!(first, second);

    let stats = repository.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_invalidate_forces_a_fresh_render() {
    let (_guard, pool) = temp_pool();
    let renderer = Arc::new(FakeRenderer::returning(POST_WITH_MEDIA));
    let repository = MediaRepository::new(Arc::clone(&renderer), Arc::clone(&pool));

    repository.parse_link("https://x.com/ada/status/42").await.expect("parse");
    repository.invalidate("https://x.com/ada/status/42").await;
    repository.parse_link("https://x.com/ada/status/42").await.expect("reparse");

    assert_eq!(renderer.call_count(), 2);
}

#[tokio::test]
async fn test_render_failure_maps_to_network_timeout() {
    let (_guard, pool) = temp_pool();
    let renderer = Arc::new(FakeRenderer::failing());
    let repository = MediaRepository::new(Arc::clone(&renderer), Arc::clone(&pool));

    let error = repository
        .parse_link("https://x.com/ada/status/42")
        .await
        .expect_err("parse must fail");
    assert_eq!(error, ParseError::NetworkTimeout);
}

#[tokio::test]
async fn test_missing_post_container_maps_to_structure_changed() {
    let (_guard, pool) = temp_pool();
    let renderer = Arc::new(FakeRenderer::returning(UNRECOGNIZED_PAGE));
    let repository = MediaRepository::new(Arc::clone(&renderer), Arc::clone(&pool));

    let error = repository
        .parse_link("https://x.com/ada/status/42")
        .await
        .expect_err("parse must fail");
    assert_eq!(error, ParseError::StructureChanged);
}

#[tokio::test]
async fn test_media_less_post_maps_to_empty_but_still_records_the_post() {
    let (_guard, pool) = temp_pool();
    let renderer = Arc::new(FakeRenderer::returning(POST_WITHOUT_MEDIA));
    let repository = MediaRepository::new(Arc::clone(&renderer), Arc::clone(&pool));

    let error = repository
        .parse_link("https://x.com/ada/status/42")
        .await
        .expect_err("parse must fail");
    assert_eq!(error, ParseError::Empty);

    // The text-only post row is persisted even though no media came back.
    let conn = db::get_connection(&pool).expect("connection");
    let post = db::get_post(&conn, "https://x.com/ada/status/42")
        .expect("get")
        .expect("post row");
    assert_eq!(post.text.as_deref(), Some("words only"));

    // Failures are not cached: the next parse renders again.
    let _ = repository.parse_link("https://x.com/ada/status/42").await;
    assert_eq!(renderer.call_count(), 2);
}

#[tokio::test]
async fn test_history_records_downloads() {
    let (_guard, pool) = temp_pool();
    let renderer = Arc::new(FakeRenderer::returning(POST_WITH_MEDIA));
    let repository = MediaRepository::new(Arc::clone(&renderer), Arc::clone(&pool));

    let items = repository
        .parse_link("https://x.com/ada/status/42")
        .await
        .expect("parse");
    for item in items.iter() {
        repository.record_download(item).expect("record");
    }

    let all = repository.history(None).expect("history");
    assert_eq!(all.len(), 2);
    let videos = repository.history(Some(MediaKind::Video)).expect("history");
    assert_eq!(videos.len(), 1);

    assert!(repository.remove_history_item(&videos[0].id).expect("remove"));
    assert_eq!(repository.history(None).expect("history").len(), 1);
}
