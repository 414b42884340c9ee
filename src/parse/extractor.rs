//! DOM extraction: post markup → [`ParsedPost`].
//!
//! Works purely on markup already produced by the renderer. The absence of
//! the primary content container means the page template drifted
//! (`StructureChanged`); it never means "no content".

use select::document::Document;
use select::node::Node;
use select::predicate::{Attr, Name, Predicate};
use std::collections::HashSet;

use crate::core::error::ParseError;
use crate::parse::{markers, ParsedPost, VideoSource, VideoVariant};

/// Extracts account metadata and media references from post markup.
///
/// Returns `StructureChanged` when the post container marker is missing.
/// An extraction that succeeds structurally but finds no media returns
/// `Ok` with empty lists; the orchestrator tags that outcome `Empty`.
pub fn extract_post(markup: &str) -> Result<ParsedPost, ParseError> {
    let document = Document::from(markup);

    let article = document
        .find(Name("article").and(Attr("data-testid", markers::POST)))
        .next()
        .ok_or(ParseError::StructureChanged)?;

    let avatar_url = article
        .find(Attr("data-testid", markers::AVATAR).descendant(Name("img")))
        .next()
        .and_then(|img| img.attr("src"))
        .map(str::to_string);

    let account_name = article
        .find(Attr("data-testid", markers::USER_NAME))
        .next()
        .and_then(|block| {
            block
                .find(Name("span").descendant(Name("span")))
                .next()
                .map(|span| span.text())
        })
        .filter(|name| !name.trim().is_empty());

    let text = article
        .find(Attr("data-testid", markers::TEXT))
        .next()
        .map(|block| {
            block
                .find(Name("span"))
                .map(|span| span.text())
                .collect::<String>()
        })
        .filter(|t| !t.trim().is_empty());

    let mut videos = Vec::new();
    let mut claimed_posters: HashSet<String> = HashSet::new();

    for slot in article.find(Attr("data-testid", markers::PHOTO_SLOT)) {
        for component in slot.find(Attr("data-testid", markers::VIDEO_COMPONENT)) {
            let poster = component
                .find(Name("video"))
                .next()
                .and_then(|video| video.attr("poster"))
                .filter(|p| !p.trim().is_empty())
                .map(str::to_string);

            let sources: Vec<VideoSource> = component
                .find(Name("source").and(Attr("type", "video/mp4")))
                .filter_map(|source| {
                    let src = source.attr("src")?;
                    if src.trim().is_empty() {
                        return None;
                    }
                    Some(VideoSource {
                        url: src.to_string(),
                        mime_type: source.attr("type").map(str::to_string),
                    })
                })
                .collect();

            // A slot contributes a video only when there is something to
            // show or something to download.
            if poster.is_some() || !sources.is_empty() {
                if let Some(p) = &poster {
                    claimed_posters.insert(p.clone());
                }
                videos.push(VideoVariant { poster, sources });
            }
        }
    }

    let images = collect_images(&article, &claimed_posters);

    Ok(ParsedPost {
        avatar_url,
        account_name,
        text,
        videos,
        images,
    })
}

/// Images inside photo slots, document order, deduplicated, excluding any
/// URL already claimed as a video poster.
fn collect_images(article: &Node<'_>, claimed_posters: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for img in article.find(Attr("data-testid", markers::PHOTO_SLOT).descendant(Name("img"))) {
        let Some(src) = img.attr("src") else { continue };
        if src.trim().is_empty() || claimed_posters.contains(src) {
            continue;
        }
        if seen.insert(src.to_string()) {
            images.push(src.to_string());
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FULL_POST: &str = r#"
        <article data-testid="tweet">
          <div data-testid="Tweet-User-Avatar">
            <img src="https://pbs.example/avatar.jpg"/>
          </div>
          <div data-testid="User-Name">
            <span><span>Ada L.</span></span>
          </div>
          <div data-testid="tweetText">
            <span>First part </span><span>second part</span>
          </div>
          <div data-testid="tweetPhoto">
            <img src="https://pbs.example/photo1.jpg"/>
          </div>
          <div data-testid="tweetPhoto">
            <div data-testid="videoComponent">
              <video poster="https://pbs.example/poster.jpg">
                <source src="https://video.example/v1-720.mp4" type="video/mp4"/>
                <source src="https://video.example/v1-480.mp4" type="video/mp4"/>
              </video>
            </div>
          </div>
          <div data-testid="tweetPhoto">
            <img src="https://pbs.example/photo1.jpg"/>
          </div>
        </article>
    "#;

    #[test]
    fn test_extracts_account_metadata() {
        let post = extract_post(FULL_POST).unwrap();
        assert_eq!(post.avatar_url.as_deref(), Some("https://pbs.example/avatar.jpg"));
        assert_eq!(post.account_name.as_deref(), Some("Ada L."));
        assert_eq!(post.text.as_deref(), Some("First part second part"));
    }

    #[test]
    fn test_extracts_video_with_ordered_sources() {
        let post = extract_post(FULL_POST).unwrap();
        assert_eq!(post.videos.len(), 1);
        let video = &post.videos[0];
        assert_eq!(video.poster.as_deref(), Some("https://pbs.example/poster.jpg"));
        assert_eq!(video.sources.len(), 2);
        assert_eq!(video.default_source(), Some("https://video.example/v1-720.mp4"));
        assert_eq!(video.sources[1].url, "https://video.example/v1-480.mp4");
        assert_eq!(video.sources[0].mime_type.as_deref(), Some("video/mp4"));
    }

    #[test]
    fn test_images_deduplicated_in_order() {
        let post = extract_post(FULL_POST).unwrap();
        assert_eq!(post.images, vec!["https://pbs.example/photo1.jpg".to_string()]);
    }

    #[test]
    fn test_missing_container_is_structure_changed() {
        let markup = "<html><body><div>totally different page</div></body></html>";
        assert_eq!(extract_post(markup), Err(ParseError::StructureChanged));
    }

    #[test]
    fn test_container_without_media_parses_empty() {
        let markup = r#"
            <article data-testid="tweet">
              <div data-testid="tweetText"><span>words only</span></div>
            </article>
        "#;
        let post = extract_post(markup).unwrap();
        assert!(post.is_empty());
        assert_eq!(post.text.as_deref(), Some("words only"));
    }

    #[test]
    fn test_video_without_poster_still_counts_with_sources() {
        let markup = r#"
            <article data-testid="tweet">
              <div data-testid="tweetPhoto">
                <div data-testid="videoComponent">
                  <video>
                    <source src="https://video.example/bare.mp4" type="video/mp4"/>
                  </video>
                </div>
              </div>
            </article>
        "#;
        let post = extract_post(markup).unwrap();
        assert_eq!(post.videos.len(), 1);
        assert_eq!(post.videos[0].poster, None);
        assert_eq!(post.videos[0].default_source(), Some("https://video.example/bare.mp4"));
    }

    #[test]
    fn test_video_component_without_poster_or_sources_is_skipped() {
        let markup = r#"
            <article data-testid="tweet">
              <div data-testid="tweetPhoto">
                <div data-testid="videoComponent"><video></video></div>
              </div>
            </article>
        "#;
        let post = extract_post(markup).unwrap();
        assert!(post.videos.is_empty());
        assert!(post.is_empty());
    }

    #[test]
    fn test_blank_source_src_ignored() {
        let markup = r#"
            <article data-testid="tweet">
              <div data-testid="tweetPhoto">
                <div data-testid="videoComponent">
                  <video poster="https://pbs.example/p.jpg">
                    <source src="" type="video/mp4"/>
                  </video>
                </div>
              </div>
            </article>
        "#;
        let post = extract_post(markup).unwrap();
        assert_eq!(post.videos.len(), 1);
        assert!(post.videos[0].sources.is_empty());
    }

    #[test]
    fn test_poster_url_not_double_counted_as_image() {
        let markup = r#"
            <article data-testid="tweet">
              <div data-testid="tweetPhoto">
                <div data-testid="videoComponent">
                  <video poster="https://pbs.example/poster.jpg">
                    <source src="https://video.example/v.mp4" type="video/mp4"/>
                  </video>
                  <img src="https://pbs.example/poster.jpg"/>
                </div>
              </div>
            </article>
        "#;
        let post = extract_post(markup).unwrap();
        assert_eq!(post.videos.len(), 1);
        assert!(post.images.is_empty());
    }
}
