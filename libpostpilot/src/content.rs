//! Content collaborators and per-platform adaptation
//!
//! The pipeline consumes generated text through the `ContentGenerator` trait
//! and adapts it to each target platform's fixed rules before a post is
//! created. Content acquisition and the generator itself live outside this
//! crate; mock implementations ship here for wiring and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};
use crate::types::Platform;

/// A unit of ingested content a post can be generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceContent {
    /// Stable reference into the acquisition store.
    pub reference: String,
    pub title: String,
    pub summary: String,
    pub url: Option<String>,
}

/// Knobs forwarded to the content generator.
#[derive(Debug, Clone, Default)]
pub struct GenerationPreferences {
    pub tone: Option<String>,
    pub language: Option<String>,
}

/// Generator output before platform adaptation.
#[derive(Debug, Clone)]
pub struct GeneratedContent {
    pub text: String,
    pub hashtags: Vec<String>,
}

/// External text generator.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        source: &SourceContent,
        preferences: &GenerationPreferences,
    ) -> std::result::Result<GeneratedContent, GenerationError>;
}

/// One feed item queued for post generation.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub source: SourceContent,
    pub user_id: String,
    pub platforms: Vec<Platform>,
    pub require_approval: bool,
}

/// External content acquisition: upstream fetch plus the queue of items that
/// have not yet produced posts.
#[async_trait]
pub trait ContentFeed: Send + Sync {
    /// Pull fresh items from upstream sources.
    async fn refresh(&self) -> Result<u64>;

    /// Items awaiting post generation.
    async fn pending(&self) -> Result<Vec<FeedItem>>;

    /// Mark an item consumed so later generation sweeps skip it.
    async fn mark_consumed(&self, reference: &str) -> Result<()>;
}

/// Resolves a user's approval-channel address.
pub trait UserDirectory: Send + Sync {
    fn destination_for(&self, user_id: &str) -> Option<String>;
}

/// Content after platform adaptation, ready to store on a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptedContent {
    pub body: String,
    /// Empty when the platform folds hashtags into the body.
    pub hashtags: Vec<String>,
}

/// Adapt generated content to one platform's fixed rules.
///
/// Short-form platforms get hashtags folded into the body under the
/// platform's character ceiling; trailing hashtags are dropped first, then
/// body text is truncated, but the first hashtag always survives. Long-form
/// platforms keep the hashtag list as a separate field. Lengths count
/// Unicode scalar values, not bytes.
pub fn adapt_for_platform(
    text: &str,
    hashtags: &[String],
    platform: Platform,
) -> AdaptedContent {
    let limit = platform.character_limit();

    if !platform.folds_hashtags() {
        return AdaptedContent {
            body: truncate_chars(text, limit),
            hashtags: hashtags.to_vec(),
        };
    }

    let tags: Vec<String> = hashtags.iter().map(|t| format_tag(t)).collect();

    // Prefer keeping the full text and as many hashtags as fit.
    for keep in (1..=tags.len()).rev() {
        let candidate = compose(text, &tags[..keep].join(" "));
        if char_len(&candidate) <= limit {
            return AdaptedContent {
                body: candidate,
                hashtags: Vec::new(),
            };
        }
    }

    if tags.is_empty() {
        return AdaptedContent {
            body: truncate_chars(text, limit),
            hashtags: Vec::new(),
        };
    }

    // Text alone overflows: shorten it and keep the first hashtag.
    let first = &tags[0];
    let reserve = char_len(first) + 2;
    if reserve >= limit {
        // Pathological tag longer than the whole ceiling.
        return AdaptedContent {
            body: truncate_chars(text, limit),
            hashtags: Vec::new(),
        };
    }

    let body = compose(&truncate_chars(text, limit - reserve), first);
    AdaptedContent {
        body,
        hashtags: Vec::new(),
    }
}

fn compose(text: &str, tag_line: &str) -> String {
    format!("{}\n\n{}", text, tag_line)
}

fn format_tag(tag: &str) -> String {
    let trimmed = tag.trim().trim_start_matches('#');
    format!("#{}", trimmed)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Truncate to `max` characters, replacing the tail with an ellipsis when
/// anything is cut.
fn truncate_chars(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let kept: String = s.chars().take(max - 1).collect();
    format!("{}…", kept.trim_end())
}

/// Mock collaborators for wiring and tests.
pub mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{
        ContentFeed, ContentGenerator, FeedItem, GeneratedContent, GenerationPreferences,
        SourceContent, UserDirectory,
    };
    use crate::error::{GenerationError, Result};

    /// Generator that echoes the source title, or fails on demand.
    pub struct MockGenerator {
        pub hashtags: Vec<String>,
        pub fail_with: Option<String>,
    }

    impl MockGenerator {
        pub fn success(hashtags: Vec<String>) -> Self {
            Self {
                hashtags,
                fail_with: None,
            }
        }

        pub fn failure(message: &str) -> Self {
            Self {
                hashtags: Vec::new(),
                fail_with: Some(message.to_string()),
            }
        }
    }

    #[async_trait]
    impl ContentGenerator for MockGenerator {
        async fn generate(
            &self,
            source: &SourceContent,
            _preferences: &GenerationPreferences,
        ) -> std::result::Result<GeneratedContent, GenerationError> {
            if let Some(message) = &self.fail_with {
                return Err(GenerationError(message.clone()));
            }
            Ok(GeneratedContent {
                text: format!("{} — {}", source.title, source.summary),
                hashtags: self.hashtags.clone(),
            })
        }
    }

    /// In-memory feed with consumption tracking.
    #[derive(Default)]
    pub struct MockFeed {
        items: Mutex<Vec<FeedItem>>,
        consumed: Mutex<Vec<String>>,
    }

    impl MockFeed {
        pub fn with_items(items: Vec<FeedItem>) -> Self {
            Self {
                items: Mutex::new(items),
                consumed: Mutex::new(Vec::new()),
            }
        }

        pub fn consumed(&self) -> Vec<String> {
            self.consumed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentFeed for MockFeed {
        async fn refresh(&self) -> Result<u64> {
            Ok(0)
        }

        async fn pending(&self) -> Result<Vec<FeedItem>> {
            let consumed = self.consumed.lock().unwrap().clone();
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|item| !consumed.contains(&item.source.reference))
                .cloned()
                .collect())
        }

        async fn mark_consumed(&self, reference: &str) -> Result<()> {
            self.consumed.lock().unwrap().push(reference.to_string());
            Ok(())
        }
    }

    /// Static user-to-destination map.
    #[derive(Default)]
    pub struct MockDirectory {
        destinations: HashMap<String, String>,
    }

    impl MockDirectory {
        pub fn with(entries: &[(&str, &str)]) -> Self {
            Self {
                destinations: entries
                    .iter()
                    .map(|(user, dest)| (user.to_string(), dest.to_string()))
                    .collect(),
            }
        }
    }

    impl UserDirectory for MockDirectory {
        fn destination_for(&self, user_id: &str) -> Option<String> {
            self.destinations.get(user_id).cloned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_long_form_keeps_hashtags_separate() {
        let adapted = adapt_for_platform(
            "A considered take on async runtimes.",
            &tags(&["rust", "async"]),
            Platform::Linkedin,
        );
        assert_eq!(adapted.body, "A considered take on async runtimes.");
        assert_eq!(adapted.hashtags, tags(&["rust", "async"]));
    }

    #[test]
    fn test_short_form_folds_hashtags() {
        let adapted = adapt_for_platform("Short note.", &tags(&["rust", "tokio"]), Platform::Bluesky);
        assert_eq!(adapted.body, "Short note.\n\n#rust #tokio");
        assert!(adapted.hashtags.is_empty());
    }

    #[test]
    fn test_fold_normalizes_existing_hash_prefix() {
        let adapted = adapt_for_platform("Note.", &tags(&["#rust"]), Platform::Bluesky);
        assert_eq!(adapted.body, "Note.\n\n#rust");
    }

    #[test]
    fn test_fold_drops_trailing_hashtags_first() {
        // Body + all three tags overflows 280, but body + one tag fits.
        let text = "x".repeat(260);
        let adapted = adapt_for_platform(
            &text,
            &tags(&["alpha", "beta", "gamma"]),
            Platform::Bluesky,
        );
        assert!(adapted.body.chars().count() <= 280);
        assert!(adapted.body.contains("#alpha"));
        assert!(adapted.body.starts_with(&text));
    }

    #[test]
    fn test_overlong_text_truncated_keeps_first_hashtag() {
        let text = "y".repeat(300);
        let adapted = adapt_for_platform(
            &text,
            &tags(&["rust", "news", "daily"]),
            Platform::Bluesky,
        );
        assert!(adapted.body.chars().count() <= 280);
        assert!(adapted.body.contains("#rust"));
        assert!(adapted.body.contains('…'));
        assert!(adapted.hashtags.is_empty());
    }

    #[test]
    fn test_overlong_text_no_hashtags() {
        let text = "z".repeat(600);
        let adapted = adapt_for_platform(&text, &[], Platform::Mastodon);
        assert_eq!(adapted.body.chars().count(), 500);
        assert!(adapted.body.ends_with('…'));
    }

    #[test]
    fn test_exact_limit_untouched() {
        let text = "a".repeat(280);
        let adapted = adapt_for_platform(&text, &[], Platform::Bluesky);
        assert_eq!(adapted.body, text);
    }

    #[test]
    fn test_char_counting_is_unicode_aware() {
        // 300 multi-byte characters still reduce to <= 280 chars.
        let text = "é".repeat(300);
        let adapted = adapt_for_platform(&text, &tags(&["été"]), Platform::Bluesky);
        assert!(adapted.body.chars().count() <= 280);
        assert!(adapted.body.contains("#été"));
    }

    #[test]
    fn test_truncate_chars_boundary() {
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("hello!", 5), "hell…");
        assert_eq!(truncate_chars("hello", 0), "");
    }

    #[tokio::test]
    async fn test_mock_generator_success() {
        use crate::content::mock::MockGenerator;

        let generator = MockGenerator::success(vec!["rust".to_string()]);
        let source = SourceContent {
            reference: "item-1".to_string(),
            title: "Title".to_string(),
            summary: "Summary".to_string(),
            url: None,
        };

        let generated = generator
            .generate(&source, &GenerationPreferences::default())
            .await
            .unwrap();
        assert!(generated.text.contains("Title"));
        assert_eq!(generated.hashtags, vec!["rust".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_generator_failure() {
        use crate::content::mock::MockGenerator;

        let generator = MockGenerator::failure("model unavailable");
        let source = SourceContent {
            reference: "item-1".to_string(),
            title: "Title".to_string(),
            summary: "Summary".to_string(),
            url: None,
        };

        let err = generator
            .generate(&source, &GenerationPreferences::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model unavailable"));
    }
}
