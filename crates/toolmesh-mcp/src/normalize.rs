use crate::protocol::ContentItem;
use toolmesh_core::ContentSegment;
use tracing::warn;

/// Converts polymorphic tool result content into [`ContentSegment`]s.
pub struct ContentNormalizer;

impl ContentNormalizer {
    /// Maps one content item to its segment. Unknown kinds yield `None`.
    pub fn normalize(item: &ContentItem) -> Option<ContentSegment> {
        match item {
            ContentItem::Text { text } | ContentItem::EmbeddedText { text, .. } => {
                Some(ContentSegment::text(text.clone()))
            }
            ContentItem::Image { data, mime_type } => {
                Some(ContentSegment::image(mime_type.as_deref(), data))
            }
            ContentItem::EmbeddedBinary {
                blob, mime_type, ..
            } => Some(ContentSegment::image(mime_type.as_deref(), blob)),
            ContentItem::Unknown { .. } => None,
        }
    }

    /// Normalizes a whole result in order, logging anything that is dropped.
    pub fn normalize_all(server: &str, tool: &str, items: &[ContentItem]) -> Vec<ContentSegment> {
        items
            .iter()
            .filter_map(|item| {
                let segment = Self::normalize(item);
                if segment.is_none() {
                    warn!(server, tool, kind = item.kind(), "Unsupported MCP content type dropped");
                }
                segment
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_text_and_embedded_text() {
        let seg = ContentNormalizer::normalize(&ContentItem::Text { text: "72F".into() });
        assert_eq!(seg, Some(ContentSegment::text("72F")));

        let seg = ContentNormalizer::normalize(&ContentItem::EmbeddedText {
            uri: Some("file:///notes.md".into()),
            text: "# Notes".into(),
        });
        assert_eq!(seg, Some(ContentSegment::text("# Notes")));
    }

    #[test]
    fn test_image_keeps_declared_mime() {
        let seg = ContentNormalizer::normalize(&ContentItem::Image {
            data: "iVBOR".into(),
            mime_type: Some("image/png".into()),
        })
        .unwrap();
        assert_eq!(seg.as_image_url(), Some("data:image/png;base64,iVBOR"));
    }

    #[test]
    fn test_binary_resource_defaults_mime() {
        let seg = ContentNormalizer::normalize(&ContentItem::EmbeddedBinary {
            uri: None,
            blob: "AAEC".into(),
            mime_type: None,
        })
        .unwrap();
        assert_eq!(
            seg.as_image_url(),
            Some("data:application/octet-stream;base64,AAEC")
        );
    }

    #[test]
    fn test_unknown_kind_is_dropped_without_failing() {
        let items = vec![
            ContentItem::Text { text: "a".into() },
            ContentItem::Unknown {
                kind: "audio".into(),
            },
            ContentItem::Text { text: "b".into() },
        ];
        let segments = ContentNormalizer::normalize_all("media", "record", &items);
        assert_eq!(
            segments,
            vec![ContentSegment::text("a"), ContentSegment::text("b")]
        );
    }
}
