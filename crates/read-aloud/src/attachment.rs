//! Attachment marking and decoration.
//!
//! The init marker is an attribute on the element itself, so the element is the identity
//! and a marked element is never decorated twice.

use crate::config::ReaderConfig;
use crate::document::{Document, ElementId};
use crate::error::ReaderError;

const MARKER_VALUE: &str = "true";

/// An element that carries the init marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Attachment {
    element: ElementId,
}

impl Attachment {
    pub fn element(&self) -> ElementId {
        self.element
    }
}

/// Outcome of one refresh pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Elements matching the selector.
    pub matched: usize,
    /// Elements decorated during this pass.
    pub decorated: usize,
}

#[derive(Debug, Default)]
pub struct AttachmentRegistry;

impl AttachmentRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Reject a config whose icon markup the document cannot insert.
    pub fn validate(&self, doc: &dyn Document, config: &ReaderConfig) -> Result<(), ReaderError> {
        doc.check_markup(&config.icon_markup)
            .map_err(|e| ReaderError::Configuration(e.to_string()))
    }

    /// Decorate every unmarked element matching the selector and mark it.
    pub fn refresh(&self, doc: &dyn Document, config: &ReaderConfig) -> Result<RefreshReport, ReaderError> {
        self.validate(doc, config)?;
        let mut report = RefreshReport::default();
        for el in doc.select(&config.selector) {
            report.matched += 1;
            if is_marked(doc, config, el) {
                continue;
            }
            let icon = doc
                .prepend(el, &config.icon_markup, &config.icon_class)
                .map_err(|e| ReaderError::Configuration(e.to_string()))?;
            doc.add_class(icon, &config.icon_inactive_class)
                .map_err(|e| ReaderError::Configuration(e.to_string()))?;
            doc.set_attr(el, &config.init_marker_attribute, MARKER_VALUE)
                .map_err(|e| ReaderError::Configuration(e.to_string()))?;
            tracing::debug!(element = %el, "decorated attachment");
            report.decorated += 1;
        }
        tracing::info!(
            selector = %config.selector,
            matched = report.matched,
            decorated = report.decorated,
            "attachments refreshed"
        );
        Ok(report)
    }

    /// Resolve `el` as an attachment; unmarked elements are a configuration error.
    pub fn attachment(
        &self,
        doc: &dyn Document,
        config: &ReaderConfig,
        el: ElementId,
    ) -> Result<Attachment, ReaderError> {
        if !is_marked(doc, config, el) {
            return Err(ReaderError::Configuration(format!(
                "element {el} is not initialized (missing {})",
                config.init_marker_attribute
            )));
        }
        Ok(Attachment { element: el })
    }
}

pub(crate) fn is_marked(doc: &dyn Document, config: &ReaderConfig, el: ElementId) -> bool {
    doc.attr(el, &config.init_marker_attribute)
        .is_some_and(|v| !v.is_empty())
}

/// Audio URL of `attachment`; missing or blank values are rejected.
pub(crate) fn audio_url(
    doc: &dyn Document,
    config: &ReaderConfig,
    attachment: &Attachment,
) -> Result<String, ReaderError> {
    let el = attachment.element();
    if !is_marked(doc, config, el) {
        return Err(ReaderError::Configuration(format!(
            "element {el} is not initialized"
        )));
    }
    match doc.attr(el, &config.audio_url_attribute) {
        Some(url) if !url.trim().is_empty() => Ok(url.trim().to_string()),
        _ => Err(ReaderError::InvalidUrl { element: el }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderOptions;
    use crate::document::MemoryDocument;

    fn page() -> (MemoryDocument, ElementId, ElementId, ElementId) {
        let doc = MemoryDocument::new();
        let a = doc.append(doc.root(), "p").unwrap();
        doc.add_class(a, "audio-attach-paragraph").unwrap();
        doc.set_attr(a, "data-audio-url", "a.mp3").unwrap();
        let b = doc.append(doc.root(), "p").unwrap();
        doc.add_class(b, "audio-attach-paragraph").unwrap();
        doc.set_attr(b, "data-audio-url", "b.mp3").unwrap();
        let plain = doc.append(doc.root(), "p").unwrap();
        (doc, a, b, plain)
    }

    fn icons(doc: &MemoryDocument, el: ElementId, config: &ReaderConfig) -> usize {
        doc.find(el, &config.icon_selector).len()
    }

    #[test]
    fn refresh_marks_and_decorates_matches_once() {
        let (doc, a, b, plain) = page();
        let config = ReaderOptions::default().resolve().unwrap();
        let registry = AttachmentRegistry::new();

        let first = registry.refresh(&doc, &config).unwrap();
        assert_eq!(first, RefreshReport { matched: 2, decorated: 2 });
        for _ in 0..3 {
            let again = registry.refresh(&doc, &config).unwrap();
            assert_eq!(again, RefreshReport { matched: 2, decorated: 0 });
        }

        for el in [a, b] {
            assert_eq!(doc.attr(el, "data-audio-gui-initialized").as_deref(), Some("true"));
            assert_eq!(icons(&doc, el, &config), 1);
            let icon = doc.children(el)[0];
            assert!(doc.has_class(icon, "audio-status-inactive"));
        }
        assert!(doc.attr(plain, "data-audio-gui-initialized").is_none());
        assert_eq!(icons(&doc, plain, &config), 0);
    }

    #[test]
    fn premarked_elements_are_not_decorated() {
        let (doc, a, _, _) = page();
        doc.set_attr(a, "data-audio-gui-initialized", "true").unwrap();
        let config = ReaderOptions::default().resolve().unwrap();

        let report = AttachmentRegistry::new().refresh(&doc, &config).unwrap();
        assert_eq!(report.decorated, 1);
        assert_eq!(icons(&doc, a, &config), 0);
    }

    #[test]
    fn broken_icon_markup_is_configuration_error() {
        let (doc, _, _, _) = page();
        let config = ReaderOptions {
            icon_markup: Some("<b>".to_string()),
            ..ReaderOptions::default()
        }
        .resolve()
        .unwrap();
        assert!(matches!(
            AttachmentRegistry::new().refresh(&doc, &config),
            Err(ReaderError::Configuration(_))
        ));
    }

    #[test]
    fn attachment_requires_marker() {
        let (doc, a, _, plain) = page();
        let config = ReaderOptions::default().resolve().unwrap();
        let registry = AttachmentRegistry::new();
        registry.refresh(&doc, &config).unwrap();

        assert_eq!(registry.attachment(&doc, &config, a).unwrap().element(), a);
        assert!(matches!(
            registry.attachment(&doc, &config, plain),
            Err(ReaderError::Configuration(_))
        ));
    }

    #[test]
    fn audio_url_rejects_missing_and_blank() {
        let (doc, a, b, _) = page();
        let config = ReaderOptions::default().resolve().unwrap();
        let registry = AttachmentRegistry::new();
        registry.refresh(&doc, &config).unwrap();
        doc.set_attr(b, "data-audio-url", "  ").unwrap();

        let att_a = registry.attachment(&doc, &config, a).unwrap();
        let att_b = registry.attachment(&doc, &config, b).unwrap();
        assert_eq!(audio_url(&doc, &config, &att_a).unwrap(), "a.mp3");
        assert_eq!(
            audio_url(&doc, &config, &att_b),
            Err(ReaderError::InvalidUrl { element: b })
        );
    }
}
