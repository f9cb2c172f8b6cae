//! Reader configuration loading and resolution.
//!
//! [`ReaderOptions`] is what the host supplies (TOML or code); every key is optional.
//! [`ReaderConfig`] is the resolved, immutable settings for one refresh.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use read_aloud_types::ActivationInfo;

use crate::document::Selector;
use crate::error::ReaderError;

pub const DEFAULT_SELECTOR: &str = ".audio-attach-paragraph";
pub const DEFAULT_INIT_MARKER_ATTRIBUTE: &str = "data-audio-gui-initialized";
pub const DEFAULT_AUDIO_URL_ATTRIBUTE: &str = "data-audio-url";
pub const DEFAULT_ACTIVE_CLASS: &str = "audio-attach-active";
pub const DEFAULT_ICON_SELECTOR: &str = ".audio-state-icon";
pub const DEFAULT_ICON_MARKUP: &str = "<b>▶️</b>";
pub const DEFAULT_ICON_ACTIVE_CLASS: &str = "audio-status-active";
pub const DEFAULT_ICON_INACTIVE_CLASS: &str = "audio-status-inactive";

/// Hook invoked when a slot starts playing or is torn down.
pub type Callback = Arc<dyn Fn(&ActivationInfo) + Send + Sync>;

/// Host-supplied settings. Missing or empty values fall back to the defaults.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderOptions {
    pub selector: Option<String>,
    pub init_marker_attribute: Option<String>,
    pub audio_url_attribute: Option<String>,
    pub active_class: Option<String>,
    pub icon_selector: Option<String>,
    pub icon_markup: Option<String>,
    pub icon_active_class: Option<String>,
    pub icon_inactive_class: Option<String>,
    #[serde(skip)]
    pub on_activate: Option<Callback>,
    #[serde(skip)]
    pub on_deactivate: Option<Callback>,
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("selector", &self.selector)
            .field("init_marker_attribute", &self.init_marker_attribute)
            .field("audio_url_attribute", &self.audio_url_attribute)
            .field("active_class", &self.active_class)
            .field("icon_selector", &self.icon_selector)
            .field("icon_markup", &self.icon_markup)
            .field("icon_active_class", &self.icon_active_class)
            .field("icon_inactive_class", &self.icon_inactive_class)
            .field("on_activate", &self.on_activate.is_some())
            .field("on_deactivate", &self.on_deactivate.is_some())
            .finish()
    }
}

impl ReaderOptions {
    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let options = toml::from_str::<ReaderOptions>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(options)
    }

    pub fn on_activate(mut self, hook: impl Fn(&ActivationInfo) + Send + Sync + 'static) -> Self {
        self.on_activate = Some(Arc::new(hook));
        self
    }

    pub fn on_deactivate(mut self, hook: impl Fn(&ActivationInfo) + Send + Sync + 'static) -> Self {
        self.on_deactivate = Some(Arc::new(hook));
        self
    }

    /// Merge with defaults and validate selectors.
    pub fn resolve(&self) -> Result<ReaderConfig, ReaderError> {
        let selector_src = pick(&self.selector, DEFAULT_SELECTOR);
        let selector = selector_src
            .parse::<Selector>()
            .map_err(|e| ReaderError::Configuration(e.to_string()))?;

        let icon_selector_src = pick(&self.icon_selector, DEFAULT_ICON_SELECTOR);
        let icon_class = icon_selector_src
            .strip_prefix('.')
            .unwrap_or(&icon_selector_src)
            .to_string();
        let icon_selector = icon_selector_src
            .parse::<Selector>()
            .map_err(|e| ReaderError::Configuration(e.to_string()))?;

        Ok(ReaderConfig {
            selector,
            init_marker_attribute: pick(&self.init_marker_attribute, DEFAULT_INIT_MARKER_ATTRIBUTE),
            audio_url_attribute: pick(&self.audio_url_attribute, DEFAULT_AUDIO_URL_ATTRIBUTE),
            active_class: pick(&self.active_class, DEFAULT_ACTIVE_CLASS),
            icon_selector,
            icon_class,
            icon_markup: pick(&self.icon_markup, DEFAULT_ICON_MARKUP),
            icon_active_class: pick(&self.icon_active_class, DEFAULT_ICON_ACTIVE_CLASS),
            icon_inactive_class: pick(&self.icon_inactive_class, DEFAULT_ICON_INACTIVE_CLASS),
            on_activate: self.on_activate.clone(),
            on_deactivate: self.on_deactivate.clone(),
        })
    }
}

fn pick(value: &Option<String>, default: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// Resolved settings, immutable for the lifetime of one refresh.
#[derive(Clone)]
pub struct ReaderConfig {
    pub selector: Selector,
    pub init_marker_attribute: String,
    pub audio_url_attribute: String,
    pub active_class: String,
    pub icon_selector: Selector,
    /// Class added to prepended icons (the icon selector without its leading `.`).
    pub icon_class: String,
    pub icon_markup: String,
    pub icon_active_class: String,
    pub icon_inactive_class: String,
    pub on_activate: Option<Callback>,
    pub on_deactivate: Option<Callback>,
}

impl fmt::Debug for ReaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderConfig")
            .field("selector", &self.selector.as_str())
            .field("init_marker_attribute", &self.init_marker_attribute)
            .field("audio_url_attribute", &self.audio_url_attribute)
            .field("active_class", &self.active_class)
            .field("icon_selector", &self.icon_selector.as_str())
            .field("icon_markup", &self.icon_markup)
            .field("icon_active_class", &self.icon_active_class)
            .field("icon_inactive_class", &self.icon_inactive_class)
            .finish_non_exhaustive()
    }
}

impl ReaderConfig {
    pub(crate) fn notify_activate(&self, info: &ActivationInfo) {
        if let Some(hook) = &self.on_activate {
            hook(info);
        }
    }

    pub(crate) fn notify_deactivate(&self, info: &ActivationInfo) {
        if let Some(hook) = &self.on_deactivate {
            hook(info);
        }
    }
}
