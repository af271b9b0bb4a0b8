//! Client settings with thread-scoped overrides.
//!
//! A [`Settings`] instance holds the process-wide defaults for one client
//! session. Any option can be shadowed for the current thread only via
//! [`Settings::override_scope`], which returns a guard; when the guard drops
//! the previous visible values are restored. Defaults are shared read-only
//! across threads, overrides are never visible outside the thread that set
//! them.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default option values for a client session.
///
/// Loadable from YAML in the usual `#[serde(default)]` per-field style, so a
/// partial config file only names the options it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsData {
    /// Strict XML parsing; when false the parser runs in a lenient mode
    /// that tolerates sloppy markup where it can.
    pub strict: bool,

    /// Skip parsing of the response envelope and hand back the raw body.
    pub raw_response: bool,

    /// Force all connections to HTTPS if the service definition was also
    /// loaded from an HTTPS endpoint.
    pub force_https: bool,

    /// Additional HTTP headers merged into every outgoing request.
    pub extra_http_headers: HashMap<String, String>,

    /// Disable parser size restrictions (depth and text-length caps).
    pub xml_huge_tree: bool,

    /// Disallow XML with a `<!DOCTYPE>` declaration.
    pub forbid_dtd: bool,

    /// Disallow `<!ENTITY>` declarations inside the DTD.
    pub forbid_entities: bool,

    /// Disallow external resource references in entities or the DTD.
    pub forbid_external: bool,

    /// Do not enforce sequence order when the XSD binding layer parses
    /// complex types. Read by that layer, not by this core.
    pub xsd_ignore_sequence_order: bool,

    /// Namespace prefix used when constructing envelopes.
    pub soap_env_prefix: String,
}

impl Default for SettingsData {
    fn default() -> Self {
        Self {
            strict: true,
            raw_response: false,
            force_https: true,
            extra_http_headers: HashMap::new(),
            xml_huge_tree: false,
            forbid_dtd: false,
            forbid_entities: true,
            forbid_external: true,
            xsd_ignore_sequence_order: false,
            soap_env_prefix: "soap-env".to_string(),
        }
    }
}

/// Identifies one option in the override store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OptionKey {
    Strict,
    RawResponse,
    ForceHttps,
    ExtraHttpHeaders,
    XmlHugeTree,
    ForbidDtd,
    ForbidEntities,
    ForbidExternal,
    XsdIgnoreSequenceOrder,
    SoapEnvPrefix,
}

/// A single option value, typed per option.
#[derive(Debug, Clone, PartialEq)]
enum OptionValue {
    Bool(bool),
    Str(String),
    Headers(HashMap<String, String>),
}

impl OptionValue {
    fn as_bool(&self) -> bool {
        match self {
            OptionValue::Bool(b) => *b,
            _ => unreachable!("option stored with the wrong type"),
        }
    }

    fn into_string(self) -> String {
        match self {
            OptionValue::Str(s) => s,
            _ => unreachable!("option stored with the wrong type"),
        }
    }

    fn into_headers(self) -> HashMap<String, String> {
        match self {
            OptionValue::Headers(h) => h,
            _ => unreachable!("option stored with the wrong type"),
        }
    }
}

thread_local! {
    // Keyed by (settings instance id, option) so independent Settings
    // instances on the same thread never collide.
    static OVERRIDES: RefCell<HashMap<(u64, OptionKey), OptionValue>> =
        RefCell::new(HashMap::new());
}

static NEXT_SETTINGS_ID: AtomicU64 = AtomicU64::new(0);

/// Settings for one client session: shared defaults plus a thread-local
/// override overlay.
#[derive(Debug)]
pub struct Settings {
    defaults: SettingsData,
    id: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(SettingsData::default())
    }
}

impl From<SettingsData> for Settings {
    fn from(data: SettingsData) -> Self {
        Self::new(data)
    }
}

impl Settings {
    /// Create settings with the given defaults.
    pub fn new(defaults: SettingsData) -> Self {
        Self {
            defaults,
            id: NEXT_SETTINGS_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The shared default values, ignoring any active overrides.
    pub fn defaults(&self) -> &SettingsData {
        &self.defaults
    }

    fn default_value(&self, key: OptionKey) -> OptionValue {
        match key {
            OptionKey::Strict => OptionValue::Bool(self.defaults.strict),
            OptionKey::RawResponse => OptionValue::Bool(self.defaults.raw_response),
            OptionKey::ForceHttps => OptionValue::Bool(self.defaults.force_https),
            OptionKey::ExtraHttpHeaders => {
                OptionValue::Headers(self.defaults.extra_http_headers.clone())
            }
            OptionKey::XmlHugeTree => OptionValue::Bool(self.defaults.xml_huge_tree),
            OptionKey::ForbidDtd => OptionValue::Bool(self.defaults.forbid_dtd),
            OptionKey::ForbidEntities => OptionValue::Bool(self.defaults.forbid_entities),
            OptionKey::ForbidExternal => OptionValue::Bool(self.defaults.forbid_external),
            OptionKey::XsdIgnoreSequenceOrder => {
                OptionValue::Bool(self.defaults.xsd_ignore_sequence_order)
            }
            OptionKey::SoapEnvPrefix => OptionValue::Str(self.defaults.soap_env_prefix.clone()),
        }
    }

    /// The value visible to the current thread: its override if one is set,
    /// else the shared default. Never fails.
    fn visible(&self, key: OptionKey) -> OptionValue {
        OVERRIDES
            .with(|o| o.borrow().get(&(self.id, key)).cloned())
            .unwrap_or_else(|| self.default_value(key))
    }

    pub fn strict(&self) -> bool {
        self.visible(OptionKey::Strict).as_bool()
    }

    pub fn raw_response(&self) -> bool {
        self.visible(OptionKey::RawResponse).as_bool()
    }

    pub fn force_https(&self) -> bool {
        self.visible(OptionKey::ForceHttps).as_bool()
    }

    pub fn extra_http_headers(&self) -> HashMap<String, String> {
        self.visible(OptionKey::ExtraHttpHeaders).into_headers()
    }

    pub fn xml_huge_tree(&self) -> bool {
        self.visible(OptionKey::XmlHugeTree).as_bool()
    }

    pub fn forbid_dtd(&self) -> bool {
        self.visible(OptionKey::ForbidDtd).as_bool()
    }

    pub fn forbid_entities(&self) -> bool {
        self.visible(OptionKey::ForbidEntities).as_bool()
    }

    pub fn forbid_external(&self) -> bool {
        self.visible(OptionKey::ForbidExternal).as_bool()
    }

    pub fn xsd_ignore_sequence_order(&self) -> bool {
        self.visible(OptionKey::XsdIgnoreSequenceOrder).as_bool()
    }

    pub fn soap_env_prefix(&self) -> String {
        self.visible(OptionKey::SoapEnvPrefix).into_string()
    }

    /// Install thread-local overrides for the dynamic extent of the returned
    /// guard.
    ///
    /// On entry the currently visible value of each named option is saved and
    /// the override installed. When the guard drops, a saved value equal to
    /// the *default* clears the override entirely (subsequent reads fall
    /// through to the default again); any other saved value is reinstated as
    /// the override. Comparing against the default rather than the entry-time
    /// override is what makes `override_scope` round-trip when an option is
    /// set to exactly its default inside a scope, and what lets nested scopes
    /// compose.
    ///
    /// ```
    /// use soap_client::settings::{Overrides, Settings};
    ///
    /// let settings = Settings::default();
    /// assert!(settings.force_https());
    /// {
    ///     let _scope = settings.override_scope(Overrides::new().force_https(false));
    ///     assert!(!settings.force_https());
    /// }
    /// assert!(settings.force_https());
    /// ```
    pub fn override_scope(&self, overrides: Overrides) -> SettingsGuard<'_> {
        let mut saved = Vec::with_capacity(overrides.entries.len());
        OVERRIDES.with(|o| {
            let mut map = o.borrow_mut();
            for (key, value) in overrides.entries {
                // When one scope names an option twice, the last value wins
                // but the restore point stays the pre-scope value.
                if !saved.iter().any(|(saved_key, _)| *saved_key == key) {
                    let entry_value = map
                        .get(&(self.id, key))
                        .cloned()
                        .unwrap_or_else(|| self.default_value(key));
                    saved.push((key, entry_value));
                }
                map.insert((self.id, key), value);
            }
        });
        SettingsGuard {
            settings: self,
            saved,
            _not_send: PhantomData,
        }
    }
}

impl Drop for Settings {
    fn drop(&mut self) {
        // Clear any overrides this thread still holds for the instance; ids
        // are never reused so stale entries for other threads are inert.
        let id = self.id;
        let _ = OVERRIDES.try_with(|o| {
            o.borrow_mut().retain(|(owner, _), _| *owner != id);
        });
    }
}

/// A set of option overrides to install with [`Settings::override_scope`].
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    entries: Vec<(OptionKey, OptionValue)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, key: OptionKey, value: OptionValue) -> Self {
        self.entries.push((key, value));
        self
    }

    pub fn strict(self, value: bool) -> Self {
        self.set(OptionKey::Strict, OptionValue::Bool(value))
    }

    pub fn raw_response(self, value: bool) -> Self {
        self.set(OptionKey::RawResponse, OptionValue::Bool(value))
    }

    pub fn force_https(self, value: bool) -> Self {
        self.set(OptionKey::ForceHttps, OptionValue::Bool(value))
    }

    pub fn extra_http_headers(self, value: HashMap<String, String>) -> Self {
        self.set(OptionKey::ExtraHttpHeaders, OptionValue::Headers(value))
    }

    pub fn xml_huge_tree(self, value: bool) -> Self {
        self.set(OptionKey::XmlHugeTree, OptionValue::Bool(value))
    }

    pub fn forbid_dtd(self, value: bool) -> Self {
        self.set(OptionKey::ForbidDtd, OptionValue::Bool(value))
    }

    pub fn forbid_entities(self, value: bool) -> Self {
        self.set(OptionKey::ForbidEntities, OptionValue::Bool(value))
    }

    pub fn forbid_external(self, value: bool) -> Self {
        self.set(OptionKey::ForbidExternal, OptionValue::Bool(value))
    }

    pub fn xsd_ignore_sequence_order(self, value: bool) -> Self {
        self.set(OptionKey::XsdIgnoreSequenceOrder, OptionValue::Bool(value))
    }

    pub fn soap_env_prefix(self, value: impl Into<String>) -> Self {
        self.set(OptionKey::SoapEnvPrefix, OptionValue::Str(value.into()))
    }
}

/// Guard returned by [`Settings::override_scope`]. Restores the previous
/// visible values on drop, including on unwind.
///
/// Not `Send`: the guard must drop on the thread that created it, since the
/// overrides it manages are thread-local.
#[must_use = "overrides are removed as soon as the guard is dropped"]
pub struct SettingsGuard<'a> {
    settings: &'a Settings,
    saved: Vec<(OptionKey, OptionValue)>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for SettingsGuard<'_> {
    fn drop(&mut self) {
        let _ = OVERRIDES.try_with(|o| {
            let mut map = o.borrow_mut();
            for (key, value) in self.saved.drain(..) {
                if value == self.settings.default_value(key) {
                    map.remove(&(self.settings.id, key));
                } else {
                    map.insert((self.settings.id, key), value);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.strict());
        assert!(!settings.raw_response());
        assert!(settings.force_https());
        assert!(!settings.forbid_dtd());
        assert!(settings.forbid_entities());
        assert!(settings.forbid_external());
        assert!(!settings.xml_huge_tree());
        assert_eq!(settings.soap_env_prefix(), "soap-env");
        assert!(settings.extra_http_headers().is_empty());
    }

    #[test]
    fn test_override_visible_within_scope_only() {
        let settings = Settings::default();
        {
            let _scope = settings.override_scope(Overrides::new().force_https(false));
            assert!(!settings.force_https());
        }
        assert!(settings.force_https());
    }

    #[test]
    fn test_nested_scopes_restore_in_order() {
        let settings = Settings::default();
        {
            let _outer = settings.override_scope(Overrides::new().soap_env_prefix("outer"));
            assert_eq!(settings.soap_env_prefix(), "outer");
            {
                let _inner = settings.override_scope(Overrides::new().soap_env_prefix("inner"));
                assert_eq!(settings.soap_env_prefix(), "inner");
            }
            assert_eq!(settings.soap_env_prefix(), "outer");
        }
        assert_eq!(settings.soap_env_prefix(), "soap-env");
    }

    #[test]
    fn test_override_equal_to_default_leaves_no_residue() {
        let settings = Settings::default();
        {
            let _outer = settings.override_scope(Overrides::new().strict(false));
            {
                // Inner scope sets the option back to its default value.
                let _inner = settings.override_scope(Overrides::new().strict(true));
                assert!(settings.strict());
            }
            // Outer override must survive the inner scope's exit.
            assert!(!settings.strict());
        }
        assert!(settings.strict());
    }

    #[test]
    fn test_duplicate_option_in_one_scope_fully_unwinds() {
        let settings = Settings::default();
        {
            let _scope = settings.override_scope(Overrides::new().strict(false).strict(true));
            // The last value named for the option wins inside the scope.
            assert!(settings.strict());
        }
        // The restore point is the pre-scope value, not the mid-scope one.
        assert!(settings.strict());
        {
            let _scope = settings
                .override_scope(Overrides::new().soap_env_prefix("s").soap_env_prefix("env"));
            assert_eq!(settings.soap_env_prefix(), "env");
        }
        assert_eq!(settings.soap_env_prefix(), "soap-env");
    }

    #[test]
    fn test_setting_default_value_in_single_scope_round_trips() {
        let settings = Settings::default();
        {
            let _scope = settings.override_scope(Overrides::new().force_https(true));
            assert!(settings.force_https());
        }
        // Exit must fall through to the default rather than pin an override.
        assert!(settings.force_https());
    }

    #[test]
    fn test_multiple_options_in_one_scope() {
        let settings = Settings::default();
        let mut extra = HashMap::new();
        extra.insert("Authorization".to_string(), "Bearer t".to_string());
        {
            let _scope = settings.override_scope(
                Overrides::new()
                    .raw_response(true)
                    .extra_http_headers(extra.clone()),
            );
            assert!(settings.raw_response());
            assert_eq!(settings.extra_http_headers(), extra);
        }
        assert!(!settings.raw_response());
        assert!(settings.extra_http_headers().is_empty());
    }

    #[test]
    fn test_overrides_invisible_across_threads() {
        let settings = Settings::default();
        let _scope = settings.override_scope(Overrides::new().force_https(false));
        assert!(!settings.force_https());

        std::thread::scope(|s| {
            s.spawn(|| {
                // The sibling thread sees only the shared default.
                assert!(settings.force_https());
            });
        });

        assert!(!settings.force_https());
    }

    #[test]
    fn test_independent_instances_do_not_collide() {
        let a = Settings::default();
        let b = Settings::default();
        let _scope = a.override_scope(Overrides::new().strict(false));
        assert!(!a.strict());
        assert!(b.strict());
    }

    #[test]
    fn test_non_default_defaults_round_trip() {
        let settings = Settings::new(SettingsData {
            force_https: false,
            ..SettingsData::default()
        });
        {
            let _scope = settings.override_scope(Overrides::new().force_https(true));
            assert!(settings.force_https());
        }
        assert!(!settings.force_https());
    }

    #[test]
    fn test_settings_data_from_yaml() {
        let yaml = r#"
strict: false
force_https: false
extra_http_headers:
  X-Correlation-Id: abc123
"#;
        let data: SettingsData = serde_yaml::from_str(yaml).unwrap();
        assert!(!data.strict);
        assert!(!data.force_https);
        // Unnamed options keep their defaults.
        assert!(data.forbid_entities);
        assert_eq!(data.soap_env_prefix, "soap-env");
        assert_eq!(
            data.extra_http_headers.get("X-Correlation-Id").unwrap(),
            "abc123"
        );
    }
}
