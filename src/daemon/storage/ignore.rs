use std::collections::HashSet;

/// Canonical names of shell, taskbar and system UI processes. These never hold "real"
/// focus worth accounting, and `Unknown` covers failed foreground lookups.
pub const DEFAULT_IGNORED_APPS: &[&str] = &[
    "Explorer",
    "Windowsterminal",
    "Taskmgr",
    "Unknown",
    "Applicationframehost",
    "Runtimebroker",
    "Startmenuexperiencehost",
    "Searchexperiencehost",
    "Searchui",
    "Shellexperiencehost",
    "Systemsettings",
    "Textinputhost",
    "Ctfmon",
    "Dllhost",
    "Wwahost",
    "Yourphone",
    "Widgets",
];

/// Set of canonical application names that must never accrue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreSet {
    names: HashSet<String>,
}

impl IgnoreSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            names: HashSet::new(),
        }
    }

    pub fn contains(&self, app_name: &str) -> bool {
        self.names.contains(app_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_APPS.iter().copied())
    }
}
