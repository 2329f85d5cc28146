//! Static route classification.

/// The sign-in page.
pub const SIGN_IN_PATH: &str = "/sign-in";

/// Application root, the default landing page after sign-in.
pub const ROOT_PATH: &str = "/";

/// How the guard treats a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Reachable without a session (the sign-in page)
    Public,
    /// Everything else
    Protected,
}

/// Which paths are public, which are never remembered for after sign-in,
/// and which the guard does not look at at all.
#[derive(Debug, Clone)]
pub struct RouteRules {
    /// Where unauthenticated users are sent
    pub sign_in_path: String,
    /// Paths served without a session
    pub public_paths: Vec<String>,
    /// Paths never stored in the `lastUrl` cookie
    pub redirect_excluded: Vec<String>,
    /// Path prefixes the guard skips (matched per segment)
    pub unguarded_prefixes: Vec<String>,
    /// Exact paths the guard skips
    pub unguarded_files: Vec<String>,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self {
            sign_in_path: SIGN_IN_PATH.to_string(),
            public_paths: vec![SIGN_IN_PATH.to_string()],
            redirect_excluded: vec![ROOT_PATH.to_string(), SIGN_IN_PATH.to_string()],
            unguarded_prefixes: vec![
                "/api".to_string(),
                "/_next/static".to_string(),
                "/_next/image".to_string(),
            ],
            unguarded_files: vec![
                "/favicon.ico".to_string(),
                "/sitemap.xml".to_string(),
                "/robots.txt".to_string(),
            ],
        }
    }
}

impl RouteRules {
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.public_paths.iter().any(|p| p == path) {
            RouteClass::Public
        } else {
            RouteClass::Protected
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.classify(path) == RouteClass::Public
    }

    pub fn is_redirect_excluded(&self, path: &str) -> bool {
        self.redirect_excluded.iter().any(|p| p == path)
    }

    /// Whether the guard runs for this path at all.
    pub fn is_guarded(&self, path: &str) -> bool {
        if self.unguarded_files.iter().any(|f| f == path) {
            return false;
        }
        !self.unguarded_prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}
