use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationAction {
    /// Hand the link to the system browser.
    OpenExternal,
    /// Popup to the dApp's own origin: load it in the embedded view.
    NavigateInPlace,
    Deny,
}

/// Decides what to do with `window.open` / new-window requests from the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigationPolicy;

impl NavigationPolicy {
    pub fn decide(&self, target: &str, page_url: Option<&str>) -> NavigationAction {
        let Ok(target) = Url::parse(target) else {
            return NavigationAction::Deny;
        };
        if !is_web_scheme(&target) {
            return NavigationAction::Deny;
        }
        let same_origin = page_url
            .and_then(|raw| Url::parse(raw).ok())
            .is_some_and(|page| page.origin() == target.origin());
        if same_origin {
            NavigationAction::NavigateInPlace
        } else {
            NavigationAction::OpenExternal
        }
    }
}

pub fn is_web_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
