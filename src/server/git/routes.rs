use std::sync::LazyLock;

use axum::http::Method;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    UploadPack,
    ReceivePack,
    InfoRefs,
    Head,
    /// `alternates`, `http-alternates` and other files under `objects/info`.
    InfoFile,
    InfoPacks,
    LooseObject,
    Pack,
    PackIndex,
}

impl RouteKind {
    pub fn method(self) -> Method {
        match self {
            Self::UploadPack | Self::ReceivePack => Method::POST,
            _ => Method::GET,
        }
    }

    /// Content type for files served directly from the repository.
    pub fn file_content_type(self) -> &'static str {
        match self {
            Self::InfoRefs | Self::InfoPacks => "text/plain; charset=utf-8",
            Self::LooseObject => "application/x-git-loose-object",
            Self::Pack => "application/x-git-packed-objects",
            Self::PackIndex => "application/x-git-packed-objects-toc",
            _ => "text/plain",
        }
    }

    /// Objects and packs are content-addressed and never change.
    pub fn is_immutable(self) -> bool {
        matches!(self, Self::LooseObject | Self::Pack | Self::PackIndex)
    }
}

/// A request path split into the repository prefix and the file inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub kind: RouteKind,
    pub repository: String,
    pub file: String,
}

// Order matters: `objects/info/packs` must win over `objects/info/<name>`.
static ROUTES: LazyLock<Vec<(Regex, RouteKind)>> = LazyLock::new(|| {
    [
        (r"git-upload-pack", RouteKind::UploadPack),
        (r"git-receive-pack", RouteKind::ReceivePack),
        (r"info/refs", RouteKind::InfoRefs),
        (r"HEAD", RouteKind::Head),
        (r"objects/info/alternates", RouteKind::InfoFile),
        (r"objects/info/http-alternates", RouteKind::InfoFile),
        (r"objects/info/packs", RouteKind::InfoPacks),
        (r"objects/info/[^/]+", RouteKind::InfoFile),
        (r"objects/[0-9a-f]{2}/[0-9a-f]{38}", RouteKind::LooseObject),
        (r"objects/pack/pack-[0-9a-f]{40}\.pack", RouteKind::Pack),
        (r"objects/pack/pack-[0-9a-f]{40}\.idx", RouteKind::PackIndex),
    ]
    .into_iter()
    .map(|(suffix, kind)| {
        let pattern = format!(r"^/?(?P<repo>.+?)/(?P<file>{suffix})$");
        (Regex::new(&pattern).expect("static route pattern"), kind)
    })
    .collect()
});

/// First matching route wins.
pub fn resolve(path: &str) -> Option<RouteMatch> {
    ROUTES.iter().find_map(|(re, kind)| {
        let caps = re.captures(path)?;
        Some(RouteMatch {
            kind: *kind,
            repository: caps["repo"].to_string(),
            file: caps["file"].to_string(),
        })
    })
}
