use crate::access::Operation;

/// The git transport programs the gateway is willing to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitService {
    UploadPack,
    ReceivePack,
    UploadArchive,
}

impl GitService {
    /// Parses a dashed program name such as `git-upload-pack`.
    pub fn from_command(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            "git-upload-archive" => Some(Self::UploadArchive),
            _ => None,
        }
    }

    /// Parses the `service` query parameter of a smart HTTP `info/refs`
    /// request. `upload-archive` has no HTTP transport.
    pub fn from_http_service(s: &str) -> Option<Self> {
        match Self::from_command(s)? {
            Self::UploadArchive => None,
            service => Some(service),
        }
    }

    pub fn command_name(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
            Self::UploadArchive => "git-upload-archive",
        }
    }

    /// Subcommand passed to the `git` executable.
    pub fn subcommand(&self) -> &'static str {
        match self {
            Self::UploadPack => "upload-pack",
            Self::ReceivePack => "receive-pack",
            Self::UploadArchive => "upload-archive",
        }
    }

    pub fn request_content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-request",
            Self::ReceivePack => "application/x-git-receive-pack-request",
            Self::UploadArchive => "application/x-git-upload-archive-request",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-result",
            Self::ReceivePack => "application/x-git-receive-pack-result",
            Self::UploadArchive => "application/x-git-upload-archive-result",
        }
    }

    pub fn advertisement_content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-advertisement",
            Self::ReceivePack => "application/x-git-receive-pack-advertisement",
            Self::UploadArchive => "application/x-git-upload-archive-advertisement",
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::UploadPack | Self::UploadArchive => Operation::Fetch,
            Self::ReceivePack => Operation::Push,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_service_from_command() {
        assert_eq!(
            GitService::from_command("git-upload-pack"),
            Some(GitService::UploadPack)
        );
        assert_eq!(
            GitService::from_command("git-receive-pack"),
            Some(GitService::ReceivePack)
        );
        assert_eq!(
            GitService::from_command("git-upload-archive"),
            Some(GitService::UploadArchive)
        );
        assert_eq!(GitService::from_command("git-frobnicate"), None);
        assert_eq!(GitService::from_command("upload-pack"), None);
    }

    #[test]
    fn test_http_service_excludes_archive() {
        assert_eq!(
            GitService::from_http_service("git-upload-pack"),
            Some(GitService::UploadPack)
        );
        assert_eq!(GitService::from_http_service("git-upload-archive"), None);
    }

    #[test]
    fn test_operation_mapping() {
        assert_eq!(GitService::UploadPack.operation(), Operation::Fetch);
        assert_eq!(GitService::UploadArchive.operation(), Operation::Fetch);
        assert_eq!(GitService::ReceivePack.operation(), Operation::Push);
    }
}
