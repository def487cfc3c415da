//! Git pkt-line framing, encode side only.
//!
//! Each line is prefixed with its total length (payload plus the 4 prefix
//! bytes) as 4 lowercase hex digits. `0000` is the flush packet.

use crate::error::{Error, Result};
use crate::git::GitService;

/// Largest payload a single pkt-line can carry (0xffff minus the prefix).
pub const MAX_PAYLOAD_LEN: usize = 0xffff - 4;

const FLUSH: &[u8; 4] = b"0000";

/// Frames `payload` as one pkt-line.
pub fn encode(payload: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    let payload = payload.as_ref();
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::BadRequest(format!(
            "pkt-line payload of {} bytes exceeds {MAX_PAYLOAD_LEN}",
            payload.len()
        )));
    }

    let mut line = format!("{:04x}", payload.len() + 4).into_bytes();
    line.extend_from_slice(payload);
    Ok(line)
}

#[must_use]
pub fn flush() -> Vec<u8> {
    FLUSH.to_vec()
}

/// The `# service=git-<rpc>` header and flush that open a smart `info/refs`
/// response.
pub fn service_announcement(service: GitService) -> Result<Vec<u8>> {
    let mut header = encode(format!("# service={}\n", service.command_name()))?;
    header.extend_from_slice(FLUSH);
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_service_line() {
        let line = encode("# service=git-upload-pack\n").unwrap();
        assert_eq!(line, b"001e# service=git-upload-pack\n");
        assert_eq!(line.len(), 30);
    }

    #[test]
    fn test_encode_pads_to_four_digits() {
        assert_eq!(encode("").unwrap(), b"0004");
        assert_eq!(encode("a\n").unwrap(), b"0006a\n");
        assert_eq!(encode(vec![b'x'; 252]).unwrap()[..4], *b"0100");
    }

    #[test]
    fn test_encode_is_lowercase_hex() {
        let line = encode(vec![b'x'; 6]).unwrap();
        assert_eq!(&line[..4], b"000a");
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        assert!(encode(vec![0u8; MAX_PAYLOAD_LEN]).is_ok());
        assert!(encode(vec![0u8; MAX_PAYLOAD_LEN + 1]).is_err());
    }

    #[test]
    fn test_flush() {
        assert_eq!(flush(), b"0000");
    }

    #[test]
    fn test_service_announcement() {
        let header = service_announcement(GitService::UploadPack).unwrap();
        assert_eq!(header, b"001e# service=git-upload-pack\n0000");

        let header = service_announcement(GitService::ReceivePack).unwrap();
        assert!(header.starts_with(b"001f# service=git-receive-pack\n"));
        assert!(header.ends_with(b"0000"));
    }
}
