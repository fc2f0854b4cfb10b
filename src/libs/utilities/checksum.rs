// SHA-256 hashing for download verification and metadata records.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Streams a file through SHA-256 and returns the lowercase hex digest.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// Hashes an in-memory buffer; used by tests and small payloads.
pub fn sha256_bytes(data: &[u8]) -> String {
    hex_encode(&Sha256::digest(data))
}

fn hex_encode(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Case-insensitive digest comparison; expected values copied out of
/// release pages come in both cases.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn file_and_buffer_digests_agree() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"vman test payload").unwrap();
        tmp.flush().unwrap();

        assert_eq!(
            sha256_file(tmp.path()).unwrap(),
            sha256_bytes(b"vman test payload")
        );
    }

    #[test]
    fn comparison_ignores_case_and_whitespace() {
        assert!(digests_match("ABCDEF", " abcdef "));
        assert!(!digests_match("abcdef", "abcde0"));
    }
}
