//! Pre-download registry/URI trust checks and the post-download digest
//! check (spec.md §4.3).

use crate::error::{Error, Result};
use crate::model::ArtifactDescriptor;
use plugin_common::sha256::hex_digest_from_bytes;

const LOCAL_FILE_SCHEME: &str = "file://";

/// Verifies registry/URI trust before download and digest integrity after.
pub struct TrustVerifier {
    trusted_registries: Vec<String>,
    trusted_uri_prefixes: Vec<String>,
}

impl TrustVerifier {
    pub fn new(trusted_registries: Vec<String>, trusted_uri_prefixes: Vec<String>) -> Self {
        Self {
            trusted_registries,
            trusted_uri_prefixes,
        }
    }

    /// Pre-download check: the descriptor's image must match a trusted
    /// registry prefix, or its URI must be a local file (implicitly
    /// trusted) or match a trusted URI prefix.
    pub fn check_pre_download(&self, name: &str, descriptor: &ArtifactDescriptor) -> Result<()> {
        if let Some(image) = &descriptor.image {
            if self
                .trusted_registries
                .iter()
                .any(|prefix| image.starts_with(prefix.as_str()))
            {
                return Ok(());
            }
            return Err(Error::UntrustedRegistry {
                image: image.clone(),
                allow_list: self.trusted_registries.clone(),
            });
        }

        if let Some(uri) = &descriptor.uri {
            if uri.starts_with(LOCAL_FILE_SCHEME) {
                return Ok(());
            }
            if self
                .trusted_uri_prefixes
                .iter()
                .any(|prefix| uri.starts_with(prefix.as_str()))
            {
                return Ok(());
            }
            return Err(Error::UntrustedUri {
                uri: uri.clone(),
                allow_list: self.trusted_uri_prefixes.clone(),
            });
        }

        Err(Error::NoDownloadInformation(name.to_owned()))
    }

    /// Post-download check: if the descriptor carries a digest, the
    /// SHA-256 of `bytes` must match it. A missing source digest is
    /// tolerated.
    pub fn check_post_download(
        &self,
        name: &str,
        descriptor: &ArtifactDescriptor,
        bytes: &[u8],
    ) -> Result<()> {
        let Some(expected) = &descriptor.digest else {
            return Ok(());
        };
        let actual = hex_digest_from_bytes(bytes);
        if &actual == expected {
            Ok(())
        } else {
            Err(Error::DigestMismatch {
                name: name.to_owned(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> TrustVerifier {
        TrustVerifier::new(
            vec!["registry.example.com/plugins/".to_owned()],
            vec!["https://artifacts.example.com/".to_owned()],
        )
    }

    #[test]
    fn trusted_image_prefix_passes() {
        let descriptor = ArtifactDescriptor {
            image: Some("registry.example.com/plugins/login:v1".to_owned()),
            uri: None,
            digest: None,
        };
        verifier().check_pre_download("login", &descriptor).unwrap();
    }

    #[test]
    fn untrusted_image_prefix_fails() {
        let descriptor = ArtifactDescriptor {
            image: Some("evil.example.com/plugins/login:v1".to_owned()),
            uri: None,
            digest: None,
        };
        let err = verifier().check_pre_download("login", &descriptor).unwrap_err();
        assert!(matches!(err, Error::UntrustedRegistry { .. }));
    }

    #[test]
    fn local_file_uri_is_implicitly_trusted() {
        let descriptor = ArtifactDescriptor {
            image: None,
            uri: Some("file:///tmp/login-plugin".to_owned()),
            digest: None,
        };
        verifier().check_pre_download("login", &descriptor).unwrap();
    }

    #[test]
    fn missing_download_information_fails() {
        let descriptor = ArtifactDescriptor {
            image: None,
            uri: None,
            digest: None,
        };
        let err = verifier().check_pre_download("login", &descriptor).unwrap_err();
        assert!(matches!(err, Error::NoDownloadInformation(_)));
    }

    #[test]
    fn digest_mismatch_is_rejected() {
        let descriptor = ArtifactDescriptor {
            image: None,
            uri: Some("https://artifacts.example.com/login".to_owned()),
            digest: Some("deadbeef".to_owned()),
        };
        let err = verifier()
            .check_post_download("login", &descriptor, b"hello")
            .unwrap_err();
        assert!(matches!(err, Error::DigestMismatch { .. }));
    }

    #[test]
    fn missing_digest_is_tolerated() {
        let descriptor = ArtifactDescriptor {
            image: None,
            uri: Some("https://artifacts.example.com/login".to_owned()),
            digest: None,
        };
        verifier()
            .check_post_download("login", &descriptor, b"hello")
            .unwrap();
    }
}
