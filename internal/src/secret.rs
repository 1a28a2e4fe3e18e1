use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

pub const SALT_LEN: usize = 4;

/// Salted digest schemes accepted by `userPassword`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PasswordScheme {
    #[default]
    #[serde(rename = "SSHA")]
    Ssha,
    #[serde(rename = "SSHA256")]
    Ssha256,
    #[serde(rename = "SSHA512")]
    Ssha512,
}

impl PasswordScheme {
    pub fn tag(&self) -> &'static str {
        match self {
            PasswordScheme::Ssha => "SSHA",
            PasswordScheme::Ssha256 => "SSHA256",
            PasswordScheme::Ssha512 => "SSHA512",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        [
            PasswordScheme::Ssha,
            PasswordScheme::Ssha256,
            PasswordScheme::Ssha512,
        ]
        .into_iter()
        .find(|scheme| scheme.tag().eq_ignore_ascii_case(tag))
    }

    fn digest(&self, password: &[u8], salt: &[u8]) -> Vec<u8> {
        fn salted<D: Digest>(password: &[u8], salt: &[u8]) -> Vec<u8> {
            let mut hasher = D::new();
            hasher.update(password);
            hasher.update(salt);
            hasher.finalize().to_vec()
        }

        match self {
            PasswordScheme::Ssha => salted::<Sha1>(password, salt),
            PasswordScheme::Ssha256 => salted::<Sha256>(password, salt),
            PasswordScheme::Ssha512 => salted::<Sha512>(password, salt),
        }
    }
}

/// `{TAG}` followed by base64 of the digest of password and salt, with the
/// salt appended
pub fn hash_password_with_salt(scheme: PasswordScheme, password: &str, salt: &[u8]) -> String {
    let mut value = scheme.digest(password.as_bytes(), salt);
    value.extend_from_slice(salt);
    format!("{{{}}}{}", scheme.tag(), STANDARD.encode(value))
}

/// Hashes with a fresh random salt
pub fn hash_password(scheme: PasswordScheme, password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::thread_rng().gen();
    hash_password_with_salt(scheme, password, &salt)
}

/// Checks a clear text password against a stored salted digest
pub fn verify_password(stored: &str, password: &str) -> bool {
    let Some((tag, encoded)) = stored
        .strip_prefix('{')
        .and_then(|rest| rest.split_once('}'))
    else {
        return false;
    };
    let Some(scheme) = PasswordScheme::from_tag(tag) else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded) else {
        return false;
    };

    let digest_len = scheme.digest(b"", b"").len();
    if decoded.len() <= digest_len {
        return false;
    }

    let (digest, salt) = decoded.split_at(digest_len);
    scheme.digest(password.as_bytes(), salt) == digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ssha_digest() {
        // sha1("secret" || "salt") followed by the salt
        let hashed = hash_password_with_salt(PasswordScheme::Ssha, "secret", b"salt");
        assert!(hashed.starts_with("{SSHA}"));

        let decoded = STANDARD.decode(&hashed["{SSHA}".len()..]).unwrap();
        assert_eq!(decoded.len(), 20 + 4);
        assert_eq!(&decoded[20..], b"salt");

        let mut hasher = Sha1::new();
        hasher.update(b"secretsalt");
        assert_eq!(&decoded[..20], hasher.finalize().as_slice());
    }

    #[test]
    fn random_salts_differ() {
        let first = hash_password(PasswordScheme::Ssha, "secret");
        let second = hash_password(PasswordScheme::Ssha, "secret");
        assert_ne!(first, second);
        assert!(verify_password(&first, "secret"));
        assert!(verify_password(&second, "secret"));
    }

    #[test]
    fn verifies_every_scheme() {
        for scheme in [
            PasswordScheme::Ssha,
            PasswordScheme::Ssha256,
            PasswordScheme::Ssha512,
        ] {
            let hashed = hash_password(scheme, "correct horse");
            assert!(hashed.starts_with(&format!("{{{}}}", scheme.tag())));
            assert!(verify_password(&hashed, "correct horse"));
            assert!(!verify_password(&hashed, "battery staple"));
        }
    }

    #[test]
    fn rejects_malformed_digests() {
        assert!(!verify_password("secret", "secret"));
        assert!(!verify_password("{MD5}Xr4ilOzQ4PCOq3aQ0qbuaQ==", "secret"));
        assert!(!verify_password("{SSHA}not base64!", "secret"));
        assert!(!verify_password("{SSHA}AAAA", "secret"));
    }
}
