use std::fmt;
use std::str::FromStr;

/// Long-term pairing identity, produced once by a successful `PairingSm` run
/// and reused by `VerifierSm` on every subsequent connection.
///
/// Serializes to `hex(pairingId):hex(localPrivateKey):hex(remotePeerId):hex(remotePublicKey)`.
/// Where that string is persisted between process runs is the caller's
/// concern; this type only handles the round trip.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Stable client identity, chosen by us at pairing time.
    pub pairing_id: String,
    /// Our Ed25519 signing seed (32 bytes).
    pub local_private_key: [u8; 32],
    /// The device's identifier, as returned in M6.
    pub remote_peer_id: String,
    /// The device's long-term Ed25519 public key (32 bytes).
    pub remote_public_key: [u8; 32],
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("pairing_id", &self.pairing_id)
            .field("remote_peer_id", &self.remote_peer_id)
            .finish_non_exhaustive()
    }
}

/// Error parsing a `Credentials` value from its serialized form.
#[derive(Debug, thiserror::Error)]
pub enum CredentialsParseError {
    #[error("expected 4 colon-separated fields, got {0}")]
    WrongFieldCount(usize),

    #[error("invalid hex in field {field}: {source}")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("invalid UTF-8 in field {0}")]
    InvalidUtf8(&'static str),

    #[error("{field} must be 32 bytes, got {actual}")]
    WrongKeyLength { field: &'static str, actual: usize },
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            hex::encode(self.pairing_id.as_bytes()),
            hex::encode(self.local_private_key),
            hex::encode(self.remote_peer_id.as_bytes()),
            hex::encode(self.remote_public_key),
        )
    }
}

impl FromStr for Credentials {
    type Err = CredentialsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(CredentialsParseError::WrongFieldCount(parts.len()));
        }

        let pairing_id_bytes =
            hex::decode(parts[0]).map_err(|source| CredentialsParseError::InvalidHex {
                field: "pairingId",
                source,
            })?;
        let local_private_key =
            hex::decode(parts[1]).map_err(|source| CredentialsParseError::InvalidHex {
                field: "localPrivateKey",
                source,
            })?;
        let remote_peer_id_bytes =
            hex::decode(parts[2]).map_err(|source| CredentialsParseError::InvalidHex {
                field: "remotePeerId",
                source,
            })?;
        let remote_public_key =
            hex::decode(parts[3]).map_err(|source| CredentialsParseError::InvalidHex {
                field: "remotePublicKey",
                source,
            })?;

        let pairing_id = String::from_utf8(pairing_id_bytes)
            .map_err(|_| CredentialsParseError::InvalidUtf8("pairingId"))?;
        let remote_peer_id = String::from_utf8(remote_peer_id_bytes)
            .map_err(|_| CredentialsParseError::InvalidUtf8("remotePeerId"))?;

        let local_private_key: [u8; 32] =
            local_private_key
                .try_into()
                .map_err(|v: Vec<u8>| CredentialsParseError::WrongKeyLength {
                    field: "localPrivateKey",
                    actual: v.len(),
                })?;
        let remote_public_key: [u8; 32] =
            remote_public_key
                .try_into()
                .map_err(|v: Vec<u8>| CredentialsParseError::WrongKeyLength {
                    field: "remotePublicKey",
                    actual: v.len(),
                })?;

        Ok(Self {
            pairing_id,
            local_private_key,
            remote_peer_id,
            remote_public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credentials {
        Credentials {
            pairing_id: "a1b2-pairing".to_string(),
            local_private_key: [0x11; 32],
            remote_peer_id: "ATV-peer".to_string(),
            remote_public_key: [0x22; 32],
        }
    }

    #[test]
    fn round_trips_through_string() {
        let creds = sample();
        let serialized = creds.to_string();
        let parsed: Credentials = serialized.parse().unwrap();
        assert_eq!(creds, parsed);
    }

    #[test]
    fn parses_uppercase_hex() {
        let creds = sample();
        let parsed: Credentials = creds.to_string().to_uppercase().parse().unwrap();
        assert_eq!(creds, parsed);
    }

    #[test]
    fn emits_lowercase_hex() {
        let serialized = sample().to_string();
        assert_eq!(serialized, serialized.to_lowercase());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(matches!(
            "a:b:c".parse::<Credentials>(),
            Err(CredentialsParseError::WrongFieldCount(3))
        ));
    }

    #[test]
    fn rejects_short_keys() {
        let bad = format!(
            "{}:{}:{}:{}",
            hex::encode("id"),
            hex::encode([0u8; 16]),
            hex::encode("peer"),
            hex::encode([0u8; 32]),
        );
        assert!(matches!(
            bad.parse::<Credentials>(),
            Err(CredentialsParseError::WrongKeyLength {
                field: "localPrivateKey",
                actual: 16
            })
        ));
    }
}
