//! Third-party caveat id codec: encodes `(condition, root_key, namespace)`
//! into bytes a discharger can decrypt with its private key, and decodes
//! them back. Three wire versions are supported; a discharger picks the one
//! that matches the encoder's advertised [`crate::crypto::bakery_key::PublicKey`]
//! protocol version.

use serde::{Deserialize, Serialize};

use crate::crypto::bakery_key::{PrivateKey, PublicKey, NACL_NONCE_BYTES};
use crate::error::MacaroonError;
use crate::namespace::Namespace;
use crate::{ByteString, MacaroonKey, Result};

pub const VERSION1: u8 = 1;
pub const VERSION2: u8 = 2;
pub const VERSION3: u8 = 3;

const MIN_LEN_V2: usize = 1 + 4 + 32 + NACL_NONCE_BYTES;

/// Decoded form of a third-party caveat id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThirdPartyCaveatInfo {
    pub condition: String,
    pub first_party_public_key: PublicKey,
    pub third_party_public_key: PublicKey,
    pub root_key: MacaroonKey,
    pub caveat: Vec<u8>,
    pub version: u8,
    pub namespace: Namespace,
    pub id: Option<ByteString>,
}

fn write_uvarint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_uvarint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *data.get(*pos).ok_or_else(|| {
            MacaroonError::DeserializationError(String::from("truncated uvarint"))
        })?;
        *pos += 1;
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(MacaroonError::DeserializationError(String::from(
                "uvarint overflow",
            )));
        }
    }
    Ok(value)
}

#[derive(Serialize, Deserialize)]
struct JsonEnvelope {
    #[serde(rename = "ThirdPartyPublicKey")]
    third_party_public_key: String,
    #[serde(rename = "FirstPartyPublicKey")]
    first_party_public_key: String,
    #[serde(rename = "Nonce")]
    nonce: String,
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Serialize, Deserialize)]
struct JsonPayload {
    #[serde(rename = "RootKey")]
    root_key: String,
    #[serde(rename = "Condition")]
    condition: String,
}

/// Encodes a V1 (JSON) third-party caveat id.
pub fn encode_v1(
    condition: &str,
    root_key: &MacaroonKey,
    third_party_key: &PublicKey,
    first_party_key: &PrivateKey,
) -> Result<Vec<u8>> {
    let payload = JsonPayload {
        root_key: base64::encode(root_key.as_ref() as &[u8]),
        condition: condition.to_string(),
    };
    let plaintext = serde_json::to_vec(&payload)?;
    let (nonce, ciphertext) = first_party_key.seal(third_party_key, &plaintext)?;
    let envelope = JsonEnvelope {
        third_party_public_key: base64::encode(third_party_key.to_bytes()),
        first_party_public_key: base64::encode(first_party_key.public_key().to_bytes()),
        nonce: base64::encode(&nonce),
        id: base64::encode(&ciphertext),
    };
    Ok(base64::encode(serde_json::to_vec(&envelope)?).into_bytes())
}

fn decode_v1(data: &[u8], third_party_key: &PrivateKey) -> Result<ThirdPartyCaveatInfo> {
    let json = base64::decode(data)?;
    let envelope: JsonEnvelope = serde_json::from_slice(&json)?;
    let first_party_public_key: [u8; 32] = base64::decode(&envelope.first_party_public_key)?
        .try_into()
        .map_err(|_| MacaroonError::CryptoError("first party key must be 32 bytes"))?;
    let nonce = base64::decode(&envelope.nonce)?;
    let ciphertext = base64::decode(&envelope.id)?;
    let plaintext = third_party_key.open(&first_party_public_key.into(), &nonce, &ciphertext)?;
    let payload: JsonPayload = serde_json::from_slice(&plaintext)?;
    Ok(ThirdPartyCaveatInfo {
        condition: payload.condition,
        first_party_public_key: first_party_public_key.into(),
        third_party_public_key: third_party_key.public_key(),
        root_key: base64::decode(&payload.root_key)?.into(),
        caveat: data.to_vec(),
        version: VERSION1,
        namespace: Namespace::new(),
        id: None,
    })
}

fn encode_binary(
    version: u8,
    condition: &str,
    root_key: &MacaroonKey,
    third_party_key: &PublicKey,
    first_party_key: &PrivateKey,
    namespace: Option<&Namespace>,
) -> Result<Vec<u8>> {
    let mut plaintext = vec![version];
    let root_key_bytes: &[u8] = root_key.as_ref();
    write_uvarint(root_key_bytes.len() as u64, &mut plaintext);
    plaintext.extend_from_slice(root_key_bytes);
    if let Some(ns) = namespace {
        let serialized = ns.serialize();
        write_uvarint(serialized.len() as u64, &mut plaintext);
        plaintext.extend_from_slice(serialized.as_bytes());
    }
    plaintext.extend_from_slice(condition.as_bytes());

    let (nonce, ciphertext) = first_party_key.seal(third_party_key, &plaintext)?;

    let mut out = vec![version];
    out.extend_from_slice(&third_party_key.prefix());
    out.extend_from_slice(&first_party_key.public_key().to_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn encode_v2(
    condition: &str,
    root_key: &MacaroonKey,
    third_party_key: &PublicKey,
    first_party_key: &PrivateKey,
) -> Result<Vec<u8>> {
    encode_binary(VERSION2, condition, root_key, third_party_key, first_party_key, None)
}

pub fn encode_v3(
    condition: &str,
    root_key: &MacaroonKey,
    third_party_key: &PublicKey,
    first_party_key: &PrivateKey,
    namespace: &Namespace,
) -> Result<Vec<u8>> {
    encode_binary(
        VERSION3,
        condition,
        root_key,
        third_party_key,
        first_party_key,
        Some(namespace),
    )
}

fn decode_binary(data: &[u8], third_party_key: &PrivateKey) -> Result<ThirdPartyCaveatInfo> {
    if data.len() < MIN_LEN_V2 {
        return Err(MacaroonError::DeserializationError(String::from(
            "third party caveat id too short",
        )));
    }
    let version = data[0];
    if version != VERSION2 && version != VERSION3 {
        return Err(MacaroonError::DeserializationError(format!(
            "unknown third party caveat id version {}",
            version
        )));
    }
    let hint = &data[1..5];
    if hint != &third_party_key.public_key().prefix() {
        return Err(MacaroonError::CryptoError("public key mismatch"));
    }
    let first_party_public_key: [u8; 32] = data[5..37]
        .try_into()
        .map_err(|_| MacaroonError::CryptoError("malformed first party key"))?;
    let nonce = &data[37..37 + NACL_NONCE_BYTES];
    let ciphertext = &data[37 + NACL_NONCE_BYTES..];

    let plaintext =
        third_party_key.open(&first_party_public_key.into(), nonce, ciphertext)?;
    if plaintext.is_empty() || plaintext[0] != version {
        return Err(MacaroonError::DeserializationError(String::from(
            "caveat payload version mismatch",
        )));
    }

    let mut pos = 1usize;
    let root_key_len = read_uvarint(&plaintext, &mut pos)? as usize;
    if pos + root_key_len > plaintext.len() {
        return Err(MacaroonError::DeserializationError(String::from(
            "root key exceeds payload",
        )));
    }
    let root_key_bytes = plaintext[pos..pos + root_key_len].to_vec();
    pos += root_key_len;

    let namespace = if version == VERSION3 {
        let ns_len = read_uvarint(&plaintext, &mut pos)? as usize;
        if pos + ns_len > plaintext.len() {
            return Err(MacaroonError::DeserializationError(String::from(
                "namespace exceeds payload",
            )));
        }
        let ns_str = std::str::from_utf8(&plaintext[pos..pos + ns_len])?;
        pos += ns_len;
        crate::namespace::Namespace::deserialize(ns_str)
            .map_err(|_| MacaroonError::DeserializationError(String::from("bad namespace")))?
    } else {
        Namespace::new()
    };

    let condition = String::from_utf8(plaintext[pos..].to_vec())?;

    Ok(ThirdPartyCaveatInfo {
        condition,
        first_party_public_key: first_party_public_key.into(),
        third_party_public_key: third_party_key.public_key(),
        root_key: root_key_bytes.into(),
        caveat: data.to_vec(),
        version,
        namespace,
        id: None,
    })
}

/// Decodes a third-party caveat id, dispatching on its first byte: `'e'`
/// (0x65, the first base64 character of a JSON object) means V1; anything
/// else is read as a binary version byte.
pub fn decode(data: &[u8], third_party_key: &PrivateKey) -> Result<ThirdPartyCaveatInfo> {
    if data.is_empty() {
        return Err(MacaroonError::DeserializationError(String::from(
            "empty caveat id",
        )));
    }
    if data[0] == b'e' {
        decode_v1(data, third_party_key)
    } else {
        decode_binary(data, third_party_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;

    #[test]
    fn v2_round_trip() {
        let third_party = PrivateKey::generate();
        let first_party = PrivateKey::generate();
        let root_key = MacaroonKey::generate_random();

        let encoded = encode_v2(
            "user == bob",
            &root_key,
            &third_party.public_key(),
            &first_party,
        )
        .unwrap();
        let decoded = decode(&encoded, &third_party).unwrap();

        assert_eq!("user == bob", decoded.condition);
        assert_eq!(root_key, decoded.root_key);
        assert_eq!(super::VERSION2, decoded.version);
        assert_eq!(first_party.public_key(), decoded.first_party_public_key);
    }

    #[test]
    fn v3_round_trip_carries_namespace() {
        let third_party = PrivateKey::generate();
        let first_party = PrivateKey::generate();
        let root_key = MacaroonKey::generate_random();
        let mut ns = Namespace::new();
        ns.register("std", "");

        let encoded = encode_v3(
            "time-before 2030-01-01T00:00:00Z",
            &root_key,
            &third_party.public_key(),
            &first_party,
            &ns,
        )
        .unwrap();
        let decoded = decode(&encoded, &third_party).unwrap();

        assert_eq!(ns, decoded.namespace);
        assert_eq!(super::VERSION3, decoded.version);
    }

    #[test]
    fn v1_round_trip() {
        let third_party = PrivateKey::generate();
        let first_party = PrivateKey::generate();
        let root_key = MacaroonKey::generate_random();

        let encoded =
            encode_v1("a = b", &root_key, &third_party.public_key(), &first_party).unwrap();
        assert_eq!(b'e', encoded[0]);
        let decoded = decode(&encoded, &third_party).unwrap();
        assert_eq!("a = b", decoded.condition);
        assert_eq!(root_key, decoded.root_key);
    }

    #[test]
    fn wrong_recipient_fails_with_public_key_mismatch() {
        let third_party = PrivateKey::generate();
        let wrong_party = PrivateKey::generate();
        let first_party = PrivateKey::generate();
        let root_key = MacaroonKey::generate_random();

        let encoded = encode_v2(
            "user == bob",
            &root_key,
            &third_party.public_key(),
            &first_party,
        )
        .unwrap();
        assert!(decode(&encoded, &wrong_party).is_err());
    }

    #[test]
    fn uvarint_round_trip() {
        let mut out = Vec::new();
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            out.clear();
            write_uvarint(value, &mut out);
            let mut pos = 0;
            assert_eq!(value, read_uvarint(&out, &mut pos).unwrap());
            assert_eq!(out.len(), pos);
        }
    }
}
