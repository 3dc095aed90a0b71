use ciborium::value::Value;

use super::{decode_base64_any, VerifyError};

/// The CBOR format tag Apple uses for App Attest attestation objects.
const ATTESTATION_FMT: &str = "apple-appattest";

/// Decoded `apple-appattest` attestation envelope.
///
/// `x5c` is the certificate chain in wire order: credential certificate
/// first, then intermediates up to (but excluding) Apple's root. The
/// receipt is carried opaquely; fraud-metric processing happens elsewhere.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub x5c: Vec<Vec<u8>>,
    pub receipt: Vec<u8>,
    pub auth_data: Vec<u8>,
}

/// Decoded assertion envelope: a DER ECDSA signature over the 37-byte
/// assertion authenticator data.
#[derive(Debug, Clone)]
pub struct AssertionEnvelope {
    pub signature: Vec<u8>,
    pub authenticator_data: Vec<u8>,
}

impl AttestationObject {
    pub fn from_base64(payload: &str) -> Result<Self, VerifyError> {
        let bytes = decode_base64_any(payload)
            .ok_or_else(|| VerifyError::MalformedCbor("invalid base64".into()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, VerifyError> {
        let map = parse_cbor_map(data)?;

        let fmt = cbor_get(&map, "fmt")
            .and_then(cbor_text)
            .ok_or_else(|| VerifyError::MalformedCbor("missing fmt".into()))?;
        if fmt != ATTESTATION_FMT {
            return Err(VerifyError::MalformedCbor(format!(
                "unexpected fmt {fmt:?}"
            )));
        }

        let att_stmt = cbor_get(&map, "attStmt")
            .and_then(cbor_map)
            .ok_or_else(|| VerifyError::MalformedCbor("missing attStmt".into()))?;

        let x5c_val = cbor_get(att_stmt, "x5c")
            .and_then(cbor_array)
            .ok_or_else(|| VerifyError::MalformedCbor("missing x5c".into()))?;
        let mut x5c = Vec::with_capacity(x5c_val.len());
        for cert in x5c_val {
            let der = cbor_bytes(cert)
                .ok_or_else(|| VerifyError::MalformedCbor("x5c entry is not bytes".into()))?;
            x5c.push(der.to_vec());
        }
        if x5c.is_empty() {
            return Err(VerifyError::MalformedCbor("empty x5c".into()));
        }

        let receipt = cbor_get(att_stmt, "receipt")
            .and_then(cbor_bytes)
            .ok_or_else(|| VerifyError::MalformedCbor("missing receipt".into()))?
            .to_vec();

        let auth_data = cbor_get(&map, "authData")
            .and_then(cbor_bytes)
            .ok_or_else(|| VerifyError::MalformedCbor("missing authData".into()))?
            .to_vec();

        Ok(AttestationObject { x5c, receipt, auth_data })
    }
}

impl AssertionEnvelope {
    pub fn from_base64(payload: &str) -> Result<Self, VerifyError> {
        let bytes = decode_base64_any(payload)
            .ok_or_else(|| VerifyError::MalformedCbor("invalid base64".into()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, VerifyError> {
        let map = parse_cbor_map(data)?;

        let signature = cbor_get(&map, "signature")
            .and_then(cbor_bytes)
            .ok_or_else(|| VerifyError::MalformedCbor("missing signature".into()))?
            .to_vec();

        let authenticator_data = cbor_get(&map, "authenticatorData")
            .and_then(cbor_bytes)
            .ok_or_else(|| {
                VerifyError::MalformedCbor("missing authenticatorData".into())
            })?
            .to_vec();

        Ok(AssertionEnvelope { signature, authenticator_data })
    }
}

// CBOR accessor helpers

fn parse_cbor_map(data: &[u8]) -> Result<Vec<(Value, Value)>, VerifyError> {
    let value: Value = ciborium::from_reader(data)
        .map_err(|e| VerifyError::MalformedCbor(e.to_string()))?;
    match value {
        Value::Map(map) => Ok(map),
        _ => Err(VerifyError::MalformedCbor("expected map".into())),
    }
}

fn cbor_get<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Text(s) if s == key))
        .map(|(_, v)| v)
}

fn cbor_bytes(v: &Value) -> Option<&[u8]> {
    match v { Value::Bytes(b) => Some(b), _ => None }
}

fn cbor_text(v: &Value) -> Option<&str> {
    match v { Value::Text(s) => Some(s), _ => None }
}

fn cbor_map(v: &Value) -> Option<&[(Value, Value)]> {
    match v { Value::Map(m) => Some(m), _ => None }
}

fn cbor_array(v: &Value) -> Option<&[Value]> {
    match v { Value::Array(a) => Some(a), _ => None }
}
