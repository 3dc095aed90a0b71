#![allow(dead_code)]
//! Test support: a synthetic two-level attestation CA minted at test time,
//! plus builders for attestation and assertion blobs signed by it, so the
//! complete verification path can be exercised without a real iOS device.
//!
//! The CA mirrors Apple's production chain: a P-384 root signing a P-384
//! intermediate with ECDSA-SHA384, and the intermediate signing per-device
//! P-256 credential certificates with ECDSA-SHA256.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ciborium::{cbor, value::Value};
use openssl::asn1::{Asn1Integer, Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private};
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{DerSignature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePublicKey;
use sha2::{Digest, Sha256};

pub const AAGUID_DEVELOPMENT: [u8; 16] = *b"appattestdevelop";
pub const AAGUID_PRODUCTION: [u8; 16] = *b"appattest\0\0\0\0\0\0\0";

pub struct TestCa {
    root_pem: Vec<u8>,
    int_cert: X509,
    int_key: PKey<Private>,
}

pub struct TestDevice {
    /// base64 SHA-256 of the device public key.
    pub key_id: String,
    /// The device key, kept so tests can sign assertions.
    pub signing_key: SigningKey,
    /// CBOR attestation object bytes.
    pub attestation: Vec<u8>,
}

#[derive(Clone)]
pub struct AttestationOptions {
    pub aaguid: [u8; 16],
    pub sign_count: u32,
    /// Corrupt the credentialId field while leaving the certificate intact.
    pub tamper_credential_id: bool,
}

impl Default for AttestationOptions {
    fn default() -> Self {
        AttestationOptions {
            aaguid: AAGUID_DEVELOPMENT,
            sign_count: 0,
            tamper_credential_id: false,
        }
    }
}

impl TestCa {
    pub fn new() -> Self {
        let p384 = EcGroup::from_curve_name(Nid::SECP384R1).unwrap();

        let root_key = PKey::from_ec_key(EcKey::generate(&p384).unwrap()).unwrap();
        let root_name = name("Test App Attestation Root CA");
        let mut builder = cert_builder(&root_name, &root_name, &root_key);
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder.sign(&root_key, MessageDigest::sha384()).unwrap();
        let root_cert = builder.build();

        let int_key = PKey::from_ec_key(EcKey::generate(&p384).unwrap()).unwrap();
        let int_name = name("Test App Attestation CA 1");
        let mut builder = cert_builder(&root_name, &int_name, &int_key);
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder.sign(&root_key, MessageDigest::sha384()).unwrap();
        let int_cert = builder.build();

        TestCa {
            root_pem: root_cert.to_pem().unwrap(),
            int_cert,
            int_key,
        }
    }

    pub fn root_pem(&self) -> &[u8] {
        &self.root_pem
    }

    /// Build a fully valid attestation for `challenge`/`app_id`, signed by
    /// this CA, with a freshly generated device key.
    pub fn attest(&self, challenge: &str, app_id: &str) -> TestDevice {
        self.attest_with(challenge, app_id, &AttestationOptions::default())
    }

    pub fn attest_with(
        &self,
        challenge: &str,
        app_id: &str,
        options: &AttestationOptions,
    ) -> TestDevice {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let public_point = signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        let key_id_bytes: [u8; 32] = Sha256::digest(&public_point).into();
        let key_id = STANDARD.encode(key_id_bytes);

        let mut credential_id = key_id_bytes.to_vec();
        if options.tamper_credential_id {
            credential_id[0] ^= 0xff;
        }

        // Attestation authenticator data layout:
        //   [0..32]  rpIdHash  [32] flags  [33..37] signCount
        //   [37..53] aaguid    [53..55] credIdLen  [55..] credentialId
        let rp_id_hash: [u8; 32] = Sha256::digest(app_id.as_bytes()).into();
        let mut auth_data = Vec::with_capacity(87);
        auth_data.extend_from_slice(&rp_id_hash);
        auth_data.push(0x41);
        auth_data.extend_from_slice(&options.sign_count.to_be_bytes());
        auth_data.extend_from_slice(&options.aaguid);
        auth_data.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(&credential_id);

        // The certificate binds SHA-256(authData || SHA-256(challenge)).
        let client_data_hash: [u8; 32] = Sha256::digest(challenge.as_bytes()).into();
        let nonce: [u8; 32] = Sha256::new()
            .chain_update(&auth_data)
            .chain_update(client_data_hash)
            .finalize()
            .into();

        let leaf_der = self.issue_leaf(&signing_key, &nonce, &key_id);
        let int_der = self.int_cert.to_der().unwrap();
        let attestation = encode_attestation_cbor(&leaf_der, &int_der, &auth_data);

        TestDevice { key_id, signing_key, attestation }
    }

    fn issue_leaf(&self, device_key: &SigningKey, nonce: &[u8; 32], key_id: &str) -> Vec<u8> {
        let spki_der = device_key.verifying_key().to_public_key_der().unwrap();
        let device_pub = PKey::public_key_from_der(spki_der.as_bytes()).unwrap();

        let int_name = name("Test App Attestation CA 1");
        let leaf_name = name(key_id);
        let mut builder = cert_builder(&int_name, &leaf_name, &device_pub);
        builder
            .append_extension(BasicConstraints::new().critical().build().unwrap())
            .unwrap();

        // Apple's nonce extension, OID 1.2.840.113635.100.8.2:
        //   30 24        SEQUENCE
        //     a1 22      [1]
        //       04 20    OCTET STRING, 32 bytes
        let mut ext_value = Vec::with_capacity(38);
        ext_value.extend_from_slice(&[0x30, 0x24, 0xa1, 0x22, 0x04, 0x20]);
        ext_value.extend_from_slice(nonce);
        let oid = Asn1Object::from_str("1.2.840.113635.100.8.2").unwrap();
        let contents = Asn1OctetString::new_from_bytes(&ext_value).unwrap();
        builder
            .append_extension(
                openssl::x509::X509Extension::new_from_der(&oid, false, &contents).unwrap(),
            )
            .unwrap();

        builder.sign(&self.int_key, MessageDigest::sha256()).unwrap();
        builder.build().to_der().unwrap()
    }
}

fn name(common_name: &str) -> openssl::x509::X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_text("CN", common_name).unwrap();
    builder.append_entry_by_text("O", "Test").unwrap();
    builder.build()
}

fn cert_builder<T: HasPublic>(
    issuer: &openssl::x509::X509NameRef,
    subject: &openssl::x509::X509NameRef,
    public_key: &PKeyRef<T>,
) -> X509Builder {
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_issuer_name(issuer).unwrap();
    builder.set_subject_name(subject).unwrap();
    builder.set_pubkey(public_key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();

    let mut serial = [0u8; 8];
    openssl::rand::rand_bytes(&mut serial).unwrap();
    serial[0] &= 0x7f;
    let serial = Asn1Integer::from_bn(&BigNum::from_slice(&serial).unwrap()).unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder
}

fn encode_attestation_cbor(leaf_der: &[u8], int_der: &[u8], auth_data: &[u8]) -> Vec<u8> {
    let value = cbor!({
        "fmt" => "apple-appattest",
        "attStmt" => {
            "x5c" => [
                Value::Bytes(leaf_der.to_vec()),
                Value::Bytes(int_der.to_vec())
            ],
            "receipt" => Value::Bytes(vec![])
        },
        "authData" => Value::Bytes(auth_data.to_vec())
    })
    .unwrap();
    let mut buf = Vec::new();
    ciborium::into_writer(&value, &mut buf).unwrap();
    buf
}

/// Build a base64 assertion envelope signed by `device_key`, carrying
/// `counter` and binding `client_data_hash`.
pub fn build_assertion(
    device_key: &SigningKey,
    app_id: &str,
    counter: u32,
    client_data_hash: &[u8; 32],
) -> String {
    let rp_id_hash: [u8; 32] = Sha256::digest(app_id.as_bytes()).into();
    let mut auth_data = Vec::with_capacity(37);
    auth_data.extend_from_slice(&rp_id_hash);
    auth_data.push(0x01);
    auth_data.extend_from_slice(&counter.to_be_bytes());

    let nonce: [u8; 32] = Sha256::new()
        .chain_update(&auth_data)
        .chain_update(client_data_hash)
        .finalize()
        .into();
    let signature: DerSignature = device_key.sign(&nonce);

    let value = cbor!({
        "signature" => Value::Bytes(signature.as_bytes().to_vec()),
        "authenticatorData" => Value::Bytes(auth_data)
    })
    .unwrap();
    let mut buf = Vec::new();
    ciborium::into_writer(&value, &mut buf).unwrap();
    STANDARD.encode(buf)
}

pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
