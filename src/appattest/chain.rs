use p256::ecdsa::signature::hazmat::PrehashVerifier;
use sha2::{Digest, Sha256, Sha384};
use x509_parser::der_parser::oid;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;
use x509_parser::time::ASN1Time;

use super::VerifyError;

/// Apple App Attest Root CA, compiled in. Rotation means shipping a new
/// binary. The certificate is published at
/// <https://www.apple.com/certificateauthority/Apple_App_Attestation_Root_CA.pem>
/// and is valid until 2045-03-15.
pub const APPLE_ROOT_CA_PEM: &[u8] =
    include_bytes!("./static/apple_app_attest_root_ca.pem");

/// SEC1 uncompressed point lengths, used to tell which curve an issuer key
/// is on. Apple's chain mixes them: the credential certificate is P-256 but
/// both CAs hold P-384 keys, and the leaf is signed ecdsa-with-SHA256 by a
/// P-384 key.
const P256_POINT_LEN: usize = 65;
const P384_POINT_LEN: usize = 97;

/// Verify `x5c` (leaf first, then intermediates) up to the root in
/// `root_pem`: issuer/subject linkage, validity windows at
/// `validation_time` (seconds since the Unix epoch), basic constraints,
/// and every TBS signature against the issuer's key.
pub fn verify_chain(
    x5c: &[Vec<u8>],
    root_pem: &[u8],
    validation_time: u64,
) -> Result<(), VerifyError> {
    if x5c.len() < 2 {
        return Err(VerifyError::InvalidCertChain(
            "expected leaf and at least one intermediate",
        ));
    }

    let (_, pem) = parse_x509_pem(root_pem)
        .map_err(|_| VerifyError::InvalidCertChain("unparsable root PEM"))?;
    let root = pem
        .parse_x509()
        .map_err(|_| VerifyError::InvalidCertChain("unparsable root certificate"))?;

    let mut certs = Vec::with_capacity(x5c.len());
    for der in x5c {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|_| VerifyError::InvalidCertChain("unparsable certificate"))?;
        certs.push(cert);
    }

    let at = ASN1Time::from_timestamp(validation_time as i64)
        .map_err(|_| VerifyError::InvalidCertChain("invalid validation time"))?;
    if !root.validity().is_valid_at(at) {
        return Err(VerifyError::InvalidCertChain("root outside validity window"));
    }

    for (i, cert) in certs.iter().enumerate() {
        if !cert.validity().is_valid_at(at) {
            return Err(VerifyError::InvalidCertChain(
                "certificate outside validity window",
            ));
        }

        let is_ca =
            matches!(cert.tbs_certificate.basic_constraints(), Ok(Some(bc)) if bc.value.ca);
        if i == 0 && is_ca {
            return Err(VerifyError::InvalidCertChain("leaf claims to be a CA"));
        }
        if i > 0 && !is_ca {
            return Err(VerifyError::InvalidCertChain("intermediate is not a CA"));
        }

        let issuer: &X509Certificate = match certs.get(i + 1) {
            Some(next) => next,
            None => &root,
        };
        if cert.issuer() != issuer.subject() {
            return Err(VerifyError::InvalidCertChain("issuer/subject mismatch"));
        }
        verify_cert_signature(cert, issuer)?;
    }

    Ok(())
}

/// Check that `cert`'s TBS is signed by `issuer`'s key. Apple's chain only
/// ever uses ECDSA with SHA-256 or SHA-384 over P-256 or P-384; anything
/// else is rejected.
fn verify_cert_signature(
    cert: &X509Certificate,
    issuer: &X509Certificate,
) -> Result<(), VerifyError> {
    let tbs = cert.tbs_certificate.as_ref();
    let sig_der = cert.signature_value.data.as_ref();
    let issuer_point = issuer.public_key().subject_public_key.data.as_ref();

    let alg = &cert.signature_algorithm.algorithm;
    let sha256 = *alg == oid!(1.2.840.10045.4.3.2);
    let sha384 = *alg == oid!(1.2.840.10045.4.3.3);
    if !sha256 && !sha384 {
        return Err(VerifyError::InvalidCertChain("unsupported signature algorithm"));
    }

    let verified = match issuer_point.len() {
        P256_POINT_LEN => {
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(issuer_point)
                .map_err(|_| VerifyError::InvalidCertChain("bad P-256 issuer key"))?;
            let sig = p256::ecdsa::Signature::from_der(sig_der)
                .map_err(|_| VerifyError::InvalidCertChain("bad DER signature"))?;
            if sha256 {
                key.verify_prehash(&Sha256::digest(tbs), &sig)
            } else {
                key.verify_prehash(&Sha384::digest(tbs), &sig)
            }
        }
        P384_POINT_LEN => {
            let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(issuer_point)
                .map_err(|_| VerifyError::InvalidCertChain("bad P-384 issuer key"))?;
            let sig = p384::ecdsa::Signature::from_der(sig_der)
                .map_err(|_| VerifyError::InvalidCertChain("bad DER signature"))?;
            if sha256 {
                key.verify_prehash(&Sha256::digest(tbs), &sig)
            } else {
                key.verify_prehash(&Sha384::digest(tbs), &sig)
            }
        }
        _ => return Err(VerifyError::InvalidCertChain("unsupported issuer key")),
    };

    verified.map_err(|_| VerifyError::InvalidCertChain("signature verification failed"))
}
