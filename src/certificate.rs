//! Identity certificates: a subject name bound to an RSA public key by the
//! signature of an issuing authority.
//!
//! The text form is line oriented, one fixed tag per line, in this order:
//!
//! ```text
//! NAME <subject>
//! VALID-FROM <unix-seconds>
//! VALID-TO <unix-seconds>
//! ISSUER <issuer-name>
//! KEY <hex modulus> <hex exponent>
//! SIGNATURE <hex signature>
//! ```
//!
//! The authority signs the first five lines exactly as they are serialized, so
//! there is a single canonicalization shared by creation, transmission and
//! verification.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use num_bigint_dig::BigUint;
use num_traits::Zero;

use crate::error::{Error, Result};
use crate::security::bignum::{from_hex, to_hex};
use crate::security::{rsa_sign, rsa_verify, RsaPrivateKey, RsaPublicKey};

/// How long a freshly issued certificate stays valid.
pub const VALIDITY_MONTHS: u32 = 12;

/// A signed binding between a subject name and an RSA public key.
///
/// Fields are private: a certificate is never mutated after creation or parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    subject: String,
    issuer: String,
    valid_from: i64,
    valid_to: i64,
    public_key: RsaPublicKey,
    signature: BigUint,
}

impl Certificate {
    /// Issue a certificate valid from now for twelve months.
    pub fn create(
        subject: &str,
        issuer: &str,
        subject_public_key: &RsaPublicKey,
        issuer_secret_key: &RsaPrivateKey,
    ) -> Result<Self> {
        Self::create_at(subject, issuer, subject_public_key, issuer_secret_key, Utc::now())
    }

    /// [`create`](Self::create) with an explicit issuance instant.
    pub fn create_at(
        subject: &str,
        issuer: &str,
        subject_public_key: &RsaPublicKey,
        issuer_secret_key: &RsaPrivateKey,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        check_name("subject", subject)?;
        check_name("issuer", issuer)?;

        let valid_to = now
            .checked_add_months(Months::new(VALIDITY_MONTHS))
            .ok_or_else(|| Error::crypto("validity window overflows the calendar"))?;

        let mut certificate = Certificate {
            subject: subject.to_string(),
            issuer: issuer.to_string(),
            valid_from: now.timestamp(),
            valid_to: valid_to.timestamp(),
            public_key: subject_public_key.clone(),
            signature: BigUint::zero(),
        };
        certificate.signature = rsa_sign(issuer_secret_key, &certificate.canonical_bytes());
        Ok(certificate)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn valid_from(&self) -> i64 {
        self.valid_from
    }

    pub fn valid_to(&self) -> i64 {
        self.valid_to
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn signature(&self) -> &BigUint {
        &self.signature
    }

    /// The signed part of the certificate: every line but `SIGNATURE`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.signed_text().into_bytes()
    }

    fn signed_text(&self) -> String {
        format!(
            "NAME {}\nVALID-FROM {}\nVALID-TO {}\nISSUER {}\nKEY {} {}\n",
            self.subject,
            self.valid_from,
            self.valid_to,
            self.issuer,
            to_hex(&self.public_key.n),
            to_hex(&self.public_key.e)
        )
    }

    /// Valid right now under `issuer_public_key`.
    ///
    /// Expired, not-yet-valid, wrongly signed and tampered certificates all give
    /// the same `false`; nothing else is reported.
    pub fn is_valid(&self, issuer_public_key: &RsaPublicKey) -> bool {
        self.is_valid_at(issuer_public_key, Utc::now().timestamp())
    }

    /// [`is_valid`](Self::is_valid) at an explicit unix time.
    pub fn is_valid_at(&self, issuer_public_key: &RsaPublicKey, now: i64) -> bool {
        let in_window = self.valid_from <= now && now <= self.valid_to;
        // Always run the signature check so timing does not tell the two apart.
        let signed = rsa_verify(issuer_public_key, &self.canonical_bytes(), &self.signature);
        in_window && signed
    }

    /// Parse the text form. Accepts `\r\n` line endings.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let mut field = |tag: &str| next_field(&mut lines, tag);

        let subject = field("NAME")?.to_string();
        let valid_from = parse_seconds(field("VALID-FROM")?, "VALID-FROM")?;
        let valid_to = parse_seconds(field("VALID-TO")?, "VALID-TO")?;
        let issuer = field("ISSUER")?.to_string();

        let key = field("KEY")?;
        let (n, e) = key
            .trim()
            .split_once(' ')
            .ok_or_else(|| Error::parse("KEY line needs a modulus and an exponent"))?;
        let n = from_hex(n).ok_or_else(|| Error::parse("malformed KEY modulus"))?;
        let e = from_hex(e).ok_or_else(|| Error::parse("malformed KEY exponent"))?;

        let signature =
            from_hex(field("SIGNATURE")?).ok_or_else(|| Error::parse("malformed SIGNATURE"))?;

        if lines.any(|l| !l.trim().is_empty()) {
            return Err(Error::parse("unexpected data after SIGNATURE"));
        }
        check_name("subject", &subject)?;
        check_name("issuer", &issuer)?;

        Ok(Certificate {
            subject,
            issuer,
            valid_from,
            valid_to,
            public_key: RsaPublicKey { n, e },
            signature,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_string())?;
        Ok(())
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}SIGNATURE {}", self.signed_text(), to_hex(&self.signature))
    }
}

impl FromStr for Certificate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Certificate::parse(s)
    }
}

fn next_field<'a>(lines: &mut impl Iterator<Item = &'a str>, tag: &str) -> Result<&'a str> {
    let line = lines
        .next()
        .ok_or_else(|| Error::parse(format!("certificate is missing its {} line", tag)))?;
    line.strip_prefix(tag)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| Error::parse(format!("expected a {} line, got {:?}", tag, line)))
}

fn check_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::parse(format!("{} name is empty", what)));
    }
    if name.contains(['\n', '\r']) {
        return Err(Error::parse(format!("{} name spans several lines", what)));
    }
    Ok(())
}

fn parse_seconds(value: &str, tag: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| Error::parse(format!("malformed {} timestamp {:?}", tag, value)))
}
