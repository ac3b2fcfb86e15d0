//! Application-layer messages of the lab demos that ride next to STS.
//!
//! ```text
//! Hello! My name is <name>, calling from <host>.   ->  Hello <host>!
//! AES: <base64>                                    ->  AES: [OK] | AES: [FAILED]
//! DH: ALICE/BOB CONNECT1 <sid> <hex ga>            ->  DH: BOB/ALICE CONNECT2 <sid> <hex gb>
//! DH: ALICE/BOB CONNECT3 <sid> <base64>            ->  DH: OK <sid>
//! CTF: CONNECT <sid> <name>   (then STS under <sid>)
//!                                                  <-  CTF: FLAG <sid> <base64>
//! ```

use num_bigint_dig::BigUint;

use crate::protocol::SessionId;
use crate::security::{derive_symmetric_key, SessionKey};

/// The shared "secret" both sides of the AES demo derive their key from.
pub const DEMO_AES_SECRET: u64 = 12345612345678907890;

/// Plaintext used by the AES and DH demos.
pub const DEMO_PLAINTEXT: &str = "It's a long way to Tipperary";

pub const AES_PREFIX: &str = "AES: ";
pub const AES_OK: &str = "AES: [OK]";
pub const AES_FAILED: &str = "AES: [FAILED]";

pub const DH_PREFIX: &str = "DH: ";
pub const DH_CONNECT1: &str = "DH: ALICE/BOB CONNECT1";
pub const DH_CONNECT2: &str = "DH: BOB/ALICE CONNECT2";
pub const DH_CONNECT3: &str = "DH: ALICE/BOB CONNECT3";
pub const DH_OK: &str = "DH: OK";

pub const CTF_PREFIX: &str = "CTF: ";
pub const CTF_CONNECT: &str = "CTF: CONNECT";
pub const CTF_FLAG: &str = "CTF: FLAG";

/// AES-128 key of the AES demo.
pub fn demo_aes_key() -> SessionKey {
    derive_symmetric_key(&BigUint::from(DEMO_AES_SECRET))
}

pub fn hello(name: &str, host: &str) -> String {
    format!("Hello! My name is {}, calling from {}.", name, host)
}

pub fn hello_reply(host: &str) -> String {
    format!("Hello {}!", host)
}

/// `<tag> <sid>` or `<tag> <sid> <payload>`.
pub fn tagged(tag: &str, session: SessionId, payload: &str) -> String {
    if payload.is_empty() {
        format!("{} {}", tag, session)
    } else {
        format!("{} {} {}", tag, session, payload)
    }
}

/// Inverse of [`tagged`]. The payload is empty when absent.
pub fn parse_tagged<'a>(text: &'a str, tag: &str) -> Option<(SessionId, &'a str)> {
    let rest = text.strip_prefix(tag)?.strip_prefix(' ')?;
    let (sid, payload) = match rest.split_once(' ') {
        Some((sid, payload)) => (sid, payload),
        None => (rest, ""),
    };
    Some((sid.parse().ok()?, payload))
}
