use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Months, Utc};
use num_bigint_dig::BigUint;

use sts_lab::client::{run_initiator, Client};
use sts_lab::demo::{parse_tagged, tagged, CTF_CONNECT, CTF_FLAG};
use sts_lab::protocol::message::{SessionId, Step, StsMessage};
use sts_lab::protocol::{InitiatorState, ResponderState};
use sts_lab::security::{
    seeded_rng, EphemeralKey, GroupParams, RsaKeyGenConfig, RsaKeyPair, SessionRng,
};
use sts_lab::server::Server;
use sts_lab::transport::{Endpoint, MemoryNetwork, MemoryTransport, Transport};
use sts_lab::{
    Certificate, EstablishedSession, Error, HandshakeError, Initiator, PartyConfig, Responder,
};

struct World {
    authority: RsaKeyPair,
    rogue_authority: RsaKeyPair,
    alice_keys: RsaKeyPair,
    bob_keys: RsaKeyPair,
    alice: Arc<PartyConfig>,
    bob: Arc<PartyConfig>,
}

fn keys(seed: u64) -> RsaKeyPair {
    RsaKeyPair::generate(&RsaKeyGenConfig {
        key_size: 512,
        public_exponent: 65537,
        seed: Some(seed),
    })
    .unwrap()
}

fn party_with(cert: Certificate, keys: &RsaKeyPair, authority: &RsaKeyPair) -> Arc<PartyConfig> {
    Arc::new(
        PartyConfig::new(cert, keys.private_key.clone(), authority.public_key.clone())
            .unwrap()
            .with_timeouts(Duration::from_secs(5), Some(Duration::from_millis(500))),
    )
}

fn world() -> &'static World {
    static WORLD: OnceLock<World> = OnceLock::new();
    WORLD.get_or_init(|| {
        let authority = keys(7);
        let rogue_authority = keys(8);
        let alice_keys = keys(9);
        let bob_keys = keys(10);

        let alice_cert =
            Certificate::create("alice", "Lab CA", &alice_keys.public_key, &authority.private_key)
                .unwrap();
        let bob_cert =
            Certificate::create("bob", "Lab CA", &bob_keys.public_key, &authority.private_key)
                .unwrap();

        World {
            alice: party_with(alice_cert, &alice_keys, &authority),
            bob: party_with(bob_cert, &bob_keys, &authority),
            authority,
            rogue_authority,
            alice_keys,
            bob_keys,
        }
    })
}

/// Bob with a different certificate but the same secret key.
fn bob_with(cert: Certificate) -> Arc<PartyConfig> {
    let w = world();
    party_with(cert, &w.bob_keys, &w.authority)
}

/// Run both machines against each other in memory, optionally rewriting the
/// responder's CONNECT2 parts on the way.
fn exchange(
    alice: Arc<PartyConfig>,
    bob: Arc<PartyConfig>,
    alice_expects: Option<&str>,
    bob_expects: Option<&str>,
    tamper: impl Fn(usize, StsMessage) -> StsMessage,
) -> (
    Initiator,
    Option<Responder>,
    Result<EstablishedSession, HandshakeError>,
    Option<EstablishedSession>,
) {
    let mut rng = seeded_rng(Some(2024));
    let mut initiator = Initiator::new(alice, alice_expects.map(String::from), &mut rng);
    let connect1 = initiator.start().unwrap();

    let (mut responder, connect2) =
        match Responder::accept(bob, &connect1, bob_expects.map(String::from), &mut rng) {
            Ok(pair) => pair,
            Err(e) => return (initiator, None, Err(e), None),
        };

    let mut connect3 = Vec::new();
    for (i, msg) in connect2.into_iter().enumerate() {
        match initiator.handle(&tamper(i, msg), &mut rng) {
            Ok(adv) => connect3.extend(adv.outgoing),
            Err(e) => return (initiator, Some(responder), Err(e), None),
        }
    }

    let mut connect4 = Vec::new();
    let mut bob_session = None;
    for msg in &connect3 {
        match responder.handle(msg, &mut rng) {
            Ok(adv) => {
                connect4.extend(adv.outgoing);
                bob_session = bob_session.or(adv.established);
            }
            Err(_) => break,
        }
    }

    // A silent responder means the initiator never hears CONNECT4.
    let Some(confirm) = connect4.first() else {
        let reason = initiator.timed_out();
        return (initiator, Some(responder), Err(reason), bob_session);
    };
    let alice_session = initiator
        .handle(confirm, &mut rng)
        .map(|adv| adv.established.unwrap());
    (initiator, Some(responder), alice_session, bob_session)
}

fn untouched(_: usize, msg: StsMessage) -> StsMessage {
    msg
}

#[test]
fn test_honest_parties_agree_on_the_session_key() {
    let w = world();
    let (initiator, responder, alice, bob) = exchange(
        Arc::clone(&w.alice),
        Arc::clone(&w.bob),
        Some("bob"),
        Some("alice"),
        untouched,
    );
    let alice = alice.unwrap();
    let bob = bob.unwrap();

    assert_eq!(initiator.state(), &InitiatorState::Established);
    assert_eq!(responder.unwrap().state(), &ResponderState::Established);
    assert_eq!(alice.key(), bob.key());
    assert_eq!(alice.key().as_bytes().len(), 16);
    assert_eq!(alice.peer_name(), "bob");
    assert_eq!(bob.peer_name(), "alice");

    // The key protects application traffic both ways.
    let mut rng = seeded_rng(Some(1));
    let sealed = alice.seal(b"first application message", &mut rng).unwrap();
    assert_eq!(bob.open(&sealed).unwrap(), b"first application message");
}

#[test]
fn test_lab_group_handshake_also_succeeds() {
    let w = world();
    let alice = Arc::new((*w.alice).clone().with_group(GroupParams::lab_128()));
    let bob = Arc::new((*w.bob).clone().with_group(GroupParams::lab_128()));
    let (_, _, a, b) = exchange(alice, bob, None, None, untouched);
    assert_eq!(a.unwrap().key(), b.unwrap().key());
}

#[test]
fn test_certificate_from_another_authority_is_rejected() {
    let w = world();
    let forged = Certificate::create(
        "bob",
        "Lab CA",
        &w.bob_keys.public_key,
        &w.rogue_authority.private_key,
    )
    .unwrap();

    let (initiator, _, alice, bob) = exchange(
        Arc::clone(&w.alice),
        bob_with(forged),
        None,
        None,
        untouched,
    );
    assert_eq!(alice.unwrap_err(), HandshakeError::InvalidPeerCertificate);
    assert!(bob.is_none());
    assert_eq!(
        initiator.state(),
        &InitiatorState::Aborted(HandshakeError::InvalidPeerCertificate)
    );
}

#[test]
fn test_substituted_certificate_in_transit_is_rejected() {
    let w = world();
    let rogue_keys = keys(11);
    let forged = Certificate::create(
        "bob",
        "Lab CA",
        &rogue_keys.public_key,
        &w.rogue_authority.private_key,
    )
    .unwrap();

    let (_, _, alice, _) = exchange(
        Arc::clone(&w.alice),
        Arc::clone(&w.bob),
        None,
        None,
        |i, msg| {
            if i == 2 {
                StsMessage::certificate(Step::Connect2, msg.session, &forged)
            } else {
                msg
            }
        },
    );
    assert_eq!(alice.unwrap_err(), HandshakeError::InvalidPeerCertificate);
}

#[test]
fn test_expired_and_future_certificates_are_rejected() {
    let w = world();
    let two_years_ago = Utc::now() - Months::new(24);
    let expired = Certificate::create_at(
        "bob",
        "Lab CA",
        &w.bob_keys.public_key,
        &w.authority.private_key,
        two_years_ago,
    )
    .unwrap();
    let (_, _, alice, _) = exchange(Arc::clone(&w.alice), bob_with(expired), None, None, untouched);
    assert_eq!(alice.unwrap_err(), HandshakeError::InvalidPeerCertificate);

    let next_month = Utc::now() + Months::new(1);
    let early = Certificate::create_at(
        "bob",
        "Lab CA",
        &w.bob_keys.public_key,
        &w.authority.private_key,
        next_month,
    )
    .unwrap();
    let (_, _, alice, _) = exchange(Arc::clone(&w.alice), bob_with(early), None, None, untouched);
    assert_eq!(alice.unwrap_err(), HandshakeError::InvalidPeerCertificate);
}

#[test]
fn test_substituted_dh_value_breaks_the_signature() {
    let w = world();
    let mut rng = seeded_rng(Some(99));
    let mallory = EphemeralKey::generate(&w.alice.group, &mut rng);
    let substitute = mallory.public_value().clone();

    let (initiator, _, alice, bob) = exchange(
        Arc::clone(&w.alice),
        Arc::clone(&w.bob),
        None,
        None,
        |i, msg| {
            if i == 1 {
                StsMessage::dh_value(Step::Connect2, msg.session, &substitute)
            } else {
                msg
            }
        },
    );
    assert_eq!(alice.unwrap_err(), HandshakeError::SignatureMismatch);
    assert!(bob.is_none());
    assert!(matches!(initiator.state(), InitiatorState::Aborted(_)));
}

#[test]
fn test_degenerate_dh_value_is_malformed() {
    let w = world();
    let p_minus_one = &w.alice.group.p - BigUint::from(1u8);
    let (_, _, alice, _) = exchange(
        Arc::clone(&w.alice),
        Arc::clone(&w.bob),
        None,
        None,
        |i, msg| {
            if i == 1 {
                StsMessage::dh_value(Step::Connect2, msg.session, &p_minus_one)
            } else {
                msg
            }
        },
    );
    assert!(matches!(alice, Err(HandshakeError::MalformedMessage(_))));
}

#[test]
fn test_garbled_response_is_malformed() {
    let w = world();
    let (_, _, alice, _) = exchange(
        Arc::clone(&w.alice),
        Arc::clone(&w.bob),
        None,
        None,
        |i, msg| {
            if i == 0 {
                StsMessage::new(Step::Connect2, msg.session, "%%% not base64 %%%")
            } else {
                msg
            }
        },
    );
    assert!(matches!(alice, Err(HandshakeError::MalformedMessage(_))));
}

#[test]
fn test_initiator_pinning_flags_impersonation() {
    let w = world();
    let (_, _, alice, _) = exchange(
        Arc::clone(&w.alice),
        Arc::clone(&w.bob),
        Some("carol"),
        None,
        untouched,
    );
    assert_eq!(
        alice.unwrap_err(),
        HandshakeError::IdentityMismatch {
            expected: "carol".into(),
            presented: "bob".into(),
        }
    );
}

#[test]
fn test_responder_pinning_aborts_silently() {
    let w = world();
    let (_, responder, alice, bob) = exchange(
        Arc::clone(&w.alice),
        Arc::clone(&w.bob),
        None,
        Some("mallory"),
        untouched,
    );
    assert!(bob.is_none());
    assert_eq!(
        responder.unwrap().state(),
        &ResponderState::Aborted(HandshakeError::IdentityMismatch {
            expected: "mallory".into(),
            presented: "alice".into(),
        })
    );
    // No CONNECT4 was sent, so all the initiator sees is silence.
    assert_eq!(alice.unwrap_err(), HandshakeError::NoConfirmation);
}

#[test]
fn test_forged_initiator_signature_gets_no_confirmation() {
    let w = world();
    let mut rng = seeded_rng(Some(5));
    let mut initiator = Initiator::new(Arc::clone(&w.alice), None, &mut rng);
    let connect1 = initiator.start().unwrap();
    let (mut responder, connect2) =
        Responder::accept(Arc::clone(&w.bob), &connect1, None, &mut rng).unwrap();

    let mut connect3 = Vec::new();
    for msg in &connect2 {
        connect3.extend(initiator.handle(msg, &mut rng).unwrap().outgoing);
    }
    // Replace Alice's sealed signature with one sealed under the right key but
    // over nothing in particular.
    let forged_sig = StsMessage::new(
        Step::Connect3,
        connect3[0].session,
        connect2[0].payload.clone(),
    );
    let first = responder.handle(&forged_sig, &mut rng).unwrap();
    assert!(first.outgoing.is_empty());
    let err = responder.handle(&connect3[1], &mut rng).unwrap_err();
    assert_eq!(err, HandshakeError::SignatureMismatch);
    assert_eq!(
        responder.state(),
        &ResponderState::Aborted(HandshakeError::SignatureMismatch)
    );
}

#[test]
fn test_tampered_certificate_text_is_rejected() {
    let w = world();
    let (_, _, alice, _) = exchange(
        Arc::clone(&w.alice),
        Arc::clone(&w.bob),
        None,
        None,
        |i, msg| {
            if i == 2 {
                let renamed = msg.payload.replacen("NAME bob", "NAME bib", 1);
                StsMessage::new(Step::Connect2, msg.session, renamed)
            } else {
                msg
            }
        },
    );
    assert_eq!(alice.unwrap_err(), HandshakeError::InvalidPeerCertificate);
}

// Full drivers over the in-memory transport.

/// Serve on a thread until `wanted` handshakes completed or `budget` ran out.
fn serve_until(
    mut server: Server<MemoryTransport>,
    wanted: usize,
    budget: Duration,
) -> thread::JoinHandle<Vec<EstablishedSession>> {
    thread::spawn(move || {
        let deadline = Instant::now() + budget;
        let mut done = Vec::new();
        while done.len() < wanted && Instant::now() < deadline {
            if let Some(session) = server.serve_once(Some(Duration::from_millis(50))).unwrap() {
                done.push(session);
            }
        }
        done
    })
}

fn server_on(net: &MemoryNetwork, party: Option<Arc<PartyConfig>>) -> Server<MemoryTransport> {
    let transport = net.attach(Endpoint::new("server", 31415)).unwrap();
    Server::new(transport, party, Some(31415))
}

#[test]
fn test_client_and_server_complete_sts() {
    let w = world();
    let net = MemoryNetwork::new();
    let server = server_on(&net, Some(Arc::clone(&w.bob)));
    let server_endpoint = server.local_endpoint().clone();
    let handle = serve_until(server, 1, Duration::from_secs(20));

    let transport = net.attach(Endpoint::new("client", 1789)).unwrap();
    let mut client = Client::new(transport, server_endpoint, Some(1));
    let alice = client
        .station_to_station(Arc::clone(&w.alice), Some("bob".into()))
        .unwrap();

    let bob = handle.join().unwrap();
    assert_eq!(bob.len(), 1);
    assert_eq!(alice.key(), bob[0].key());
    assert_eq!(alice.id(), bob[0].id());
}

#[test]
fn test_server_multiplexes_concurrent_handshakes() {
    let w = world();
    let net = MemoryNetwork::new();
    let server = server_on(&net, Some(Arc::clone(&w.bob)));
    let server_endpoint = server.local_endpoint().clone();
    let handle = serve_until(server, 3, Duration::from_secs(20));

    let clients: Vec<_> = (0..3u16)
        .map(|i| {
            let transport = net.attach(Endpoint::new("client", 2000 + i)).unwrap();
            let server = server_endpoint.clone();
            let alice = Arc::clone(&w.alice);
            thread::spawn(move || {
                let mut client = Client::new(transport, server, Some(u64::from(i)));
                client.station_to_station(alice, None).unwrap()
            })
        })
        .collect();

    let mut alice_keys: Vec<_> = clients
        .into_iter()
        .map(|c| {
            let s = c.join().unwrap();
            (s.id(), s.key().as_bytes().to_vec())
        })
        .collect();
    let mut bob_keys: Vec<_> = handle
        .join()
        .unwrap()
        .iter()
        .map(|s| (s.id(), s.key().as_bytes().to_vec()))
        .collect();
    alice_keys.sort();
    bob_keys.sort();
    assert_eq!(alice_keys.len(), 3);
    assert_eq!(alice_keys, bob_keys);
}

#[test]
fn test_capture_the_flag_requires_the_claimed_name() {
    let w = world();
    let net = MemoryNetwork::new();
    let server = server_on(&net, Some(Arc::clone(&w.bob)));
    let server_endpoint = server.local_endpoint().clone();
    let handle = serve_until(server, 1, Duration::from_secs(20));

    let transport = net.attach(Endpoint::new("client", 1789)).unwrap();
    let mut client = Client::new(transport, server_endpoint.clone(), Some(3));
    let flag = client.capture_the_flag(Arc::clone(&w.alice), "alice").unwrap();
    assert!(flag.starts_with("0x"));
    assert_eq!(flag.len(), 2 + 32);
    assert_eq!(handle.join().unwrap().len(), 1);

    // Claiming someone else's name: the server never confirms.
    let server = server_on(&net, Some(Arc::clone(&w.bob)));
    let handle = serve_until(server, 1, Duration::from_secs(2));
    let err = client
        .capture_the_flag(Arc::clone(&w.alice), "john.smith")
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Handshake(HandshakeError::NoConfirmation)
    ));
    assert!(handle.join().unwrap().is_empty());
}

#[test]
fn test_demo_modes_round_trip() {
    let net = MemoryNetwork::new();
    let server = server_on(&net, None);
    let server_endpoint = server.local_endpoint().clone();
    let handle = serve_until(server, 1, Duration::from_secs(8));

    let transport = net.attach(Endpoint::new("client", 1789)).unwrap();
    let mut client = Client::new(transport, server_endpoint, Some(4))
        .with_response_timeout(Duration::from_secs(5));

    assert_eq!(client.hello("john.smith").unwrap(), "Hello client!");
    assert!(client.send_aes("It's a long way to Tipperary").unwrap());
    let key = client.diffie_hellman(&GroupParams::default()).unwrap();
    assert_eq!(key.as_bytes().len(), 16);

    // No identity loaded: STS goes unanswered.
    let w = world();
    let mut rng: SessionRng = seeded_rng(Some(6));
    let mut initiator = Initiator::new(Arc::clone(&w.alice), None, &mut rng);
    let err = run_initiator(
        client.transport(),
        client.server(),
        &mut initiator,
        &mut rng,
    );
    drop(client);
    // Response timeout is 5 seconds for this party.
    assert!(matches!(
        err,
        Err(Error::Handshake(HandshakeError::Timeout))
    ));
    assert!(handle.join().unwrap().is_empty());
}

#[test]
fn test_idle_sessions_expire() {
    let w = world();
    let net = MemoryNetwork::new();
    let mut server = server_on(&net, Some(Arc::clone(&w.bob)))
        .with_session_timeout(Duration::from_secs(1));
    let client = net.attach(Endpoint::new("client", 1789)).unwrap();

    let mut rng = seeded_rng(Some(8));
    let mut initiator = Initiator::new(Arc::clone(&w.alice), None, &mut rng);
    let connect1 = initiator.start().unwrap();
    client
        .send(server.local_endpoint(), &connect1.encode())
        .unwrap();
    server.serve_once(Some(Duration::from_secs(1))).unwrap();
    assert_eq!(server.pending_sessions(), 1);

    assert_eq!(server.expire_idle(Instant::now()), 0);
    assert_eq!(server.expire_idle(Instant::now() + Duration::from_secs(5)), 1);
    assert_eq!(server.pending_sessions(), 0);
}

#[test]
fn test_key_files_and_certificates_round_trip_through_disk() {
    let w = world();
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("alice");
    let prefix = prefix.to_str().unwrap();
    w.alice_keys.save(prefix).unwrap();

    let cert_path = dir.path().join("alice_certificate.txt");
    w.alice.certificate.save(&cert_path).unwrap();
    let auth_path = dir.path().join("auth_pk.txt");
    w.authority.public_key.save(&auth_path).unwrap();

    let loaded = PartyConfig::load(&cert_path, format!("{}_sec.txt", prefix), &auth_path).unwrap();
    assert_eq!(loaded.name(), "alice");
    assert!(loaded.certificate.is_valid(&loaded.authority_key));

    // A certificate paired with the wrong secret key is refused.
    let bob_sk = dir.path().join("bob_sec.txt");
    w.bob_keys.private_key.save(&bob_sk).unwrap();
    assert!(PartyConfig::load(&cert_path, &bob_sk, &auth_path).is_err());
}

#[test]
fn test_flag_from_another_host_is_rejected() {
    let w = world();
    let net = MemoryNetwork::new();
    let server = net.attach(Endpoint::new("server", 31415)).unwrap();
    let impostor = net.attach(Endpoint::new("mallory", 31415)).unwrap();
    let server_endpoint = server.local_endpoint().clone();
    let bob = Arc::clone(&w.bob);

    // A hand-driven responder completes the handshake honestly, then the flag
    // arrives from a different host.
    let handle = thread::spawn(move || {
        let mut rng = seeded_rng(Some(77));
        let wait = Some(Duration::from_secs(5));
        let claim = server.recv(wait).unwrap().unwrap();
        let client = claim.from.clone();
        let (sid, name) = parse_tagged(&claim.message, CTF_CONNECT).unwrap();
        assert_eq!(name, "alice");

        let connect1 = StsMessage::decode(&server.recv(wait).unwrap().unwrap().message).unwrap();
        let (mut responder, connect2) = Responder::accept(bob, &connect1, None, &mut rng).unwrap();
        for msg in &connect2 {
            server.send(&client, &msg.encode()).unwrap();
        }

        let mut established = None;
        while established.is_none() {
            let msg = StsMessage::decode(&server.recv(wait).unwrap().unwrap().message).unwrap();
            let adv = responder.handle(&msg, &mut rng).unwrap();
            for out in &adv.outgoing {
                server.send(&client, &out.encode()).unwrap();
            }
            established = adv.established;
        }
        let session = established.unwrap();
        let sealed = session.seal(b"0xfeedface", &mut rng).unwrap();
        impostor
            .send(&client, &tagged(CTF_FLAG, sid, &sealed))
            .unwrap();
    });

    let transport = net.attach(Endpoint::new("client", 1789)).unwrap();
    let mut client = Client::new(transport, server_endpoint, Some(9));
    let err = client
        .capture_the_flag(Arc::clone(&w.alice), "alice")
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    handle.join().unwrap();
}

#[test]
fn test_live_session_id_cannot_be_taken_over() {
    let w = world();
    let net = MemoryNetwork::new();
    let mut server = server_on(&net, Some(Arc::clone(&w.bob)));
    let server_endpoint = server.local_endpoint().clone();
    let alice_net = net.attach(Endpoint::new("client", 1789)).unwrap();
    let mallory_net = net.attach(Endpoint::new("mallory", 6666)).unwrap();
    let wait = Some(Duration::from_secs(1));
    let quiet = Some(Duration::from_millis(100));

    let mut rng = seeded_rng(Some(12));
    let mut alice = Initiator::new(Arc::clone(&w.alice), None, &mut rng);
    let sid = alice.session_id();
    alice_net
        .send(&server_endpoint, &alice.start().unwrap().encode())
        .unwrap();
    assert!(server.serve_once(wait).unwrap().is_none());
    assert_eq!(server.pending_sessions(), 1);

    let mut connect3 = Vec::new();
    for _ in 0..3 {
        let envelope = alice_net.recv(wait).unwrap().unwrap();
        connect3.extend(alice.handle_text(&envelope.message, &mut rng).unwrap().outgoing);
    }
    assert_eq!(connect3.len(), 2);

    // A second CONNECT1 under the live id is refused.
    let mut mallory = Initiator::with_session(Arc::clone(&w.alice), sid, None, &mut rng);
    mallory_net
        .send(&server_endpoint, &mallory.start().unwrap().encode())
        .unwrap();
    assert!(server.serve_once(wait).unwrap().is_none());
    assert!(mallory_net.recv(quiet).unwrap().is_none());
    assert_eq!(server.pending_sessions(), 1);

    // Replaying alice's CONNECT3 from another endpoint gets nothing back.
    for msg in &connect3 {
        mallory_net.send(&server_endpoint, &msg.encode()).unwrap();
        assert!(server.serve_once(wait).unwrap().is_none());
    }
    assert!(mallory_net.recv(quiet).unwrap().is_none());
    assert_eq!(server.pending_sessions(), 1);

    // Alice's own session is untouched and still completes.
    let mut bob_session = None;
    for msg in &connect3 {
        alice_net.send(&server_endpoint, &msg.encode()).unwrap();
        bob_session = bob_session.or(server.serve_once(wait).unwrap());
    }
    let bob_session = bob_session.unwrap();
    let confirm = alice_net.recv(wait).unwrap().unwrap();
    let alice_session = alice
        .handle_text(&confirm.message, &mut rng)
        .unwrap()
        .established
        .unwrap();
    assert_eq!(alice_session.key(), bob_session.key());
    assert_eq!(server.pending_sessions(), 0);
}

#[test]
fn test_unknown_session_id_is_dropped() {
    let w = world();
    let net = MemoryNetwork::new();
    let mut server = server_on(&net, Some(Arc::clone(&w.bob)));
    let stranger = net.attach(Endpoint::new("client", 1789)).unwrap();

    let stray = StsMessage::new(Step::Connect3, SessionId::new(0xbad), "AAAA");
    stranger
        .send(server.local_endpoint(), &stray.encode())
        .unwrap();
    assert!(server
        .serve_once(Some(Duration::from_secs(1)))
        .unwrap()
        .is_none());
    assert!(stranger
        .recv(Some(Duration::from_millis(100)))
        .unwrap()
        .is_none());
    assert_eq!(server.pending_sessions(), 0);
}
