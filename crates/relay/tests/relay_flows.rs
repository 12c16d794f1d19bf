//! End-to-End-Tests fuer den Relay-Server ueber echte TCP-Verbindungen

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hideaway_protocol::{Antwort, Envelope, FrameCodec, als_frame};
use hideaway_relay::{RelayConfig, RelayServer};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::Framed;

type Client = Framed<TcpStream, FrameCodec>;

/// Startet einen Server auf einem freien Port und gibt seine Adresse zurueck
async fn server_starten() -> (SocketAddr, watch::Sender<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = RelayServer::neu(addr, RelayConfig::default());
    tokio::spawn(server.starten_auf(listener, shutdown_rx));

    (addr, shutdown_tx)
}

async fn verbinden(addr: SocketAddr) -> Client {
    let stream = TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, FrameCodec::new())
}

async fn senden<T: Serialize>(client: &mut Client, nachricht: &T) {
    let frame = als_frame(nachricht).unwrap();
    client.send(frame).await.unwrap();
}

async fn frame_empfangen(client: &mut Client) -> Bytes {
    tokio::time::timeout(Duration::from_secs(30), client.next())
        .await
        .expect("Zeitlimit beim Warten auf ein Frame")
        .expect("Verbindung unerwartet geschlossen")
        .unwrap()
}

async fn antwort_empfangen(client: &mut Client) -> Antwort {
    let bytes = frame_empfangen(client).await;
    serde_json::from_slice(&bytes).unwrap()
}

/// Eroeffnet einen Chat und gibt Client plus Chat-Token zurueck
async fn chat_starten(addr: SocketAddr, name: &str, passwort: &str) -> (Client, String) {
    let mut client = verbinden(addr).await;
    senden(
        &mut client,
        &Envelope::neu("start", json!({"name": name, "password": passwort}), None),
    )
    .await;

    let antwort = antwort_empfangen(&mut client).await;
    assert_eq!(antwort.code, 200, "start fehlgeschlagen: {}", antwort.message);
    let chat_id = antwort.data.unwrap()["chatId"].as_str().unwrap().to_string();
    (client, chat_id)
}

async fn chat_beitreten(
    addr: SocketAddr,
    chat_id: &str,
    name: &str,
    passwort: &str,
) -> (Client, Antwort) {
    let mut client = verbinden(addr).await;
    senden(
        &mut client,
        &Envelope::neu(
            "join",
            json!({"chatId": chat_id, "name": name, "password": passwort}),
            None,
        ),
    )
    .await;
    let antwort = antwort_empfangen(&mut client).await;
    (client, antwort)
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_liefert_chat_token() {
    let (addr, _shutdown) = server_starten().await;
    let (_alice, chat_id) = chat_starten(addr, "alice", "pw123").await;

    assert!(chat_id.len() >= 3);
}

#[tokio::test]
async fn join_liefert_bestehende_mitglieder() {
    let (addr, _shutdown) = server_starten().await;
    let (_alice, chat_id) = chat_starten(addr, "alice", "pw123").await;

    let (_bob, antwort) = chat_beitreten(addr, &chat_id, "bob", "pw123").await;
    assert_eq!(antwort.code, 200);
    assert_eq!(antwort.message, "Connected");

    let mitglieder = antwort.data.unwrap()["members"].clone();
    assert_eq!(mitglieder, json!(["alice"]));
}

#[tokio::test]
async fn falsches_passwort_gibt_401_und_trennt() {
    let (addr, _shutdown) = server_starten().await;
    let (_alice, chat_id) = chat_starten(addr, "alice", "richtig").await;

    let (mut bob, antwort) = chat_beitreten(addr, &chat_id, "bob", "falsch").await;
    assert_eq!(antwort.code, 401);
    assert_eq!(antwort.message, "Invalid password");

    // Verbindung ist danach zu
    let ende = tokio::time::timeout(Duration::from_secs(5), bob.next())
        .await
        .unwrap();
    assert!(ende.is_none());
}

#[tokio::test]
async fn unbekannter_chat_gibt_404() {
    let (addr, _shutdown) = server_starten().await;

    let (_client, antwort) = chat_beitreten(addr, "QQQQQ", "bob", "pw").await;
    assert_eq!(antwort.code, 404);
    assert_eq!(antwort.message, "Chat not found");
}

#[tokio::test]
async fn doppelter_name_gibt_409() {
    let (addr, _shutdown) = server_starten().await;
    let (_alice, chat_id) = chat_starten(addr, "alice", "pw").await;

    let (_zweite, antwort) = chat_beitreten(addr, &chat_id, "alice", "pw").await;
    assert_eq!(antwort.code, 409);
    assert_eq!(antwort.message, "Member already has that name");
}

#[tokio::test]
async fn erstes_frame_muss_start_oder_join_sein() {
    let (addr, _shutdown) = server_starten().await;
    let mut client = verbinden(addr).await;

    senden(
        &mut client,
        &Envelope::neu("candidate", json!({"candidate": {}, "to": "x"}), None),
    )
    .await;

    let antwort = antwort_empfangen(&mut client).await;
    assert_eq!(antwort.code, 400);

    let ende = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap();
    assert!(ende.is_none());
}

#[tokio::test]
async fn kaputtes_json_im_handshake_gibt_400_und_trennt() {
    let (addr, _shutdown) = server_starten().await;
    let mut client = verbinden(addr).await;

    client.send(Bytes::from_static(b"kein json")).await.unwrap();

    let antwort = antwort_empfangen(&mut client).await;
    assert_eq!(antwort.code, 400);
    assert_eq!(antwort.message, "Invalid message");

    let ende = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap();
    assert!(ende.is_none());
}

#[tokio::test]
async fn handshake_antwort_spiegelt_id() {
    let (addr, _shutdown) = server_starten().await;
    let mut client = verbinden(addr).await;

    senden(
        &mut client,
        &Envelope::neu(
            "start",
            json!({"name": "alice", "password": "pw"}),
            Some("req-42".into()),
        ),
    )
    .await;

    let antwort = antwort_empfangen(&mut client).await;
    assert_eq!(antwort.code, 200);
    assert_eq!(antwort.id.as_deref(), Some("req-42"));
}

// ---------------------------------------------------------------------------
// Relay-Phase
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offer_wird_mit_absender_gestempelt() {
    let (addr, _shutdown) = server_starten().await;
    let (mut alice, chat_id) = chat_starten(addr, "alice", "pw").await;
    let (mut bob, antwort) = chat_beitreten(addr, &chat_id, "bob", "pw").await;
    assert_eq!(antwort.code, 200);

    senden(
        &mut bob,
        &Envelope::neu(
            "offer",
            json!({"offer": {"sdp": "v=0"}, "pubKey": "QUJD", "to": "alice"}),
            None,
        ),
    )
    .await;

    let bytes = frame_empfangen(&mut alice).await;
    let env = Envelope::parsen(&bytes).unwrap();
    assert_eq!(env.typ, "offer");
    assert_eq!(env.data["from"], "bob");
    assert_eq!(env.data["offer"]["sdp"], "v=0");
    assert_eq!(env.data["pubKey"], "QUJD");
}

#[tokio::test]
async fn unbekannter_empfaenger_gibt_404_in_relay_phase() {
    let (addr, _shutdown) = server_starten().await;
    let (mut alice, _chat_id) = chat_starten(addr, "alice", "pw").await;

    senden(
        &mut alice,
        &Envelope::neu("candidate", json!({"candidate": {}, "to": "niemand"}), None),
    )
    .await;

    let antwort = antwort_empfangen(&mut alice).await;
    assert_eq!(antwort.code, 404);
    assert_eq!(antwort.message, "Member not found");
}

#[tokio::test]
async fn join_in_relay_phase_gibt_405_nicht_fatal() {
    let (addr, _shutdown) = server_starten().await;
    let (mut alice, chat_id) = chat_starten(addr, "alice", "pw").await;
    let (mut bob, _) = chat_beitreten(addr, &chat_id, "bob", "pw").await;

    senden(
        &mut bob,
        &Envelope::neu(
            "join",
            json!({"chatId": chat_id, "name": "bob2", "password": "pw"}),
            None,
        ),
    )
    .await;

    let antwort = antwort_empfangen(&mut bob).await;
    assert_eq!(antwort.code, 405);
    assert_eq!(antwort.message, "Invalid message type");

    // Verbindung lebt weiter: Weiterleitung funktioniert noch
    senden(
        &mut bob,
        &Envelope::neu("candidate", json!({"candidate": {"x": 1}, "to": "alice"}), None),
    )
    .await;

    let bytes = frame_empfangen(&mut alice).await;
    let env = Envelope::parsen(&bytes).unwrap();
    assert_eq!(env.typ, "candidate");
    assert_eq!(env.data["from"], "bob");
}

#[tokio::test]
async fn getrenntes_mitglied_verschwindet_aus_dem_raum() {
    let (addr, _shutdown) = server_starten().await;
    let (mut alice, chat_id) = chat_starten(addr, "alice", "pw").await;
    let (bob, _) = chat_beitreten(addr, &chat_id, "bob", "pw").await;

    drop(bob);

    // Warten bis der Server den Abgang verarbeitet hat
    let mut versuche = 0;
    loop {
        senden(
            &mut alice,
            &Envelope::neu("candidate", json!({"candidate": {}, "to": "bob"}), None),
        )
        .await;
        let antwort = antwort_empfangen(&mut alice).await;
        if antwort.code == 404 {
            break;
        }
        versuche += 1;
        assert!(versuche < 50, "Mitglied wurde nie ausgetragen");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn antwort_envelope_wird_weitergeleitet() {
    let (addr, _shutdown) = server_starten().await;
    let (mut alice, chat_id) = chat_starten(addr, "alice", "pw").await;
    let (mut bob, _) = chat_beitreten(addr, &chat_id, "bob", "pw").await;

    senden(
        &mut alice,
        &Envelope::neu(
            "answer",
            json!({
                "answer": {"sdp": "v=0"},
                "pubKey": "WFla",
                "salt": "c2FsdA==",
                "to": "bob"
            }),
            None,
        ),
    )
    .await;

    let bytes = frame_empfangen(&mut bob).await;
    let env = Envelope::parsen(&bytes).unwrap();
    assert_eq!(env.typ, "answer");
    assert_eq!(env.data["from"], "alice");
    assert_eq!(env.data["salt"], "c2FsdA==");
}
