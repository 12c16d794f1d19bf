//! Raum-Registry und Mitgliederverwaltung
//!
//! Die Registry ist die einzige Ressource die von mehreren Verbindungen
//! gleichzeitig mutiert wird. Alle Mutationen laufen ueber atomare
//! entry-Operationen der DashMap – zwei Teilnehmer koennen sich so nie
//! unter demselben Namen registrieren, und zwei `start`-Anfragen nie
//! dieselbe Raum-ID belegen.
//!
//! ## Raum-IDs
//! Kurz und teilbar: aus 5 Zufallsbytes werden base58-Praefixe der Laenge
//! 3, 4, 5 probiert; das erste unbenutzte gewinnt. Kurze IDs zuerst haelt
//! die Tokens tippbar, das Wachstum begrenzt die Kollisionswahrschein-
//! lichkeit ohne unbegrenzte Wiederholung.

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hideaway_protocol::ChatId;
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

use crate::auth::{HASH_LAENGE, SALT_LAENGE, hashes_gleich};
use crate::error::{RelayError, RelayResult};

/// Anzahl Zufallsbytes aus denen die ID-Kandidaten geschnitten werden
const ID_BYTES: usize = 5;

/// Kuerzeste probierte ID-Laenge in Bytes
const ID_MIN_LAENGE: usize = 3;

/// Sende-Queue eines Mitglieds (fertig serialisierte Frames)
pub type MitgliedSender = mpsc::Sender<Bytes>;

// ---------------------------------------------------------------------------
// Raum
// ---------------------------------------------------------------------------

/// Ein Chat-Raum: Passwort-Material plus Mitglieder-Map
///
/// Der Salt steht beim Erstellen fest; der Hash wird write-once
/// nachgereicht, sobald argon2 auf dem Blocking-Pool fertig ist. So kann
/// die ID-Suche laufen waehrend der Hash noch rechnet.
pub struct Raum {
    /// Oeffentliches Chat-Token
    pub id: ChatId,
    passwort_hash: OnceLock<[u8; HASH_LAENGE]>,
    passwort_salt: [u8; SALT_LAENGE],
    mitglieder: DashMap<String, MitgliedSender>,
}

impl Raum {
    fn neu(id: ChatId, passwort_salt: [u8; SALT_LAENGE]) -> Self {
        Self {
            id,
            passwort_hash: OnceLock::new(),
            passwort_salt,
            mitglieder: DashMap::new(),
        }
    }

    /// Gespeicherter Salt fuer die Join-Hash-Berechnung
    pub fn salt(&self) -> &[u8; SALT_LAENGE] {
        &self.passwort_salt
    }

    /// Setzt den Passwort-Hash; ein zweites Setzen ist ein No-Op
    pub fn passwort_setzen(&self, hash: [u8; HASH_LAENGE]) {
        let _ = self.passwort_hash.set(hash);
    }

    /// Vergleicht einen Kandidaten-Hash konstantzeitig mit dem gespeicherten
    ///
    /// Solange der Hash noch nicht gesetzt ist, wird jeder Kandidat
    /// abgelehnt – das Token ist zu dem Zeitpunkt noch nirgends bekannt.
    pub fn passwort_pruefen(&self, kandidat: &[u8; HASH_LAENGE]) -> bool {
        match self.passwort_hash.get() {
            Some(hash) => hashes_gleich(hash, kandidat),
            None => false,
        }
    }

    /// Registriert ein Mitglied; atomar gegen konkurrierende Joins
    pub fn mitglied_registrieren(&self, name: &str, sender: MitgliedSender) -> RelayResult<()> {
        match self.mitglieder.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RelayError::NameVergeben(name.to_string())),
            Entry::Vacant(eintrag) => {
                eintrag.insert(sender);
                Ok(())
            }
        }
    }

    /// true wenn der Name bereits belegt ist
    pub fn mitglied_existiert(&self, name: &str) -> bool {
        self.mitglieder.contains_key(name)
    }

    /// Sende-Queue eines Mitglieds
    pub fn mitglied_holen(&self, name: &str) -> Option<MitgliedSender> {
        self.mitglieder.get(name).map(|eintrag| eintrag.value().clone())
    }

    /// Entfernt ein Mitglied (Verbindungsende)
    pub fn mitglied_entfernen(&self, name: &str) -> bool {
        self.mitglieder.remove(name).is_some()
    }

    /// Alle Mitgliedsnamen ausser dem gegebenen
    pub fn mitglieder_ausser(&self, name: &str) -> Vec<String> {
        self.mitglieder
            .iter()
            .map(|eintrag| eintrag.key().clone())
            .filter(|mitglied| mitglied != name)
            .collect()
    }

    /// Anzahl der Mitglieder
    pub fn mitglieder_anzahl(&self) -> usize {
        self.mitglieder.len()
    }

    /// true wenn kein Mitglied mehr registriert ist
    pub fn ist_leer(&self) -> bool {
        self.mitglieder.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RaumRegistry
// ---------------------------------------------------------------------------

/// Registry aller aktiven Raeume, indexiert nach Chat-Token
pub struct RaumRegistry {
    raeume: DashMap<String, Arc<Raum>>,
}

impl RaumRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self {
            raeume: DashMap::new(),
        }
    }

    /// Erstellt einen Raum unter einer frischen, kollisionsfreien ID
    ///
    /// Pruefung und Belegung der ID sind eine atomare entry-Operation.
    /// Der Passwort-Hash wird nachgereicht ([`Raum::passwort_setzen`]).
    pub fn raum_erstellen(&self, passwort_salt: [u8; SALT_LAENGE]) -> RelayResult<Arc<Raum>> {
        let mut buf = [0u8; ID_BYTES];
        OsRng.fill_bytes(&mut buf);
        self.raum_erstellen_aus_bytes(buf, passwort_salt)
    }

    fn raum_erstellen_aus_bytes(
        &self,
        buf: [u8; ID_BYTES],
        passwort_salt: [u8; SALT_LAENGE],
    ) -> RelayResult<Arc<Raum>> {
        for laenge in ID_MIN_LAENGE..=ID_BYTES {
            let id = bs58::encode(&buf[..laenge]).into_string();

            match self.raeume.entry(id.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(eintrag) => {
                    let raum = Arc::new(Raum::neu(ChatId::neu(id), passwort_salt));
                    eintrag.insert(Arc::clone(&raum));
                    return Ok(raum);
                }
            }
        }

        Err(RelayError::KeineFreieId)
    }

    /// Sucht einen Raum nach Token
    pub fn holen(&self, id: &str) -> Option<Arc<Raum>> {
        self.raeume.get(id).map(|eintrag| Arc::clone(eintrag.value()))
    }

    /// Registriert ein Mitglied und verifiziert, dass der Raum noch aktiv ist
    ///
    /// Ein Beitretender haelt seinen `Arc<Raum>` ueber den langsamen Hash
    /// hinweg. Geht in diesem Fenster das letzte Mitglied, sammelt
    /// [`entfernen_wenn_leer`](Self::entfernen_wenn_leer) den Raum ein und
    /// die Registrierung traefe einen Geist-Raum. Der Nachcheck macht sie
    /// dann rueckgaengig: steht nach dem Eintragen nicht mehr derselbe
    /// `Arc` in der Registry, wird das Mitglied wieder ausgetragen und der
    /// Raum als nicht gefunden gemeldet. Steht er noch drin, kann kein
    /// nachfolgendes `entfernen_wenn_leer` ihn mehr entfernen – der Raum
    /// ist durch das frische Mitglied nicht leer.
    pub fn mitglied_registrieren(
        &self,
        raum: &Arc<Raum>,
        name: &str,
        sender: MitgliedSender,
    ) -> RelayResult<()> {
        raum.mitglied_registrieren(name, sender)?;

        match self.holen(raum.id.as_str()) {
            Some(aktuell) if Arc::ptr_eq(&aktuell, raum) => Ok(()),
            _ => {
                raum.mitglied_entfernen(name);
                Err(RelayError::NichtGefunden("Chat not found".to_string()))
            }
        }
    }

    /// Entfernt den Raum wenn er leer ist (letztes Mitglied weg)
    pub fn entfernen_wenn_leer(&self, id: &str) -> bool {
        self.raeume.remove_if(id, |_, raum| raum.ist_leer()).is_some()
    }

    /// Anzahl der aktiven Raeume
    pub fn anzahl(&self) -> usize {
        self.raeume.len()
    }
}

impl Default for RaumRegistry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_hash() -> [u8; HASH_LAENGE] {
        [7u8; HASH_LAENGE]
    }

    fn dummy_salt() -> [u8; SALT_LAENGE] {
        [3u8; SALT_LAENGE]
    }

    fn sender() -> MitgliedSender {
        mpsc::channel(1).0
    }

    #[test]
    fn raum_id_hat_kuerzeste_freie_laenge() {
        let registry = RaumRegistry::neu();
        let raum = registry
            .raum_erstellen_aus_bytes([1, 2, 3, 4, 5], dummy_salt())
            .unwrap();

        assert_eq!(raum.id.as_str(), bs58::encode([1, 2, 3]).into_string());
        assert!(registry.holen(raum.id.as_str()).is_some());
    }

    #[test]
    fn kollision_laesst_id_wachsen() {
        let registry = RaumRegistry::neu();
        let buf = [1u8, 2, 3, 4, 5];

        // Laengen 3 und 4 belegen -> Laenge 5 muss gewinnen
        registry.raum_erstellen_aus_bytes(buf, dummy_salt()).unwrap();
        registry.raum_erstellen_aus_bytes(buf, dummy_salt()).unwrap();
        let dritter = registry.raum_erstellen_aus_bytes(buf, dummy_salt()).unwrap();

        assert_eq!(dritter.id.as_str(), bs58::encode([1, 2, 3, 4, 5]).into_string());
    }

    #[test]
    fn alle_laengen_belegt_gibt_keine_freie_id() {
        let registry = RaumRegistry::neu();
        let buf = [9u8, 8, 7, 6, 5];

        for _ in 0..3 {
            registry.raum_erstellen_aus_bytes(buf, dummy_salt()).unwrap();
        }

        let vierter = registry.raum_erstellen_aus_bytes(buf, dummy_salt());
        assert!(matches!(vierter, Err(RelayError::KeineFreieId)));
        assert_eq!(registry.anzahl(), 3);
    }

    #[test]
    fn doppelter_name_wird_abgelehnt_ohne_mutation() {
        let registry = RaumRegistry::neu();
        let raum = registry.raum_erstellen(dummy_salt()).unwrap();

        raum.mitglied_registrieren("alice", sender()).unwrap();
        let zweiter = raum.mitglied_registrieren("alice", sender());

        assert!(matches!(zweiter, Err(RelayError::NameVergeben(_))));
        assert_eq!(raum.mitglieder_anzahl(), 1);
    }

    #[test]
    fn mitgliederliste_ohne_beitretenden() {
        let registry = RaumRegistry::neu();
        let raum = registry.raum_erstellen(dummy_salt()).unwrap();

        raum.mitglied_registrieren("alice", sender()).unwrap();
        raum.mitglied_registrieren("bob", sender()).unwrap();
        raum.mitglied_registrieren("carol", sender()).unwrap();

        let mut liste = raum.mitglieder_ausser("carol");
        liste.sort();
        assert_eq!(liste, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn leerer_raum_wird_entfernt() {
        let registry = RaumRegistry::neu();
        let raum = registry.raum_erstellen(dummy_salt()).unwrap();
        let id = raum.id.as_str().to_string();

        raum.mitglied_registrieren("alice", sender()).unwrap();

        // Noch belegt: kein Entfernen
        assert!(!registry.entfernen_wenn_leer(&id));

        raum.mitglied_entfernen("alice");
        assert!(registry.entfernen_wenn_leer(&id));
        assert!(registry.holen(&id).is_none());
    }

    #[test]
    fn registrierung_auf_eingesammeltem_raum_wird_rueckgaengig_gemacht() {
        let registry = RaumRegistry::neu();
        let raum = registry.raum_erstellen(dummy_salt()).unwrap();
        raum.passwort_setzen(dummy_hash());
        let id = raum.id.as_str().to_string();

        raum.mitglied_registrieren("alice", sender()).unwrap();

        // Ein Beitretender hat den Arc schon geholt und haengt im Hash ...
        let geholt = registry.holen(&id).unwrap();

        // ... waehrenddessen geht das letzte Mitglied und der Raum wird
        // eingesammelt
        raum.mitglied_entfernen("alice");
        assert!(registry.entfernen_wenn_leer(&id));
        assert!(registry.holen(&id).is_none());

        let ergebnis = registry.mitglied_registrieren(&geholt, "bob", sender());
        assert!(matches!(ergebnis, Err(RelayError::NichtGefunden(_))));
        assert_eq!(geholt.mitglieder_anzahl(), 0);
    }

    #[test]
    fn registrierung_trifft_keinen_ersetzten_raum_unter_gleicher_id() {
        let registry = RaumRegistry::neu();
        let buf = [4u8, 4, 4, 4, 4];
        let alter = registry.raum_erstellen_aus_bytes(buf, dummy_salt()).unwrap();
        let id = alter.id.as_str().to_string();

        alter.mitglied_registrieren("alice", sender()).unwrap();
        alter.mitglied_entfernen("alice");
        assert!(registry.entfernen_wenn_leer(&id));

        // Gleiche ID, frischer Raum
        let neuer = registry.raum_erstellen_aus_bytes(buf, dummy_salt()).unwrap();
        assert_eq!(neuer.id.as_str(), id);

        let ergebnis = registry.mitglied_registrieren(&alter, "bob", sender());
        assert!(matches!(ergebnis, Err(RelayError::NichtGefunden(_))));
        assert!(alter.ist_leer());
        assert!(neuer.ist_leer());
    }

    #[test]
    fn registrierung_auf_aktivem_raum_gelingt() {
        let registry = RaumRegistry::neu();
        let raum = registry.raum_erstellen(dummy_salt()).unwrap();

        registry
            .mitglied_registrieren(&raum, "alice", sender())
            .unwrap();
        assert!(raum.mitglied_existiert("alice"));
    }

    #[test]
    fn passwort_pruefung_erst_nach_dem_setzen() {
        let registry = RaumRegistry::neu();
        let raum = registry.raum_erstellen(dummy_salt()).unwrap();

        // Solange der Hash fehlt, passt kein Kandidat
        assert!(!raum.passwort_pruefen(&dummy_hash()));

        raum.passwort_setzen(dummy_hash());
        assert!(raum.passwort_pruefen(&dummy_hash()));
        assert!(!raum.passwort_pruefen(&[8u8; HASH_LAENGE]));

        // Zweites Setzen aendert nichts
        raum.passwort_setzen([8u8; HASH_LAENGE]);
        assert!(raum.passwort_pruefen(&dummy_hash()));
    }
}
